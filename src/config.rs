//! Runner configuration

use std::time::Duration;

use tokio::process::Command;

/// Default deadline for seeing the start check in the process output.
pub const DEFAULT_START_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// Cleanup callback invoked once after the supervised process exits.
pub type CleanupFn = Box<dyn FnOnce() + Send + 'static>;

/// Configuration for a supervised process run
///
/// Immutable once the [`Runner`](crate::Runner) is built. The command is
/// opaque to the supervision logic; anything a [`Command`] can express is
/// accepted unchanged.
pub struct RunnerConfig {
    /// Label used in logs and error messages (must be non-empty)
    pub name: String,
    /// Substring whose appearance in the process output marks it ready
    /// (None = no readiness gating)
    pub start_check: Option<String>,
    /// How long to wait for the start check before killing the process
    pub start_check_timeout: Duration,
    /// Command to execute
    pub command: Command,
    /// Invoked exactly once after the process exits, before the outcome
    /// is reported
    pub cleanup: Option<CleanupFn>,
}

impl RunnerConfig {
    /// Create a new configuration for the given command
    pub fn new(name: impl Into<String>, command: Command) -> Self {
        Self {
            name: name.into(),
            start_check: None,
            start_check_timeout: DEFAULT_START_CHECK_TIMEOUT,
            command,
            cleanup: None,
        }
    }

    /// Set the readiness marker to watch for in the process output
    pub fn start_check(mut self, marker: impl Into<String>) -> Self {
        self.start_check = Some(marker.into());
        self
    }

    /// Set the start check deadline
    pub fn start_check_timeout(mut self, timeout: Duration) -> Self {
        self.start_check_timeout = timeout;
        self
    }

    /// Set the cleanup callback
    pub fn cleanup(mut self, cleanup: impl FnOnce() + Send + 'static) -> Self {
        self.cleanup = Some(Box::new(cleanup));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RunnerConfig::new("server", Command::new("true"));
        assert_eq!(config.name, "server");
        assert!(config.start_check.is_none());
        assert_eq!(config.start_check_timeout, DEFAULT_START_CHECK_TIMEOUT);
        assert!(config.cleanup.is_none());
    }

    #[test]
    fn test_builder() {
        let config = RunnerConfig::new("server", Command::new("true"))
            .start_check("listening")
            .start_check_timeout(Duration::from_millis(250))
            .cleanup(|| {});

        assert_eq!(config.start_check.as_deref(), Some("listening"));
        assert_eq!(config.start_check_timeout, Duration::from_millis(250));
        assert!(config.cleanup.is_some());
    }
}
