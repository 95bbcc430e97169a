//! Supervisor control loop
//!
//! [`Runner`] owns one supervised run: it starts the process, arms the
//! readiness detector and start-check deadline, and arbitrates between
//! readiness, deadline, inbound signals, and process exit in a single
//! `select!` loop, one event at a time.

use std::pin::Pin;

use nix::sys::signal::Signal;
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep, Sleep};
use tracing::{debug, info, warn};

use crate::buffer::{MarkerWatch, OutputBuffer};
use crate::config::RunnerConfig;
use crate::error::{RunOutcome, RunnerError};
use crate::session::{self, Session};

/// Supervises the lifecycle of one externally spawned process
///
/// A runner is single-use: [`run`](Runner::run) consumes it, so a second
/// invocation is a compile error rather than a runtime state to reason
/// about. Most callers go through [`Process`](crate::Process) instead of
/// driving the runner directly.
pub struct Runner {
    config: RunnerConfig,
    buffer: OutputBuffer,
}

/// One arbitration event, processed strictly one at a time
enum Event {
    MarkerSeen,
    DeadlineElapsed,
    Signal(Option<Signal>),
    Exited(std::io::Result<std::process::ExitStatus>),
}

impl Runner {
    /// Create a runner from a configuration
    ///
    /// # Panics
    ///
    /// Panics if the configured name is empty; that is a programming error,
    /// not a run outcome.
    pub fn new(config: RunnerConfig) -> Self {
        assert!(!config.name.is_empty(), "runner name must not be empty");
        Self {
            config,
            buffer: OutputBuffer::new(),
        }
    }

    /// Configured label
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Handle to the capture buffer the process output will land in
    pub fn buffer(&self) -> OutputBuffer {
        self.buffer.clone()
    }

    /// Start the process and supervise it until it reaches a terminal state
    ///
    /// `signals` feeds signals to forward to the process; `ready` is flipped
    /// to `true` exactly once when the process is considered ready. Blocks
    /// the calling task until the process has exited (or been killed on the
    /// start-check deadline) and returns the single terminal outcome.
    pub async fn run(
        self,
        mut signals: mpsc::Receiver<Signal>,
        ready: watch::Sender<bool>,
    ) -> RunOutcome {
        let RunnerConfig {
            name,
            start_check,
            start_check_timeout,
            command,
            mut cleanup,
        } = self.config;

        let program = command.as_std().get_program().to_string_lossy().into_owned();

        let mut session = match Session::spawn(&name, command, self.buffer.clone()) {
            Ok(session) => session,
            Err(err) => {
                warn!(name = %name, program = %program, error = %err, "failed to start process");
                return Err(RunnerError::StartFailed {
                    name,
                    reason: err.to_string(),
                });
            }
        };

        info!(name = %name, program = %program, pid = session.pid(), "process started");
        self.buffer
            .write(format!("process started {} (pid: {})\n", program, session.pid()).as_bytes());

        // With no start check the process counts as ready the moment it is
        // confirmed started; the readiness path never waits on output.
        let marker = start_check.filter(|m| !m.is_empty());
        if marker.is_none() {
            let _ = ready.send(true);
        }

        let mut detector: Option<MarkerWatch> =
            marker.as_deref().map(|m| self.buffer.detect(m));
        let mut deadline: Option<Pin<Box<Sleep>>> =
            marker.as_ref().map(|_| Box::pin(sleep(start_check_timeout)));
        let mut signals_open = true;

        loop {
            let event = tokio::select! {
                _ = marker_seen(&mut detector), if detector.is_some() => Event::MarkerSeen,
                _ = deadline_elapsed(&mut deadline), if deadline.is_some() => Event::DeadlineElapsed,
                sig = signals.recv(), if signals_open => Event::Signal(sig),
                status = session.wait() => Event::Exited(status),
            };

            match event {
                Event::MarkerSeen => {
                    if let Some(mut watch) = detector.take() {
                        watch.cancel();
                    }
                    deadline = None;
                    debug!(name = %name, "start check seen, process ready");
                    let _ = ready.send(true);
                }
                Event::DeadlineElapsed => {
                    warn!(name = %name, pid = session.pid(), "start check deadline elapsed, killing process");
                    session.kill_and_wait().await;
                    session.drain_output().await;
                    return Err(RunnerError::StartTimeout {
                        name,
                        marker: marker.unwrap_or_default(),
                        output: self.buffer.contents(),
                    });
                }
                Event::Signal(Some(sig)) => {
                    debug!(name = %name, signal = %sig, "forwarding signal");
                    session.signal(sig);
                }
                Event::Signal(None) => {
                    // all signal senders dropped; stop polling the relay
                    signals_open = false;
                }
                Event::Exited(status) => {
                    if let Some(cleanup) = cleanup.take() {
                        cleanup();
                    }
                    let code = match status {
                        Ok(status) => session::exit_code(status),
                        Err(err) => {
                            warn!(name = %name, error = %err, "failed to collect exit status");
                            -1
                        }
                    };
                    info!(name = %name, code, "process exited");
                    if code == 0 {
                        return Ok(());
                    }
                    return Err(RunnerError::AbnormalExit { name, code });
                }
            }
        }
    }
}

async fn marker_seen(detector: &mut Option<MarkerWatch>) {
    match detector {
        Some(watch) => watch.wait().await,
        None => std::future::pending().await,
    }
}

async fn deadline_elapsed(deadline: &mut Option<Pin<Box<Sleep>>>) {
    match deadline {
        Some(sleep) => sleep.as_mut().await,
        None => std::future::pending().await,
    }
}
