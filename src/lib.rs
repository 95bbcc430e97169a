//! # testvisor
//!
//! **Purpose**: Process supervision for integration-test harnesses
//!
//! Spawns an auxiliary process, optionally waits until it signals
//! operational readiness by emitting a marker in its output, forwards
//! signals to it, and reports its terminal outcome. Test scenarios can
//! depend on "this process is up and accepting work" instead of fixed
//! sleeps.
//!
//! ## Features
//!
//! - **Readiness gating**: declare a substring; the process counts as ready
//!   when it first appears in the combined output
//! - **Start-check deadline**: a process that never becomes ready is killed
//!   and reported with its captured output attached
//! - **Signal forwarding**: deliver signals at any time; signals racing with
//!   process exit are silently dropped
//! - **Broadcast notifications**: any number of observers can await
//!   readiness or the terminal outcome, before or after the fact
//! - **Output capture**: the full combined output is retained for
//!   assertions and diagnostics
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use testvisor::{Process, Runner, RunnerConfig};
//! use tokio::process::Command;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let mut command = Command::new("my-server");
//! command.arg("--port").arg("8080");
//!
//! let config = RunnerConfig::new("my-server", command)
//!     .start_check("listening on")
//!     .start_check_timeout(Duration::from_secs(10));
//!
//! // blocks until the server reports readiness
//! let process = Process::start(Runner::new(config)).await;
//!
//! // ... exercise the server ...
//!
//! let outcome = process.interrupt(Duration::from_secs(5)).await;
//! assert!(outcome.is_ok());
//! # }
//! ```
//!
//! Unix only: signal delivery goes through `nix`.

#[cfg(not(unix))]
compile_error!("testvisor supports Unix targets only: supervision is built on POSIX signal delivery");

pub mod buffer;
pub mod config;
pub mod error;
pub mod process;
pub mod runner;
pub mod session;

pub use buffer::{MarkerWatch, OutputBuffer};
pub use config::{RunnerConfig, DEFAULT_START_CHECK_TIMEOUT};
pub use error::{RunOutcome, RunnerError};
pub use process::Process;
pub use runner::Runner;
pub use session::Session;

pub use nix::sys::signal::Signal;
