//! Async process handle
//!
//! [`Process`] launches a [`Runner`] on its own tokio task and exposes the
//! observable surface of a supervised run: readiness, termination, signal
//! delivery, and the interrupt/kill teardown helpers.

use std::future;
use std::time::Duration;

use nix::sys::signal::Signal;
use tokio::sync::{mpsc, watch};

use crate::buffer::OutputBuffer;
use crate::error::RunOutcome;
use crate::runner::Runner;

/// Handle to a supervised process run
///
/// Readiness and termination are one-shot broadcast notifications: any
/// number of observers may await them, before or after the fact, and every
/// observer sees the same result.
pub struct Process {
    name: String,
    signals: mpsc::Sender<Signal>,
    ready: watch::Receiver<bool>,
    outcome: watch::Receiver<Option<RunOutcome>>,
    buffer: OutputBuffer,
}

impl Process {
    /// Launch the runner's control loop in the background; returns
    /// immediately
    pub fn spawn(runner: Runner) -> Self {
        let (signal_tx, signal_rx) = mpsc::channel(1);
        let (ready_tx, ready_rx) = watch::channel(false);
        let (outcome_tx, outcome_rx) = watch::channel(None);

        let name = runner.name().to_string();
        let buffer = runner.buffer();

        tokio::spawn(async move {
            let outcome = runner.run(signal_rx, ready_tx).await;
            // the outcome is stored before any waiter is woken
            let _ = outcome_tx.send(Some(outcome));
        });

        Self {
            name,
            signals: signal_tx,
            ready: ready_rx,
            outcome: outcome_rx,
            buffer,
        }
    }

    /// Launch the runner and wait until the process is ready
    ///
    /// Fail-fast setup helper: if the run reaches a terminal state before
    /// readiness, the surrounding scenario cannot proceed.
    ///
    /// # Panics
    ///
    /// Panics if the process fails to start or exits before becoming ready.
    pub async fn start(runner: Runner) -> Self {
        let process = Self::spawn(runner);

        tokio::select! {
            // readiness wins when both have already resolved
            biased;
            _ = process.ready() => {}
            outcome = process.wait() => match outcome {
                Err(err) => panic!(
                    "runner '{}' cannot start a process because of failure: {err}",
                    process.name
                ),
                Ok(()) => panic!("runner '{}' exited before becoming ready", process.name),
            },
        }

        process
    }

    /// Configured label
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Wait until the process has signalled readiness
    ///
    /// Resolves immediately if readiness already fired; never resolves if
    /// the run terminated without becoming ready (observe that through
    /// [`wait`](Process::wait)). Safe to call any number of times.
    pub async fn ready(&self) {
        let mut ready = self.ready.clone();
        if ready.wait_for(|ready| *ready).await.is_err() {
            future::pending::<()>().await;
        }
    }

    /// Wait for the terminal outcome of the run
    ///
    /// Every caller observes the identical outcome, whether it subscribes
    /// before or after the process exits.
    pub async fn wait(&self) -> RunOutcome {
        let mut outcome = self.outcome.clone();
        // bound to a local so the watch guard is released before `outcome`
        // goes out of scope
        let result = match outcome.wait_for(|outcome| outcome.is_some()).await {
            Ok(value) => match &*value {
                Some(outcome) => outcome.clone(),
                None => unreachable!("wait_for only returns once the outcome is set"),
            },
            Err(_) => panic!(
                "runner '{}' task terminated without reporting an outcome",
                self.name
            ),
        };
        result
    }

    /// Terminal outcome, if the run has already finished
    pub fn try_outcome(&self) -> Option<RunOutcome> {
        self.outcome.borrow().clone()
    }

    /// Snapshot of everything the process has written so far
    pub fn output(&self) -> String {
        self.buffer.contents()
    }

    /// Asynchronously deliver a signal to the process
    ///
    /// Never blocks and never errors; a signal racing with process exit is
    /// silently dropped.
    pub fn signal(&self, sig: Signal) {
        let signals = self.signals.clone();
        let mut outcome = self.outcome.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = signals.send(sig) => {}
                _ = outcome.wait_for(|outcome| outcome.is_some()) => {}
            }
        });
    }

    /// Send SIGINT and wait for the process to exit
    ///
    /// # Panics
    ///
    /// Panics if the process does not exit within `timeout`; teardown
    /// helpers treat a hung process as a fatal test failure.
    pub async fn interrupt(&self, timeout: Duration) -> RunOutcome {
        self.signal(Signal::SIGINT);
        self.wait_or_abort("SIGINT", timeout).await
    }

    /// Send SIGKILL and wait for the process to exit
    ///
    /// # Panics
    ///
    /// Panics if the process does not exit within `timeout`.
    pub async fn kill(&self, timeout: Duration) -> RunOutcome {
        self.signal(Signal::SIGKILL);
        self.wait_or_abort("SIGKILL", timeout).await
    }

    async fn wait_or_abort(&self, signal: &str, timeout: Duration) -> RunOutcome {
        match tokio::time::timeout(timeout, self.wait()).await {
            Ok(outcome) => outcome,
            Err(_) => panic!(
                "process '{}' failed to exit within {timeout:?} after {signal}",
                self.name
            ),
        }
    }
}
