//! Process execution primitive
//!
//! [`Session`] wraps a spawned child process together with its capture
//! buffer. Both output streams are pumped into the buffer as they arrive and
//! complete lines are forwarded through `tracing` under the
//! `testvisor::output` target, labelled with the runner name.

use std::io;
use std::os::unix::process::ExitStatusExt;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::buffer::OutputBuffer;

/// How long to wait, per stream, for the output pumps to flush after the
/// process is gone
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_millis(100);

/// A live supervised process
pub struct Session {
    child: Child,
    pid: u32,
    buffer: OutputBuffer,
    pumps: Vec<JoinHandle<()>>,
}

impl Session {
    /// Spawn `command` with piped stdout/stderr feeding `buffer`
    pub fn spawn(name: &str, mut command: Command, buffer: OutputBuffer) -> io::Result<Self> {
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = command.spawn()?;
        let pid = child.id().unwrap_or(0);

        let mut pumps = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            pumps.push(tokio::spawn(pump(
                stdout,
                buffer.clone(),
                name.to_string(),
                "stdout",
            )));
        }
        if let Some(stderr) = child.stderr.take() {
            pumps.push(tokio::spawn(pump(
                stderr,
                buffer.clone(),
                name.to_string(),
                "stderr",
            )));
        }

        Ok(Self {
            child,
            pid,
            buffer,
            pumps,
        })
    }

    /// OS process id
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Handle to the capture buffer
    pub fn buffer(&self) -> OutputBuffer {
        self.buffer.clone()
    }

    /// Deliver a signal to the process
    ///
    /// A signal aimed at an already-dead process is not an error.
    pub fn signal(&self, sig: Signal) {
        match signal::kill(Pid::from_raw(self.pid as i32), sig) {
            Ok(()) | Err(Errno::ESRCH) => {}
            Err(err) => {
                warn!(pid = self.pid, signal = %sig, error = %err, "failed to deliver signal");
            }
        }
    }

    /// Wait for the process to exit
    ///
    /// Cancel-safe; usable inside `select!`.
    pub async fn wait(&mut self) -> io::Result<ExitStatus> {
        self.child.wait().await
    }

    /// Forcibly terminate the process and wait for it to die
    pub async fn kill_and_wait(&mut self) {
        if let Err(err) = self.child.start_kill() {
            warn!(pid = self.pid, error = %err, "failed to kill process");
        }
        let _ = self.child.wait().await;
    }

    /// Let the output pumps finish flushing into the buffer
    ///
    /// Bytes already read from the pipes but not yet written to the buffer
    /// would otherwise be missing from diagnostic snapshots taken right
    /// after the process dies. Bounded per stream; a pump that is somehow
    /// stuck is abandoned, not joined forever.
    pub async fn drain_output(&mut self) {
        for pump in self.pumps.drain(..) {
            let _ = tokio::time::timeout(OUTPUT_DRAIN_TIMEOUT, pump).await;
        }
    }
}

/// Map an exit status to a concrete code; a signal death becomes
/// `128 + signo` (shell convention)
pub(crate) fn exit_code(status: ExitStatus) -> i32 {
    status
        .code()
        .unwrap_or_else(|| 128 + status.signal().unwrap_or(0))
}

async fn pump(
    mut reader: impl AsyncRead + Unpin,
    buffer: OutputBuffer,
    name: String,
    stream: &'static str,
) {
    let mut chunk = [0u8; 4096];
    let mut line: Vec<u8> = Vec::new();

    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                buffer.write(&chunk[..n]);
                line.extend_from_slice(&chunk[..n]);
                while let Some(pos) = line.iter().position(|&b| b == b'\n') {
                    let rest = line.split_off(pos + 1);
                    let text = String::from_utf8_lossy(&line).trim_end().to_string();
                    line = rest;
                    if !text.is_empty() {
                        debug!(target: "testvisor::output", name = %name, stream, "{text}");
                    }
                }
            }
            Err(err) => {
                warn!(name = %name, stream, error = %err, "error reading process output");
                break;
            }
        }
    }

    let text = String::from_utf8_lossy(&line).trim_end().to_string();
    if !text.is_empty() {
        debug!(target: "testvisor::output", name = %name, stream, "{text}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> Command {
        let mut command = Command::new("sh");
        command.arg("-c").arg(script);
        command
    }

    #[tokio::test]
    async fn test_spawn_and_wait() {
        let mut session = Session::spawn("t", sh("exit 0"), OutputBuffer::new()).unwrap();
        assert!(session.pid() > 0);

        let status = session.wait().await.unwrap();
        assert_eq!(exit_code(status), 0);
    }

    #[tokio::test]
    async fn test_spawn_failure() {
        let command = Command::new("/definitely/not/a/real/binary");
        assert!(Session::spawn("t", command, OutputBuffer::new()).is_err());
    }

    #[tokio::test]
    async fn test_output_reaches_buffer() {
        let buffer = OutputBuffer::new();
        let mut watch = buffer.detect("hello");

        let mut session = Session::spawn("t", sh("printf hello"), buffer).unwrap();
        watch.wait().await;

        session.wait().await.unwrap();
        assert!(session.buffer().contents().contains("hello"));
    }

    #[tokio::test]
    async fn test_kill_and_wait() {
        let mut session = Session::spawn("t", sh("sleep 30"), OutputBuffer::new()).unwrap();
        session.kill_and_wait().await;
    }

    #[tokio::test]
    async fn test_exit_code_for_signal_death() {
        let mut session = Session::spawn("t", sh("kill -TERM $$"), OutputBuffer::new()).unwrap();
        let status = session.wait().await.unwrap();
        assert_eq!(exit_code(status), 128 + Signal::SIGTERM as i32);
    }
}
