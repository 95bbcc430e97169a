//! Output capture and readiness detection
//!
//! [`OutputBuffer`] retains every byte a supervised process writes, so the
//! runner can watch for a readiness marker and attach the full output to
//! diagnostics. The buffer is append-only while supervision is active.

use std::future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;

/// Append-only capture buffer shared between the output pumps, the
/// readiness detector, and diagnostic reporting
///
/// Cloning yields another handle to the same buffer.
#[derive(Clone, Default)]
pub struct OutputBuffer {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    data: Vec<u8>,
    watches: Vec<Watch>,
    next_watch_id: u64,
}

struct Watch {
    id: u64,
    marker: Vec<u8>,
    tx: oneshot::Sender<()>,
}

impl OutputBuffer {
    /// Create an empty buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes and fire any watch whose marker is now present
    pub fn write(&self, bytes: &[u8]) {
        let fired = {
            let mut inner = self.lock();
            inner.data.extend_from_slice(bytes);
            let watches = std::mem::take(&mut inner.watches);
            let (fired, pending): (Vec<_>, Vec<_>) = watches
                .into_iter()
                .partition(|w| contains(&inner.data, &w.marker));
            inner.watches = pending;
            fired
        };
        for watch in fired {
            // the receiver may already be gone; a dropped watch is a cancel
            let _ = watch.tx.send(());
        }
    }

    /// Snapshot of everything written so far, lossily decoded
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.lock().data).into_owned()
    }

    /// Register a one-shot watch for `marker` appearing anywhere in the
    /// buffer
    ///
    /// Bytes already written count, so a marker that is already present
    /// yields an immediately satisfied watch, as does the empty marker.
    pub fn detect(&self, marker: &str) -> MarkerWatch {
        if marker.is_empty() {
            return MarkerWatch::satisfied();
        }

        let mut inner = self.lock();
        if contains(&inner.data, marker.as_bytes()) {
            return MarkerWatch::satisfied();
        }

        let id = inner.next_watch_id;
        inner.next_watch_id += 1;
        let (tx, rx) = oneshot::channel();
        inner.watches.push(Watch {
            id,
            marker: marker.as_bytes().to_vec(),
            tx,
        });

        MarkerWatch {
            satisfied: false,
            rx: Some(rx),
            registration: Some((self.clone(), id)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    needle.is_empty() || haystack.windows(needle.len()).any(|w| w == needle)
}

/// One-shot notification that a marker appeared in an [`OutputBuffer`]
pub struct MarkerWatch {
    satisfied: bool,
    rx: Option<oneshot::Receiver<()>>,
    registration: Option<(OutputBuffer, u64)>,
}

impl MarkerWatch {
    fn satisfied() -> Self {
        Self {
            satisfied: true,
            rx: None,
            registration: None,
        }
    }

    /// Resolve when the marker first appears
    ///
    /// Resolves immediately for an already satisfied watch; never resolves
    /// after [`cancel`](MarkerWatch::cancel). Cancel-safe.
    pub async fn wait(&mut self) {
        if self.satisfied {
            return;
        }
        if let Some(rx) = &mut self.rx {
            if rx.await.is_ok() {
                self.satisfied = true;
                self.rx = None;
                return;
            }
            self.rx = None;
        }
        // canceled, or the buffer went away without a match
        future::pending::<()>().await
    }

    /// Deregister the watch
    ///
    /// Before a match this permanently suppresses the notification; after a
    /// match it is a no-op.
    pub fn cancel(&mut self) {
        self.rx = None;
        if let Some((buffer, id)) = self.registration.take() {
            buffer.lock().watches.retain(|w| w.id != id);
        }
    }
}
