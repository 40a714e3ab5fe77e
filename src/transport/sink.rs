//! Response byte sink shared between a request and its transfer.
//!
//! The transport appends bytes as they arrive; the event loop takes the
//! accumulated buffer once the transfer completes.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::Error;

/// Append-only buffer for one transfer's response body.
#[derive(Debug, Clone, Default)]
pub struct ResponseSink {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl ResponseSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk of received bytes.
    ///
    /// Always returns `data.len()`. If the buffer cannot grow the chunk is
    /// dropped and the failure is logged; the transfer keeps going.
    pub fn write(&self, data: &[u8]) -> usize {
        let mut buf = self.lock();
        match buf.try_reserve(data.len()) {
            Ok(()) => buf.extend_from_slice(data),
            Err(e) => {
                let err = Error::SinkAppend {
                    len: data.len(),
                    reason: e.to_string(),
                };
                tracing::warn!(error = %err, buffered = buf.len(), "Dropping response chunk");
            }
        }
        data.len()
    }

    /// Number of bytes buffered so far.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Move the buffered bytes out, leaving the sink empty.
    pub fn take(&self) -> Vec<u8> {
        std::mem::take(&mut *self.lock())
    }

    // A panic while holding the lock cannot leave the Vec in a torn state.
    fn lock(&self) -> MutexGuard<'_, Vec<u8>> {
        self.buf.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
