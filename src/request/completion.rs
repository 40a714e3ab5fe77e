//! Completion actions and the values they deliver.
//!
//! A request completes in one of two ways: resolving a `Deferred` handle the
//! caller holds, or invoking a callback on the worker thread. Both variants
//! are consumed by `CompletionAction::complete`, so a request can never be
//! completed twice.

use std::borrow::Cow;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::error::{Error, Result};
use crate::transport::TransferStatus;

/// The outcome of one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// HTTP status, if a response head was received.
    pub status: Option<u16>,
    /// Every body byte received, even if the transfer failed midway.
    pub body: Vec<u8>,
    /// Why the transfer stopped early, if it did.
    pub failure: Option<String>,
}

impl Response {
    pub(crate) fn from_transfer(body: Vec<u8>, status: TransferStatus) -> Self {
        match status {
            TransferStatus::Done { status } => Self {
                status: Some(status),
                body,
                failure: None,
            },
            TransferStatus::Failed { status, reason } => Self {
                status,
                body,
                failure: Some(reason),
            },
        }
    }

    pub(crate) fn rejected(err: &Error) -> Self {
        Self {
            status: None,
            body: Vec::new(),
            failure: Some(err.to_string()),
        }
    }

    /// Body as text, replacing invalid UTF-8.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    pub fn into_text(self) -> String {
        match String::from_utf8(self.body) {
            Ok(text) => text,
            Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
        }
    }

    /// Transfer finished and the status is 2xx.
    pub fn is_success(&self) -> bool {
        self.failure.is_none() && matches!(self.status, Some(200..=299))
    }
}

/// Callback invoked with the final response.
pub type Callback = Box<dyn FnOnce(Response) + Send + 'static>;

/// What to do once a request's transfer finishes.
pub enum CompletionAction {
    Deferred(oneshot::Sender<Response>),
    Callback(Callback),
}

impl CompletionAction {
    /// Future-style action plus the handle the caller keeps.
    pub fn deferred() -> (Self, Deferred) {
        let (tx, rx) = oneshot::channel();
        (Self::Deferred(tx), Deferred { rx })
    }

    pub fn callback<F>(on_done: F) -> Self
    where
        F: FnOnce(Response) + Send + 'static,
    {
        Self::Callback(Box::new(on_done))
    }

    /// Deliver the response. Returns `false` if nobody observed it.
    ///
    /// A panicking callback is caught and logged.
    pub fn complete(self, response: Response) -> bool {
        match self {
            CompletionAction::Deferred(tx) => {
                let delivered = tx.send(response).is_ok();
                if !delivered {
                    tracing::debug!("Deferred handle dropped before completion");
                }
                delivered
            }
            CompletionAction::Callback(on_done) => {
                match panic::catch_unwind(AssertUnwindSafe(move || on_done(response))) {
                    Ok(()) => true,
                    Err(_) => {
                        tracing::error!("Completion callback panicked");
                        false
                    }
                }
            }
        }
    }
}

impl std::fmt::Debug for CompletionAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompletionAction::Deferred(_) => f.write_str("Deferred"),
            CompletionAction::Callback(_) => f.write_str("Callback"),
        }
    }
}

/// One-shot handle to a request's response.
///
/// Await it from async code, or call [`Deferred::wait`] from a plain thread.
/// Resolves to `Err(Error::Abandoned)` if the worker dropped the request
/// without completing it.
#[derive(Debug)]
pub struct Deferred {
    rx: oneshot::Receiver<Response>,
}

impl Deferred {
    /// Block the current thread until the response arrives.
    ///
    /// Panics if called from within an async runtime; `.await` it there.
    pub fn wait(self) -> Result<Response> {
        self.rx.blocking_recv().map_err(|_| Error::Abandoned)
    }

    /// Take the response if it is already available.
    pub fn try_take(&mut self) -> Option<Result<Response>> {
        match self.rx.try_recv() {
            Ok(response) => Some(Ok(response)),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(Error::Abandoned)),
        }
    }
}

impl Future for Deferred {
    type Output = Result<Response>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|r| r.map_err(|_| Error::Abandoned))
    }
}
