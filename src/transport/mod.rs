//! Transport subsystem: the multiplexing capability consumed by the event loop.
//!
//! # Data Flow
//! ```text
//! HttpService::submit
//!     → TransferSpec (validated method, URL, headers, body)
//!     → submission channel
//!
//! Event loop:
//!     create_transfer(spec, sink) → TransferId
//!     add(id)                     → transfer starts progressing
//!     perform / wait              → bytes flow into ResponseSink
//!     next_completion             → CompletionMessage { id, status }
//!     remove(id) + release(id)    → handle gone
//! ```
//!
//! # Design Decisions
//! - The event loop only sees the `Multiplexer` trait, never a concrete transport
//! - `http.rs` is the production transport (reqwest on a current-thread runtime)
//! - `scripted.rs` is an in-memory transport for tests and fault injection

pub mod http;
pub mod scripted;
pub mod sink;

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use url::Url;

use crate::error::{Error, Result};

pub use http::HttpMultiplexer;
pub use scripted::{ScriptedMultiplexer, ScriptedProbe, ScriptedReply};
pub use sink::ResponseSink;

/// Global counter for transfer IDs.
/// Relaxed ordering is enough, only uniqueness matters.
static TRANSFER_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Identity of one transfer inside a multiplexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransferId(u64);

impl TransferId {
    /// Allocate a new unique transfer ID.
    pub fn next() -> Self {
        Self(TRANSFER_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Wrap a raw value. Only useful for transports and tests.
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for TransferId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "transfer-{}", self.0)
    }
}

/// HTTP method of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything a transport needs to start one HTTP exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferSpec {
    method: Method,
    url: Url,
    headers: Vec<(String, String)>,
    body: Option<String>,
}

impl TransferSpec {
    /// Validate the URL and build a spec.
    ///
    /// Only `http` and `https` URLs are accepted. POST requests always carry
    /// `content-type: application/json`.
    pub fn new(method: Method, url: &str, body: Option<String>) -> Result<Self> {
        let parsed = Url::parse(url).map_err(|e| Error::transfer_init(url, e))?;
        match parsed.scheme() {
            "http" | "https" => {}
            other => {
                return Err(Error::transfer_init(
                    url,
                    format!("unsupported scheme `{other}`"),
                ))
            }
        }

        let (headers, body) = match method {
            Method::Get => (Vec::new(), None),
            Method::Post => (
                vec![("content-type".to_string(), "application/json".to_string())],
                Some(body.unwrap_or_default()),
            ),
        };

        Ok(Self {
            method,
            url: parsed,
            headers,
            body,
        })
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn body(&self) -> Option<&str> {
        self.body.as_deref()
    }
}

/// Final status of a transfer as reported by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferStatus {
    /// The body was received completely.
    Done { status: u16 },
    /// The transfer stopped early. `status` is set if a response head arrived.
    Failed { status: Option<u16>, reason: String },
}

/// A "transfer finished" message read from the multiplexer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionMessage {
    pub id: TransferId,
    pub status: TransferStatus,
}

/// Outcome of a readiness wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// At least one transfer made progress or finished.
    Ready,
    /// The timeout elapsed without activity.
    TimedOut,
    /// The transport has nothing to wait on.
    Idle,
}

/// The non-blocking multiplexing capability driven by the event loop.
///
/// All methods are called from the worker thread only.
pub trait Multiplexer: Send {
    /// Allocate and configure a transfer. It does not progress until `add`.
    fn create_transfer(&mut self, spec: TransferSpec, sink: ResponseSink) -> Result<TransferId>;

    /// Register a created transfer with the multiplexer.
    fn add(&mut self, id: TransferId) -> Result<()>;

    /// Perform pending non-blocking I/O. Returns the number of running transfers.
    fn perform(&mut self) -> usize;

    /// Suggested upper bound for the next readiness wait.
    fn timeout(&self) -> Option<Duration>;

    /// Block until a transfer is ready or `timeout` elapses.
    fn wait(&mut self, timeout: Duration) -> Result<Readiness>;

    /// Read the next completion message, if any.
    fn next_completion(&mut self) -> Option<CompletionMessage>;

    /// Unregister a transfer from the multiplexer.
    fn remove(&mut self, id: TransferId);

    /// Release every resource held for a transfer.
    fn release(&mut self, id: TransferId);
}

impl<M: Multiplexer + ?Sized> Multiplexer for Box<M> {
    fn create_transfer(&mut self, spec: TransferSpec, sink: ResponseSink) -> Result<TransferId> {
        (**self).create_transfer(spec, sink)
    }

    fn add(&mut self, id: TransferId) -> Result<()> {
        (**self).add(id)
    }

    fn perform(&mut self) -> usize {
        (**self).perform()
    }

    fn timeout(&self) -> Option<Duration> {
        (**self).timeout()
    }

    fn wait(&mut self, timeout: Duration) -> Result<Readiness> {
        (**self).wait(timeout)
    }

    fn next_completion(&mut self) -> Option<CompletionMessage> {
        (**self).next_completion()
    }

    fn remove(&mut self, id: TransferId) {
        (**self).remove(id)
    }

    fn release(&mut self, id: TransferId) {
        (**self).release(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transfer_ids_are_unique() {
        let a = TransferId::next();
        let b = TransferId::next();
        assert_ne!(a, b);
        assert_eq!(format!("{}", TransferId::from_raw(3)), "transfer-3");
    }

    #[test]
    fn get_spec_has_no_body_or_headers() {
        let spec = TransferSpec::new(Method::Get, "http://localhost:3000/a", None).unwrap();
        assert_eq!(spec.method(), Method::Get);
        assert_eq!(spec.url().as_str(), "http://localhost:3000/a");
        assert!(spec.headers().is_empty());
        assert!(spec.body().is_none());
    }

    #[test]
    fn post_spec_always_sets_json_content_type() {
        let spec = TransferSpec::new(Method::Post, "https://x/echo", Some("{}".into())).unwrap();
        assert_eq!(
            spec.headers(),
            &[("content-type".to_string(), "application/json".to_string())]
        );
        assert_eq!(spec.body(), Some("{}"));
    }

    #[test]
    fn post_without_body_sends_empty_body() {
        let spec = TransferSpec::new(Method::Post, "http://x/", None).unwrap();
        assert_eq!(spec.body(), Some(""));
    }

    #[test]
    fn unparsable_url_is_a_transfer_init_error() {
        let err = TransferSpec::new(Method::Get, "not a url", None).unwrap_err();
        assert!(matches!(err, Error::TransferInit { .. }));
    }

    #[test]
    fn non_http_scheme_is_rejected() {
        let err = TransferSpec::new(Method::Get, "ftp://example.com/file", None).unwrap_err();
        match err {
            Error::TransferInit { url, reason } => {
                assert_eq!(url, "ftp://example.com/file");
                assert!(reason.contains("ftp"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
