//! Asynchronous HTTP client service.
//!
//! Callers submit GET/POST requests from any thread and get back a
//! [`Deferred`] handle or a callback invocation; a single background worker
//! multiplexes every transfer over non-blocking I/O.
//!
//! ```no_run
//! use http_service::{HttpService, ServiceConfig};
//!
//! # fn main() -> Result<(), http_service::Error> {
//! let service = HttpService::new(ServiceConfig::default())?;
//! let page = service.get("http://example.com/")?;
//! service.get_with("http://example.com/about", |response| {
//!     println!("about: {} bytes", response.body.len());
//! })?;
//! println!("{}", page.wait()?.text());
//! service.shutdown()?;
//! # Ok(())
//! # }
//! ```

// Core subsystems
pub mod request;
pub mod service;
pub mod transport;

// Cross-cutting concerns
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod observability;

pub use config::ServiceConfig;
pub use error::{Error, Result};
pub use lifecycle::LoopState;
pub use request::{Deferred, Response};
pub use service::HttpService;
