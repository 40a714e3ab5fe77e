//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Service, event loop, transports produce:
//!     → tracing events with structured fields
//!       (request_id, transfer_id, url, in_flight)
//!
//! Consumers:
//!     → logging.rs subscriber (stdout, text or JSON)
//! ```

pub mod logging;

pub use logging::init_logging;
