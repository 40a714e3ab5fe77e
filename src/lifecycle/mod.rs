//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Submission:
//!     admit (gate open?) → in_flight += 1 → send to worker
//!
//! Shutdown:
//!     trigger → gate closed → Draining → in_flight == 0 → Stopped → worker exits
//!
//! Fatal error:
//!     fail → gate closed → Failed → worker exits, transfers abandoned
//! ```
//!
//! # Design Decisions
//! - Shutdown drains; it never aborts in-flight transfers
//! - Only the event loop decrements the in-flight counter

pub mod shutdown;

pub use shutdown::{Lifecycle, LoopState};
