//! Request service subsystem.
//!
//! # Data Flow
//! ```text
//! caller thread                       worker thread
//! ─────────────                       ─────────────
//! HttpService::get/post
//!     → TransferSpec::new (validate)
//!     → Lifecycle::admit (gate, in_flight += 1)
//!     → mpsc send ──────────────────▶ EventLoop::intake
//!                                         → create/add/perform
//!                                         → RequestRegistry::insert
//!                                     EventLoop::scan_completions
//!     Deferred / callback ◀────────────   → CompletionAction::complete
//! ```

mod event_loop;

pub mod client;

pub use client::HttpService;
