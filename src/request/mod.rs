//! Request data model.
//!
//! # Data Flow
//! ```text
//! HttpService::get / post
//!     → RequestDescriptor (spec + sink + CompletionAction)
//!     → RequestRegistry (worker side, keyed by TransferId)
//!     → completion scan: remove → CompletionAction::complete(Response)
//! ```

pub mod completion;
pub mod descriptor;
pub mod registry;

pub use completion::{Callback, CompletionAction, Deferred, Response};
pub use descriptor::RequestDescriptor;
pub use registry::RequestRegistry;
