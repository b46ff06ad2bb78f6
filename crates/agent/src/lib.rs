//! Query understanding and dispatch.
//!
//! A query flows through the crate in one pass:
//! 1. **Intent** (`intent`) - query type and candidate tool set
//! 2. **Entities** (`entities`) - arguments for the selected tools
//! 3. **Dispatch** (`tools`, `home`) - tool execution against collaborators
//! 4. **Composition** (`runtime`, `highlight`) - reply text, trace and the
//!    highlighted display copy
//!
//! Every decision is appended to a [`trace::TraceRecorder`] so the caller can
//! show why a reply was produced.

pub mod collaborators;
pub mod entities;
pub mod highlight;
pub mod home;
pub mod intent;
pub mod math;
pub mod runtime;
pub mod tools;
pub mod trace;
pub mod vocabulary;

pub use collaborators::Collaborators;
pub use runtime::{QueryResponse, QueryRouter};
