//! Native callback glue for retrohost-core.
//!
//! Responsibilities:
//! - Define the `extern "C"` upcall trampolines handed to cores (`imports`).
//! - Keep the per-session closures those trampolines dispatch to alive (`registry`).
//! - Route each upcall to the session whose entry-point call is currently on the stack.

pub mod imports;
pub mod registry;

pub use registry::{ActiveGuard, CallbackRegistry};
