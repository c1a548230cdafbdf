//! Host-facing integration points
//!
//! - `bridge`: opaque host handles and the capability that resolves them
//! - `context`: external context data providers
//! - `session`: execution session (configuration, file search) and
//!   extension lifecycle hooks
//! - `trace`: per-thread trace data carried onto the async worker

pub mod bridge;
pub mod context;
pub mod session;
pub mod trace;

pub use bridge::{HostBridge, HostHandle, HostRegistry, NullBridge};
pub use context::{ContextData, ContextDataProvider, ContextParameters, ContextProviders};
pub use session::{ExecutionSession, ExtensionApplication, SCRIPT_EXTENSION};
pub use trace::{TraceData, TraceGuard, TraceValue};
