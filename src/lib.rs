//! liverunner: a live, incrementally re-evaluating script runner
//!
//! A host pushes script segments or programmatically built AST nodes into a
//! [`LiveRunner`]; the engine keeps every `name = expr` as a standing
//! definition and re-evaluates only what a change affects.
//!
//! ```no_run
//! use liverunner::{LiveRunner, RunnerConfig, Value};
//!
//! let runner = LiveRunner::new(RunnerConfig::default())?;
//! runner.import_libraries(&["Math"])?;
//! runner.update("x = Math.Sqrt(4);")?;
//! assert_eq!(runner.inspect("x")?, Value::Double(2.0));
//! # Ok::<(), liverunner::RunnerError>(())
//! ```

// Core modules
pub mod core;
pub mod errors;
pub mod frontend;
pub mod ast;
pub mod engine;
pub mod builtins;
pub mod host;
pub mod runner;
pub mod infrastructure;
pub mod ffi;

// Re-export commonly used items
pub use self::core::{MethodRef, Parameter, SymbolInfo, SymbolKind, Value, ValueType};
pub use errors::{ErrorKind, Result, RunnerError, SourceLocation};
pub use frontend::{parse_expression, parse_program, ConfigurationKeys, RunnerConfig};
pub use ast::{AstBuilder, AstNode, CallSite, NodeId, NodeKind};
pub use engine::{AssociativeEngine, ScriptEngine, StateSnapshot, UpdateSummary};
pub use host::{
    ContextData, ContextDataProvider, ContextParameters, ExecutionSession, ExtensionApplication,
    HostBridge, HostHandle, HostRegistry,
};
pub use runner::{LiveRunner, LiveRunnerBuilder, RunnerEvent, UpdateListener, UpdateTicket};
pub use infrastructure::{init_logging, LogConfig, RunnerMetrics};
