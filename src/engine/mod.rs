//! Script engines
//!
//! - `graph`: dependency tracking and evaluation order
//! - `library`: native class model and library resolution
//! - `interpreter`: expression evaluation
//! - `associative`: the incremental engine behind [`crate::LiveRunner`]

pub mod associative;
pub mod graph;
pub mod interpreter;
pub mod library;

pub use associative::AssociativeEngine;
pub use graph::{ContentHash, DependencyGraph, EvalStep};
pub use library::{ClassDef, LibrarySource, MethodDef, NativeLibrary, PropertyDef};

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ast::Stmt;
use crate::core::{MethodRef, Parameter, SymbolInfo, Value};
use crate::errors::Result;

/// What an update changed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateSummary {
    /// Names whose definition is new or different.
    pub defined: Vec<String>,
    /// Bindings re-evaluated, in evaluation order.
    pub evaluated: Vec<String>,
    /// Definitions identical to what the engine already had.
    pub skipped: Vec<String>,
    /// Libraries loaded by this update.
    pub imported: Vec<String>,
    /// Results of bare expression statements, in source order.
    pub values: Vec<Value>,
}

impl UpdateSummary {
    pub fn is_noop(&self) -> bool {
        self.defined.is_empty() && self.imported.is_empty() && self.values.is_empty()
    }

    /// Fold a later update into this one.
    pub fn merge(&mut self, other: UpdateSummary) {
        self.defined.extend(other.defined);
        self.evaluated.extend(other.evaluated);
        self.skipped.extend(other.skipped);
        self.imported.extend(other.imported);
        self.values.extend(other.values);
    }
}

/// State of one top-level binding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BindingState {
    pub name: String,
    pub code: String,
    pub value: Option<Value>,
    pub fault: Option<String>,
}

/// Structured view of everything an engine holds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub libraries: Vec<String>,
    pub functions: Vec<String>,
    pub bindings: Vec<BindingState>,
}

impl StateSnapshot {
    pub fn binding(&self, name: &str) -> Option<&BindingState> {
        self.bindings.iter().find(|b| b.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.libraries.is_empty() && self.functions.is_empty() && self.bindings.is_empty()
    }
}

impl fmt::Display for StateSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return writeln!(f, "// empty");
        }
        for library in &self.libraries {
            writeln!(f, "import(\"{}\");", library)?;
        }
        for function in &self.functions {
            writeln!(f, "{}", function)?;
        }
        for binding in &self.bindings {
            write!(f, "{} = {};", binding.name, binding.code)?;
            match (&binding.value, &binding.fault) {
                (_, Some(fault)) => writeln!(f, " // fault: {}", fault)?,
                (Some(value), None) => writeln!(f, " // {}", value)?,
                (None, None) => writeln!(f, " // pending")?,
            }
        }
        Ok(())
    }
}

/// A script engine the runner drives.
///
/// Every operation either succeeds or reports why; nothing is replaced by
/// a default value. Engines are used from one thread at a time.
pub trait ScriptEngine: Send {
    /// Parse and apply a code segment.
    fn evaluate(&mut self, code: &str) -> Result<UpdateSummary>;

    /// Apply a single already-built statement.
    fn submit(&mut self, stmt: &Stmt) -> Result<UpdateSummary>;

    /// Load libraries; either all resolve or none is loaded.
    fn import_libraries(&mut self, names: &[&str]) -> Result<Vec<SymbolInfo>>;

    fn inspect(&self, name: &str) -> Result<Value>;

    fn snapshot(&self) -> StateSnapshot;

    /// Human-readable state; never fails.
    fn dump_state(&self) -> String {
        self.snapshot().to_string()
    }

    /// Forget every definition, value and library.
    fn reset(&mut self);

    fn function_signature(&self, method: &MethodRef) -> Result<Vec<Parameter>>;

    /// Symbols of every imported library, in import order.
    fn symbols(&self) -> Vec<SymbolInfo>;
}
