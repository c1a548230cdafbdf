//! Core value and symbol types
//!
//! Everything that crosses the runner boundary is expressed in these types.

pub mod value;
pub mod symbols;

pub use value::{Value, ObjectValue};
pub use symbols::{ValueType, Parameter, MethodRef, SymbolKind, SymbolInfo};
