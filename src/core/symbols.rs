//! Symbol and signature metadata exposed to hosts.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use super::value::Value;

/// Declared type of a parameter or return value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueType {
    Var,
    Bool,
    Int,
    Double,
    String,
    Array,
    Class(Arc<str>),
}

impl ValueType {
    pub fn class(name: impl Into<Arc<str>>) -> Self {
        ValueType::Class(name.into())
    }

    /// Check `value` against this type, widening `int` to `double`.
    pub fn coerce(&self, value: Value) -> Option<Value> {
        match (self, value) {
            (ValueType::Var, v) => Some(v),
            (ValueType::Double, Value::Int(i)) => Some(Value::Double(i as f64)),
            (ValueType::Double, v @ Value::Double(_)) => Some(v),
            (ValueType::Int, v @ Value::Int(_)) => Some(v),
            (ValueType::Bool, v @ Value::Bool(_)) => Some(v),
            (ValueType::String, v @ Value::Str(_)) => Some(v),
            (ValueType::Array, v @ Value::Array(_)) => Some(v),
            (ValueType::Class(name), Value::Object(obj)) if obj.class == *name => {
                Some(Value::Object(obj))
            }
            _ => None,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Var => write!(f, "var"),
            ValueType::Bool => write!(f, "bool"),
            ValueType::Int => write!(f, "int"),
            ValueType::Double => write!(f, "double"),
            ValueType::String => write!(f, "string"),
            ValueType::Array => write!(f, "var[]"),
            ValueType::Class(name) => write!(f, "{}", name),
        }
    }
}

/// One formal parameter: name and declared type, kept together so the
/// two can never drift out of alignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub ty: ValueType,
}

impl Parameter {
    pub fn new(name: impl Into<String>, ty: ValueType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }

    /// Split into the parallel name/type sequences some hosts expect.
    /// Both vectors always have the same length.
    pub fn unzip(params: &[Parameter]) -> (Vec<String>, Vec<ValueType>) {
        params
            .iter()
            .map(|p| (p.name.clone(), p.ty.clone()))
            .unzip()
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.ty)
    }
}

/// Descriptor of a callable: `Class.Method` or a global function.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MethodRef {
    pub class: Option<String>,
    pub name: String,
}

impl MethodRef {
    pub fn function(name: impl Into<String>) -> Self {
        Self {
            class: None,
            name: name.into(),
        }
    }

    pub fn member(class: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            class: Some(class.into()),
            name: name.into(),
        }
    }

    /// Parse `Class.Method` or `function`.
    pub fn parse(text: &str) -> Self {
        match text.rsplit_once('.') {
            Some((class, name)) => Self::member(class, name),
            None => Self::function(text),
        }
    }
}

impl fmt::Display for MethodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.class {
            Some(class) => write!(f, "{}.{}", class, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SymbolKind {
    Class,
    Function,
    Variable,
}

/// A top-level object made available by a library import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolInfo {
    pub name: String,
    pub kind: SymbolKind,
    pub library: String,
    pub members: Vec<MethodRef>,
}

impl SymbolInfo {
    pub fn new(name: impl Into<String>, kind: SymbolKind, library: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            library: library.into(),
            members: Vec::new(),
        }
    }

    pub fn with_members(mut self, members: Vec<MethodRef>) -> Self {
        self.members = members;
        self
    }
}
