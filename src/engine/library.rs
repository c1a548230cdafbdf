//! Library model: native classes exposed to scripts, and resolution of
//! library names to native or script libraries.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::ast::Program;
use crate::builtins;
use crate::core::{MethodRef, Parameter, SymbolInfo, SymbolKind, Value, ValueType};
use crate::errors::{Result, RunnerError};
use crate::host::ExecutionSession;

/// Native method body: receiver (`None` for static members) and
/// already-coerced arguments.
pub type NativeFn = fn(Option<&Value>, &[Value]) -> Result<Value>;

pub struct MethodDef {
    pub name: &'static str,
    pub params: Vec<Parameter>,
    pub returns: ValueType,
    pub is_static: bool,
    pub body: NativeFn,
}

impl MethodDef {
    pub fn new(name: &'static str, params: Vec<Parameter>, returns: ValueType, body: NativeFn) -> Self {
        Self {
            name,
            params,
            returns,
            is_static: false,
            body,
        }
    }

    pub fn static_method(
        name: &'static str,
        params: Vec<Parameter>,
        returns: ValueType,
        body: NativeFn,
    ) -> Self {
        Self {
            is_static: true,
            ..Self::new(name, params, returns, body)
        }
    }

    pub fn returning(mut self, returns: ValueType) -> Self {
        self.returns = returns;
        self
    }

    /// Check arity and coerce `args` to the declared parameter types.
    pub fn bind_args(&self, class: &str, args: Vec<Value>) -> Result<Vec<Value>> {
        if args.len() != self.params.len() {
            return Err(RunnerError::engine_fault(format!(
                "{}.{} takes {} argument(s), got {}",
                class,
                self.name,
                self.params.len(),
                args.len()
            )));
        }

        self.params
            .iter()
            .zip(args)
            .map(|(param, arg)| {
                let found = arg.type_name().to_string();
                param.ty.coerce(arg).ok_or_else(|| {
                    RunnerError::engine_fault(format!(
                        "{}.{} expects {} for '{}', got {}",
                        class, self.name, param.ty, param.name, found
                    ))
                })
            })
            .collect()
    }

    pub fn invoke(&self, class: &str, receiver: Option<&Value>, args: Vec<Value>) -> Result<Value> {
        let args = self.bind_args(class, args)?;
        (self.body)(receiver, &args)
    }
}

impl fmt::Debug for MethodDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodDef")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("returns", &self.returns)
            .field("is_static", &self.is_static)
            .finish()
    }
}

pub struct PropertyDef {
    pub name: &'static str,
    pub returns: ValueType,
    pub is_static: bool,
    pub getter: NativeFn,
}

impl PropertyDef {
    pub fn new(name: &'static str, returns: ValueType, getter: NativeFn) -> Self {
        Self {
            name,
            returns,
            is_static: false,
            getter,
        }
    }

    pub fn static_property(name: &'static str, returns: ValueType, getter: NativeFn) -> Self {
        Self {
            is_static: true,
            ..Self::new(name, returns, getter)
        }
    }
}

impl fmt::Debug for PropertyDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyDef")
            .field("name", &self.name)
            .field("returns", &self.returns)
            .field("is_static", &self.is_static)
            .finish()
    }
}

#[derive(Debug)]
pub struct ClassDef {
    pub name: &'static str,
    pub methods: Vec<MethodDef>,
    pub properties: Vec<PropertyDef>,
}

impl ClassDef {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            methods: Vec::new(),
            properties: Vec::new(),
        }
    }

    pub fn method(mut self, method: MethodDef) -> Self {
        self.methods.push(method);
        self
    }

    pub fn property(mut self, property: PropertyDef) -> Self {
        self.properties.push(property);
        self
    }

    pub fn find_method(&self, name: &str) -> Option<&MethodDef> {
        self.methods.iter().find(|m| m.name == name)
    }

    pub fn find_property(&self, name: &str) -> Option<&PropertyDef> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub fn member_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.methods
            .iter()
            .map(|m| m.name)
            .chain(self.properties.iter().map(|p| p.name))
    }

    pub fn symbol(&self, library: &str) -> SymbolInfo {
        let members = self
            .member_names()
            .map(|member| MethodRef::member(self.name, member))
            .collect();
        SymbolInfo::new(self.name, SymbolKind::Class, library).with_members(members)
    }
}

#[derive(Debug)]
pub struct NativeLibrary {
    pub name: &'static str,
    pub classes: Vec<ClassDef>,
}

impl NativeLibrary {
    pub fn symbols(&self) -> Vec<SymbolInfo> {
        self.classes.iter().map(|class| class.symbol(self.name)).collect()
    }
}

/// A library name resolved to something the engine can load.
#[derive(Debug, Clone)]
pub enum LibrarySource {
    Native(&'static NativeLibrary),
    Script {
        name: String,
        path: PathBuf,
        program: Arc<Program>,
    },
}

impl LibrarySource {
    pub fn name(&self) -> &str {
        match self {
            LibrarySource::Native(lib) => lib.name,
            LibrarySource::Script { name, .. } => name,
        }
    }
}

/// Resolve `name` to a native library, or to a script file found through
/// the session. `parse` turns the file's text into a program.
pub fn resolve_library<F>(name: &str, session: &ExecutionSession, parse: F) -> Result<LibrarySource>
where
    F: FnOnce(&str) -> Result<Arc<Program>>,
{
    if let Some(native) = builtins::find_library(name) {
        return Ok(LibrarySource::Native(native));
    }

    let path = session
        .search_file(name)
        .ok_or_else(|| not_found(name))?;

    let source = std::fs::read_to_string(&path).map_err(|e| {
        tracing::warn!(path = %path.display(), "cannot read script library: {}", e);
        RunnerError::library_not_found(name)
            .with_suggestion(format!("{} could not be read: {}", path.display(), e))
    })?;

    let program = parse(&source)?;
    tracing::debug!(library = name, path = %path.display(), "resolved script library");
    Ok(LibrarySource::Script {
        name: name.to_string(),
        path,
        program,
    })
}

fn not_found(name: &str) -> RunnerError {
    let similar = crate::errors::find_similar_names(name, builtins::library_names(), 2);
    let err = RunnerError::library_not_found(name);
    match similar.first() {
        Some(candidate) => err.with_suggestion(format!("Did you mean '{}'?", candidate)),
        None => err,
    }
}
