//! Incremental associative engine
//!
//! Every `name = expr` is a standing definition. An update changes some
//! definitions; only those and their transitive dependents are evaluated
//! again, in dependency order.

use lru::LruCache;
use std::collections::{HashMap, HashSet};
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use super::graph::{ContentHash, DependencyGraph, EntryKind, EvalStep};
use super::interpreter::{Environment, Interpreter};
use super::library::{resolve_library, ClassDef, LibrarySource, NativeLibrary};
use super::{BindingState, ScriptEngine, StateSnapshot, UpdateSummary};
use crate::ast::{DependencyCollector, Expr, FunctionDef, Program, Stmt, StmtKind};
use crate::builtins;
use crate::core::{MethodRef, Parameter, SymbolInfo, SymbolKind, Value, ValueType};
use crate::errors::{Result, RunnerError, SourceLocation};
use crate::frontend::parser::parse_program;
use crate::host::ExecutionSession;

#[derive(Debug)]
struct Binding {
    expr: Expr,
    code: String,
    value: Option<Result<Value>>,
}

#[derive(Debug, Clone)]
struct ImportedLibrary {
    name: String,
    path: Option<PathBuf>,
    symbols: Vec<SymbolInfo>,
}

/// Work collected while applying a program, before evaluation.
#[derive(Default)]
struct Pending<'p> {
    changed: Vec<String>,
    expressions: Vec<&'p Expr>,
    summary: UpdateSummary,
}

pub struct AssociativeEngine {
    session: ExecutionSession,
    graph: DependencyGraph,
    bindings: HashMap<String, Binding>,
    functions: HashMap<String, Arc<FunctionDef>>,
    classes: HashMap<String, &'static ClassDef>,
    libraries: Vec<ImportedLibrary>,
    parse_cache: Option<LruCache<ContentHash, Arc<Program>>>,
    max_call_depth: usize,
}

impl AssociativeEngine {
    pub fn new(session: ExecutionSession) -> Self {
        let engine_config = &session.configuration().engine;
        let parse_cache = NonZeroUsize::new(engine_config.parse_cache_size).map(LruCache::new);
        let max_call_depth = engine_config.max_call_depth;

        Self {
            session,
            graph: DependencyGraph::new(),
            bindings: HashMap::new(),
            functions: HashMap::new(),
            classes: HashMap::new(),
            libraries: Vec::new(),
            parse_cache,
            max_call_depth,
        }
    }

    pub fn session(&self) -> &ExecutionSession {
        &self.session
    }

    /// File a script library was loaded from; `None` for native libraries.
    pub fn library_path(&self, name: &str) -> Option<&std::path::Path> {
        self.imported(name)?.path.as_deref()
    }

    /// Parse `source`, reusing an earlier parse of identical text.
    fn parse_cached(&mut self, source: &str) -> Result<Arc<Program>> {
        let hash = ContentHash::of(source);
        if let Some(program) = self.parse_cache.as_mut().and_then(|cache| cache.get(&hash)) {
            debug!(hash = %hash.short(), "parse cache hit");
            return Ok(program.clone());
        }

        let program = Arc::new(parse_program(source)?);
        if let Some(cache) = self.parse_cache.as_mut() {
            cache.put(hash, program.clone());
        }
        Ok(program)
    }

    fn canonical_library_name(name: &str) -> String {
        builtins::find_library(name)
            .map(|lib| lib.name.to_string())
            .unwrap_or_else(|| name.to_string())
    }

    fn imported(&self, name: &str) -> Option<&ImportedLibrary> {
        let canonical = Self::canonical_library_name(name);
        self.libraries.iter().find(|lib| lib.name == canonical)
    }

    /// Resolve every library `names` need, nested script imports first.
    /// Nothing is loaded here, so a failure leaves the engine untouched.
    fn plan_imports<'n>(&mut self, names: impl IntoIterator<Item = &'n str>) -> Result<Vec<LibrarySource>> {
        let mut plan = Vec::new();
        let mut seen = HashSet::new();
        for name in names {
            self.plan_import(name, &mut plan, &mut seen)?;
        }
        Ok(plan)
    }

    fn plan_import(
        &mut self,
        name: &str,
        plan: &mut Vec<LibrarySource>,
        seen: &mut HashSet<String>,
    ) -> Result<()> {
        if self.imported(name).is_some() || !seen.insert(Self::canonical_library_name(name)) {
            return Ok(());
        }

        let session = self.session.clone();
        let source = resolve_library(name, &session, |text| self.parse_cached(text))?;

        if let LibrarySource::Script { program, .. } = &source {
            for stmt in &program.stmts {
                if let StmtKind::Import { library } = &stmt.kind {
                    self.plan_import(library, plan, seen)?;
                }
            }
        }

        plan.push(source);
        Ok(())
    }

    fn load_library(&mut self, source: &LibrarySource, pending: &mut Pending<'_>) {
        match source {
            LibrarySource::Native(lib) => {
                let lib: &'static NativeLibrary = *lib;
                for class in &lib.classes {
                    self.classes.insert(class.name.to_string(), class);
                    pending.changed.push(class.name.to_string());
                }
                self.libraries.push(ImportedLibrary {
                    name: lib.name.to_string(),
                    path: None,
                    symbols: lib.symbols(),
                });
                info!(library = lib.name, classes = lib.classes.len(), "imported native library");
            }
            LibrarySource::Script { name, path, program } => {
                let mut symbols: Vec<SymbolInfo> = Vec::new();
                for stmt in &program.stmts {
                    let symbol = match &stmt.kind {
                        StmtKind::FunctionDef(def) => {
                            self.define_function(def, pending);
                            SymbolInfo::new(&def.name, SymbolKind::Function, name.as_str())
                                .with_members(vec![MethodRef::function(&def.name)])
                        }
                        StmtKind::Assign { target, value } => {
                            self.define_binding(target, value, pending);
                            SymbolInfo::new(target, SymbolKind::Variable, name.as_str())
                        }
                        StmtKind::Import { .. } => continue,
                        StmtKind::Expr(_) => {
                            debug!(library = %name, "ignoring bare expression in library");
                            continue;
                        }
                    };
                    symbols.retain(|s| s.name != symbol.name);
                    symbols.push(symbol);
                }
                info!(library = %name, path = %path.display(), symbols = symbols.len(), "imported script library");
                self.libraries.push(ImportedLibrary {
                    name: name.clone(),
                    path: Some(path.clone()),
                    symbols,
                });
            }
        }
        pending.summary.imported.push(source.name().to_string());
    }

    fn define_binding(&mut self, name: &str, expr: &Expr, pending: &mut Pending<'_>) {
        let code = expr.to_string();
        let hash = ContentHash::of(&code);
        if !self.graph.has_changed(name, EntryKind::Binding, hash) {
            pending.summary.skipped.push(name.to_string());
            return;
        }

        let reads = DependencyCollector::collect(expr);
        self.graph.define(name, EntryKind::Binding, hash, reads);
        self.functions.remove(name);
        self.bindings.insert(
            name.to_string(),
            Binding {
                expr: expr.clone(),
                code,
                value: None,
            },
        );
        pending.changed.push(name.to_string());
        pending.summary.defined.push(name.to_string());
    }

    fn define_function(&mut self, def: &FunctionDef, pending: &mut Pending<'_>) {
        let hash = ContentHash::of(&def.to_string());
        if !self.graph.has_changed(&def.name, EntryKind::Function, hash) {
            pending.summary.skipped.push(def.name.clone());
            return;
        }

        let reads = DependencyCollector::collect_function(def);
        self.graph.define(&def.name, EntryKind::Function, hash, reads);
        self.bindings.remove(&def.name);
        self.functions.insert(def.name.clone(), Arc::new(def.clone()));
        pending.changed.push(def.name.clone());
        pending.summary.defined.push(def.name.clone());
    }

    /// Apply a parsed program: imports, then definitions in order, then
    /// evaluation of everything invalidated, then bare expressions.
    fn apply(&mut self, program: &Program) -> Result<UpdateSummary> {
        let imports = program.stmts.iter().filter_map(|stmt| match &stmt.kind {
            StmtKind::Import { library } => Some(library.as_str()),
            _ => None,
        });
        let plan = self.plan_imports(imports)?;

        let mut pending = Pending::default();
        for source in &plan {
            self.load_library(source, &mut pending);
        }

        for stmt in &program.stmts {
            match &stmt.kind {
                StmtKind::Import { .. } => {}
                StmtKind::FunctionDef(def) => self.define_function(def, &mut pending),
                StmtKind::Assign { target, value } => self.define_binding(target, value, &mut pending),
                StmtKind::Expr(expr) => pending.expressions.push(expr),
            }
        }

        let mut faults = self.recompute(&pending.changed, &mut pending.summary);

        for expr in &pending.expressions {
            match Interpreter::new(&*self, self.max_call_depth).eval(expr) {
                Ok(value) => pending.summary.values.push(value),
                Err(err) => faults.push(err),
            }
        }

        match faults.into_iter().next() {
            Some(first) => Err(first),
            None => Ok(pending.summary),
        }
    }

    /// Re-evaluate `changed` and their dependents. Returns the faults hit.
    fn recompute(&mut self, changed: &[String], summary: &mut UpdateSummary) -> Vec<RunnerError> {
        if changed.is_empty() {
            return Vec::new();
        }

        let invalid = self.graph.invalidate(changed.iter().map(String::as_str));
        for name in &invalid {
            if let Some(binding) = self.bindings.get_mut(name) {
                binding.value = None;
            }
        }

        let mut faults = Vec::new();
        for step in self.graph.evaluation_order(&invalid) {
            match step {
                EvalStep::Single(name) => {
                    let result = match self.bindings.get(&name) {
                        Some(binding) => Interpreter::new(&*self, self.max_call_depth).eval(&binding.expr),
                        None => continue,
                    };
                    if let Err(err) = &result {
                        warn!(name = %name, "evaluation failed: {}", err.kind);
                        faults.push(err.clone());
                    }
                    if let Some(binding) = self.bindings.get_mut(&name) {
                        binding.value = Some(result);
                    }
                    summary.evaluated.push(name);
                }
                EvalStep::Cycle(names) => {
                    let mut chain = names.clone();
                    chain.push(names[0].clone());
                    let err = RunnerError::circular(chain);
                    warn!("{}", err.kind);
                    for name in &names {
                        if let Some(binding) = self.bindings.get_mut(name) {
                            binding.value = Some(Err(err.clone()));
                        }
                    }
                    faults.push(err);
                    summary.evaluated.extend(names);
                }
            }
        }
        faults
    }

    fn class_names(&self) -> impl Iterator<Item = &str> {
        self.classes.keys().map(String::as_str)
    }
}

impl Environment for AssociativeEngine {
    fn global(&self, name: &str) -> Option<Result<Value>> {
        let binding = self.bindings.get(name)?;
        Some(match &binding.value {
            Some(result) => result.clone(),
            None => Err(RunnerError::engine_fault(format!("'{}' has not been evaluated", name))),
        })
    }

    fn function(&self, name: &str) -> Option<&FunctionDef> {
        self.functions.get(name).map(|def| def.as_ref())
    }

    fn class(&self, name: &str) -> Option<&'static ClassDef> {
        self.classes.get(name).copied()
    }

    fn known_names(&self) -> Vec<&str> {
        self.bindings
            .keys()
            .chain(self.functions.keys())
            .map(String::as_str)
            .chain(self.class_names())
            .collect()
    }
}

impl ScriptEngine for AssociativeEngine {
    #[instrument(skip(self, code), fields(code_len = code.len()))]
    fn evaluate(&mut self, code: &str) -> Result<UpdateSummary> {
        let program = self.parse_cached(code)?;
        let summary = self.apply(&program)?;
        debug!(
            defined = summary.defined.len(),
            evaluated = summary.evaluated.len(),
            skipped = summary.skipped.len(),
            "update applied"
        );
        Ok(summary)
    }

    fn submit(&mut self, stmt: &Stmt) -> Result<UpdateSummary> {
        let program = Program {
            stmts: vec![stmt.clone()],
        };
        self.apply(&program)
    }

    #[instrument(skip(self))]
    fn import_libraries(&mut self, names: &[&str]) -> Result<Vec<SymbolInfo>> {
        if let Some(empty) = names.iter().find(|name| name.trim().is_empty()) {
            return Err(RunnerError::invalid_argument(format!(
                "library name '{}' is empty",
                empty
            )));
        }

        let program = Program {
            stmts: names
                .iter()
                .map(|name| {
                    Stmt::new(
                        StmtKind::Import {
                            library: name.to_string(),
                        },
                        SourceLocation::default(),
                    )
                })
                .collect(),
        };
        self.apply(&program)?;

        let mut symbols = Vec::new();
        let mut listed = HashSet::new();
        for name in names {
            if let Some(lib) = self.imported(name) {
                if listed.insert(lib.name.clone()) {
                    symbols.extend(lib.symbols.iter().cloned());
                }
            }
        }
        Ok(symbols)
    }

    fn inspect(&self, name: &str) -> Result<Value> {
        if let Some(binding) = self.bindings.get(name) {
            return match &binding.value {
                Some(Ok(value)) => Ok(value.clone()),
                Some(Err(cause)) => Err(RunnerError::engine_fault(format!(
                    "'{}' failed to evaluate: {}",
                    name, cause.kind
                ))),
                None => Err(RunnerError::engine_fault(format!("'{}' has not been evaluated", name))),
            };
        }
        if self.functions.contains_key(name) {
            return Err(RunnerError::invalid_argument(format!("'{}' is a function, not a value", name)));
        }
        if self.classes.contains_key(name) {
            return Err(RunnerError::invalid_argument(format!("'{}' is a class, not a value", name)));
        }
        Err(RunnerError::unknown_with_candidates(name, self.known_names()))
    }

    fn snapshot(&self) -> StateSnapshot {
        let mut snapshot = StateSnapshot {
            libraries: self.libraries.iter().map(|lib| lib.name.clone()).collect(),
            ..Default::default()
        };

        for name in self.graph.names() {
            if let Some(def) = self.functions.get(name) {
                snapshot.functions.push(def.to_string());
            } else if let Some(binding) = self.bindings.get(name) {
                let (value, fault) = match &binding.value {
                    Some(Ok(value)) => (Some(value.clone()), None),
                    Some(Err(err)) => (None, Some(err.kind.to_string())),
                    None => (None, None),
                };
                snapshot.bindings.push(BindingState {
                    name: name.to_string(),
                    code: binding.code.clone(),
                    value,
                    fault,
                });
            }
        }
        snapshot
    }

    fn reset(&mut self) {
        info!(
            bindings = self.bindings.len(),
            functions = self.functions.len(),
            libraries = self.libraries.len(),
            "resetting engine"
        );
        self.graph.clear();
        self.bindings.clear();
        self.functions.clear();
        self.classes.clear();
        self.libraries.clear();
    }

    fn function_signature(&self, method: &MethodRef) -> Result<Vec<Parameter>> {
        match &method.class {
            Some(class_name) => {
                let class = self
                    .classes
                    .get(class_name.as_str())
                    .ok_or_else(|| RunnerError::unknown_with_candidates(class_name, self.class_names()))?;
                if let Some(def) = class.find_method(&method.name) {
                    return Ok(def.params.clone());
                }
                if class.find_property(&method.name).is_some() {
                    return Ok(Vec::new());
                }
                Err(RunnerError::unknown_with_candidates(&method.name, class.member_names()))
            }
            None => {
                let def = self.functions.get(&method.name).ok_or_else(|| {
                    RunnerError::unknown_with_candidates(
                        &method.name,
                        self.functions.keys().map(String::as_str),
                    )
                })?;
                Ok(def
                    .params
                    .iter()
                    .map(|param| Parameter::new(param.as_str(), ValueType::Var))
                    .collect())
            }
        }
    }

    fn symbols(&self) -> Vec<SymbolInfo> {
        self.libraries
            .iter()
            .flat_map(|lib| lib.symbols.iter().cloned())
            .collect()
    }
}

impl Default for AssociativeEngine {
    fn default() -> Self {
        Self::new(ExecutionSession::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;

    fn engine() -> AssociativeEngine {
        AssociativeEngine::default()
    }

    #[test]
    fn test_math_sqrt() {
        let mut engine = engine();
        engine.import_libraries(&["Math"]).unwrap();
        engine.evaluate("x = Math.Sqrt(4);").unwrap();
        assert_eq!(engine.inspect("x").unwrap(), Value::Double(2.0));
    }

    #[test]
    fn test_only_dependents_are_reevaluated() {
        let mut engine = engine();
        engine.evaluate("a = 1; b = a + 1; c = 10;").unwrap();

        let summary = engine.evaluate("a = 2;").unwrap();
        assert_eq!(summary.defined, vec!["a"]);
        assert_eq!(summary.evaluated, vec!["a", "b"]);
        assert_eq!(engine.inspect("b").unwrap(), Value::Int(3));

        let summary = engine.evaluate("a = 2; c = 10;").unwrap();
        assert!(summary.defined.is_empty());
        assert!(summary.evaluated.is_empty());
        assert_eq!(summary.skipped, vec!["a", "c"]);
    }

    #[test]
    fn test_definitions_may_come_in_any_order() {
        let mut engine = engine();
        engine.evaluate("total = x + y; x = 1; y = 2;").unwrap();
        assert_eq!(engine.inspect("total").unwrap(), Value::Int(3));
    }

    #[test]
    fn test_syntax_error_changes_nothing() {
        let mut engine = engine();
        engine.evaluate("a = 1;").unwrap();
        let err = engine.evaluate("a = 2; b = (;").unwrap_err();
        assert!(matches!(err.kind, ErrorKind::Syntax { .. }));
        assert_eq!(engine.inspect("a").unwrap(), Value::Int(1));
        assert!(engine.inspect("b").unwrap_err().is_unknown_identifier());
    }

    #[test]
    fn test_fault_keeps_other_values() {
        let mut engine = engine();
        let err = engine.evaluate("ok = 1; bad = 1 / 0; later = bad + 1;").unwrap_err();
        assert!(matches!(err.kind, ErrorKind::EngineFault { .. }));
        assert_eq!(engine.inspect("ok").unwrap(), Value::Int(1));
        assert!(matches!(engine.inspect("bad").unwrap_err().kind, ErrorKind::EngineFault { .. }));
        assert!(matches!(engine.inspect("later").unwrap_err().kind, ErrorKind::EngineFault { .. }));

        engine.evaluate("bad = 4;").unwrap();
        assert_eq!(engine.inspect("later").unwrap(), Value::Int(5));
    }

    #[test]
    fn test_cycle_faults_members() {
        let mut engine = engine();
        let err = engine.evaluate("a = b + 1; b = a + 1; c = 3;").unwrap_err();
        assert_eq!(
            err.kind,
            ErrorKind::CircularDependency {
                chain: vec!["a".into(), "b".into(), "a".into()]
            }
        );
        assert_eq!(engine.inspect("c").unwrap(), Value::Int(3));
        assert!(engine.inspect("a").is_err());

        engine.evaluate("b = 1;").unwrap();
        assert_eq!(engine.inspect("a").unwrap(), Value::Int(2));
    }

    #[test]
    fn test_first_defined_fault_is_returned() {
        let mut engine = engine();
        let err = engine.evaluate("p = 1 % 0; q = missing; r = 3;").unwrap_err();
        assert!(matches!(err.kind, ErrorKind::EngineFault { .. }), "{}", err);
        assert_eq!(engine.inspect("r").unwrap(), Value::Int(3));

        let summary = engine.evaluate("k1 = 1; k2 = 2; k3 = 3;").unwrap();
        assert_eq!(summary.evaluated, vec!["k1", "k2", "k3"]);
    }

    #[test]
    fn test_undefined_name_resolves_later() {
        let mut engine = engine();
        assert!(engine.evaluate("x = y * 2;").unwrap_err().is_unknown_identifier());
        engine.evaluate("y = 21;").unwrap();
        assert_eq!(engine.inspect("x").unwrap(), Value::Int(42));
    }

    #[test]
    fn test_import_reevaluates_class_users() {
        let mut engine = engine();
        assert!(engine.evaluate("r = Math.Abs(-3);").is_err());
        let summary = engine.evaluate("import(\"Math\");").unwrap();
        assert_eq!(summary.imported, vec!["Math"]);
        assert_eq!(engine.inspect("r").unwrap(), Value::Double(3.0));
    }

    #[test]
    fn test_functions_and_redefinition() {
        let mut engine = engine();
        engine.evaluate("def scale(v) = v * factor; factor = 2; y = scale(5);").unwrap();
        assert_eq!(engine.inspect("y").unwrap(), Value::Int(10));

        engine.evaluate("factor = 3;").unwrap();
        assert_eq!(engine.inspect("y").unwrap(), Value::Int(15));

        engine.evaluate("def scale(v) = v + factor;").unwrap();
        assert_eq!(engine.inspect("y").unwrap(), Value::Int(8));

        let params = engine.function_signature(&MethodRef::function("scale")).unwrap();
        assert_eq!(params, vec![Parameter::new("v", ValueType::Var)]);
        assert!(engine.inspect("scale").is_err());
    }

    #[test]
    fn test_bare_expressions_return_values() {
        let mut engine = engine();
        let summary = engine.evaluate("a = 4; a * 2; \"done\"").unwrap();
        assert_eq!(summary.values, vec![Value::Int(8), Value::str("done")]);
        assert!(engine.inspect("a").is_ok());
    }

    #[test]
    fn test_import_is_all_or_nothing_and_idempotent() {
        let mut engine = engine();
        let err = engine.import_libraries(&["Math", "NoSuchLibrary"]).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::LibraryNotFound { .. }));
        assert!(engine.symbols().is_empty());

        let first = engine.import_libraries(&["Math"]).unwrap();
        let again = engine.import_libraries(&["math"]).unwrap();
        assert_eq!(first, again);
        assert_eq!(engine.symbols().len(), 1);
    }

    #[test]
    fn test_signatures() {
        let mut engine = engine();
        engine.import_libraries(&["Geometry"]).unwrap();
        assert!(engine
            .function_signature(&MethodRef::member("Point", "Origin"))
            .unwrap()
            .is_empty());
        assert_eq!(
            engine
                .function_signature(&MethodRef::member("Point", "ByCoordinates"))
                .unwrap()
                .len(),
            3
        );
        assert!(engine
            .function_signature(&MethodRef::member("Pont", "Origin"))
            .unwrap_err()
            .is_unknown_identifier());
    }

    #[test]
    fn test_reset_forgets_everything() {
        let mut engine = engine();
        engine.import_libraries(&["Math"]).unwrap();
        engine.evaluate("x = 1;").unwrap();
        engine.reset();
        assert!(engine.inspect("x").unwrap_err().is_unknown_identifier());
        assert!(engine.symbols().is_empty());
        assert!(engine.snapshot().is_empty());
    }

    #[test]
    fn test_dump_state() {
        let mut engine = engine();
        engine.import_libraries(&["Math"]).unwrap();
        let _ = engine.evaluate("def twice(a) = a * 2; x = twice(2); y = x / 0;");
        let dump = engine.dump_state();
        assert!(dump.contains("import(\"Math\");"));
        assert!(dump.contains("def twice(a) = a * 2;"));
        assert!(dump.contains("x = twice(2); // 4"));
        assert!(dump.contains("y = x / 0; // fault:"));
    }

    #[test]
    fn test_parse_cache_disabled() {
        let mut config = crate::frontend::config::RunnerConfig::default();
        config.engine.parse_cache_size = 0;
        let mut engine = AssociativeEngine::new(ExecutionSession::new(config));
        engine.evaluate("a = 1;").unwrap();
        engine.evaluate("a = 1;").unwrap();
        assert_eq!(engine.inspect("a").unwrap(), Value::Int(1));
    }
}
