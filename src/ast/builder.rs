//! Programmatic construction of graph nodes.
//!
//! Hosts describe a call (what kind, on which host object, with which
//! selected objects and typed-in inputs) and get back an immutable
//! [`AstNode`] that can be pushed into the runner's graph.

use smallvec::SmallVec;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use super::{Args, Expr, Stmt};
use crate::errors::{Result, RunnerError};
use crate::frontend::lexer::is_identifier;
use crate::frontend::parser::{parse_arguments, parse_expression};
use crate::host::{HostBridge, HostHandle};

/// Identity of a built node, scoped to one runner.
///
/// `generation` changes whenever the runner is reinitialized, which makes
/// nodes built before the reset detectably stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    pub generation: u32,
    pub index: u32,
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.generation, self.index)
    }
}

/// Allocator of node identifiers owned by a single runner.
#[derive(Debug, Clone)]
pub struct NodeArena {
    prefix: String,
    generation: u32,
    next: u32,
}

impl NodeArena {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            generation: 0,
            next: 1,
        }
    }

    pub fn allocate(&mut self) -> NodeId {
        let id = NodeId {
            generation: self.generation,
            index: self.next,
        };
        self.next += 1;
        id
    }

    /// Start a new generation; every id handed out so far becomes stale.
    pub fn reset(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        self.next = 1;
    }

    pub fn is_current(&self, id: NodeId) -> bool {
        id.generation == self.generation && id.index < self.next
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Number of ids handed out in the current generation.
    pub fn allocated(&self) -> u32 {
        self.next - 1
    }

    pub fn name_for(&self, id: NodeId) -> String {
        format!("{}{}", self.prefix, id.index)
    }
}

impl Default for NodeArena {
    fn default() -> Self {
        Self::new("var")
    }
}

/// What a call node invokes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// Global function: `method(args)`.
    Function,
    /// Class constructor: `Class.method(args)`.
    Constructor,
    /// Static member: `Class.method(args)`.
    Static,
    /// Instance method: `receiver.method(args)`.
    Method,
    /// Instance property: `receiver.method`.
    Property,
}

impl NodeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NodeKind::Function => "function",
            NodeKind::Constructor => "constructor",
            NodeKind::Static => "static",
            NodeKind::Method => "method",
            NodeKind::Property => "property",
        }
    }
}

impl FromStr for NodeKind {
    type Err = RunnerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "function" => Ok(NodeKind::Function),
            "constructor" => Ok(NodeKind::Constructor),
            "static" => Ok(NodeKind::Static),
            "method" => Ok(NodeKind::Method),
            "property" => Ok(NodeKind::Property),
            _ => Err(RunnerError::invalid_argument(format!("unknown node kind '{}'", s))),
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Description of a call node to build.
///
/// The argument list comes from `format`: `%s` takes the next selection
/// input (resolved through the host bridge), `%c` the next command input,
/// `%%` is a literal percent sign and any other text is copied as is. An
/// empty format lists all selection inputs, then all command inputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSite {
    pub kind: NodeKind,
    pub instance: Option<HostHandle>,
    pub method: String,
    pub selection_inputs: SmallVec<[HostHandle; 4]>,
    pub command_inputs: Vec<String>,
    pub format: String,
}

impl CallSite {
    pub fn new(kind: NodeKind, method: impl Into<String>) -> Self {
        Self {
            kind,
            instance: None,
            method: method.into(),
            selection_inputs: SmallVec::new(),
            command_inputs: Vec::new(),
            format: String::new(),
        }
    }

    pub fn instance(mut self, handle: HostHandle) -> Self {
        self.instance = Some(handle);
        self
    }

    pub fn selection(mut self, handles: impl IntoIterator<Item = HostHandle>) -> Self {
        self.selection_inputs = handles.into_iter().collect();
        self
    }

    pub fn inputs<S: Into<String>>(mut self, inputs: impl IntoIterator<Item = S>) -> Self {
        self.command_inputs = inputs.into_iter().map(Into::into).collect();
        self
    }

    pub fn format(mut self, format: impl Into<String>) -> Self {
        self.format = format.into();
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeShape {
    Call(NodeKind),
    Array,
}

#[derive(Debug)]
struct NodeInner {
    id: NodeId,
    name: String,
    shape: NodeShape,
    expr: Expr,
    code: String,
}

/// An immutable graph node ready to be submitted.
///
/// Cloning is cheap; the runner keeps no reference to handed-out nodes.
#[derive(Debug, Clone)]
pub struct AstNode {
    inner: Arc<NodeInner>,
}

impl AstNode {
    fn new(id: NodeId, name: String, shape: NodeShape, expr: Expr) -> Self {
        let code = expr.to_string();
        Self {
            inner: Arc::new(NodeInner {
                id,
                name,
                shape,
                expr,
                code,
            }),
        }
    }

    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// Variable name the node's value is bound to once submitted.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Canonical source text of the node's expression.
    pub fn code(&self) -> &str {
        &self.inner.code
    }

    pub fn expr(&self) -> &Expr {
        &self.inner.expr
    }

    /// Call kind, or `None` for array nodes.
    pub fn kind(&self) -> Option<NodeKind> {
        match self.inner.shape {
            NodeShape::Call(kind) => Some(kind),
            NodeShape::Array => None,
        }
    }

    pub fn is_array(&self) -> bool {
        self.inner.shape == NodeShape::Array
    }

    /// The `name = code;` statement submitting this node produces.
    pub fn statement(&self) -> Stmt {
        Stmt::assign(self.inner.name.clone(), self.inner.expr.clone())
    }
}

impl PartialEq for AstNode {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
            && self.inner.name == other.inner.name
            && self.inner.expr == other.inner.expr
    }
}

impl fmt::Display for AstNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {};", self.inner.name, self.inner.code)
    }
}

/// Builds node expressions, resolving host handles through a bridge.
pub struct AstBuilder {
    bridge: Arc<dyn HostBridge>,
}

impl AstBuilder {
    pub fn new(bridge: Arc<dyn HostBridge>) -> Self {
        Self { bridge }
    }

    pub fn build(&self, arena: &mut NodeArena, site: &CallSite) -> Result<AstNode> {
        let expr = self.call_expression(site)?;
        let id = arena.allocate();
        let name = arena.name_for(id);
        tracing::debug!(%id, %name, kind = %site.kind, "built call node");
        Ok(AstNode::new(id, name, NodeShape::Call(site.kind), expr))
    }

    pub fn build_array<S: AsRef<str>>(&self, arena: &mut NodeArena, inputs: &[S]) -> Result<AstNode> {
        let expr = self.array_expression(inputs)?;
        let id = arena.allocate();
        let name = arena.name_for(id);
        tracing::debug!(%id, %name, len = inputs.len(), "built array node");
        Ok(AstNode::new(id, name, NodeShape::Array, expr))
    }

    /// Expression for a call site. Depends only on the site and on what the
    /// bridge answers for its handles.
    pub fn call_expression(&self, site: &CallSite) -> Result<Expr> {
        let selection = site
            .selection_inputs
            .iter()
            .map(|handle| self.resolve(*handle))
            .collect::<Result<Vec<_>>>()?;
        let arguments = expand_arguments(&site.format, &selection, &site.command_inputs)?;
        let args = parse_arguments(&arguments).map_err(|e| {
            RunnerError::invalid_argument(format!("arguments `{}` do not parse: {}", arguments, e.kind))
        })?;

        match site.kind {
            NodeKind::Function => {
                check_member_name(&site.method)?;
                Ok(Expr::Call {
                    target: None,
                    name: site.method.clone(),
                    args,
                })
            }
            NodeKind::Constructor | NodeKind::Static => {
                let (receiver, name) = match site.instance {
                    Some(handle) => (self.receiver(handle)?, site.method.as_str()),
                    None => {
                        let (class, name) = site.method.rsplit_once('.').ok_or_else(|| {
                            RunnerError::invalid_argument(format!(
                                "{} call '{}' needs a class instance or a qualified name",
                                site.kind, site.method
                            ))
                        })?;
                        (parse_receiver(class)?, name)
                    }
                };
                check_member_name(name)?;
                Ok(Expr::Call {
                    target: Some(Box::new(receiver)),
                    name: name.to_string(),
                    args,
                })
            }
            NodeKind::Method => {
                let receiver = self.required_receiver(site)?;
                check_member_name(&site.method)?;
                Ok(Expr::Call {
                    target: Some(Box::new(receiver)),
                    name: site.method.clone(),
                    args,
                })
            }
            NodeKind::Property => {
                if !args.is_empty() {
                    return Err(RunnerError::invalid_argument(format!(
                        "property '{}' takes no arguments, got {}",
                        site.method,
                        args.len()
                    )));
                }
                let receiver = self.required_receiver(site)?;
                check_member_name(&site.method)?;
                Ok(Expr::Member {
                    target: Box::new(receiver),
                    name: site.method.clone(),
                })
            }
        }
    }

    /// Array literal over `inputs`, each parsed as one element.
    pub fn array_expression<S: AsRef<str>>(&self, inputs: &[S]) -> Result<Expr> {
        let items = inputs
            .iter()
            .enumerate()
            .map(|(i, input)| {
                let text = input.as_ref();
                parse_expression(text).map_err(|e| {
                    RunnerError::invalid_argument(format!(
                        "array input {} (`{}`) does not parse: {}",
                        i, text, e.kind
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Expr::Array(items))
    }

    fn resolve(&self, handle: HostHandle) -> Result<String> {
        self.bridge.expression_for(handle).ok_or_else(|| {
            RunnerError::invalid_argument(format!("host handle {} is not known to the host", handle))
        })
    }

    fn receiver(&self, handle: HostHandle) -> Result<Expr> {
        let text = self.resolve(handle)?;
        parse_receiver(&text)
    }

    fn required_receiver(&self, site: &CallSite) -> Result<Expr> {
        let handle = site.instance.ok_or_else(|| {
            RunnerError::invalid_argument(format!("{} '{}' needs an instance", site.kind, site.method))
        })?;
        self.receiver(handle)
    }
}

fn parse_receiver(text: &str) -> Result<Expr> {
    parse_expression(text).map_err(|e| {
        RunnerError::invalid_argument(format!("receiver `{}` does not parse: {}", text, e.kind))
    })
}

fn check_member_name(name: &str) -> Result<()> {
    if is_identifier(name) {
        Ok(())
    } else {
        Err(RunnerError::invalid_argument(format!("'{}' is not a valid member name", name)))
    }
}

/// Expand the argument format against selection and command inputs.
fn expand_arguments(format: &str, selection: &[String], commands: &[String]) -> Result<String> {
    if format.is_empty() {
        return Ok(selection
            .iter()
            .chain(commands)
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(", "));
    }

    let mut out = String::with_capacity(format.len());
    let mut selection_iter = selection.iter();
    let mut command_iter = commands.iter();
    let mut chars = format.chars();

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('s') => {
                let input = selection_iter.next().ok_or_else(|| {
                    RunnerError::invalid_argument(format!(
                        "format `{}` uses more selection inputs than the {} given",
                        format,
                        selection.len()
                    ))
                })?;
                out.push_str(input);
            }
            Some('c') => {
                let input = command_iter.next().ok_or_else(|| {
                    RunnerError::invalid_argument(format!(
                        "format `{}` uses more command inputs than the {} given",
                        format,
                        commands.len()
                    ))
                })?;
                out.push_str(input);
            }
            Some('%') => out.push('%'),
            Some(other) => {
                return Err(RunnerError::invalid_argument(format!(
                    "unknown placeholder '%{}' in format `{}`",
                    other, format
                )))
            }
            None => {
                return Err(RunnerError::invalid_argument(format!(
                    "format `{}` ends with a lone '%'",
                    format
                )))
            }
        }
    }

    let unused_selection = selection_iter.count();
    let unused_commands = command_iter.count();
    if unused_selection > 0 || unused_commands > 0 {
        return Err(RunnerError::invalid_argument(format!(
            "format `{}` leaves {} selection and {} command inputs unused",
            format, unused_selection, unused_commands
        )));
    }

    Ok(out)
}

/// Argument list helper for tests and hosts that assemble calls directly.
pub fn args_of(expr: &Expr) -> Option<&Args> {
    match expr {
        Expr::Call { args, .. } => Some(args),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use crate::host::HostRegistry;

    fn builder() -> (AstBuilder, Arc<HostRegistry>) {
        let registry = Arc::new(HostRegistry::new());
        (AstBuilder::new(registry.clone()), registry)
    }

    fn is_invalid(err: &RunnerError) -> bool {
        matches!(err.kind, ErrorKind::InvalidArgument { .. })
    }

    #[test]
    fn test_static_call_with_format() {
        let (builder, _) = builder();
        let mut arena = NodeArena::default();
        let site = CallSite::new(NodeKind::Static, "Point.ByCoordinates")
            .inputs(["1", "2", "0"])
            .format("%c, %c, %c");
        let node = builder.build(&mut arena, &site).unwrap();
        assert_eq!(node.code(), "Point.ByCoordinates(1, 2, 0)");
        assert_eq!(node.name(), "var1");
        assert_eq!(node.kind(), Some(NodeKind::Static));
        assert_eq!(node.to_string(), "var1 = Point.ByCoordinates(1, 2, 0);");
    }

    #[test]
    fn test_method_call_resolves_handles() {
        let (builder, registry) = builder();
        let mut arena = NodeArena::default();
        let p1 = registry.register("p1");
        let p2 = registry.register("p2");

        let site = CallSite::new(NodeKind::Method, "DistanceTo")
            .instance(p1)
            .selection([p2]);
        let node = builder.build(&mut arena, &site).unwrap();
        assert_eq!(node.code(), "p1.DistanceTo(p2)");

        let site = CallSite::new(NodeKind::Property, "X").instance(p2);
        assert_eq!(builder.build(&mut arena, &site).unwrap().code(), "p2.X");
    }

    #[test]
    fn test_format_mixes_inputs_and_literals() {
        let (builder, registry) = builder();
        let sel = registry.register("a");
        let site = CallSite::new(NodeKind::Function, "clamp")
            .selection([sel])
            .inputs(["10"])
            .format("%s, 0, %c");
        let expr = builder.call_expression(&site).unwrap();
        assert_eq!(expr.to_string(), "clamp(a, 0, 10)");
        assert_eq!(args_of(&expr).map(|a| a.len()), Some(3));
    }

    #[test]
    fn test_default_format_orders_selection_first() {
        let (builder, registry) = builder();
        let sel = registry.register("p");
        let site = CallSite::new(NodeKind::Function, "f").selection([sel]).inputs(["1"]);
        assert_eq!(builder.call_expression(&site).unwrap().to_string(), "f(p, 1)");
    }

    #[test]
    fn test_invalid_call_sites() {
        let (builder, registry) = builder();
        let known = registry.register("p");

        let unused = CallSite::new(NodeKind::Function, "f").inputs(["1", "2"]).format("%c");
        assert!(is_invalid(&builder.call_expression(&unused).unwrap_err()));

        let missing = CallSite::new(NodeKind::Function, "f").format("%s");
        assert!(is_invalid(&builder.call_expression(&missing).unwrap_err()));

        let no_instance = CallSite::new(NodeKind::Method, "Add");
        assert!(is_invalid(&builder.call_expression(&no_instance).unwrap_err()));

        let unknown = CallSite::new(NodeKind::Method, "Add").instance(HostHandle::from_raw(999));
        assert!(is_invalid(&builder.call_expression(&unknown).unwrap_err()));

        let injected = CallSite::new(NodeKind::Function, "f").inputs(["1) + g(2"]);
        assert!(is_invalid(&builder.call_expression(&injected).unwrap_err()));

        let bad_name = CallSite::new(NodeKind::Method, "a b").instance(known);
        assert!(is_invalid(&builder.call_expression(&bad_name).unwrap_err()));

        let property_args = CallSite::new(NodeKind::Property, "X").instance(known).inputs(["1"]);
        assert!(is_invalid(&builder.call_expression(&property_args).unwrap_err()));

        let unqualified = CallSite::new(NodeKind::Static, "ByCoordinates");
        assert!(is_invalid(&builder.call_expression(&unqualified).unwrap_err()));
    }

    #[test]
    fn test_failed_build_does_not_consume_ids() {
        let (builder, _) = builder();
        let mut arena = NodeArena::default();
        let bad = CallSite::new(NodeKind::Method, "Add");
        assert!(builder.build(&mut arena, &bad).is_err());
        assert_eq!(arena.allocated(), 0);
    }

    #[test]
    fn test_array_node() {
        let (builder, _) = builder();
        let mut arena = NodeArena::new("n");
        let node = builder.build_array(&mut arena, &["1", "2", "3"]).unwrap();
        assert_eq!(node.code(), "[1,2,3]");
        assert_eq!(node.name(), "n1");
        assert!(node.is_array());

        let reparsed = parse_expression(node.code()).unwrap();
        assert_eq!(&reparsed, node.expr());

        let err = builder.build_array(&mut arena, &["1", "(2"]).unwrap_err();
        assert!(is_invalid(&err));
    }

    #[test]
    fn test_arena_generations() {
        let mut arena = NodeArena::default();
        let first = arena.allocate();
        assert!(arena.is_current(first));
        arena.reset();
        assert!(!arena.is_current(first));
        let second = arena.allocate();
        assert_eq!(second.index, 1);
        assert_eq!(second.generation, 1);
    }

    #[test]
    fn test_node_kind_from_str() {
        assert_eq!("Method".parse::<NodeKind>().unwrap(), NodeKind::Method);
        assert_eq!("CONSTRUCTOR".parse::<NodeKind>().unwrap(), NodeKind::Constructor);
        assert!(is_invalid(&"lambda".parse::<NodeKind>().unwrap_err()));
    }
}
