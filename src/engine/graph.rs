//! Dependency tracking for associative updates
//!
//! - Content-addressed hashing of definitions for change detection
//! - Name -> dependents edges for transitive invalidation
//! - Strongly connected components for evaluation order and cycle detection

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap, HashMap, HashSet};

/// Content hash for change detection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    pub fn from_content(content: &[u8]) -> Self {
        let hash = blake3::hash(content);
        Self(*hash.as_bytes())
    }

    pub fn of(content: &str) -> Self {
        Self::from_content(content.as_bytes())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn short(&self) -> String {
        self.0[..4].iter().map(|b| format!("{:02x}", b)).collect()
    }
}

/// Whether a graph entry is a variable binding or a function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Binding,
    Function,
}

#[derive(Debug, Clone)]
struct Entry {
    kind: EntryKind,
    hash: ContentHash,
    seq: u64,
}

/// One unit of evaluation work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvalStep {
    /// Evaluate a single binding.
    Single(String),
    /// Bindings that (transitively) read themselves.
    Cycle(Vec<String>),
}

/// Dependency graph over top-level names
#[derive(Debug, Default)]
pub struct DependencyGraph {
    /// Name -> names its definition reads
    dependencies: HashMap<String, BTreeSet<String>>,

    /// Name -> names whose definitions read it
    dependents: HashMap<String, BTreeSet<String>>,

    /// Defined names only
    entries: HashMap<String, Entry>,

    next_seq: u64,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record (or replace) the definition of `name`.
    pub fn define(
        &mut self,
        name: &str,
        kind: EntryKind,
        hash: ContentHash,
        reads: impl IntoIterator<Item = String>,
    ) {
        self.clear_edges(name);

        let reads: BTreeSet<String> = reads.into_iter().collect();
        for dep in &reads {
            self.dependents
                .entry(dep.clone())
                .or_default()
                .insert(name.to_string());
        }
        self.dependencies.insert(name.to_string(), reads);

        let seq = match self.entries.get(name) {
            Some(existing) => existing.seq,
            None => {
                self.next_seq += 1;
                self.next_seq
            }
        };
        self.entries.insert(name.to_string(), Entry { kind, hash, seq });
    }

    pub fn remove(&mut self, name: &str) {
        self.clear_edges(name);
        self.dependencies.remove(name);
        self.entries.remove(name);
    }

    fn clear_edges(&mut self, name: &str) {
        if let Some(old) = self.dependencies.get(name) {
            for dep in old {
                if let Some(set) = self.dependents.get_mut(dep) {
                    set.remove(name);
                    if set.is_empty() {
                        self.dependents.remove(dep);
                    }
                }
            }
        }
    }

    /// Check if a definition has changed
    pub fn has_changed(&self, name: &str, kind: EntryKind, new_hash: ContentHash) -> bool {
        self.entries
            .get(name)
            .map_or(true, |e| e.kind != kind || e.hash != new_hash)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn kind(&self, name: &str) -> Option<EntryKind> {
        self.entries.get(name).map(|e| e.kind)
    }

    pub fn dependencies_of(&self, name: &str) -> impl Iterator<Item = &str> {
        self.dependencies
            .get(name)
            .into_iter()
            .flat_map(|deps| deps.iter().map(String::as_str))
    }

    pub fn dependents_of(&self, name: &str) -> impl Iterator<Item = &str> {
        self.dependents
            .get(name)
            .into_iter()
            .flat_map(|deps| deps.iter().map(String::as_str))
    }

    /// Defined names in first-definition order.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.entries.iter().collect();
        names.sort_by_key(|(_, e)| e.seq);
        names.into_iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Everything that must be re-evaluated when `changed` change
    pub fn invalidate<'a>(&self, changed: impl IntoIterator<Item = &'a str>) -> HashSet<String> {
        let mut invalid = HashSet::new();
        let mut worklist: Vec<String> = changed.into_iter().map(str::to_string).collect();

        while let Some(name) = worklist.pop() {
            if let Some(deps) = self.dependents.get(&name) {
                worklist.extend(deps.iter().filter(|d| !invalid.contains(*d)).cloned());
            }
            invalid.insert(name);
        }

        invalid
    }

    /// Evaluation order for the bindings in `invalid`.
    ///
    /// Names that are not defined bindings (class names, functions,
    /// undefined names) only carry invalidation and are left out. Functions
    /// still take part in cycle detection, so `x = f(); def f() = x;` is
    /// reported as a cycle on `x`.
    pub fn evaluation_order(&self, invalid: &HashSet<String>) -> Vec<EvalStep> {
        let mut members: Vec<(&str, &Entry)> = invalid
            .iter()
            .filter_map(|name| self.entries.get_key_value(name.as_str()))
            .map(|(name, entry)| (name.as_str(), entry))
            .collect();
        members.sort_by_key(|(_, e)| e.seq);

        let mut graph: DiGraph<&str, ()> = DiGraph::with_capacity(members.len(), members.len());
        let index: HashMap<&str, NodeIndex> = members
            .iter()
            .map(|(name, _)| (*name, graph.add_node(*name)))
            .collect();

        for (name, _) in &members {
            let to = index[name];
            for dep in self.dependencies_of(name) {
                if let Some(&from) = index.get(dep) {
                    graph.add_edge(from, to, ());
                }
            }
        }

        let components = tarjan_scc(&graph);
        let mut component_of = vec![0usize; graph.node_count()];
        for (c, component) in components.iter().enumerate() {
            for ix in component {
                component_of[ix.index()] = c;
            }
        }

        // Kahn's algorithm over the condensation; ties go to the component
        // defined first.
        let mut successors: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); components.len()];
        let mut in_degree = vec![0usize; components.len()];
        for edge in graph.raw_edges() {
            let (from, to) = (
                component_of[edge.source().index()],
                component_of[edge.target().index()],
            );
            if from != to && successors[from].insert(to) {
                in_degree[to] += 1;
            }
        }
        let first_seq: Vec<u64> = components
            .iter()
            .map(|component| {
                component
                    .iter()
                    .map(|ix| self.entries[graph[*ix]].seq)
                    .min()
                    .unwrap_or(u64::MAX)
            })
            .collect();

        let mut ready: BinaryHeap<Reverse<(u64, usize)>> = (0..components.len())
            .filter(|c| in_degree[*c] == 0)
            .map(|c| Reverse((first_seq[c], c)))
            .collect();
        let mut ordered = Vec::with_capacity(components.len());
        while let Some(Reverse((_, c))) = ready.pop() {
            ordered.push(c);
            for &next in &successors[c] {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    ready.push(Reverse((first_seq[next], next)));
                }
            }
        }
        let components = ordered.into_iter().map(|c| &components[c]);

        let mut steps = Vec::new();
        for component in components {
            let cyclic = component.len() > 1 || graph.contains_edge(component[0], component[0]);
            let mut bindings: Vec<(&str, u64)> = component
                .iter()
                .map(|ix| graph[*ix])
                .filter_map(|name| {
                    let entry = &self.entries[name];
                    (entry.kind == EntryKind::Binding).then_some((name, entry.seq))
                })
                .collect();
            if bindings.is_empty() {
                continue;
            }
            bindings.sort_by_key(|(_, seq)| *seq);

            if cyclic {
                steps.push(EvalStep::Cycle(
                    bindings.into_iter().map(|(n, _)| n.to_string()).collect(),
                ));
            } else {
                steps.push(EvalStep::Single(bindings[0].0.to_string()));
            }
        }

        steps
    }

    pub fn clear(&mut self) {
        self.dependencies.clear();
        self.dependents.clear();
        self.entries.clear();
        self.next_seq = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn define(graph: &mut DependencyGraph, name: &str, reads: &[&str]) {
        graph.define(
            name,
            EntryKind::Binding,
            ContentHash::of(name),
            reads.iter().map(|s| s.to_string()),
        );
    }

    fn all(graph: &DependencyGraph) -> HashSet<String> {
        graph.names().into_iter().map(str::to_string).collect()
    }

    #[test]
    fn test_content_hash() {
        assert_eq!(ContentHash::of("a + 1"), ContentHash::of("a + 1"));
        assert_ne!(ContentHash::of("a + 1"), ContentHash::of("a + 2"));
        assert_eq!(ContentHash::of("x").short().len(), 8);
    }

    #[test]
    fn test_transitive_invalidation() {
        let mut graph = DependencyGraph::new();
        define(&mut graph, "a", &[]);
        define(&mut graph, "b", &["a"]);
        define(&mut graph, "c", &["b"]);
        define(&mut graph, "d", &[]);

        let invalid = graph.invalidate(["a"]);
        assert_eq!(invalid.len(), 3);
        assert!(invalid.contains("c"));
        assert!(!invalid.contains("d"));

        let invalid = graph.invalidate(["Math"]);
        assert_eq!(invalid.len(), 1);
    }

    #[test]
    fn test_topological_order() {
        let mut graph = DependencyGraph::new();
        define(&mut graph, "c", &["b"]);
        define(&mut graph, "b", &["a"]);
        define(&mut graph, "a", &[]);

        let order = graph.evaluation_order(&all(&graph));
        assert_eq!(
            order,
            vec![
                EvalStep::Single("a".into()),
                EvalStep::Single("b".into()),
                EvalStep::Single("c".into()),
            ]
        );
    }

    #[test]
    fn test_independent_names_keep_definition_order() {
        let mut graph = DependencyGraph::new();
        define(&mut graph, "z", &[]);
        define(&mut graph, "y", &[]);
        define(&mut graph, "x", &[]);

        let order = graph.evaluation_order(&all(&graph));
        assert_eq!(
            order,
            vec![
                EvalStep::Single("z".into()),
                EvalStep::Single("y".into()),
                EvalStep::Single("x".into()),
            ]
        );
    }

    #[test]
    fn test_dependency_order_breaks_ties_by_definition() {
        let mut graph = DependencyGraph::new();
        define(&mut graph, "late", &["base"]);
        define(&mut graph, "solo", &[]);
        define(&mut graph, "base", &[]);
        define(&mut graph, "other", &[]);

        let order = graph.evaluation_order(&all(&graph));
        assert_eq!(
            order,
            vec![
                EvalStep::Single("solo".into()),
                EvalStep::Single("base".into()),
                EvalStep::Single("late".into()),
                EvalStep::Single("other".into()),
            ]
        );
    }

    #[test]
    fn test_cycles_detected() {
        let mut graph = DependencyGraph::new();
        define(&mut graph, "a", &["b"]);
        define(&mut graph, "b", &["a"]);
        define(&mut graph, "s", &["s"]);
        define(&mut graph, "ok", &[]);

        let order = graph.evaluation_order(&all(&graph));
        assert!(order.contains(&EvalStep::Cycle(vec!["a".into(), "b".into()])));
        assert!(order.contains(&EvalStep::Cycle(vec!["s".into()])));
        assert!(order.contains(&EvalStep::Single("ok".into())));
    }

    #[test]
    fn test_recursive_function_is_not_a_cycle() {
        let mut graph = DependencyGraph::new();
        graph.define("fact", EntryKind::Function, ContentHash::of("fact"), ["fact".to_string()]);
        define(&mut graph, "x", &["fact"]);

        let order = graph.evaluation_order(&all(&graph));
        assert_eq!(order, vec![EvalStep::Single("x".into())]);
    }

    #[test]
    fn test_redefinition_replaces_edges() {
        let mut graph = DependencyGraph::new();
        define(&mut graph, "a", &[]);
        define(&mut graph, "b", &["a"]);
        assert!(graph.invalidate(["a"]).contains("b"));

        define(&mut graph, "b", &[]);
        assert!(!graph.invalidate(["a"]).contains("b"));
        assert_eq!(graph.names(), vec!["a", "b"]);

        graph.remove("a");
        assert!(!graph.contains("a"));
        assert_eq!(graph.len(), 1);
    }
}
