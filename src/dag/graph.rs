// src/dag/graph.rs

use std::collections::{BTreeMap, BTreeSet, HashSet};

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use tracing::{debug, error};

use crate::errors::{ConductorError, Result};
use crate::registry::{ModuleName, ModuleRegistry};

/// Internal node structure: stores immediate deps and dependents.
#[derive(Debug, Clone, Default)]
struct DagNode {
    /// Direct dependencies: modules that must succeed before this one.
    deps: Vec<ModuleName>,
    /// Direct dependents: modules that require this one.
    dependents: Vec<ModuleName>,
}

/// Dependency closure of a set of requested modules.
///
/// Nodes are the requested modules plus everything they transitively
/// require. An edge `A -> B` means "A requires B to have succeeded". The
/// graph is built fresh for every orchestration request and owned by it.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: BTreeMap<ModuleName, DagNode>,
    /// Requested modules in request order, without repeats.
    requested: Vec<ModuleName>,
}

impl DependencyGraph {
    /// Expand `requested` into its dependency closure.
    ///
    /// Fails with `UnknownModule` if a requested module or any dependency is
    /// not registered, and with `CyclicDependency` if the expansion walks
    /// back onto a module still being expanded.
    pub fn build<S: AsRef<str>>(registry: &ModuleRegistry, requested: &[S]) -> Result<Self> {
        let mut graph = Self::default();
        let mut expanded: HashSet<ModuleName> = HashSet::new();
        let mut path: Vec<ModuleName> = Vec::new();

        for name in requested {
            let name = name.as_ref();
            registry.lookup(name)?;
            if !graph.requested.iter().any(|r| r == name) {
                graph.requested.push(name.to_string());
            }
            graph.expand(registry, name, &mut expanded, &mut path)?;
        }

        debug!(
            requested = ?graph.requested,
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            "built dependency graph"
        );

        Ok(graph)
    }

    /// Depth-first expansion. `path` is the current expansion stack;
    /// `expanded` holds modules whose whole closure is already in the graph,
    /// so shared dependencies are walked once.
    fn expand(
        &mut self,
        registry: &ModuleRegistry,
        name: &str,
        expanded: &mut HashSet<ModuleName>,
        path: &mut Vec<ModuleName>,
    ) -> Result<()> {
        if let Some(pos) = path.iter().position(|p| p == name) {
            let mut cycle: Vec<&str> = path[pos..].iter().map(String::as_str).collect();
            cycle.push(name);
            let cycle = cycle.join(" -> ");
            error!(cycle = %cycle, "cyclic module dependency");
            return Err(ConductorError::CyclicDependency(cycle));
        }

        if expanded.contains(name) {
            return Ok(());
        }

        let descriptor = registry.lookup(name)?;
        self.add_node(name);
        path.push(name.to_string());

        for dep in descriptor.dependencies() {
            if !registry.contains(dep) {
                error!(module = %name, dep = %dep, "module requires an unregistered module");
                return Err(ConductorError::UnknownModule(dep.clone()));
            }
            self.add_edge(name, dep);
            self.expand(registry, dep, expanded, path)?;
        }

        path.pop();
        expanded.insert(name.to_string());
        Ok(())
    }

    fn add_node(&mut self, name: &str) {
        self.nodes.entry(name.to_string()).or_default();
    }

    fn add_edge(&mut self, dependent: &str, dependency: &str) {
        self.add_node(dependency);

        let node = self.nodes.entry(dependent.to_string()).or_default();
        if node.deps.iter().any(|d| d == dependency) {
            return;
        }
        node.deps.push(dependency.to_string());

        if let Some(dep_node) = self.nodes.get_mut(dependency) {
            dep_node.dependents.push(dependent.to_string());
        }
    }

    /// All module names in the closure.
    pub fn modules(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(|s| s.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    pub fn requested(&self) -> &[ModuleName] {
        &self.requested
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.nodes.values().map(|n| n.deps.len()).sum()
    }

    /// Immediate dependencies of a module (outgoing edges).
    pub fn dependencies_of(&self, name: &str) -> &[ModuleName] {
        self.nodes
            .get(name)
            .map(|n| n.deps.as_slice())
            .unwrap_or(&[])
    }

    /// Immediate dependents of a module (incoming edges).
    pub fn dependents_of(&self, name: &str) -> &[ModuleName] {
        self.nodes
            .get(name)
            .map(|n| n.dependents.as_slice())
            .unwrap_or(&[])
    }

    /// Every module `name` transitively requires.
    pub fn descendants(&self, name: &str) -> BTreeSet<ModuleName> {
        let mut seen = BTreeSet::new();
        let mut stack: Vec<&str> = self.dependencies_of(name).iter().map(String::as_str).collect();

        while let Some(current) = stack.pop() {
            if !seen.insert(current.to_string()) {
                continue;
            }
            stack.extend(self.dependencies_of(current).iter().map(String::as_str));
        }

        seen
    }

    /// Requested modules that no other requested module requires, directly
    /// or transitively. These are the only units handed to the executor.
    pub fn roots(&self) -> Vec<ModuleName> {
        let required: BTreeSet<ModuleName> = self
            .requested
            .iter()
            .flat_map(|r| self.descendants(r))
            .collect();

        self.requested
            .iter()
            .filter(|r| !required.contains(*r))
            .cloned()
            .collect()
    }

    /// Modules ordered so that every dependency precedes its dependents.
    pub fn topological_order(&self) -> Result<Vec<ModuleName>> {
        // Edge direction here: dependency -> dependent.
        let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
        for name in self.nodes.keys() {
            graph.add_node(name.as_str());
        }
        for (name, node) in self.nodes.iter() {
            for dep in node.deps.iter() {
                graph.add_edge(dep.as_str(), name.as_str(), ());
            }
        }

        toposort(&graph, None)
            .map(|order| order.into_iter().map(str::to_string).collect())
            .map_err(|cycle| {
                ConductorError::CyclicDependency(format!(
                    "cycle detected in dependency graph involving '{}'",
                    cycle.node_id()
                ))
            })
    }
}
