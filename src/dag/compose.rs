// src/dag/compose.rs

//! Composition of a dependency graph into execution units.
//!
//! A [`TaskUnit`] is an inspectable value describing what runs and what it
//! waits for: either a plain `execute(module)` or
//! `barrier(upstream units) -> execute(module)`. Units are shared through
//! `Arc`, so a dependency required by several dependents is built once and
//! referenced from each of them.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::dag::graph::DependencyGraph;
use crate::registry::ModuleName;

#[derive(Debug, PartialEq, Eq)]
pub enum TaskUnit {
    /// Run the module with nothing to wait for.
    Execute(ModuleName),
    /// Wait until every unit in `barrier` has completed (not necessarily
    /// succeeded), then run `then`.
    Sequence {
        barrier: Vec<Arc<TaskUnit>>,
        then: ModuleName,
    },
}

impl TaskUnit {
    /// Module this unit ultimately executes.
    pub fn module(&self) -> &str {
        match self {
            TaskUnit::Execute(module) => module,
            TaskUnit::Sequence { then, .. } => then,
        }
    }

    /// Units that must complete first; empty for a plain execute.
    pub fn barrier(&self) -> &[Arc<TaskUnit>] {
        match self {
            TaskUnit::Execute(_) => &[],
            TaskUnit::Sequence { barrier, .. } => barrier,
        }
    }

    /// Module names of the barrier members.
    pub fn upstream_modules(&self) -> Vec<&str> {
        self.barrier().iter().map(|u| u.module()).collect()
    }
}

impl fmt::Display for TaskUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskUnit::Execute(module) => write!(f, "{module}"),
            TaskUnit::Sequence { barrier, then } => {
                write!(f, "barrier(")?;
                for (i, unit) in barrier.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{unit}")?;
                }
                write!(f, ") -> {then}")
            }
        }
    }
}

/// Memoizing walker that turns graph nodes into [`TaskUnit`]s.
#[derive(Debug)]
pub struct Composer<'g> {
    graph: &'g DependencyGraph,
    memo: HashMap<ModuleName, Arc<TaskUnit>>,
}

impl<'g> Composer<'g> {
    pub fn new(graph: &'g DependencyGraph) -> Self {
        Self {
            graph,
            memo: HashMap::new(),
        }
    }

    /// Compose the unit for `module`, reusing any unit built earlier in this
    /// run.
    pub fn compose(&mut self, module: &str) -> Arc<TaskUnit> {
        if let Some(unit) = self.memo.get(module) {
            return Arc::clone(unit);
        }

        let graph = self.graph;
        let upstream: Vec<&'g str> = graph
            .dependencies_of(module)
            .iter()
            .map(String::as_str)
            .filter(|m| graph.contains(m))
            .collect();

        let unit = if upstream.is_empty() {
            Arc::new(TaskUnit::Execute(module.to_string()))
        } else {
            let barrier = upstream.into_iter().map(|m| self.compose(m)).collect();
            Arc::new(TaskUnit::Sequence {
                barrier,
                then: module.to_string(),
            })
        };

        debug!(module = %module, unit = %unit, "composed unit");
        self.memo.insert(module.to_string(), Arc::clone(&unit));
        unit
    }

    /// Number of distinct units built so far.
    pub fn units_built(&self) -> usize {
        self.memo.len()
    }
}

/// Output of composing one orchestration request.
#[derive(Debug, Clone)]
pub struct ComposedRun {
    /// One unit per root, in request order.
    pub roots: Vec<Arc<TaskUnit>>,
    /// Distinct units materialised while composing.
    pub units_built: usize,
}

impl ComposedRun {
    /// Compose every requested module and keep the roots.
    pub fn compose(graph: &DependencyGraph) -> Self {
        let mut composer = Composer::new(graph);
        for module in graph.requested() {
            composer.compose(module);
        }

        let roots = graph
            .roots()
            .iter()
            .map(|root| composer.compose(root))
            .collect();

        Self {
            roots,
            units_built: composer.units_built(),
        }
    }

    pub fn root_modules(&self) -> Vec<&str> {
        self.roots.iter().map(|u| u.module()).collect()
    }
}
