// src/dag/plan.rs

//! Flattening of composed units into a dispatchable plan.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::info;

use crate::dag::compose::{ComposedRun, TaskUnit};
use crate::dag::graph::DependencyGraph;
use crate::errors::Result;
use crate::registry::{ModuleName, ModuleRegistry};

/// One module's place in an [`ExecutionPlan`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlannedUnit {
    /// Barrier members: modules that must complete before this one is
    /// dispatched.
    pub waits_on: Vec<ModuleName>,
    /// Modules whose barrier includes this one.
    pub dependents: Vec<ModuleName>,
}

/// Every unit reachable from the root units of a run, keyed by module.
///
/// A unit shared by several roots appears once, which is what keeps a
/// shared dependency to a single dispatch per run.
#[derive(Debug, Clone, Default)]
pub struct ExecutionPlan {
    units: BTreeMap<ModuleName, PlannedUnit>,
    roots: Vec<ModuleName>,
}

impl ExecutionPlan {
    pub fn from_roots(roots: &[Arc<TaskUnit>]) -> Self {
        let mut units: BTreeMap<ModuleName, PlannedUnit> = BTreeMap::new();
        let mut stack: Vec<&TaskUnit> = roots.iter().map(|u| u.as_ref()).collect();

        while let Some(unit) = stack.pop() {
            if units.contains_key(unit.module()) {
                continue;
            }

            let mut waits_on: Vec<ModuleName> = Vec::new();
            for upstream in unit.barrier() {
                let name = upstream.module().to_string();
                if !waits_on.contains(&name) {
                    waits_on.push(name);
                }
                stack.push(upstream.as_ref());
            }

            units.insert(
                unit.module().to_string(),
                PlannedUnit {
                    waits_on,
                    dependents: Vec::new(),
                },
            );
        }

        let edges: Vec<(ModuleName, ModuleName)> = units
            .iter()
            .flat_map(|(name, unit)| {
                unit.waits_on
                    .iter()
                    .map(move |upstream| (upstream.clone(), name.clone()))
            })
            .collect();
        for (upstream, dependent) in edges {
            if let Some(unit) = units.get_mut(&upstream) {
                unit.dependents.push(dependent);
            }
        }

        Self {
            units,
            roots: roots.iter().map(|u| u.module().to_string()).collect(),
        }
    }

    pub fn roots(&self) -> &[ModuleName] {
        &self.roots
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn contains(&self, module: &str) -> bool {
        self.units.contains_key(module)
    }

    pub fn unit(&self, module: &str) -> Option<&PlannedUnit> {
        self.units.get(module)
    }

    pub fn modules(&self) -> impl Iterator<Item = &str> {
        self.units.keys().map(|s| s.as_str())
    }

    /// Units with an empty barrier; dispatched as soon as the run starts.
    pub fn ready(&self) -> Vec<ModuleName> {
        self.units
            .iter()
            .filter(|(_, unit)| unit.waits_on.is_empty())
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn dependents_of(&self, module: &str) -> &[ModuleName] {
        self.units
            .get(module)
            .map(|u| u.dependents.as_slice())
            .unwrap_or(&[])
    }

    pub fn waits_on(&self, module: &str) -> &[ModuleName] {
        self.units
            .get(module)
            .map(|u| u.waits_on.as_slice())
            .unwrap_or(&[])
    }
}

/// Graph, composed units and flattened plan for one request.
#[derive(Debug, Clone)]
pub struct PreparedRun {
    pub graph: DependencyGraph,
    pub composed: ComposedRun,
    pub plan: ExecutionPlan,
}

/// Resolve, expand and compose a request without running anything.
///
/// `None` requests every registered module. Configuration errors (unknown
/// module, cycle) are returned here, before any unit could be submitted.
pub fn prepare_run(
    registry: &ModuleRegistry,
    requested: Option<&[ModuleName]>,
) -> Result<PreparedRun> {
    let graph = match requested {
        Some(names) => DependencyGraph::build(registry, names)?,
        None => DependencyGraph::build(registry, &registry.names())?,
    };

    let composed = ComposedRun::compose(&graph);
    let plan = ExecutionPlan::from_roots(&composed.roots);

    info!(
        requested = ?graph.requested(),
        roots = ?composed.root_modules(),
        units = plan.len(),
        "prepared orchestration run"
    );

    Ok(PreparedRun {
        graph,
        composed,
        plan,
    })
}
