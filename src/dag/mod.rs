// src/dag/mod.rs

//! Dependency resolution and composition.
//!
//! - [`graph`] expands requested modules into their dependency closure.
//! - [`compose`] turns the closure into memoized, shareable execution units.
//! - [`plan`] flattens root units into a plan the runtime dispatches from.

pub mod compose;
pub mod graph;
pub mod plan;

pub use compose::{ComposedRun, Composer, TaskUnit};
pub use graph::DependencyGraph;
pub use plan::{prepare_run, ExecutionPlan, PlannedUnit, PreparedRun};
