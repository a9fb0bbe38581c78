// src/engine/mod.rs

//! Orchestration engine for conductor.
//!
//! This module ties together:
//! - the per-run barrier bookkeeping (which unit may be dispatched once its
//!   upstream units have completed)
//! - the main runtime event loop that reacts to:
//!   - newly submitted orchestration runs
//!   - unit completion events from the executor
//!   - shutdown requests
//! - the [`Conductor`] facade with the `conduct` entry point.
//!
//! The pure core state machine lives in [`core`]; the async/IO shell is
//! implemented in [`runtime`].

use std::collections::BTreeMap;
use std::fmt;

use tokio::sync::oneshot;

use crate::dag::ExecutionPlan;
use crate::registry::ModuleName;
use crate::store::EntityRef;

/// Identifier of one orchestration run.
pub type RunId = u64;

/// Why a unit completed without invoking its processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// A dependency has not succeeded for the entity (or a collection member).
    NotEligible,
    /// The (entity, module) pair is already WORKING or SUCCESS.
    AlreadyRunningOrDone,
    /// The module does not apply to this entity's shape.
    UnsupportedShape,
}

/// How a unit completed. Every variant counts as completion for barriers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitOutcome {
    Succeeded,
    Failed,
    Skipped(SkipReason),
}

impl fmt::Display for UnitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitOutcome::Succeeded => write!(f, "succeeded"),
            UnitOutcome::Failed => write!(f, "failed"),
            UnitOutcome::Skipped(SkipReason::NotEligible) => write!(f, "skipped (not eligible)"),
            UnitOutcome::Skipped(SkipReason::AlreadyRunningOrDone) => {
                write!(f, "skipped (already running or done)")
            }
            UnitOutcome::Skipped(SkipReason::UnsupportedShape) => {
                write!(f, "skipped (unsupported shape)")
            }
        }
    }
}

/// A unit the core wants the executor to run now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledUnit {
    pub run_id: RunId,
    pub entity: EntityRef,
    pub module: ModuleName,
}

/// A run ready for dispatch: the target entity plus its flattened plan.
#[derive(Debug, Clone)]
pub struct PlannedRun {
    pub run_id: RunId,
    pub entity: EntityRef,
    pub plan: ExecutionPlan,
}

/// Final per-module outcomes of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub run_id: RunId,
    pub entity: EntityRef,
    pub outcomes: BTreeMap<ModuleName, UnitOutcome>,
}

impl RunSummary {
    pub fn outcome_of(&self, module: &str) -> Option<UnitOutcome> {
        self.outcomes.get(module).copied()
    }
}

/// Runtime options used by both the core and the async shell.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuntimeOptions {
    /// If true, exit the runtime once no run is active anymore.
    pub exit_when_idle: bool,
}

/// Events flowing into the runtime from the conductor and the executor.
#[derive(Debug)]
pub enum RuntimeEvent {
    /// A new orchestration run was prepared and should be dispatched.
    RunSubmitted {
        run: PlannedRun,
        /// Resolved with the run's summary once every unit has completed.
        notify: Option<oneshot::Sender<RunSummary>>,
    },
    /// A unit finished (succeeded, failed or skipped).
    UnitCompleted {
        run_id: RunId,
        module: ModuleName,
        outcome: UnitOutcome,
    },
    /// Graceful shutdown requested.
    ShutdownRequested,
}

pub mod conductor;
pub mod core;
pub mod event_handlers;
pub mod runtime;

pub use conductor::{Conductor, RunTicket};
pub use core::CoreRuntime;
pub use event_handlers::{CoreCommand, CoreStep};
pub use runtime::Runtime;
