// src/engine/core.rs

//! Pure core runtime state machine.
//!
//! This module contains a synchronous, deterministic "core runtime" that
//! consumes [`RuntimeEvent`]s and produces:
//! - an updated core state
//! - a list of "commands" describing what the IO shell should do next
//!
//! The async/IO-heavy shell (`engine::runtime::Runtime`) is responsible for:
//! - reading events from channels
//! - sending `ScheduledUnit`s to the executor
//! - resolving run tickets
//!
//! The core is intended to be unit tested without any Tokio, channels or
//! processors.

use std::collections::HashMap;

use tracing::warn;

use crate::engine::event_handlers::{
    handle_run_submitted, handle_unit_completed, ActiveRun, CoreStep,
};
use crate::engine::{RunId, RuntimeEvent, RuntimeOptions};

/// Pure core runtime state.
///
/// This owns the bookkeeping of every active run and the runtime options.
/// It has **no** channels, no Tokio types, and does not perform any IO.
#[derive(Debug)]
pub struct CoreRuntime {
    runs: HashMap<RunId, ActiveRun>,
    options: RuntimeOptions,
}

impl CoreRuntime {
    pub fn new(options: RuntimeOptions) -> Self {
        Self {
            runs: HashMap::new(),
            options,
        }
    }

    /// Whether no run is active.
    pub fn is_idle(&self) -> bool {
        self.runs.is_empty()
    }

    pub fn active_runs(&self) -> usize {
        self.runs.len()
    }

    /// Handle a single runtime event, updating core state and returning the
    /// resulting commands for the IO shell.
    pub fn step(&mut self, event: RuntimeEvent) -> CoreStep {
        match event {
            RuntimeEvent::RunSubmitted { run, notify } => {
                if notify.is_some() {
                    warn!(
                        run_id = run.run_id,
                        "core received a run with a pending notifier; it will never fire"
                    );
                }
                handle_run_submitted(&mut self.runs, run)
            }
            RuntimeEvent::UnitCompleted {
                run_id,
                module,
                outcome,
            } => handle_unit_completed(&mut self.runs, &self.options, run_id, module, outcome),
            RuntimeEvent::ShutdownRequested => CoreStep {
                commands: Vec::new(),
                keep_running: false,
            },
        }
    }
}
