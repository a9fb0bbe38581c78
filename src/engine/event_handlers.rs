// src/engine/event_handlers.rs

//! Event handling logic for the core runtime.

use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::{debug, info, warn};

use crate::dag::ExecutionPlan;
use crate::engine::{
    PlannedRun, RunId, RunSummary, RuntimeOptions, ScheduledUnit, UnitOutcome,
};
use crate::registry::ModuleName;
use crate::store::EntityRef;

/// Command produced by the pure core, to be executed by the outer IO shell.
#[derive(Debug, Clone)]
pub enum CoreCommand {
    /// Send these units to the executor.
    DispatchUnits(Vec<ScheduledUnit>),
    /// Every unit of a run has completed.
    RunFinished(RunSummary),
    /// Request that the runtime exits (used with `exit_when_idle`).
    RequestExit,
}

/// Decision returned by the core after handling a single `RuntimeEvent`.
#[derive(Debug, Clone)]
pub struct CoreStep {
    /// Commands the IO shell should execute.
    pub commands: Vec<CoreCommand>,
    /// Whether the outer runtime loop should keep running.
    pub keep_running: bool,
}

impl CoreStep {
    fn continue_with(commands: Vec<CoreCommand>) -> Self {
        Self {
            commands,
            keep_running: true,
        }
    }
}

/// Bookkeeping for a run that still has outstanding units.
#[derive(Debug)]
pub struct ActiveRun {
    entity: EntityRef,
    plan: ExecutionPlan,
    /// Barrier members still outstanding, per not-yet-dispatched unit.
    waiting: HashMap<ModuleName, usize>,
    dispatched: HashSet<ModuleName>,
    outcomes: BTreeMap<ModuleName, UnitOutcome>,
}

impl ActiveRun {
    fn new(run: PlannedRun) -> Self {
        let waiting = run
            .plan
            .modules()
            .map(|m| (m.to_string(), run.plan.waits_on(m).len()))
            .collect();

        Self {
            entity: run.entity,
            plan: run.plan,
            waiting,
            dispatched: HashSet::new(),
            outcomes: BTreeMap::new(),
        }
    }

    fn is_complete(&self) -> bool {
        self.outcomes.len() == self.plan.len()
    }

    fn schedule(&mut self, run_id: RunId, modules: Vec<ModuleName>) -> Vec<ScheduledUnit> {
        let mut scheduled = Vec::new();
        for module in modules {
            if !self.dispatched.insert(module.clone()) {
                continue;
            }
            self.waiting.remove(&module);
            scheduled.push(ScheduledUnit {
                run_id,
                entity: self.entity.clone(),
                module,
            });
        }
        scheduled
    }

    fn summary(self, run_id: RunId) -> RunSummary {
        RunSummary {
            run_id,
            entity: self.entity,
            outcomes: self.outcomes,
        }
    }
}

/// Handle a newly submitted run: register it and dispatch every unit whose
/// barrier is empty.
pub fn handle_run_submitted(
    runs: &mut HashMap<RunId, ActiveRun>,
    run: PlannedRun,
) -> CoreStep {
    let run_id = run.run_id;

    if runs.contains_key(&run_id) {
        warn!(run_id, "run submitted twice; ignoring duplicate");
        return CoreStep::continue_with(Vec::new());
    }

    if run.plan.is_empty() {
        info!(run_id, entity = %run.entity, "run has no units; finishing immediately");
        let summary = RunSummary {
            run_id,
            entity: run.entity,
            outcomes: BTreeMap::new(),
        };
        return CoreStep::continue_with(vec![CoreCommand::RunFinished(summary)]);
    }

    info!(
        run_id,
        entity = %run.entity,
        roots = ?run.plan.roots(),
        units = run.plan.len(),
        "starting orchestration run"
    );

    let mut active = ActiveRun::new(run);
    let ready = active.plan.ready();
    let scheduled = active.schedule(run_id, ready);
    runs.insert(run_id, active);

    let mut commands = Vec::new();
    if !scheduled.is_empty() {
        commands.push(CoreCommand::DispatchUnits(scheduled));
    }
    CoreStep::continue_with(commands)
}

/// Handle completion of a unit: release dependents whose barrier is now
/// fully completed, and finish the run once every unit has reported.
pub fn handle_unit_completed(
    runs: &mut HashMap<RunId, ActiveRun>,
    options: &RuntimeOptions,
    run_id: RunId,
    module: ModuleName,
    outcome: UnitOutcome,
) -> CoreStep {
    let mut commands = Vec::new();

    let Some(active) = runs.get_mut(&run_id) else {
        warn!(run_id, module = %module, "completion for unknown run; ignoring");
        return CoreStep::continue_with(commands);
    };

    if !active.dispatched.contains(&module) {
        warn!(run_id, module = %module, "completion for a unit that was never dispatched; ignoring");
        return CoreStep::continue_with(commands);
    }

    if active.outcomes.contains_key(&module) {
        warn!(run_id, module = %module, "duplicate completion; ignoring");
        return CoreStep::continue_with(commands);
    }

    debug!(run_id, module = %module, %outcome, "unit completed");
    active.outcomes.insert(module.clone(), outcome);

    let mut released = Vec::new();
    for dependent in active.plan.dependents_of(&module) {
        if let Some(remaining) = active.waiting.get_mut(dependent) {
            *remaining = remaining.saturating_sub(1);
            if *remaining == 0 {
                released.push(dependent.clone());
            }
        }
    }

    let scheduled = active.schedule(run_id, released);
    if !scheduled.is_empty() {
        debug!(
            run_id,
            after = %module,
            released = ?scheduled.iter().map(|u| u.module.as_str()).collect::<Vec<_>>(),
            "barrier complete; releasing dependents"
        );
        commands.push(CoreCommand::DispatchUnits(scheduled));
    }

    if active.is_complete() {
        if let Some(finished) = runs.remove(&run_id) {
            let summary = finished.summary(run_id);
            info!(run_id, entity = %summary.entity, "orchestration run finished");
            commands.push(CoreCommand::RunFinished(summary));
        }
    }

    let mut keep_running = true;
    if options.exit_when_idle && runs.is_empty() {
        keep_running = false;
        commands.push(CoreCommand::RequestExit);
    }

    CoreStep {
        commands,
        keep_running,
    }
}
