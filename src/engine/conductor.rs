// src/engine/conductor.rs

//! The `conduct` entry point.

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::dag::{prepare_run, PreparedRun};
use crate::errors::{ConductorError, Result};
use crate::exec::{ExecContext, PoolExecutorBackend};
use crate::registry::ModuleName;
use crate::store::EntityRef;

use super::{CoreRuntime, PlannedRun, RunId, RunSummary, Runtime, RuntimeEvent, RuntimeOptions};

/// Handle for one submitted run.
///
/// Dropping the ticket does not cancel anything.
#[derive(Debug)]
pub struct RunTicket {
    run_id: RunId,
    rx: oneshot::Receiver<RunSummary>,
}

impl RunTicket {
    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// Wait until every unit of the run has completed.
    pub async fn wait(self) -> Result<RunSummary> {
        let run_id = self.run_id;
        self.rx.await.map_err(|_| {
            ConductorError::RuntimeClosed(format!("runtime stopped before run {run_id} finished"))
        })
    }
}

/// Long-lived orchestrator: owns the runtime task and its worker pool.
///
/// Must be created inside a Tokio runtime.
#[derive(Debug)]
pub struct Conductor {
    ctx: ExecContext,
    tx: mpsc::Sender<RuntimeEvent>,
    next_run_id: AtomicU64,
    handle: JoinHandle<Result<()>>,
}

impl Conductor {
    pub fn spawn(ctx: ExecContext, workers: usize) -> Self {
        let (tx, rx) = mpsc::channel::<RuntimeEvent>(64);
        let executor = PoolExecutorBackend::new(ctx.clone(), workers, tx.clone());
        let core = CoreRuntime::new(RuntimeOptions::default());
        let runtime = Runtime::new(core, rx, executor);

        let handle = tokio::spawn(runtime.run());

        Self {
            ctx,
            tx,
            next_run_id: AtomicU64::new(1),
            handle,
        }
    }

    pub fn context(&self) -> &ExecContext {
        &self.ctx
    }

    /// Resolve and compose a request without submitting anything.
    pub fn plan(&self, requested: Option<&[ModuleName]>) -> Result<PreparedRun> {
        prepare_run(&self.ctx.registry, requested)
    }

    /// Trigger an orchestration run for one entity.
    ///
    /// Returns as soon as the run is enqueued. `None` requests every
    /// registered module. Unknown entities and configuration errors (unknown
    /// module, cycle) fail here, before any unit is submitted.
    pub async fn conduct(
        &self,
        entity_id: &str,
        requested: Option<&[ModuleName]>,
        is_group: bool,
    ) -> Result<RunTicket> {
        let entity = EntityRef::new(entity_id, is_group);
        if !self.ctx.entities.contains(&entity) {
            error!(%entity, "conduct called for unknown entity");
            return Err(ConductorError::UnknownEntity(entity.to_string()));
        }

        let prepared = match self.plan(requested) {
            Ok(prepared) => prepared,
            Err(err) => {
                error!(%entity, error = %err, "orchestration request rejected");
                return Err(err);
            }
        };

        let run_id = self.next_run_id.fetch_add(1, Ordering::Relaxed);
        let (notify, rx) = oneshot::channel();

        debug!(run_id, %entity, units = prepared.plan.len(), "submitting run");

        self.tx
            .send(RuntimeEvent::RunSubmitted {
                run: PlannedRun {
                    run_id,
                    entity,
                    plan: prepared.plan,
                },
                notify: Some(notify),
            })
            .await
            .map_err(|_| ConductorError::RuntimeClosed("runtime is not running".to_string()))?;

        Ok(RunTicket { run_id, rx })
    }

    /// Stop the runtime after it has handled every event queued so far.
    ///
    /// Units already handed to workers keep running; runs that are not
    /// finished never resolve their tickets.
    pub async fn shutdown(self) -> Result<()> {
        info!("conductor shutting down");
        if self.tx.send(RuntimeEvent::ShutdownRequested).await.is_err() {
            debug!("runtime already stopped");
        }

        match self.handle.await {
            Ok(result) => result,
            Err(e) => Err(ConductorError::RuntimeClosed(format!(
                "runtime task failed: {e}"
            ))),
        }
    }
}
