// src/exec/executor_loop.rs

//! Main executor loop that feeds scheduled units to a bounded worker pool.

use std::sync::Arc;

use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, error, info};

use crate::engine::{RuntimeEvent, ScheduledUnit, UnitOutcome};
use crate::exec::unit_runner::run_unit;
use crate::exec::ExecContext;

/// Spawn the background executor loop.
///
/// The returned `mpsc::Sender<ScheduledUnit>` is what the runtime (or
/// `PoolExecutorBackend`) uses to hand over units. Each unit runs in its own
/// Tokio task, but **at most `workers` units execute at the same time**; the
/// rest wait for a permit.
///
/// The loop itself never waits for a permit, so the runtime can always hand
/// over units while workers are reporting completions.
pub fn spawn_executor(
    ctx: ExecContext,
    workers: usize,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
) -> mpsc::Sender<ScheduledUnit> {
    let (tx, mut rx) = mpsc::channel::<ScheduledUnit>(64);
    let permits = Arc::new(Semaphore::new(workers.max(1)));
    let ctx = Arc::new(ctx);

    tokio::spawn(async move {
        info!(workers, "executor loop started");

        while let Some(unit) = rx.recv().await {
            let ctx = Arc::clone(&ctx);
            let permits = Arc::clone(&permits);
            let rt_tx = runtime_tx.clone();

            tokio::spawn(async move {
                handle_scheduled_unit(unit, ctx, permits, rt_tx).await;
            });
        }

        info!("executor loop finished (channel closed)");
    });

    tx
}

async fn handle_scheduled_unit(
    unit: ScheduledUnit,
    ctx: Arc<ExecContext>,
    permits: Arc<Semaphore>,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
) {
    let run_id = unit.run_id;
    let module = unit.module.clone();

    let outcome = match permits.acquire_owned().await {
        Ok(_permit) => {
            debug!(run_id, module = %module, entity = %unit.entity, "worker picked up unit");
            // A panic inside the runner must still complete the unit.
            match tokio::spawn(run_unit(ctx, unit)).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(run_id, module = %module, error = %e, "unit runner task failed");
                    UnitOutcome::Failed
                }
            }
        }
        Err(e) => {
            error!(run_id, module = %module, error = %e, "worker pool closed");
            UnitOutcome::Failed
        }
    };

    if runtime_tx
        .send(RuntimeEvent::UnitCompleted {
            run_id,
            module: module.clone(),
            outcome,
        })
        .await
        .is_err()
    {
        debug!(run_id, module = %module, "runtime gone; dropping unit completion");
    }
}
