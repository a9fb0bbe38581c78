// src/exec/backend.rs

//! Pluggable executor backend abstraction.
//!
//! The runtime talks to an `ExecutorBackend` instead of a raw mpsc sender.
//! This makes it easy to swap in a fake executor in tests while keeping the
//! production worker pool in [`executor_loop`](super::executor_loop).
//!
//! - `PoolExecutorBackend` is the default implementation used by the
//!   `Conductor`. It wraps the `spawn_executor` loop and forwards scheduled
//!   units over an mpsc channel.
//! - Tests can provide their own `ExecutorBackend` that, for example, records
//!   which units were scheduled and directly emits `UnitCompleted` events.

use std::future::Future;
use std::pin::Pin;

use tokio::sync::mpsc;

use crate::engine::{RuntimeEvent, ScheduledUnit};
use crate::errors::{ConductorError, Result};

use super::ExecContext;
use super::executor_loop::spawn_executor;

/// Trait abstracting how scheduled units are executed.
pub trait ExecutorBackend: Send {
    /// Dispatch the given units for execution.
    ///
    /// Every dispatched unit must eventually produce exactly one
    /// `RuntimeEvent::UnitCompleted`, or its run never finishes.
    fn spawn_ready_units(
        &mut self,
        units: Vec<ScheduledUnit>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Worker-pool backend used in production.
pub struct PoolExecutorBackend {
    tx: mpsc::Sender<ScheduledUnit>,
}

impl PoolExecutorBackend {
    /// Spawn the background executor loop with `workers` concurrent units,
    /// reporting completions on `runtime_tx`.
    pub fn new(ctx: ExecContext, workers: usize, runtime_tx: mpsc::Sender<RuntimeEvent>) -> Self {
        let tx = spawn_executor(ctx, workers, runtime_tx);
        Self { tx }
    }
}

impl ExecutorBackend for PoolExecutorBackend {
    fn spawn_ready_units(
        &mut self,
        units: Vec<ScheduledUnit>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        // Clone the sender so the future doesn't borrow `self` across `await`.
        let tx = self.tx.clone();

        Box::pin(async move {
            for unit in units {
                tx.send(unit).await.map_err(|e| {
                    ConductorError::RuntimeClosed(format!(
                        "executor loop stopped before accepting unit '{}'",
                        e.0.module
                    ))
                })?;
            }
            Ok(())
        })
    }
}
