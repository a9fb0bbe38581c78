use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use conductor::engine::{RuntimeEvent, ScheduledUnit, UnitOutcome};
use conductor::errors::{ConductorError, Result};
use conductor::exec::ExecutorBackend;
use tokio::sync::mpsc;

/// A fake executor that:
/// - records which units were "run"
/// - immediately reports UnitCompleted(Succeeded) for each scheduled unit.
pub struct FakeExecutor {
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    executed: Arc<Mutex<Vec<String>>>,
}

impl FakeExecutor {
    pub fn new(runtime_tx: mpsc::Sender<RuntimeEvent>) -> Self {
        Self {
            runtime_tx,
            executed: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Shared handle to the list of executed module names, in dispatch order.
    pub fn executed(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.executed)
    }
}

impl ExecutorBackend for FakeExecutor {
    fn spawn_ready_units(
        &mut self,
        units: Vec<ScheduledUnit>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let tx = self.runtime_tx.clone();
        let executed = Arc::clone(&self.executed);

        Box::pin(async move {
            for unit in units {
                executed.lock().unwrap().push(unit.module.clone());

                tx.send(RuntimeEvent::UnitCompleted {
                    run_id: unit.run_id,
                    module: unit.module,
                    outcome: UnitOutcome::Succeeded,
                })
                .await
                .map_err(|e| ConductorError::RuntimeClosed(e.to_string()))?;
            }
            Ok(())
        })
    }
}
