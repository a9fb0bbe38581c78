// src/engine/runtime.rs

use std::collections::HashMap;
use std::fmt;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use crate::errors::Result;
use crate::exec::ExecutorBackend;

use super::core::CoreRuntime;
use super::{CoreCommand, RunId, RunSummary, RuntimeEvent, ScheduledUnit};

/// Drives the per-run barrier bookkeeping in response to `RuntimeEvent`s,
/// and delegates actual unit execution to an `ExecutorBackend`.
///
/// This is a pure IO shell around `CoreRuntime`, which contains all the
/// runtime semantics. This struct handles async IO: reading events from
/// channels, dispatching units to the executor and resolving run tickets.
pub struct Runtime<E: ExecutorBackend> {
    core: CoreRuntime,
    event_rx: mpsc::Receiver<RuntimeEvent>,
    executor: E,
    waiters: HashMap<RunId, oneshot::Sender<RunSummary>>,
}

impl<E: ExecutorBackend> fmt::Debug for Runtime<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("core", &self.core)
            .field("waiters", &self.waiters.len())
            .finish_non_exhaustive()
    }
}

impl<E: ExecutorBackend> Runtime<E> {
    pub fn new(core: CoreRuntime, event_rx: mpsc::Receiver<RuntimeEvent>, executor: E) -> Self {
        Self {
            core,
            event_rx,
            executor,
            waiters: HashMap::new(),
        }
    }

    /// Main event loop.
    ///
    /// - Consumes `RuntimeEvent`s from `event_rx`.
    /// - Feeds them into the core runtime.
    /// - Executes commands returned by the core (dispatch units, resolve
    ///   tickets, exit).
    pub async fn run(mut self) -> Result<()> {
        info!("conductor runtime started");

        loop {
            let event = match self.event_rx.recv().await {
                Some(e) => e,
                None => {
                    info!("runtime event channel closed; exiting");
                    break;
                }
            };

            debug!(?event, "runtime received event");

            let event = self.take_notifier(event);
            let step = self.core.step(event);

            for command in step.commands {
                self.execute_command(command).await?;
            }

            if !step.keep_running {
                info!("core requested exit; stopping runtime");
                break;
            }
        }

        if !self.waiters.is_empty() {
            info!(
                pending = self.waiters.len(),
                "runtime stopping with unfinished runs; their tickets will not resolve"
            );
        }

        info!("runtime exiting");
        Ok(())
    }

    /// The core never sees channels: keep the notifier here, keyed by run.
    fn take_notifier(&mut self, event: RuntimeEvent) -> RuntimeEvent {
        match event {
            RuntimeEvent::RunSubmitted { run, notify } => {
                if let Some(tx) = notify {
                    self.waiters.insert(run.run_id, tx);
                }
                RuntimeEvent::RunSubmitted { run, notify: None }
            }
            other => other,
        }
    }

    async fn execute_command(&mut self, command: CoreCommand) -> Result<()> {
        match command {
            CoreCommand::DispatchUnits(units) => {
                self.spawn_ready(units).await?;
            }
            CoreCommand::RunFinished(summary) => {
                let run_id = summary.run_id;
                if let Some(tx) = self.waiters.remove(&run_id) {
                    if tx.send(summary).is_err() {
                        debug!(run_id, "run ticket dropped; summary discarded");
                    }
                }
            }
            CoreCommand::RequestExit => {
                // The core already returns keep_running=false alongside this
                // command; nothing else to do.
                info!("core issued RequestExit command");
            }
        }
        Ok(())
    }

    async fn spawn_ready(&mut self, units: Vec<ScheduledUnit>) -> Result<()> {
        if units.is_empty() {
            return Ok(());
        }

        let modules: Vec<_> = units.iter().map(|u| u.module.as_str()).collect();
        debug!(?modules, run_id = units[0].run_id, "dispatching ready units");

        self.executor.spawn_ready_units(units).await
    }
}
