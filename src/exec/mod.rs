// src/exec/mod.rs

//! Unit execution layer.
//!
//! This module is responsible for actually running scheduled units against
//! the result store and reporting back to the orchestration runtime via
//! `RuntimeEvent`s.
//!
//! - [`executor_loop`] owns the bounded worker pool.
//! - [`unit_runner`] implements the per-unit state machine
//!   (eligibility, check-and-set, processor, outcome).
//! - [`eligibility`] selects the processing shape and checks dependencies.
//! - [`backend`] provides the `ExecutorBackend` trait and the
//!   `PoolExecutorBackend` the runtime uses in production, and which tests
//!   can replace with a fake implementation.

pub mod backend;
pub mod eligibility;
pub mod executor_loop;
pub mod unit_runner;

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::config::ConfigFile;
use crate::errors::{ConductorError, Result};
use crate::registry::ModuleRegistry;
use crate::store::{
    EntityDirectory, FileResultStore, MemoryEntityDirectory, MemoryResultStore, ResultStore,
};
use crate::types::ResultStorageMode;

pub use backend::{ExecutorBackend, PoolExecutorBackend};
pub use eligibility::Eligibility;
pub use executor_loop::spawn_executor;
pub use unit_runner::run_unit;

/// Shared collaborators every unit needs.
#[derive(Clone)]
pub struct ExecContext {
    pub registry: Arc<ModuleRegistry>,
    pub store: Arc<dyn ResultStore>,
    pub entities: Arc<dyn EntityDirectory>,
    /// Deadline for a single processor invocation; `None` waits forever.
    ///
    /// Expiry aborts async processors and kills command processors. Closures
    /// from `processor_fn` keep running on the blocking pool.
    pub processor_timeout: Option<Duration>,
}

impl fmt::Debug for ExecContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecContext")
            .field("modules", &self.registry.names())
            .field("processor_timeout", &self.processor_timeout)
            .finish_non_exhaustive()
    }
}

impl ExecContext {
    pub fn new(
        registry: Arc<ModuleRegistry>,
        store: Arc<dyn ResultStore>,
        entities: Arc<dyn EntityDirectory>,
    ) -> Self {
        Self {
            registry,
            store,
            entities,
            processor_timeout: None,
        }
    }

    pub fn with_processor_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.processor_timeout = timeout;
        self
    }

    /// Wire registry, store and entities from a validated config.
    ///
    /// `root` is the directory relative paths (module working directory,
    /// results file) are resolved against.
    pub fn from_config(cfg: &ConfigFile, root: &Path) -> Result<Self> {
        let registry = Arc::new(ModuleRegistry::from_config(cfg, root)?);
        let entities: Arc<dyn EntityDirectory> = Arc::new(MemoryEntityDirectory::from_config(cfg));

        let policy = cfg.config.stale_fields;
        let store: Arc<dyn ResultStore> = match cfg.config.result_storage {
            ResultStorageMode::Memory => Arc::new(MemoryResultStore::with_policy(policy)),
            ResultStorageMode::File => {
                let path = root.join(cfg.config.results_path());
                info!(path = %path.display(), "using file-backed result store");
                Arc::new(FileResultStore::open(path, policy)?)
            }
        };

        let timeout = cfg
            .config
            .processor_timeout()
            .map_err(ConductorError::ConfigError)?;

        Ok(Self::new(registry, store, entities).with_processor_timeout(timeout))
    }
}
