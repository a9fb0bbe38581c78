// src/store/memory.rs

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use tracing::debug;

use crate::errors::{ConductorError, Result};
use crate::registry::Fields;
use crate::types::StaleFieldPolicy;

use super::{BeginOutcome, EntityRef, ModuleResult, ResultRecord, ResultStore, Status};

/// Stores results in memory only.
///
/// A single mutex guards all records; every trait method holds it for the
/// whole read-modify-write, which is what makes `begin` atomic.
#[derive(Debug, Default)]
pub struct MemoryResultStore {
    records: Mutex<HashMap<EntityRef, ResultRecord>>,
    policy: StaleFieldPolicy,
}

impl MemoryResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(policy: StaleFieldPolicy) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            policy,
        }
    }

    /// Seed a store from previously saved records.
    pub fn from_records(records: HashMap<EntityRef, ResultRecord>, policy: StaleFieldPolicy) -> Self {
        Self {
            records: Mutex::new(records),
            policy,
        }
    }

    pub fn policy(&self) -> StaleFieldPolicy {
        self.policy
    }

    /// Copy of every record, keyed by entity.
    pub fn snapshot(&self) -> Result<HashMap<EntityRef, ResultRecord>> {
        Ok(self.lock()?.clone())
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<EntityRef, ResultRecord>>> {
        self.records
            .lock()
            .map_err(|_| ConductorError::StoreError("result store lock poisoned".to_string()))
    }

    fn with_entry<T>(
        &self,
        entity: &EntityRef,
        module: &str,
        f: impl FnOnce(&mut ModuleResult) -> T,
    ) -> Result<T> {
        let mut records = self.lock()?;
        let entry = records
            .entry(entity.clone())
            .or_default()
            .entry(module.to_string())
            .or_default();
        Ok(f(entry))
    }
}

impl ResultStore for MemoryResultStore {
    fn get_or_create(&self, entity: &EntityRef, module: &str) -> Result<ModuleResult> {
        self.with_entry(entity, module, |entry| entry.clone())
    }

    fn status_of(&self, entity: &EntityRef, module: &str) -> Result<Status> {
        let records = self.lock()?;
        Ok(records
            .get(entity)
            .and_then(|record| record.get(module))
            .map(|result| result.status)
            .unwrap_or_default())
    }

    fn fields_of(&self, entity: &EntityRef, module: &str) -> Result<Option<Fields>> {
        let records = self.lock()?;
        Ok(records
            .get(entity)
            .and_then(|record| record.get(module))
            .map(|result| result.fields.clone()))
    }

    fn begin(&self, entity: &EntityRef, module: &str) -> Result<BeginOutcome> {
        let policy = self.policy;
        self.with_entry(entity, module, |entry| {
            if entry.status.blocks_new_attempt() {
                debug!(
                    entity = %entity,
                    module = %module,
                    status = %entry.status,
                    "refusing to begin; pair already working or done"
                );
                return BeginOutcome::Busy(entry.status);
            }

            let previous = entry.status;
            entry.status = Status::Working;
            if policy == StaleFieldPolicy::Clear {
                entry.fields.clear();
            }
            debug!(entity = %entity, module = %module, %previous, "marked WORKING");
            BeginOutcome::Started { previous }
        })
    }

    fn finish_success(&self, entity: &EntityRef, module: &str, fields: Fields) -> Result<()> {
        self.with_entry(entity, module, |entry| {
            entry.status = Status::Success;
            entry.fields = fields;
            debug!(entity = %entity, module = %module, "marked SUCCESS");
        })
    }

    fn finish_error(&self, entity: &EntityRef, module: &str) -> Result<()> {
        let policy = self.policy;
        self.with_entry(entity, module, |entry| {
            entry.status = Status::Error;
            if policy == StaleFieldPolicy::Clear {
                entry.fields.clear();
            }
            debug!(entity = %entity, module = %module, "marked ERROR");
        })
    }

    fn restore(&self, entity: &EntityRef, module: &str, status: Status) -> Result<()> {
        self.with_entry(entity, module, |entry| {
            entry.status = status;
            debug!(entity = %entity, module = %module, %status, "restored status");
        })
    }

    fn record(&self, entity: &EntityRef) -> Result<ResultRecord> {
        let records = self.lock()?;
        Ok(records.get(entity).cloned().unwrap_or_default())
    }
}
