// src/store/file.rs

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::errors::{ConductorError, Result};
use crate::registry::Fields;
use crate::types::StaleFieldPolicy;

use super::{
    BeginOutcome, EntityRef, MemoryResultStore, ModuleResult, ResultRecord, ResultStore, Status,
};

/// Default location of the results file, relative to the config directory.
pub const RESULTS_FILE_PATH: &str = ".conductor/results.json";

/// On-disk layout: JSON object keys must be strings, so entities are stored
/// as a list next to their records.
#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    entities: Vec<EntitySnapshot>,
}

#[derive(Debug, Serialize, Deserialize)]
struct EntitySnapshot {
    entity: EntityRef,
    modules: ResultRecord,
}

/// Stores results in memory and rewrites a JSON snapshot after every
/// mutation.
#[derive(Debug)]
pub struct FileResultStore {
    inner: MemoryResultStore,
    path: PathBuf,
    /// Serialises snapshot writes so an older snapshot never lands last.
    write_lock: Mutex<()>,
}

impl FileResultStore {
    /// Open (or create) the store at `path`.
    ///
    /// Pairs left WORKING by a previous process are reset to PENDING: nothing
    /// else would ever release them.
    pub fn open(path: impl Into<PathBuf>, policy: StaleFieldPolicy) -> Result<Self> {
        let path = path.into();
        let mut records = load_snapshot(&path)?;

        let mut recovered = 0usize;
        for (entity, record) in records.iter_mut() {
            for (module, result) in record.iter_mut() {
                if result.status == Status::Working {
                    warn!(
                        entity = %entity,
                        module = %module,
                        "found WORKING result from a previous process; resetting to PENDING"
                    );
                    result.status = Status::Pending;
                    recovered += 1;
                }
            }
        }

        info!(
            path = ?path,
            entities = records.len(),
            recovered,
            "opened file result store"
        );

        let store = Self {
            inner: MemoryResultStore::from_records(records, policy),
            path,
            write_lock: Mutex::new(()),
        };
        if recovered > 0 {
            store.persist()?;
        }
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self) -> Result<()> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| ConductorError::StoreError("results file lock poisoned".to_string()))?;

        let records = self.inner.snapshot()?;
        save_snapshot(&self.path, records)?;
        debug!(path = ?self.path, "persisted result snapshot");
        Ok(())
    }
}

impl ResultStore for FileResultStore {
    fn get_or_create(&self, entity: &EntityRef, module: &str) -> Result<ModuleResult> {
        self.inner.get_or_create(entity, module)
    }

    fn status_of(&self, entity: &EntityRef, module: &str) -> Result<Status> {
        self.inner.status_of(entity, module)
    }

    fn fields_of(&self, entity: &EntityRef, module: &str) -> Result<Option<Fields>> {
        self.inner.fields_of(entity, module)
    }

    fn begin(&self, entity: &EntityRef, module: &str) -> Result<BeginOutcome> {
        let outcome = self.inner.begin(entity, module)?;
        if let BeginOutcome::Started { previous } = outcome {
            // An unpersisted claim must not strand the pair in WORKING.
            if let Err(err) = self.persist() {
                warn!(
                    entity = %entity,
                    module = %module,
                    error = %err,
                    "could not persist WORKING; releasing the pair"
                );
                self.inner.restore(entity, module, previous)?;
                return Err(err);
            }
        }
        Ok(outcome)
    }

    fn finish_success(&self, entity: &EntityRef, module: &str, fields: Fields) -> Result<()> {
        self.inner.finish_success(entity, module, fields)?;
        self.persist()
    }

    fn finish_error(&self, entity: &EntityRef, module: &str) -> Result<()> {
        self.inner.finish_error(entity, module)?;
        self.persist()
    }

    fn restore(&self, entity: &EntityRef, module: &str, status: Status) -> Result<()> {
        self.inner.restore(entity, module, status)?;
        self.persist()
    }

    fn record(&self, entity: &EntityRef) -> Result<ResultRecord> {
        self.inner.record(entity)
    }
}

fn load_snapshot(path: &Path) -> Result<HashMap<EntityRef, ResultRecord>> {
    if !path.exists() {
        return Ok(HashMap::new());
    }

    let file = File::open(path)?;
    let snapshot: Snapshot = serde_json::from_reader(BufReader::new(file))?;

    Ok(snapshot
        .entities
        .into_iter()
        .map(|e| (e.entity, e.modules))
        .collect())
}

fn save_snapshot(path: &Path, records: HashMap<EntityRef, ResultRecord>) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let mut entities: Vec<EntitySnapshot> = records
        .into_iter()
        .map(|(entity, modules)| EntitySnapshot { entity, modules })
        .collect();
    entities.sort_by(|a, b| a.entity.cmp(&b.entity));

    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, &Snapshot { entities })?;
    writer.flush()?;
    Ok(())
}
