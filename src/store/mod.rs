// src/store/mod.rs

//! Result storage and status tracking.
//!
//! Every entity owns a [`ResultRecord`]: a map from module name to
//! [`ModuleResult`]. Entries are created lazily the first time a module is
//! addressed for an entity and move through
//! `PENDING -> WORKING -> {SUCCESS | ERROR}`. ERROR is not terminal; only
//! WORKING and SUCCESS block a new attempt.
//!
//! - [`entities`] holds entity identities and the membership interface.
//! - [`memory`] is the in-process store.
//! - [`file`] snapshots the in-process store to disk after every mutation.

pub mod entities;
pub mod file;
pub mod memory;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::Result;
use crate::registry::{Fields, ModuleName};

pub use entities::{EntityDirectory, EntityId, EntityKind, EntityRef, MemoryEntityDirectory};
pub use file::{FileResultStore, RESULTS_FILE_PATH};
pub use memory::MemoryResultStore;

/// Status of one (entity, module) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    Pending,
    Working,
    Success,
    Error,
}

impl Status {
    /// Whether a new attempt must be refused.
    pub fn blocks_new_attempt(&self) -> bool {
        matches!(self, Status::Working | Status::Success)
    }
}

impl Default for Status {
    fn default() -> Self {
        Status::Pending
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Pending => write!(f, "PENDING"),
            Status::Working => write!(f, "WORKING"),
            Status::Success => write!(f, "SUCCESS"),
            Status::Error => write!(f, "ERROR"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModuleResult {
    pub status: Status,
    #[serde(default)]
    pub fields: Fields,
}

/// All module results of a single entity.
pub type ResultRecord = BTreeMap<ModuleName, ModuleResult>;

/// Result of the atomic check-and-set performed by [`ResultStore::begin`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeginOutcome {
    /// The pair moved to WORKING; `previous` is the status it left.
    Started { previous: Status },
    /// The pair was already WORKING or SUCCESS and was left untouched.
    Busy(Status),
}

/// Storage for per-(entity, module) results.
///
/// Implementations must make [`ResultStore::begin`] a single atomic
/// check-and-set: two callers racing on the same PENDING pair must never
/// both observe `Started`.
pub trait ResultStore: Send + Sync {
    /// Current result for the pair, creating a PENDING entry if absent.
    fn get_or_create(&self, entity: &EntityRef, module: &str) -> Result<ModuleResult>;

    /// Current status for the pair; an absent entry reads as PENDING.
    fn status_of(&self, entity: &EntityRef, module: &str) -> Result<Status>;

    /// Fields currently stored for the pair, if an entry exists.
    fn fields_of(&self, entity: &EntityRef, module: &str) -> Result<Option<Fields>>;

    /// Move the pair to WORKING unless it is WORKING or SUCCESS.
    fn begin(&self, entity: &EntityRef, module: &str) -> Result<BeginOutcome>;

    /// `true` if the caller now owns the pair and must run the processor.
    fn try_begin(&self, entity: &EntityRef, module: &str) -> Result<bool> {
        Ok(matches!(
            self.begin(entity, module)?,
            BeginOutcome::Started { .. }
        ))
    }

    /// Write the processor's fields and mark SUCCESS.
    fn finish_success(&self, entity: &EntityRef, module: &str, fields: Fields) -> Result<()>;

    /// Mark ERROR without writing fields.
    fn finish_error(&self, entity: &EntityRef, module: &str) -> Result<()>;

    /// Put the pair back into `status` (used when an owned attempt turns out
    /// not to apply).
    fn restore(&self, entity: &EntityRef, module: &str, status: Status) -> Result<()>;

    /// Snapshot of every module result held for `entity`.
    fn record(&self, entity: &EntityRef) -> Result<ResultRecord>;
}
