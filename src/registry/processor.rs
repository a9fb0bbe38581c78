// src/registry/processor.rs

//! The opaque processor contract.
//!
//! A processor receives a [`ProcessorInput`] describing the entity, the
//! capability it is being run under and the upstream results of every
//! subject, and produces a flat map of output fields.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store::EntityRef;

use super::ModuleName;

/// Output (and upstream input) of a module: field name -> JSON value.
pub type Fields = serde_json::Map<String, serde_json::Value>;

/// Processing shape a module can accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// One sample at a time.
    SingleEntity,
    /// A group, processed as the collection of its member samples.
    EntityCollection,
    /// A group, processed as a group in its own right.
    NativeGroup,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::SingleEntity => write!(f, "single_entity"),
            Capability::EntityCollection => write!(f, "entity_collection"),
            Capability::NativeGroup => write!(f, "native_group"),
        }
    }
}

/// One entity whose data is handed to a processor.
#[derive(Debug, Clone, Serialize)]
pub struct Subject {
    pub entity: EntityRef,
    /// Free-form entity metadata from the entity directory.
    pub metadata: Fields,
    /// Fields of each dependency module for this entity.
    pub upstream: BTreeMap<ModuleName, Fields>,
}

/// Everything a processor gets to see for one invocation.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessorInput {
    pub module: ModuleName,
    pub entity: EntityRef,
    pub shape: Capability,
    /// `[entity]` for single-entity and native-group runs, the group's
    /// members for collection runs.
    pub subjects: Vec<Subject>,
}

#[derive(Error, Debug)]
pub enum ProcessError {
    /// The module does not apply to this entity/shape; not a failure.
    #[error("unsupported shape: {0}")]
    UnsupportedShape(Capability),

    #[error("processing failed: {0}")]
    Failed(String),
}

pub type ProcessFuture =
    Pin<Box<dyn Future<Output = Result<Fields, ProcessError>> + Send + 'static>>;

/// Trait abstracting a module's computation.
///
/// The returned future must own everything it needs; the unit runner spawns
/// it on its own task so that a panic or a timeout cannot strand a status.
pub trait Processor: Send + Sync {
    fn process(&self, input: ProcessorInput) -> ProcessFuture;
}

struct FnProcessor<F> {
    f: Arc<F>,
}

impl<F> Processor for FnProcessor<F>
where
    F: Fn(ProcessorInput) -> Result<Fields, ProcessError> + Send + Sync + 'static,
{
    fn process(&self, input: ProcessorInput) -> ProcessFuture {
        let f = Arc::clone(&self.f);
        Box::pin(async move {
            match tokio::task::spawn_blocking(move || f(input)).await {
                Ok(result) => result,
                Err(e) => Err(ProcessError::Failed(format!("processor task failed: {e}"))),
            }
        })
    }
}

/// Wrap a synchronous function as a [`Processor`].
///
/// The function runs on Tokio's blocking pool. Blocking work cannot be
/// cancelled: when a processor timeout fires, the pair is marked ERROR but
/// the closure runs on to completion and its result is discarded. A retry
/// can therefore overlap the abandoned call, so closures with side effects
/// must tolerate running twice at once.
pub fn processor_fn<F>(f: F) -> Arc<dyn Processor>
where
    F: Fn(ProcessorInput) -> Result<Fields, ProcessError> + Send + Sync + 'static,
{
    Arc::new(FnProcessor { f: Arc::new(f) })
}
