// src/store/entities.rs

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::ConfigFile;
use crate::errors::{ConductorError, Result};
use crate::registry::Fields;

pub type EntityId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Sample,
    Group,
}

/// Stable identity of a sample or a sample group.
///
/// Samples and groups live in separate id spaces, so the kind is part of the
/// key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityRef {
    pub kind: EntityKind,
    pub id: EntityId,
}

impl EntityRef {
    pub fn new(id: impl Into<EntityId>, is_group: bool) -> Self {
        if is_group {
            Self::group(id)
        } else {
            Self::sample(id)
        }
    }

    pub fn sample(id: impl Into<EntityId>) -> Self {
        Self {
            kind: EntityKind::Sample,
            id: id.into(),
        }
    }

    pub fn group(id: impl Into<EntityId>) -> Self {
        Self {
            kind: EntityKind::Group,
            id: id.into(),
        }
    }

    pub fn is_group(&self) -> bool {
        self.kind == EntityKind::Group
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            EntityKind::Sample => write!(f, "sample:{}", self.id),
            EntityKind::Group => write!(f, "group:{}", self.id),
        }
    }
}

/// Read-only view of which entities exist and which samples a group owns.
pub trait EntityDirectory: Send + Sync {
    fn contains(&self, entity: &EntityRef) -> bool;

    /// Member samples of a group, in declaration order.
    fn members(&self, group: &EntityRef) -> Result<Vec<EntityRef>>;

    /// Free-form metadata handed to processors; empty when none is known.
    fn metadata(&self, entity: &EntityRef) -> Fields;
}

#[derive(Debug, Clone, Default)]
pub struct MemoryEntityDirectory {
    samples: BTreeMap<EntityId, Fields>,
    groups: BTreeMap<EntityId, Vec<EntityId>>,
}

impl MemoryEntityDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from the `[sample.*]` / `[group.*]` sections of a validated config.
    pub fn from_config(cfg: &ConfigFile) -> Self {
        let mut dir = Self::new();
        for (id, sample) in cfg.sample.iter() {
            dir.add_sample_with_metadata(id.clone(), sample.metadata.clone());
        }
        for (id, group) in cfg.group.iter() {
            dir.add_group(id.clone(), group.members.iter().cloned());
        }
        dir
    }

    pub fn add_sample(&mut self, id: impl Into<EntityId>) -> &mut Self {
        self.samples.insert(id.into(), Fields::new());
        self
    }

    pub fn add_sample_with_metadata(&mut self, id: impl Into<EntityId>, metadata: Fields) -> &mut Self {
        self.samples.insert(id.into(), metadata);
        self
    }

    pub fn add_group<I, S>(&mut self, id: impl Into<EntityId>, members: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<EntityId>,
    {
        self.groups
            .insert(id.into(), members.into_iter().map(Into::into).collect());
        self
    }
}

impl EntityDirectory for MemoryEntityDirectory {
    fn contains(&self, entity: &EntityRef) -> bool {
        match entity.kind {
            EntityKind::Sample => self.samples.contains_key(&entity.id),
            EntityKind::Group => self.groups.contains_key(&entity.id),
        }
    }

    fn members(&self, group: &EntityRef) -> Result<Vec<EntityRef>> {
        if !group.is_group() {
            return Err(ConductorError::UnknownEntity(format!(
                "{group} is not a group"
            )));
        }

        self.groups
            .get(&group.id)
            .map(|ids| ids.iter().map(|id| EntityRef::sample(id.clone())).collect())
            .ok_or_else(|| ConductorError::UnknownEntity(group.to_string()))
    }

    fn metadata(&self, entity: &EntityRef) -> Fields {
        match entity.kind {
            EntityKind::Sample => self.samples.get(&entity.id).cloned().unwrap_or_default(),
            EntityKind::Group => Fields::new(),
        }
    }
}
