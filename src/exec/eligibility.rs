// src/exec/eligibility.rs

//! Shape selection and dependency checks run before a unit may claim its
//! (entity, module) pair.
//!
//! Nothing here mutates the store.

use std::collections::BTreeMap;

use crate::errors::Result;
use crate::registry::{
    Capability, Fields, ModuleDescriptor, ModuleName, ModuleRegistry, ProcessorInput, Subject,
};
use crate::store::{EntityDirectory, EntityRef, ResultStore, Status};

/// Verdict of [`check`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Eligibility {
    /// Every dependency is SUCCESS for every subject.
    Eligible {
        shape: Capability,
        subjects: Vec<EntityRef>,
    },
    /// The module has no capability matching the entity kind.
    UnsupportedShape,
    /// `dependency` is not SUCCESS for `subject`.
    DependencyNotReady {
        subject: EntityRef,
        dependency: ModuleName,
        status: Status,
    },
    /// Collection run over a group with no members.
    EmptyCollection,
}

/// Pick the processing shape for `entity`.
///
/// Samples run as `SingleEntity`. Groups prefer `NativeGroup` and fall back
/// to `EntityCollection`.
pub fn select_shape(descriptor: &ModuleDescriptor, entity: &EntityRef) -> Option<Capability> {
    let preference: &[Capability] = if entity.is_group() {
        &[Capability::NativeGroup, Capability::EntityCollection]
    } else {
        &[Capability::SingleEntity]
    };

    preference
        .iter()
        .copied()
        .find(|cap| descriptor.has_capability(*cap))
}

/// Entities whose data the processor sees for a given shape.
pub fn subjects_for(
    shape: Capability,
    entity: &EntityRef,
    entities: &dyn EntityDirectory,
) -> Result<Vec<EntityRef>> {
    match shape {
        Capability::EntityCollection => entities.members(entity),
        Capability::SingleEntity | Capability::NativeGroup => Ok(vec![entity.clone()]),
    }
}

/// Decide whether `descriptor` may run for `entity` right now.
///
/// For collection runs the dependencies are checked on each member, since
/// that is where the upstream results live. A dependency that itself applies
/// to the group must also be SUCCESS on the group.
pub fn check(
    descriptor: &ModuleDescriptor,
    entity: &EntityRef,
    registry: &ModuleRegistry,
    store: &dyn ResultStore,
    entities: &dyn EntityDirectory,
) -> Result<Eligibility> {
    let Some(shape) = select_shape(descriptor, entity) else {
        return Ok(Eligibility::UnsupportedShape);
    };

    let subjects = subjects_for(shape, entity, entities)?;
    if subjects.is_empty() {
        return Ok(Eligibility::EmptyCollection);
    }

    if shape == Capability::EntityCollection {
        for dependency in descriptor.dependencies() {
            let upstream = registry.lookup(dependency)?;
            if select_shape(upstream, entity).is_none() {
                continue;
            }
            if let Some(not_ready) = not_ready(entity, dependency, store)? {
                return Ok(not_ready);
            }
        }
    }

    for subject in &subjects {
        for dependency in descriptor.dependencies() {
            if let Some(not_ready) = not_ready(subject, dependency, store)? {
                return Ok(not_ready);
            }
        }
    }

    Ok(Eligibility::Eligible { shape, subjects })
}

fn not_ready(
    subject: &EntityRef,
    dependency: &ModuleName,
    store: &dyn ResultStore,
) -> Result<Option<Eligibility>> {
    let status = store.status_of(subject, dependency)?;
    if status == Status::Success {
        return Ok(None);
    }
    Ok(Some(Eligibility::DependencyNotReady {
        subject: subject.clone(),
        dependency: dependency.clone(),
        status,
    }))
}

/// Assemble the processor payload: metadata plus the fields of every
/// dependency, per subject.
pub fn build_input(
    descriptor: &ModuleDescriptor,
    entity: &EntityRef,
    shape: Capability,
    subjects: Vec<EntityRef>,
    store: &dyn ResultStore,
    entities: &dyn EntityDirectory,
) -> Result<ProcessorInput> {
    let mut prepared = Vec::with_capacity(subjects.len());

    for subject in subjects {
        let mut upstream: BTreeMap<ModuleName, Fields> = BTreeMap::new();
        for dependency in descriptor.dependencies() {
            let fields = store.fields_of(&subject, dependency)?.unwrap_or_default();
            upstream.insert(dependency.clone(), fields);
        }

        prepared.push(Subject {
            metadata: entities.metadata(&subject),
            entity: subject,
            upstream,
        });
    }

    Ok(ProcessorInput {
        module: descriptor.name().to_string(),
        entity: entity.clone(),
        shape,
        subjects: prepared,
    })
}
