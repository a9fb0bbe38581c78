// src/exec/unit_runner.rs

//! Individual unit runner.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::engine::{ScheduledUnit, SkipReason, UnitOutcome};
use crate::errors::Result;
use crate::exec::eligibility::{self, Eligibility};
use crate::exec::ExecContext;
use crate::registry::{Capability, Fields, ModuleDescriptor, ProcessError, ProcessorInput};
use crate::store::{BeginOutcome, EntityRef, Status};

/// Run a single unit to completion and report how it ended.
///
/// Store failures are logged and reported as `Failed`; they never escape to
/// the rest of the run.
pub async fn run_unit(ctx: Arc<ExecContext>, unit: ScheduledUnit) -> UnitOutcome {
    match execute(&ctx, &unit).await {
        Ok(outcome) => outcome,
        Err(err) => {
            error!(
                run_id = unit.run_id,
                entity = %unit.entity,
                module = %unit.module,
                error = %err,
                "unit execution error"
            );
            UnitOutcome::Failed
        }
    }
}

async fn execute(ctx: &ExecContext, unit: &ScheduledUnit) -> Result<UnitOutcome> {
    let run_id = unit.run_id;
    let entity = &unit.entity;
    let module = unit.module.as_str();
    let descriptor = ctx.registry.lookup(module)?;

    let verdict = eligibility::check(
        descriptor,
        entity,
        &ctx.registry,
        ctx.store.as_ref(),
        ctx.entities.as_ref(),
    )?;
    let (shape, subjects) = match verdict {
        Eligibility::Eligible { shape, subjects } => (shape, subjects),
        Eligibility::UnsupportedShape => {
            debug!(run_id, %entity, module, "module does not apply to this entity; skipping");
            return Ok(UnitOutcome::Skipped(SkipReason::UnsupportedShape));
        }
        Eligibility::DependencyNotReady {
            subject,
            dependency,
            status,
        } => {
            debug!(
                run_id,
                %entity,
                module,
                %subject,
                dependency = %dependency,
                %status,
                "dependency not satisfied; skipping"
            );
            return Ok(UnitOutcome::Skipped(SkipReason::NotEligible));
        }
        Eligibility::EmptyCollection => {
            debug!(run_id, %entity, module, "group has no members; skipping");
            return Ok(UnitOutcome::Skipped(SkipReason::NotEligible));
        }
    };

    let previous = match ctx.store.begin(entity, module)? {
        BeginOutcome::Started { previous } => previous,
        BeginOutcome::Busy(status) => {
            debug!(run_id, %entity, module, %status, "already running or done; skipping");
            return Ok(UnitOutcome::Skipped(SkipReason::AlreadyRunningOrDone));
        }
    };

    info!(run_id, %entity, module, %shape, "starting processor");

    let owned = run_owned(ctx, unit, descriptor, shape, subjects, previous).await;
    if owned.is_err() {
        // The pair is ours: leave it in ERROR rather than WORKING.
        if let Err(release_err) = ctx.store.finish_error(entity, module) {
            error!(
                run_id,
                %entity,
                module,
                error = %release_err,
                "could not release pair after store error"
            );
        }
    }
    owned
}

/// Everything after a successful `begin`: invoke the processor and record
/// how it ended.
async fn run_owned(
    ctx: &ExecContext,
    unit: &ScheduledUnit,
    descriptor: &ModuleDescriptor,
    shape: Capability,
    subjects: Vec<EntityRef>,
    previous: Status,
) -> Result<UnitOutcome> {
    let run_id = unit.run_id;
    let entity = &unit.entity;
    let module = unit.module.as_str();

    let result = match eligibility::build_input(
        descriptor,
        entity,
        shape,
        subjects,
        ctx.store.as_ref(),
        ctx.entities.as_ref(),
    ) {
        Ok(input) => invoke(descriptor, input, ctx.processor_timeout).await,
        Err(err) => Err(ProcessError::Failed(format!("building processor input: {err}"))),
    };

    match result {
        Ok(fields) => {
            ctx.store.finish_success(entity, module, fields)?;
            info!(run_id, %entity, module, "module succeeded");
            Ok(UnitOutcome::Succeeded)
        }
        Err(ProcessError::UnsupportedShape(cap)) => {
            ctx.store.restore(entity, module, previous)?;
            debug!(
                run_id,
                %entity,
                module,
                capability = %cap,
                "processor reported unsupported shape; status restored"
            );
            Ok(UnitOutcome::Skipped(SkipReason::UnsupportedShape))
        }
        Err(ProcessError::Failed(reason)) => {
            ctx.store.finish_error(entity, module)?;
            warn!(run_id, %entity, module, error = %reason, "module failed");
            Ok(UnitOutcome::Failed)
        }
    }
}

/// Run the processor on its own task, so a panic or an expired deadline
/// turns into a failure instead of a stuck WORKING status.
async fn invoke(
    descriptor: &ModuleDescriptor,
    input: ProcessorInput,
    timeout: Option<Duration>,
) -> std::result::Result<Fields, ProcessError> {
    let mut handle = tokio::spawn(descriptor.processor().process(input));

    let joined = match timeout {
        Some(limit) => match tokio::time::timeout(limit, &mut handle).await {
            Ok(joined) => joined,
            Err(_) => {
                handle.abort();
                return Err(ProcessError::Failed(format!(
                    "processor timed out after {limit:?}"
                )));
            }
        },
        None => handle.await,
    };

    let fields = match joined {
        Ok(result) => result?,
        Err(e) => return Err(ProcessError::Failed(format!("processor task failed: {e}"))),
    };

    check_produced_fields(descriptor, &fields)?;
    Ok(fields)
}

fn check_produced_fields(
    descriptor: &ModuleDescriptor,
    fields: &Fields,
) -> std::result::Result<(), ProcessError> {
    let missing: Vec<&str> = descriptor
        .produced_fields()
        .iter()
        .filter(|f| !fields.contains_key(f.as_str()))
        .map(|f| f.as_str())
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(ProcessError::Failed(format!(
            "output is missing declared field(s): {}",
            missing.join(", ")
        )))
    }
}
