// tests/processor_guards.rs

use std::error::Error;
use std::time::Duration;

use conductor::engine::{Conductor, UnitOutcome};
use conductor::registry::{processor_fn, Capability, ModuleDescriptor, ModuleRegistry, ProcessError};
use conductor::store::{EntityRef, MemoryResultStore, ResultStore, Status};
use conductor::types::StaleFieldPolicy;
use conductor_test_utils::fake_processor::{CallLog, RecordingProcessor};
use conductor_test_utils::{init_tracing, memory_context, single_sample, with_timeout};
use serde_json::json;

type TestResult = Result<(), Box<dyn Error>>;

fn s1() -> EntityRef {
    EntityRef::sample("s1")
}

#[tokio::test]
async fn slow_processor_times_out_into_error() -> TestResult {
    init_tracing();
    let log = CallLog::new();
    let registry = ModuleRegistry::from_table(vec![
        RecordingProcessor::new("slow", &log)
            .sleeping(Duration::from_secs(30))
            .descriptor(&[]),
        RecordingProcessor::new("quick", &log).descriptor(&[]),
    ])?;
    let (ctx, store) = memory_context(registry, single_sample());
    let conductor = Conductor::spawn(ctx.with_processor_timeout(Some(Duration::from_millis(50))), 2);

    let ticket = conductor.conduct("s1", None, false).await?;
    let summary = with_timeout(ticket.wait()).await?;

    assert_eq!(summary.outcome_of("slow"), Some(UnitOutcome::Failed));
    assert_eq!(summary.outcome_of("quick"), Some(UnitOutcome::Succeeded));
    assert_eq!(store.status_of(&s1(), "slow")?, Status::Error);

    conductor.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn missing_declared_field_is_a_processing_failure() -> TestResult {
    init_tracing();
    let log = CallLog::new();
    let registry = ModuleRegistry::from_table(vec![
        RecordingProcessor::new("partial", &log)
            .descriptor(&[])
            .produces("taxa"),
        RecordingProcessor::new("complete", &log)
            .with_field("taxa", json!([]))
            .descriptor(&[])
            .produces("taxa"),
    ])?;
    let (ctx, store) = memory_context(registry, single_sample());
    let conductor = Conductor::spawn(ctx, 2);

    let ticket = conductor.conduct("s1", None, false).await?;
    let summary = with_timeout(ticket.wait()).await?;

    assert_eq!(summary.outcome_of("partial"), Some(UnitOutcome::Failed));
    assert_eq!(summary.outcome_of("complete"), Some(UnitOutcome::Succeeded));
    assert!(store.fields_of(&s1(), "partial")?.unwrap_or_default().is_empty());

    conductor.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn closure_processors_run_on_the_blocking_pool() -> TestResult {
    init_tracing();
    let registry = ModuleRegistry::from_table(vec![
        ModuleDescriptor::new(
            "depth",
            processor_fn(|input| {
                let mut fields = conductor::registry::Fields::new();
                fields.insert("subjects".to_string(), json!(input.subjects.len()));
                Ok(fields)
            }),
        )
        .supports(Capability::SingleEntity),
        ModuleDescriptor::new(
            "refuses",
            processor_fn(|_| Err(ProcessError::UnsupportedShape(Capability::SingleEntity))),
        )
        .supports(Capability::SingleEntity),
    ])?;
    let (ctx, store) = memory_context(registry, single_sample());
    let conductor = Conductor::spawn(ctx, 2);

    let ticket = conductor.conduct("s1", None, false).await?;
    with_timeout(ticket.wait()).await?;

    assert_eq!(
        store.fields_of(&s1(), "depth")?.and_then(|f| f.get("subjects").cloned()),
        Some(json!(1))
    );
    assert_eq!(store.status_of(&s1(), "refuses")?, Status::Pending);

    conductor.shutdown().await?;
    Ok(())
}

fn reattempt_then_fail(store: &MemoryResultStore) -> conductor::errors::Result<()> {
    let s1 = s1();
    let mut fields = conductor::registry::Fields::new();
    fields.insert("taxa".to_string(), json!(7));

    store.begin(&s1, "kraken")?;
    store.finish_success(&s1, "kraken", fields)?;

    // Invalidated upstream, so the pair is re-triggered and then fails.
    store.restore(&s1, "kraken", Status::Pending)?;
    store.begin(&s1, "kraken")?;
    store.finish_error(&s1, "kraken")
}

#[test]
fn keep_policy_leaves_stale_fields_after_error() -> TestResult {
    init_tracing();
    let store = MemoryResultStore::with_policy(StaleFieldPolicy::Keep);
    reattempt_then_fail(&store)?;

    let result = store.get_or_create(&s1(), "kraken")?;
    assert_eq!(result.status, Status::Error);
    assert_eq!(result.fields.get("taxa"), Some(&json!(7)));
    Ok(())
}

#[test]
fn clear_policy_drops_fields_on_working_and_error() -> TestResult {
    init_tracing();
    let store = MemoryResultStore::with_policy(StaleFieldPolicy::Clear);
    reattempt_then_fail(&store)?;

    let result = store.get_or_create(&s1(), "kraken")?;
    assert_eq!(result.status, Status::Error);
    assert!(result.fields.is_empty());

    let mut fields = conductor::registry::Fields::new();
    fields.insert("taxa".to_string(), json!(1));
    store.restore(&s1(), "kraken", Status::Pending)?;
    store.begin(&s1(), "kraken")?;
    store.finish_success(&s1(), "kraken", fields)?;
    store.restore(&s1(), "kraken", Status::Error)?;

    store.begin(&s1(), "kraken")?;
    assert_eq!(store.fields_of(&s1(), "kraken")?, Some(Default::default()));
    Ok(())
}
