// tests/file_store.rs

use std::error::Error;
use std::fs;
use std::sync::Arc;
use std::time::Duration;

use conductor::engine::{Conductor, UnitOutcome};
use conductor::exec::ExecContext;
use conductor::registry::ModuleRegistry;
use conductor::store::{BeginOutcome, EntityRef, FileResultStore, ResultStore, Status};
use conductor::types::StaleFieldPolicy;
use conductor_test_utils::fake_processor::{recording_module, CallLog, RecordingProcessor};
use conductor_test_utils::{init_tracing, names, single_sample, with_timeout};
use serde_json::json;
use tokio::sync::Notify;
use tokio::time::sleep;

type TestResult = Result<(), Box<dyn Error>>;

fn fields(value: serde_json::Value) -> conductor::registry::Fields {
    match value {
        serde_json::Value::Object(map) => map,
        _ => panic!("fields must be an object"),
    }
}

#[test]
fn results_survive_reopen() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("nested").join("results.json");
    let s1 = EntityRef::sample("s1");
    let g = EntityRef::group("s1");

    {
        let store = FileResultStore::open(&path, StaleFieldPolicy::Keep)?;
        store.begin(&s1, "kraken")?;
        store.finish_success(&s1, "kraken", fields(json!({ "taxa": 12 })))?;
        store.begin(&g, "sim")?;
        store.finish_error(&g, "sim")?;
    }

    assert!(path.exists());

    let reopened = FileResultStore::open(&path, StaleFieldPolicy::Keep)?;
    assert_eq!(reopened.status_of(&s1, "kraken")?, Status::Success);
    assert_eq!(
        reopened.fields_of(&s1, "kraken")?.and_then(|f| f.get("taxa").cloned()),
        Some(json!(12))
    );
    // Same id, different kind: kept apart.
    assert_eq!(reopened.status_of(&g, "sim")?, Status::Error);
    assert_eq!(reopened.status_of(&s1, "sim")?, Status::Pending);
    Ok(())
}

#[test]
fn working_entries_are_reset_on_open() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("results.json");
    let s1 = EntityRef::sample("s1");

    {
        let store = FileResultStore::open(&path, StaleFieldPolicy::Keep)?;
        assert!(store.try_begin(&s1, "kraken")?);
        // Process "crashes" here, leaving WORKING on disk.
    }

    let reopened = FileResultStore::open(&path, StaleFieldPolicy::Keep)?;
    assert_eq!(reopened.status_of(&s1, "kraken")?, Status::Pending);

    // The reset is written back immediately.
    let raw = std::fs::read_to_string(&path)?;
    assert!(!raw.contains("\"WORKING\""));
    assert!(raw.contains("\"PENDING\""));

    assert_eq!(
        reopened.begin(&s1, "kraken")?,
        BeginOutcome::Started {
            previous: Status::Pending
        }
    );
    Ok(())
}

#[test]
fn missing_file_opens_empty() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let store = FileResultStore::open(dir.path().join("none.json"), StaleFieldPolicy::Keep)?;

    let s1 = EntityRef::sample("s1");
    assert!(store.record(&s1)?.is_empty());
    assert_eq!(store.get_or_create(&s1, "kraken")?.status, Status::Pending);
    assert_eq!(store.record(&s1)?.len(), 1);
    Ok(())
}

#[test]
fn corrupt_file_is_a_json_error() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("results.json");
    std::fs::write(&path, "{ not json")?;

    let err = FileResultStore::open(&path, StaleFieldPolicy::Keep).unwrap_err();
    assert!(matches!(err, conductor::errors::ConductorError::JsonError(_)));
    Ok(())
}

#[test]
fn unpersisted_begin_releases_the_pair() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    // A regular file where the results directory should be.
    let blocker = dir.path().join("blocker");
    fs::write(&blocker, "")?;
    let store = FileResultStore::open(blocker.join("results.json"), StaleFieldPolicy::Keep)?;
    let s1 = EntityRef::sample("s1");

    assert!(store.begin(&s1, "kraken").is_err());
    assert_eq!(store.status_of(&s1, "kraken")?, Status::Pending);

    fs::remove_file(&blocker)?;
    assert_eq!(
        store.begin(&s1, "kraken")?,
        BeginOutcome::Started {
            previous: Status::Pending
        }
    );
    Ok(())
}

fn spawn_on(store: Arc<FileResultStore>, registry: ModuleRegistry) -> Conductor {
    let ctx = ExecContext::new(Arc::new(registry), store, Arc::new(single_sample()));
    Conductor::spawn(ctx, 2)
}

#[tokio::test]
async fn unwritable_store_does_not_block_later_runs() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let blocker = dir.path().join("blocker");
    fs::write(&blocker, "")?;
    let store = Arc::new(FileResultStore::open(
        blocker.join("results.json"),
        StaleFieldPolicy::Keep,
    )?);
    let log = CallLog::new();
    let registry = ModuleRegistry::from_table(vec![recording_module("A", &[], &log)])?;
    let conductor = spawn_on(store.clone(), registry);
    let s1 = EntityRef::sample("s1");
    let request = names(&["A"]);

    let first = conductor.conduct("s1", Some(request.as_slice()), false).await?;
    let first = with_timeout(first.wait()).await?;
    assert_eq!(first.outcome_of("A"), Some(UnitOutcome::Failed));
    assert_eq!(store.status_of(&s1, "A")?, Status::Pending);
    assert_eq!(log.count("A"), 0);

    fs::remove_file(&blocker)?;

    let second = conductor.conduct("s1", Some(request.as_slice()), false).await?;
    let second = with_timeout(second.wait()).await?;
    assert_eq!(second.outcome_of("A"), Some(UnitOutcome::Succeeded));
    assert_eq!(store.status_of(&s1, "A")?, Status::Success);
    assert_eq!(log.count("A"), 1);

    conductor.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn failed_final_write_leaves_error_not_working() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let results_dir = dir.path().join("results");
    let store = Arc::new(FileResultStore::open(
        results_dir.join("results.json"),
        StaleFieldPolicy::Keep,
    )?);
    let log = CallLog::new();
    let gate = Arc::new(Notify::new());
    let registry = ModuleRegistry::from_table(vec![
        RecordingProcessor::new("A", &log)
            .gated(gate.clone())
            .descriptor(&[]),
    ])?;
    let conductor = spawn_on(store.clone(), registry);
    let s1 = EntityRef::sample("s1");
    let request = names(&["A"]);

    let first = conductor.conduct("s1", Some(request.as_slice()), false).await?;
    with_timeout(async {
        while log.count("A") == 0 {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert_eq!(store.status_of(&s1, "A")?, Status::Working);

    // Break the results directory while the processor is running.
    fs::remove_dir_all(&results_dir)?;
    fs::write(&results_dir, "")?;
    gate.notify_one();

    let first = with_timeout(first.wait()).await?;
    assert_eq!(first.outcome_of("A"), Some(UnitOutcome::Failed));
    assert_eq!(store.status_of(&s1, "A")?, Status::Error);

    fs::remove_file(&results_dir)?;
    gate.notify_one();

    let second = conductor.conduct("s1", Some(request.as_slice()), false).await?;
    let second = with_timeout(second.wait()).await?;
    assert_eq!(second.outcome_of("A"), Some(UnitOutcome::Succeeded));
    assert_eq!(log.count("A"), 2);

    conductor.shutdown().await?;
    Ok(())
}
