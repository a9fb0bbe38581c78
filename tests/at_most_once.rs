// tests/at_most_once.rs

use std::error::Error;
use std::sync::{Arc, Barrier};
use std::thread;

use tokio::sync::Notify;
use tokio::time::{sleep, Duration};

use conductor::engine::{Conductor, SkipReason, UnitOutcome};
use conductor::registry::ModuleRegistry;
use conductor::store::{EntityRef, MemoryResultStore, ResultStore, Status};
use conductor_test_utils::fake_processor::{CallLog, RecordingProcessor};
use conductor_test_utils::{init_tracing, memory_context, single_sample, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

#[tokio::test]
async fn concurrent_trigger_while_working_is_a_no_op() -> TestResult {
    init_tracing();
    let log = CallLog::new();
    let gate = Arc::new(Notify::new());

    let registry = ModuleRegistry::from_table(vec![RecordingProcessor::new("A", &log)
        .gated(gate.clone())
        .descriptor(&[])])?;
    let (ctx, store) = memory_context(registry, single_sample());
    let conductor = Conductor::spawn(ctx, 4);
    let s1 = EntityRef::sample("s1");

    let first = conductor.conduct("s1", None, false).await?;

    // Wait until the first attempt owns the pair.
    with_timeout(async {
        while log.count("A") == 0 {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert_eq!(store.status_of(&s1, "A")?, Status::Working);

    let second = conductor.conduct("s1", None, false).await?;
    let second = with_timeout(second.wait()).await?;
    assert_eq!(
        second.outcome_of("A"),
        Some(UnitOutcome::Skipped(SkipReason::AlreadyRunningOrDone))
    );

    gate.notify_one();
    let first = with_timeout(first.wait()).await?;
    assert_eq!(first.outcome_of("A"), Some(UnitOutcome::Succeeded));

    assert_eq!(log.count("A"), 1);
    assert_eq!(store.status_of(&s1, "A")?, Status::Success);

    conductor.shutdown().await?;
    Ok(())
}

#[test]
fn racing_try_begin_has_exactly_one_winner() {
    init_tracing();
    let store = Arc::new(MemoryResultStore::new());
    let contenders = 16;
    let barrier = Arc::new(Barrier::new(contenders));

    let handles: Vec<_> = (0..contenders)
        .map(|_| {
            let store = Arc::clone(&store);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                store.try_begin(&EntityRef::sample("s1"), "A").unwrap()
            })
        })
        .collect();

    let winners = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|won| *won)
        .count();

    assert_eq!(winners, 1);
}

#[test]
fn error_status_allows_a_new_attempt() {
    init_tracing();
    let store = MemoryResultStore::new();
    let s1 = EntityRef::sample("s1");

    assert!(store.try_begin(&s1, "A").unwrap());
    assert!(!store.try_begin(&s1, "A").unwrap());

    store.finish_error(&s1, "A").unwrap();
    assert!(store.try_begin(&s1, "A").unwrap());

    store.finish_success(&s1, "A", Default::default()).unwrap();
    assert!(!store.try_begin(&s1, "A").unwrap());
}
