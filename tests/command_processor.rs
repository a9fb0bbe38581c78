// tests/command_processor.rs
#![cfg(unix)]

use std::error::Error;
use std::sync::Arc;

use conductor::engine::{Conductor, UnitOutcome};
use conductor::exec::ExecContext;
use conductor::registry::{
    Capability, CommandProcessor, ModuleDescriptor, ModuleRegistry, ProcessError, Processor,
    ProcessorInput,
};
use conductor::store::{EntityRef, MemoryResultStore, ResultStore, Status};
use conductor_test_utils::builders::{ConfigFileBuilder, ModuleConfigBuilder};
use conductor_test_utils::{init_tracing, names, single_sample, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

fn input(module: &str) -> ProcessorInput {
    ProcessorInput {
        module: module.to_string(),
        entity: EntityRef::sample("s1"),
        shape: Capability::SingleEntity,
        subjects: vec![],
    }
}

#[tokio::test]
async fn stdout_json_object_becomes_fields() -> TestResult {
    init_tracing();
    let processor = CommandProcessor::new("echo", r#"printf '{"reads": 42}'"#);

    let fields = processor.process(input("echo")).await?;
    assert_eq!(fields.get("reads"), Some(&serde_json::json!(42)));
    Ok(())
}

#[tokio::test]
async fn processor_input_is_written_to_stdin() -> TestResult {
    init_tracing();
    // Echo stdin back: the payload itself is a JSON object.
    let processor = CommandProcessor::new("mirror", "cat");

    let fields = processor.process(input("mirror")).await?;
    assert_eq!(fields.get("module"), Some(&serde_json::json!("mirror")));
    assert_eq!(fields.get("shape"), Some(&serde_json::json!("single_entity")));
    assert_eq!(
        fields.get("entity"),
        Some(&serde_json::json!({ "kind": "sample", "id": "s1" }))
    );
    Ok(())
}

#[tokio::test]
async fn non_zero_exit_is_a_failure() {
    init_tracing();
    let processor = CommandProcessor::new("bad", "echo oops >&2; exit 3");

    let err = processor.process(input("bad")).await.unwrap_err();
    match err {
        ProcessError::Failed(msg) => assert!(msg.contains("exited with code 3"), "{msg}"),
        other => panic!("expected Failed, got {other:?}"),
    }
}

#[tokio::test]
async fn non_object_output_is_a_failure() {
    init_tracing();
    for cmd in ["printf 'not json'", "printf '[1, 2]'"] {
        let processor = CommandProcessor::new("odd", cmd);
        let err = processor.process(input("odd")).await.unwrap_err();
        assert!(matches!(err, ProcessError::Failed(_)), "{cmd}: {err:?}");
    }
}

#[tokio::test]
async fn config_modules_run_through_the_shell() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let cfg = ConfigFileBuilder::new()
        .with_module(
            "count",
            ModuleConfigBuilder::single(r#"printf '{"n": 1}'"#)
                .produces("n")
                .build(),
        )
        .with_module(
            "report",
            ModuleConfigBuilder::single(r#"printf '{"ok": true}' > report.json && cat report.json"#)
                .depends_on("count")
                .build(),
        )
        .with_sample("s1")
        .build();

    let ctx = ExecContext::from_config(&cfg, dir.path())?;
    let conductor = Conductor::spawn(ctx, cfg.config.workers);

    let ticket = conductor.conduct("s1", None, false).await?;
    let summary = with_timeout(ticket.wait()).await?;

    assert_eq!(summary.outcome_of("count"), Some(UnitOutcome::Succeeded));
    assert_eq!(summary.outcome_of("report"), Some(UnitOutcome::Succeeded));
    // Commands run in the config directory.
    assert!(dir.path().join("report.json").exists());

    let store = &conductor.context().store;
    let s1 = EntityRef::sample("s1");
    assert_eq!(store.status_of(&s1, "report")?, Status::Success);
    assert_eq!(
        store.fields_of(&s1, "count")?.and_then(|f| f.get("n").cloned()),
        Some(serde_json::json!(1))
    );

    conductor.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn failing_command_marks_error() -> TestResult {
    init_tracing();
    let registry = ModuleRegistry::from_table(vec![ModuleDescriptor::new(
        "broken",
        Arc::new(CommandProcessor::new("broken", "exit 1")),
    )
    .supports(Capability::SingleEntity)])?;
    let store = Arc::new(MemoryResultStore::new());
    let ctx = ExecContext::new(Arc::new(registry), store.clone(), Arc::new(single_sample()));
    let conductor = Conductor::spawn(ctx, 1);

    let ticket = conductor
        .conduct("s1", Some(names(&["broken"]).as_slice()), false)
        .await?;
    let summary = with_timeout(ticket.wait()).await?;

    assert_eq!(summary.outcome_of("broken"), Some(UnitOutcome::Failed));
    assert_eq!(store.status_of(&EntityRef::sample("s1"), "broken")?, Status::Error);

    conductor.shutdown().await?;
    Ok(())
}
