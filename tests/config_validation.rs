// tests/config_validation.rs

use std::error::Error;
use std::io::Write;
use std::time::Duration;

use tempfile::NamedTempFile;

use conductor::config::load_and_validate;
use conductor::errors::ConductorError;
use conductor::registry::Capability;
use conductor::store::{EntityDirectory, EntityRef, MemoryEntityDirectory};
use conductor::types::{parse_duration, ResultStorageMode, StaleFieldPolicy};
use conductor_test_utils::builders::{ConfigFileBuilder, ModuleConfigBuilder};

type TestResult = Result<(), Box<dyn Error>>;

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp file");
    file.write_all(contents.as_bytes()).expect("write config");
    file
}

#[test]
fn full_config_loads_with_all_sections() -> TestResult {
    let file = write_config(
        r#"
[config]
workers = 2
processor_timeout = "1500ms"
result_storage = "file"
results_path = "out/results.json"
stale_fields = "clear"

[module.kraken]
cmd = "kraken-summary"
capabilities = ["single_entity"]
produces = ["taxa"]

[module.sim]
cmd = "similarity"
capabilities = ["entity_collection", "native_group"]
dependencies = ["kraken"]

[sample.s1]
metadata = { site = "gut" }

[sample.s2]

[group.g1]
members = ["s1", "s2"]
"#,
    );

    let cfg = load_and_validate(file.path())?;

    assert_eq!(cfg.config.workers, 2);
    assert_eq!(
        cfg.config.processor_timeout(),
        Ok(Some(Duration::from_millis(1500)))
    );
    assert_eq!(cfg.config.result_storage, ResultStorageMode::File);
    assert_eq!(cfg.config.results_path(), "out/results.json");
    assert_eq!(cfg.config.stale_fields, StaleFieldPolicy::Clear);

    let sim = &cfg.module["sim"];
    assert_eq!(
        sim.capabilities,
        vec![Capability::EntityCollection, Capability::NativeGroup]
    );
    assert_eq!(sim.dependencies, vec!["kraken".to_string()]);
    assert_eq!(cfg.module["kraken"].produces, vec!["taxa".to_string()]);

    let entities = MemoryEntityDirectory::from_config(&cfg);
    assert!(entities.contains(&EntityRef::sample("s2")));
    assert!(entities.contains(&EntityRef::group("g1")));
    assert!(!entities.contains(&EntityRef::group("s1")));
    assert_eq!(
        entities.metadata(&EntityRef::sample("s1")).get("site"),
        Some(&serde_json::json!("gut"))
    );
    assert_eq!(entities.members(&EntityRef::group("g1"))?.len(), 2);

    Ok(())
}

#[test]
fn defaults_apply_when_config_section_is_missing() -> TestResult {
    let file = write_config(
        r#"
[module.a]
cmd = "true"
capabilities = ["single_entity"]
"#,
    );

    let cfg = load_and_validate(file.path())?;
    assert_eq!(cfg.config.workers, 4);
    assert_eq!(cfg.config.processor_timeout(), Ok(None));
    assert_eq!(cfg.config.result_storage, ResultStorageMode::Memory);
    assert_eq!(cfg.config.results_path(), ".conductor/results.json");
    assert_eq!(cfg.config.stale_fields, StaleFieldPolicy::Keep);
    Ok(())
}

#[test]
fn cycle_in_config_is_rejected() {
    let file = write_config(
        r#"
[module.a]
cmd = "true"
capabilities = ["single_entity"]
dependencies = ["b"]

[module.b]
cmd = "true"
capabilities = ["single_entity"]
dependencies = ["a"]
"#,
    );

    let err = load_and_validate(file.path()).unwrap_err();
    assert!(matches!(err, ConductorError::CyclicDependency(_)), "{err:?}");
}

#[test]
fn unknown_dependency_is_rejected() {
    let err = ConfigFileBuilder::new()
        .with_module("a", ModuleConfigBuilder::single("true").depends_on("ghost").build())
        .try_build()
        .unwrap_err();

    match err {
        ConductorError::ConfigError(msg) => assert!(msg.contains("unknown dependency 'ghost'")),
        other => panic!("expected ConfigError, got {other:?}"),
    }
}

#[test]
fn self_dependency_is_rejected() {
    let err = ConfigFileBuilder::new()
        .with_module("a", ModuleConfigBuilder::single("true").depends_on("a").build())
        .try_build()
        .unwrap_err();

    match err {
        ConductorError::ConfigError(msg) => assert!(msg.contains("cannot depend on itself")),
        other => panic!("expected ConfigError, got {other:?}"),
    }
}

#[test]
fn module_without_capabilities_is_rejected() {
    let err = ConfigFileBuilder::new()
        .with_module("a", ModuleConfigBuilder::new("true").build())
        .try_build()
        .unwrap_err();

    assert!(matches!(err, ConductorError::ConfigError(_)));
}

#[test]
fn empty_config_and_zero_workers_are_rejected() {
    let err = ConfigFileBuilder::new().try_build().unwrap_err();
    assert!(matches!(err, ConductorError::ConfigError(_)));

    let err = ConfigFileBuilder::new()
        .with_module("a", ModuleConfigBuilder::single("true").build())
        .workers(0)
        .try_build()
        .unwrap_err();
    assert!(matches!(err, ConductorError::ConfigError(_)));
}

#[test]
fn bad_timeout_is_rejected() {
    let err = ConfigFileBuilder::new()
        .with_module("a", ModuleConfigBuilder::single("true").build())
        .processor_timeout("soon")
        .try_build()
        .unwrap_err();

    match err {
        ConductorError::ConfigError(msg) => assert!(msg.contains("processor_timeout")),
        other => panic!("expected ConfigError, got {other:?}"),
    }
}

#[test]
fn oversized_timeout_is_rejected_not_wrapped() {
    let err = ConfigFileBuilder::new()
        .with_module("a", ModuleConfigBuilder::single("true").build())
        .processor_timeout("9999999999999999h")
        .try_build()
        .unwrap_err();

    match err {
        ConductorError::ConfigError(msg) => assert!(msg.contains("too large")),
        other => panic!("expected ConfigError, got {other:?}"),
    }

    assert_eq!(parse_duration("2m"), Ok(Duration::from_secs(120)));
    assert!(parse_duration("999999999999999999m").is_err());
}

#[test]
fn group_with_unknown_member_is_rejected() {
    let err = ConfigFileBuilder::new()
        .with_module("a", ModuleConfigBuilder::single("true").build())
        .with_sample("s1")
        .with_group("g", &["s1", "s9"])
        .try_build()
        .unwrap_err();

    match err {
        ConductorError::ConfigError(msg) => assert!(msg.contains("unknown sample 's9'")),
        other => panic!("expected ConfigError, got {other:?}"),
    }
}

#[test]
fn unknown_capability_is_a_parse_error() {
    let file = write_config(
        r#"
[module.a]
cmd = "true"
capabilities = ["whole_world"]
"#,
    );

    let err = load_and_validate(file.path()).unwrap_err();
    assert!(matches!(err, ConductorError::TomlError(_)));
}

#[test]
fn missing_file_is_an_io_error() {
    let err = load_and_validate("/definitely/not/here/Conductor.toml").unwrap_err();
    assert!(matches!(err, ConductorError::IoError(_)));
}
