// src/config/model.rs

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;

use crate::registry::{Capability, Fields};
use crate::store::RESULTS_FILE_PATH;
use crate::types::{parse_duration, ResultStorageMode, StaleFieldPolicy};

/// Configuration exactly as read from a TOML file, before validation.
///
/// ```toml
/// [config]
/// workers = 4
/// processor_timeout = "30s"
///
/// [module.kraken]
/// cmd = "kraken-summary"
/// capabilities = ["single_entity"]
///
/// [module.sim]
/// cmd = "similarity"
/// capabilities = ["entity_collection"]
/// dependencies = ["kraken"]
///
/// [sample.s1]
/// metadata = { site = "gut" }
///
/// [group.g1]
/// members = ["s1"]
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub config: ConfigSection,

    /// All modules from `[module.<name>]`.
    #[serde(default)]
    pub module: BTreeMap<String, ModuleConfig>,

    /// All samples from `[sample.<id>]`.
    #[serde(default)]
    pub sample: BTreeMap<String, SampleConfig>,

    /// All groups from `[group.<id>]`.
    #[serde(default)]
    pub group: BTreeMap<String, GroupConfig>,
}

/// Validated configuration.
///
/// Only obtainable through `ConfigFile::try_from(RawConfigFile)` (or the
/// loader), so holders can rely on: known dependencies, no cycles, at least
/// one capability per module, and group members that exist.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub config: ConfigSection,
    pub module: BTreeMap<String, ModuleConfig>,
    pub sample: BTreeMap<String, SampleConfig>,
    pub group: BTreeMap<String, GroupConfig>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(raw: RawConfigFile) -> Self {
        Self {
            config: raw.config,
            module: raw.module,
            sample: raw.sample,
            group: raw.group,
        }
    }
}

/// `[config]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigSection {
    /// Maximum number of units executing at once.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Optional deadline per processor invocation (e.g. `"30s"`).
    #[serde(default)]
    pub processor_timeout: Option<String>,

    #[serde(default)]
    pub result_storage: ResultStorageMode,

    /// Results file used with `result_storage = "file"`, relative to the
    /// config file's directory.
    #[serde(default)]
    pub results_path: Option<String>,

    #[serde(default)]
    pub stale_fields: StaleFieldPolicy,
}

fn default_workers() -> usize {
    4
}

impl Default for ConfigSection {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            processor_timeout: None,
            result_storage: ResultStorageMode::default(),
            results_path: None,
            stale_fields: StaleFieldPolicy::default(),
        }
    }
}

impl ConfigSection {
    pub fn processor_timeout(&self) -> Result<Option<Duration>, String> {
        self.processor_timeout
            .as_deref()
            .map(parse_duration)
            .transpose()
    }

    pub fn results_path(&self) -> &str {
        self.results_path.as_deref().unwrap_or(RESULTS_FILE_PATH)
    }
}

/// `[module.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ModuleConfig {
    /// Command run through the platform shell.
    pub cmd: String,

    #[serde(default)]
    pub capabilities: Vec<Capability>,

    /// Modules that must have succeeded for the entity first.
    #[serde(default)]
    pub dependencies: Vec<String>,

    /// Output fields the command must always print.
    #[serde(default)]
    pub produces: Vec<String>,
}

/// `[sample.<id>]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SampleConfig {
    #[serde(default)]
    pub metadata: Fields,
}

/// `[group.<id>]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GroupConfig {
    #[serde(default)]
    pub members: Vec<String>,
}
