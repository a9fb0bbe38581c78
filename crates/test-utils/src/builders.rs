#![allow(dead_code)]

use std::collections::BTreeMap;

use conductor::config::{
    ConfigFile, ConfigSection, GroupConfig, ModuleConfig, RawConfigFile, SampleConfig,
};
use conductor::errors::Result;
use conductor::registry::Capability;

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                config: ConfigSection::default(),
                module: BTreeMap::new(),
                sample: BTreeMap::new(),
                group: BTreeMap::new(),
            },
        }
    }

    pub fn with_module(mut self, name: &str, module: ModuleConfig) -> Self {
        self.config.module.insert(name.to_string(), module);
        self
    }

    pub fn with_sample(mut self, id: &str) -> Self {
        self.config
            .sample
            .insert(id.to_string(), SampleConfig::default());
        self
    }

    pub fn with_group(mut self, id: &str, members: &[&str]) -> Self {
        self.config.group.insert(
            id.to_string(),
            GroupConfig {
                members: members.iter().map(|m| m.to_string()).collect(),
            },
        );
        self
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.config.config.workers = workers;
        self
    }

    pub fn processor_timeout(mut self, timeout: &str) -> Self {
        self.config.config.processor_timeout = Some(timeout.to_string());
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn try_build(self) -> Result<ConfigFile> {
        ConfigFile::try_from(self.config)
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `ModuleConfig`.
pub struct ModuleConfigBuilder {
    module: ModuleConfig,
}

impl ModuleConfigBuilder {
    /// Module with the given command and no capabilities yet.
    pub fn new(cmd: &str) -> Self {
        Self {
            module: ModuleConfig {
                cmd: cmd.to_string(),
                capabilities: vec![],
                dependencies: vec![],
                produces: vec![],
            },
        }
    }

    /// Shorthand for a single-entity module.
    pub fn single(cmd: &str) -> Self {
        Self::new(cmd).capability(Capability::SingleEntity)
    }

    pub fn capability(mut self, capability: Capability) -> Self {
        self.module.capabilities.push(capability);
        self
    }

    pub fn depends_on(mut self, dep: &str) -> Self {
        self.module.dependencies.push(dep.to_string());
        self
    }

    pub fn produces(mut self, field: &str) -> Self {
        self.module.produces.push(field.to_string());
        self
    }

    pub fn build(self) -> ModuleConfig {
        self.module
    }
}
