// src/registry/mod.rs

//! Module registry.
//!
//! The registry is built once at startup from an explicit table of
//! [`ModuleDescriptor`]s (either assembled in code or derived from the
//! `[module.<name>]` sections of the config file) and is read-only
//! afterwards. It is shared behind an `Arc` and needs no locking.
//!
//! - [`processor`] defines the opaque processor contract.
//! - [`command`] provides the processor used for config-declared modules.

pub mod command;
pub mod processor;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use crate::config::ConfigFile;
use crate::errors::{ConductorError, Result};

pub use command::CommandProcessor;
pub use processor::{
    processor_fn, Capability, Fields, ProcessError, ProcessFuture, Processor, ProcessorInput,
    Subject,
};

/// Canonical module name type used throughout the crate.
pub type ModuleName = String;

/// Static description of one analysis module.
#[derive(Clone)]
pub struct ModuleDescriptor {
    name: ModuleName,
    dependencies: Vec<ModuleName>,
    capabilities: BTreeSet<Capability>,
    produces: Vec<String>,
    processor: Arc<dyn Processor>,
}

impl fmt::Debug for ModuleDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleDescriptor")
            .field("name", &self.name)
            .field("dependencies", &self.dependencies)
            .field("capabilities", &self.capabilities)
            .field("produces", &self.produces)
            .finish_non_exhaustive()
    }
}

impl ModuleDescriptor {
    pub fn new(name: impl Into<ModuleName>, processor: Arc<dyn Processor>) -> Self {
        Self {
            name: name.into(),
            dependencies: Vec::new(),
            capabilities: BTreeSet::new(),
            produces: Vec::new(),
            processor,
        }
    }

    /// Add a dependency. Order is preserved; repeats are ignored.
    pub fn depends_on(mut self, dep: impl Into<ModuleName>) -> Self {
        let dep = dep.into();
        if !self.dependencies.contains(&dep) {
            self.dependencies.push(dep);
        }
        self
    }

    pub fn supports(mut self, capability: Capability) -> Self {
        self.capabilities.insert(capability);
        self
    }

    /// Declare an output field the processor must always produce.
    pub fn produces(mut self, field: impl Into<String>) -> Self {
        let field = field.into();
        if !self.produces.contains(&field) {
            self.produces.push(field);
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dependencies(&self) -> &[ModuleName] {
        &self.dependencies
    }

    pub fn capabilities(&self) -> &BTreeSet<Capability> {
        &self.capabilities
    }

    pub fn has_capability(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    pub fn produced_fields(&self) -> &[String] {
        &self.produces
    }

    pub fn processor(&self) -> Arc<dyn Processor> {
        Arc::clone(&self.processor)
    }
}

/// Process-wide table of module descriptors keyed by name.
#[derive(Debug, Default)]
pub struct ModuleRegistry {
    modules: BTreeMap<ModuleName, ModuleDescriptor>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from a static table of descriptors.
    pub fn from_table<I>(descriptors: I) -> Result<Self>
    where
        I: IntoIterator<Item = ModuleDescriptor>,
    {
        let mut registry = Self::new();
        for descriptor in descriptors {
            registry.register(descriptor)?;
        }
        Ok(registry)
    }

    /// Build a registry from a validated config, backing every module with a
    /// [`CommandProcessor`] that runs in `workdir`.
    pub fn from_config(cfg: &ConfigFile, workdir: &Path) -> Result<Self> {
        let mut registry = Self::new();

        for (name, mc) in cfg.module.iter() {
            let processor = CommandProcessor::new(name.clone(), mc.cmd.clone())
                .with_workdir(workdir.to_path_buf());
            let mut descriptor = ModuleDescriptor::new(name.clone(), Arc::new(processor));

            for dep in mc.dependencies.iter() {
                descriptor = descriptor.depends_on(dep.clone());
            }
            for cap in mc.capabilities.iter() {
                descriptor = descriptor.supports(*cap);
            }
            for field in mc.produces.iter() {
                descriptor = descriptor.produces(field.clone());
            }

            registry.register(descriptor)?;
        }

        Ok(registry)
    }

    /// Add a descriptor. Dependencies are not resolved here; unknown
    /// dependencies surface when a dependency graph is built.
    pub fn register(&mut self, descriptor: ModuleDescriptor) -> Result<()> {
        if descriptor.capabilities.is_empty() {
            return Err(ConductorError::ConfigError(format!(
                "module '{}' must declare at least one capability",
                descriptor.name
            )));
        }

        if self.modules.contains_key(&descriptor.name) {
            return Err(ConductorError::DuplicateModule(descriptor.name.clone()));
        }

        debug!(
            module = %descriptor.name,
            deps = ?descriptor.dependencies,
            capabilities = ?descriptor.capabilities,
            "registered module"
        );
        self.modules.insert(descriptor.name.clone(), descriptor);
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Result<&ModuleDescriptor> {
        self.modules
            .get(name)
            .ok_or_else(|| ConductorError::UnknownModule(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    pub fn all(&self) -> impl Iterator<Item = &ModuleDescriptor> {
        self.modules.values()
    }

    pub fn names(&self) -> Vec<ModuleName> {
        self.modules.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}
