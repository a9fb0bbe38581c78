// src/config/validate.rs

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{ConductorError, Result};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::ConductorError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    ensure_has_modules(cfg)?;
    validate_global_config(cfg)?;
    validate_capabilities(cfg)?;
    validate_module_dependencies(cfg)?;
    validate_dag(cfg)?;
    validate_groups(cfg)?;
    Ok(())
}

fn ensure_has_modules(cfg: &RawConfigFile) -> Result<()> {
    if cfg.module.is_empty() {
        return Err(ConductorError::ConfigError(
            "config must contain at least one [module.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_global_config(cfg: &RawConfigFile) -> Result<()> {
    if cfg.config.workers == 0 {
        return Err(ConductorError::ConfigError(
            "[config].workers must be >= 1 (got 0)".to_string(),
        ));
    }

    cfg.config
        .processor_timeout()
        .map_err(|e| ConductorError::ConfigError(format!("[config].processor_timeout: {e}")))?;

    Ok(())
}

fn validate_capabilities(cfg: &RawConfigFile) -> Result<()> {
    for (name, module) in cfg.module.iter() {
        if module.capabilities.is_empty() {
            return Err(ConductorError::ConfigError(format!(
                "module '{}' must list at least one capability",
                name
            )));
        }
    }
    Ok(())
}

fn validate_module_dependencies(cfg: &RawConfigFile) -> Result<()> {
    for (name, module) in cfg.module.iter() {
        for dep in module.dependencies.iter() {
            if dep == name {
                return Err(ConductorError::ConfigError(format!(
                    "module '{}' cannot depend on itself",
                    name
                )));
            }
            if !cfg.module.contains_key(dep) {
                return Err(ConductorError::ConfigError(format!(
                    "module '{}' has unknown dependency '{}'",
                    name, dep
                )));
            }
        }
    }
    Ok(())
}

fn validate_dag(cfg: &RawConfigFile) -> Result<()> {
    // Edge direction: dependent -> dependency.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for name in cfg.module.keys() {
        graph.add_node(name.as_str());
    }

    for (name, module) in cfg.module.iter() {
        for dep in module.dependencies.iter() {
            graph.add_edge(name.as_str(), dep.as_str(), ());
        }
    }

    // A topological sort will fail if there is a cycle.
    match toposort(&graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => Err(ConductorError::CyclicDependency(format!(
            "cycle detected in module dependencies involving '{}'",
            cycle.node_id()
        ))),
    }
}

fn validate_groups(cfg: &RawConfigFile) -> Result<()> {
    for (group, gc) in cfg.group.iter() {
        for member in gc.members.iter() {
            if !cfg.sample.contains_key(member) {
                return Err(ConductorError::ConfigError(format!(
                    "group '{}' lists unknown sample '{}'",
                    group, member
                )));
            }
        }
    }
    Ok(())
}
