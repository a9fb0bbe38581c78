// src/errors.rs

//! Crate-wide error aliases and helpers.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConductorError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Unknown module: {0}")]
    UnknownModule(String),

    #[error("Cyclic module dependency: {0}")]
    CyclicDependency(String),

    #[error("Module registered twice: {0}")]
    DuplicateModule(String),

    #[error("Unknown entity: {0}")]
    UnknownEntity(String),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Result store error: {0}")]
    StoreError(String),

    #[error("Runtime closed: {0}")]
    RuntimeClosed(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, ConductorError>;
