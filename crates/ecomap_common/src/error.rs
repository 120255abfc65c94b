//! Error types for ecomap.
//!
//! Only orchestration-layer failures live here. Discovery and probe failures
//! are represented as data (empty collections, `ok = false` results).

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EcomapError {
    #[error("Failed to start remediation script {path}: {source}")]
    Spawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EcomapError {
    pub fn code(&self) -> &'static str {
        match self {
            EcomapError::Spawn { .. } => "spawn_failure",
            EcomapError::Write { .. } => "write_failure",
            EcomapError::Config(_) => "config",
            EcomapError::Io(_) => "io",
            EcomapError::Yaml(_) => "yaml",
            EcomapError::Json(_) => "json",
        }
    }

    pub fn write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        EcomapError::Write {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T, E = EcomapError> = std::result::Result<T, E>;
