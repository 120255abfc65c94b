//! Ecomap Configuration
//!
//! Config file lookup order:
//! 1. `--config <path>`
//! 2. `./ecomap.yaml`
//! 3. `~/.config/ecomap/config.yaml`
//!
//! A missing file is an error; every key inside the file is optional.

use crate::error::EcomapError;
use crate::health::DEFAULT_PROBE_TIMEOUT;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Local config file name checked in the working directory
pub const LOCAL_CONFIG_FILE: &str = "ecomap.yaml";

/// Report settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Where `report` writes the markdown document; relative paths resolve
    /// against the working directory
    #[serde(default = "default_report_path")]
    pub output_path: PathBuf,
}

fn default_report_path() -> PathBuf {
    PathBuf::from("ARCHITECTURE.md")
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            output_path: default_report_path(),
        }
    }
}

/// Dependency graph settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphConfig {
    /// Repository name prefixes that take part in the graph
    #[serde(default = "default_interesting_prefixes")]
    pub interesting_prefixes: Vec<String>,
}

fn default_interesting_prefixes() -> Vec<String> {
    vec!["darwin-".into(), "pcs-".into(), "hyperbolic-".into()]
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            interesting_prefixes: default_interesting_prefixes(),
        }
    }
}

/// Port-forward remediation settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixConfig {
    /// Namespace/name prefixes eligible for forwarding
    #[serde(default = "default_allowed_prefixes")]
    pub allowed_prefixes: Vec<String>,

    /// Binary used in the generated `port-forward` commands
    #[serde(default = "default_forward_tool")]
    pub forward_tool: String,

    /// Script location; relative paths resolve against the config file's directory
    #[serde(default)]
    pub script_path: Option<PathBuf>,

    /// Wait after spawning before re-verification
    #[serde(default = "default_five")]
    pub grace_delay_secs: u64,

    /// Window between SIGTERM and SIGKILL
    #[serde(default = "default_five")]
    pub terminate_grace_secs: u64,
}

fn default_allowed_prefixes() -> Vec<String> {
    vec!["darwin".into(), "pcs".into(), "hyperbolic".into()]
}

fn default_forward_tool() -> String {
    "kubectl".to_string()
}

fn default_five() -> u64 {
    5
}

impl Default for FixConfig {
    fn default() -> Self {
        Self {
            allowed_prefixes: default_allowed_prefixes(),
            forward_tool: default_forward_tool(),
            script_path: None,
            grace_delay_secs: 5,
            terminate_grace_secs: 5,
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EcomapConfig {
    /// Roots searched for git repositories
    #[serde(default)]
    pub paths: Vec<String>,

    /// Raw health check entries; parsed leniently by the health engine
    #[serde(default)]
    pub health_checks: Vec<serde_yaml::Value>,

    #[serde(default)]
    pub report: ReportConfig,

    #[serde(default)]
    pub graph: GraphConfig,

    #[serde(default)]
    pub fix: FixConfig,

    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
}

fn default_probe_timeout_secs() -> u64 {
    DEFAULT_PROBE_TIMEOUT.as_secs()
}

impl Default for EcomapConfig {
    fn default() -> Self {
        Self {
            paths: Vec::new(),
            health_checks: Vec::new(),
            report: ReportConfig::default(),
            graph: GraphConfig::default(),
            fix: FixConfig::default(),
            probe_timeout_secs: default_probe_timeout_secs(),
        }
    }
}

impl EcomapConfig {
    /// Parse config text
    pub fn from_yaml(text: &str) -> Result<Self, EcomapError> {
        // An empty file is a valid, all-defaults config
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(text)?)
    }

    /// Resolve and load the config file
    pub fn load(explicit: Option<&Path>) -> Result<LoadedConfig> {
        let path = resolve_config_path(explicit)?;
        Self::load_from(&path)
    }

    /// Load a specific config file
    ///
    /// The stored path is canonical, so paths derived from it stay valid
    /// after a child process changes directory.
    pub fn load_from(path: &Path) -> Result<LoadedConfig> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config = Self::from_yaml(&text)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        let path = fs::canonicalize(path)
            .with_context(|| format!("Failed to resolve {}", path.display()))?;
        debug!("Loaded config from {}", path.display());
        Ok(LoadedConfig { path, config })
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs.max(1))
    }

    /// Repository roots with `~` expanded
    pub fn repository_roots(&self) -> Vec<PathBuf> {
        self.paths.iter().map(|p| expand_home(p)).collect()
    }
}

/// A config together with the file it came from
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub path: PathBuf,
    pub config: EcomapConfig,
}

impl LoadedConfig {
    /// Directory holding the config file
    pub fn base_dir(&self) -> PathBuf {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    /// Remediation script location
    pub fn script_path(&self) -> PathBuf {
        match &self.config.fix.script_path {
            Some(p) => self.resolve(p),
            None => self.base_dir().join("scripts").join("port-forward.sh"),
        }
    }

    /// Report location; a relative path is left relative to the working directory
    pub fn report_path(&self) -> PathBuf {
        expand_home(&self.config.report.output_path.to_string_lossy())
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        let expanded = expand_home(&path.to_string_lossy());
        if expanded.is_absolute() {
            expanded
        } else {
            self.base_dir().join(expanded)
        }
    }
}

/// User-level config path (`~/.config/ecomap/config.yaml`)
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("ecomap").join("config.yaml"))
}

/// Pick the config file to load
pub fn resolve_config_path(explicit: Option<&Path>) -> Result<PathBuf, EcomapError> {
    if let Some(path) = explicit {
        if path.is_file() {
            return Ok(path.to_path_buf());
        }
        return Err(EcomapError::Config(format!(
            "config file not found: {}",
            path.display()
        )));
    }

    let local = PathBuf::from(LOCAL_CONFIG_FILE);
    if local.is_file() {
        return Ok(local);
    }

    if let Some(user) = user_config_path() {
        if user.is_file() {
            return Ok(user);
        }
    }

    Err(EcomapError::Config(format!(
        "no config file found (tried ./{} and {})",
        LOCAL_CONFIG_FILE,
        user_config_path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "~/.config/ecomap/config.yaml".to_string())
    )))
}

/// Expand a leading `~` to the home directory
pub fn expand_home(path: &str) -> PathBuf {
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    } else if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
