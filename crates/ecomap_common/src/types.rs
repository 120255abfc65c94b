//! Shared record types for one discovery cycle.
//!
//! All records are plain values. A new `ServiceInventory` replaces the old
//! one on every cycle; nothing here carries identity across cycles.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

/// A TCP port listening on this host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListeningPort {
    pub port: u16,
    /// PID of the owning process, when the listener table exposes it
    pub owning_process_id: Option<u32>,
    pub process_name: String,
}

/// Where a service record was discovered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Container,
    OrchestratorPod,
    Process,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Container => "docker",
            Platform::OrchestratorPod => "k8s",
            Platform::Process => "process",
        }
    }
}

/// A running (or stopped) service instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRecord {
    pub platform: Platform,
    pub name: String,
    /// Free-text lifecycle label ("Running", "CrashLoopBackOff", "Exited (1) ...")
    pub status: String,
    /// Port descriptors in discovery order
    #[serde(default)]
    pub ports: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Always set for `Platform::Process`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owning_process_id: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Diagnostic strings collected by the collector
    #[serde(default)]
    pub issues: Vec<String>,
}

impl ServiceRecord {
    pub fn new(platform: Platform, name: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            platform,
            name: name.into(),
            status: status.into(),
            ports: Vec::new(),
            notes: None,
            owning_process_id: None,
            namespace: None,
            issues: Vec::new(),
        }
    }
}

/// A Kubernetes Service: a stable endpoint, not a running instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestratorServiceRecord {
    pub namespace: String,
    pub name: String,
    pub ports: BTreeSet<u16>,
    /// `None` when the Service declares no selector at all
    pub selector: Option<BTreeMap<String, String>>,
}

/// Merged snapshot of everything discovered in one cycle
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceInventory {
    pub services: Vec<ServiceRecord>,
    pub listening_ports: BTreeMap<u16, Vec<ListeningPort>>,
    pub orchestrator_services: Vec<OrchestratorServiceRecord>,
}

impl ServiceInventory {
    /// Ports with at least one local listener
    pub fn open_ports(&self) -> BTreeSet<u16> {
        self.listening_ports.keys().copied().collect()
    }

    pub fn is_listening(&self, port: u16) -> bool {
        self.listening_ports.contains_key(&port)
    }
}

/// A git repository found under one of the configured roots
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryRecord {
    pub name: String,
    pub path: PathBuf,
    pub current_branch: Option<String>,
    /// First non-blank README line
    pub description: Option<String>,
}

/// Structural summary of one repository's source tree
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeSummary {
    pub repository_path: PathBuf,
    /// Lower-cased top-level package names, stdlib excluded
    pub imported_module_names: BTreeSet<String>,
    pub api_endpoint_descriptors: Vec<String>,
    pub declared_node_dependencies: BTreeMap<String, String>,
}

impl CodeSummary {
    pub fn new(repository_path: impl Into<PathBuf>) -> Self {
        Self {
            repository_path: repository_path.into(),
            ..Default::default()
        }
    }

    /// Repository name as used by the dependency graph (last path component)
    pub fn repository_name(&self) -> String {
        self.repository_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_ports_from_listeners() {
        let mut inventory = ServiceInventory::default();
        inventory.listening_ports.insert(
            8090,
            vec![ListeningPort {
                port: 8090,
                owning_process_id: Some(10),
                process_name: "python3".to_string(),
            }],
        );
        assert!(inventory.is_listening(8090));
        assert!(!inventory.is_listening(6333));
        assert_eq!(inventory.open_ports().into_iter().collect::<Vec<_>>(), vec![8090]);
    }

    #[test]
    fn test_repository_name_from_path() {
        let summary = CodeSummary::new("/srv/code/darwin-core");
        assert_eq!(summary.repository_name(), "darwin-core");
    }

    #[test]
    fn test_platform_serialization() {
        let json = serde_json::to_string(&Platform::OrchestratorPod).unwrap();
        assert_eq!(json, "\"orchestrator_pod\"");
    }
}
