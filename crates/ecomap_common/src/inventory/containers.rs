//! Container collector - docker ps
//!
//! Source: `docker ps -a --format '{{json .}}'` (one JSON object per line).
//! A malformed line drops only that container.

use crate::tool_runner::ToolRunner;
use crate::types::{Platform, ServiceRecord};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Subset of the fields docker prints per container
#[derive(Debug, Deserialize)]
struct DockerPsRow {
    #[serde(rename = "Names", default)]
    names: Option<String>,
    #[serde(rename = "Status", default)]
    status: Option<String>,
    #[serde(rename = "Ports", default)]
    ports: Option<String>,
    #[serde(rename = "Image", default)]
    image: Option<String>,
}

/// Collect all containers (running and stopped)
pub async fn collect_containers(runner: &dyn ToolRunner, timeout: Duration) -> Vec<ServiceRecord> {
    let output = runner
        .run("docker", &["ps", "-a", "--format", "{{json .}}"], timeout)
        .await;

    match output.usable_stdout() {
        Some(stdout) => {
            let containers = parse_docker_ps(stdout);
            debug!("docker reported {} container(s)", containers.len());
            containers
        }
        None => {
            debug!("docker unavailable: {}", output.status.as_str());
            Vec::new()
        }
    }
}

/// Parse JSON-lines output of `docker ps`
pub fn parse_docker_ps(output: &str) -> Vec<ServiceRecord> {
    let mut services = Vec::new();

    for line in output.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let row: DockerPsRow = match serde_json::from_str(line) {
            Ok(row) => row,
            Err(e) => {
                warn!("Skipping malformed docker row: {}", e);
                continue;
            }
        };

        let mut service = ServiceRecord::new(
            Platform::Container,
            row.names.unwrap_or_else(|| "unknown".to_string()),
            row.status.unwrap_or_else(|| "unknown".to_string()),
        );
        service.ports = host_ports(row.ports.as_deref().unwrap_or(""));
        service.notes = row.image.filter(|i| !i.is_empty());
        services.push(service);
    }

    services
}

/// `0.0.0.0:8090->8090/tcp, :::8090->8090/tcp` → `["0.0.0.0:8090", ":::8090"]`
pub fn host_ports(ports: &str) -> Vec<String> {
    ports
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| p.split("->").next().unwrap_or(p).trim().to_string())
        .collect()
}
