//! Kubernetes collectors - pods and services
//!
//! Sources:
//! - kubectl get pods -A -o json
//! - kubectl get svc -A -o json
//!
//! Items are decoded one at a time so a single malformed object never drops
//! the rest of the list.

use crate::tool_runner::ToolRunner;
use crate::types::{OrchestratorServiceRecord, Platform, ServiceRecord};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
struct ItemList {
    #[serde(default)]
    items: Vec<Value>,
}

#[derive(Debug, Default, Deserialize)]
struct ObjectMeta {
    name: Option<String>,
    namespace: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Pod {
    #[serde(default)]
    metadata: ObjectMeta,
    #[serde(default)]
    spec: Option<PodSpec>,
    #[serde(default)]
    status: Option<PodStatus>,
}

#[derive(Debug, Default, Deserialize)]
struct PodSpec {
    #[serde(default)]
    containers: Option<Vec<ContainerSpec>>,
}

#[derive(Debug, Deserialize)]
struct ContainerSpec {
    #[serde(default)]
    ports: Option<Vec<ContainerPort>>,
}

#[derive(Debug, Deserialize)]
struct ContainerPort {
    #[serde(rename = "containerPort")]
    container_port: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct PodStatus {
    phase: Option<String>,
    #[serde(rename = "containerStatuses", default)]
    container_statuses: Option<Vec<ContainerStatus>>,
}

#[derive(Debug, Deserialize)]
struct ContainerStatus {
    name: Option<String>,
    /// Exactly one of running / waiting / terminated
    #[serde(default)]
    state: Option<Map<String, Value>>,
    #[serde(rename = "lastState", default)]
    last_state: Option<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
struct Service {
    #[serde(default)]
    metadata: ObjectMeta,
    #[serde(default)]
    spec: Option<ServiceSpec>,
}

#[derive(Debug, Default, Deserialize)]
struct ServiceSpec {
    #[serde(default)]
    ports: Option<Vec<ServicePort>>,
    #[serde(default)]
    selector: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Deserialize)]
struct ServicePort {
    port: Option<u32>,
}

fn kubectl_args<'a>(resource: &'a str, namespace: Option<&'a str>) -> Vec<&'a str> {
    match namespace {
        Some(ns) => vec!["get", resource, "-o", "json", "-n", ns],
        None => vec!["get", "-A", resource, "-o", "json"],
    }
}

async fn kubectl_items(
    runner: &dyn ToolRunner,
    resource: &str,
    namespace: Option<&str>,
    timeout: Duration,
) -> Vec<Value> {
    let args = kubectl_args(resource, namespace);
    let output = runner.run("kubectl", &args, timeout).await;

    let stdout = match output.usable_stdout() {
        Some(stdout) => stdout,
        None => {
            debug!("kubectl get {} unavailable: {}", resource, output.status.as_str());
            return Vec::new();
        }
    };

    match serde_json::from_str::<ItemList>(stdout) {
        Ok(list) => list.items,
        Err(e) => {
            warn!("kubectl get {} returned invalid JSON: {}", resource, e);
            Vec::new()
        }
    }
}

/// Collect pods as service records
pub async fn collect_pods(
    runner: &dyn ToolRunner,
    namespace: Option<&str>,
    timeout: Duration,
) -> Vec<ServiceRecord> {
    let items = kubectl_items(runner, "pods", namespace, timeout).await;
    let pods: Vec<ServiceRecord> = items.into_iter().filter_map(pod_from_value).collect();
    debug!("kubectl reported {} pod(s)", pods.len());
    pods
}

/// Collect Service objects
pub async fn collect_services(
    runner: &dyn ToolRunner,
    namespace: Option<&str>,
    timeout: Duration,
) -> Vec<OrchestratorServiceRecord> {
    let items = kubectl_items(runner, "svc", namespace, timeout).await;
    let services: Vec<OrchestratorServiceRecord> =
        items.into_iter().filter_map(service_from_value).collect();
    debug!("kubectl reported {} service(s)", services.len());
    services
}

/// Parse a full `kubectl get pods -o json` document
pub fn parse_pods(json: &str) -> Vec<ServiceRecord> {
    serde_json::from_str::<ItemList>(json)
        .map(|list| list.items.into_iter().filter_map(pod_from_value).collect())
        .unwrap_or_default()
}

/// Parse a full `kubectl get svc -o json` document
pub fn parse_services(json: &str) -> Vec<OrchestratorServiceRecord> {
    serde_json::from_str::<ItemList>(json)
        .map(|list| list.items.into_iter().filter_map(service_from_value).collect())
        .unwrap_or_default()
}

fn pod_from_value(value: Value) -> Option<ServiceRecord> {
    let pod: Pod = match serde_json::from_value(value) {
        Ok(pod) => pod,
        Err(e) => {
            warn!("Skipping malformed pod: {}", e);
            return None;
        }
    };

    let status = pod.status.unwrap_or_default();
    let phase = status.phase.unwrap_or_else(|| "unknown".to_string());

    let mut notes = Vec::new();
    let mut issues = Vec::new();
    for container in status.container_statuses.unwrap_or_default() {
        let name = container.name.unwrap_or_else(|| "unknown".to_string());
        let state = container.state.unwrap_or_default();

        let state_key = state.keys().next().map(String::as_str).unwrap_or("unknown");
        notes.push(format!("{}: {}", name, state_key));

        if let Some(reason) = nested_reason(&state, "waiting") {
            issues.push(format!("{}: {}", name, reason));
        }
        if let Some(reason) = container
            .last_state
            .as_ref()
            .and_then(|last| nested_reason(last, "terminated"))
        {
            issues.push(format!("{}: terminated ({})", name, reason));
        }
    }

    if phase.eq_ignore_ascii_case("pending") {
        issues.push("Pending: pod waiting for resources".to_string());
    }

    let ports = pod
        .spec
        .unwrap_or_default()
        .containers
        .unwrap_or_default()
        .into_iter()
        .flat_map(|c| c.ports.unwrap_or_default())
        .filter_map(|p| p.container_port)
        .filter(|p| *p > 0)
        .map(|p| p.to_string())
        .collect();

    let mut record = ServiceRecord::new(
        Platform::OrchestratorPod,
        pod.metadata.name.unwrap_or_else(|| "unknown".to_string()),
        phase,
    );
    record.ports = ports;
    record.notes = if notes.is_empty() {
        None
    } else {
        Some(notes.join("; "))
    };
    record.namespace = Some(
        pod.metadata
            .namespace
            .unwrap_or_else(|| "default".to_string()),
    );
    record.issues = issues;
    Some(record)
}

/// `state.waiting.reason` style lookup; empty reasons count as absent
fn nested_reason(state: &Map<String, Value>, key: &str) -> Option<String> {
    state
        .get(key)?
        .get("reason")?
        .as_str()
        .filter(|r| !r.is_empty())
        .map(String::from)
}

fn service_from_value(value: Value) -> Option<OrchestratorServiceRecord> {
    let service: Service = match serde_json::from_value(value) {
        Ok(service) => service,
        Err(e) => {
            warn!("Skipping malformed service: {}", e);
            return None;
        }
    };

    let spec = service.spec.unwrap_or_default();
    let ports: BTreeSet<u16> = spec
        .ports
        .unwrap_or_default()
        .into_iter()
        .filter_map(|p| p.port)
        .filter_map(|p| u16::try_from(p).ok())
        .filter(|p| *p > 0)
        .collect();

    Some(OrchestratorServiceRecord {
        namespace: service
            .metadata
            .namespace
            .unwrap_or_else(|| "default".to_string()),
        name: service.metadata.name.unwrap_or_else(|| "unknown".to_string()),
        ports,
        selector: spec.selector,
    })
}
