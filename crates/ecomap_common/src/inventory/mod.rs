//! Inventory Aggregator v0.4.0 - One snapshot of everything running
//!
//! Sources (queried concurrently, each soft-failing to empty):
//! - listener table (ss / netstat)
//! - docker containers
//! - kubernetes pods
//! - kubernetes services
//!
//! No correlation happens here beyond grouping listeners by port. Matching a
//! service to a listener is left to the caller.

pub mod containers;
pub mod kubernetes;
pub mod listeners;
pub mod processes;

use crate::tool_runner::{SystemToolRunner, ToolRunner};
use crate::types::{ListeningPort, ServiceInventory};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Per-tool timeouts
#[derive(Debug, Clone, Copy)]
pub struct CollectorTimeouts {
    pub listeners: Duration,
    pub containers: Duration,
    pub kubernetes: Duration,
}

impl Default for CollectorTimeouts {
    fn default() -> Self {
        Self {
            listeners: Duration::from_secs(5),
            containers: Duration::from_secs(15),
            kubernetes: Duration::from_secs(20),
        }
    }
}

/// Builds `ServiceInventory` snapshots
#[derive(Clone)]
pub struct InventoryAggregator {
    runner: Arc<dyn ToolRunner>,
    timeouts: CollectorTimeouts,
    /// Restrict kubernetes queries to one namespace (all namespaces when None)
    namespace: Option<String>,
}

impl Default for InventoryAggregator {
    fn default() -> Self {
        Self::new(Arc::new(SystemToolRunner))
    }
}

impl InventoryAggregator {
    pub fn new(runner: Arc<dyn ToolRunner>) -> Self {
        Self {
            runner,
            timeouts: CollectorTimeouts::default(),
            namespace: None,
        }
    }

    pub fn with_timeouts(mut self, timeouts: CollectorTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Run every collector and merge the results into a fresh snapshot
    pub async fn aggregate(&self) -> ServiceInventory {
        let runner = self.runner.as_ref();
        let namespace = self.namespace.as_deref();

        let (listeners, containers, pods, orchestrator_services) = tokio::join!(
            listeners::collect_listening_ports(runner, self.timeouts.listeners),
            containers::collect_containers(runner, self.timeouts.containers),
            kubernetes::collect_pods(runner, namespace, self.timeouts.kubernetes),
            kubernetes::collect_services(runner, namespace, self.timeouts.kubernetes),
        );

        let local = processes::local_process_services(&listeners);

        let mut services = Vec::with_capacity(containers.len() + pods.len() + local.len());
        services.extend(containers);
        services.extend(pods);
        services.extend(local);

        let inventory = ServiceInventory {
            services,
            listening_ports: group_by_port(listeners),
            orchestrator_services,
        };

        info!(
            "Inventory: {} service(s), {} listening port(s), {} k8s service(s)",
            inventory.services.len(),
            inventory.listening_ports.len(),
            inventory.orchestrator_services.len()
        );
        inventory
    }
}

/// Group listeners by port, keeping table order within each port
pub fn group_by_port(listeners: Vec<ListeningPort>) -> BTreeMap<u16, Vec<ListeningPort>> {
    let mut grouped: BTreeMap<u16, Vec<ListeningPort>> = BTreeMap::new();
    for listener in listeners {
        grouped.entry(listener.port).or_default().push(listener);
    }
    grouped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool_runner::{FakeToolRunner, ToolStatus};
    use crate::types::Platform;

    const SS_OUTPUT: &str = "\
LISTEN 0 4096 127.0.0.1:8090 0.0.0.0:* users:((\"python3\",pid=10,fd=3))
LISTEN 0 4096 127.0.0.1:8090 0.0.0.0:* users:((\"python3\",pid=11,fd=3))
LISTEN 0 128 0.0.0.0:22 0.0.0.0:* users:((\"sshd\",pid=1,fd=3))
";

    const DOCKER_OUTPUT: &str = r#"{"Names":"qdrant","Status":"Up 1 hour","Ports":"0.0.0.0:6333->6333/tcp","Image":"qdrant/qdrant"}"#;

    const SVC_JSON: &str = r#"{"items": [{"metadata": {"name": "darwin-api", "namespace": "darwin"}, "spec": {"ports": [{"port": 8090}]}}]}"#;

    #[tokio::test]
    async fn test_aggregate_merges_sources() {
        let fake = FakeToolRunner::new()
            .respond("ss", SS_OUTPUT)
            .respond("docker", DOCKER_OUTPUT)
            .fail("kubectl get -A pods", ToolStatus::Timeout)
            .respond("kubectl get -A svc", SVC_JSON);

        let inventory = InventoryAggregator::new(Arc::new(fake)).aggregate().await;

        // Pods timed out; containers and local processes still present
        assert_eq!(inventory.services.len(), 3);
        assert_eq!(inventory.services[0].platform, Platform::Container);
        assert_eq!(inventory.services[1].platform, Platform::Process);
        assert_eq!(inventory.listening_ports.len(), 2);
        assert_eq!(inventory.listening_ports[&8090].len(), 2);
        assert_eq!(inventory.orchestrator_services.len(), 1);
    }

    #[tokio::test]
    async fn test_aggregate_everything_missing() {
        let inventory = InventoryAggregator::new(Arc::new(FakeToolRunner::new()))
            .aggregate()
            .await;
        assert!(inventory.services.is_empty());
        assert!(inventory.listening_ports.is_empty());
        assert!(inventory.orchestrator_services.is_empty());
    }

    #[tokio::test]
    async fn test_aggregate_namespace_scoping() {
        let fake = FakeToolRunner::new();
        let aggregator = InventoryAggregator::new(Arc::new(fake.clone())).with_namespace("darwin");
        aggregator.aggregate().await;
        assert_eq!(fake.call_count("kubectl get pods -o json -n darwin"), 1);
        assert_eq!(fake.call_count("kubectl get svc -o json -n darwin"), 1);
    }
}
