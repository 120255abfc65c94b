//! Issue classification for inventory snapshots and health results
//!
//! Rules:
//! - container status starting with "Exited" → exited container (warning)
//! - pod status with CrashLoop/ImagePullBackOff → crash loop (critical)
//! - pod phase Pending → pending (warning)
//! - collector-reported issue strings → critical when they mention
//!   crashloop/imagepull, warning otherwise
//! - failed health check → critical unless its port is still listening

use crate::health::HealthCheckResult;
use crate::types::{Platform, ServiceRecord};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

const CRITICAL_TOKENS: &[&str] = &["crashloop", "imagepull"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Warning,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::Warning => "warning",
        }
    }

    pub fn icon(&self) -> &'static str {
        match self {
            Severity::Critical => "🔴",
            Severity::Warning => "🟡",
        }
    }
}

/// What kind of condition an issue describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    CrashLoop,
    ExitedContainer,
    PendingPod,
    /// Reported by a collector (waiting/terminated reasons)
    Reported,
    HealthFailure,
}

/// One actionable finding
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Issue {
    pub severity: Severity,
    pub kind: IssueKind,
    /// Service or check name, prefixed by namespace when known
    pub subject: String,
    pub detail: String,
    pub suggestion: String,
}

impl Issue {
    /// Single-line markdown-friendly rendering
    pub fn render(&self) -> String {
        format!(
            "{} {}: {}. Suggested action: {}",
            self.severity.icon(),
            self.subject,
            self.detail,
            self.suggestion
        )
    }
}

/// Severity of a free-text issue string
pub fn issue_severity(text: &str) -> Severity {
    let lowered = text.to_lowercase();
    if CRITICAL_TOKENS.iter().any(|t| lowered.contains(t)) {
        Severity::Critical
    } else {
        Severity::Warning
    }
}

/// Classify the lifecycle status of one service record
pub fn classify_status(service: &ServiceRecord) -> Option<IssueKind> {
    let status = service.status.to_lowercase();
    match service.platform {
        Platform::OrchestratorPod
            if status.contains("crashloop") || status.contains("imagepullbackoff") =>
        {
            Some(IssueKind::CrashLoop)
        }
        Platform::OrchestratorPod if status == "pending" => Some(IssueKind::PendingPod),
        Platform::Container if status.starts_with("exited") => Some(IssueKind::ExitedContainer),
        _ => None,
    }
}

fn status_issue(service: &ServiceRecord, kind: IssueKind) -> Issue {
    match kind {
        IssueKind::CrashLoop => Issue {
            severity: Severity::Critical,
            kind,
            subject: format!("{} [k8s]", service.name),
            detail: service.status.clone(),
            suggestion: "inspect `kubectl logs` and review the image build".to_string(),
        },
        IssueKind::PendingPod => Issue {
            severity: Severity::Warning,
            kind,
            subject: format!("{} [k8s]", service.name),
            detail: "Pending".to_string(),
            suggestion: "check cluster resource quota and affinity".to_string(),
        },
        _ => Issue {
            severity: Severity::Warning,
            kind,
            subject: format!("{} [docker]", service.name),
            detail: format!("container stopped ({})", service.status),
            suggestion: format!("`docker logs {}` and restart the service", service.name),
        },
    }
}

fn reported_issue(service: &ServiceRecord, text: &str) -> Issue {
    let subject = match &service.namespace {
        Some(ns) => format!("{} / {}", ns, service.name),
        None => service.name.clone(),
    };
    Issue {
        severity: issue_severity(text),
        kind: IssueKind::Reported,
        subject,
        detail: text.to_string(),
        suggestion: "validate image, secrets and cluster events".to_string(),
    }
}

/// Classify one failed health result against the set of listening ports
pub fn classify_health_failure(result: &HealthCheckResult, open_ports: &BTreeSet<u16>) -> Option<Issue> {
    if result.ok {
        return None;
    }

    let target = match (&result.url, result.port) {
        (Some(url), _) => url.clone(),
        (None, Some(port)) => format!("port {}", port),
        (None, None) => "target".to_string(),
    };
    let listening = result.port.map(|p| open_ports.contains(&p)).unwrap_or(false);
    let cause = result.error.clone().unwrap_or_else(|| match result.status_code {
        Some(code) => format!("HTTP {}", code),
        None => "non-OK status".to_string(),
    });

    let suggestion = match result.port {
        Some(port) if !listening => format!("port {} is not listening; start the owning service", port),
        _ => "verify the backing service and restore its listener".to_string(),
    };

    Some(Issue {
        severity: if listening { Severity::Warning } else { Severity::Critical },
        kind: IssueKind::HealthFailure,
        subject: result.name.clone(),
        detail: format!("{} unavailable ({})", target, cause),
        suggestion,
    })
}

/// Every issue in a snapshot, service issues first, duplicates removed
pub fn collect_issues(
    services: &[ServiceRecord],
    health_results: &[HealthCheckResult],
    open_ports: &BTreeSet<u16>,
) -> Vec<Issue> {
    let mut seen: HashSet<Issue> = HashSet::new();
    let mut issues = Vec::new();

    let mut push = |issue: Issue| {
        if seen.insert(issue.clone()) {
            issues.push(issue);
        }
    };

    for service in services {
        if let Some(kind) = classify_status(service) {
            push(status_issue(service, kind));
        }
        for text in &service.issues {
            push(reported_issue(service, text));
        }
    }

    for result in health_results {
        if let Some(issue) = classify_health_failure(result, open_ports) {
            push(issue);
        }
    }

    issues
}

/// Short follow-up list for the report
pub fn action_items(services: &[ServiceRecord], health_results: &[HealthCheckResult]) -> Vec<String> {
    let mut actions = Vec::new();

    for service in services {
        match classify_status(service) {
            Some(IssueKind::CrashLoop) => actions.push(format!(
                "{}: {} - check the build or container image",
                service.name, service.status
            )),
            Some(IssueKind::ExitedContainer) => actions.push(format!(
                "{}: process exited - review logs and restart",
                service.name
            )),
            _ => {}
        }
        for issue in &service.issues {
            actions.push(format!(
                "{}: {} - find the root cause and restore the workload",
                service.name, issue
            ));
        }
    }

    for result in health_results.iter().filter(|r| !r.ok) {
        actions.push(format!(
            "{}: health check failed ({})",
            result.name,
            result.error.as_deref().unwrap_or("non-OK status")
        ));
    }

    actions
}
