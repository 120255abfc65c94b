//! Markdown architecture report
//!
//! Section order: issues, repositories, services, dependency graph, health
//! checks, action items, port-forward script. Rendering is pure; only
//! `write_report` touches the filesystem.

use ecomap_common::fix::PortForwardPlan;
use ecomap_common::graph::node_id;
use ecomap_common::issues::{action_items, collect_issues};
use ecomap_common::{
    DependencyGraph, EcomapError, HealthCheckResult, RepositoryRecord, ServiceInventory,
    ServiceRecord,
};
use std::fs;
use std::path::Path;

pub const REPORT_TITLE: &str = "# Ecomap Architecture Report";

/// Everything one report is built from
pub struct ReportInput<'a> {
    pub repositories: &'a [RepositoryRecord],
    pub inventory: &'a ServiceInventory,
    pub graph: &'a DependencyGraph,
    pub health_results: &'a [HealthCheckResult],
    pub port_forward: &'a PortForwardPlan,
    /// Where the port-forward script was written, if it was
    pub script_path: Option<&'a Path>,
}

pub fn render_report(input: &ReportInput<'_>) -> String {
    let sections = [
        REPORT_TITLE.to_string(),
        render_issues(input),
        render_repositories(input.repositories),
        render_services(&input.inventory.services),
        render_dependency_graph(input.graph),
        render_health(input.health_results),
        render_action_items(&input.inventory.services, input.health_results),
        render_port_forward(input),
    ];
    let mut report = sections.join("\n\n");
    report.push('\n');
    report
}

/// Write the report, creating parent directories
pub fn write_report(path: &Path, report: &str) -> Result<(), EcomapError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| EcomapError::write(path, e))?;
    }
    fs::write(path, report).map_err(|e| EcomapError::write(path, e))
}

fn render_issues(input: &ReportInput<'_>) -> String {
    let mut lines = vec!["## Issues".to_string()];
    let issues = collect_issues(
        &input.inventory.services,
        input.health_results,
        &input.inventory.open_ports(),
    );
    if issues.is_empty() {
        lines.push("- No critical issues found.".to_string());
    } else {
        lines.extend(issues.iter().map(|i| format!("- {}", i.render())));
    }
    lines.join("\n")
}

fn render_repositories(repositories: &[RepositoryRecord]) -> String {
    let mut lines = vec!["## Repositories".to_string()];
    let mut sorted: Vec<&RepositoryRecord> = repositories.iter().collect();
    sorted.sort_by_key(|r| r.name.to_lowercase());

    for repo in sorted {
        lines.push(format!(
            "- **{}** (`{}`) - {}. {}",
            repo.name,
            repo.path.display(),
            repo.current_branch.as_deref().unwrap_or("unknown branch"),
            repo.description.as_deref().unwrap_or("No description")
        ));
    }
    if lines.len() == 1 {
        lines.push("- No repositories found.".to_string());
    }
    lines.join("\n")
}

fn render_services(services: &[ServiceRecord]) -> String {
    let mut lines = vec!["## Services".to_string()];
    if services.is_empty() {
        lines.push("- No services detected.".to_string());
        return lines.join("\n");
    }

    for service in services {
        let ports = if service.ports.is_empty() {
            "no ports detected".to_string()
        } else {
            service.ports.join(", ")
        };
        let location = match &service.namespace {
            Some(ns) => format!("{}:{}", service.platform.as_str(), ns),
            None => service.platform.as_str().to_string(),
        };
        let notes = service
            .notes
            .as_deref()
            .map(|n| format!(" - {}", n))
            .unwrap_or_default();
        lines.push(format!(
            "- **{}** [{}] - {} - {}{}",
            service.name, location, service.status, ports, notes
        ));
    }
    lines.join("\n")
}

fn render_dependency_graph(graph: &DependencyGraph) -> String {
    let mut lines = vec![
        "## Dependency Graph".to_string(),
        "```mermaid".to_string(),
        "graph TD".to_string(),
    ];

    if graph.is_empty() {
        lines.push("    Empty[\"No inter-repository dependencies\"]".to_string());
    } else {
        for name in &graph.nodes {
            lines.push(format!("    {}[\"{}\"]", node_id(name), name));
        }
        for (source, target) in &graph.edges {
            lines.push(format!("    {} --> {}", node_id(source), node_id(target)));
        }
    }

    lines.push("```".to_string());
    lines.join("\n")
}

fn render_health(results: &[HealthCheckResult]) -> String {
    let mut lines = vec!["## Health Checks".to_string()];
    if results.is_empty() {
        lines.push("- No health checks configured.".to_string());
        return lines.join("\n");
    }

    for result in results {
        let icon = if result.ok { "✅" } else { "❌" };
        let target = match (&result.url, result.port) {
            (Some(url), _) => url.clone(),
            (None, Some(port)) => format!("port {}", port),
            (None, None) => "-".to_string(),
        };
        let code = result
            .status_code
            .map(|c| c.to_string())
            .unwrap_or_else(|| "-".to_string());
        let error = result
            .error
            .as_deref()
            .map(|e| format!(" - {}", e))
            .unwrap_or_default();
        lines.push(format!("- {} **{}** ({}) -> {}{}", icon, result.name, target, code, error));
    }
    lines.join("\n")
}

fn render_action_items(services: &[ServiceRecord], results: &[HealthCheckResult]) -> String {
    let mut lines = vec!["## Action Items".to_string()];
    let actions = action_items(services, results);
    if actions.is_empty() {
        lines.push("- No urgent actions.".to_string());
    } else {
        lines.extend(actions.into_iter().map(|a| format!("- {}", a)));
    }
    lines.join("\n")
}

fn render_port_forward(input: &ReportInput<'_>) -> String {
    let mut lines = vec!["## Port Forward Script".to_string()];
    if input.inventory.orchestrator_services.is_empty() {
        lines.push("- No Kubernetes services with exposed ports found.".to_string());
        return lines.join("\n");
    }

    if let Some(path) = input.script_path {
        lines.push(format!("- Generated script: `{}`", path.display()));
    }
    if input.port_forward.is_empty() {
        lines.push("- No allow-listed services to forward right now.".to_string());
    } else {
        lines.push("- Configured forwards:".to_string());
        for command in input.port_forward.command_lines() {
            lines.push(format!("  - `{}`", command));
        }
    }
    lines.join("\n")
}
