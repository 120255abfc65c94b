//! Remediation script generation
//!
//! One `port-forward` command per (service, port), backgrounded, followed by
//! `wait` so the script lives as long as its tunnels do.

use crate::error::EcomapError;
use crate::types::OrchestratorServiceRecord;
use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use tracing::info;

const SCRIPT_HEADER: &str = "# Generated by ecomap: port-forwards for allow-listed Kubernetes services";
const EMPTY_SCRIPT_NOTE: &str = "# No allow-listed Kubernetes services with exposed ports were found.";

/// One port-forward invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardCommand {
    pub tool: String,
    pub namespace: String,
    pub service: String,
    pub port: u16,
}

impl fmt::Display for ForwardCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} port-forward -n {} svc/{} {}:{} &",
            self.tool, self.namespace, self.service, self.port, self.port
        )
    }
}

/// Commands to run plus the local ports they should open
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortForwardPlan {
    pub commands: Vec<ForwardCommand>,
    pub forwarded_ports: BTreeSet<u16>,
}

impl PortForwardPlan {
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Rendered command lines, as they appear in the script
    pub fn command_lines(&self) -> Vec<String> {
        self.commands.iter().map(ToString::to_string).collect()
    }
}

/// Whether a service's namespace or name carries an allowed prefix
pub fn is_allowed(service: &OrchestratorServiceRecord, allowed_prefixes: &[String]) -> bool {
    allowed_prefixes.iter().any(|prefix| {
        service.namespace.starts_with(prefix.as_str()) || service.name.starts_with(prefix.as_str())
    })
}

/// Select services and expand them into commands
pub fn plan_port_forwards(
    services: &[OrchestratorServiceRecord],
    allowed_prefixes: &[String],
    tool: &str,
) -> PortForwardPlan {
    let mut plan = PortForwardPlan::default();

    for service in services
        .iter()
        .filter(|s| !s.ports.is_empty())
        .filter(|s| is_allowed(s, allowed_prefixes))
    {
        for port in &service.ports {
            plan.commands.push(ForwardCommand {
                tool: tool.to_string(),
                namespace: service.namespace.clone(),
                service: service.name.clone(),
                port: *port,
            });
            plan.forwarded_ports.insert(*port);
        }
    }

    plan
}

/// Full script text for a plan
pub fn render_script(plan: &PortForwardPlan) -> String {
    let mut lines = vec!["#!/usr/bin/env bash".to_string()];

    if plan.is_empty() {
        lines.push(EMPTY_SCRIPT_NOTE.to_string());
    } else {
        lines.push(SCRIPT_HEADER.to_string());
        lines.push("set -euo pipefail".to_string());
        lines.push(String::new());
        lines.extend(plan.command_lines());
        lines.push(String::new());
        lines.push("wait".to_string());
    }

    let mut script = lines.join("\n");
    script.push('\n');
    script
}

/// Write the script with mode 0755, creating parent directories
pub fn write_script(path: &Path, plan: &PortForwardPlan) -> Result<(), EcomapError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| EcomapError::write(path, e))?;
    }
    fs::write(path, render_script(plan)).map_err(|e| EcomapError::write(path, e))?;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
        .map_err(|e| EcomapError::write(path, e))?;

    info!(
        "Wrote {} with {} port-forward command(s)",
        path.display(),
        plan.commands.len()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn svc(namespace: &str, name: &str, ports: &[u16]) -> OrchestratorServiceRecord {
        OrchestratorServiceRecord {
            namespace: namespace.to_string(),
            name: name.to_string(),
            ports: ports.iter().copied().collect(),
            selector: Some(BTreeMap::new()),
        }
    }

    fn prefixes() -> Vec<String> {
        vec!["darwin".into(), "pcs".into(), "hyperbolic".into()]
    }

    #[test]
    fn test_plan_filters_and_expands() {
        let services = vec![
            svc("darwin", "api", &[8090]),
            svc("default", "pcs-qdrant", &[6333]),
            svc("kube-system", "dns", &[53]),
            svc("darwin", "headless", &[]),
            svc("hyperbolic", "multi", &[9000, 9001]),
        ];
        let plan = plan_port_forwards(&services, &prefixes(), "kubectl");
        assert_eq!(plan.commands.len(), 4);
        assert_eq!(
            plan.forwarded_ports.iter().copied().collect::<Vec<_>>(),
            vec![6333, 8090, 9000, 9001]
        );
        assert_eq!(
            plan.commands[0].to_string(),
            "kubectl port-forward -n darwin svc/api 8090:8090 &"
        );
    }

    #[test]
    fn test_render_script_layout() {
        let plan = plan_port_forwards(&[svc("darwin", "api", &[8090])], &prefixes(), "kubectl");
        let script = render_script(&plan);
        let lines: Vec<_> = script.lines().collect();
        assert_eq!(lines[0], "#!/usr/bin/env bash");
        assert_eq!(lines[1], SCRIPT_HEADER);
        assert_eq!(lines[2], "set -euo pipefail");
        assert!(lines.contains(&"kubectl port-forward -n darwin svc/api 8090:8090 &"));
        assert_eq!(*lines.last().unwrap(), "wait");
    }

    #[test]
    fn test_render_empty_script() {
        let script = render_script(&PortForwardPlan::default());
        assert!(script.contains(EMPTY_SCRIPT_NOTE));
        assert!(!script.contains("port-forward -n"));
        assert!(!script.contains("wait"));
    }

    #[test]
    fn test_write_script_is_executable() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("scripts").join("port-forward.sh");
        let plan = plan_port_forwards(&[svc("pcs", "web", &[3000])], &prefixes(), "kubectl");
        write_script(&path, &plan).unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
        assert!(fs::read_to_string(&path).unwrap().contains("svc/web 3000:3000"));
    }

    #[test]
    fn test_write_failure_surfaces_path() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, "x").unwrap();
        let path = blocker.join("pf.sh");

        let err = write_script(&path, &PortForwardPlan::default()).unwrap_err();
        assert_eq!(err.code(), "write_failure");
        assert!(err.to_string().contains("pf.sh"));
    }
}
