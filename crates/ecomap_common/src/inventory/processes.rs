//! Local process services derived from the listener table.
//!
//! Only runtimes we care about are promoted (interpreters and app servers);
//! system daemons and infrastructure plumbing are ignored.

use crate::types::{ListeningPort, Platform, ServiceRecord};
use std::collections::HashSet;

/// Process name prefixes never promoted to services
const IGNORED_PROCESS_PREFIXES: &[&str] = &["systemd", "snapfuse", "pause", "nginx"];

/// Runtime names that make a listener interesting
const INTERESTING_PROCESS_KEYWORDS: &[&str] = &["python", "uvicorn", "gunicorn", "node"];

/// Whether a process name should be surfaced as a local service
pub fn is_interesting_process(name: &str) -> bool {
    let lowered = name.to_lowercase();
    if IGNORED_PROCESS_PREFIXES
        .iter()
        .any(|prefix| lowered.starts_with(prefix))
    {
        return false;
    }
    INTERESTING_PROCESS_KEYWORDS
        .iter()
        .any(|keyword| lowered.contains(keyword))
}

/// Promote interesting listeners to `Platform::Process` records, one per (pid, port)
pub fn local_process_services(listeners: &[ListeningPort]) -> Vec<ServiceRecord> {
    let mut seen: HashSet<(u32, u16)> = HashSet::new();
    let mut services = Vec::new();

    for listener in listeners {
        let pid = match listener.owning_process_id {
            Some(pid) => pid,
            None => continue,
        };
        if !is_interesting_process(&listener.process_name) {
            continue;
        }
        if !seen.insert((pid, listener.port)) {
            continue;
        }

        let mut service = ServiceRecord::new(Platform::Process, &listener.process_name, "LISTENING");
        service.ports = vec![listener.port.to_string()];
        service.notes = Some(format!("PID {}", pid));
        service.owning_process_id = Some(pid);
        services.push(service);
    }

    services
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listener(port: u16, pid: Option<u32>, name: &str) -> ListeningPort {
        ListeningPort {
            port,
            owning_process_id: pid,
            process_name: name.to_string(),
        }
    }

    #[test]
    fn test_interesting_process_filter() {
        assert!(is_interesting_process("python3"));
        assert!(is_interesting_process("Uvicorn"));
        assert!(is_interesting_process("node"));
        assert!(!is_interesting_process("sshd"));
        assert!(!is_interesting_process("systemd-resolved"));
        // Ignore prefixes win over keywords
        assert!(!is_interesting_process("nginx-node-proxy"));
    }

    #[test]
    fn test_local_process_dedup_by_pid_and_port() {
        let listeners = vec![
            listener(8090, Some(10), "python3"),
            listener(8090, Some(10), "python3"),
            listener(8091, Some(10), "python3"),
            listener(3000, Some(11), "node"),
            listener(22, Some(1), "sshd"),
            listener(5000, None, "python3"),
        ];
        let services = local_process_services(&listeners);
        assert_eq!(services.len(), 3);
        assert!(services.iter().all(|s| s.platform == Platform::Process));
        assert!(services.iter().all(|s| s.owning_process_id.is_some()));
        assert_eq!(services[0].ports, vec!["8090"]);
        assert_eq!(services[0].notes.as_deref(), Some("PID 10"));
        assert_eq!(services[0].status, "LISTENING");
    }
}
