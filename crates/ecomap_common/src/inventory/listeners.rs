//! Listening Ports - local TCP listener table
//!
//! Sources, tried in order (first non-empty output wins):
//! - ss -tlnp
//! - netstat -tlnp
//!
//! Parsing is best-effort. A line needs the LISTEN marker, a `:PORT` field and
//! at least one owning process; anything else is skipped.

use crate::tool_runner::ToolRunner;
use crate::types::ListeningPort;
use regex::Regex;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, warn};

/// Listener table commands, primary first
const LISTENER_COMMANDS: &[(&str, &[&str])] = &[("ss", &["-tlnp"]), ("netstat", &["-tlnp"])];

fn port_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r":(\d+)\s").expect("static regex"))
}

/// `users:(("python3",pid=4120,fd=7),("python3",pid=4121,fd=7))`
fn ss_process_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#""([^"]+)",pid=(\d+)"#).expect("static regex"))
}

/// netstat's trailing `PID/Program name` column
fn netstat_process_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s(\d+)/(\S+)\s*$").expect("static regex"))
}

/// Query the listener table, falling back from ss to netstat
///
/// Returns an empty list when neither tool is usable.
pub async fn collect_listening_ports(runner: &dyn ToolRunner, timeout: Duration) -> Vec<ListeningPort> {
    for (program, args) in LISTENER_COMMANDS {
        let output = runner.run(program, args, timeout).await;
        match output.usable_stdout() {
            Some(stdout) => {
                let listeners = parse_listener_table(stdout);
                debug!("{} reported {} listener(s)", output.command, listeners.len());
                return listeners;
            }
            None => {
                debug!("{} unusable: {}", output.command, output.status.as_str());
            }
        }
    }

    warn!("No listener table available (ss and netstat both failed)");
    Vec::new()
}

/// Parse `ss -tlnp` / `netstat -tlnp` output
pub fn parse_listener_table(output: &str) -> Vec<ListeningPort> {
    output.lines().flat_map(parse_listener_line).collect()
}

/// Parse one listener line; every process group on it yields one record
pub fn parse_listener_line(line: &str) -> Vec<ListeningPort> {
    if !line.contains("LISTEN") {
        return Vec::new();
    }

    let padded = format!("{} ", line);
    let port = match port_regex()
        .captures(&padded)
        .and_then(|c| c[1].parse::<u16>().ok())
    {
        Some(port) => port,
        None => return Vec::new(),
    };

    let mut listeners: Vec<ListeningPort> = ss_process_regex()
        .captures_iter(line)
        .filter_map(|c| {
            let pid = c[2].parse::<u32>().ok()?;
            Some(ListeningPort {
                port,
                owning_process_id: Some(pid),
                process_name: c[1].to_string(),
            })
        })
        .collect();

    if listeners.is_empty() && !line.contains("users:(") {
        if let Some(c) = netstat_process_regex().captures(line) {
            if let Ok(pid) = c[1].parse::<u32>() {
                listeners.push(ListeningPort {
                    port,
                    owning_process_id: Some(pid),
                    process_name: c[2].to_string(),
                });
            }
        }
    }

    listeners
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool_runner::{FakeToolRunner, ToolStatus};

    const SS_OUTPUT: &str = "\
State  Recv-Q Send-Q Local Address:Port Peer Address:Port Process
LISTEN 0      4096       127.0.0.1:8090      0.0.0.0:*     users:((\"python3\",pid=4120,fd=7))
LISTEN 0      128          0.0.0.0:22        0.0.0.0:*     users:((\"sshd\",pid=711,fd=3))
LISTEN 0      511        127.0.0.1:3000      0.0.0.0:*     users:((\"node\",pid=900,fd=20),(\"node\",pid=901,fd=20),(\"node\",pid=902,fd=20))
LISTEN 0      4096       127.0.0.1:9999      0.0.0.0:*
";

    #[test]
    fn test_parse_single_process_line() {
        let line = "LISTEN 0 4096 127.0.0.1:8090 0.0.0.0:* users:((\"python3\",pid=4120,fd=7))";
        let listeners = parse_listener_line(line);
        assert_eq!(listeners.len(), 1);
        assert_eq!(listeners[0].port, 8090);
        assert_eq!(listeners[0].owning_process_id, Some(4120));
        assert_eq!(listeners[0].process_name, "python3");
    }

    #[test]
    fn test_parse_multiple_groups_share_port() {
        let line = "LISTEN 0 511 127.0.0.1:3000 0.0.0.0:* users:((\"node\",pid=900,fd=20),(\"node\",pid=901,fd=20),(\"node\",pid=902,fd=20))";
        let listeners = parse_listener_line(line);
        assert_eq!(listeners.len(), 3);
        assert!(listeners.iter().all(|l| l.port == 3000));
        let pids: Vec<_> = listeners.iter().filter_map(|l| l.owning_process_id).collect();
        assert_eq!(pids, vec![900, 901, 902]);
    }

    #[test]
    fn test_parse_skips_unmatched_lines() {
        assert!(parse_listener_line("State Recv-Q Send-Q Local Address:Port").is_empty());
        assert!(parse_listener_line("LISTEN 0 4096 127.0.0.1:9999 0.0.0.0:*").is_empty());
        assert!(parse_listener_line("ESTAB 0 0 10.0.0.2:443 10.0.0.9:5512 users:((\"curl\",pid=1,fd=3))").is_empty());
    }

    #[test]
    fn test_parse_ipv6_listener() {
        let line = "LISTEN 0 4096 [::1]:6333 [::]:* users:((\"qdrant\",pid=77,fd=12))";
        let listeners = parse_listener_line(line);
        assert_eq!(listeners.len(), 1);
        assert_eq!(listeners[0].port, 6333);
    }

    #[test]
    fn test_parse_netstat_line() {
        let line = "tcp        0      0 127.0.0.1:5432          0.0.0.0:*               LISTEN      1234/postgres";
        let listeners = parse_listener_line(line);
        assert_eq!(listeners.len(), 1);
        assert_eq!(listeners[0].port, 5432);
        assert_eq!(listeners[0].owning_process_id, Some(1234));
        assert_eq!(listeners[0].process_name, "postgres");

        let hidden = "tcp        0      0 0.0.0.0:22              0.0.0.0:*               LISTEN      -";
        assert!(parse_listener_line(hidden).is_empty());
    }

    #[test]
    fn test_parse_table() {
        let listeners = parse_listener_table(SS_OUTPUT);
        assert_eq!(listeners.len(), 5);
    }

    #[tokio::test]
    async fn test_collect_falls_back_to_netstat() {
        let fake = FakeToolRunner::new()
            .fail("ss", ToolStatus::NotFound)
            .respond(
                "netstat",
                "tcp 0 0 127.0.0.1:8091 0.0.0.0:* LISTEN 55/python3\n",
            );
        let listeners = collect_listening_ports(&fake, Duration::from_secs(1)).await;
        assert_eq!(listeners.len(), 1);
        assert_eq!(listeners[0].port, 8091);
        assert_eq!(fake.call_count("ss"), 1);
        assert_eq!(fake.call_count("netstat"), 1);
    }

    #[tokio::test]
    async fn test_collect_uses_primary_when_available() {
        let fake = FakeToolRunner::new().respond("ss", SS_OUTPUT);
        let listeners = collect_listening_ports(&fake, Duration::from_secs(1)).await;
        assert_eq!(listeners.len(), 5);
        assert_eq!(fake.call_count("netstat"), 0);
    }

    #[tokio::test]
    async fn test_collect_both_missing_is_empty() {
        let fake = FakeToolRunner::new();
        let listeners = collect_listening_ports(&fake, Duration::from_secs(1)).await;
        assert!(listeners.is_empty());
    }
}
