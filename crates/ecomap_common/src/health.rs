//! Health-Check Engine - HTTP and TCP probes
//!
//! Resolution per check:
//! 1. `url` set: HTTP GET, ok on 2xx/3xx
//! 2. `port` set: TCP connect first; then `GET /health` when `expect_http`
//! 3. neither: failed result, never skipped
//!
//! Probe failures are data. Nothing in this module returns an error.

use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::HashSet;
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::{debug, warn};

/// Well-known ports probed unless already configured by name (v1)
pub const DEFAULT_PORT_CHECKS: &[u16] = &[8090, 8091, 8093, 6333, 11434];

/// Default per-probe timeout
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

const DEFAULT_HOST: &str = "localhost";

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_true() -> bool {
    true
}

/// One configured probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheckSpec {
    pub name: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default)]
    pub port: Option<u16>,
    /// After TCP succeeds, also require `GET /health` to succeed
    #[serde(default = "default_true")]
    pub expect_http: bool,
}

impl HealthCheckSpec {
    pub fn url(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: Some(url.into()),
            host: default_host(),
            port: None,
            expect_http: true,
        }
    }

    pub fn port(name: impl Into<String>, host: impl Into<String>, port: u16, expect_http: bool) -> Self {
        Self {
            name: name.into(),
            url: None,
            host: host.into(),
            port: Some(port),
            expect_http,
        }
    }

    /// Parse one raw `health_checks` config entry
    ///
    /// Entries without a name, or with a port that is not a valid TCP port,
    /// are dropped. An entry with a name but neither url nor port is kept so
    /// that it surfaces as a failed check.
    pub fn from_config_entry(entry: &Value) -> Option<Self> {
        let name = entry
            .get("name")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|n| !n.is_empty())?
            .to_string();

        if let Some(url) = entry
            .get("url")
            .and_then(Value::as_str)
            .filter(|u| !u.trim().is_empty())
        {
            return Some(Self::url(name, url.trim()));
        }

        let host = entry
            .get("host")
            .and_then(Value::as_str)
            .filter(|h| !h.is_empty())
            .unwrap_or(DEFAULT_HOST)
            .to_string();
        let expect_http = entry
            .get("expect_http")
            .and_then(Value::as_bool)
            .unwrap_or(true);

        match entry.get("port") {
            None | Some(Value::Null) => Some(Self {
                name,
                url: None,
                host,
                port: None,
                expect_http,
            }),
            Some(raw) => {
                let port = parse_port(raw)?;
                Some(Self::port(name, host, port, expect_http))
            }
        }
    }
}

fn parse_port(raw: &Value) -> Option<u16> {
    match raw {
        Value::Number(n) => n.as_u64().and_then(|p| u16::try_from(p).ok()),
        Value::String(s) => s.trim().parse::<u16>().ok(),
        _ => None,
    }
    .filter(|p| *p > 0)
}

/// Outcome of one probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub name: String,
    pub url: Option<String>,
    pub status_code: Option<u16>,
    pub ok: bool,
    pub error: Option<String>,
    pub port: Option<u16>,
}

impl HealthCheckResult {
    fn failed(spec: &HealthCheckSpec, url: Option<String>, error: impl Into<String>) -> Self {
        Self {
            name: spec.name.clone(),
            url,
            status_code: None,
            ok: false,
            error: Some(error.into()),
            port: spec.port,
        }
    }
}

/// Build the check list from raw config entries plus default ports
///
/// A default port is skipped when a named entry already probes it, so one
/// port is never checked twice under two names.
pub fn assemble_checks(entries: &[Value], default_ports: &[u16]) -> Vec<HealthCheckSpec> {
    let mut checks: Vec<HealthCheckSpec> = entries
        .iter()
        .filter_map(HealthCheckSpec::from_config_entry)
        .collect();

    let registered: HashSet<u16> = checks
        .iter()
        .filter(|c| c.url.is_none())
        .filter_map(|c| c.port)
        .collect();

    for port in default_ports {
        if registered.contains(port) {
            continue;
        }
        checks.push(HealthCheckSpec::port(
            format!("Port {}", port),
            DEFAULT_HOST,
            *port,
            true,
        ));
    }

    checks
}

/// Executes probes with a bounded timeout each
#[derive(Debug, Clone)]
pub struct HealthChecker {
    http: reqwest::Client,
    timeout: Duration,
}

impl Default for HealthChecker {
    fn default() -> Self {
        Self::new(DEFAULT_PROBE_TIMEOUT)
    }
}

impl HealthChecker {
    pub fn new(timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("ecomap/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|e| {
                warn!("Falling back to default HTTP client: {}", e);
                reqwest::Client::new()
            });
        Self { http, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run all checks concurrently; results come back in input order
    pub async fn run_checks(&self, specs: &[HealthCheckSpec]) -> Vec<HealthCheckResult> {
        let handles: Vec<_> = specs
            .iter()
            .cloned()
            .map(|spec| {
                let checker = self.clone();
                let fallback = spec.clone();
                (fallback, tokio::spawn(async move { checker.check(&spec).await }))
            })
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        for (spec, handle) in handles {
            let result = handle.await.unwrap_or_else(|e| {
                HealthCheckResult::failed(&spec, None, format!("probe task failed: {}", e))
            });
            debug!("Health check {}: ok={}", result.name, result.ok);
            results.push(result);
        }
        results
    }

    /// Run a single check
    pub async fn check(&self, spec: &HealthCheckSpec) -> HealthCheckResult {
        if let Some(url) = &spec.url {
            return self.http_get(spec, url).await;
        }

        let port = match spec.port {
            Some(port) => port,
            None => return HealthCheckResult::failed(spec, None, "no URL or port configured"),
        };

        if let Err(e) = self.tcp_connect(&spec.host, port).await {
            return HealthCheckResult::failed(spec, None, e);
        }

        if spec.expect_http {
            let url = format!("http://{}:{}/health", spec.host, port);
            return self.http_get(spec, &url).await;
        }

        HealthCheckResult {
            name: spec.name.clone(),
            url: None,
            status_code: None,
            ok: true,
            error: None,
            port: Some(port),
        }
    }

    async fn tcp_connect(&self, host: &str, port: u16) -> Result<(), String> {
        match tokio::time::timeout(self.timeout, TcpStream::connect((host, port))).await {
            Ok(Ok(_stream)) => Ok(()),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(format!(
                "connection to {}:{} timed out after {}ms",
                host,
                port,
                self.timeout.as_millis()
            )),
        }
    }

    async fn http_get(&self, spec: &HealthCheckSpec, url: &str) -> HealthCheckResult {
        match self.http.get(url).send().await {
            Ok(response) => {
                let status = response.status();
                HealthCheckResult {
                    name: spec.name.clone(),
                    url: Some(url.to_string()),
                    status_code: Some(status.as_u16()),
                    ok: status.is_success() || status.is_redirection(),
                    error: None,
                    port: spec.port,
                }
            }
            Err(e) => HealthCheckResult::failed(spec, Some(url.to_string()), e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn yaml(text: &str) -> Vec<Value> {
        serde_yaml::from_str(text).unwrap()
    }

    /// Minimal HTTP server answering every request with `status`
    async fn spawn_http(status: &'static str) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            loop {
                let (mut socket, _) = match listener.accept().await {
                    Ok(conn) => conn,
                    Err(_) => return,
                };
                tokio::spawn(async move {
                    let mut buf = [0u8; 1024];
                    let _ = socket.read(&mut buf).await;
                    let response = format!(
                        "HTTP/1.1 {}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n",
                        status
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });
        port
    }

    /// A port nothing listens on
    async fn closed_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        port
    }

    #[test]
    fn test_config_entry_parsing() {
        let entries = yaml(
            r#"
- name: api
  url: http://localhost:8090/health
- name: qdrant
  port: 6333
  expect_http: false
- name: string-port
  port: "8093"
  host: 10.0.0.5
- url: http://nameless
- name: bad-port
  port: not-a-number
- name: orphan
"#,
        );
        let specs: Vec<_> = entries.iter().filter_map(HealthCheckSpec::from_config_entry).collect();
        assert_eq!(specs.len(), 4);
        assert_eq!(specs[0].url.as_deref(), Some("http://localhost:8090/health"));
        assert_eq!(specs[1].port, Some(6333));
        assert!(!specs[1].expect_http);
        assert_eq!(specs[2].port, Some(8093));
        assert_eq!(specs[2].host, "10.0.0.5");
        assert_eq!(specs[3].name, "orphan");
        assert!(specs[3].url.is_none() && specs[3].port.is_none());
    }

    #[test]
    fn test_assemble_skips_registered_default_ports() {
        let entries = yaml(
            r#"
- name: Qdrant
  port: 6333
- name: Ollama
  port: 11434
  expect_http: false
"#,
        );
        let checks = assemble_checks(&entries, DEFAULT_PORT_CHECKS);
        let for_6333: Vec<_> = checks.iter().filter(|c| c.port == Some(6333)).collect();
        assert_eq!(for_6333.len(), 1);
        assert_eq!(for_6333[0].name, "Qdrant");
        assert_eq!(checks.iter().filter(|c| c.port == Some(11434)).count(), 1);
        // 2 configured + 3 remaining defaults
        assert_eq!(checks.len(), 5);
        assert!(checks.iter().any(|c| c.name == "Port 8090"));
    }

    #[test]
    fn test_assemble_url_entries_do_not_register_ports() {
        let entries = yaml("- name: api\n  url: http://localhost:8090/health\n");
        let checks = assemble_checks(&entries, &[8090]);
        assert_eq!(checks.len(), 2);
        assert_eq!(checks[1].name, "Port 8090");
    }

    #[tokio::test]
    async fn test_check_without_target_fails() {
        let spec = HealthCheckSpec {
            name: "orphan".to_string(),
            url: None,
            host: default_host(),
            port: None,
            expect_http: true,
        };
        let results = HealthChecker::default().run_checks(&[spec]).await;
        assert_eq!(results.len(), 1);
        assert!(!results[0].ok);
        assert_eq!(results[0].error.as_deref(), Some("no URL or port configured"));
    }

    #[tokio::test]
    async fn test_tcp_only_check() {
        let port = spawn_http("200 OK").await;
        let spec = HealthCheckSpec::port("tcp", "127.0.0.1", port, false);
        let result = HealthChecker::new(Duration::from_secs(2)).check(&spec).await;
        assert!(result.ok);
        assert_eq!(result.status_code, None);
        assert_eq!(result.port, Some(port));
        assert!(result.url.is_none());
    }

    #[tokio::test]
    async fn test_tcp_then_http_health() {
        let port = spawn_http("200 OK").await;
        let spec = HealthCheckSpec::port("http", "127.0.0.1", port, true);
        let result = HealthChecker::new(Duration::from_secs(2)).check(&spec).await;
        assert!(result.ok, "{:?}", result);
        assert_eq!(result.status_code, Some(200));
        assert_eq!(result.url, Some(format!("http://127.0.0.1:{}/health", port)));
    }

    #[tokio::test]
    async fn test_http_error_status() {
        let port = spawn_http("503 Service Unavailable").await;
        let spec = HealthCheckSpec::url("down", format!("http://127.0.0.1:{}/", port));
        let result = HealthChecker::new(Duration::from_secs(2)).check(&spec).await;
        assert!(!result.ok);
        assert_eq!(result.status_code, Some(503));
        assert!(result.error.is_none());
    }

    #[tokio::test]
    async fn test_tcp_failure_skips_http() {
        let port = closed_port().await;
        let spec = HealthCheckSpec::port("closed", "127.0.0.1", port, true);
        let result = HealthChecker::new(Duration::from_secs(2)).check(&spec).await;
        assert!(!result.ok);
        assert!(result.url.is_none());
        assert!(result.status_code.is_none());
        assert!(result.error.is_some());
        assert_eq!(result.port, Some(port));
    }

    #[tokio::test]
    async fn test_url_transport_error() {
        let port = closed_port().await;
        let spec = HealthCheckSpec::url("refused", format!("http://127.0.0.1:{}/health", port));
        let result = HealthChecker::new(Duration::from_secs(2)).check(&spec).await;
        assert!(!result.ok);
        assert!(result.status_code.is_none());
        assert!(result.error.is_some());
    }

    #[tokio::test]
    async fn test_results_keep_spec_order() {
        let open = spawn_http("204 No Content").await;
        let closed = closed_port().await;
        let specs = vec![
            HealthCheckSpec::port("b-closed", "127.0.0.1", closed, false),
            HealthCheckSpec::port("a-open", "127.0.0.1", open, true),
        ];
        let results = HealthChecker::new(Duration::from_secs(2)).run_checks(&specs).await;
        assert_eq!(results[0].name, "b-closed");
        assert!(!results[0].ok);
        assert_eq!(results[1].name, "a-open");
        assert!(results[1].ok);
    }
}
