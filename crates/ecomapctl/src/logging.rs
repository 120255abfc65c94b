//! Logging for ecomapctl
//!
//! Two channels:
//! - diagnostics: `tracing` to stderr, filtered by `ECOMAP_LOG` or `-v`
//! - audit: one JSONL entry per invocation, XDG state dir with fallbacks

use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Environment variable holding a tracing filter directive
pub const LOG_FILTER_ENV: &str = "ECOMAP_LOG";

/// Environment variable overriding the audit log location
pub const LOG_FILE_ENV: &str = "ECOMAPCTL_LOG_FILE";

/// Default filter for a `-v` count
pub fn default_filter(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    }
}

/// Install the stderr subscriber; a second call is a no-op
pub fn init_tracing(verbosity: u8) {
    let filter = if verbosity > 0 {
        EnvFilter::new(default_filter(verbosity))
    } else {
        EnvFilter::try_from_env(LOG_FILTER_ENV).unwrap_or_else(|_| EnvFilter::new(default_filter(0)))
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Log entry for each ecomapctl invocation
#[derive(Debug, Serialize, Deserialize)]
pub struct LogEntry {
    /// ISO 8601 timestamp
    pub ts: String,

    /// Request ID (UUID)
    pub req_id: String,

    /// Command name
    pub command: String,

    /// Command arguments
    #[serde(default)]
    pub args: Vec<String>,

    pub exit_code: i32,

    pub duration_ms: u64,

    pub ok: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetails>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub code: String,
    pub message: String,
}

impl LogEntry {
    /// Audit log path
    ///
    /// Priority:
    /// 1. $ECOMAPCTL_LOG_FILE
    /// 2. $XDG_STATE_HOME/ecomap/ctl.jsonl
    /// 3. ~/.local/state/ecomap/ctl.jsonl
    pub fn discover_log_path() -> Option<PathBuf> {
        if let Ok(path) = std::env::var(LOG_FILE_ENV) {
            if !path.is_empty() {
                return Some(PathBuf::from(path));
            }
        }

        if let Ok(xdg_state) = std::env::var("XDG_STATE_HOME") {
            if !xdg_state.is_empty() {
                return Some(Path::new(&xdg_state).join("ecomap").join("ctl.jsonl"));
            }
        }

        if let Ok(home) = std::env::var("HOME") {
            return Some(Path::new(&home).join(".local/state/ecomap/ctl.jsonl"));
        }

        None
    }

    /// Append to the audit log; failures are logged at debug and swallowed
    pub fn write(&self) {
        let path = match Self::discover_log_path() {
            Some(path) => path,
            None => return,
        };
        if let Err(e) = self.write_to(&path) {
            tracing::debug!("Audit log {} not writable: {}", path.display(), e);
        }
    }

    /// Append this entry as one JSON line
    pub fn write_to(&self, path: &Path) -> Result<(), std::io::Error> {
        let json = serde_json::to_string(self)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "{}", json)?;
        Ok(())
    }

    pub fn generate_req_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    /// Current timestamp in ISO 8601 format
    pub fn now() -> String {
        chrono::Utc::now().to_rfc3339()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entry(exit_code: i32) -> LogEntry {
        LogEntry {
            ts: LogEntry::now(),
            req_id: LogEntry::generate_req_id(),
            command: "check".to_string(),
            args: vec!["check".to_string(), "--config".to_string(), "x.yaml".to_string()],
            exit_code,
            duration_ms: 12,
            ok: exit_code == 0,
            error: None,
        }
    }

    #[test]
    fn test_default_filter_levels() {
        assert_eq!(default_filter(0), "warn");
        assert_eq!(default_filter(1), "info");
        assert_eq!(default_filter(5), "debug");
    }

    #[test]
    fn test_write_appends_jsonl() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state").join("ctl.jsonl");

        entry(0).write_to(&path).unwrap();
        entry(2).write_to(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 2);

        let second: LogEntry = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second.exit_code, 2);
        assert!(!second.ok);
        assert_eq!(second.command, "check");
        assert!(!lines[0].contains("\"error\""));
    }

    #[test]
    fn test_req_ids_unique() {
        assert_ne!(LogEntry::generate_req_id(), LogEntry::generate_req_id());
    }
}
