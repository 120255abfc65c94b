//! Remediation child process guard
//!
//! The script runs in its own process group so SIGTERM reaches every
//! backgrounded `port-forward` it started. Exactly one of `terminate` or
//! `detach` consumes the guard; if neither runs, `Drop` kills the group.

use crate::error::EcomapError;
use nix::sys::signal::{kill, killpg, Signal};
use nix::unistd::Pid;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

/// How a terminated child went away
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Exited on its own before we signalled it
    AlreadyExited,
    /// Exited within the grace window after SIGTERM
    Graceful,
    /// Needed SIGKILL
    Forced,
}

impl Termination {
    pub fn as_str(&self) -> &'static str {
        match self {
            Termination::AlreadyExited => "already_exited",
            Termination::Graceful => "graceful",
            Termination::Forced => "forced",
        }
    }
}

/// Owned handle to the running remediation script
#[derive(Debug)]
pub struct RemediationChild {
    child: Option<Child>,
    pid: u32,
    script: PathBuf,
}

impl RemediationChild {
    /// Start the script from its own directory in a fresh process group
    ///
    /// The script path is canonicalized first; a relative path would otherwise
    /// be looked up again from inside the new working directory.
    pub fn spawn(script: &Path) -> Result<Self, EcomapError> {
        let spawn_error = |source| EcomapError::Spawn {
            path: script.to_path_buf(),
            source,
        };
        let program = std::fs::canonicalize(script).map_err(spawn_error)?;

        let mut command = Command::new(&program);
        if let Some(dir) = program.parent() {
            command.current_dir(dir);
        }
        command.stdin(Stdio::null()).process_group(0);

        let child = command.spawn().map_err(spawn_error)?;
        let pid = child
            .id()
            .ok_or_else(|| spawn_error(std::io::Error::other("child exited before reporting a pid")))?;

        info!("Started {} (pid {})", script.display(), pid);
        Ok(Self {
            child: Some(child),
            pid,
            script: script.to_path_buf(),
        })
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn script(&self) -> &Path {
        &self.script
    }

    /// Whether the script has already exited
    pub fn has_exited(&mut self) -> bool {
        match self.child.as_mut().map(|c| c.try_wait()) {
            Some(Ok(Some(_))) | None => true,
            Some(Ok(None)) => false,
            Some(Err(e)) => {
                debug!("try_wait failed for pid {}: {}", self.pid, e);
                false
            }
        }
    }

    /// SIGTERM the process group, then SIGKILL once `grace` runs out
    pub async fn terminate(mut self, grace: Duration) -> Termination {
        let mut child = match self.child.take() {
            Some(child) => child,
            None => return Termination::AlreadyExited,
        };

        if let Ok(Some(status)) = child.try_wait() {
            debug!("pid {} already exited: {}", self.pid, status);
            self.signal_group(Signal::SIGTERM);
            return Termination::AlreadyExited;
        }

        self.signal_group(Signal::SIGTERM);
        match tokio::time::timeout(grace, child.wait()).await {
            Ok(_) => {
                info!("pid {} terminated", self.pid);
                Termination::Graceful
            }
            Err(_) => {
                warn!("pid {} ignored SIGTERM for {:?}, killing", self.pid, grace);
                self.signal_group(Signal::SIGKILL);
                if let Err(e) = child.kill().await {
                    debug!("kill after SIGKILL to group failed: {}", e);
                }
                Termination::Forced
            }
        }
    }

    /// Leave the script running and give up ownership; returns its pid
    pub fn detach(mut self) -> u32 {
        // Dropping a tokio Child without kill_on_drop leaves the process alive
        self.child.take();
        info!("Leaving {} running (pid {})", self.script.display(), self.pid);
        self.pid
    }

    fn signal_group(&self, signal: Signal) {
        let pid = Pid::from_raw(self.pid as i32);
        if let Err(e) = killpg(pid, signal) {
            debug!("killpg({}, {:?}) failed: {}, signalling pid only", self.pid, signal, e);
            let _ = kill(pid, signal);
        }
    }
}

impl Drop for RemediationChild {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            warn!("Remediation child {} dropped without a decision, killing", self.pid);
            self.signal_group(Signal::SIGKILL);
            let _ = child.start_kill();
        }
    }
}
