//! Fix Orchestrator - generate, run, wait, re-verify, decide
//!
//! State progression for one cycle:
//!
//! ```text
//! Idle -> ScriptGenerated -> Running -> Stabilizing -> Verified -> Terminated
//!                                   \
//!                                    \-> Terminated (interrupted)
//! ```
//!
//! `Terminated` ends every spawned cycle. On success the script is detached
//! and keeps running; every other exit path kills it.

use super::child::{RemediationChild, Termination};
use super::script::{plan_port_forwards, write_script, PortForwardPlan};
use crate::config::LoadedConfig;
use crate::error::EcomapError;
use crate::health::{HealthCheckResult, HealthCheckSpec, HealthChecker};
use crate::inventory::InventoryAggregator;
use crate::types::OrchestratorServiceRecord;
use std::collections::BTreeSet;
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixState {
    Idle,
    ScriptGenerated,
    Running,
    Stabilizing,
    Verified,
    Terminated,
}

impl FixState {
    pub fn as_str(&self) -> &'static str {
        match self {
            FixState::Idle => "idle",
            FixState::ScriptGenerated => "script_generated",
            FixState::Running => "running",
            FixState::Stabilizing => "stabilizing",
            FixState::Verified => "verified",
            FixState::Terminated => "terminated",
        }
    }
}

/// Knobs for one fix cycle
#[derive(Debug, Clone)]
pub struct FixSettings {
    pub allowed_prefixes: Vec<String>,
    pub forward_tool: String,
    pub script_path: PathBuf,
    /// Wait between spawning and re-verification
    pub grace_delay: Duration,
    /// Window between SIGTERM and SIGKILL
    pub terminate_grace: Duration,
}

impl FixSettings {
    pub fn from_config(loaded: &LoadedConfig) -> Self {
        let fix = &loaded.config.fix;
        Self {
            allowed_prefixes: fix.allowed_prefixes.clone(),
            forward_tool: fix.forward_tool.clone(),
            script_path: loaded.script_path(),
            grace_delay: Duration::from_secs(fix.grace_delay_secs),
            terminate_grace: Duration::from_secs(fix.terminate_grace_secs),
        }
    }
}

/// Post-spawn re-verification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verification {
    /// Forwarded ports not seen listening, ascending
    pub missing_ports: Vec<u16>,
    pub health_results: Vec<HealthCheckResult>,
}

impl Verification {
    pub fn health_ok(&self) -> bool {
        self.health_results.iter().all(|r| r.ok)
    }

    pub fn is_success(&self) -> bool {
        self.missing_ports.is_empty() && self.health_ok()
    }

    pub fn failed_checks(&self) -> Vec<HealthCheckResult> {
        self.health_results.iter().filter(|r| !r.ok).cloned().collect()
    }
}

/// How a fix cycle ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FixOutcome {
    /// No allow-listed service with ports; nothing was spawned
    NothingToForward,
    /// Tunnels up and healthy; the script keeps running
    Success {
        pid: u32,
        forwarded_ports: BTreeSet<u16>,
        commands: usize,
    },
    /// Forwarded but ports or health checks did not come up
    NotStabilized {
        missing_ports: Vec<u16>,
        failed_checks: Vec<HealthCheckResult>,
        termination: Termination,
    },
    /// Cancelled before a verdict
    Interrupted { termination: Termination },
}

impl FixOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, FixOutcome::NothingToForward | FixOutcome::Success { .. })
    }
}

/// Drives one port-forward remediation cycle
pub struct FixOrchestrator {
    settings: FixSettings,
    aggregator: InventoryAggregator,
    checker: HealthChecker,
    state: FixState,
    history: Vec<FixState>,
}

impl FixOrchestrator {
    pub fn new(settings: FixSettings, aggregator: InventoryAggregator, checker: HealthChecker) -> Self {
        Self {
            settings,
            aggregator,
            checker,
            state: FixState::Idle,
            history: vec![FixState::Idle],
        }
    }

    pub fn state(&self) -> FixState {
        self.state
    }

    /// Every state visited so far, in order
    pub fn history(&self) -> &[FixState] {
        &self.history
    }

    /// Plan for the given services under the configured allow-list
    pub fn plan(&self, services: &[OrchestratorServiceRecord]) -> PortForwardPlan {
        plan_port_forwards(services, &self.settings.allowed_prefixes, &self.settings.forward_tool)
    }

    fn transition(&mut self, next: FixState) {
        info!("fix: {} -> {}", self.state.as_str(), next.as_str());
        self.state = next;
        self.history.push(next);
    }

    /// Run one cycle
    ///
    /// `cancel` resolving at any point after spawn aborts the wait, and the
    /// child is terminated before returning `Interrupted`. Spawn and script
    /// write failures are returned as errors.
    pub async fn run<C>(
        &mut self,
        services: &[OrchestratorServiceRecord],
        checks: &[HealthCheckSpec],
        cancel: C,
    ) -> Result<FixOutcome, EcomapError>
    where
        C: Future<Output = ()>,
    {
        let plan = self.plan(services);
        if plan.is_empty() {
            info!("fix: no allow-listed services with ports, nothing to do");
            return Ok(FixOutcome::NothingToForward);
        }

        write_script(&self.settings.script_path, &plan)?;
        self.transition(FixState::ScriptGenerated);

        let child = RemediationChild::spawn(&self.settings.script_path)?;
        self.transition(FixState::Running);

        tokio::pin!(cancel);

        let interrupted = tokio::select! {
            biased;
            _ = &mut cancel => true,
            _ = tokio::time::sleep(self.settings.grace_delay) => false,
        };

        let verification = if interrupted {
            None
        } else {
            self.transition(FixState::Stabilizing);
            tokio::select! {
                biased;
                _ = &mut cancel => None,
                v = self.verify(&plan, checks) => Some(v),
            }
        };

        let verification = match verification {
            Some(v) => v,
            None => {
                warn!("fix: interrupted, stopping port-forward");
                let termination = child.terminate(self.settings.terminate_grace).await;
                self.transition(FixState::Terminated);
                return Ok(FixOutcome::Interrupted { termination });
            }
        };

        self.transition(FixState::Verified);

        if verification.is_success() {
            let pid = child.detach();
            self.transition(FixState::Terminated);
            return Ok(FixOutcome::Success {
                pid,
                forwarded_ports: plan.forwarded_ports,
                commands: plan.commands.len(),
            });
        }

        warn!(
            "fix: not stabilized (missing ports {:?}, {} failed check(s))",
            verification.missing_ports,
            verification.failed_checks().len()
        );
        let termination = child.terminate(self.settings.terminate_grace).await;
        self.transition(FixState::Terminated);
        Ok(FixOutcome::NotStabilized {
            missing_ports: verification.missing_ports.clone(),
            failed_checks: verification.failed_checks(),
            termination,
        })
    }

    /// Fresh inventory and health pass against the plan
    pub async fn verify(&self, plan: &PortForwardPlan, checks: &[HealthCheckSpec]) -> Verification {
        let inventory = self.aggregator.aggregate().await;
        let health_results = self.checker.run_checks(checks).await;

        let missing_ports = plan
            .forwarded_ports
            .iter()
            .copied()
            .filter(|p| !inventory.is_listening(*p))
            .collect();

        Verification {
            missing_ports,
            health_results,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(ok: bool) -> HealthCheckResult {
        HealthCheckResult {
            name: "x".to_string(),
            url: None,
            status_code: None,
            ok,
            error: None,
            port: None,
        }
    }

    #[test]
    fn test_verification_verdicts() {
        let ok = Verification {
            missing_ports: vec![],
            health_results: vec![result(true)],
        };
        assert!(ok.is_success());

        let missing = Verification {
            missing_ports: vec![6333],
            health_results: vec![result(true)],
        };
        assert!(!missing.is_success());

        let unhealthy = Verification {
            missing_ports: vec![],
            health_results: vec![result(true), result(false)],
        };
        assert!(!unhealthy.is_success());
        assert_eq!(unhealthy.failed_checks().len(), 1);

        // No checks at all still counts as healthy
        assert!(Verification {
            missing_ports: vec![],
            health_results: vec![],
        }
        .health_ok());
    }

    #[test]
    fn test_outcome_success_flags() {
        assert!(FixOutcome::NothingToForward.is_success());
        assert!(!FixOutcome::Interrupted {
            termination: Termination::Graceful
        }
        .is_success());
    }
}
