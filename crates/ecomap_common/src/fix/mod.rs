//! Port-forward remediation: script generation, child lifecycle, orchestration

pub mod child;
pub mod orchestrator;
pub mod script;

pub use child::{RemediationChild, Termination};
pub use orchestrator::{FixOrchestrator, FixOutcome, FixSettings, FixState, Verification};
pub use script::{plan_port_forwards, render_script, write_script, ForwardCommand, PortForwardPlan};
