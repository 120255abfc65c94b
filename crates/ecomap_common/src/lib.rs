//! Ecomap Common - Inventory, health and reconciliation engine
//!
//! Everything here is snapshot-in, snapshot-out: collectors read external
//! tools, the aggregator merges their output, and the fix orchestrator is
//! the only component holding state across a cycle.

pub mod code_analysis;
pub mod config;
pub mod error;
pub mod fix;
pub mod graph;
pub mod health;
pub mod inventory;
pub mod issues;
pub mod repos;
pub mod tool_runner;
pub mod types;

pub use config::*;
pub use error::EcomapError;
pub use graph::DependencyGraph;
pub use health::{HealthCheckResult, HealthCheckSpec};
pub use types::*;
