//! Command handlers
//!
//! Each handler returns the process exit code; errors bubble up to `main`,
//! which maps them through `errors::exit_code_for_error`.

use crate::cli::{Cli, Commands};
use crate::errors::{
    EXIT_CHECKS_FAILED, EXIT_INTERRUPTED, EXIT_NOT_STABILIZED, EXIT_SUCCESS,
};
use crate::report::{render_report, write_report, ReportInput};
use anyhow::{Context, Result};
use ecomap_common::code_analysis::analyze_codebases;
use ecomap_common::fix::{
    plan_port_forwards, write_script, FixOrchestrator, FixOutcome, FixSettings, PortForwardPlan,
};
use ecomap_common::graph::build_graph;
use ecomap_common::health::{assemble_checks, HealthChecker, DEFAULT_PORT_CHECKS};
use ecomap_common::inventory::InventoryAggregator;
use ecomap_common::repos::discover_repositories;
use ecomap_common::{
    CodeSummary, DependencyGraph, EcomapConfig, HealthCheckResult, HealthCheckSpec, LoadedConfig,
    RepositoryRecord, ServiceInventory,
};
use owo_colors::OwoColorize;
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;

/// Dispatch a parsed command line
pub async fn run(cli: &Cli) -> Result<i32> {
    let loaded = EcomapConfig::load(cli.config.as_deref())?;
    info!("Using config {}", loaded.path.display());

    match &cli.command {
        Commands::Scan { json } => scan(&loaded, *json).await,
        Commands::Check => check(&loaded).await,
        Commands::Report { output } => report(&loaded, output.clone()).await,
        Commands::Fix => fix(&loaded).await,
    }
}

/// One full discovery pass
#[derive(Debug, Serialize)]
pub struct Discovery {
    pub repositories: Vec<RepositoryRecord>,
    pub inventory: ServiceInventory,
    pub code_summaries: Vec<CodeSummary>,
    pub dependency_graph: DependencyGraph,
    pub health_results: Vec<HealthCheckResult>,
    #[serde(skip)]
    pub port_forward: PortForwardPlan,
    pub port_forward_commands: Vec<String>,
}

fn health_checks(loaded: &LoadedConfig) -> Vec<HealthCheckSpec> {
    assemble_checks(&loaded.config.health_checks, DEFAULT_PORT_CHECKS)
}

/// Repositories, code, inventory and health, gathered concurrently
pub async fn discover(loaded: &LoadedConfig) -> Result<Discovery> {
    let config = &loaded.config;
    let roots = config.repository_roots();
    let checks = health_checks(loaded);
    let checker = HealthChecker::new(config.probe_timeout());
    let aggregator = InventoryAggregator::default();

    let code_task = tokio::task::spawn_blocking(move || {
        let repositories = discover_repositories(&roots);
        let summaries = analyze_codebases(&repositories);
        (repositories, summaries)
    });

    let (inventory, health_results, code) =
        tokio::join!(aggregator.aggregate(), checker.run_checks(&checks), code_task);
    let (repositories, code_summaries) = code.context("Repository scan task failed")?;

    let dependency_graph = build_graph(&repositories, &code_summaries, &config.graph.interesting_prefixes);
    let port_forward = plan_port_forwards(
        &inventory.orchestrator_services,
        &config.fix.allowed_prefixes,
        &config.fix.forward_tool,
    );

    Ok(Discovery {
        repositories,
        inventory,
        code_summaries,
        dependency_graph,
        health_results,
        port_forward_commands: port_forward.command_lines(),
        port_forward,
    })
}

async fn scan(loaded: &LoadedConfig, json: bool) -> Result<i32> {
    let discovery = discover(loaded).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&discovery)?);
        return Ok(EXIT_SUCCESS);
    }

    let failed = discovery.health_results.iter().filter(|r| !r.ok).count();
    println!();
    println!("{}", "Ecomap summary".bold());
    println!("  Repositories:       {}", discovery.repositories.len());
    println!("  Services:           {}", discovery.inventory.services.len());
    println!("  Listening ports:    {}", discovery.inventory.listening_ports.len());
    println!(
        "  Health checks:      {} ({})",
        discovery.health_results.len(),
        if failed == 0 {
            "all ok".bright_green().to_string()
        } else {
            format!("{} failed", failed).bright_red().to_string()
        }
    );
    println!("  Code summaries:     {}", discovery.code_summaries.len());
    println!("  Dependency edges:   {}", discovery.dependency_graph.edges.len());
    if !discovery.port_forward.is_empty() {
        println!(
            "  Port-forward:       {} port(s), {} command(s) -> {}",
            discovery.port_forward.forwarded_ports.len(),
            discovery.port_forward.commands.len(),
            loaded.script_path().display().cyan()
        );
    }
    Ok(EXIT_SUCCESS)
}

fn print_health_results(results: &[HealthCheckResult]) {
    for result in results {
        let tag = if result.ok {
            "[OK]".bright_green().to_string()
        } else {
            "[FAIL]".bright_red().to_string()
        };
        let target = result
            .url
            .clone()
            .or_else(|| result.port.map(|p| format!("port {}", p)))
            .unwrap_or_else(|| "-".to_string());
        match &result.error {
            Some(error) => println!("{} {} ({}): {}", tag, result.name, target, error.dimmed()),
            None => println!("{} {} ({})", tag, result.name, target),
        }
    }
}

async fn check(loaded: &LoadedConfig) -> Result<i32> {
    let checks = health_checks(loaded);
    let results = HealthChecker::new(loaded.config.probe_timeout())
        .run_checks(&checks)
        .await;

    print_health_results(&results);

    if results.iter().any(|r| !r.ok) {
        Ok(EXIT_CHECKS_FAILED)
    } else {
        Ok(EXIT_SUCCESS)
    }
}

async fn report(loaded: &LoadedConfig, output: Option<PathBuf>) -> Result<i32> {
    let discovery = discover(loaded).await?;

    let script_path = loaded.script_path();
    write_script(&script_path, &discovery.port_forward)?;

    let output_path = output.unwrap_or_else(|| loaded.report_path());
    println!("Writing report to {}", output_path.display().cyan());

    let text = render_report(&ReportInput {
        repositories: &discovery.repositories,
        inventory: &discovery.inventory,
        graph: &discovery.dependency_graph,
        health_results: &discovery.health_results,
        port_forward: &discovery.port_forward,
        script_path: Some(&script_path),
    });
    write_report(&output_path, &text)?;

    println!("{}", "[OK] Report written".bright_green());
    Ok(EXIT_SUCCESS)
}

/// Resolves on Ctrl-C; never resolves if the handler cannot be installed
async fn interrupted() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Ctrl-C handler unavailable: {}", e);
        std::future::pending::<()>().await;
    }
}

async fn fix(loaded: &LoadedConfig) -> Result<i32> {
    let aggregator = InventoryAggregator::default();
    let inventory = aggregator.aggregate().await;
    let checks = health_checks(loaded);
    let settings = FixSettings::from_config(loaded);

    let mut orchestrator = FixOrchestrator::new(
        settings.clone(),
        aggregator,
        HealthChecker::new(loaded.config.probe_timeout()),
    );

    let plan = orchestrator.plan(&inventory.orchestrator_services);
    if !plan.is_empty() {
        println!("-> {} port-forward command(s)", plan.commands.len());
        println!("-> Running {}", settings.script_path.display().cyan());
    }

    let outcome = orchestrator
        .run(&inventory.orchestrator_services, &checks, interrupted())
        .await?;

    let code = match outcome {
        FixOutcome::NothingToForward => {
            println!("No allow-listed Kubernetes services to forward.");
            EXIT_SUCCESS
        }
        FixOutcome::Success { pid, forwarded_ports, .. } => {
            println!(
                "{} Port-forward established on {:?}; health checks OK.",
                "[OK]".bright_green(),
                forwarded_ports
            );
            println!("Tunnels keep running (pid {}); kill the process group to stop them.", pid);
            EXIT_SUCCESS
        }
        FixOutcome::NotStabilized {
            missing_ports,
            failed_checks,
            termination,
        } => {
            if !missing_ports.is_empty() {
                println!("{} Ports not listening: {:?}", "[FAIL]".bright_red(), missing_ports);
            }
            print_health_results(&failed_checks);
            println!(
                "{} Port-forward did not stabilize; script stopped ({}).",
                "[WARN]".yellow(),
                termination.as_str()
            );
            EXIT_NOT_STABILIZED
        }
        FixOutcome::Interrupted { termination } => {
            println!("Interrupted; port-forward stopped ({}).", termination.as_str());
            EXIT_INTERRUPTED
        }
    };
    Ok(code)
}
