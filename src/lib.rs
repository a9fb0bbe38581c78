// src/lib.rs

pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod registry;
pub mod store;
pub mod types;

use std::path::PathBuf;

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::{config_root_dir, load_and_validate, ConfigFile};
use crate::dag::PreparedRun;
use crate::engine::{Conductor, RunSummary};
use crate::exec::ExecContext;
use crate::registry::ModuleRegistry;
use crate::store::EntityRef;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - registry / entities / result store
/// - conductor runtime + worker pool
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = PathBuf::from(&args.config);
    let cfg = load_and_validate(&config_path)?;
    let root_dir = config_root_dir(&config_path);

    if args.dry_run {
        let registry = ModuleRegistry::from_config(&cfg, &root_dir)?;
        let prepared = dag::prepare_run(&registry, args.requested_modules())?;
        print_dry_run(&cfg, &prepared)?;
        return Ok(());
    }

    let ctx = ExecContext::from_config(&cfg, &root_dir)?;
    let conductor = Conductor::spawn(ctx, cfg.config.workers);

    let ticket = conductor
        .conduct(&args.entity, args.requested_modules(), args.group)
        .await?;
    info!(run_id = ticket.run_id(), entity = %args.entity, "run submitted");

    // Ctrl-C → stop waiting and shut down.
    let summary = tokio::select! {
        summary = ticket.wait() => Some(summary?),
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                warn!(error = %e, "failed to listen for Ctrl+C");
            }
            info!("interrupted; shutting down before the run finished");
            None
        }
    };

    if let Some(summary) = summary {
        print_summary(&conductor, &summary)?;
    }

    conductor.shutdown().await?;
    Ok(())
}

fn print_summary(conductor: &Conductor, summary: &RunSummary) -> Result<()> {
    let store = &conductor.context().store;
    let entity: &EntityRef = &summary.entity;

    println!("run {} for {}", summary.run_id, entity);
    for (module, outcome) in summary.outcomes.iter() {
        let status = store.status_of(entity, module)?.to_string();
        println!("  {module:<24} {status:<8} {outcome}");
    }

    Ok(())
}

/// Dry-run output: config, topological order and composed root units.
fn print_dry_run(cfg: &ConfigFile, prepared: &PreparedRun) -> Result<()> {
    println!("conductor dry-run");
    println!("  config.workers = {}", cfg.config.workers);
    if let Some(ref timeout) = cfg.config.processor_timeout {
        println!("  config.processor_timeout = {timeout}");
    }
    println!("  config.result_storage = {:?}", cfg.config.result_storage);
    println!("  config.stale_fields = {:?}", cfg.config.stale_fields);
    println!();

    println!("modules ({}):", cfg.module.len());
    for (name, module) in cfg.module.iter() {
        println!("  - {name}");
        println!("      cmd: {}", module.cmd);
        println!("      capabilities: {:?}", module.capabilities);
        if !module.dependencies.is_empty() {
            println!("      dependencies: {:?}", module.dependencies);
        }
        if !module.produces.is_empty() {
            println!("      produces: {:?}", module.produces);
        }
    }
    println!();

    let order = prepared.graph.topological_order()?;
    println!("order: {}", order.join(", "));
    println!("roots: {}", prepared.composed.root_modules().join(", "));
    for root in prepared.composed.roots.iter() {
        println!("  {root}");
    }

    debug!(
        units = prepared.plan.len(),
        units_built = prepared.composed.units_built,
        "dry-run complete (no execution)"
    );
    Ok(())
}
