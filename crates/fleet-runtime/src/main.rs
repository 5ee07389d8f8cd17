//! fleetd: GPU fleet lifecycle controller binary.
//! Single-process daemon embedding the rotation executor, pool monitor,
//! quota monitor, idle watcher, and on-demand activator.

use clap::Parser;

mod cli;
mod config;
mod daemon;
mod server;
mod snapshot;

use cli::{Cli, Command};
use config::FleetConfig;

fn init_tracing() {
    let filter = std::env::var("FLEET_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();

    let config_path = args.config.clone().or_else(cli::default_config_path);
    let mut config = FleetConfig::load(config_path.as_deref())?;
    if let Some(db_path) = &args.db_path {
        config.db_path = db_path.clone();
    }

    match args.command {
        Command::Daemon(opts) => {
            init_tracing();
            tracing::info!("fleetd starting");
            let handles = daemon::start(&config, &opts, args.fake_drivers).await?;
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("shutdown signal received");
                }
                _ = handles.cancel.cancelled() => {}
            }
            handles.shutdown().await;
        }
        Command::Status => {
            init_tracing();
            let store = fleet_store::Store::open(&config.db_path)?;
            let snap = snapshot::build_snapshot(&store)?;
            if args.fake_drivers {
                println!("{}", serde_json::to_string_pretty(&snap)?);
            } else {
                print!("{}", snapshot::render_table(&snap));
            }
        }
        Command::Discover => {
            init_tracing();
            let store = fleet_store::Store::open(&config.db_path)?;
            let secrets = fleet_discovery::EnvSecretSurface;
            let report = fleet_discovery::run(&store, &secrets)?;
            let gateway = fleet_gateway::Gateway::default();
            fleet_discovery::publish_events(&gateway, &report).await;
            println!(
                "added {} removed {} unchanged {}",
                report.added.len(),
                report.removed.len(),
                report.unchanged
            );
        }
        Command::Plan { json } => {
            init_tracing();
            let store = fleet_store::Store::open(&config.db_path)?;
            let workers = store.list_auto_managed_workers()?;
            let schedule = fleet_planner::plan(&workers);
            if json {
                println!("{}", serde_json::to_string_pretty(&schedule)?);
            } else {
                for group in &schedule.groups {
                    println!(
                        "{:<8} provider={:<5?} workers={:?} start_offset_h={:.2} duration_h={:.2}",
                        group.group_id, group.provider, group.workers, group.start_offset_hours, group.duration_hours
                    );
                }
                println!(
                    "estimated coverage: min={} max={} avg={:.2}",
                    schedule.estimated_coverage.min_online,
                    schedule.estimated_coverage.max_online,
                    schedule.estimated_coverage.average_online,
                );
            }
        }
    }

    Ok(())
}
