use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use inventory_api::MemoryInventory;
use prometheus::Registry;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use pvcleaner::{
    classifier::Classifier,
    cli::{Cli, Command},
    cluster::{spawn_node_watch, KubeInventory},
    config::Config,
    metrics::{NoopMetrics, PrometheusMetrics},
    report::{read_fixture, write_json_line},
    Controller, Sweeper,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = Config::load(&cli)?;
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match &cli.command {
        Command::Run => {
            cfg.log_summary();
            let client = kube::Client::try_default().await?;
            let inventory = Arc::new(KubeInventory::new(client));
            let registry = Registry::new();
            let metrics = Arc::new(PrometheusMetrics::new(&registry)?);
            let cancel = CancellationToken::new();

            let mut controller =
                Controller::new(cfg.clone(), inventory.clone(), inventory.clone(), metrics);
            controller.start(&cancel);
            let watch = cfg
                .watch
                .enabled
                .then(|| spawn_node_watch(inventory.nodes(), controller.event_bus(), cancel.clone()));

            info!("local volume cleaner running - press Ctrl+C to exit");
            tokio::signal::ctrl_c().await?;
            cancel.cancel();
            if let Some(watch) = watch {
                watch.await?;
            }
            controller.join().await;
        }
        Command::Sweep => {
            cfg.log_summary();
            let client = kube::Client::try_default().await?;
            let inventory = Arc::new(KubeInventory::new(client));
            let controller = Controller::new(
                cfg.clone(),
                inventory.clone(),
                inventory,
                Arc::new(NoopMetrics),
            );
            let result = controller
                .sweeper()
                .run_full_sweep(&CancellationToken::new())
                .await?;
            write_json_line(&mut tokio::io::stdout(), &result).await?;
        }
        Command::Check { fixture } => {
            let fixture = read_fixture(fixture).await?;
            let classifier =
                Classifier::new(&cfg.storage_classes, cfg.node_selector_keys.clone());
            let hosts: Vec<&str> = fixture.hosts.iter().map(|h| h.name.as_str()).collect();
            for volume in &fixture.volumes {
                let outcome = classifier.classify(volume, |h| hosts.iter().any(|known| *known == h));
                println!(
                    "{:<30} {:<20} {:<8} {:<20} {:?}",
                    volume.name,
                    volume.storage_class,
                    volume.reclaim_policy.to_string(),
                    outcome.host().unwrap_or("-"),
                    outcome
                );
            }
            let inventory = Arc::new(MemoryInventory::from_fixture(fixture));
            let sweeper = Sweeper::new(
                inventory.clone(),
                inventory,
                Arc::new(NoopMetrics),
                classifier,
                true,
                cfg.page_limit,
            );
            let result = sweeper.run_full_sweep(&CancellationToken::new()).await?;
            write_json_line(&mut tokio::io::stdout(), &result).await?;
        }
        Command::Config => {
            print!("{}", toml::to_string_pretty(&cfg)?);
        }
    }
    Ok(())
}
