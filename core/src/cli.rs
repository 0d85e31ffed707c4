use clap::{Parser, Subcommand};
use std::{path::PathBuf, time::Duration};

/// Removes persistent volumes whose node no longer exists.
#[derive(Parser, Debug, Default)]
#[command(author, version, about)]
pub struct Cli {
    /// Path to the configuration file.
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Log what would be deleted without deleting. `--dry-run=false` turns it off.
    #[arg(long, num_args = 0..=1, require_equals = true, default_missing_value = "true")]
    pub dry_run: Option<bool>,
    /// Node affinity key naming the node a volume is pinned to. Repeatable.
    #[arg(long = "node-selector-key")]
    pub node_selector_keys: Vec<String>,
    /// Only clean volumes of this storage class. Repeatable.
    #[arg(long = "storage-class")]
    pub storage_classes: Vec<String>,
    /// Only react to removal of nodes carrying this label (KEY=VALUE). Repeatable.
    #[arg(long = "node-label", value_parser = parse_label)]
    pub node_labels: Vec<(String, String)>,
    /// Enable the periodic full sweep (true/false).
    #[arg(long)]
    pub periodic: Option<bool>,
    /// Interval between periodic sweeps, e.g. 5m or 90s.
    #[arg(long, value_parser = humantime::parse_duration)]
    pub interval: Option<Duration>,
    /// Enable sweeps triggered by node deletion (true/false).
    #[arg(long)]
    pub watch_nodes: Option<bool>,
    /// Volumes requested per list call.
    #[arg(long)]
    pub page_limit: Option<usize>,
    /// Default log filter, overridden by RUST_LOG.
    #[arg(long)]
    pub log_level: Option<String>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Default, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run the controller until interrupted.
    #[default]
    Run,
    /// Run one full sweep against the cluster and print the result.
    Sweep,
    /// Classify an inventory snapshot (JSON) without deleting anything.
    Check {
        #[arg(long)]
        fixture: PathBuf,
    },
    /// Print the resolved configuration.
    Config,
}

/// Parse a `KEY=VALUE` label pair.
pub fn parse_label(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((k, v)) if !k.trim().is_empty() => Ok((k.trim().to_string(), v.trim().to_string())),
        _ => Err(format!("expected KEY=VALUE, got {s:?}")),
    }
}
