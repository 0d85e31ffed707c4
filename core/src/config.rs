use std::{
    collections::BTreeMap,
    fs,
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{cli::parse_label, cli::Cli, services::timer::FailurePolicy};

const ENV_PREFIX: &str = "PVCLEANER_";

/// Runtime configuration resolved from defaults, file, environment and CLI.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Config {
    /// Log deletions instead of performing them.
    pub dry_run: bool,
    /// Affinity keys that name the node a volume is pinned to.
    pub node_selector_keys: Vec<String>,
    /// Storage classes in scope. Empty means all.
    pub storage_classes: Vec<String>,
    /// Labels a removed node must carry for its removal to trigger a sweep.
    pub node_label_filter: BTreeMap<String, String>,
    pub periodic: PeriodicConfig,
    pub watch: WatchConfig,
    /// Volumes requested per list call.
    pub page_limit: usize,
    pub log_level: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodicConfig {
    pub enabled: bool,
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
    pub on_error: FailurePolicy,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WatchConfig {
    pub enabled: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dry_run: false,
            node_selector_keys: vec!["topology.topolvm.io/node".to_string()],
            storage_classes: Vec::new(),
            node_label_filter: BTreeMap::new(),
            periodic: PeriodicConfig {
                enabled: true,
                interval: Duration::from_secs(300),
                on_error: FailurePolicy::Stop,
            },
            watch: WatchConfig { enabled: true },
            page_limit: 500,
            log_level: "info".to_string(),
        }
    }
}

#[derive(Deserialize, Default)]
struct FileConfig {
    dry_run: Option<bool>,
    node_selector_keys: Option<Vec<String>>,
    storage_classes: Option<Vec<String>>,
    node_label_filter: Option<BTreeMap<String, String>>,
    #[serde(default)]
    periodic: FilePeriodic,
    #[serde(default)]
    watch: FileWatch,
    page_limit: Option<usize>,
    log_level: Option<String>,
}

#[derive(Deserialize, Default)]
struct FilePeriodic {
    enabled: Option<bool>,
    #[serde(default, with = "humantime_serde")]
    interval: Option<Duration>,
    on_error: Option<FailurePolicy>,
}

#[derive(Deserialize, Default)]
struct FileWatch {
    enabled: Option<bool>,
}

impl Config {
    /// Resolve configuration from CLI, environment variables, config file and defaults.
    pub fn load(cli: &Cli) -> Result<Self> {
        let mut cfg = Config::default();

        // config file path precedence: CLI -> ENV -> platform default
        let explicit = cli
            .config
            .clone()
            .or_else(|| env_var("CONFIG").map(PathBuf::from));
        match &explicit {
            Some(path) => {
                let text = fs::read_to_string(path)
                    .with_context(|| format!("reading config file {}", path.display()))?;
                cfg.apply_file(&text)?;
            }
            None => {
                if let Some(path) = default_config_path().filter(|p| p.exists()) {
                    let text = fs::read_to_string(&path)
                        .with_context(|| format!("reading config file {}", path.display()))?;
                    cfg.apply_file(&text)?;
                }
            }
        }

        cfg.apply_env()?;
        cfg.apply_cli(cli);

        // periodic cleanup is the only trigger left when watching is off
        if !cfg.watch.enabled {
            cfg.periodic.enabled = true;
        }
        cfg.validate()?;
        Ok(cfg)
    }

    fn apply_file(&mut self, text: &str) -> Result<()> {
        let file: FileConfig = toml::from_str(text).context("invalid config file")?;
        if let Some(v) = file.dry_run {
            self.dry_run = v;
        }
        if let Some(v) = file.node_selector_keys {
            self.node_selector_keys = v;
        }
        if let Some(v) = file.storage_classes {
            self.storage_classes = v;
        }
        if let Some(v) = file.node_label_filter {
            self.node_label_filter = v;
        }
        if let Some(v) = file.periodic.enabled {
            self.periodic.enabled = v;
        }
        if let Some(v) = file.periodic.interval {
            self.periodic.interval = v;
        }
        if let Some(v) = file.periodic.on_error {
            self.periodic.on_error = v;
        }
        if let Some(v) = file.watch.enabled {
            self.watch.enabled = v;
        }
        if let Some(v) = file.page_limit {
            self.page_limit = v;
        }
        if let Some(v) = file.log_level {
            self.log_level = v;
        }
        Ok(())
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(v) = parsed_env::<bool>("DRY_RUN")? {
            self.dry_run = v;
        }
        if let Some(v) = env_var("NODE_SELECTOR_KEYS") {
            self.node_selector_keys = split_list(&v);
        }
        if let Some(v) = env_var("STORAGE_CLASSES") {
            self.storage_classes = split_list(&v);
        }
        if let Some(v) = env_var("NODE_LABEL_FILTER") {
            self.node_label_filter = split_list(&v)
                .iter()
                .map(|pair| parse_label(pair).map_err(anyhow::Error::msg))
                .collect::<Result<_>>()
                .context("invalid PVCLEANER_NODE_LABEL_FILTER")?;
        }
        if let Some(v) = parsed_env::<bool>("PERIODIC")? {
            self.periodic.enabled = v;
        }
        if let Some(v) = env_var("INTERVAL") {
            self.periodic.interval =
                humantime::parse_duration(&v).context("invalid PVCLEANER_INTERVAL")?;
        }
        if let Some(v) = parsed_env::<bool>("WATCH_NODES")? {
            self.watch.enabled = v;
        }
        if let Some(v) = parsed_env::<usize>("PAGE_LIMIT")? {
            self.page_limit = v;
        }
        if let Some(v) = env_var("LOG_LEVEL") {
            self.log_level = v;
        }
        Ok(())
    }

    fn apply_cli(&mut self, cli: &Cli) {
        if let Some(v) = cli.dry_run {
            self.dry_run = v;
        }
        if !cli.node_selector_keys.is_empty() {
            self.node_selector_keys = cli.node_selector_keys.clone();
        }
        if !cli.storage_classes.is_empty() {
            self.storage_classes = cli.storage_classes.clone();
        }
        if !cli.node_labels.is_empty() {
            self.node_label_filter = cli.node_labels.iter().cloned().collect();
        }
        if let Some(v) = cli.periodic {
            self.periodic.enabled = v;
        }
        if let Some(v) = cli.interval {
            self.periodic.interval = v;
        }
        if let Some(v) = cli.watch_nodes {
            self.watch.enabled = v;
        }
        if let Some(v) = cli.page_limit {
            self.page_limit = v;
        }
        if let Some(v) = &cli.log_level {
            self.log_level = v.clone();
        }
    }

    fn validate(&self) -> Result<()> {
        if self.node_selector_keys.iter().all(|k| k.trim().is_empty()) {
            anyhow::bail!("at least one node selector key is required");
        }
        if self.page_limit == 0 {
            anyhow::bail!("page_limit must be greater than zero");
        }
        if self.periodic.enabled && self.periodic.interval.is_zero() {
            anyhow::bail!("periodic interval must be greater than zero");
        }
        Ok(())
    }

    /// Whether the periodic loop should run.
    pub fn periodic_active(&self) -> bool {
        self.periodic.enabled || !self.watch.enabled
    }

    /// Log every resolved setting once at startup.
    pub fn log_summary(&self) {
        info!(
            dry_run = self.dry_run,
            node_selector_keys = ?self.node_selector_keys,
            storage_classes = ?self.storage_classes,
            node_label_filter = ?self.node_label_filter,
            periodic = self.periodic_active(),
            interval = %humantime::format_duration(self.periodic.interval),
            on_error = ?self.periodic.on_error,
            watch_nodes = self.watch.enabled,
            page_limit = self.page_limit,
            "resolved configuration"
        );
        if self.node_selector_keys.len() > 1 {
            warn!(
                keys = ?self.node_selector_keys,
                "several node selector keys configured, the first matching affinity expression decides the node"
            );
        }
    }
}

/// Default config file location for the current platform.
pub fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("io", "pvcleaner", "pvcleaner").map(|p| p.config_dir().join("pvcleaner.toml"))
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(format!("{ENV_PREFIX}{name}")).ok()
}

fn parsed_env<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    env_var(name)
        .map(|v| v.trim().parse::<T>())
        .transpose()
        .with_context(|| format!("invalid {ENV_PREFIX}{name}"))
}

fn split_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(String::from)
        .collect()
}
