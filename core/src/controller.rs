use std::sync::Arc;

use inventory_api::{HostInventory, MetricsSink, VolumeInventory};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::{
    classifier::Classifier,
    config::Config,
    events::EventBus,
    filter::FilterSpec,
    services::{timer::spawn_periodic, watch::HostRemovalHandler},
    sweep::Sweeper,
};

/// Owns the shared sweeper and the trigger loops built on top of it.
pub struct Controller {
    config: Config,
    sweeper: Arc<Sweeper>,
    bus: Arc<Mutex<EventBus>>,
    tasks: Vec<JoinHandle<()>>,
}

impl Controller {
    pub fn new(
        config: Config,
        volumes: Arc<dyn VolumeInventory>,
        hosts: Arc<dyn HostInventory>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        let classifier = Classifier::new(&config.storage_classes, config.node_selector_keys.clone());
        let sweeper = Arc::new(Sweeper::new(
            volumes,
            hosts,
            metrics,
            classifier,
            config.dry_run,
            config.page_limit,
        ));
        Self {
            config,
            sweeper,
            bus: Arc::new(Mutex::new(EventBus::new())),
            tasks: Vec::new(),
        }
    }

    pub fn sweeper(&self) -> Arc<Sweeper> {
        self.sweeper.clone()
    }

    /// Bus on which a watch source publishes host events.
    pub fn event_bus(&self) -> Arc<Mutex<EventBus>> {
        self.bus.clone()
    }

    /// Spawn the periodic loop and the host removal handler as configured.
    pub fn start(&mut self, cancel: &CancellationToken) {
        if self.config.periodic_active() {
            info!(interval = ?self.config.periodic.interval, "starting periodic cleanup");
            self.tasks.push(spawn_periodic(
                self.sweeper.clone(),
                self.config.periodic.interval,
                self.config.periodic.on_error,
                cancel.clone(),
            ));
        }
        if self.config.watch.enabled {
            info!("starting host removal handler");
            let events = self.bus.lock().subscribe();
            let handler = HostRemovalHandler::new(
                self.sweeper.clone(),
                FilterSpec::hosts_labelled(self.config.node_label_filter.clone()),
            );
            self.tasks.push(handler.spawn(events, cancel.clone()));
        }
    }

    /// Number of trigger loops started and not yet joined.
    pub fn running(&self) -> usize {
        self.tasks.len()
    }

    /// Wait for every trigger loop to exit.
    pub async fn join(&mut self) {
        for task in self.tasks.drain(..) {
            if let Err(err) = task.await {
                error!(%err, "trigger loop panicked");
            }
        }
    }
}
