use std::sync::Arc;

use tokio::{sync::mpsc::UnboundedReceiver, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::{
    error::SweepError,
    events::HostEvent,
    filter::FilterSpec,
    sweep::{SweepResult, Sweeper},
};

/// Turns host removal notifications into targeted sweeps.
pub struct HostRemovalHandler {
    sweeper: Arc<Sweeper>,
    filter: FilterSpec,
}

impl HostRemovalHandler {
    pub fn new(sweeper: Arc<Sweeper>, filter: FilterSpec) -> Self {
        Self { sweeper, filter }
    }

    /// Handle one event. Returns `Ok(None)` when the event does not qualify:
    /// it is not a removal, or the host fails the label filter.
    pub async fn handle(
        &self,
        event: &HostEvent,
        cancel: &CancellationToken,
    ) -> Result<Option<SweepResult>, SweepError> {
        let HostEvent::Removed(host) = event else {
            return Ok(None);
        };
        if let Err(reason) = self.filter.evaluate(host) {
            debug!(host = %host.name, ?reason, "ignoring removal of unmatched host");
            return Ok(None);
        }
        info!(host = %host.name, "host removed, checking for orphaned volumes");
        self.sweeper
            .run_targeted_sweep(cancel, &host.name)
            .await
            .map(Some)
    }

    /// Process events one at a time until the channel closes or `cancel`
    /// fires. A failed sweep only fails its own event.
    pub async fn run(self, mut events: UnboundedReceiver<HostEvent>, cancel: CancellationToken) {
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                event = events.recv() => {
                    let Some(event) = event else { break };
                    match self.handle(&event, &cancel).await {
                        Ok(_) => {}
                        Err(SweepError::Cancelled) => break,
                        Err(err) => error!(%err, "host removal cleanup failed"),
                    }
                }
            }
        }
        info!("stopping host removal handler");
    }

    pub fn spawn(
        self,
        events: UnboundedReceiver<HostEvent>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(self.run(events, cancel))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::{
        classifier::Classifier, events::EventBus, metrics::NoopMetrics, test_support::LogCapture,
    };
    use async_trait::async_trait;
    use inventory_api::{
        Host, InventoryError, MemoryInventory, PageRequest, Volume, VolumeInventory, VolumePage,
    };

    const KEY: &str = "node-selector-key";

    fn handler(inv: &Arc<MemoryInventory>, labels: &[(&str, &str)]) -> HostRemovalHandler {
        let sweeper = Arc::new(Sweeper::new(
            inv.clone(),
            inv.clone(),
            Arc::new(NoopMetrics),
            Classifier::new(&[], vec![KEY.into()]),
            false,
            10,
        ));
        let labels: BTreeMap<String, String> = labels
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        HostRemovalHandler::new(sweeper, FilterSpec::hosts_labelled(labels))
    }

    fn inventory() -> Arc<MemoryInventory> {
        let inv = Arc::new(MemoryInventory::new());
        inv.insert_volume(Volume::new("pv-2").pinned_to(KEY, "node-01"));
        inv
    }

    #[tokio::test]
    async fn removal_of_matching_host_deletes_its_volumes() {
        let inv = inventory();
        let h = handler(&inv, &[("pool", "local")]);
        let host = Host::new("node-01").with_label("pool", "local");
        let result = h
            .handle(&HostEvent::Removed(host), &CancellationToken::new())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result.deleted_volumes, ["pv-2"]);
    }

    #[tokio::test]
    async fn label_mismatch_drops_event() {
        let inv = inventory();
        let h = handler(&inv, &[("pool", "local")]);
        let cancel = CancellationToken::new();
        for host in [
            Host::new("node-01"),
            Host::new("node-01").with_label("pool", "remote"),
        ] {
            let out = h.handle(&HostEvent::Removed(host), &cancel).await.unwrap();
            assert!(out.is_none());
        }
        assert!(inv.contains_volume("pv-2"));
        assert_eq!(inv.list_calls(), 0);
    }

    #[tokio::test]
    async fn additions_are_ignored() {
        let inv = inventory();
        let h = handler(&inv, &[]);
        let out = h
            .handle(&HostEvent::Added(Host::new("node-01")), &CancellationToken::new())
            .await
            .unwrap();
        assert!(out.is_none());
    }

    #[tokio::test]
    async fn failures_do_not_stop_the_loop() {
        let inv = inventory();
        inv.insert_volume(Volume::new("pv-3").pinned_to(KEY, "node-03"));
        let mut bus = EventBus::new();
        let rx = bus.subscribe();
        let handle = handler(&inv, &[]).spawn(rx, CancellationToken::new());

        inv.fail_deletes_of("pv-2");
        bus.publish(HostEvent::Removed(Host::new("node-01")));
        bus.publish(HostEvent::Removed(Host::new("node-03")));
        drop(bus);
        handle.await.unwrap();

        assert!(inv.contains_volume("pv-2"));
        assert!(!inv.contains_volume("pv-3"));
    }

    /// Fires `cancel` while serving the first page, as a shutdown arriving
    /// mid-sweep would.
    struct CancelOnList {
        inner: Arc<MemoryInventory>,
        cancel: CancellationToken,
    }

    #[async_trait]
    impl VolumeInventory for CancelOnList {
        async fn list_volumes(&self, page: PageRequest) -> Result<VolumePage, InventoryError> {
            self.cancel.cancel();
            self.inner.list_volumes(page).await
        }

        async fn delete_volume(&self, name: &str) -> Result<(), InventoryError> {
            self.inner.delete_volume(name).await
        }
    }

    #[tokio::test]
    async fn shutdown_during_sweep_is_a_clean_stop() {
        let logs = LogCapture::default();
        let _guard = logs.install();

        let inv = inventory();
        inv.insert_volume(Volume::new("pv-3").pinned_to(KEY, "node-01"));
        let cancel = CancellationToken::new();
        let sweeper = Arc::new(Sweeper::new(
            Arc::new(CancelOnList {
                inner: inv.clone(),
                cancel: cancel.clone(),
            }),
            inv.clone(),
            Arc::new(NoopMetrics),
            Classifier::new(&[], vec![KEY.into()]),
            false,
            1,
        ));
        let h = HostRemovalHandler::new(sweeper, FilterSpec::default());

        let mut bus = EventBus::new();
        let rx = bus.subscribe();
        bus.publish(HostEvent::Removed(Host::new("node-01")));
        h.run(rx, cancel).await;

        let logs = logs.contents();
        assert!(!logs.contains("host removal cleanup failed"), "logs: {logs}");
        assert!(logs.contains("stopping host removal handler"), "logs: {logs}");
        assert!(inv.contains_volume("pv-2"));
        assert!(inv.contains_volume("pv-3"));
    }
}
