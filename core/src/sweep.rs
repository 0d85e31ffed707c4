//! Full and targeted reconciliation passes.
//!
//! A sweep keeps no state between runs. It lists the volume inventory page by
//! page, classifies every volume against a host existence predicate and hands
//! orphans to the [`Executor`]. Full and targeted sweeps may run at the same
//! time; a delete that finds the volume already gone is treated as done.

use std::{collections::HashSet, sync::Arc};

use inventory_api::{HostInventory, MetricsSink, PageRequest, Volume, VolumeInventory};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, Instrument};
use uuid::Uuid;

use crate::{
    classifier::{Classification, Classifier},
    error::SweepError,
    executor::Executor,
};

/// Counters for one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepResult {
    pub examined: usize,
    pub orphaned: usize,
    pub deleted: usize,
    pub orphaned_volumes: Vec<String>,
    pub deleted_volumes: Vec<String>,
}

#[derive(Debug, Clone, Copy)]
enum SweepKind {
    Full,
    Targeted,
}

impl SweepKind {
    fn live_message(self) -> &'static str {
        match self {
            SweepKind::Full => "volume host is present",
            SweepKind::Targeted => "volume pinned to another host",
        }
    }
}

pub struct Sweeper {
    volumes: Arc<dyn VolumeInventory>,
    hosts: Arc<dyn HostInventory>,
    metrics: Arc<dyn MetricsSink>,
    classifier: Classifier,
    executor: Executor,
    page_limit: usize,
}

impl Sweeper {
    pub fn new(
        volumes: Arc<dyn VolumeInventory>,
        hosts: Arc<dyn HostInventory>,
        metrics: Arc<dyn MetricsSink>,
        classifier: Classifier,
        dry_run: bool,
        page_limit: usize,
    ) -> Self {
        let executor = Executor::new(volumes.clone(), metrics.clone(), dry_run);
        Self {
            volumes,
            hosts,
            metrics,
            classifier,
            executor,
            page_limit: page_limit.max(1),
        }
    }

    /// Re-evaluate every volume against the current host inventory.
    pub async fn run_full_sweep(
        &self,
        cancel: &CancellationToken,
    ) -> Result<SweepResult, SweepError> {
        let span = info_span!("sweep", kind = "full", id = %Uuid::new_v4());
        async {
            let volumes = self.list_all_volumes(cancel).await?;
            let live: HashSet<String> = self
                .hosts
                .list_hosts()
                .await?
                .into_iter()
                .map(|h| h.name)
                .collect();
            debug!(volumes = volumes.len(), hosts = live.len(), "inventory listed");
            self.reconcile(&volumes, SweepKind::Full, |host| live.contains(host))
                .await
        }
        .instrument(span)
        .await
    }

    /// Re-evaluate volumes pinned to `host`, which was just removed.
    pub async fn run_targeted_sweep(
        &self,
        cancel: &CancellationToken,
        host: &str,
    ) -> Result<SweepResult, SweepError> {
        let span = info_span!("sweep", kind = "targeted", id = %Uuid::new_v4(), host);
        async {
            if host.is_empty() {
                return Ok(SweepResult::default());
            }
            if self.hosts.get_host(host).await? {
                info!("host exists again, skipping targeted sweep");
                return Ok(SweepResult::default());
            }
            let volumes = self.list_all_volumes(cancel).await?;
            self.reconcile(&volumes, SweepKind::Targeted, |resolved| resolved != host)
                .await
        }
        .instrument(span)
        .await
    }

    /// Page through the volume inventory. Stops on a short page or a missing
    /// continue token.
    async fn list_all_volumes(&self, cancel: &CancellationToken) -> Result<Vec<Volume>, SweepError> {
        let mut all = Vec::new();
        let mut token = None;
        loop {
            if cancel.is_cancelled() {
                return Err(SweepError::Cancelled);
            }
            let page = self
                .volumes
                .list_volumes(PageRequest {
                    limit: self.page_limit,
                    continue_token: token.take(),
                })
                .await
                .map_err(|err| {
                    error!(%err, "failed to list volumes");
                    err
                })?;
            let short = page.items.len() < self.page_limit;
            all.extend(page.items);
            match page.continue_token {
                Some(next) if !short && !next.is_empty() => token = Some(next),
                _ => break,
            }
        }
        Ok(all)
    }

    async fn reconcile<F>(
        &self,
        volumes: &[Volume],
        kind: SweepKind,
        host_exists: F,
    ) -> Result<SweepResult, SweepError>
    where
        F: Fn(&str) -> bool,
    {
        let mut result = SweepResult::default();
        for volume in volumes {
            result.examined += 1;
            let host = match self.classifier.classify(volume, &host_exists) {
                Classification::NotApplicable(reason) => {
                    debug!(volume = %volume.name, ?reason, "volume not applicable");
                    continue;
                }
                Classification::Live(host) => {
                    debug!(
                        volume = %volume.name,
                        host = %host,
                        storage_class = %volume.storage_class,
                        "{}",
                        kind.live_message()
                    );
                    continue;
                }
                Classification::Orphaned(host) => host,
            };
            info!(
                volume = %volume.name,
                host = %host,
                storage_class = %volume.storage_class,
                "found orphaned volume"
            );
            result.orphaned += 1;
            result.orphaned_volumes.push(volume.name.clone());
            self.metrics.orphan_detected(&volume.storage_class);

            match self.executor.execute(volume, &host).await {
                Ok(true) => {
                    result.deleted += 1;
                    result.deleted_volumes.push(volume.name.clone());
                }
                Ok(false) => {}
                Err(err) if err.is_not_found() => {
                    debug!(volume = %volume.name, "volume already deleted");
                }
                Err(source) => {
                    error!(volume = %volume.name, host = %host, err = %source, "failed to delete volume");
                    return Err(SweepError::Delete {
                        volume: volume.name.clone(),
                        source,
                    });
                }
            }
        }
        info!(
            examined = result.examined,
            orphaned = result.orphaned,
            deleted = result.deleted,
            dry_run = self.executor.dry_run(),
            deleted_volumes = ?result.deleted_volumes,
            "sweep finished"
        );
        Ok(result)
    }
}
