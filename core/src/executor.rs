use std::sync::Arc;

use inventory_api::{InventoryError, MetricsSink, Volume, VolumeInventory};
use tracing::info;

/// Removes orphaned volumes, or only reports them when `dry_run` is set.
pub struct Executor {
    inventory: Arc<dyn VolumeInventory>,
    metrics: Arc<dyn MetricsSink>,
    dry_run: bool,
}

impl Executor {
    pub fn new(
        inventory: Arc<dyn VolumeInventory>,
        metrics: Arc<dyn MetricsSink>,
        dry_run: bool,
    ) -> Self {
        Self {
            inventory,
            metrics,
            dry_run,
        }
    }

    pub fn dry_run(&self) -> bool {
        self.dry_run
    }

    /// Delete `volume`. Returns `Ok(false)` in dry-run mode without touching
    /// the inventory. Errors, including not-found, are returned as is.
    pub async fn execute(&self, volume: &Volume, host: &str) -> Result<bool, InventoryError> {
        if self.dry_run {
            info!(
                volume = %volume.name,
                host,
                storage_class = %volume.storage_class,
                "dry run, skipping deletion of orphaned volume"
            );
            return Ok(false);
        }
        self.inventory.delete_volume(&volume.name).await?;
        info!(
            volume = %volume.name,
            host,
            storage_class = %volume.storage_class,
            "deleted orphaned volume"
        );
        self.metrics.volume_deleted(&volume.storage_class);
        Ok(true)
    }
}
