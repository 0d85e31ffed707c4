use inventory_api::InventoryError;
use thiserror::Error;

/// Failure of a single sweep. Deletions issued before the failure stand.
#[derive(Debug, Error)]
pub enum SweepError {
    /// Listing or looking up volumes or hosts failed.
    #[error("inventory access failed: {0}")]
    Inventory(#[from] InventoryError),
    /// A delete failed for a reason other than the volume already being gone.
    #[error("failed to delete volume {volume}: {source}")]
    Delete {
        volume: String,
        #[source]
        source: InventoryError,
    },
    #[error("sweep cancelled")]
    Cancelled,
}
