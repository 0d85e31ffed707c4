//! Shared data model and collaborator interfaces for the orphaned volume
//! cleaner. The controller only ever talks to storage and hosts through the
//! traits defined here.

mod memory;
mod model;

pub use memory::{Fixture, MemoryInventory};
pub use model::{
    Host, MatchExpression, NodeAffinity, ReclaimPolicy, SelectorTerm, UnknownReclaimPolicy,
    Volume,
};

use async_trait::async_trait;
use thiserror::Error;

/// Errors reported by an inventory backend.
#[derive(Debug, Error)]
pub enum InventoryError {
    /// The object does not exist. Deleting something that is already gone
    /// reports this rather than succeeding silently.
    #[error("{kind} {name} not found")]
    NotFound { kind: &'static str, name: String },
    #[error("inventory unavailable: {0}")]
    Unavailable(String),
    #[error(transparent)]
    Backend(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl InventoryError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, InventoryError::NotFound { .. })
    }
}

/// One page request against the volume inventory. A `None` token asks for
/// the first page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub limit: usize,
    pub continue_token: Option<String>,
}

impl PageRequest {
    pub fn first(limit: usize) -> Self {
        Self {
            limit,
            continue_token: None,
        }
    }
}

/// A page of volumes plus the token for the next page, if the backend has one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VolumePage {
    pub items: Vec<Volume>,
    pub continue_token: Option<String>,
}

/// Read and delete access to storage volumes.
#[async_trait]
pub trait VolumeInventory: Send + Sync {
    async fn list_volumes(&self, page: PageRequest) -> Result<VolumePage, InventoryError>;

    /// Delete a volume by name. Must return [`InventoryError::NotFound`] when
    /// the volume is already gone.
    async fn delete_volume(&self, name: &str) -> Result<(), InventoryError>;
}

/// Read access to cluster hosts.
#[async_trait]
pub trait HostInventory: Send + Sync {
    async fn list_hosts(&self) -> Result<Vec<Host>, InventoryError>;

    /// Whether a host with this name currently exists. Backends with a cheap
    /// point lookup should override the list-based default.
    async fn get_host(&self, name: &str) -> Result<bool, InventoryError> {
        Ok(self.list_hosts().await?.iter().any(|h| h.name == name))
    }
}

/// Monotonic counters labelled by storage class.
pub trait MetricsSink: Send + Sync {
    fn orphan_detected(&self, storage_class: &str);
    fn volume_deleted(&self, storage_class: &str);
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ListOnly(Vec<Host>);

    #[async_trait]
    impl HostInventory for ListOnly {
        async fn list_hosts(&self) -> Result<Vec<Host>, InventoryError> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn get_host_falls_back_to_listing() {
        let hosts = ListOnly(vec![Host::new("node-01")]);
        assert!(hosts.get_host("node-01").await.unwrap());
        assert!(!hosts.get_host("node-02").await.unwrap());
    }

    #[test]
    fn not_found_is_distinguishable() {
        let err = InventoryError::NotFound {
            kind: "volume",
            name: "pv-1".into(),
        };
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "volume pv-1 not found");
        assert!(!InventoryError::Unavailable("timeout".into()).is_not_found());
    }
}
