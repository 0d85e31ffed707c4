use inventory_api::{NodeAffinity, Volume};

use crate::filter::{FilterSpec, Rejection};

/// Why a volume is out of scope for orphan cleanup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    ReclaimPolicy,
    StorageClass,
    /// No affinity, or no expression with a configured key and a value.
    NoHostAffinity,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Orphaned(String),
    Live(String),
    NotApplicable(SkipReason),
}

impl Classification {
    pub fn host(&self) -> Option<&str> {
        match self {
            Classification::Orphaned(h) | Classification::Live(h) => Some(h),
            Classification::NotApplicable(_) => None,
        }
    }
}

/// Resolve the host a volume is pinned to. The first expression, in term
/// then expression order, whose key is configured and which carries at least
/// one value wins; its first value is the host name.
pub fn host_from_affinity<'a>(
    affinity: Option<&'a NodeAffinity>,
    node_selector_keys: &[String],
) -> Option<&'a str> {
    affinity?
        .expressions()
        .find(|e| node_selector_keys.contains(&e.key) && !e.values.is_empty())
        .map(|e| e.values[0].as_str())
}

/// Decides, without any I/O, whether a volume is orphaned.
#[derive(Debug, Clone)]
pub struct Classifier {
    filter: FilterSpec,
    node_selector_keys: Vec<String>,
}

impl Classifier {
    pub fn new(storage_classes: &[String], node_selector_keys: Vec<String>) -> Self {
        Self {
            filter: FilterSpec::orphan_candidates(storage_classes.iter().cloned()),
            node_selector_keys,
        }
    }

    /// Classify `volume`; `host_exists` answers whether the resolved host is
    /// still part of the cluster.
    pub fn classify<F>(&self, volume: &Volume, host_exists: F) -> Classification
    where
        F: Fn(&str) -> bool,
    {
        match self.filter.evaluate(volume) {
            Ok(()) => {}
            Err(Rejection::StorageClass) => {
                return Classification::NotApplicable(SkipReason::StorageClass)
            }
            Err(_) => return Classification::NotApplicable(SkipReason::ReclaimPolicy),
        }
        let Some(host) = host_from_affinity(volume.node_affinity.as_ref(), &self.node_selector_keys)
        else {
            return Classification::NotApplicable(SkipReason::NoHostAffinity);
        };
        if host_exists(host) {
            Classification::Live(host.to_string())
        } else {
            Classification::Orphaned(host.to_string())
        }
    }
}
