use inventory_api::MetricsSink;
use prometheus::{IntCounterVec, Opts, Registry};

pub const NAMESPACE: &str = "local_pv_cleaner";
const STORAGE_CLASS: &str = "storage_class";

/// Orphan counters registered into a caller supplied registry. Exporting the
/// registry is left to the embedding process.
#[derive(Clone)]
pub struct PrometheusMetrics {
    orphaned: IntCounterVec,
    deleted: IntCounterVec,
}

impl PrometheusMetrics {
    pub fn new(registry: &Registry) -> prometheus::Result<Self> {
        let orphaned = IntCounterVec::new(
            Opts::new("orphaned_pvs_total", "Total number of orphaned PVs detected")
                .namespace(NAMESPACE),
            &[STORAGE_CLASS],
        )?;
        let deleted = IntCounterVec::new(
            Opts::new("deleted_pvs_total", "Total number of orphaned PVs deleted")
                .namespace(NAMESPACE),
            &[STORAGE_CLASS],
        )?;
        registry.register(Box::new(orphaned.clone()))?;
        registry.register(Box::new(deleted.clone()))?;
        Ok(Self { orphaned, deleted })
    }

    pub fn orphaned_total(&self, storage_class: &str) -> u64 {
        self.orphaned.with_label_values(&[storage_class]).get()
    }

    pub fn deleted_total(&self, storage_class: &str) -> u64 {
        self.deleted.with_label_values(&[storage_class]).get()
    }
}

impl MetricsSink for PrometheusMetrics {
    fn orphan_detected(&self, storage_class: &str) {
        self.orphaned.with_label_values(&[storage_class]).inc();
    }

    fn volume_deleted(&self, storage_class: &str) {
        self.deleted.with_label_values(&[storage_class]).inc();
    }
}

/// Sink that drops every observation.
#[derive(Clone, Copy, Default)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn orphan_detected(&self, _storage_class: &str) {}
    fn volume_deleted(&self, _storage_class: &str) {}
}
