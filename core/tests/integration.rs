use std::{
    io,
    sync::{Arc, Mutex},
    time::Duration,
};

use inventory_api::{Host, MemoryInventory, Volume};
use prometheus::Registry;
use pvcleaner::{
    config::Config, events::HostEvent, metrics::PrometheusMetrics, Controller,
};
use tokio_util::sync::CancellationToken;

const KEY: &str = "node-selector-key";

struct LogWriter(Arc<Mutex<Vec<u8>>>);
impl io::Write for LogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
struct MakeLogWriter(Arc<Mutex<Vec<u8>>>);
impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for MakeLogWriter {
    type Writer = LogWriter;
    fn make_writer(&'a self) -> Self::Writer {
        LogWriter(self.0.clone())
    }
}

fn config(storage_classes: &[&str]) -> Config {
    let mut cfg = Config::default();
    cfg.node_selector_keys = vec![KEY.to_string()];
    cfg.storage_classes = storage_classes.iter().map(|s| s.to_string()).collect();
    cfg
}

fn cluster() -> Arc<MemoryInventory> {
    let inv = Arc::new(MemoryInventory::new());
    inv.insert_volume(Volume::new("pv-2").with_storage_class("bar").pinned_to(KEY, "node-01"));
    inv
}

async fn wait_until(mut done: impl FnMut() -> bool) {
    for _ in 0..100 {
        if done() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn host_removal_event_cleans_pinned_volume() {
    let inv = cluster();
    let registry = Registry::new();
    let metrics = PrometheusMetrics::new(&registry).unwrap();
    let mut cfg = config(&["bar"]);
    cfg.periodic.enabled = false;

    let mut controller = Controller::new(cfg, inv.clone(), inv.clone(), Arc::new(metrics.clone()));
    let cancel = CancellationToken::new();
    controller.start(&cancel);
    assert_eq!(controller.running(), 1);

    let bus = controller.event_bus();
    bus.lock().publish(HostEvent::Removed(Host::new("node-02")));
    bus.lock().publish(HostEvent::Removed(Host::new("node-01")));
    wait_until(|| !inv.contains_volume("pv-2")).await;

    assert!(!inv.contains_volume("pv-2"));
    assert_eq!(metrics.deleted_total("bar"), 1);
    cancel.cancel();
    controller.join().await;
}

#[tokio::test]
async fn periodic_sweep_respects_storage_class_filter() {
    let inv = cluster();
    inv.insert_volume(Volume::new("pv-9").with_storage_class("foo").pinned_to(KEY, "node-09"));
    let mut cfg = config(&["foo"]);
    cfg.watch.enabled = false;
    cfg.periodic.interval = Duration::from_millis(20);

    let metrics = PrometheusMetrics::new(&Registry::new()).unwrap();
    let mut controller = Controller::new(cfg, inv.clone(), inv.clone(), Arc::new(metrics.clone()));
    let cancel = CancellationToken::new();
    controller.start(&cancel);
    wait_until(|| !inv.contains_volume("pv-9")).await;
    cancel.cancel();
    controller.join().await;

    assert!(inv.contains_volume("pv-2"));
    assert!(!inv.contains_volume("pv-9"));
    assert_eq!(metrics.deleted_total("bar"), 0);
    assert_eq!(metrics.deleted_total("foo"), 1);
}

#[tokio::test]
async fn cancellation_stops_both_loops() {
    let inv = cluster();
    inv.insert_host(Host::new("node-01"));
    let mut cfg = config(&[]);
    cfg.periodic.interval = Duration::from_millis(10);
    let mut controller =
        Controller::new(cfg, inv.clone(), inv.clone(), Arc::new(pvcleaner::metrics::NoopMetrics));
    let cancel = CancellationToken::new();
    controller.start(&cancel);
    assert_eq!(controller.running(), 2);
    tokio::time::sleep(Duration::from_millis(30)).await;
    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(2), controller.join())
        .await
        .expect("trigger loops did not stop");
    assert_eq!(controller.running(), 0);
    assert!(inv.contains_volume("pv-2"));
}

#[tokio::test]
async fn dry_run_logs_decisions_without_deleting() {
    let buf = Arc::new(Mutex::new(Vec::new()));
    let subscriber = tracing_subscriber::fmt()
        .with_writer(MakeLogWriter(buf.clone()))
        .with_ansi(false)
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let inv = cluster();
    let mut cfg = config(&[]);
    cfg.dry_run = true;
    let metrics = PrometheusMetrics::new(&Registry::new()).unwrap();
    let controller = Controller::new(cfg, inv.clone(), inv.clone(), Arc::new(metrics.clone()));
    let result = controller
        .sweeper()
        .run_full_sweep(&CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.orphaned, 1);
    assert_eq!(result.deleted, 0);
    assert_eq!(inv.delete_calls(), 0);
    assert_eq!(metrics.orphaned_total("bar"), 1);
    let logs = String::from_utf8(buf.lock().unwrap().clone()).unwrap();
    assert!(logs.contains("found orphaned volume"), "logs: {logs}");
    assert!(logs.contains("dry run, skipping deletion"), "logs: {logs}");
    assert!(logs.contains("pv-2"), "logs: {logs}");
}
