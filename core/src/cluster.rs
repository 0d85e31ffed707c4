//! Kubernetes-backed inventories: PersistentVolumes and Nodes through the API
//! server, and a Node watch feeding the event bus.

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use inventory_api::{
    Host, HostInventory, InventoryError, MatchExpression, NodeAffinity, PageRequest,
    ReclaimPolicy, SelectorTerm, Volume, VolumeInventory, VolumePage,
};
use k8s_openapi::api::core::v1::{Node, PersistentVolume};
use kube::{
    api::{Api, DeleteParams, ListParams},
    runtime::{watcher, WatchStreamExt},
    Client, ResourceExt,
};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::events::{EventBus, HostEvent};

pub struct KubeInventory {
    volumes: Api<PersistentVolume>,
    nodes: Api<Node>,
}

impl KubeInventory {
    pub fn new(client: Client) -> Self {
        Self {
            volumes: Api::all(client.clone()),
            nodes: Api::all(client),
        }
    }

    pub fn nodes(&self) -> Api<Node> {
        self.nodes.clone()
    }
}

fn inventory_error(kind: &'static str, name: &str, err: kube::Error) -> InventoryError {
    match err {
        kube::Error::Api(resp) if resp.code == 404 => InventoryError::NotFound {
            kind,
            name: name.to_string(),
        },
        other => InventoryError::Backend(Box::new(other)),
    }
}

/// Convert a PersistentVolume. A missing or unknown reclaim policy is
/// treated as `Delete`, which keeps the volume out of scope.
pub fn volume_from(pv: &PersistentVolume) -> Volume {
    let spec = pv.spec.clone().unwrap_or_default();
    let reclaim_policy = spec
        .persistent_volume_reclaim_policy
        .as_deref()
        .and_then(|p| p.parse().ok())
        .unwrap_or(ReclaimPolicy::Delete);
    let node_affinity = spec
        .node_affinity
        .and_then(|a| a.required)
        .map(|selector| NodeAffinity {
            terms: selector
                .node_selector_terms
                .into_iter()
                .map(|term| SelectorTerm {
                    match_expressions: term
                        .match_expressions
                        .unwrap_or_default()
                        .into_iter()
                        .map(|e| MatchExpression {
                            key: e.key,
                            values: e.values.unwrap_or_default(),
                        })
                        .collect(),
                })
                .collect(),
        });
    Volume {
        name: pv.name_any(),
        storage_class: spec.storage_class_name.unwrap_or_default(),
        reclaim_policy,
        node_affinity,
    }
}

pub fn host_from(node: &Node) -> Host {
    Host {
        name: node.name_any(),
        labels: node.labels().clone(),
    }
}

#[async_trait]
impl VolumeInventory for KubeInventory {
    async fn list_volumes(&self, page: PageRequest) -> Result<VolumePage, InventoryError> {
        let limit = u32::try_from(page.limit).unwrap_or(u32::MAX);
        let mut params = ListParams::default().limit(limit);
        if let Some(token) = &page.continue_token {
            params = params.continue_token(token);
        }
        let list = self
            .volumes
            .list(&params)
            .await
            .map_err(|e| inventory_error("persistentvolume", "", e))?;
        Ok(VolumePage {
            items: list.items.iter().map(volume_from).collect(),
            continue_token: list.metadata.continue_,
        })
    }

    async fn delete_volume(&self, name: &str) -> Result<(), InventoryError> {
        self.volumes
            .delete(name, &DeleteParams::default())
            .await
            .map(|_| ())
            .map_err(|e| inventory_error("persistentvolume", name, e))
    }
}

#[async_trait]
impl HostInventory for KubeInventory {
    async fn list_hosts(&self) -> Result<Vec<Host>, InventoryError> {
        let list = self
            .nodes
            .list(&ListParams::default())
            .await
            .map_err(|e| inventory_error("node", "", e))?;
        Ok(list.items.iter().map(host_from).collect())
    }

    async fn get_host(&self, name: &str) -> Result<bool, InventoryError> {
        self.nodes
            .get_opt(name)
            .await
            .map(|node| node.is_some())
            .map_err(|e| inventory_error("node", name, e))
    }
}

/// Watch Nodes and publish additions and removals on `bus` until `cancel`
/// fires. Watch errors are retried with backoff.
pub fn spawn_node_watch(
    nodes: Api<Node>,
    bus: Arc<Mutex<EventBus>>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut stream = watcher(nodes, watcher::Config::default())
            .default_backoff()
            .boxed();
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                event = stream.next() => match event {
                    Some(Ok(watcher::Event::Delete(node))) => {
                        debug!(node = %node.name_any(), "node deleted");
                        bus.lock().publish(HostEvent::Removed(host_from(&node)));
                    }
                    Some(Ok(watcher::Event::Apply(node))) => {
                        bus.lock().publish(HostEvent::Added(host_from(&node)));
                    }
                    Some(Ok(_)) => {}
                    Some(Err(err)) => warn!(%err, "node watch error"),
                    None => break,
                },
            }
        }
        info!("node watch stopped");
    })
}
