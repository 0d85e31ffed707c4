use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::{
    Host, HostInventory, InventoryError, PageRequest, Volume, VolumeInventory, VolumePage,
};

/// Serialized inventory snapshot: the volumes and hosts of a cluster.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Fixture {
    #[serde(default)]
    pub volumes: Vec<Volume>,
    #[serde(default)]
    pub hosts: Vec<Host>,
}

/// In-process inventory backed by ordered maps. Pages are ordered by volume
/// name and the continue token is the last name returned.
#[derive(Default)]
pub struct MemoryInventory {
    volumes: Mutex<BTreeMap<String, Volume>>,
    hosts: Mutex<BTreeMap<String, Host>>,
    failing_deletes: Mutex<BTreeSet<String>>,
    list_unavailable: Mutex<bool>,
    list_calls: AtomicUsize,
    delete_calls: AtomicUsize,
}

impl MemoryInventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_fixture(fixture: Fixture) -> Self {
        let inv = Self::new();
        for v in fixture.volumes {
            inv.insert_volume(v);
        }
        for h in fixture.hosts {
            inv.insert_host(h);
        }
        inv
    }

    pub fn insert_volume(&self, volume: Volume) {
        self.volumes.lock().insert(volume.name.clone(), volume);
    }

    pub fn insert_host(&self, host: Host) {
        self.hosts.lock().insert(host.name.clone(), host);
    }

    pub fn remove_host(&self, name: &str) -> Option<Host> {
        self.hosts.lock().remove(name)
    }

    pub fn contains_volume(&self, name: &str) -> bool {
        self.volumes.lock().contains_key(name)
    }

    pub fn volume_names(&self) -> Vec<String> {
        self.volumes.lock().keys().cloned().collect()
    }

    /// Make every delete of `name` fail with [`InventoryError::Unavailable`].
    pub fn fail_deletes_of(&self, name: &str) {
        self.failing_deletes.lock().insert(name.to_string());
    }

    /// Make volume listing fail until switched back.
    pub fn set_list_unavailable(&self, unavailable: bool) {
        *self.list_unavailable.lock() = unavailable;
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    /// Number of delete requests received, including failed ones.
    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VolumeInventory for MemoryInventory {
    async fn list_volumes(&self, page: PageRequest) -> Result<VolumePage, InventoryError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if *self.list_unavailable.lock() {
            return Err(InventoryError::Unavailable("volume listing disabled".into()));
        }
        let volumes = self.volumes.lock();
        let mut rest = volumes
            .iter()
            .filter(|(name, _)| match &page.continue_token {
                Some(token) => name.as_str() > token.as_str(),
                None => true,
            })
            .map(|(_, v)| v);
        let items: Vec<Volume> = rest.by_ref().take(page.limit).cloned().collect();
        let continue_token = match (rest.next(), items.last()) {
            (Some(_), Some(last)) => Some(last.name.clone()),
            _ => None,
        };
        Ok(VolumePage {
            items,
            continue_token,
        })
    }

    async fn delete_volume(&self, name: &str) -> Result<(), InventoryError> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_deletes.lock().contains(name) {
            return Err(InventoryError::Unavailable(format!("cannot delete {name}")));
        }
        match self.volumes.lock().remove(name) {
            Some(_) => Ok(()),
            None => Err(InventoryError::NotFound {
                kind: "volume",
                name: name.to_string(),
            }),
        }
    }
}

#[async_trait]
impl HostInventory for MemoryInventory {
    async fn list_hosts(&self) -> Result<Vec<Host>, InventoryError> {
        Ok(self.hosts.lock().values().cloned().collect())
    }

    async fn get_host(&self, name: &str) -> Result<bool, InventoryError> {
        Ok(self.hosts.lock().contains_key(name))
    }
}
