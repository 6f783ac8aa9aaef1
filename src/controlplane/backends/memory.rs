//! In-Memory Disk Service
//!
//! A self-contained disk service for standalone mode and tests. Resources
//! are keyed by resource group and name, receive Resource Manager style ids,
//! and start in a configurable provisioning state.

use crate::domain::ports::{DiskService, RemoteDisk, RemoteSnapshot};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::RwLock;
use tracing::{debug, info};

type ResourceKey = (String, String);

/// Disk service that keeps everything in process memory
pub struct InMemoryDiskService {
    subscription_id: String,
    /// State assigned to newly created resources
    initial_state: String,
    disks: RwLock<BTreeMap<ResourceKey, RemoteDisk>>,
    snapshots: RwLock<BTreeMap<ResourceKey, RemoteSnapshot>>,
    /// Resource name to status code returned for any call touching it
    failures: RwLock<BTreeMap<String, u16>>,
}

impl InMemoryDiskService {
    /// Create an empty service; new resources report `Succeeded`
    pub fn new(subscription_id: impl Into<String>) -> Self {
        Self {
            subscription_id: subscription_id.into(),
            initial_state: "Succeeded".to_string(),
            disks: RwLock::new(BTreeMap::new()),
            snapshots: RwLock::new(BTreeMap::new()),
            failures: RwLock::new(BTreeMap::new()),
        }
    }

    /// Report `state` for newly created resources instead of `Succeeded`
    pub fn with_initial_state(mut self, state: impl Into<String>) -> Self {
        self.initial_state = state.into();
        self
    }

    fn resource_id(&self, kind: &str, resource_group: &str, name: &str) -> String {
        format!(
            "/subscriptions/{}/resourceGroups/{}/providers/Microsoft.Compute/{}/{}",
            self.subscription_id, resource_group, kind, name
        )
    }

    /// Seed an existing disk, as if provisioned outside the driver
    pub async fn insert_disk(&self, resource_group: &str, mut disk: RemoteDisk) {
        disk.id = Some(self.resource_id("disks", resource_group, &disk.name));
        disk.properties
            .provisioning_state
            .get_or_insert_with(|| "Succeeded".to_string());
        self.disks
            .write()
            .await
            .insert((resource_group.to_string(), disk.name.clone()), disk);
    }

    /// Overwrite the provisioning state of a disk
    pub async fn set_disk_state(&self, resource_group: &str, name: &str, state: &str) -> bool {
        let mut disks = self.disks.write().await;
        match disks.get_mut(&(resource_group.to_string(), name.to_string())) {
            Some(disk) => {
                disk.properties.provisioning_state = Some(state.to_string());
                true
            }
            None => false,
        }
    }

    /// Overwrite the provisioning state of a snapshot
    pub async fn set_snapshot_state(&self, resource_group: &str, name: &str, state: &str) -> bool {
        let mut snapshots = self.snapshots.write().await;
        match snapshots.get_mut(&(resource_group.to_string(), name.to_string())) {
            Some(snapshot) => {
                snapshot.properties.provisioning_state = Some(state.to_string());
                true
            }
            None => false,
        }
    }

    /// Make every call touching `name` fail with `status`
    pub async fn fail_with(&self, name: &str, status: u16) {
        self.failures.write().await.insert(name.to_string(), status);
    }

    pub async fn snapshot_names(&self, resource_group: &str) -> Vec<String> {
        self.snapshots
            .read()
            .await
            .keys()
            .filter(|(rg, _)| rg == resource_group)
            .map(|(_, name)| name.clone())
            .collect()
    }

    pub async fn disk(&self, resource_group: &str, name: &str) -> Option<RemoteDisk> {
        self.disks
            .read()
            .await
            .get(&(resource_group.to_string(), name.to_string()))
            .cloned()
    }

    async fn check_failure(&self, name: &str) -> Result<()> {
        match self.failures.read().await.get(name) {
            Some(status) => Err(Error::RemoteService {
                status: *status,
                message: format!("injected failure for {}", name),
            }),
            None => Ok(()),
        }
    }
}

fn not_found(kind: &str, resource_group: &str, name: &str) -> Error {
    Error::RemoteService {
        status: 404,
        message: format!(
            "ResourceNotFound: {} {}/{} was not found",
            kind, resource_group, name
        ),
    }
}

#[async_trait]
impl DiskService for InMemoryDiskService {
    async fn get_disk(&self, resource_group: &str, name: &str) -> Result<RemoteDisk> {
        self.check_failure(name).await?;
        self.disk(resource_group, name)
            .await
            .ok_or_else(|| not_found("disk", resource_group, name))
    }

    async fn create_or_update_disk(
        &self,
        resource_group: &str,
        mut disk: RemoteDisk,
    ) -> Result<RemoteDisk> {
        self.check_failure(&disk.name).await?;
        info!("Creating in-memory disk {}/{}", resource_group, disk.name);

        disk.id = Some(self.resource_id("disks", resource_group, &disk.name));
        disk.properties.provisioning_state = Some(self.initial_state.clone());
        self.disks
            .write()
            .await
            .insert((resource_group.to_string(), disk.name.clone()), disk.clone());
        Ok(disk)
    }

    async fn get_snapshot(&self, resource_group: &str, name: &str) -> Result<RemoteSnapshot> {
        self.check_failure(name).await?;
        self.snapshots
            .read()
            .await
            .get(&(resource_group.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| not_found("snapshot", resource_group, name))
    }

    async fn create_or_update_snapshot(
        &self,
        resource_group: &str,
        mut snapshot: RemoteSnapshot,
    ) -> Result<RemoteSnapshot> {
        self.check_failure(&snapshot.name).await?;
        info!(
            "Creating in-memory snapshot {}/{}",
            resource_group, snapshot.name
        );

        snapshot.id = Some(self.resource_id("snapshots", resource_group, &snapshot.name));
        snapshot.properties.provisioning_state = Some(self.initial_state.clone());
        self.snapshots.write().await.insert(
            (resource_group.to_string(), snapshot.name.clone()),
            snapshot.clone(),
        );
        Ok(snapshot)
    }

    async fn delete_snapshot(&self, resource_group: &str, name: &str) -> Result<()> {
        self.check_failure(name).await?;
        debug!("Deleting in-memory snapshot {}/{}", resource_group, name);

        let mut snapshots = self.snapshots.write().await;
        if snapshots
            .remove(&(resource_group.to_string(), name.to_string()))
            .is_some()
        {
            Ok(())
        } else {
            Err(not_found("snapshot", resource_group, name))
        }
    }

    fn service_name(&self) -> &str {
        "in-memory"
    }
}
