//! Shared fixtures for driver tests

use super::AzureDriver;
use crate::controlplane::backends::InMemoryDiskService;
use crate::controlplane::platform::InMemoryVolumeDirectory;
use crate::crd::{
    ApplicationBackup, ApplicationBackupSpec, ApplicationRestore, ApplicationRestoreSpec,
};
use crate::domain::ports::{RemoteDisk, Scope};
use crate::metrics::DriverMetrics;
use k8s_openapi::api::core::v1::{
    AzureDiskVolumeSource, PersistentVolume, PersistentVolumeClaim, PersistentVolumeClaimSpec,
    PersistentVolumeSpec,
};
use kube::api::ObjectMeta;
use std::collections::BTreeMap;
use std::sync::Arc;

pub(crate) struct Harness {
    pub driver: AzureDriver,
    pub directory: Arc<InMemoryVolumeDirectory>,
    pub disks: Arc<InMemoryDiskService>,
}

impl Harness {
    /// Driver scoped to `sub-1/<resource_group>` over in-memory adapters
    pub async fn new(resource_group: &str) -> Self {
        Self::with_disks(resource_group, InMemoryDiskService::new("sub-1"))
    }

    pub fn with_disks(resource_group: &str, disks: InMemoryDiskService) -> Self {
        let directory = Arc::new(InMemoryVolumeDirectory::new());
        let disks = Arc::new(disks);
        let driver = AzureDriver::new(
            Scope::new("sub-1", resource_group),
            directory.clone(),
            disks.clone(),
            Arc::new(DriverMetrics::new().unwrap()),
        );
        Self {
            driver,
            directory,
            disks,
        }
    }

    /// Bind `claim` to volume `volume` backed by remote disk `disk`
    pub async fn seed_claim(
        &self,
        claim_name: &str,
        namespace: &str,
        volume: &str,
        disk: &str,
        location: &str,
    ) {
        self.directory
            .insert_claim(claim(claim_name, namespace, Some(volume)))
            .await;
        self.directory.insert_volume(azure_volume(volume, disk)).await;
        self.disks
            .insert_disk(
                self.driver.scope().resource_group(),
                RemoteDisk::copy_of(disk, location, "external", BTreeMap::new()),
            )
            .await;
    }
}

pub(crate) fn claim(name: &str, namespace: &str, volume: Option<&str>) -> PersistentVolumeClaim {
    PersistentVolumeClaim {
        metadata: ObjectMeta {
            name: Some(name.into()),
            namespace: Some(namespace.into()),
            ..Default::default()
        },
        spec: Some(PersistentVolumeClaimSpec {
            volume_name: volume.map(String::from),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub(crate) fn azure_volume(name: &str, disk: &str) -> PersistentVolume {
    PersistentVolume {
        metadata: ObjectMeta {
            name: Some(name.into()),
            ..Default::default()
        },
        spec: Some(PersistentVolumeSpec {
            azure_disk: Some(AzureDiskVolumeSource {
                disk_name: disk.into(),
                disk_uri: format!("https://example.invalid/{}", disk),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub(crate) fn backup_job(uid: &str) -> ApplicationBackup {
    let mut backup = ApplicationBackup::new("nightly", ApplicationBackupSpec::default());
    backup.metadata.namespace = Some("apps".into());
    backup.metadata.uid = Some(uid.into());
    backup
}

pub(crate) fn restore_job(uid: &str) -> ApplicationRestore {
    let mut restore = ApplicationRestore::new("nightly-restore", ApplicationRestoreSpec::default());
    restore.metadata.namespace = Some("apps".into());
    restore.metadata.uid = Some(uid.into());
    restore
}
