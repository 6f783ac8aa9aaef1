//! Snapshot Orchestrator
//!
//! Resolves each claim down to its remote disk and triggers a copy
//! snapshot of it in the current scope.

use super::{provenance_tags, AzureDriver, BACKUP_UID_TAG, DRIVER_NAME, SNAPSHOT_NAME_PREFIX};
use crate::crd::{ApplicationBackup, BackupVolumeInfo};
use crate::domain::ports::RemoteSnapshot;
use crate::error::{Error, Result};
use k8s_openapi::api::core::v1::PersistentVolumeClaim;
use kube::ResourceExt;
use tracing::{info, warn};
use uuid::Uuid;

impl AzureDriver {
    /// Snapshot every claim not marked for deletion, aborting on the first failure
    pub(crate) async fn snapshot_claims(
        &self,
        backup: &ApplicationBackup,
        claims: &[PersistentVolumeClaim],
    ) -> Result<Vec<BackupVolumeInfo>> {
        let backup_uid = backup.correlation_uid()?;
        let mut records = Vec::with_capacity(claims.len());

        for claim in claims {
            if claim.metadata.deletion_timestamp.is_some() {
                warn!(
                    "Ignoring PVC {} of backup {} which is being deleted",
                    claim.name_any(),
                    backup.name_any()
                );
                continue;
            }
            records.push(self.snapshot_claim(&backup_uid, claim).await?);
        }

        Ok(records)
    }

    async fn snapshot_claim(
        &self,
        backup_uid: &str,
        claim: &PersistentVolumeClaim,
    ) -> Result<BackupVolumeInfo> {
        let claim_name = claim.name_any();
        let namespace = claim.namespace().unwrap_or_default();

        let volume_name = self.directory.volume_name_for_claim(claim).await?;
        let volume = self.directory.get_volume(&volume_name).await?;
        let disk_name = volume
            .spec
            .as_ref()
            .and_then(|spec| spec.azure_disk.as_ref())
            .map(|source| source.disk_name.clone())
            .filter(|name| !name.is_empty())
            .ok_or_else(|| {
                Error::lookup("Azure disk reference of PersistentVolume", &volume_name)
            })?;

        let resource_group = self.scope.resource_group();
        let disk = self
            .disks
            .get_disk(resource_group, &disk_name)
            .await
            .map_err(|e| {
                self.remote_failure("get_disk", format!("error getting disk {}", disk_name), e)
            })?;

        let snapshot = RemoteSnapshot::copy_of(
            format!("{}{}", SNAPSHOT_NAME_PREFIX, Uuid::new_v4()),
            disk.location.clone(),
            disk.resource_id()?,
            provenance_tags(BACKUP_UID_TAG, backup_uid, &claim_name, &namespace),
        );
        let created = self
            .disks
            .create_or_update_snapshot(resource_group, snapshot)
            .await
            .map_err(|e| {
                self.remote_failure(
                    "create_snapshot",
                    format!(
                        "error triggering backup for volume: {} (PVC: {}, Namespace: {})",
                        disk_name, claim_name, namespace
                    ),
                    e,
                )
            })?;
        self.metrics.snapshots_created.inc();
        info!(
            "Triggered snapshot {} of disk {} for PVC {}/{}",
            created.name, disk_name, namespace, claim_name
        );

        Ok(BackupVolumeInfo {
            persistent_volume_claim: claim_name,
            namespace,
            driver_name: DRIVER_NAME.to_string(),
            volume: volume_name,
            backup_id: created.name,
            options: self.scope_options(),
            ..Default::default()
        })
    }
}
