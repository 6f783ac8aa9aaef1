//! Restore Orchestrator
//!
//! Creates a new disk from each backup snapshot. Snapshots are read from the
//! resource group recorded at backup time, which may differ from the current
//! one; restored disks are always created in the current scope.

use super::{provenance_tags, AzureDriver, DRIVER_NAME, RESTORE_UID_TAG, VOLUME_NAME_PREFIX};
use crate::crd::{ApplicationRestore, BackupVolumeInfo, RestoreVolumeInfo};
use crate::domain::ports::RemoteDisk;
use crate::error::{Error, Result};
use tracing::info;
use uuid::Uuid;

/// Attempts at finding a volume name not already present in the cluster
const NAME_ATTEMPTS: usize = 3;

impl AzureDriver {
    /// Restore every backup record, aborting on the first failure
    pub(crate) async fn restore_volumes(
        &self,
        restore: &ApplicationRestore,
        backups: &[BackupVolumeInfo],
    ) -> Result<Vec<RestoreVolumeInfo>> {
        let restore_uid = restore.correlation_uid()?;
        let mut records = Vec::with_capacity(backups.len());

        for backup in backups {
            records.push(self.restore_volume(&restore_uid, backup).await?);
        }

        Ok(records)
    }

    async fn restore_volume(
        &self,
        restore_uid: &str,
        backup: &BackupVolumeInfo,
    ) -> Result<RestoreVolumeInfo> {
        let source_group = self.recorded_resource_group(&backup.options, &backup.backup_id);
        let snapshot = self
            .disks
            .get_snapshot(&source_group, &backup.backup_id)
            .await
            .map_err(|e| {
                self.remote_failure(
                    "get_snapshot",
                    format!(
                        "error getting snapshot {} in resource group {}",
                        backup.backup_id, source_group
                    ),
                    e,
                )
            })?;

        let volume_name = self.fresh_volume_name().await?;
        let disk = RemoteDisk::copy_of(
            volume_name.clone(),
            snapshot.location.clone(),
            snapshot.resource_id()?,
            provenance_tags(
                RESTORE_UID_TAG,
                restore_uid,
                &backup.persistent_volume_claim,
                &backup.namespace,
            ),
        );

        self.disks
            .create_or_update_disk(self.scope.resource_group(), disk)
            .await
            .map_err(|e| {
                self.remote_failure(
                    "create_disk",
                    format!("error triggering restore for volume: {}", backup.volume),
                    e,
                )
            })?;
        self.metrics.disks_restored.inc();
        info!(
            "Triggered restore of snapshot {}/{} into disk {}/{}",
            source_group,
            backup.backup_id,
            self.scope.resource_group(),
            volume_name
        );

        Ok(RestoreVolumeInfo {
            persistent_volume_claim: backup.persistent_volume_claim.clone(),
            source_namespace: backup.namespace.clone(),
            source_volume: backup.volume.clone(),
            restore_volume: volume_name,
            driver_name: DRIVER_NAME.to_string(),
            options: self.scope_options(),
            ..Default::default()
        })
    }

    /// A `pvc-<uuid>` name with no existing volume behind it
    async fn fresh_volume_name(&self) -> Result<String> {
        for _ in 0..NAME_ATTEMPTS {
            let candidate = format!("{}{}", VOLUME_NAME_PREFIX, Uuid::new_v4());
            match self.directory.get_volume(&candidate).await {
                Err(Error::Lookup { .. }) => return Ok(candidate),
                Err(e) => return Err(e),
                Ok(_) => continue,
            }
        }
        Err(Error::Internal(format!(
            "no unused volume name found after {} attempts",
            NAME_ATTEMPTS
        )))
    }
}

#[cfg(test)]
mod tests {
    use crate::crd::{BackupVolumeInfo, VolumeStatus};
    use crate::domain::ports::{DiskService, RemoteDisk, RemoteSnapshot};
    use crate::driver::test_support::*;
    use crate::driver::VolumeDriver;
    use crate::error::Error;
    use assert_matches::assert_matches;
    use std::collections::BTreeMap;

    fn backup_record(backup_id: &str, resource_group: Option<&str>) -> BackupVolumeInfo {
        BackupVolumeInfo {
            persistent_volume_claim: "pvc-a".into(),
            namespace: "apps".into(),
            driver_name: "azure".into(),
            volume: "vol-1".into(),
            backup_id: backup_id.into(),
            options: resource_group
                .map(|rg| BTreeMap::from([("resourceGroupName".to_string(), rg.to_string())]))
                .unwrap_or_default(),
            status: VolumeStatus::Successful,
            reason: String::new(),
        }
    }

    async fn seed_snapshot(h: &Harness, resource_group: &str, name: &str, location: &str) {
        h.disks
            .create_or_update_snapshot(
                resource_group,
                RemoteSnapshot::copy_of(name, location, "disk-id", BTreeMap::new()),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_cross_scope_restore() {
        let h = Harness::new("rg-A").await;
        seed_snapshot(&h, "rg-B", "stork-snapshot-1", "westeurope").await;

        let records = h
            .driver
            .start_restore(
                &restore_job("r-uid"),
                &[backup_record("stork-snapshot-1", Some("rg-B"))],
            )
            .await
            .unwrap();

        let record = &records[0];
        assert!(record.restore_volume.starts_with("pvc-"));
        assert_eq!(record.options["resourceGroupName"], "rg-A");
        assert_eq!(record.persistent_volume_claim, "pvc-a");

        // Disk lands in the current group, copied from the rg-B snapshot
        let disk: RemoteDisk = h.disks.disk("rg-A", &record.restore_volume).await.unwrap();
        assert_eq!(disk.location, "westeurope");
        assert_eq!(
            disk.properties.creation_data.source_resource_id.as_deref(),
            Some("/subscriptions/sub-1/resourceGroups/rg-B/providers/Microsoft.Compute/snapshots/stork-snapshot-1")
        );
        assert_eq!(disk.tags["restore-uid"], "r-uid");
        assert_eq!(disk.tags["source-pvc-namespace"], "apps");
        assert!(h.disks.disk("rg-B", &record.restore_volume).await.is_none());
    }

    #[tokio::test]
    async fn test_missing_resource_group_uses_current() {
        let h = Harness::new("rg-A").await;
        seed_snapshot(&h, "rg-A", "stork-snapshot-2", "eastus").await;

        let records = h
            .driver
            .start_restore(&restore_job("r-uid"), &[backup_record("stork-snapshot-2", None)])
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(h.driver.metrics().disks_restored.get(), 1);
    }

    #[tokio::test]
    async fn test_fail_fast_on_missing_snapshot() {
        let h = Harness::new("rg-A").await;
        seed_snapshot(&h, "rg-A", "stork-snapshot-1", "eastus").await;
        seed_snapshot(&h, "rg-A", "stork-snapshot-3", "eastus").await;

        let err = h
            .driver
            .start_restore(
                &restore_job("r-uid"),
                &[
                    backup_record("stork-snapshot-1", Some("rg-A")),
                    backup_record("stork-snapshot-2", Some("rg-A")),
                    backup_record("stork-snapshot-3", Some("rg-A")),
                ],
            )
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(h.driver.metrics().disks_restored.get(), 1);
    }

    #[tokio::test]
    async fn test_snapshot_failure_carries_context() {
        let h = Harness::new("rg-A").await;
        seed_snapshot(&h, "rg-A", "stork-snapshot-1", "eastus").await;
        h.disks.fail_with("stork-snapshot-1", 409).await;

        let err = h
            .driver
            .start_restore(
                &restore_job("r-uid"),
                &[backup_record("stork-snapshot-1", Some("rg-A"))],
            )
            .await
            .unwrap_err();
        assert_matches!(
            err,
            Error::RemoteService { status: 409, message } if message.contains("rg-A")
        );
        assert_eq!(
            h.driver
                .metrics()
                .remote_errors
                .with_label_values(&["get_snapshot"])
                .get(),
            1
        );
    }
}
