//! Status Poller
//!
//! Translates remote provisioning states into record statuses. Each call is
//! one point-in-time check; records already in a terminal state are never
//! re-polled, so a status cannot regress between calls.

use super::{AzureDriver, DRIVER_NAME};
use crate::crd::{BackupVolumeInfo, RestoreVolumeInfo, VolumeStatus};
use crate::error::Result;
use tracing::debug;

/// Map a provisioning state to a status and human readable reason
fn translate(state: &str, noun: &str) -> (VolumeStatus, String) {
    match state {
        "Failed" => (
            VolumeStatus::Failed,
            format!("{} failed for volume: {}", capitalize(noun), state),
        ),
        "Succeeded" => (
            VolumeStatus::Successful,
            format!("{} successful for volume", capitalize(noun)),
        ),
        _ => (
            VolumeStatus::InProgress,
            format!("Volume {} in progress: {}", noun, state),
        ),
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

impl AzureDriver {
    pub(crate) async fn poll_backup_volumes(
        &self,
        volumes: &[BackupVolumeInfo],
    ) -> Result<Vec<BackupVolumeInfo>> {
        let mut polled = Vec::with_capacity(volumes.len());

        for record in volumes {
            let mut record = record.clone();
            if record.driver_name != DRIVER_NAME || record.status.is_terminal() {
                polled.push(record);
                continue;
            }

            let resource_group = self.recorded_resource_group(&record.options, &record.backup_id);
            let snapshot = self
                .disks
                .get_snapshot(&resource_group, &record.backup_id)
                .await
                .map_err(|e| {
                    self.remote_failure(
                        "get_snapshot",
                        format!("error getting snapshot {}", record.backup_id),
                        e,
                    )
                })?;

            let (status, reason) = translate(snapshot.provisioning_state(), "backup");
            debug!(
                "Snapshot {} of {} is {}",
                record.backup_id, record.persistent_volume_claim, status
            );
            record.status = status;
            record.reason = reason;
            polled.push(record);
        }

        Ok(polled)
    }

    pub(crate) async fn poll_restore_volumes(
        &self,
        volumes: &[RestoreVolumeInfo],
    ) -> Result<Vec<RestoreVolumeInfo>> {
        let mut polled = Vec::with_capacity(volumes.len());

        for record in volumes {
            let mut record = record.clone();
            if record.driver_name != DRIVER_NAME || record.status.is_terminal() {
                polled.push(record);
                continue;
            }

            let resource_group =
                self.recorded_resource_group(&record.options, &record.restore_volume);
            let disk = self
                .disks
                .get_disk(&resource_group, &record.restore_volume)
                .await
                .map_err(|e| {
                    self.remote_failure(
                        "get_disk",
                        format!("error getting disk {}", record.restore_volume),
                        e,
                    )
                })?;

            let (status, reason) = translate(disk.provisioning_state(), "restore");
            debug!("Disk {} is {}", record.restore_volume, status);
            record.status = status;
            record.reason = reason;
            polled.push(record);
        }

        Ok(polled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controlplane::backends::InMemoryDiskService;
    use crate::crd::ApplicationBackupStatus;
    use crate::domain::ports::RemoteDisk;
    use crate::driver::test_support::*;
    use crate::driver::VolumeDriver;
    use crate::error::Error;
    use assert_matches::assert_matches;
    use std::collections::BTreeMap;

    #[test]
    fn test_translate() {
        assert_eq!(
            translate("Failed", "backup"),
            (VolumeStatus::Failed, "Backup failed for volume: Failed".into())
        );
        assert_eq!(
            translate("Succeeded", "restore"),
            (VolumeStatus::Successful, "Restore successful for volume".into())
        );
        assert_eq!(
            translate("Creating", "backup"),
            (VolumeStatus::InProgress, "Volume backup in progress: Creating".into())
        );
        assert_eq!(translate("Unknown", "restore").0, VolumeStatus::InProgress);
    }

    async fn started_backup(h: &Harness) -> Vec<BackupVolumeInfo> {
        h.seed_claim("pvc-a", "apps", "vol-1", "disk-1", "eastus").await;
        h.driver
            .start_backup(&backup_job("uid"), &[claim("pvc-a", "apps", Some("vol-1"))])
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_in_progress_then_terminal() {
        let h = Harness::with_disks(
            "rg-A",
            InMemoryDiskService::new("sub-1").with_initial_state("Creating"),
        );
        let records = started_backup(&h).await;
        let snapshot = records[0].backup_id.clone();

        let polled = h.driver.poll_backup_volumes(&records).await.unwrap();
        assert_eq!(polled[0].status, VolumeStatus::InProgress);
        assert_eq!(polled[0].reason, "Volume backup in progress: Creating");

        h.disks.set_snapshot_state("rg-A", &snapshot, "Failed").await;
        let polled = h.driver.poll_backup_volumes(&polled).await.unwrap();
        assert_eq!(polled[0].status, VolumeStatus::Failed);

        // A terminal record is not re-polled even if the remote state moves
        h.disks.set_snapshot_state("rg-A", &snapshot, "Succeeded").await;
        let again = h.driver.poll_backup_volumes(&polled).await.unwrap();
        assert_eq!(again, polled);
    }

    #[tokio::test]
    async fn test_other_drivers_pass_through() {
        let h = Harness::new("rg-A").await;
        let foreign = BackupVolumeInfo {
            persistent_volume_claim: "pvc-z".into(),
            driver_name: "aws".into(),
            backup_id: "snap-123".into(),
            ..Default::default()
        };
        let mut backup = backup_job("uid");
        backup.status = Some(ApplicationBackupStatus {
            volumes: vec![foreign.clone()],
        });

        let polled = h.driver.get_backup_status(&backup).await.unwrap();
        assert_eq!(polled, vec![foreign]);
    }

    #[tokio::test]
    async fn test_missing_options_fall_back_to_current_group() {
        let h = Harness::new("rg-A").await;
        let mut records = started_backup(&h).await;
        records[0].options = BTreeMap::new();

        let polled = h.driver.poll_backup_volumes(&records).await.unwrap();
        assert_eq!(polled[0].status, VolumeStatus::Successful);
    }

    #[tokio::test]
    async fn test_missing_snapshot_is_an_error() {
        let h = Harness::new("rg-A").await;
        let mut records = started_backup(&h).await;
        records[0].options =
            BTreeMap::from([("resourceGroupName".to_string(), "rg-B".to_string())]);

        let err = h.driver.poll_backup_volumes(&records).await.unwrap_err();
        assert!(err.is_not_found());
        assert_matches!(
            err,
            Error::RemoteService { message, .. } if message.starts_with("error getting snapshot")
        );
    }

    #[tokio::test]
    async fn test_restore_in_progress() {
        let h = Harness::with_disks(
            "rg-A",
            InMemoryDiskService::new("sub-1").with_initial_state("Updating"),
        );
        let records = started_backup(&h).await;
        let restored = h
            .driver
            .start_restore(&restore_job("r-uid"), &records)
            .await
            .unwrap();

        let polled = h.driver.poll_restore_volumes(&restored).await.unwrap();
        assert_eq!(polled[0].status, VolumeStatus::InProgress);
        assert_eq!(polled[0].reason, "Volume restore in progress: Updating");

        h.disks
            .set_disk_state("rg-A", &restored[0].restore_volume, "Failed")
            .await;
        let polled = h.driver.poll_restore_volumes(&polled).await.unwrap();
        assert_eq!(polled[0].status, VolumeStatus::Failed);
        assert_eq!(polled[0].reason, "Restore failed for volume: Failed");
    }

    #[tokio::test]
    async fn test_restore_reads_recorded_group() {
        let h = Harness::new("rg-A").await;
        let mut recorded = RemoteDisk::copy_of("pvc-1", "eastus", "src", BTreeMap::new());
        recorded.properties.provisioning_state = Some("Succeeded".into());
        h.disks.insert_disk("rg-B", recorded).await;
        let mut current = RemoteDisk::copy_of("pvc-1", "eastus", "src", BTreeMap::new());
        current.properties.provisioning_state = Some("Failed".into());
        h.disks.insert_disk("rg-A", current).await;

        let record = RestoreVolumeInfo {
            persistent_volume_claim: "pvc-a".into(),
            source_namespace: "apps".into(),
            source_volume: "vol-1".into(),
            restore_volume: "pvc-1".into(),
            driver_name: DRIVER_NAME.into(),
            options: BTreeMap::from([("resourceGroupName".to_string(), "rg-B".to_string())]),
            ..Default::default()
        };

        let polled = h.driver.poll_restore_volumes(&[record]).await.unwrap();
        assert_eq!(polled[0].status, VolumeStatus::Successful);
    }
}
