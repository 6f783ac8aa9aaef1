//! Cleanup Manager
//!
//! Deletes the snapshots a backup created. A snapshot that is already gone
//! counts as deleted. Other failures do not stop the pass: every snapshot is
//! attempted and the failures are reported together.

use super::{AzureDriver, DRIVER_NAME};
use crate::crd::BackupVolumeInfo;
use crate::error::{Error, Result};
use tracing::{debug, info, warn};

impl AzureDriver {
    pub(crate) async fn delete_snapshots(&self, volumes: &[BackupVolumeInfo]) -> Result<()> {
        let mut failures = Vec::new();

        for record in volumes {
            if record.driver_name != DRIVER_NAME || record.backup_id.is_empty() {
                continue;
            }

            let resource_group = self.recorded_resource_group(&record.options, &record.backup_id);
            match self
                .disks
                .delete_snapshot(&resource_group, &record.backup_id)
                .await
            {
                Ok(()) => {
                    self.metrics.snapshots_deleted.inc();
                    info!("Deleted snapshot {}/{}", resource_group, record.backup_id);
                }
                Err(e) if e.is_not_found() => {
                    debug!(
                        "Snapshot {}/{} already deleted",
                        resource_group, record.backup_id
                    );
                }
                Err(e) => {
                    self.metrics.remote_error("delete_snapshot");
                    warn!(
                        "Failed to delete snapshot {}/{}: {}",
                        resource_group, record.backup_id, e
                    );
                    failures.push(format!("{}/{}: {}", resource_group, record.backup_id, e));
                }
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::CleanupFailed { failures })
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::crd::{ApplicationBackupStatus, BackupVolumeInfo};
    use crate::driver::test_support::*;
    use crate::driver::VolumeDriver;
    use crate::error::Error;
    use assert_matches::assert_matches;

    async fn backed_up(h: &Harness, claims: &[(&str, &str, &str)]) -> Vec<BackupVolumeInfo> {
        let mut pvcs = Vec::new();
        for (name, volume, disk) in claims {
            h.seed_claim(name, "apps", volume, disk, "eastus").await;
            pvcs.push(claim(name, "apps", Some(*volume)));
        }
        h.driver
            .start_backup(&backup_job("uid"), &pvcs)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_failures_are_aggregated() {
        let h = Harness::new("rg-A").await;
        let records = backed_up(
            &h,
            &[
                ("pvc-a", "vol-1", "disk-1"),
                ("pvc-b", "vol-2", "disk-2"),
                ("pvc-c", "vol-3", "disk-3"),
            ],
        )
        .await;
        h.disks.fail_with(&records[1].backup_id, 500).await;

        let mut backup = backup_job("uid");
        backup.status = Some(ApplicationBackupStatus {
            volumes: records.clone(),
        });
        let err = h.driver.delete_backup(&backup).await.unwrap_err();

        assert_matches!(err, Error::CleanupFailed { ref failures } if failures.len() == 1
            && failures[0].contains(&records[1].backup_id));
        // The snapshots around the failing one were still removed
        assert_eq!(
            h.disks.snapshot_names("rg-A").await,
            vec![records[1].backup_id.clone()]
        );
        assert_eq!(h.driver.metrics().snapshots_deleted.get(), 2);
    }

    #[tokio::test]
    async fn test_foreign_and_empty_records_are_ignored() {
        let h = Harness::new("rg-A").await;
        h.disks.fail_with("ebs-snap", 500).await;

        let volumes = vec![
            BackupVolumeInfo {
                driver_name: "aws".into(),
                backup_id: "ebs-snap".into(),
                ..Default::default()
            },
            BackupVolumeInfo {
                driver_name: "azure".into(),
                ..Default::default()
            },
        ];
        h.driver.delete_snapshots(&volumes).await.unwrap();
        assert_eq!(h.driver.metrics().snapshots_deleted.get(), 0);
    }

    #[tokio::test]
    async fn test_deletes_in_recorded_group() {
        let h = Harness::new("rg-A").await;
        let mut records = backed_up(&h, &[("pvc-a", "vol-1", "disk-1")]).await;

        // Pointing the record elsewhere leaves the rg-A snapshot alone
        records[0]
            .options
            .insert("resourceGroupName".into(), "rg-B".into());
        h.driver.delete_snapshots(&records).await.unwrap();
        assert_eq!(h.disks.snapshot_names("rg-A").await.len(), 1);
    }
}
