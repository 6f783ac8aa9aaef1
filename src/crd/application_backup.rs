//! ApplicationBackup CRD
//!
//! The host's backup job. The driver reads the job's UID as the correlation
//! id stamped on every snapshot and reports one [`BackupVolumeInfo`] per
//! claim in the job's status.

use super::VolumeStatus;
use crate::error::{Error, Result};
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// =============================================================================
// ApplicationBackup CRD
// =============================================================================

/// ApplicationBackup captures the volumes of one or more namespaces.
#[derive(CustomResource, Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "stork.libopenstorage.org",
    version = "v1alpha1",
    kind = "ApplicationBackup",
    plural = "applicationbackups",
    shortname = "applicationbackup",
    status = "ApplicationBackupStatus",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationBackupSpec {
    /// Namespaces included in the backup
    #[serde(default)]
    pub namespaces: Vec<String>,

    /// Name of the backup location object
    #[serde(default)]
    pub backup_location: String,

    /// Label selectors for the resources to back up
    #[serde(default)]
    pub selectors: BTreeMap<String, String>,
}

/// Status of an ApplicationBackup
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationBackupStatus {
    /// Per-volume backup records
    #[serde(default)]
    pub volumes: Vec<BackupVolumeInfo>,
}

/// Backup record for one claim
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BackupVolumeInfo {
    pub persistent_volume_claim: String,
    pub namespace: String,
    pub driver_name: String,
    /// Volume the claim was bound to
    pub volume: String,
    /// Remote snapshot name, never changes once assigned
    #[serde(rename = "backupID")]
    pub backup_id: String,
    /// Driver specific options, including the originating resource group
    #[serde(default)]
    pub options: BTreeMap<String, String>,
    #[serde(default)]
    pub status: VolumeStatus,
    #[serde(default)]
    pub reason: String,
}

impl ApplicationBackup {
    /// UID correlating remote snapshots with this job
    pub fn correlation_uid(&self) -> Result<String> {
        self.uid().ok_or_else(|| {
            Error::Validation(format!("ApplicationBackup {} has no UID", self.name_any()))
        })
    }

    /// Backup records currently held in status
    pub fn volumes(&self) -> &[BackupVolumeInfo] {
        self.status
            .as_ref()
            .map(|s| s.volumes.as_slice())
            .unwrap_or_default()
    }
}
