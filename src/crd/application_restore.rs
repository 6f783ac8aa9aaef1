//! ApplicationRestore CRD
//!
//! The host's restore job, consuming the records of a completed
//! ApplicationBackup.

use super::VolumeStatus;
use crate::error::{Error, Result};
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// ApplicationRestore materializes new volumes from a backup.
#[derive(CustomResource, Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "stork.libopenstorage.org",
    version = "v1alpha1",
    kind = "ApplicationRestore",
    plural = "applicationrestores",
    shortname = "apprestore",
    status = "ApplicationRestoreStatus",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationRestoreSpec {
    /// Name of the ApplicationBackup to restore from
    #[serde(default)]
    pub backup_name: String,

    /// Source namespace to destination namespace mapping
    #[serde(default)]
    pub namespace_mapping: BTreeMap<String, String>,
}

/// Status of an ApplicationRestore
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationRestoreStatus {
    #[serde(default)]
    pub volumes: Vec<RestoreVolumeInfo>,
}

/// Restore record for one volume
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RestoreVolumeInfo {
    pub persistent_volume_claim: String,
    pub source_namespace: String,
    pub source_volume: String,
    /// Freshly generated volume name, never reused
    pub restore_volume: String,
    pub driver_name: String,
    /// Driver specific options, including the resource group of the new disk
    #[serde(default)]
    pub options: BTreeMap<String, String>,
    #[serde(default)]
    pub status: VolumeStatus,
    #[serde(default)]
    pub reason: String,
}

impl ApplicationRestore {
    /// UID correlating restored disks with this job
    pub fn correlation_uid(&self) -> Result<String> {
        self.uid().ok_or_else(|| {
            Error::Validation(format!("ApplicationRestore {} has no UID", self.name_any()))
        })
    }

    pub fn volumes(&self) -> &[RestoreVolumeInfo] {
        self.status
            .as_ref()
            .map(|s| s.volumes.as_slice())
            .unwrap_or_default()
    }
}
