//! Extended Capabilities
//!
//! The part of the host-facing driver surface the Azure backend does not
//! offer. Every method has a default body returning
//! [`Error::NotSupported`], so a driver only overrides what it implements.

use super::AzureDriver;
use crate::error::{Error, Result};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, PodSpec};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Volume as reported by a driver that can inspect its volumes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeInfo {
    pub volume_id: String,
    pub volume_name: String,
    pub size_bytes: u64,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

/// Storage node as reported by a clustered driver
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeInfo {
    pub storage_id: String,
    pub scheduler_id: String,
    pub hostname: String,
    #[serde(default)]
    pub ips: Vec<String>,
}

/// Driver-specific snapshot plugin for in-cluster volume snapshots
pub trait SnapshotPlugin: Send + Sync {
    fn name(&self) -> &str;
}

#[async_trait]
pub trait ExtendedCapabilities: Send + Sync {
    // =========================================================================
    // Volume Inspection
    // =========================================================================

    async fn inspect_volume(&self, _volume_id: &str) -> Result<VolumeInfo> {
        Err(Error::not_supported("inspect_volume"))
    }

    async fn get_cluster_id(&self) -> Result<String> {
        Err(Error::not_supported("get_cluster_id"))
    }

    async fn get_nodes(&self) -> Result<Vec<NodeInfo>> {
        Err(Error::not_supported("get_nodes"))
    }

    async fn get_pod_volumes(&self, _pod: &PodSpec, _namespace: &str) -> Result<Vec<VolumeInfo>> {
        Err(Error::not_supported("get_pod_volumes"))
    }

    // =========================================================================
    // Snapshots
    // =========================================================================

    fn get_snapshot_plugin(&self) -> Result<Arc<dyn SnapshotPlugin>> {
        Err(Error::not_supported("get_snapshot_plugin"))
    }

    async fn get_snapshot_type(&self, _snapshot_name: &str) -> Result<String> {
        Err(Error::not_supported("get_snapshot_type"))
    }

    async fn get_volume_claim_templates(
        &self,
        _claims: &[PersistentVolumeClaim],
    ) -> Result<Vec<PersistentVolumeClaim>> {
        Err(Error::not_supported("get_volume_claim_templates"))
    }

    async fn create_group_snapshot(&self, _group_name: &str) -> Result<String> {
        Err(Error::not_supported("create_group_snapshot"))
    }

    async fn get_group_snapshot_status(&self, _group_name: &str) -> Result<String> {
        Err(Error::not_supported("get_group_snapshot_status"))
    }

    async fn delete_group_snapshot(&self, _group_name: &str) -> Result<()> {
        Err(Error::not_supported("delete_group_snapshot"))
    }

    async fn start_volume_snapshot_restore(&self, _restore_name: &str) -> Result<()> {
        Err(Error::not_supported("start_volume_snapshot_restore"))
    }

    async fn get_volume_snapshot_restore_status(&self, _restore_name: &str) -> Result<String> {
        Err(Error::not_supported("get_volume_snapshot_restore_status"))
    }

    async fn complete_volume_snapshot_restore(&self, _restore_name: &str) -> Result<()> {
        Err(Error::not_supported("complete_volume_snapshot_restore"))
    }

    // =========================================================================
    // Cluster Pairing & Migration
    // =========================================================================

    async fn create_pair(&self, _remote_cluster: &str) -> Result<String> {
        Err(Error::not_supported("create_pair"))
    }

    async fn delete_pair(&self, _pair_id: &str) -> Result<()> {
        Err(Error::not_supported("delete_pair"))
    }

    async fn start_migration(&self, _migration_name: &str) -> Result<()> {
        Err(Error::not_supported("start_migration"))
    }

    async fn get_migration_status(&self, _migration_name: &str) -> Result<String> {
        Err(Error::not_supported("get_migration_status"))
    }

    async fn cancel_migration(&self, _migration_name: &str) -> Result<()> {
        Err(Error::not_supported("cancel_migration"))
    }

    // =========================================================================
    // Cluster Domains & Clones
    // =========================================================================

    async fn get_cluster_domains(&self) -> Result<Vec<String>> {
        Err(Error::not_supported("get_cluster_domains"))
    }

    async fn activate_cluster_domain(&self, _domain: &str) -> Result<()> {
        Err(Error::not_supported("activate_cluster_domain"))
    }

    async fn deactivate_cluster_domain(&self, _domain: &str) -> Result<()> {
        Err(Error::not_supported("deactivate_cluster_domain"))
    }

    async fn create_volume_clones(&self, _clone_name: &str) -> Result<()> {
        Err(Error::not_supported("create_volume_clones"))
    }
}

impl ExtendedCapabilities for AzureDriver {}
