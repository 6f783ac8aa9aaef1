//! Azure Disk Volume Driver
//!
//! Drives the snapshot lifecycle of Azure managed disks on behalf of the
//! host's backup and restore jobs:
//!
//! ```text
//!  claim ──► volume name ──► volume ──► disk reference ──► remote disk
//!                                                              │
//!        start_backup: snapshot ◄──────────────────────────────┘
//!        get_backup_status: poll snapshot provisioning state
//!        start_restore: snapshot ──► new disk (pvc-<uuid>)
//!        get_restore_status: poll disk provisioning state
//!        delete_backup / cancel_backup: delete snapshot (404 is success)
//! ```
//!
//! Every operation is a single pass of sequential remote calls. Completion
//! of remote work is observed by the host calling the status operations at
//! its own cadence; nothing here waits.

pub mod backup;
pub mod cleanup;
pub mod identity;
pub mod migration;
pub mod ownership;
pub mod restore;
pub mod status;
pub mod unsupported;

#[cfg(test)]
pub(crate) mod test_support;

pub use identity::{IdentityResolver, MetadataConfig};
pub use ownership::{CsiProvisionerPredicate, OwnershipClassifier};
pub use unsupported::{ExtendedCapabilities, NodeInfo, SnapshotPlugin, VolumeInfo};

use crate::controlplane::backends::{BackendConfig, BackendFactory};
use crate::crd::{ApplicationBackup, ApplicationRestore, BackupVolumeInfo, RestoreVolumeInfo};
use crate::domain::ports::{DiskServiceRef, Scope, VolumeDirectoryRef};
use crate::error::{Error, Result};
use crate::metrics::DriverMetrics;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{PersistentVolume, PersistentVolumeClaim};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

// =============================================================================
// Constants
// =============================================================================

/// Name this driver registers under and stamps on its records
pub const DRIVER_NAME: &str = "azure";
/// Provisioner of in-tree Azure disks
pub const PROVISIONER_NAME: &str = "kubernetes.io/azure-disk";
/// Claim annotation carrying the provisioner name
pub const PVC_PROVISIONER_ANNOTATION: &str = "volume.beta.kubernetes.io/storage-provisioner";
/// Legacy claim annotation carrying the storage class name
pub const PVC_STORAGE_CLASS_ANNOTATION: &str = "volume.beta.kubernetes.io/storage-class";
/// Volume annotation carrying the provisioner name
pub const PV_PROVISIONED_BY_ANNOTATION: &str = "pv.kubernetes.io/provisioned-by";

pub const SNAPSHOT_NAME_PREFIX: &str = "stork-snapshot-";
pub const VOLUME_NAME_PREFIX: &str = "pvc-";

/// Record option holding the resource group a remote resource lives in
pub const RESOURCE_GROUP_KEY: &str = "resourceGroupName";
pub const SUBSCRIPTION_ID_KEY: &str = "subscriptionId";

pub const CREATED_BY_TAG: &str = "created-by";
pub const CREATOR: &str = "stork";
pub const BACKUP_UID_TAG: &str = "backup-uid";
pub const RESTORE_UID_TAG: &str = "restore-uid";
pub const SOURCE_PVC_NAME_TAG: &str = "source-pvc-name";
pub const SOURCE_PVC_NAMESPACE_TAG: &str = "source-pvc-namespace";

// =============================================================================
// Volume Driver Port
// =============================================================================

/// Host-facing contract of a volume driver.
///
/// Capabilities this backend does not offer live in [`ExtendedCapabilities`].
#[async_trait]
pub trait VolumeDriver: ExtendedCapabilities + Send + Sync {
    /// Registered driver name
    fn name(&self) -> &str;

    async fn owns_claim(&self, claim: &PersistentVolumeClaim) -> bool;

    fn owns_volume(&self, volume: &PersistentVolume) -> bool;

    /// Snapshot every claim of the job, returning one record per claim
    async fn start_backup(
        &self,
        backup: &ApplicationBackup,
        claims: &[PersistentVolumeClaim],
    ) -> Result<Vec<BackupVolumeInfo>>;

    /// Point-in-time status of the job's backup records
    async fn get_backup_status(&self, backup: &ApplicationBackup) -> Result<Vec<BackupVolumeInfo>>;

    /// Cancelling a backup deletes whatever it created
    async fn cancel_backup(&self, backup: &ApplicationBackup) -> Result<()> {
        self.delete_backup(backup).await
    }

    /// Idempotent removal of the job's snapshots
    async fn delete_backup(&self, backup: &ApplicationBackup) -> Result<()>;

    async fn start_restore(
        &self,
        restore: &ApplicationRestore,
        backups: &[BackupVolumeInfo],
    ) -> Result<Vec<RestoreVolumeInfo>>;

    async fn get_restore_status(
        &self,
        restore: &ApplicationRestore,
    ) -> Result<Vec<RestoreVolumeInfo>>;

    async fn cancel_restore(&self, restore: &ApplicationRestore) -> Result<()>;

    /// Point a migrated volume at the disk matching its new name
    async fn update_migrated_volume_spec(&self, volume: PersistentVolume)
        -> Result<PersistentVolume>;

    async fn stop(&self) -> Result<()>;
}

pub type VolumeDriverRef = Arc<dyn VolumeDriver>;

// =============================================================================
// Configuration
// =============================================================================

/// Everything needed to initialize the driver against real services
#[derive(Debug, Clone)]
pub struct DriverConfig {
    pub metadata: MetadataConfig,
    pub backend: BackendConfig,
}

// =============================================================================
// Azure Driver
// =============================================================================

pub struct AzureDriver {
    scope: Scope,
    directory: VolumeDirectoryRef,
    disks: DiskServiceRef,
    classifier: OwnershipClassifier,
    metrics: Arc<DriverMetrics>,
}

impl AzureDriver {
    /// Assemble a driver from an already resolved scope
    pub fn new(
        scope: Scope,
        directory: VolumeDirectoryRef,
        disks: DiskServiceRef,
        metrics: Arc<DriverMetrics>,
    ) -> Self {
        let classifier = OwnershipClassifier::new(directory.clone());
        Self {
            scope,
            directory,
            disks,
            classifier,
            metrics,
        }
    }

    /// Resolve the scope from instance metadata and connect the disk service
    pub async fn init(config: &DriverConfig, directory: VolumeDirectoryRef) -> Result<Self> {
        let scope = IdentityResolver::new(config.metadata.clone())
            .resolve()
            .await?;
        info!("Azure driver scope resolved: {}", scope);

        let disks = BackendFactory::create(&config.backend, scope.subscription_id())?;
        let metrics = Arc::new(DriverMetrics::new()?);
        Ok(Self::new(scope, directory, disks, metrics))
    }

    /// Replace the CSI provisioner test used for ownership
    pub fn with_csi_predicate(mut self, predicate: CsiProvisionerPredicate) -> Self {
        self.classifier = self.classifier.with_csi_predicate(predicate);
        self
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn metrics(&self) -> &Arc<DriverMetrics> {
        &self.metrics
    }

    /// Resource group recorded in a record's options, or the current one
    fn recorded_resource_group(&self, options: &BTreeMap<String, String>, id: &str) -> String {
        match options.get(RESOURCE_GROUP_KEY) {
            Some(group) if !group.is_empty() => group.clone(),
            _ => {
                warn!(
                    "Missing resource group for {}, will use current resource group {}",
                    id,
                    self.scope.resource_group()
                );
                self.scope.resource_group().to_string()
            }
        }
    }

    /// Options stamped on records created in the current scope
    fn scope_options(&self) -> BTreeMap<String, String> {
        BTreeMap::from([(
            RESOURCE_GROUP_KEY.to_string(),
            self.scope.resource_group().to_string(),
        )])
    }

    /// Count a failed remote call and prefix its message with `context`
    fn remote_failure(&self, operation: &str, context: String, err: Error) -> Error {
        self.metrics.remote_error(operation);
        match err {
            Error::RemoteService { status, message } => Error::RemoteService {
                status,
                message: format!("{}: {}", context, message),
            },
            other => other,
        }
    }
}

/// Provenance tags stamped on every remote resource the driver creates
fn provenance_tags(
    uid_tag: &str,
    uid: &str,
    claim_name: &str,
    claim_namespace: &str,
) -> BTreeMap<String, String> {
    BTreeMap::from([
        (CREATED_BY_TAG.to_string(), CREATOR.to_string()),
        (uid_tag.to_string(), uid.to_string()),
        (SOURCE_PVC_NAME_TAG.to_string(), claim_name.to_string()),
        (SOURCE_PVC_NAMESPACE_TAG.to_string(), claim_namespace.to_string()),
    ])
}

#[async_trait]
impl VolumeDriver for AzureDriver {
    fn name(&self) -> &str {
        DRIVER_NAME
    }

    async fn owns_claim(&self, claim: &PersistentVolumeClaim) -> bool {
        self.classifier.owns_claim(claim).await
    }

    fn owns_volume(&self, volume: &PersistentVolume) -> bool {
        self.classifier.owns_volume(volume)
    }

    async fn start_backup(
        &self,
        backup: &ApplicationBackup,
        claims: &[PersistentVolumeClaim],
    ) -> Result<Vec<BackupVolumeInfo>> {
        self.snapshot_claims(backup, claims).await
    }

    async fn get_backup_status(&self, backup: &ApplicationBackup) -> Result<Vec<BackupVolumeInfo>> {
        self.poll_backup_volumes(backup.volumes()).await
    }

    async fn delete_backup(&self, backup: &ApplicationBackup) -> Result<()> {
        self.delete_snapshots(backup.volumes()).await
    }

    async fn start_restore(
        &self,
        restore: &ApplicationRestore,
        backups: &[BackupVolumeInfo],
    ) -> Result<Vec<RestoreVolumeInfo>> {
        self.restore_volumes(restore, backups).await
    }

    async fn get_restore_status(
        &self,
        restore: &ApplicationRestore,
    ) -> Result<Vec<RestoreVolumeInfo>> {
        self.poll_restore_volumes(restore.volumes()).await
    }

    async fn cancel_restore(&self, _restore: &ApplicationRestore) -> Result<()> {
        // Restored disks are left for the host to garbage collect
        Ok(())
    }

    async fn update_migrated_volume_spec(
        &self,
        volume: PersistentVolume,
    ) -> Result<PersistentVolume> {
        self.adopt_migrated_volume(volume).await
    }

    async fn stop(&self) -> Result<()> {
        Ok(())
    }
}
