//! Domain Ports - Core trait definitions for the snapshot driver
//!
//! These traits define the boundaries between the snapshot lifecycle logic
//! and the two external systems it depends on: the cluster's volume
//! directory and the remote disk service. Adapters implement these traits
//! to provide concrete functionality.

use crate::error::{Error, Result};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{PersistentVolume, PersistentVolumeClaim};
use k8s_openapi::api::storage::v1::StorageClass;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

// =============================================================================
// Scope
// =============================================================================

/// The subscription and resource group remote operations execute within.
///
/// Resolved once during driver initialization and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scope {
    subscription_id: String,
    resource_group: String,
}

impl Scope {
    pub fn new(subscription_id: impl Into<String>, resource_group: impl Into<String>) -> Self {
        Self {
            subscription_id: subscription_id.into(),
            resource_group: resource_group.into(),
        }
    }

    pub fn subscription_id(&self) -> &str {
        &self.subscription_id
    }

    pub fn resource_group(&self) -> &str {
        &self.resource_group
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.subscription_id, self.resource_group)
    }
}

// =============================================================================
// Remote Resources
// =============================================================================

/// How a remote disk or snapshot is populated on creation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CreateOption {
    Empty,
    Copy,
    Import,
    Restore,
    FromImage,
    Attach,
    Upload,
    CopyStart,
    ImportSecure,
    /// Any option this client does not know about yet
    #[serde(other)]
    Unknown,
}

impl std::fmt::Display for CreateOption {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CreateOption::Empty => write!(f, "Empty"),
            CreateOption::Copy => write!(f, "Copy"),
            CreateOption::Import => write!(f, "Import"),
            CreateOption::Restore => write!(f, "Restore"),
            CreateOption::FromImage => write!(f, "FromImage"),
            CreateOption::Attach => write!(f, "Attach"),
            CreateOption::Upload => write!(f, "Upload"),
            CreateOption::CopyStart => write!(f, "CopyStart"),
            CreateOption::ImportSecure => write!(f, "ImportSecure"),
            CreateOption::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Source information for a copy-on-create resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreationData {
    pub create_option: CreateOption,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_resource_id: Option<String>,
}

impl CreationData {
    /// Copy from an existing disk or snapshot
    pub fn copy_from(source_resource_id: impl Into<String>) -> Self {
        Self {
            create_option: CreateOption::Copy,
            source_resource_id: Some(source_resource_id.into()),
        }
    }
}

/// Properties shared by remote disks and snapshots
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceProperties {
    pub creation_data: CreationData,
    #[serde(default, rename = "diskSizeGB", skip_serializing_if = "Option::is_none")]
    pub disk_size_gb: Option<i32>,
    /// Set by the remote service, never sent on create
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provisioning_state: Option<String>,
}

macro_rules! remote_resource {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
        #[serde(rename_all = "camelCase")]
        pub struct $name {
            /// Fully qualified resource id, assigned by the remote service
            #[serde(default, skip_serializing_if = "Option::is_none")]
            pub id: Option<String>,
            pub name: String,
            pub location: String,
            #[serde(default)]
            pub tags: BTreeMap<String, String>,
            pub properties: ResourceProperties,
        }

        impl $name {
            /// Build a creation request copying from `source_resource_id`
            pub fn copy_of(
                name: impl Into<String>,
                location: impl Into<String>,
                source_resource_id: impl Into<String>,
                tags: BTreeMap<String, String>,
            ) -> Self {
                Self {
                    id: None,
                    name: name.into(),
                    location: location.into(),
                    tags,
                    properties: ResourceProperties {
                        creation_data: CreationData::copy_from(source_resource_id),
                        disk_size_gb: None,
                        provisioning_state: None,
                    },
                }
            }

            /// Remote resource id, required to reference this resource as a copy source
            pub fn resource_id(&self) -> Result<&str> {
                self.id.as_deref().ok_or_else(|| {
                    Error::Internal(format!("{} {} has no resource id", $kind, self.name))
                })
            }

            /// Raw provisioning state reported by the remote service
            pub fn provisioning_state(&self) -> &str {
                self.properties
                    .provisioning_state
                    .as_deref()
                    .unwrap_or("Unknown")
            }
        }
    };
}

remote_resource!(
    /// A managed disk in the remote disk service
    RemoteDisk,
    "disk"
);

remote_resource!(
    /// A point-in-time snapshot in the remote disk service
    RemoteSnapshot,
    "snapshot"
);

// =============================================================================
// Volume Directory Port
// =============================================================================

/// Port for reading cluster storage objects
#[async_trait]
pub trait VolumeDirectory: Send + Sync {
    /// Name of the volume bound to a claim
    async fn volume_name_for_claim(&self, claim: &PersistentVolumeClaim) -> Result<String>;

    /// Fetch a volume by name
    async fn get_volume(&self, name: &str) -> Result<PersistentVolume>;

    /// Fetch a storage class by name
    async fn get_storage_class(&self, name: &str) -> Result<StorageClass>;
}

// =============================================================================
// Disk Service Port
// =============================================================================

/// Port for the remote disk service.
///
/// Implementations are bound to a subscription; every call names the
/// resource group it targets. Errors carry the remote status code so a
/// missing resource (404) can be told apart from other failures.
#[async_trait]
pub trait DiskService: Send + Sync {
    async fn get_disk(&self, resource_group: &str, name: &str) -> Result<RemoteDisk>;

    async fn create_or_update_disk(&self, resource_group: &str, disk: RemoteDisk)
        -> Result<RemoteDisk>;

    async fn get_snapshot(&self, resource_group: &str, name: &str) -> Result<RemoteSnapshot>;

    async fn create_or_update_snapshot(
        &self,
        resource_group: &str,
        snapshot: RemoteSnapshot,
    ) -> Result<RemoteSnapshot>;

    async fn delete_snapshot(&self, resource_group: &str, name: &str) -> Result<()>;

    /// Name of the service implementation
    fn service_name(&self) -> &str;
}

// =============================================================================
// Type Aliases for Arc'd Traits
// =============================================================================

pub type VolumeDirectoryRef = Arc<dyn VolumeDirectory>;
pub type DiskServiceRef = Arc<dyn DiskService>;
