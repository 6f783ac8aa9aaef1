//! Azure Disk Snapshotter - Volume Driver for Application Backup and Restore
//!
//! Snapshots the Azure managed disks behind Kubernetes claims, restores
//! them into new disks, reports provisioning progress and cleans up.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                        REST API (axum)                               │
//! ├──────────────────────────────────────────────────────────────────────┤
//! │                        Driver Registry                               │
//! ├──────────────────────────────────────────────────────────────────────┤
//! │                         Azure Driver                                 │
//! │  ┌──────────┐ ┌───────────┐ ┌─────────┐ ┌─────────┐ ┌─────────────┐  │
//! │  │ Identity │ │ Ownership │ │ Backup  │ │ Restore │ │ Status /    │  │
//! │  │ Resolver │ │ Classifier│ │         │ │         │ │ Cleanup     │  │
//! │  └──────────┘ └───────────┘ └─────────┘ └─────────┘ └─────────────┘  │
//! ├──────────────────────────────────┬───────────────────────────────────┤
//! │       Volume Directory           │        Disk Service               │
//! │   (Kubernetes | in-memory)       │   (Resource Manager | in-memory)  │
//! └──────────────────────────────────┴───────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`driver`]: The Azure volume driver and its host-facing traits
//! - [`controlplane`]: Adapters, driver registry and REST API
//! - [`crd`]: Backup and restore job resources
//! - [`domain`]: Ports and remote resource types
//! - [`metrics`]: Prometheus counters
//! - [`error`]: Error types and handling

pub mod controlplane;
pub mod crd;
pub mod domain;
pub mod driver;
pub mod error;
pub mod metrics;

// Re-export commonly used types
pub use controlplane::{
    initialize_azure, ApiServer, ApiServerConfig, ArmDiskService, BackendConfig, BackendFactory,
    ComputeConfig, Credential, DriverRegistry, InMemoryDiskService, InMemoryVolumeDirectory,
    KubeVolumeDirectory, PlatformConfig, PlatformFactory,
};

pub use crd::{
    ApplicationBackup, ApplicationBackupSpec, ApplicationBackupStatus, ApplicationRestore,
    ApplicationRestoreSpec, ApplicationRestoreStatus, BackupVolumeInfo, RestoreVolumeInfo,
    VolumeStatus,
};

pub use domain::ports::{
    DiskService, DiskServiceRef, RemoteDisk, RemoteSnapshot, Scope, VolumeDirectory,
    VolumeDirectoryRef,
};

pub use driver::{
    AzureDriver, DriverConfig, ExtendedCapabilities, IdentityResolver, MetadataConfig,
    OwnershipClassifier, VolumeDriver, VolumeDriverRef, DRIVER_NAME,
};

pub use error::{Error, ErrorAction, Result};

pub use metrics::DriverMetrics;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
