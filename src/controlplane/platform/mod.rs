//! Volume Directory Adapters
//!
//! Provides implementations of the volume directory port:
//! - Kubernetes API server
//! - In-memory directory for standalone mode and tests

pub mod kubernetes;
pub mod memory;

pub use kubernetes::*;
pub use memory::*;

use crate::domain::ports::VolumeDirectoryRef;
use crate::error::Result;
use std::sync::Arc;

/// Where cluster storage objects are read from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformConfig {
    Kubernetes,
    InMemory,
}

/// Factory for volume directory adapters
pub struct PlatformFactory;

impl PlatformFactory {
    pub async fn create(config: PlatformConfig) -> Result<VolumeDirectoryRef> {
        match config {
            PlatformConfig::Kubernetes => Ok(Arc::new(KubeVolumeDirectory::try_default().await?)),
            PlatformConfig::InMemory => Ok(Arc::new(InMemoryVolumeDirectory::new())),
        }
    }
}
