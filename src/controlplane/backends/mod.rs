//! Disk Service Adapters
//!
//! Provides implementations of the remote disk service port:
//! - ARM: Azure Resource Manager compute API
//! - InMemory: process-local service for standalone mode and tests

pub mod arm;
pub mod auth;
pub mod memory;

pub use arm::*;
pub use auth::*;
pub use memory::*;

use crate::domain::ports::DiskServiceRef;
use crate::error::Result;
use std::sync::Arc;

/// Which disk service implementation to build
#[derive(Debug, Clone)]
pub enum BackendConfig {
    Arm {
        compute: ComputeConfig,
        credential: Credential,
    },
    InMemory,
}

/// Factory for disk service adapters
pub struct BackendFactory;

impl BackendFactory {
    /// Build a disk service bound to `subscription_id`
    pub fn create(config: &BackendConfig, subscription_id: &str) -> Result<DiskServiceRef> {
        match config {
            BackendConfig::Arm {
                compute,
                credential,
            } => Ok(Arc::new(ArmDiskService::new(
                compute.clone(),
                subscription_id,
                credential.clone(),
            )?)),
            BackendConfig::InMemory => Ok(Arc::new(InMemoryDiskService::new(subscription_id))),
        }
    }
}
