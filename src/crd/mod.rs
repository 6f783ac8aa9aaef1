//! Custom Resource Definitions
//!
//! Backup and restore job objects owned by the host orchestrator. The
//! driver only reads them and returns updated per-volume records; persisting
//! status is the host's responsibility.

pub mod application_backup;
pub mod application_restore;

pub use application_backup::*;
pub use application_restore::*;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Lifecycle status of a backup or restore record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum VolumeStatus {
    #[default]
    InProgress,
    Successful,
    Failed,
}

impl VolumeStatus {
    /// Successful and Failed are final
    pub fn is_terminal(&self) -> bool {
        !matches!(self, VolumeStatus::InProgress)
    }
}

impl std::fmt::Display for VolumeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VolumeStatus::InProgress => write!(f, "InProgress"),
            VolumeStatus::Successful => write!(f, "Successful"),
            VolumeStatus::Failed => write!(f, "Failed"),
        }
    }
}
