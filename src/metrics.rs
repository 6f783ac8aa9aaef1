//! Driver Metrics
//!
//! Prometheus counters for remote mutations performed by the driver. Each
//! [`DriverMetrics`] owns its registry so several drivers (or tests) can
//! coexist without colliding in the global default registry.

use crate::error::Result;
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

pub struct DriverMetrics {
    registry: Registry,
    pub snapshots_created: IntCounter,
    pub disks_restored: IntCounter,
    pub snapshots_deleted: IntCounter,
    pub remote_errors: IntCounterVec,
}

impl DriverMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let snapshots_created = IntCounter::new(
            "azure_driver_snapshots_created_total",
            "Snapshots created for application backups",
        )?;
        let disks_restored = IntCounter::new(
            "azure_driver_disks_restored_total",
            "Disks created from snapshots for application restores",
        )?;
        let snapshots_deleted = IntCounter::new(
            "azure_driver_snapshots_deleted_total",
            "Snapshots removed by backup deletion or cancellation",
        )?;
        let remote_errors = IntCounterVec::new(
            Opts::new(
                "azure_driver_remote_errors_total",
                "Errors returned by the remote disk service",
            ),
            &["operation"],
        )?;

        registry.register(Box::new(snapshots_created.clone()))?;
        registry.register(Box::new(disks_restored.clone()))?;
        registry.register(Box::new(snapshots_deleted.clone()))?;
        registry.register(Box::new(remote_errors.clone()))?;

        Ok(Self {
            registry,
            snapshots_created,
            disks_restored,
            snapshots_deleted,
            remote_errors,
        })
    }

    /// Count a failed remote call
    pub fn remote_error(&self, operation: &str) {
        self.remote_errors.with_label_values(&[operation]).inc();
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Text exposition of this registry
    pub fn encode(&self) -> Result<(String, Vec<u8>)> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok((encoder.format_type().to_string(), buffer))
    }
}
