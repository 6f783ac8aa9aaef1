//! Migrated-Volume Adoption
//!
//! After a volume is migrated under a new name, its record must point at
//! the disk carrying that name.

use super::AzureDriver;
use crate::error::{Error, Result};
use k8s_openapi::api::core::v1::PersistentVolume;
use kube::ResourceExt;
use tracing::info;

impl AzureDriver {
    pub(crate) async fn adopt_migrated_volume(
        &self,
        mut volume: PersistentVolume,
    ) -> Result<PersistentVolume> {
        let name = volume.name_any();
        let spec = volume
            .spec
            .as_mut()
            .ok_or_else(|| Error::lookup("spec of PersistentVolume", &name))?;

        if let Some(csi) = spec.csi.as_mut() {
            csi.volume_handle = name;
            return Ok(volume);
        }

        let source = spec
            .azure_disk
            .as_mut()
            .ok_or_else(|| Error::lookup("Azure disk reference of PersistentVolume", &name))?;
        let disk = self
            .disks
            .get_disk(self.scope.resource_group(), &name)
            .await
            .map_err(|e| self.remote_failure("get_disk", format!("error getting disk {}", name), e))?;

        source.disk_name = name.clone();
        source.disk_uri = disk.resource_id()?.to_string();
        info!("Volume {} now references disk {}", name, source.disk_uri);
        Ok(volume)
    }
}
