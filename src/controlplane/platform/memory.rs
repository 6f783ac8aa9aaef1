//! In-Memory Volume Directory
//!
//! Holds claims, volumes and storage classes in process memory. Used in
//! standalone mode and as the cluster fake in tests.

use crate::domain::ports::VolumeDirectory;
use crate::error::{Error, Result};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{PersistentVolume, PersistentVolumeClaim};
use k8s_openapi::api::storage::v1::StorageClass;
use kube::ResourceExt;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

#[derive(Default)]
pub struct InMemoryVolumeDirectory {
    /// Claims keyed by `namespace/name`
    claims: RwLock<BTreeMap<String, PersistentVolumeClaim>>,
    volumes: RwLock<BTreeMap<String, PersistentVolume>>,
    storage_classes: RwLock<BTreeMap<String, StorageClass>>,
}

fn claim_key(claim: &PersistentVolumeClaim) -> String {
    format!(
        "{}/{}",
        claim.namespace().unwrap_or_else(|| "default".to_string()),
        claim.name_any()
    )
}

impl InMemoryVolumeDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_claim(&self, claim: PersistentVolumeClaim) {
        self.claims.write().await.insert(claim_key(&claim), claim);
    }

    pub async fn insert_volume(&self, volume: PersistentVolume) {
        self.volumes.write().await.insert(volume.name_any(), volume);
    }

    pub async fn insert_storage_class(&self, class: StorageClass) {
        self.storage_classes
            .write()
            .await
            .insert(class.name_any(), class);
    }
}

#[async_trait]
impl VolumeDirectory for InMemoryVolumeDirectory {
    async fn volume_name_for_claim(&self, claim: &PersistentVolumeClaim) -> Result<String> {
        let key = claim_key(claim);
        let claims = self.claims.read().await;
        let current = claims.get(&key).unwrap_or(claim);

        current
            .spec
            .as_ref()
            .and_then(|spec| spec.volume_name.clone())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| Error::lookup("bound PersistentVolume for claim", key))
    }

    async fn get_volume(&self, name: &str) -> Result<PersistentVolume> {
        self.volumes
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| Error::lookup("PersistentVolume", name))
    }

    async fn get_storage_class(&self, name: &str) -> Result<StorageClass> {
        self.storage_classes
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| Error::lookup("StorageClass", name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::PersistentVolumeClaimSpec;
    use kube::api::ObjectMeta;

    fn claim(volume_name: Option<&str>) -> PersistentVolumeClaim {
        PersistentVolumeClaim {
            metadata: ObjectMeta {
                name: Some("data".into()),
                namespace: Some("apps".into()),
                ..Default::default()
            },
            spec: Some(PersistentVolumeClaimSpec {
                volume_name: volume_name.map(String::from),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_stored_claim_takes_precedence() {
        let directory = InMemoryVolumeDirectory::new();
        directory.insert_claim(claim(Some("vol-2"))).await;

        let name = directory.volume_name_for_claim(&claim(None)).await.unwrap();
        assert_eq!(name, "vol-2");
    }

    #[tokio::test]
    async fn test_unbound_claim() {
        let directory = InMemoryVolumeDirectory::new();
        let err = directory
            .volume_name_for_claim(&claim(None))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Lookup { .. }));
        assert!(directory.get_volume("vol-1").await.is_err());
    }
}
