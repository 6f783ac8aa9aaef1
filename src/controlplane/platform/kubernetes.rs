//! Kubernetes Volume Directory
//!
//! Resolves claims, volumes and storage classes through the Kubernetes API.

use crate::domain::ports::VolumeDirectory;
use crate::error::{Error, Result};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{PersistentVolume, PersistentVolumeClaim};
use k8s_openapi::api::storage::v1::StorageClass;
use kube::{Api, Client, ResourceExt};
use tracing::debug;

/// Volume directory backed by the Kubernetes API server
#[derive(Clone)]
pub struct KubeVolumeDirectory {
    client: Client,
}

impl KubeVolumeDirectory {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Connect using the in-cluster or kubeconfig defaults
    pub async fn try_default() -> Result<Self> {
        Ok(Self::new(Client::try_default().await?))
    }
}

/// Turn a 404 from the API server into a lookup miss
fn map_kube_error(kind: &str, name: &str, err: kube::Error) -> Error {
    match err {
        kube::Error::Api(response) if response.code == 404 => Error::lookup(kind, name),
        other => Error::Kube(other),
    }
}

#[async_trait]
impl VolumeDirectory for KubeVolumeDirectory {
    async fn volume_name_for_claim(&self, claim: &PersistentVolumeClaim) -> Result<String> {
        let namespace = claim.namespace().unwrap_or_else(|| "default".to_string());
        let name = claim.name_any();
        let qualified = format!("{}/{}", namespace, name);

        // Re-read the claim so a binding that happened after the caller
        // listed it is picked up
        let api: Api<PersistentVolumeClaim> = Api::namespaced(self.client.clone(), &namespace);
        let current = api
            .get(&name)
            .await
            .map_err(|e| map_kube_error("PersistentVolumeClaim", &qualified, e))?;

        let volume_name = current
            .spec
            .as_ref()
            .and_then(|spec| spec.volume_name.clone())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| Error::lookup("bound PersistentVolume for claim", &qualified))?;

        debug!("Claim {} is bound to {}", qualified, volume_name);
        Ok(volume_name)
    }

    async fn get_volume(&self, name: &str) -> Result<PersistentVolume> {
        let api: Api<PersistentVolume> = Api::all(self.client.clone());
        api.get(name)
            .await
            .map_err(|e| map_kube_error("PersistentVolume", name, e))
    }

    async fn get_storage_class(&self, name: &str) -> Result<StorageClass> {
        let api: Api<StorageClass> = Api::all(self.client.clone());
        api.get(name)
            .await
            .map_err(|e| map_kube_error("StorageClass", name, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::error::ErrorResponse;

    #[test]
    fn test_not_found_maps_to_lookup() {
        let err = kube::Error::Api(ErrorResponse {
            status: "Failure".into(),
            message: "persistentvolumes \"vol-1\" not found".into(),
            reason: "NotFound".into(),
            code: 404,
        });
        let mapped = map_kube_error("PersistentVolume", "vol-1", err);
        assert!(matches!(mapped, Error::Lookup { ref name, .. } if name == "vol-1"));

        let err = kube::Error::Api(ErrorResponse {
            status: "Failure".into(),
            message: "forbidden".into(),
            reason: "Forbidden".into(),
            code: 403,
        });
        assert!(matches!(
            map_kube_error("PersistentVolume", "vol-1", err),
            Error::Kube(_)
        ));
    }
}
