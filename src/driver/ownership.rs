//! Ownership Classifier
//!
//! Decides whether a claim or volume belongs to the Azure driver. A claim's
//! provisioner comes from its annotation, else its storage class; only when
//! neither names one is the bound volume inspected.

use super::{
    PROVISIONER_NAME, PVC_PROVISIONER_ANNOTATION, PVC_STORAGE_CLASS_ANNOTATION,
    PV_PROVISIONED_BY_ANNOTATION,
};
use crate::domain::ports::VolumeDirectoryRef;
use k8s_openapi::api::core::v1::{PersistentVolume, PersistentVolumeClaim};
use kube::ResourceExt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Test for CSI provisioner names that should count as Azure disks
pub type CsiProvisionerPredicate = Arc<dyn Fn(&str) -> bool + Send + Sync>;

pub struct OwnershipClassifier {
    directory: VolumeDirectoryRef,
    is_csi_provisioner: CsiProvisionerPredicate,
}

impl OwnershipClassifier {
    /// No CSI provisioner is recognized until one is supplied
    pub fn new(directory: VolumeDirectoryRef) -> Self {
        Self {
            directory,
            is_csi_provisioner: Arc::new(|_| false),
        }
    }

    pub fn with_csi_predicate(mut self, predicate: CsiProvisionerPredicate) -> Self {
        self.is_csi_provisioner = predicate;
        self
    }

    fn is_supported_provisioner(&self, provisioner: &str) -> bool {
        provisioner == PROVISIONER_NAME || (self.is_csi_provisioner)(provisioner)
    }

    pub async fn owns_claim(&self, claim: &PersistentVolumeClaim) -> bool {
        let claim_name = claim.name_any();

        if let Some(provisioner) = self.claim_provisioner(claim).await {
            debug!("Claim {} is provisioned by {}", claim_name, provisioner);
            return self.is_supported_provisioner(&provisioner);
        }

        // Statically provisioned claims have neither; look at the volume
        let volume_name = match claim.spec.as_ref().and_then(|s| s.volume_name.as_deref()) {
            Some(name) if !name.is_empty() => name,
            _ => return false,
        };
        match self.directory.get_volume(volume_name).await {
            Ok(volume) => self.owns_volume(&volume),
            Err(e) => {
                warn!(
                    "Error getting volume {} for claim {}: {}",
                    volume_name, claim_name, e
                );
                false
            }
        }
    }

    /// Provisioner annotation, else the provisioner of the storage class
    async fn claim_provisioner(&self, claim: &PersistentVolumeClaim) -> Option<String> {
        if let Some(provisioner) = claim.annotations().get(PVC_PROVISIONER_ANNOTATION) {
            return Some(provisioner.clone());
        }

        let class_name = storage_class_name(claim)?;
        match self.directory.get_storage_class(&class_name).await {
            Ok(class) => Some(class.provisioner),
            Err(e) => {
                warn!(
                    "Error getting storage class {} for claim {}: {}",
                    class_name,
                    claim.name_any(),
                    e
                );
                None
            }
        }
    }

    pub fn owns_volume(&self, volume: &PersistentVolume) -> bool {
        match volume.annotations().get(PV_PROVISIONED_BY_ANNOTATION) {
            Some(provisioner) => self.is_supported_provisioner(provisioner),
            None => volume
                .spec
                .as_ref()
                .map(|spec| spec.azure_disk.is_some())
                .unwrap_or(false),
        }
    }
}

/// Legacy annotation first, then the spec field
fn storage_class_name(claim: &PersistentVolumeClaim) -> Option<String> {
    claim
        .annotations()
        .get(PVC_STORAGE_CLASS_ANNOTATION)
        .cloned()
        .or_else(|| claim.spec.as_ref()?.storage_class_name.clone())
        .filter(|name| !name.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controlplane::platform::InMemoryVolumeDirectory;
    use crate::driver::test_support::{azure_volume, claim};
    use k8s_openapi::api::core::v1::{CSIPersistentVolumeSource, PersistentVolumeSpec};
    use k8s_openapi::api::storage::v1::StorageClass;
    use kube::api::ObjectMeta;
    use std::collections::BTreeMap;

    fn storage_class(name: &str, provisioner: &str) -> StorageClass {
        StorageClass {
            metadata: ObjectMeta {
                name: Some(name.into()),
                ..Default::default()
            },
            provisioner: provisioner.into(),
            ..Default::default()
        }
    }

    fn csi_volume(name: &str) -> PersistentVolume {
        PersistentVolume {
            metadata: ObjectMeta {
                name: Some(name.into()),
                ..Default::default()
            },
            spec: Some(PersistentVolumeSpec {
                csi: Some(CSIPersistentVolumeSource {
                    driver: "disk.csi.azure.com".into(),
                    volume_handle: "handle".into(),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn annotated(mut claim: PersistentVolumeClaim, key: &str, value: &str) -> PersistentVolumeClaim {
        claim
            .metadata
            .annotations
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value.into());
        claim
    }

    fn classifier(directory: Arc<InMemoryVolumeDirectory>) -> OwnershipClassifier {
        OwnershipClassifier::new(directory)
    }

    #[tokio::test]
    async fn test_provisioner_annotation() {
        let classifier = classifier(Arc::new(InMemoryVolumeDirectory::new()));
        let claim = annotated(
            claim("pvc-a", "apps", None),
            PVC_PROVISIONER_ANNOTATION,
            "kubernetes.io/azure-disk",
        );
        assert!(classifier.owns_claim(&claim).await);
    }

    #[tokio::test]
    async fn test_storage_class_lookup() {
        let directory = Arc::new(InMemoryVolumeDirectory::new());
        directory
            .insert_storage_class(storage_class("managed-premium", PROVISIONER_NAME))
            .await;
        directory
            .insert_storage_class(storage_class("gp2", "kubernetes.io/aws-ebs"))
            .await;
        let classifier = classifier(directory);

        let mut owned = claim("pvc-a", "apps", None);
        if let Some(spec) = owned.spec.as_mut() {
            spec.storage_class_name = Some("managed-premium".into());
        }
        assert!(classifier.owns_claim(&owned).await);

        let legacy = annotated(claim("pvc-b", "apps", None), PVC_STORAGE_CLASS_ANNOTATION, "gp2");
        assert!(!classifier.owns_claim(&legacy).await);
    }

    #[tokio::test]
    async fn test_falls_back_to_volume_shape() {
        let directory = Arc::new(InMemoryVolumeDirectory::new());
        directory.insert_volume(azure_volume("vol-1", "disk-1")).await;
        directory.insert_volume(csi_volume("vol-2")).await;
        let classifier = classifier(directory);

        // Unknown storage class is logged and skipped
        let mut static_claim = claim("pvc-a", "apps", Some("vol-1"));
        if let Some(spec) = static_claim.spec.as_mut() {
            spec.storage_class_name = Some("missing".into());
        }
        assert!(classifier.owns_claim(&static_claim).await);

        assert!(!classifier.owns_claim(&claim("pvc-b", "apps", Some("vol-2"))).await);
        assert!(!classifier.owns_claim(&claim("pvc-c", "apps", Some("gone"))).await);
        assert!(!classifier.owns_claim(&claim("pvc-d", "apps", None)).await);
    }

    #[tokio::test]
    async fn test_csi_predicate() {
        let directory = Arc::new(InMemoryVolumeDirectory::new());
        let default = classifier(directory.clone());
        let csi = classifier(directory)
            .with_csi_predicate(Arc::new(|name| name == "disk.csi.azure.com"));

        let claim = annotated(
            claim("pvc-a", "apps", None),
            PVC_PROVISIONER_ANNOTATION,
            "disk.csi.azure.com",
        );
        assert!(!default.owns_claim(&claim).await);
        assert!(csi.owns_claim(&claim).await);

        let mut volume = csi_volume("vol-2");
        volume
            .metadata
            .annotations
            .get_or_insert_with(BTreeMap::new)
            .insert(PV_PROVISIONED_BY_ANNOTATION.into(), "disk.csi.azure.com".into());
        assert!(!default.owns_volume(&volume));
        assert!(csi.owns_volume(&volume));
    }

    #[test]
    fn test_owns_volume_without_spec() {
        let classifier = classifier(Arc::new(InMemoryVolumeDirectory::new()));
        assert!(!classifier.owns_volume(&PersistentVolume::default()));
        assert!(classifier.owns_volume(&azure_volume("vol-1", "disk-1")));
    }

    fn provisioned_by(mut volume: PersistentVolume, provisioner: &str) -> PersistentVolume {
        volume
            .metadata
            .annotations
            .get_or_insert_with(BTreeMap::new)
            .insert(PV_PROVISIONED_BY_ANNOTATION.into(), provisioner.into());
        volume
    }

    #[tokio::test]
    async fn test_foreign_annotation_wins_over_class() {
        let directory = Arc::new(InMemoryVolumeDirectory::new());
        directory
            .insert_storage_class(storage_class("managed-premium", PROVISIONER_NAME))
            .await;
        let classifier = classifier(directory);

        let mut claim = annotated(
            claim("pvc-a", "apps", None),
            PVC_PROVISIONER_ANNOTATION,
            "kubernetes.io/aws-ebs",
        );
        if let Some(spec) = claim.spec.as_mut() {
            spec.storage_class_name = Some("managed-premium".into());
        }
        assert!(!classifier.owns_claim(&claim).await);
    }

    #[tokio::test]
    async fn test_foreign_provisioner_skips_volume_shape() {
        let directory = Arc::new(InMemoryVolumeDirectory::new());
        directory.insert_volume(azure_volume("vol-1", "disk-1")).await;
        directory
            .insert_storage_class(storage_class("gp2", "kubernetes.io/aws-ebs"))
            .await;
        let classifier = classifier(directory);

        let by_annotation = annotated(
            claim("pvc-a", "apps", Some("vol-1")),
            PVC_PROVISIONER_ANNOTATION,
            "kubernetes.io/aws-ebs",
        );
        assert!(!classifier.owns_claim(&by_annotation).await);

        let mut by_class = claim("pvc-b", "apps", Some("vol-1"));
        if let Some(spec) = by_class.spec.as_mut() {
            spec.storage_class_name = Some("gp2".into());
        }
        assert!(!classifier.owns_claim(&by_class).await);
    }

    #[test]
    fn test_provisioned_by_wins_over_volume_shape() {
        let classifier = classifier(Arc::new(InMemoryVolumeDirectory::new()));

        let foreign = provisioned_by(azure_volume("vol-1", "disk-1"), "kubernetes.io/aws-ebs");
        assert!(!classifier.owns_volume(&foreign));

        let azure = provisioned_by(azure_volume("vol-2", "disk-2"), PROVISIONER_NAME);
        assert!(classifier.owns_volume(&azure));
    }
}
