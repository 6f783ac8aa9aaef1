//! Volume Driver Registry
//!
//! Holds the initialized volume drivers by name. A driver that fails to
//! initialize is simply absent; the host discovers what it can use by
//! listing the registry.

use crate::domain::ports::VolumeDirectoryRef;
use crate::driver::{AzureDriver, DriverConfig, VolumeDriver, VolumeDriverRef};
use crate::error::{Error, Result};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Default)]
pub struct DriverRegistry {
    drivers: RwLock<BTreeMap<String, VolumeDriverRef>>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a driver under its own name
    pub fn register(&self, driver: VolumeDriverRef) -> Result<()> {
        let name = driver.name().to_string();
        let mut drivers = self.drivers.write();
        if drivers.contains_key(&name) {
            return Err(Error::DriverAlreadyRegistered { name });
        }

        info!("Registering volume driver: {}", name);
        drivers.insert(name, driver);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<VolumeDriverRef> {
        self.drivers
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::lookup("VolumeDriver", name))
    }

    pub fn names(&self) -> Vec<String> {
        self.drivers.read().keys().cloned().collect()
    }

    /// Stop every registered driver
    pub async fn stop_all(&self) -> Result<()> {
        let drivers: Vec<VolumeDriverRef> = self.drivers.read().values().cloned().collect();
        for driver in drivers {
            driver.stop().await?;
        }
        Ok(())
    }
}

/// Initialize the Azure driver and register it.
///
/// Outside Azure the metadata endpoint is unreachable, which is expected;
/// the failure is logged at debug level and nothing is registered.
pub async fn initialize_azure(
    registry: &DriverRegistry,
    config: &DriverConfig,
    directory: VolumeDirectoryRef,
) -> Result<Option<Arc<AzureDriver>>> {
    let driver = match AzureDriver::init(config, directory).await {
        Ok(driver) => Arc::new(driver),
        Err(e) => {
            debug!("Error initializing azure driver: {}", e);
            return Ok(None);
        }
    };

    registry.register(driver.clone())?;
    Ok(Some(driver))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controlplane::backends::BackendConfig;
    use crate::controlplane::platform::InMemoryVolumeDirectory;
    use crate::driver::MetadataConfig;
    use assert_matches::assert_matches;
    use axum::routing::get;
    use axum::Router;
    use std::time::Duration;

    fn config(url: String) -> DriverConfig {
        DriverConfig {
            metadata: MetadataConfig {
                url,
                timeout: Duration::from_millis(500),
                ..MetadataConfig::default()
            },
            backend: BackendConfig::InMemory,
        }
    }

    async fn metadata_server() -> String {
        let app = Router::new().route(
            "/compute",
            get(|| async { r#"{"subscriptionId":"sub-1","resourceGroupName":"rg-A"}"# }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/compute", addr)
    }

    #[tokio::test]
    async fn test_unreachable_metadata_skips_registration() {
        let registry = DriverRegistry::new();
        let driver = initialize_azure(
            &registry,
            &config("http://127.0.0.1:1/metadata".into()),
            Arc::new(InMemoryVolumeDirectory::new()),
        )
        .await
        .unwrap();

        assert!(driver.is_none());
        assert!(registry.names().is_empty());
        assert!(matches!(registry.get("azure"), Err(Error::Lookup { .. })));
    }

    #[tokio::test]
    async fn test_register_and_reject_duplicate() {
        let registry = DriverRegistry::new();
        let url = metadata_server().await;

        let driver = initialize_azure(
            &registry,
            &config(url.clone()),
            Arc::new(InMemoryVolumeDirectory::new()),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(driver.scope().resource_group(), "rg-A");
        assert_eq!(registry.names(), vec!["azure".to_string()]);
        assert_eq!(registry.get("azure").unwrap().name(), "azure");

        let second = initialize_azure(
            &registry,
            &config(url),
            Arc::new(InMemoryVolumeDirectory::new()),
        )
        .await;
        let err = match second {
            Err(e) => e,
            Ok(_) => panic!("duplicate registration accepted"),
        };
        assert_matches!(err, Error::DriverAlreadyRegistered { name } if name == "azure");

        registry.stop_all().await.unwrap();
    }
}
