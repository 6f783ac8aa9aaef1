//! Identity Resolver
//!
//! Discovers the subscription and resource group the cluster runs in by
//! querying the instance metadata endpoint. This happens once, during
//! driver initialization.

use super::{RESOURCE_GROUP_KEY, SUBSCRIPTION_ID_KEY};
use crate::domain::ports::Scope;
use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, error};

pub const METADATA_URL: &str = "http://169.254.169.254/metadata/instance/compute";
pub const METADATA_API_VERSION: &str = "2018-02-01";

/// Configuration for the instance metadata query
#[derive(Debug, Clone)]
pub struct MetadataConfig {
    pub url: String,
    pub api_version: String,
    pub timeout: Duration,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            url: METADATA_URL.to_string(),
            api_version: METADATA_API_VERSION.to_string(),
            timeout: Duration::from_secs(3),
        }
    }
}

pub struct IdentityResolver {
    config: MetadataConfig,
}

impl IdentityResolver {
    pub fn new(config: MetadataConfig) -> Self {
        Self { config }
    }

    /// Resolve the scope from instance metadata
    pub async fn resolve(&self) -> Result<Scope> {
        let metadata = self.fetch_metadata().await?;
        scope_from_metadata(&metadata)
    }

    /// Fetch the flat compute metadata map
    pub async fn fetch_metadata(&self) -> Result<BTreeMap<String, String>> {
        let query_error =
            |e: reqwest::Error| Error::Configuration(format!("error querying Azure metadata: {}", e));

        let client = reqwest::Client::builder()
            .timeout(self.config.timeout)
            .build()
            .map_err(query_error)?;

        let response = client
            .get(&self.config.url)
            .header("Metadata", "True")
            .query(&[
                ("format", "json"),
                ("api-version", self.config.api_version.as_str()),
            ])
            .send()
            .await
            .map_err(query_error)?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(Error::Configuration(format!(
                "error querying Azure metadata: Code {} returned for url {}",
                status.as_u16(),
                response.url()
            )));
        }

        let body = response.bytes().await.map_err(query_error)?;
        if body.is_empty() {
            return Err(Error::Configuration(
                "error querying Azure metadata: Empty response".to_string(),
            ));
        }

        let metadata: BTreeMap<String, String> = serde_json::from_slice(&body).map_err(|e| {
            error!("Unexpected Azure metadata payload: {}", e);
            Error::Configuration(format!("error parsing Azure metadata: {}", e))
        })?;
        debug!("Fetched {} metadata keys", metadata.len());
        Ok(metadata)
    }
}

/// Extract the scope keys from a metadata map
pub fn scope_from_metadata(metadata: &BTreeMap<String, String>) -> Result<Scope> {
    let subscription_id = metadata.get(SUBSCRIPTION_ID_KEY).ok_or_else(|| {
        Error::Configuration("error detecting subscription ID from cluster context".to_string())
    })?;
    let resource_group = metadata.get(RESOURCE_GROUP_KEY).ok_or_else(|| {
        Error::Configuration("error detecting resource group from cluster context".to_string())
    })?;
    Ok(Scope::new(subscription_id, resource_group))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use axum::extract::Query;
    use axum::http::{HeaderMap, StatusCode};
    use axum::response::IntoResponse;
    use axum::routing::get;
    use axum::Router;
    use std::collections::HashMap;

    async fn compute(
        headers: HeaderMap,
        Query(query): Query<HashMap<String, String>>,
    ) -> impl IntoResponse {
        let valid = headers.get("Metadata").and_then(|v| v.to_str().ok()) == Some("True")
            && query.get("format").map(String::as_str) == Some("json")
            && query.get("api-version").map(String::as_str) == Some(METADATA_API_VERSION);
        if !valid {
            return (StatusCode::BAD_REQUEST, String::new());
        }
        (
            StatusCode::OK,
            r#"{"subscriptionId":"sub-1","resourceGroupName":"rg-A","location":"eastus"}"#
                .to_string(),
        )
    }

    async fn start_server() -> String {
        let app = Router::new()
            .route("/compute", get(compute))
            .route("/partial", get(|| async { r#"{"subscriptionId":"sub-1"}"# }))
            .route("/empty", get(|| async { "" }))
            .route("/garbage", get(|| async { "<html>nope</html>" }))
            .route("/error", get(|| async { StatusCode::INTERNAL_SERVER_ERROR }));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn resolver(url: String) -> IdentityResolver {
        IdentityResolver::new(MetadataConfig {
            url,
            ..MetadataConfig::default()
        })
    }

    #[tokio::test]
    async fn test_resolve_scope() {
        let base = start_server().await;
        let scope = resolver(format!("{}/compute", base)).resolve().await.unwrap();
        assert_eq!(scope, Scope::new("sub-1", "rg-A"));
    }

    #[tokio::test]
    async fn test_missing_resource_group() {
        let base = start_server().await;
        let err = resolver(format!("{}/partial", base))
            .resolve()
            .await
            .unwrap_err();
        assert_matches!(err, Error::Configuration(msg) if msg.contains("resource group"));
    }

    #[tokio::test]
    async fn test_bad_responses() {
        let base = start_server().await;
        for path in ["empty", "garbage", "error"] {
            let err = resolver(format!("{}/{}", base, path))
                .resolve()
                .await
                .unwrap_err();
            assert_matches!(err, Error::Configuration(_), "path {}", path);
        }
    }

    #[tokio::test]
    async fn test_unreachable_endpoint() {
        let resolver = IdentityResolver::new(MetadataConfig {
            url: "http://127.0.0.1:1/metadata".into(),
            timeout: Duration::from_millis(500),
            ..MetadataConfig::default()
        });
        assert_matches!(resolver.resolve().await, Err(Error::Configuration(_)));
    }

    #[test]
    fn test_missing_subscription() {
        let metadata = BTreeMap::from([("resourceGroupName".to_string(), "rg".to_string())]);
        assert_matches!(
            scope_from_metadata(&metadata),
            Err(Error::Configuration(msg)) if msg.contains("subscription")
        );
    }
}
