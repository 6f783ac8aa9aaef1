//! Azure Resource Manager Disk Service Adapter
//!
//! Talks to the `Microsoft.Compute` provider over REST: managed disks and
//! snapshots, addressed by name within a resource group of a fixed
//! subscription. Throttling (429), server errors and connection failures are
//! retried with exponential backoff; every other non-success status is
//! returned to the caller as [`Error::RemoteService`].

use super::auth::{Credential, TokenSource};
use crate::domain::ports::{DiskService, RemoteDisk, RemoteSnapshot};
use crate::error::{Error, Result};
use async_trait::async_trait;
use backoff::ExponentialBackoff;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the Resource Manager compute client
#[derive(Debug, Clone)]
pub struct ComputeConfig {
    /// Resource Manager endpoint
    pub endpoint: String,
    /// Compute API version
    pub api_version: String,
    /// Azure AD authority used for service principal logins
    pub authority: String,
    /// Deadline for a single HTTP request
    pub request_timeout: Duration,
    /// Upper bound on time spent retrying transient failures
    pub max_retry_elapsed: Duration,
}

impl Default for ComputeConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://management.azure.com".to_string(),
            api_version: "2019-03-01".to_string(),
            authority: "https://login.microsoftonline.com".to_string(),
            request_timeout: Duration::from_secs(30),
            max_retry_elapsed: Duration::from_secs(60),
        }
    }
}

// =============================================================================
// Wire Types
// =============================================================================

#[derive(Debug, Deserialize)]
struct ArmErrorEnvelope {
    error: ArmErrorBody,
}

#[derive(Debug, Deserialize)]
struct ArmErrorBody {
    code: String,
    message: String,
}

#[derive(Debug, Clone, Copy)]
enum ResourceKind {
    Disks,
    Snapshots,
}

impl ResourceKind {
    fn segment(&self) -> &'static str {
        match self {
            ResourceKind::Disks => "disks",
            ResourceKind::Snapshots => "snapshots",
        }
    }
}

// =============================================================================
// ARM Disk Service
// =============================================================================

/// Disk service backed by Azure Resource Manager
pub struct ArmDiskService {
    config: ComputeConfig,
    subscription_id: String,
    tokens: TokenSource,
    http: reqwest::Client,
}

impl ArmDiskService {
    /// Create a client bound to `subscription_id`
    pub fn new(
        config: ComputeConfig,
        subscription_id: impl Into<String>,
        credential: Credential,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        let tokens = TokenSource::new(credential, config.request_timeout)?;

        Ok(Self {
            config,
            subscription_id: subscription_id.into(),
            tokens,
            http,
        })
    }

    fn resource_url(&self, kind: ResourceKind, resource_group: &str, name: &str) -> String {
        format!(
            "{}/subscriptions/{}/resourceGroups/{}/providers/Microsoft.Compute/{}/{}?api-version={}",
            self.config.endpoint.trim_end_matches('/'),
            urlencoding::encode(&self.subscription_id),
            urlencoding::encode(resource_group),
            kind.segment(),
            urlencoding::encode(name),
            self.config.api_version,
        )
    }

    /// Issue a request, retrying transient failures, and return the response body
    async fn execute(
        &self,
        method: Method,
        url: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<String> {
        let policy = ExponentialBackoff {
            max_elapsed_time: Some(self.config.max_retry_elapsed),
            ..ExponentialBackoff::default()
        };

        backoff::future::retry(policy, || {
            let method = method.clone();
            async move { self.attempt(method, url, body).await }
        })
        .await
    }

    async fn attempt(
        &self,
        method: Method,
        url: &str,
        body: Option<&serde_json::Value>,
    ) -> std::result::Result<String, backoff::Error<Error>> {
        let token = self.tokens.token().await.map_err(backoff::Error::permanent)?;

        let mut request = self.http.request(method.clone(), url).bearer_auth(token);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) if e.is_timeout() || e.is_connect() => {
                warn!("{} {} failed, will retry: {}", method, url, e);
                return Err(backoff::Error::transient(e.into()));
            }
            Err(e) => return Err(backoff::Error::permanent(e.into())),
        };

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| backoff::Error::permanent(e.into()))?;

        if status.is_success() {
            return Ok(text);
        }

        let err = Error::RemoteService {
            status: status.as_u16(),
            message: remote_message(status, &text),
        };
        if err.is_transient() {
            warn!("{} {} returned {}, will retry", method, url, status);
            Err(backoff::Error::transient(err))
        } else {
            Err(backoff::Error::permanent(err))
        }
    }

    async fn get<T: DeserializeOwned>(
        &self,
        kind: ResourceKind,
        resource_group: &str,
        name: &str,
    ) -> Result<T> {
        let url = self.resource_url(kind, resource_group, name);
        let text = self.execute(Method::GET, &url, None).await?;
        Ok(serde_json::from_str(&text)?)
    }

    async fn put<T: Serialize + DeserializeOwned>(
        &self,
        kind: ResourceKind,
        resource_group: &str,
        name: &str,
        resource: T,
    ) -> Result<T> {
        let url = self.resource_url(kind, resource_group, name);
        let body = serde_json::to_value(&resource)?;
        let text = self.execute(Method::PUT, &url, Some(&body)).await?;

        // 202 Accepted may come back without a body
        if text.trim().is_empty() {
            return Ok(resource);
        }
        Ok(serde_json::from_str(&text)?)
    }
}

#[async_trait]
impl DiskService for ArmDiskService {
    async fn get_disk(&self, resource_group: &str, name: &str) -> Result<RemoteDisk> {
        debug!("Fetching disk {}/{}", resource_group, name);
        self.get(ResourceKind::Disks, resource_group, name).await
    }

    async fn create_or_update_disk(
        &self,
        resource_group: &str,
        disk: RemoteDisk,
    ) -> Result<RemoteDisk> {
        info!("Creating disk {}/{}", resource_group, disk.name);
        let name = disk.name.clone();
        self.put(ResourceKind::Disks, resource_group, &name, disk)
            .await
    }

    async fn get_snapshot(&self, resource_group: &str, name: &str) -> Result<RemoteSnapshot> {
        debug!("Fetching snapshot {}/{}", resource_group, name);
        self.get(ResourceKind::Snapshots, resource_group, name)
            .await
    }

    async fn create_or_update_snapshot(
        &self,
        resource_group: &str,
        snapshot: RemoteSnapshot,
    ) -> Result<RemoteSnapshot> {
        info!("Creating snapshot {}/{}", resource_group, snapshot.name);
        let name = snapshot.name.clone();
        self.put(ResourceKind::Snapshots, resource_group, &name, snapshot)
            .await
    }

    async fn delete_snapshot(&self, resource_group: &str, name: &str) -> Result<()> {
        info!("Deleting snapshot {}/{}", resource_group, name);
        let url = self.resource_url(ResourceKind::Snapshots, resource_group, name);
        self.execute(Method::DELETE, &url, None).await?;
        Ok(())
    }

    fn service_name(&self) -> &str {
        "azure-resource-manager"
    }
}

/// Human readable message from an ARM error body, falling back to the raw text
fn remote_message(status: StatusCode, body: &str) -> String {
    match serde_json::from_str::<ArmErrorEnvelope>(body) {
        Ok(envelope) => format!("{}: {}", envelope.error.code, envelope.error.message),
        Err(_) if body.trim().is_empty() => status.to_string(),
        Err(_) => body.trim().to_string(),
    }
}
