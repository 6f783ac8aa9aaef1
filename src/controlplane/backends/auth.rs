//! Azure Active Directory token acquisition
//!
//! Credentials are taken from the environment the same way the Azure SDKs
//! do it: a service principal (`AZURE_TENANT_ID`, `AZURE_CLIENT_ID`,
//! `AZURE_CLIENT_SECRET`) when present, otherwise the instance's managed
//! identity served from the metadata endpoint.

use crate::error::{Error, Result};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Resource the management tokens are issued for
pub const MANAGEMENT_RESOURCE: &str = "https://management.azure.com/";

const MANAGED_IDENTITY_URL: &str = "http://169.254.169.254/metadata/identity/oauth2/token";
const MANAGED_IDENTITY_API_VERSION: &str = "2018-02-01";

/// Tokens are refreshed this long before they expire
const REFRESH_MARGIN_SECS: i64 = 300;

// =============================================================================
// Configuration
// =============================================================================

/// Where bearer tokens come from
#[derive(Debug, Clone)]
pub enum Credential {
    /// Service principal with a client secret
    ClientSecret {
        authority: String,
        tenant_id: String,
        client_id: String,
        client_secret: String,
    },
    /// Instance managed identity, optionally user-assigned
    ManagedIdentity { client_id: Option<String> },
    /// Pre-issued token, used in standalone mode and tests
    Static(String),
}

impl Credential {
    /// Resolve the credential from `AZURE_*` environment variables
    pub fn from_env(authority: &str) -> Self {
        let var = |key: &str| std::env::var(key).ok().filter(|v| !v.is_empty());

        match (
            var("AZURE_TENANT_ID"),
            var("AZURE_CLIENT_ID"),
            var("AZURE_CLIENT_SECRET"),
        ) {
            (Some(tenant_id), Some(client_id), Some(client_secret)) => {
                info!("Using service principal credential for client {}", client_id);
                Credential::ClientSecret {
                    authority: authority.trim_end_matches('/').to_string(),
                    tenant_id,
                    client_id,
                    client_secret,
                }
            }
            (_, client_id, _) => {
                info!("Using managed identity credential");
                Credential::ManagedIdentity { client_id }
            }
        }
    }
}

// =============================================================================
// Token Responses
// =============================================================================

#[derive(Debug, Deserialize)]
struct ClientSecretTokenResponse {
    access_token: String,
    expires_in: i64,
}

/// The metadata endpoint reports expiry as a stringified epoch
#[derive(Debug, Deserialize)]
struct ManagedIdentityTokenResponse {
    access_token: String,
    expires_on: String,
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn is_fresh(&self) -> bool {
        self.expires_at - ChronoDuration::seconds(REFRESH_MARGIN_SECS) > Utc::now()
    }
}

// =============================================================================
// Token Source
// =============================================================================

/// Caching bearer token source for the management API
pub struct TokenSource {
    credential: Credential,
    http: reqwest::Client,
    cached: RwLock<Option<CachedToken>>,
}

impl TokenSource {
    pub fn new(credential: Credential, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            credential,
            http,
            cached: RwLock::new(None),
        })
    }

    /// Current bearer token, fetching a new one when the cached token is stale
    pub async fn token(&self) -> Result<String> {
        if let Credential::Static(token) = &self.credential {
            return Ok(token.clone());
        }

        if let Some(cached) = self.cached.read().await.as_ref() {
            if cached.is_fresh() {
                return Ok(cached.value.clone());
            }
        }

        let mut guard = self.cached.write().await;
        // Another caller may have refreshed while we waited for the lock
        if let Some(cached) = guard.as_ref() {
            if cached.is_fresh() {
                return Ok(cached.value.clone());
            }
        }

        let fresh = self.fetch().await?;
        debug!("Acquired management token valid until {}", fresh.expires_at);
        let value = fresh.value.clone();
        *guard = Some(fresh);
        Ok(value)
    }

    async fn fetch(&self) -> Result<CachedToken> {
        match &self.credential {
            Credential::ClientSecret {
                authority,
                tenant_id,
                client_id,
                client_secret,
            } => {
                let url = format!("{}/{}/oauth2/v2.0/token", authority, tenant_id);
                let scope = format!("{}.default", MANAGEMENT_RESOURCE);
                let response = self
                    .http
                    .post(&url)
                    .form(&[
                        ("grant_type", "client_credentials"),
                        ("client_id", client_id.as_str()),
                        ("client_secret", client_secret.as_str()),
                        ("scope", scope.as_str()),
                    ])
                    .send()
                    .await?;
                let body: ClientSecretTokenResponse = check_token_response(response).await?;
                Ok(CachedToken {
                    value: body.access_token,
                    expires_at: Utc::now() + ChronoDuration::seconds(body.expires_in),
                })
            }
            Credential::ManagedIdentity { client_id } => {
                let mut query = vec![
                    ("api-version", MANAGED_IDENTITY_API_VERSION),
                    ("resource", MANAGEMENT_RESOURCE),
                ];
                if let Some(id) = client_id {
                    query.push(("client_id", id.as_str()));
                }
                let response = self
                    .http
                    .get(MANAGED_IDENTITY_URL)
                    .header("Metadata", "true")
                    .query(&query)
                    .send()
                    .await?;
                let body: ManagedIdentityTokenResponse = check_token_response(response).await?;
                let expires_on: i64 = body.expires_on.parse().map_err(|_| {
                    Error::Configuration(format!(
                        "invalid managed identity token expiry: {}",
                        body.expires_on
                    ))
                })?;
                let expires_at = DateTime::<Utc>::from_timestamp(expires_on, 0)
                    .unwrap_or_else(Utc::now);
                Ok(CachedToken {
                    value: body.access_token,
                    expires_at,
                })
            }
            Credential::Static(token) => Ok(CachedToken {
                value: token.clone(),
                expires_at: Utc::now() + ChronoDuration::days(365),
            }),
        }
    }
}

async fn check_token_response<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(Error::Configuration(format!(
            "token request failed with status {}: {}",
            status.as_u16(),
            body
        )));
    }
    Ok(response.json().await?)
}
