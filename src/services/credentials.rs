//! src/services/credentials.rs
//!
//! CredentialResolver — resolves the runtime's ambient service identity and
//! an access token usable both for storage calls and for blob signing.

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeDelta, Utc};
use serde::Deserialize;
use std::fmt;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Tokens this close to expiry are treated as already expired.
const EXPIRY_MARGIN_SECS: i64 = 60;

const METADATA_FLAVOR: &str = "Metadata-Flavor";
const SERVICE_ACCOUNT_PATH: &str = "/computeMetadata/v1/instance/service-accounts/default";

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("credentials unavailable: {0}")]
    Unavailable(String),
}

/// Service account plus a bearer token valid until `token_expiry`.
#[derive(Clone)]
pub struct SigningIdentity {
    pub account: String,
    pub token: String,
    pub token_expiry: DateTime<Utc>,
}

impl SigningIdentity {
    pub fn is_fresh_at(&self, now: DateTime<Utc>) -> bool {
        self.token_expiry - Duration::seconds(EXPIRY_MARGIN_SECS) > now
    }
}

impl fmt::Debug for SigningIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningIdentity")
            .field("account", &self.account)
            .field("token", &"<redacted>")
            .field("token_expiry", &self.token_expiry)
            .finish()
    }
}

#[async_trait]
pub trait CredentialResolver: Send + Sync {
    /// Return the ambient identity with a token that is not expired.
    async fn resolve_signing_identity(&self) -> Result<SigningIdentity, CredentialError>;
}

/// Identity supplied through configuration.
///
/// The token's real lifetime is unknown, so each resolution reports one hour
/// of validity from the call instant.
pub struct StaticCredentialResolver {
    account: String,
    token: String,
}

impl StaticCredentialResolver {
    pub fn new(account: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            token: token.into(),
        }
    }
}

#[async_trait]
impl CredentialResolver for StaticCredentialResolver {
    async fn resolve_signing_identity(&self) -> Result<SigningIdentity, CredentialError> {
        if self.token.is_empty() {
            return Err(CredentialError::Unavailable("configured access token is empty".into()));
        }
        Ok(SigningIdentity {
            account: self.account.clone(),
            token: self.token.clone(),
            token_expiry: Utc::now() + Duration::hours(1),
        })
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

/// Resolves the default service account through the compute metadata server
/// (Compute Engine, Cloud Run, GKE).
///
/// The token is cached only until its own expiry; the cache lock also
/// serializes concurrent refreshes.
pub struct MetadataServerResolver {
    client: reqwest::Client,
    base_url: String,
    cached: Mutex<Option<SigningIdentity>>,
}

impl MetadataServerResolver {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            cached: Mutex::new(None),
        }
    }

    async fn fetch(&self, leaf: &str) -> Result<reqwest::Response, CredentialError> {
        let url = format!("{}{}/{}", self.base_url, SERVICE_ACCOUNT_PATH, leaf);
        let resp = self
            .client
            .get(&url)
            .header(METADATA_FLAVOR, "Google")
            .send()
            .await
            .map_err(|err| CredentialError::Unavailable(format!("metadata server: {err}")))?;
        if !resp.status().is_success() {
            return Err(CredentialError::Unavailable(format!(
                "metadata server returned {} for {}",
                resp.status(),
                leaf
            )));
        }
        Ok(resp)
    }

    async fn refresh(&self) -> Result<SigningIdentity, CredentialError> {
        let account = self
            .fetch("email")
            .await?
            .text()
            .await
            .map_err(|err| CredentialError::Unavailable(format!("reading account email: {err}")))?;
        let token: TokenResponse = self
            .fetch("token")
            .await?
            .json()
            .await
            .map_err(|err| CredentialError::Unavailable(format!("decoding token: {err}")))?;

        let token_expiry = TimeDelta::try_seconds(token.expires_in)
            .and_then(|ttl| Utc::now().checked_add_signed(ttl))
            .ok_or_else(|| CredentialError::Unavailable("token expiry out of range".into()))?;
        let identity = SigningIdentity {
            account: account.trim().to_string(),
            token: token.access_token,
            token_expiry,
        };
        info!(
            account = %identity.account,
            expires = %identity.token_expiry,
            "refreshed service account token"
        );
        Ok(identity)
    }
}

#[async_trait]
impl CredentialResolver for MetadataServerResolver {
    async fn resolve_signing_identity(&self) -> Result<SigningIdentity, CredentialError> {
        let mut cached = self.cached.lock().await;
        if let Some(identity) = cached.as_ref() {
            if identity.is_fresh_at(Utc::now()) {
                debug!(account = %identity.account, "using cached token");
                return Ok(identity.clone());
            }
        }
        // Drop a stale token before refreshing so a failed refresh never
        // leaves it behind.
        *cached = None;
        let identity = self.refresh().await?;
        *cached = Some(identity.clone());
        Ok(identity)
    }
}
