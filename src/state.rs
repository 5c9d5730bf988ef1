//! Shared application state.
//!
//! The gateway, credential resolver, and signer are built once at startup
//! and shared by every request. If the gateway cannot be built the state is
//! permanently degraded and every storage route answers 500.

use crate::{
    config::{AppConfig, Backend},
    errors::AppError,
    services::{
        blob_signer::{BlobSigner, HmacBlobSigner, IamBlobSigner},
        credentials::{CredentialResolver, MetadataServerResolver, StaticCredentialResolver},
        directory::DirectoryEmulator,
        gcs_gateway::GcsGateway,
        memory_gateway::MemoryGateway,
        signed_url::{LocalUrlVerifier, SignedUrlIssuer, SigningEndpoint},
        storage_gateway::StorageGateway,
    },
};
use anyhow::Context;
use std::{sync::Arc, time::Duration};
use tracing::{error, info};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const LOCAL_SIGNER_ACCOUNT: &str = "local-signer@localhost";

pub struct Services {
    pub gateway: Arc<dyn StorageGateway>,
    pub issuer: SignedUrlIssuer,
    pub directories: DirectoryEmulator,
    /// Present only when URLs are signed with a local key.
    pub verifier: Option<LocalUrlVerifier>,
}

impl Services {
    /// In-memory store with a random local signing key. Signed URLs point at
    /// `download_base` and are served by this process.
    pub fn in_memory(download_base: &str) -> anyhow::Result<Self> {
        let gateway: Arc<dyn StorageGateway> = Arc::new(MemoryGateway::new());
        let endpoint = SigningEndpoint::parse(download_base).map_err(anyhow::Error::msg)?;
        let signer = Arc::new(HmacBlobSigner::ephemeral());
        let verifier = LocalUrlVerifier::new(signer.clone(), &endpoint);
        let credentials = Arc::new(StaticCredentialResolver::new(LOCAL_SIGNER_ACCOUNT, "local"));
        Ok(Self {
            issuer: SignedUrlIssuer::new(gateway.clone(), credentials, signer, endpoint),
            directories: DirectoryEmulator::new(gateway.clone()),
            verifier: Some(verifier),
            gateway,
        })
    }

    /// Cloud Storage backed services using the ambient identity.
    pub fn gcs(cfg: &AppConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .context("building HTTP client")?;
        let credentials: Arc<dyn CredentialResolver> = match &cfg.static_credentials {
            Some(creds) => {
                info!(account = %creds.account, "using configured service account token");
                Arc::new(StaticCredentialResolver::new(&creds.account, &creds.token))
            }
            None => Arc::new(MetadataServerResolver::new(client.clone(), &cfg.metadata_base)),
        };
        let gateway: Arc<dyn StorageGateway> = Arc::new(GcsGateway::new(
            client.clone(),
            &cfg.storage_api_base,
            cfg.project.clone(),
            credentials.clone(),
        )?);
        let signer: Arc<dyn BlobSigner> =
            Arc::new(IamBlobSigner::new(client, &cfg.iam_credentials_base));
        let endpoint =
            SigningEndpoint::parse(&cfg.storage_api_base).map_err(anyhow::Error::msg)?;
        Ok(Self {
            issuer: SignedUrlIssuer::new(gateway.clone(), credentials, signer, endpoint),
            directories: DirectoryEmulator::new(gateway.clone()),
            verifier: None,
            gateway,
        })
    }
}

enum Backing {
    Ready(Services),
    Degraded(String),
}

#[derive(Clone)]
pub struct AppState {
    backing: Arc<Backing>,
    pub default_location: String,
}

impl AppState {
    pub fn ready(services: Services, default_location: impl Into<String>) -> Self {
        Self {
            backing: Arc::new(Backing::Ready(services)),
            default_location: default_location.into(),
        }
    }

    pub fn degraded(reason: impl Into<String>, default_location: impl Into<String>) -> Self {
        Self {
            backing: Arc::new(Backing::Degraded(reason.into())),
            default_location: default_location.into(),
        }
    }

    /// Build state from configuration. A construction failure is logged and
    /// yields a degraded state instead of an error.
    pub fn from_config(cfg: &AppConfig) -> Self {
        let services = match cfg.backend {
            Backend::Gcs => Services::gcs(cfg),
            Backend::Memory => Services::in_memory(&cfg.local_download_base()),
        };
        match services {
            Ok(services) => {
                info!(backend = services.gateway.backend(), "storage gateway initialized");
                Self::ready(services, &cfg.default_location)
            }
            Err(err) => {
                error!("Error initializing storage client: {:#}", err);
                Self::degraded(format!("{:#}", err), &cfg.default_location)
            }
        }
    }

    /// The live services, or the uniform 500 every route returns while
    /// degraded.
    pub fn services(&self) -> Result<&Services, AppError> {
        match self.backing.as_ref() {
            Backing::Ready(services) => Ok(services),
            Backing::Degraded(_) => Err(AppError::internal("Storage client not initialized.")),
        }
    }

    pub fn degraded_reason(&self) -> Option<&str> {
        match self.backing.as_ref() {
            Backing::Ready(_) => None,
            Backing::Degraded(reason) => Some(reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        DEFAULT_IAM_CREDENTIALS_BASE, DEFAULT_LOCATION, DEFAULT_METADATA_BASE,
        DEFAULT_STORAGE_API_BASE,
    };
    use axum::http::StatusCode;

    fn config(backend: Backend, project: Option<&str>) -> AppConfig {
        AppConfig {
            host: "127.0.0.1".into(),
            port: 8080,
            project: project.map(str::to_string),
            backend,
            default_location: DEFAULT_LOCATION.into(),
            storage_api_base: DEFAULT_STORAGE_API_BASE.into(),
            iam_credentials_base: DEFAULT_IAM_CREDENTIALS_BASE.into(),
            metadata_base: DEFAULT_METADATA_BASE.into(),
            static_credentials: None,
            public_url: None,
        }
    }

    #[test]
    fn gcs_without_project_degrades() {
        let state = AppState::from_config(&config(Backend::Gcs, None));
        assert!(state.degraded_reason().unwrap().contains("project"));
        let err = state.services().err().unwrap();
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.message, "Storage client not initialized.");
    }

    #[test]
    fn gcs_with_project_is_ready() {
        let state = AppState::from_config(&config(Backend::Gcs, Some("demo")));
        let services = state.services().unwrap();
        assert_eq!(services.gateway.backend(), "gcs");
        assert!(services.verifier.is_none());
    }

    #[test]
    fn memory_backend_serves_its_own_downloads() {
        let state = AppState::from_config(&config(Backend::Memory, None));
        let services = state.services().unwrap();
        assert_eq!(services.gateway.backend(), "memory");
        assert!(services.verifier.is_some());
        assert_eq!(services.issuer.endpoint().host(), "127.0.0.1:8080");
    }
}
