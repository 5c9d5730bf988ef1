use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::env;

pub const DEFAULT_LOCATION: &str = "US-CENTRAL1";
pub const DEFAULT_STORAGE_API_BASE: &str = "https://storage.googleapis.com";
pub const DEFAULT_IAM_CREDENTIALS_BASE: &str = "https://iamcredentials.googleapis.com";
pub const DEFAULT_METADATA_BASE: &str = "http://metadata.google.internal";

/// Which object store backs the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// Google Cloud Storage JSON API.
    Gcs,
    /// In-process store for local development.
    Memory,
}

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub project: Option<String>,
    pub backend: Backend,
    pub default_location: String,
    pub storage_api_base: String,
    pub iam_credentials_base: String,
    pub metadata_base: String,
    /// Explicit identity; when set, the metadata server is not consulted.
    pub static_credentials: Option<StaticCredentials>,
    /// Base URL for locally served signed downloads (memory backend).
    pub public_url: Option<String>,
}

#[derive(Clone)]
pub struct StaticCredentials {
    pub account: String,
    pub token: String,
}

impl std::fmt::Debug for StaticCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticCredentials")
            .field("account", &self.account)
            .finish_non_exhaustive()
    }
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "HTTP facade over cloud object storage")]
pub struct Args {
    /// Host to bind to (overrides HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Cloud project that owns the buckets (overrides GCP_PROJECT)
    #[arg(long)]
    pub project: Option<String>,

    /// Storage backend (overrides STORAGE_BACKEND)
    #[arg(long, value_enum)]
    pub backend: Option<Backend>,

    /// Location for buckets created without one (overrides DEFAULT_LOCATION)
    #[arg(long)]
    pub default_location: Option<String>,

    /// Public base URL used in locally signed download links (overrides PUBLIC_URL)
    #[arg(long)]
    pub public_url: Option<String>,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig.
    pub fn from_env_and_args() -> Result<Self> {
        Self::from_args(Args::parse())
    }

    pub fn from_args(args: Args) -> Result<Self> {
        // --- Environment fallback ---
        let env_host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = match env::var("PORT") {
            Ok(value) => value
                .parse::<u16>()
                .with_context(|| format!("parsing PORT value `{}`", value))?,
            Err(env::VarError::NotPresent) => 8080,
            Err(err) => return Err(err).context("reading PORT"),
        };
        let env_backend = match env::var("STORAGE_BACKEND") {
            Ok(value) => Backend::from_str(&value, true)
                .map_err(|err| anyhow::anyhow!(err))
                .with_context(|| format!("parsing STORAGE_BACKEND value `{}`", value))?,
            Err(_) => Backend::Gcs,
        };
        let static_credentials = match (
            env::var("GOOGLE_SERVICE_ACCOUNT"),
            env::var("GOOGLE_OAUTH_ACCESS_TOKEN"),
        ) {
            (Ok(account), Ok(token)) => Some(StaticCredentials { account, token }),
            _ => None,
        };

        // --- Merge ---
        let cfg = Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            project: args.project.or_else(|| env::var("GCP_PROJECT").ok()),
            backend: args.backend.unwrap_or(env_backend),
            default_location: args
                .default_location
                .or_else(|| env::var("DEFAULT_LOCATION").ok())
                .unwrap_or_else(|| DEFAULT_LOCATION.into()),
            storage_api_base: env::var("STORAGE_API_BASE")
                .unwrap_or_else(|_| DEFAULT_STORAGE_API_BASE.into()),
            iam_credentials_base: env::var("IAM_CREDENTIALS_BASE")
                .unwrap_or_else(|_| DEFAULT_IAM_CREDENTIALS_BASE.into()),
            metadata_base: env::var("GCE_METADATA_HOST")
                .map(|host| {
                    if host.starts_with("http") {
                        host
                    } else {
                        format!("http://{host}")
                    }
                })
                .unwrap_or_else(|_| DEFAULT_METADATA_BASE.into()),
            static_credentials,
            public_url: args.public_url.or_else(|| env::var("PUBLIC_URL").ok()),
        };

        Ok(cfg)
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Base URL for locally verified signed downloads.
    pub fn local_download_base(&self) -> String {
        let base = self.public_url.clone().unwrap_or_else(|| {
            let host = match self.host.as_str() {
                "0.0.0.0" | "::" => "127.0.0.1",
                other => other,
            };
            format!("http://{}:{}", host, self.port)
        });
        format!("{}/download", base.trim_end_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> AppConfig {
        AppConfig {
            host: "0.0.0.0".into(),
            port: 8080,
            project: None,
            backend: Backend::Memory,
            default_location: DEFAULT_LOCATION.into(),
            storage_api_base: DEFAULT_STORAGE_API_BASE.into(),
            iam_credentials_base: DEFAULT_IAM_CREDENTIALS_BASE.into(),
            metadata_base: DEFAULT_METADATA_BASE.into(),
            static_credentials: None,
            public_url: None,
        }
    }

    #[test]
    fn cli_values_parse() {
        let args = Args::try_parse_from([
            "cloud-storage-api",
            "--port",
            "9000",
            "--backend",
            "memory",
            "--project",
            "demo",
        ])
        .unwrap();
        assert_eq!(args.port, Some(9000));
        assert_eq!(args.backend, Some(Backend::Memory));
        assert_eq!(args.project.as_deref(), Some("demo"));
    }

    #[test]
    fn wildcard_host_downloads_point_at_loopback() {
        let cfg = config();
        assert_eq!(cfg.addr(), "0.0.0.0:8080");
        assert_eq!(cfg.local_download_base(), "http://127.0.0.1:8080/download");
    }

    #[test]
    fn public_url_overrides_download_base() {
        let cfg = AppConfig {
            public_url: Some("https://files.example.com/".into()),
            ..config()
        };
        assert_eq!(cfg.local_download_base(), "https://files.example.com/download");
    }

    #[test]
    fn static_credentials_debug_hides_token() {
        let creds = StaticCredentials {
            account: "svc".into(),
            token: "secret-token".into(),
        };
        assert!(!format!("{creds:?}").contains("secret-token"));
    }
}
