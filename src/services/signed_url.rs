//! src/services/signed_url.rs
//!
//! SignedUrlIssuer — turns an existing object into a time-limited GET URL
//! using V4 query-string signing. The signature is produced by a
//! [`BlobSigner`] on behalf of the identity returned by the
//! [`CredentialResolver`], so no private key ever lives in this process.
//!
//! The resulting URL is a bearer capability. It is returned to the caller
//! and never logged.

use crate::{
    models::{object::Object, signed_url::SignedUrlGrant},
    services::{
        blob_signer::{BlobSigner, HmacBlobSigner, SigningError},
        canonical,
        credentials::{CredentialError, CredentialResolver},
        storage_gateway::{GatewayError, StorageGateway},
    },
};
use chrono::{DateTime, Duration, NaiveDateTime, TimeDelta, Utc};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Lifetime of every issued URL.
pub const SIGNED_URL_TTL_MINUTES: i64 = 60;

/// Longest validity a V4 signed URL may claim (7 days).
pub const MAX_EXPIRES_SECONDS: i64 = 604_800;

#[derive(Debug, Error)]
pub enum IssueError {
    #[error("file `{name}` not found in bucket `{bucket}`")]
    ObjectNotFound { bucket: String, name: String },
    #[error(transparent)]
    Credential(#[from] CredentialError),
    #[error(transparent)]
    Signing(#[from] SigningError),
    #[error(transparent)]
    Gateway(GatewayError),
}

#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("missing query parameter `{0}`")]
    MissingParam(&'static str),
    #[error("malformed signed url: {0}")]
    Malformed(String),
    #[error("signed url has expired")]
    Expired,
    #[error("signature does not match")]
    SignatureMismatch,
}

/// Where signed URLs point: a base URL and the host header it implies.
#[derive(Clone, Debug)]
pub struct SigningEndpoint {
    base_url: String,
    host: String,
}

impl SigningEndpoint {
    /// Parse `base_url` (e.g. `https://storage.googleapis.com`). Any path
    /// component is kept as a prefix in front of `/{bucket}/{object}`.
    pub fn parse(base_url: &str) -> Result<Self, String> {
        let url = reqwest::Url::parse(base_url).map_err(|err| format!("{base_url}: {err}"))?;
        let host = url
            .host_str()
            .ok_or_else(|| format!("{base_url}: missing host"))?;
        let host = match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            host,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }
}

pub struct SignedUrlIssuer {
    gateway: Arc<dyn StorageGateway>,
    credentials: Arc<dyn CredentialResolver>,
    signer: Arc<dyn BlobSigner>,
    endpoint: SigningEndpoint,
}

impl SignedUrlIssuer {
    pub fn new(
        gateway: Arc<dyn StorageGateway>,
        credentials: Arc<dyn CredentialResolver>,
        signer: Arc<dyn BlobSigner>,
        endpoint: SigningEndpoint,
    ) -> Self {
        Self {
            gateway,
            credentials,
            signer,
            endpoint,
        }
    }

    pub fn endpoint(&self) -> &SigningEndpoint {
        &self.endpoint
    }

    /// Issue a download URL valid for [`SIGNED_URL_TTL_MINUTES`] from now.
    pub async fn issue_download_url(
        &self,
        bucket: &str,
        name: &str,
    ) -> Result<(Object, SignedUrlGrant), IssueError> {
        self.issue_download_url_at(bucket, name, Utc::now()).await
    }

    /// Same as [`Self::issue_download_url`] with an explicit issuance instant.
    ///
    /// The object is looked up before any credential work, so a missing
    /// object never triggers identity resolution.
    pub async fn issue_download_url_at(
        &self,
        bucket: &str,
        name: &str,
        now: DateTime<Utc>,
    ) -> Result<(Object, SignedUrlGrant), IssueError> {
        let object = self
            .gateway
            .get_object(bucket, name)
            .await
            .map_err(|err| match err {
                GatewayError::BucketNotFound(_) | GatewayError::ObjectNotFound { .. } => {
                    IssueError::ObjectNotFound {
                        bucket: bucket.to_string(),
                        name: name.to_string(),
                    }
                }
                other => IssueError::Gateway(other),
            })?;

        let identity = self.credentials.resolve_signing_identity().await?;

        let algorithm = self.signer.algorithm();
        let timestamp = canonical::format_timestamp(now);
        let scope = canonical::credential_scope(now);
        let credential = format!("{}/{}", identity.account, scope);
        let expires = (SIGNED_URL_TTL_MINUTES * 60).to_string();

        let query = canonical::canonical_query([
            ("X-Goog-Algorithm", algorithm),
            ("X-Goog-Credential", credential.as_str()),
            ("X-Goog-Date", timestamp.as_str()),
            ("X-Goog-Expires", expires.as_str()),
            ("X-Goog-SignedHeaders", canonical::SIGNED_HEADERS),
        ]);
        let uri = canonical::canonical_uri(bucket, name);
        let request = canonical::canonical_request(&uri, &query, &self.endpoint.host);
        let string_to_sign = canonical::string_to_sign(algorithm, &timestamp, &scope, &request);
        debug!(bucket, object = name, "built canonical request for signing");

        let signature = self
            .signer
            .sign_blob(&identity, string_to_sign.as_bytes())
            .await?;

        let url = format!(
            "{}{}?{}&{}={}",
            self.endpoint.base_url,
            uri,
            query,
            canonical::SIGNATURE_PARAM,
            hex::encode(signature)
        );
        let grant = SignedUrlGrant {
            url,
            bucket: bucket.to_string(),
            object: name.to_string(),
            method: "GET",
            signer: identity.account,
            issued_at: now,
            expires_at: now + Duration::minutes(SIGNED_URL_TTL_MINUTES),
        };
        info!(
            bucket,
            object = name,
            signer = %grant.signer,
            expires = %grant.expires_at,
            "issued signed download url"
        );
        Ok((object, grant))
    }
}

/// Checks URLs produced by an issuer backed by an [`HmacBlobSigner`].
pub struct LocalUrlVerifier {
    signer: Arc<HmacBlobSigner>,
    host: String,
}

impl LocalUrlVerifier {
    pub fn new(signer: Arc<HmacBlobSigner>, endpoint: &SigningEndpoint) -> Self {
        Self {
            signer,
            host: endpoint.host.clone(),
        }
    }

    /// Verify the raw query string of a download request for `bucket/name`.
    pub fn verify(
        &self,
        bucket: &str,
        name: &str,
        raw_query: &str,
        now: DateTime<Utc>,
    ) -> Result<(), VerifyError> {
        let mut signature = None;
        let mut params = Vec::new();
        for (key, value) in canonical::parse_query(raw_query) {
            if key == canonical::SIGNATURE_PARAM {
                signature = Some(value);
            } else {
                params.push((key, value));
            }
        }
        let signature = signature.ok_or(VerifyError::MissingParam(canonical::SIGNATURE_PARAM))?;
        let lookup = |wanted: &'static str| {
            params
                .iter()
                .find(|(k, _)| k == wanted)
                .map(|(_, v)| v.as_str())
                .ok_or(VerifyError::MissingParam(wanted))
        };

        let algorithm = lookup("X-Goog-Algorithm")?;
        if algorithm != self.signer.algorithm() {
            return Err(VerifyError::Malformed(format!("unsupported algorithm {algorithm}")));
        }
        let timestamp = lookup("X-Goog-Date")?;
        let expires: i64 = lookup("X-Goog-Expires")?
            .parse()
            .map_err(|_| VerifyError::Malformed("X-Goog-Expires is not an integer".into()))?;
        if !(1..=MAX_EXPIRES_SECONDS).contains(&expires) {
            return Err(VerifyError::Malformed(format!(
                "X-Goog-Expires must be between 1 and {MAX_EXPIRES_SECONDS}"
            )));
        }
        let scope = lookup("X-Goog-Credential")?
            .split_once('/')
            .map(|(_, scope)| scope.to_string())
            .ok_or_else(|| VerifyError::Malformed("X-Goog-Credential has no scope".into()))?;
        let issued = NaiveDateTime::parse_from_str(timestamp, "%Y%m%dT%H%M%SZ")
            .map_err(|_| VerifyError::Malformed("X-Goog-Date has an invalid format".into()))?
            .and_utc();

        let query = canonical::canonical_query(params.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        let uri = canonical::canonical_uri(bucket, name);
        let request = canonical::canonical_request(&uri, &query, &self.host);
        let string_to_sign = canonical::string_to_sign(algorithm, timestamp, &scope, &request);

        let provided = hex::decode(&signature)
            .map_err(|_| VerifyError::Malformed("signature is not hex".into()))?;
        if !self.signer.verify(string_to_sign.as_bytes(), &provided) {
            debug!(bucket, object = name, "signed url signature mismatch");
            return Err(VerifyError::SignatureMismatch);
        }

        // Only judge expiry once the parameters are known to be ours.
        let deadline = TimeDelta::try_seconds(expires)
            .and_then(|ttl| issued.checked_add_signed(ttl))
            .ok_or_else(|| VerifyError::Malformed("X-Goog-Expires is out of range".into()))?;
        if now > deadline {
            return Err(VerifyError::Expired);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{
        credentials::{SigningIdentity, StaticCredentialResolver},
        memory_gateway::MemoryGateway,
    };
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingResolver {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CredentialResolver for CountingResolver {
        async fn resolve_signing_identity(&self) -> Result<SigningIdentity, CredentialError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(SigningIdentity {
                account: "svc@proj.iam.gserviceaccount.com".into(),
                token: "tok".into(),
                token_expiry: Utc::now() + Duration::hours(1),
            })
        }
    }

    struct FailingResolver;

    #[async_trait]
    impl CredentialResolver for FailingResolver {
        async fn resolve_signing_identity(&self) -> Result<SigningIdentity, CredentialError> {
            Err(CredentialError::Unavailable("no metadata server".into()))
        }
    }

    async fn gateway() -> Arc<MemoryGateway> {
        let gateway = Arc::new(MemoryGateway::new());
        gateway.create_bucket("docs", "us").await.unwrap();
        gateway
            .put_object("docs", "reports/q1 final.pdf", Bytes::from_static(b"%PDF"), "application/pdf")
            .await
            .unwrap();
        gateway
    }

    fn endpoint() -> SigningEndpoint {
        SigningEndpoint::parse("http://localhost:8080/download").unwrap()
    }

    #[test]
    fn endpoint_keeps_port_in_host() {
        let endpoint = endpoint();
        assert_eq!(endpoint.host(), "localhost:8080");
        let gcs = SigningEndpoint::parse("https://storage.googleapis.com/").unwrap();
        assert_eq!(gcs.host(), "storage.googleapis.com");
        assert!(SigningEndpoint::parse("not a url").is_err());
    }

    #[tokio::test]
    async fn missing_object_fails_before_identity_resolution() {
        let resolver = Arc::new(CountingResolver {
            calls: AtomicUsize::new(0),
        });
        let issuer = SignedUrlIssuer::new(
            gateway().await,
            resolver.clone(),
            Arc::new(HmacBlobSigner::new(b"k".to_vec())),
            endpoint(),
        );

        let err = issuer.issue_download_url("docs", "absent.txt").await.unwrap_err();
        assert!(matches!(err, IssueError::ObjectNotFound { .. }));
        let err = issuer.issue_download_url("nobucket", "x").await.unwrap_err();
        assert!(matches!(err, IssueError::ObjectNotFound { .. }));
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 0);

        issuer
            .issue_download_url("docs", "reports/q1 final.pdf")
            .await
            .unwrap();
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn expiry_is_sixty_minutes_out() {
        let issuer = SignedUrlIssuer::new(
            gateway().await,
            Arc::new(StaticCredentialResolver::new("svc", "tok")),
            Arc::new(HmacBlobSigner::new(b"k".to_vec())),
            endpoint(),
        );
        let before = Utc::now();
        let (object, grant) = issuer
            .issue_download_url("docs", "reports/q1 final.pdf")
            .await
            .unwrap();

        let ahead = grant.expires_at - before;
        assert!(ahead >= Duration::minutes(59) && ahead <= Duration::minutes(61));
        assert!(grant.expires_at > Utc::now());
        assert_eq!(object.size, 4);
        assert_eq!(grant.method, "GET");
        assert!(grant.url.starts_with("http://localhost:8080/download/docs/reports/q1%20final.pdf?"));
        assert!(grant.url.contains("X-Goog-Expires=3600"));
        assert!(grant.url.contains("X-Goog-Signature="));
    }

    #[tokio::test]
    async fn credential_failure_is_reported() {
        let issuer = SignedUrlIssuer::new(
            gateway().await,
            Arc::new(FailingResolver),
            Arc::new(HmacBlobSigner::new(b"k".to_vec())),
            endpoint(),
        );
        let err = issuer
            .issue_download_url("docs", "reports/q1 final.pdf")
            .await
            .unwrap_err();
        assert!(matches!(err, IssueError::Credential(_)));
    }

    fn query_of(url: &str) -> &str {
        url.split_once('?').map(|(_, q)| q).unwrap()
    }

    #[tokio::test]
    async fn local_verifier_accepts_own_urls_until_expiry() {
        let signer = Arc::new(HmacBlobSigner::new(b"secret".to_vec()));
        let issuer = SignedUrlIssuer::new(
            gateway().await,
            Arc::new(StaticCredentialResolver::new("svc", "tok")),
            signer.clone(),
            endpoint(),
        );
        let verifier = LocalUrlVerifier::new(signer, issuer.endpoint());
        let name = "reports/q1 final.pdf";

        let issued_at = Utc::now();
        let (_, grant) = issuer.issue_download_url_at("docs", name, issued_at).await.unwrap();
        let query = query_of(&grant.url);

        verifier.verify("docs", name, query, issued_at).unwrap();
        verifier
            .verify("docs", name, query, issued_at + Duration::minutes(59))
            .unwrap();
        assert!(matches!(
            verifier.verify("docs", name, query, issued_at + Duration::minutes(61)),
            Err(VerifyError::Expired)
        ));
        assert!(matches!(
            verifier.verify("docs", "reports/other.pdf", query, issued_at),
            Err(VerifyError::SignatureMismatch)
        ));

        let tampered = query.replace("X-Goog-Expires=3600", "X-Goog-Expires=99999");
        assert!(matches!(
            verifier.verify("docs", name, &tampered, issued_at),
            Err(VerifyError::SignatureMismatch)
        ));

        let unsigned: String = query
            .split('&')
            .filter(|p| !p.starts_with("X-Goog-Signature="))
            .collect::<Vec<_>>()
            .join("&");
        assert!(matches!(
            verifier.verify("docs", name, &unsigned, issued_at),
            Err(VerifyError::MissingParam("X-Goog-Signature"))
        ));
    }

    #[tokio::test]
    async fn verifier_rejects_other_keys() {
        let issuer = SignedUrlIssuer::new(
            gateway().await,
            Arc::new(StaticCredentialResolver::new("svc", "tok")),
            Arc::new(HmacBlobSigner::new(b"one".to_vec())),
            endpoint(),
        );
        let verifier = LocalUrlVerifier::new(Arc::new(HmacBlobSigner::new(b"two".to_vec())), issuer.endpoint());
        let (_, grant) = issuer
            .issue_download_url("docs", "reports/q1 final.pdf")
            .await
            .unwrap();
        assert!(matches!(
            verifier.verify("docs", "reports/q1 final.pdf", query_of(&grant.url), Utc::now()),
            Err(VerifyError::SignatureMismatch)
        ));
    }

    #[tokio::test]
    async fn out_of_range_expiry_is_malformed() {
        let signer = Arc::new(HmacBlobSigner::new(b"secret".to_vec()));
        let issuer = SignedUrlIssuer::new(
            gateway().await,
            Arc::new(StaticCredentialResolver::new("svc", "tok")),
            signer.clone(),
            endpoint(),
        );
        let verifier = LocalUrlVerifier::new(signer, issuer.endpoint());
        let name = "reports/q1 final.pdf";
        let (_, grant) = issuer.issue_download_url("docs", name).await.unwrap();
        let query = query_of(&grant.url);

        for expires in ["9223372036854775807", "0", "-5", "604801"] {
            let forged = query.replace("X-Goog-Expires=3600", &format!("X-Goog-Expires={expires}"));
            assert!(
                matches!(
                    verifier.verify("docs", name, &forged, Utc::now()),
                    Err(VerifyError::Malformed(_))
                ),
                "{expires}"
            );
        }

        let forged = "X-Goog-Algorithm=GOOG4-HMAC-SHA256&X-Goog-Credential=svc%2F20250101%2Fauto%2Fstorage%2Fgoog4_request\
            &X-Goog-Date=20250101T000000Z&X-Goog-Expires=604800&X-Goog-SignedHeaders=host&X-Goog-Signature=00";
        assert!(matches!(
            verifier.verify("b", "o", forged, Utc::now()),
            Err(VerifyError::SignatureMismatch)
        ));
    }
}
