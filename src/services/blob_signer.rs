//! src/services/blob_signer.rs
//!
//! BlobSigner — produces signatures over a string-to-sign on behalf of a
//! resolved identity. The IAM-backed signer never touches key material; it
//! asks the identity service to sign with the service account's own key.

use crate::services::credentials::SigningIdentity;
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum SigningError {
    #[error("signing request failed: {0}")]
    Transport(String),
    #[error("identity service rejected signing request ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("malformed signing response: {0}")]
    Malformed(String),
}

#[async_trait]
pub trait BlobSigner: Send + Sync {
    /// Value placed in `X-Goog-Algorithm`.
    fn algorithm(&self) -> &'static str;

    async fn sign_blob(
        &self,
        identity: &SigningIdentity,
        payload: &[u8],
    ) -> Result<Vec<u8>, SigningError>;
}

#[derive(Serialize)]
struct SignBlobRequest {
    payload: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignBlobResponse {
    key_id: Option<String>,
    signed_blob: String,
}

/// Signs through the IAM Credentials `signBlob` API using the identity's
/// bearer token. The account only needs permission to sign blobs.
pub struct IamBlobSigner {
    client: reqwest::Client,
    base_url: String,
}

impl IamBlobSigner {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl BlobSigner for IamBlobSigner {
    fn algorithm(&self) -> &'static str {
        "GOOG4-RSA-SHA256"
    }

    async fn sign_blob(
        &self,
        identity: &SigningIdentity,
        payload: &[u8],
    ) -> Result<Vec<u8>, SigningError> {
        let url = format!(
            "{}/v1/projects/-/serviceAccounts/{}:signBlob",
            self.base_url, identity.account
        );
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&identity.token)
            .json(&SignBlobRequest {
                payload: general_purpose::STANDARD.encode(payload),
            })
            .send()
            .await
            .map_err(|err| SigningError::Transport(err.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(SigningError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let body: SignBlobResponse = resp
            .json()
            .await
            .map_err(|err| SigningError::Malformed(err.to_string()))?;
        debug!(account = %identity.account, key_id = ?body.key_id, "blob signed");
        general_purpose::STANDARD
            .decode(body.signed_blob)
            .map_err(|err| SigningError::Malformed(err.to_string()))
    }
}

type HmacSha256 = Hmac<Sha256>;

/// Local HMAC-SHA256 signer for the in-memory backend.
///
/// Unlike the IAM signer it can also check signatures, which lets the
/// service serve its own signed downloads.
pub struct HmacBlobSigner {
    key: Vec<u8>,
}

impl HmacBlobSigner {
    pub fn new(key: impl Into<Vec<u8>>) -> Self {
        Self { key: key.into() }
    }

    /// Signer with a per-process random key. URLs do not survive a restart.
    pub fn ephemeral() -> Self {
        let mut key = Vec::with_capacity(32);
        key.extend_from_slice(Uuid::new_v4().as_bytes());
        key.extend_from_slice(Uuid::new_v4().as_bytes());
        Self { key }
    }

    fn mac(&self) -> HmacSha256 {
        // HMAC accepts keys of any length.
        HmacSha256::new_from_slice(&self.key).expect("HMAC key of any size")
    }

    pub fn sign(&self, payload: &[u8]) -> Vec<u8> {
        let mut mac = self.mac();
        mac.update(payload);
        mac.finalize().into_bytes().to_vec()
    }

    /// Constant-time comparison of `signature` against a fresh signature.
    pub fn verify(&self, payload: &[u8], signature: &[u8]) -> bool {
        self.sign(payload).ct_eq(signature).into()
    }
}

#[async_trait]
impl BlobSigner for HmacBlobSigner {
    fn algorithm(&self) -> &'static str {
        "GOOG4-HMAC-SHA256"
    }

    async fn sign_blob(
        &self,
        _identity: &SigningIdentity,
        payload: &[u8],
    ) -> Result<Vec<u8>, SigningError> {
        Ok(self.sign(payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_server;
    use axum::{
        Json, Router,
        extract::Path,
        http::{HeaderMap, StatusCode, header},
        response::{IntoResponse, Response},
        routing::post,
    };
    use chrono::Utc;
    use serde_json::{Value, json};

    #[test]
    fn hmac_signature_round_trips() {
        let signer = HmacBlobSigner::new(b"key".to_vec());
        let sig = signer.sign(b"payload");
        assert_eq!(sig.len(), 32);
        assert!(signer.verify(b"payload", &sig));
        assert!(!signer.verify(b"payload2", &sig));
        assert!(!signer.verify(b"payload", &sig[..31]));
    }

    #[test]
    fn ephemeral_keys_differ() {
        let a = HmacBlobSigner::ephemeral();
        let b = HmacBlobSigner::ephemeral();
        assert_ne!(a.sign(b"x"), b.sign(b"x"));
    }

    /// Answers `signBlob` by reversing the payload bytes.
    async fn sign_blob_endpoint(
        Path(call): Path<String>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> Response {
        if headers.get(header::AUTHORIZATION).is_none_or(|v| v != "Bearer tok") {
            return StatusCode::UNAUTHORIZED.into_response();
        }
        let Some(account) = call.strip_suffix(":signBlob") else {
            return StatusCode::NOT_FOUND.into_response();
        };
        match account {
            "denied@proj.iam.gserviceaccount.com" => (
                StatusCode::FORBIDDEN,
                "Permission 'iam.serviceAccounts.signBlob' denied",
            )
                .into_response(),
            "garbled@proj.iam.gserviceaccount.com" => {
                Json(json!({ "keyId": "k1", "signedBlob": "%%% not base64" })).into_response()
            }
            _ => {
                let payload = general_purpose::STANDARD
                    .decode(body["payload"].as_str().unwrap_or_default())
                    .unwrap_or_default();
                let signed: Vec<u8> = payload.into_iter().rev().collect();
                Json(json!({
                    "keyId": "k1",
                    "signedBlob": general_purpose::STANDARD.encode(signed),
                }))
                .into_response()
            }
        }
    }

    async fn fake_signer() -> IamBlobSigner {
        let router = Router::new().route(
            "/v1/projects/-/serviceAccounts/{call}",
            post(sign_blob_endpoint),
        );
        IamBlobSigner::new(test_server::client(), test_server::spawn(router).await)
    }

    fn identity(account: &str) -> SigningIdentity {
        SigningIdentity {
            account: account.into(),
            token: "tok".into(),
            token_expiry: Utc::now() + chrono::Duration::hours(1),
        }
    }

    #[tokio::test]
    async fn iam_signer_decodes_signed_blob() {
        let signer = fake_signer().await;
        assert_eq!(signer.algorithm(), "GOOG4-RSA-SHA256");
        let signature = signer
            .sign_blob(&identity("svc@proj.iam.gserviceaccount.com"), b"abc")
            .await
            .unwrap();
        assert_eq!(signature, b"cba");
    }

    #[tokio::test]
    async fn iam_rejection_keeps_status_and_message() {
        let signer = fake_signer().await;
        let err = signer
            .sign_blob(&identity("denied@proj.iam.gserviceaccount.com"), b"abc")
            .await
            .unwrap_err();
        match err {
            SigningError::Rejected { status, message } => {
                assert_eq!(status, 403);
                assert!(message.contains("signBlob"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn undecodable_signature_is_malformed() {
        let signer = fake_signer().await;
        let err = signer
            .sign_blob(&identity("garbled@proj.iam.gserviceaccount.com"), b"abc")
            .await
            .unwrap_err();
        assert!(matches!(err, SigningError::Malformed(_)));
    }
}
