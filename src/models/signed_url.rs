//! Time-limited download capabilities.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// A freshly issued signed URL.
///
/// Grants are never stored. Anyone holding `url` can fetch the object until
/// `expires_at`, so `Debug` leaves the URL out.
#[derive(Clone, Serialize)]
pub struct SignedUrlGrant {
    pub url: String,
    pub bucket: String,
    pub object: String,
    /// HTTP method the signature covers.
    pub method: &'static str,
    /// Service account the signature was produced for.
    pub signer: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl fmt::Debug for SignedUrlGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignedUrlGrant")
            .field("bucket", &self.bucket)
            .field("object", &self.object)
            .field("method", &self.method)
            .field("signer", &self.signer)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}
