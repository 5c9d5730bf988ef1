//! Represents an object (blob) stored in a bucket.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Content type used for zero-byte directory markers.
pub const DIRECTORY_CONTENT_TYPE: &str = "application/x-directory";

/// Metadata for a single object within a bucket.
///
/// The name is path-like and may contain `/` separators; there is no
/// structural nesting behind them. The struct carries metadata only, never
/// the content bytes.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Object {
    /// Name of the owning bucket.
    pub bucket: String,

    /// Full object name, e.g. `photos/2025/img.jpg`.
    pub name: String,

    /// Size in bytes.
    pub size: u64,

    /// Content type (MIME type) recorded at upload.
    pub content_type: Option<String>,

    /// Timestamp of the last write.
    pub updated: DateTime<Utc>,

    /// Base64-encoded MD5 of the content, when the provider reports one.
    pub md5_hash: Option<String>,
}

impl Object {
    /// True for zero-byte placeholders whose name ends in `/`.
    pub fn is_directory_marker(&self) -> bool {
        self.size == 0 && self.name.ends_with('/')
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn object(name: &str, size: u64) -> Object {
        Object {
            bucket: "b".into(),
            name: name.into(),
            size,
            content_type: None,
            updated: Utc::now(),
            md5_hash: None,
        }
    }

    #[test]
    fn directory_marker_needs_trailing_slash_and_no_bytes() {
        assert!(object("photos/", 0).is_directory_marker());
        assert!(!object("photos", 0).is_directory_marker());
        assert!(!object("photos/", 3).is_directory_marker());
    }
}
