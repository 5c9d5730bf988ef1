//! Represents a bucket — a top-level container for objects.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A storage bucket as reported by the backing provider.
///
/// Buckets act as namespaces for objects. Their names are globally unique
/// and each one is bound to a location at creation time.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Bucket {
    /// Provider identifier. For Cloud Storage this equals the name.
    pub id: String,

    /// Globally unique bucket name.
    pub name: String,

    /// Location the bucket is bound to (e.g. "US-CENTRAL1").
    pub location: String,

    /// When this bucket was created.
    pub time_created: DateTime<Utc>,
}
