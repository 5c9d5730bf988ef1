//! Canonical request construction for V4 query-string signed URLs.
//!
//! ```text
//! GET\n
//! /{bucket}/{object}\n
//! CanonicalQueryString\n
//! host:{host}\n\n
//! host\n
//! UNSIGNED-PAYLOAD
//! ```
//!
//! Issuing and verifying both go through these helpers so the two sides
//! always agree byte for byte.

use chrono::{DateTime, Utc};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

pub const UNSIGNED_PAYLOAD: &str = "UNSIGNED-PAYLOAD";
pub const SIGNED_HEADERS: &str = "host";
pub const SIGNATURE_PARAM: &str = "X-Goog-Signature";

/// Everything except RFC 3986 unreserved characters is encoded.
const URI_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

pub fn uri_encode(value: &str) -> String {
    utf8_percent_encode(value, URI_ENCODE_SET).to_string()
}

/// Encode an object name for a URL path, keeping `/` separators.
pub fn encode_object_path(name: &str) -> String {
    name.split('/').map(uri_encode).collect::<Vec<_>>().join("/")
}

/// `/{bucket}/{object}` with each segment encoded.
pub fn canonical_uri(bucket: &str, object: &str) -> String {
    format!("/{}/{}", uri_encode(bucket), encode_object_path(object))
}

/// Sort parameters by key and join them as `k=v&k=v`, encoding both sides.
pub fn canonical_query<'a, I>(params: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let sorted: BTreeMap<String, String> = params
        .into_iter()
        .map(|(k, v)| (uri_encode(k), uri_encode(v)))
        .collect();
    sorted
        .into_iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

/// Decode a raw query string into `(key, value)` pairs.
pub fn parse_query(query: &str) -> Vec<(String, String)> {
    query
        .split('&')
        .filter(|s| !s.is_empty())
        .map(|pair| {
            let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
            (decode(k), decode(v))
        })
        .collect()
}

fn decode(value: &str) -> String {
    let plus_decoded = value.replace('+', " ");
    percent_decode_str(&plus_decoded)
        .decode_utf8_lossy()
        .into_owned()
}

pub fn canonical_request(uri: &str, query: &str, host: &str) -> String {
    format!("GET\n{uri}\n{query}\nhost:{host}\n\n{SIGNED_HEADERS}\n{UNSIGNED_PAYLOAD}")
}

pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y%m%dT%H%M%SZ").to_string()
}

pub fn credential_scope(at: DateTime<Utc>) -> String {
    format!("{}/auto/storage/goog4_request", at.format("%Y%m%d"))
}

pub fn string_to_sign(algorithm: &str, timestamp: &str, scope: &str, canonical: &str) -> String {
    let hashed = hex::encode(Sha256::digest(canonical.as_bytes()));
    format!("{algorithm}\n{timestamp}\n{scope}\n{hashed}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn object_path_keeps_separators() {
        assert_eq!(encode_object_path("a b/c+d.txt"), "a%20b/c%2Bd.txt");
        assert_eq!(canonical_uri("bkt", "dir/file"), "/bkt/dir/file");
    }

    #[test]
    fn query_is_sorted_and_encoded() {
        let query = canonical_query([("b", "2"), ("a", "x/y"), ("X-Goog-Date", "1")]);
        assert_eq!(query, "X-Goog-Date=1&a=x%2Fy&b=2");
    }

    #[test]
    fn parse_query_decodes_values() {
        let parsed = parse_query("a=x%2Fy&b=&c");
        assert_eq!(
            parsed,
            vec![
                ("a".to_string(), "x/y".to_string()),
                ("b".to_string(), String::new()),
                ("c".to_string(), String::new()),
            ]
        );
    }

    #[test]
    fn timestamp_and_scope_formats() {
        let at = Utc.with_ymd_and_hms(2025, 3, 7, 9, 5, 1).unwrap();
        assert_eq!(format_timestamp(at), "20250307T090501Z");
        assert_eq!(credential_scope(at), "20250307/auto/storage/goog4_request");
    }

    #[test]
    fn string_to_sign_hashes_canonical_request() {
        let canonical = canonical_request("/b/o", "", "storage.googleapis.com");
        let sts = string_to_sign("GOOG4-RSA-SHA256", "20250101T000000Z", "scope", &canonical);
        let lines: Vec<&str> = sts.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "GOOG4-RSA-SHA256");
        assert_eq!(lines[3].len(), 64);
    }
}
