//! Storage, credential, and signing services behind the HTTP handlers.

pub mod blob_signer;
pub mod canonical;
pub mod credentials;
pub mod directory;
pub mod gcs_gateway;
pub mod memory_gateway;
pub mod signed_url;
pub mod storage_gateway;

#[cfg(test)]
pub(crate) mod test_server;
