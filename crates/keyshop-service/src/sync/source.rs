//! Upstream key sources.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use keyshop_store::Store;

use super::{ExportedKey, ExportedKeys, SyncError};
use crate::auth::ADMIN_KEY_HEADER;

/// A place unclaimed keys can be pulled from.
#[async_trait]
pub trait KeySource: Send + Sync {
    /// Fetch every unclaimed key without a hardware binding.
    async fn fetch_pending(&self) -> Result<Vec<ExportedKey>, SyncError>;
}

/// Reads another store directly.
pub struct StoreKeySource {
    store: Arc<dyn Store>,
}

impl StoreKeySource {
    /// Wrap a store.
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl KeySource for StoreKeySource {
    async fn fetch_pending(&self) -> Result<Vec<ExportedKey>, SyncError> {
        Ok(self
            .store
            .list_pending_keys()?
            .iter()
            .filter(|k| k.is_syncable())
            .map(ExportedKey::from)
            .collect())
    }
}

/// Calls the operator export endpoint of another deployment.
#[derive(Debug, Clone)]
pub struct HttpKeySource {
    client: Client,
    base_url: String,
    admin_key: String,
}

impl HttpKeySource {
    /// Export endpoint path on the upstream deployment.
    const EXPORT_PATH: &'static str = "/v1/admin/keys/pending";

    /// Create a new upstream client.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Configuration` if the HTTP client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        admin_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, SyncError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::Configuration(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            admin_key: admin_key.into(),
        })
    }
}

#[async_trait]
impl KeySource for HttpKeySource {
    async fn fetch_pending(&self) -> Result<Vec<ExportedKey>, SyncError> {
        let url = format!("{}{}", self.base_url, Self::EXPORT_PATH);

        tracing::debug!(url = %url, "Fetching upstream pending keys");

        let response = self
            .client
            .get(&url)
            .header(ADMIN_KEY_HEADER, &self.admin_key)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::Status(status.as_u16()));
        }

        let exported: ExportedKeys = response.json().await?;
        Ok(exported.keys)
    }
}
