//! Key synchronisation from an upstream store.
//!
//! Unclaimed stock is pulled from another deployment (or another [`Store`]) and
//! inserted locally under fresh identifiers. Codes that already exist locally are
//! skipped, so running a sync twice never duplicates a key.

mod source;

use serde::{Deserialize, Serialize};

use keyshop_core::Key;
use keyshop_store::{Store, StoreError};

pub use source::{HttpKeySource, KeySource, StoreKeySource};

/// Error type for key synchronisation.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The upstream answered with a non-success status.
    #[error("upstream returned HTTP {0}")]
    Status(u16),

    /// Local or upstream store failure.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Configuration(String),
}

/// Wire form of an unclaimed key, as exported by `GET /v1/admin/keys/pending`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportedKey {
    /// License code.
    pub code: String,
    /// Script payload.
    pub script_code: String,
    /// Maps the key is pre-assigned to.
    #[serde(default)]
    pub maps: Vec<String>,
}

impl From<&Key> for ExportedKey {
    fn from(key: &Key) -> Self {
        Self {
            code: key.code.clone(),
            script_code: key.script_code.clone(),
            maps: key.maps.iter().cloned().collect(),
        }
    }
}

/// Export envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportedKeys {
    /// Unclaimed keys.
    pub keys: Vec<ExportedKey>,
}

/// Result of a sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOutcome {
    /// Keys offered by the upstream.
    pub upstream: usize,
    /// Keys inserted locally.
    pub inserted: usize,
}

impl SyncOutcome {
    /// Operator-facing summary.
    #[must_use]
    pub fn message(&self) -> String {
        if self.upstream == 0 {
            "No pending keys found upstream".to_string()
        } else if self.inserted == 0 {
            format!("All {} upstream keys already present", self.upstream)
        } else {
            format!(
                "Synced {} of {} upstream keys",
                self.inserted, self.upstream
            )
        }
    }
}

/// Pull unclaimed keys from `source` into `store`.
///
/// # Errors
///
/// Returns an error if the upstream cannot be read or a local insert fails. Keys
/// inserted before the failure stay inserted; a rerun skips them.
pub async fn sync_keys(store: &dyn Store, source: &dyn KeySource) -> Result<SyncOutcome, SyncError> {
    let upstream = source.fetch_pending().await?;
    let mut inserted = 0;

    for exported in &upstream {
        if exported.code.trim().is_empty() {
            tracing::warn!("Skipping upstream key with empty code");
            continue;
        }

        let key = Key::pending(
            exported.code.clone(),
            exported.script_code.clone(),
            exported.maps.iter().cloned(),
        );
        if store.insert_key(&key)? {
            inserted += 1;
        }
    }

    let outcome = SyncOutcome {
        upstream: upstream.len(),
        inserted,
    };
    tracing::info!(
        upstream = outcome.upstream,
        inserted = outcome.inserted,
        "Key sync finished"
    );
    Ok(outcome)
}
