//! License key records and their lifecycle.
//!
//! A key moves `Pending -> Wait -> Active`. `Pending` keys are unowned stock, a
//! purchase claims one into `Wait` for the buyer, and the buyer's own verification
//! activates it. A hardware id is bound on first execution and cleared by a reset.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{KeyshopError, Result};
use crate::{KeyId, UserId};

/// Maximum accepted length of a hardware id.
pub const MAX_HWID_LEN: usize = 128;

/// Lifecycle status of a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyStatus {
    /// Unowned stock, available for purchase.
    Pending,
    /// Purchased, waiting for the owner to verify it.
    Wait,
    /// Verified by the owner; the script payload is released.
    Active,
}

impl fmt::Display for KeyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "Pending",
            Self::Wait => "Wait",
            Self::Active => "Active",
        };
        f.write_str(s)
    }
}

/// A license key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Key {
    /// Key identifier.
    pub id: KeyId,

    /// Opaque license string, unique across the store.
    pub code: String,

    /// Lifecycle status.
    pub status: KeyStatus,

    /// Owner, set when the key is claimed.
    pub owner_id: Option<UserId>,

    /// Map names this key unlocks.
    pub maps: BTreeSet<String>,

    /// Hardware id bound on first execution.
    pub hardware_id: Option<String>,

    /// Script payload released once the key is active.
    pub script_code: String,

    /// When the key was created.
    pub created_at: DateTime<Utc>,

    /// When the key was last mutated.
    pub updated_at: DateTime<Utc>,
}

impl Key {
    /// Create a new unowned `Pending` key.
    #[must_use]
    pub fn pending(
        code: impl Into<String>,
        script_code: impl Into<String>,
        maps: impl IntoIterator<Item = String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: KeyId::generate(),
            code: code.into(),
            status: KeyStatus::Pending,
            owner_id: None,
            maps: maps.into_iter().collect(),
            hardware_id: None,
            script_code: script_code.into(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether this key is stock that can be sold for `map_name`.
    ///
    /// Unassigned stock (no maps yet) matches any map.
    #[must_use]
    pub fn is_claimable_for(&self, map_name: &str) -> bool {
        self.status == KeyStatus::Pending
            && self.owner_id.is_none()
            && (self.maps.is_empty() || self.maps.contains(map_name))
    }

    /// Whether this key is eligible for export to another store.
    #[must_use]
    pub fn is_syncable(&self) -> bool {
        self.status == KeyStatus::Pending && self.hardware_id.is_none()
    }

    /// Claim this key for `owner`, unlocking `map_name`.
    ///
    /// # Errors
    ///
    /// Returns `KeyshopError::InvalidTransition` unless the key is claimable stock.
    pub fn claim(&mut self, owner: UserId, map_name: &str) -> Result<()> {
        if !self.is_claimable_for(map_name) {
            return Err(self.invalid_transition(KeyStatus::Wait));
        }
        self.maps.insert(map_name.to_string());
        self.owner_id = Some(owner);
        self.status = KeyStatus::Wait;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Activate a `Wait` key on behalf of `owner`.
    ///
    /// # Errors
    ///
    /// Returns `KeyshopError::InvalidTransition` if the key is not in `Wait` or is
    /// owned by someone else.
    pub fn activate(&mut self, owner: &UserId) -> Result<()> {
        if self.status != KeyStatus::Wait || self.owner_id.as_ref() != Some(owner) {
            return Err(self.invalid_transition(KeyStatus::Active));
        }
        self.status = KeyStatus::Active;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Bind `hwid` on first execution, or check it against the bound one.
    ///
    /// Returns `true` when this call performed the binding.
    ///
    /// # Errors
    ///
    /// - `KeyshopError::InvalidTransition` if the key is not active.
    /// - `KeyshopError::HwidMismatch` if a different hardware id is bound.
    pub fn bind_hwid(&mut self, hwid: &str) -> Result<bool> {
        if self.status != KeyStatus::Active {
            return Err(self.invalid_transition(KeyStatus::Active));
        }
        match &self.hardware_id {
            Some(bound) if bound == hwid => Ok(false),
            Some(_) => Err(KeyshopError::HwidMismatch),
            None => {
                self.hardware_id = Some(hwid.to_string());
                self.updated_at = Utc::now();
                Ok(true)
            }
        }
    }

    /// Clear the hardware binding. No other field changes.
    pub fn reset_hwid(&mut self) {
        self.hardware_id = None;
    }

    fn invalid_transition(&self, to: KeyStatus) -> KeyshopError {
        KeyshopError::InvalidTransition {
            from: self.status,
            to,
        }
    }
}

/// Check that a presented hardware id is non-empty, bounded and printable.
#[must_use]
pub fn is_valid_hwid(hwid: &str) -> bool {
    !hwid.is_empty()
        && hwid.len() <= MAX_HWID_LEN
        && hwid.chars().all(|c| c.is_ascii_graphic())
}
