//! Identifier types for keyshop.
//!
//! Users are identified by the UUID issued by the auth provider. Every record created
//! by this service (keys, ledger rows, audit rows, notifications) gets a ULID so that
//! byte-ordered keys in the store are also time-ordered.
//!
//! # Macro-based ID Types
//!
//! The `ulid_id_type!` macro reduces boilerplate for ULID-based identifier types,
//! ensuring consistent implementation of serialization, parsing, and display traits.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

/// A user identifier (UUID from the auth provider).
///
/// Extracted from the JWT `sub` claim.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserId(uuid::Uuid);

impl UserId {
    /// Create a new `UserId` from a UUID.
    #[must_use]
    pub const fn from_uuid(uuid: uuid::Uuid) -> Self {
        Self(uuid)
    }

    /// Generate a new random `UserId` (for testing).
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Return the bytes of the UUID.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl FromStr for UserId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let uuid = uuid::Uuid::parse_str(s).map_err(|_| IdError::InvalidUuid)?;
        Ok(Self(uuid))
    }
}

impl fmt::Debug for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UserId({})", self.0)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for UserId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<UserId> for String {
    fn from(id: UserId) -> Self {
        id.0.to_string()
    }
}

/// Macro to define a ULID-based identifier type with standard trait implementations.
///
/// Generates a newtype around `Ulid` with:
/// - `Clone`, `Copy`, `PartialEq`, `Eq`, `PartialOrd`, `Ord`, `Hash`
/// - `Serialize`, `Deserialize` (as the 26-character string form)
/// - `FromStr`, `Display`, `Debug`
/// - byte conversions for use as store keys
macro_rules! ulid_id_type {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(Ulid);

        impl $name {
            /// Create a new identifier from a ULID.
            #[must_use]
            pub const fn from_ulid(ulid: Ulid) -> Self {
                Self(ulid)
            }

            /// Generate a new identifier with the current timestamp.
            #[must_use]
            pub fn generate() -> Self {
                Self(Ulid::new())
            }

            /// Return the bytes of the ULID (16 bytes, big-endian, time-ordered).
            #[must_use]
            pub fn to_bytes(&self) -> [u8; 16] {
                self.0.to_bytes()
            }

            /// Create an identifier from its byte form.
            #[must_use]
            pub fn from_bytes(bytes: [u8; 16]) -> Self {
                Self(Ulid::from_bytes(bytes))
            }
        }

        impl FromStr for $name {
            type Err = IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let ulid = Ulid::from_string(s).map_err(|_| IdError::InvalidUlid)?;
                Ok(Self(ulid))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl TryFrom<String> for $name {
            type Error = IdError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                value.parse()
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0.to_string()
            }
        }
    };
}

ulid_id_type!(KeyId, "A license key identifier.\n\nThe lowest `KeyId` is the oldest key, which makes stock selection deterministic.");
ulid_id_type!(TransactionId, "A ledger transaction identifier.");
ulid_id_type!(LogId, "An audit log row identifier.");
ulid_id_type!(NotificationId, "An outbox notification identifier.");
ulid_id_type!(LeaseId, "Token of one delivery lease on an outbox row.");

/// Errors that can occur when parsing identifiers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    /// The input is not a valid UUID.
    #[error("invalid UUID format")]
    InvalidUuid,

    /// The input is not a valid ULID.
    #[error("invalid ULID format")]
    InvalidUlid,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_id_roundtrip() {
        let id = UserId::generate();
        let parsed = UserId::from_str(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn user_id_rejects_garbage() {
        assert_eq!(UserId::from_str("not-a-uuid"), Err(IdError::InvalidUuid));
    }

    #[test]
    fn key_id_serde_json() {
        let id = KeyId::generate();
        let json = serde_json::to_string(&id).unwrap();
        let parsed: KeyId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn key_id_byte_order_matches_time_order() {
        let older = KeyId::from_ulid(Ulid::from_parts(1_000, 7));
        let newer = KeyId::from_ulid(Ulid::from_parts(2_000, 1));

        assert!(older < newer);
        assert!(older.to_bytes() < newer.to_bytes());
        assert_eq!(KeyId::from_bytes(older.to_bytes()), older);
    }

    #[test]
    fn transaction_id_rejects_garbage() {
        assert_eq!(
            TransactionId::from_str("definitely not a ulid"),
            Err(IdError::InvalidUlid)
        );
    }
}
