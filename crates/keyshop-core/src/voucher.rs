//! Voucher codes.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::KeyshopError;

/// Required length of a voucher code.
pub const VOUCHER_CODE_LEN: usize = 18;

fn pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    // INVARIANT: the pattern is a literal that is known to compile.
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9-]{18}$").expect("voucher pattern compiles"))
}

/// A syntactically valid voucher code (`^[A-Za-z0-9-]{18}$`).
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VoucherCode(String);

impl VoucherCode {
    /// Validate and wrap a voucher code.
    ///
    /// # Errors
    ///
    /// Returns `KeyshopError::InvalidVoucherFormat` if the code does not match.
    pub fn parse(code: &str) -> Result<Self, KeyshopError> {
        if pattern().is_match(code) {
            Ok(Self(code.to_string()))
        } else {
            Err(KeyshopError::InvalidVoucherFormat)
        }
    }

    /// The code as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for VoucherCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VoucherCode({})", self.0)
    }
}

impl fmt::Display for VoucherCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for VoucherCode {
    type Error = KeyshopError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<VoucherCode> for String {
    fn from(code: VoucherCode) -> Self {
        code.0
    }
}
