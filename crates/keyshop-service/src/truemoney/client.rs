//! TrueMoney API client implementation.

use reqwest::Client;
use std::time::Duration;

use keyshop_core::{parse_amount_cents, VoucherCode};

use super::types::{codes, RedeemRequest, RedeemResponse, Redemption};

/// Error type for TrueMoney operations.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Timeout, connection failure or an unreadable server error.
    #[error("gateway unavailable: {0}")]
    Unavailable(String),

    /// The voucher has already been redeemed.
    #[error("voucher already redeemed ({code})")]
    AlreadyRedeemed {
        /// Gateway status code.
        code: String,
    },

    /// The voucher is unknown or expired.
    #[error("voucher invalid ({code})")]
    InvalidVoucher {
        /// Gateway status code.
        code: String,
    },

    /// Any other non-success outcome.
    #[error("TrueMoney API error: {code} - {message}")]
    Rejected {
        /// Gateway status code.
        code: String,
        /// Gateway message.
        message: String,
    },

    /// The gateway reported success with an unusable amount.
    #[error("invalid amount: {0:?}")]
    InvalidAmount(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl GatewayError {
    /// Gateway status code, if the gateway produced one.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::AlreadyRedeemed { code }
            | Self::InvalidVoucher { code }
            | Self::Rejected { code, .. } => Some(code),
            _ => None,
        }
    }
}

/// TrueMoney voucher API client.
#[derive(Debug, Clone)]
pub struct TrueMoneyClient {
    client: Client,
    base_url: String,
    mobile: String,
}

impl TrueMoneyClient {
    /// Create a new TrueMoney client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Gateway base URL (e.g., `"https://gift.truemoney.com"`)
    /// * `mobile` - Receiving wallet mobile number
    /// * `timeout` - Bound on each redemption call
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Configuration` if the HTTP client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        mobile: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Configuration(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            mobile: mobile.into(),
        })
    }

    /// Redeem a voucher into the configured wallet.
    ///
    /// # Errors
    ///
    /// See [`GatewayError`] for the outcome mapping.
    pub async fn redeem(&self, voucher: &VoucherCode) -> Result<Redemption, GatewayError> {
        let url = format!(
            "{}/campaign/vouchers/{}/redeem",
            self.base_url,
            voucher.as_str()
        );
        let request = RedeemRequest {
            mobile: &self.mobile,
            voucher_hash: voucher.as_str(),
        };

        tracing::debug!(voucher_code = %voucher, "Redeeming TrueMoney voucher");

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| GatewayError::Unavailable(e.to_string()))?;

        let status = response.status();
        // A failing gateway says nothing about the voucher, whatever its body holds.
        if status.is_server_error() {
            return Err(GatewayError::Unavailable(format!("HTTP {status}")));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| GatewayError::Unavailable(e.to_string()))?;

        let parsed: RedeemResponse = match serde_json::from_slice(&body) {
            Ok(parsed) => parsed,
            Err(e) => {
                return Err(GatewayError::Rejected {
                    code: format!("HTTP_{}", status.as_u16()),
                    message: format!("unreadable gateway response: {e}"),
                });
            }
        };

        Self::interpret(parsed)
    }

    /// Map a parsed gateway answer onto an outcome.
    fn interpret(response: RedeemResponse) -> Result<Redemption, GatewayError> {
        let code = response.status.code;

        if code != codes::SUCCESS {
            return Err(if codes::ALREADY_REDEEMED.contains(&code.as_str()) {
                GatewayError::AlreadyRedeemed { code }
            } else if codes::INVALID_VOUCHER.contains(&code.as_str()) {
                GatewayError::InvalidVoucher { code }
            } else {
                GatewayError::Rejected {
                    code,
                    message: response.status.message,
                }
            });
        }

        let raw = response
            .data
            .and_then(|d| d.my_ticket)
            .map(|t| t.amount_baht)
            .unwrap_or_default();

        match parse_amount_cents(&raw) {
            Some(amount_cents) if amount_cents > 0 => Ok(Redemption { amount_cents }),
            _ => Err(GatewayError::InvalidAmount(raw)),
        }
    }
}
