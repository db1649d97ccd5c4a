//! Service configuration.

use serde::Deserialize;
use std::path::Path;
use std::str::FromStr;

use keyshop_core::PricingConfig;

/// Service configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Address to listen on (default: "0.0.0.0:8080").
    pub listen_addr: String,

    /// Path to `RocksDB` data directory (default: "/data/keyshop").
    pub data_dir: String,

    /// HS256 secret shared with the auth provider. Without it every user request is
    /// rejected.
    pub auth_jwt_secret: Option<String>,

    /// Expected JWT audience (default: "authenticated").
    pub auth_audience: String,

    /// Operator key accepted in the `x-admin-key` header.
    pub admin_api_key: Option<String>,

    /// TrueMoney gateway base URL (optional).
    pub truemoney_api_url: Option<String>,

    /// Receiving wallet mobile number sent with every redemption.
    pub truemoney_mobile: Option<String>,

    /// Gateway call timeout in seconds (default: 10).
    pub gateway_timeout_seconds: u64,

    /// Notification sink URL (optional).
    pub notify_webhook_url: Option<String>,

    /// Secret used to sign outgoing notifications (optional).
    pub notify_webhook_secret: Option<String>,

    /// Delivery attempts before a notification is dead-lettered (default: 5).
    pub notify_max_attempts: u32,

    /// Initial delay between delivery attempts in milliseconds (default: 500).
    pub notify_backoff_ms: u64,

    /// Base URL of the upstream deployment keys are synced from (optional).
    pub upstream_url: Option<String>,

    /// Operator key for the upstream deployment.
    pub upstream_admin_key: Option<String>,

    /// CORS allowed origins.
    pub cors_origins: Vec<String>,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,

    /// Request timeout in seconds.
    pub request_timeout_seconds: u64,

    /// Pricing configuration.
    pub pricing: PricingConfig,
}

/// TrueMoney secrets file structure.
#[derive(Debug, Deserialize)]
struct TrueMoneySecrets {
    api_url: String,
    mobile: String,
}

/// Auth secrets file structure.
#[derive(Debug, Deserialize)]
struct AuthSecrets {
    jwt_secret: String,
    #[serde(default)]
    admin_api_key: Option<String>,
}

impl ServiceConfig {
    /// Load configuration from environment variables and secrets files.
    #[must_use]
    pub fn from_env() -> Self {
        // Secrets files take precedence over env vars
        let (truemoney_api_url, truemoney_mobile) = load_truemoney_secrets();
        let (auth_jwt_secret, admin_api_key) = load_auth_secrets();

        let defaults = Self::default();

        Self {
            listen_addr: std::env::var("LISTEN_ADDR").unwrap_or(defaults.listen_addr),
            data_dir: std::env::var("DATA_DIR").unwrap_or(defaults.data_dir),
            auth_jwt_secret,
            auth_audience: std::env::var("AUTH_AUDIENCE").unwrap_or(defaults.auth_audience),
            admin_api_key,
            truemoney_api_url,
            truemoney_mobile,
            gateway_timeout_seconds: env_parse(
                "GATEWAY_TIMEOUT_SECONDS",
                defaults.gateway_timeout_seconds,
            ),
            notify_webhook_url: std::env::var("NOTIFY_WEBHOOK_URL").ok(),
            notify_webhook_secret: std::env::var("NOTIFY_WEBHOOK_SECRET").ok(),
            notify_max_attempts: env_parse("NOTIFY_MAX_ATTEMPTS", defaults.notify_max_attempts),
            notify_backoff_ms: env_parse("NOTIFY_BACKOFF_MS", defaults.notify_backoff_ms),
            upstream_url: std::env::var("UPSTREAM_URL").ok(),
            upstream_admin_key: std::env::var("UPSTREAM_ADMIN_KEY").ok(),
            cors_origins: std::env::var("CORS_ORIGINS")
                .map(|s| split_list(&s))
                .unwrap_or(defaults.cors_origins),
            max_body_bytes: env_parse("MAX_BODY_BYTES", defaults.max_body_bytes),
            request_timeout_seconds: env_parse(
                "REQUEST_TIMEOUT_SECONDS",
                defaults.request_timeout_seconds,
            ),
            pricing: PricingConfig {
                key_price_cents: parse_key_price(
                    std::env::var("KEY_PRICE_CENTS").ok().as_deref(),
                    defaults.pricing.key_price_cents,
                ),
                maps: std::env::var("KEY_MAPS")
                    .map(|s| split_list(&s))
                    .unwrap_or_default(),
            },
        }
    }
}

/// Parse an environment variable, falling back to `default` when unset or invalid.
fn env_parse<T: FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

/// Parse the key price. Anything but a positive integer falls back to `default`.
fn parse_key_price(value: Option<&str>, default: i64) -> i64 {
    let Some(raw) = value else {
        return default;
    };
    match raw.trim().parse::<i64>() {
        Ok(price) if price > 0 => price,
        _ => {
            tracing::warn!(
                value = %raw,
                default,
                "KEY_PRICE_CENTS must be a positive integer, using default"
            );
            default
        }
    }
}

/// Split a comma separated list, dropping empty entries.
fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// Load TrueMoney settings from file or environment.
fn load_truemoney_secrets() -> (Option<String>, Option<String>) {
    let secret_paths = [".secrets/truemoney.json", "../.secrets/truemoney.json"];

    for path in &secret_paths {
        if let Ok(secrets) = load_secrets_file::<TrueMoneySecrets>(path) {
            tracing::info!(path = %path, "Loaded TrueMoney secrets from file");
            return (Some(secrets.api_url), Some(secrets.mobile));
        }
    }

    // Fall back to environment variables
    tracing::debug!("TrueMoney secrets file not found, using environment variables");
    (
        std::env::var("TRUEMONEY_API_URL").ok(),
        std::env::var("TRUEMONEY_MOBILE").ok(),
    )
}

/// Load auth secrets from file or environment.
fn load_auth_secrets() -> (Option<String>, Option<String>) {
    let secret_paths = [".secrets/auth.json", "../.secrets/auth.json"];

    for path in &secret_paths {
        if let Ok(secrets) = load_secrets_file::<AuthSecrets>(path) {
            tracing::info!(path = %path, "Loaded auth secrets from file");
            return (
                Some(secrets.jwt_secret),
                secrets
                    .admin_api_key
                    .or_else(|| std::env::var("ADMIN_API_KEY").ok()),
            );
        }
    }

    tracing::debug!("Auth secrets file not found, using environment variables");
    (
        std::env::var("AUTH_JWT_SECRET").ok(),
        std::env::var("ADMIN_API_KEY").ok(),
    )
}

/// Load secrets from a JSON file.
fn load_secrets_file<T: serde::de::DeserializeOwned>(path: &str) -> Result<T, std::io::Error> {
    let path = Path::new(path);
    if !path.exists() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "Secrets file not found",
        ));
    }
    let contents = std::fs::read_to_string(path)?;
    serde_json::from_str(&contents)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".into(),
            data_dir: "/data/keyshop".into(),
            auth_jwt_secret: None,
            auth_audience: "authenticated".into(),
            admin_api_key: None,
            truemoney_api_url: None,
            truemoney_mobile: None,
            gateway_timeout_seconds: 10,
            notify_webhook_url: None,
            notify_webhook_secret: None,
            notify_max_attempts: 5,
            notify_backoff_ms: 500,
            upstream_url: None,
            upstream_admin_key: None,
            cors_origins: vec!["*".into()],
            max_body_bytes: 64 * 1024,
            request_timeout_seconds: 30,
            pricing: PricingConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_list_trims_and_drops_empty() {
        assert_eq!(
            split_list(" forest, desert ,,snow "),
            vec!["forest", "desert", "snow"]
        );
        assert!(split_list("").is_empty());
    }

    #[test]
    fn key_price_must_be_positive() {
        assert_eq!(parse_key_price(None, 10_000), 10_000);
        assert_eq!(parse_key_price(Some(" 2500 "), 10_000), 2_500);
        assert_eq!(parse_key_price(Some("0"), 10_000), 10_000);
        assert_eq!(parse_key_price(Some("-10000"), 10_000), 10_000);
        assert_eq!(parse_key_price(Some("ten"), 10_000), 10_000);
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = ServiceConfig::default();
        assert_eq!(config.gateway_timeout_seconds, 10);
        assert_eq!(config.notify_max_attempts, 5);
        assert_eq!(config.pricing.key_price_cents, 10_000);
    }
}
