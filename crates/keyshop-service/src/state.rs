//! Application state.

use std::sync::Arc;
use std::time::Duration;

use keyshop_core::Notification;
use keyshop_store::Store;

use crate::config::ServiceConfig;
use crate::notify::{Notifier, NotifierSettings};
use crate::sync::{HttpKeySource, KeySource};
use crate::truemoney::TrueMoneyClient;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// The storage backend.
    pub store: Arc<dyn Store>,

    /// Service configuration.
    pub config: ServiceConfig,

    /// TrueMoney client for voucher top-ups (optional).
    pub gateway: Option<Arc<TrueMoneyClient>>,

    /// Outbox notifier (optional).
    pub notifier: Option<Arc<Notifier>>,

    /// Upstream key source for sync (optional).
    pub upstream: Option<Arc<dyn KeySource>>,
}

impl AppState {
    /// Create a new application state, building every configured client.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, config: ServiceConfig) -> Self {
        let timeout = Duration::from_secs(config.gateway_timeout_seconds);

        // Create TrueMoney client if configured
        let gateway = config
            .truemoney_api_url
            .as_ref()
            .zip(config.truemoney_mobile.as_ref())
            .and_then(|(url, mobile)| match TrueMoneyClient::new(url, mobile, timeout) {
                Ok(client) => {
                    tracing::info!(truemoney_url = %url, "TrueMoney integration enabled");
                    Some(Arc::new(client))
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to create TrueMoney client");
                    None
                }
            });

        if gateway.is_none() {
            tracing::warn!("TrueMoney not configured - top-ups will be rejected");
        }

        // Create notifier if configured
        let notifier = config.notify_webhook_url.as_ref().and_then(|url| {
            let settings = NotifierSettings {
                url: url.clone(),
                secret: config.notify_webhook_secret.clone(),
                max_attempts: config.notify_max_attempts,
                backoff: Duration::from_millis(config.notify_backoff_ms),
            };
            match Notifier::new(settings) {
                Ok(notifier) => {
                    tracing::info!("Notification webhook enabled");
                    Some(Arc::new(notifier))
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to create notifier");
                    None
                }
            }
        });

        if notifier.is_none() {
            tracing::warn!("Notification webhook not configured - events will not be sent");
        }

        // Create upstream key source if configured
        let upstream = config
            .upstream_url
            .as_ref()
            .zip(config.upstream_admin_key.as_ref())
            .and_then(|(url, key)| match HttpKeySource::new(url, key, timeout) {
                Ok(source) => {
                    tracing::info!(upstream_url = %url, "Upstream key sync enabled");
                    Some(Arc::new(source) as Arc<dyn KeySource>)
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to create upstream client");
                    None
                }
            });

        Self {
            store,
            config,
            gateway,
            notifier,
            upstream,
        }
    }

    /// Replace the upstream key source.
    #[must_use]
    pub fn with_upstream(mut self, upstream: Arc<dyn KeySource>) -> Self {
        self.upstream = Some(upstream);
        self
    }

    /// Whether outbox rows should be enqueued.
    #[must_use]
    pub fn has_notifier(&self) -> bool {
        self.notifier.is_some()
    }

    /// Hand freshly enqueued outbox rows to the notifier.
    pub fn dispatch(&self, notifications: impl IntoIterator<Item = Notification>) {
        if let Some(notifier) = &self.notifier {
            for notification in notifications {
                notifier.spawn(Arc::clone(&self.store), notification);
            }
        }
    }
}
