//! Outbox delivery to the notification webhook.
//!
//! Rows are enqueued by the store together with the mutation that triggers them. The
//! [`Notifier`] delivers them on spawned tasks with exponential backoff, recording every
//! attempt on the row, and dead-letters a row once its attempts are exhausted. A
//! delivery failure never reaches the request that enqueued the row.
//!
//! A deliverer first leases the row in the store and writes it back only while the
//! lease is still its own, so a replay never races a delivery that is already running.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use reqwest::Client;
use serde::Serialize;

use keyshop_core::{DeliveryStatus, Notification, NotificationEvent, NotificationId};
use keyshop_store::{Store, StoreError};

use crate::crypto::{sign_payload, SIGNATURE_HEADER};

/// Largest backoff exponent; caps the delay at 64x the base.
const MAX_BACKOFF_SHIFT: u32 = 6;

/// Per-request timeout for the sink.
const DELIVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Slack added to every delivery lease.
const LEASE_GRACE: Duration = Duration::from_secs(5);

/// Error type for notification delivery.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The sink answered with a non-success status.
    #[error("sink returned HTTP {0}")]
    Status(u16),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The outbox row could not be read or written.
    #[error("outbox error: {0}")]
    Store(#[from] StoreError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Configuration(String),
}

/// Webhook payload.
#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    id: NotificationId,
    content: String,
    #[serde(flatten)]
    event: &'a NotificationEvent,
}

/// Counts from an outbox replay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReplaySummary {
    /// Rows delivered during the replay.
    pub delivered: usize,
    /// Rows still undelivered after the replay.
    pub failed: usize,
    /// Rows skipped because another delivery holds them.
    pub in_flight: usize,
}

/// Outbox delivery settings.
#[derive(Debug, Clone)]
pub struct NotifierSettings {
    /// Sink URL.
    pub url: String,
    /// Optional signing secret.
    pub secret: Option<String>,
    /// Attempts before a row is dead-lettered.
    pub max_attempts: u32,
    /// Delay after the first failed attempt; doubles per attempt.
    pub backoff: Duration,
}

/// Delivers outbox rows to the webhook sink.
#[derive(Debug, Clone)]
pub struct Notifier {
    client: Client,
    settings: NotifierSettings,
}

impl Notifier {
    /// Create a new notifier.
    ///
    /// # Errors
    ///
    /// Returns `NotifyError::Configuration` if the HTTP client cannot be built.
    pub fn new(settings: NotifierSettings) -> Result<Self, NotifyError> {
        let client = Client::builder()
            .timeout(DELIVERY_TIMEOUT)
            .build()
            .map_err(|e| NotifyError::Configuration(e.to_string()))?;

        Ok(Self {
            client,
            settings: NotifierSettings {
                max_attempts: settings.max_attempts.max(1),
                ..settings
            },
        })
    }

    /// Deliver a row in the background.
    pub fn spawn(self: &Arc<Self>, store: Arc<dyn Store>, notification: Notification) {
        let notifier = Arc::clone(self);
        tokio::spawn(async move {
            let id = notification.id;
            if let Err(e) = notifier.deliver(store.as_ref(), &id, false).await {
                tracing::error!(notification_id = %id, error = %e, "Outbox delivery aborted");
            }
        });
    }

    /// Lease a row and deliver it, retrying with backoff until it is delivered or
    /// dead-lettered.
    ///
    /// Every attempt is recorded on the stored row. Returns `None` without sending when
    /// the row is not deliverable or another deliverer holds it; with `requeue` a
    /// dead-lettered row gets a fresh round of attempts.
    ///
    /// # Errors
    ///
    /// Returns `NotifyError::Store` if the row cannot be read or persisted.
    pub async fn deliver(
        &self,
        store: &dyn Store,
        id: &NotificationId,
        requeue: bool,
    ) -> Result<Option<DeliveryStatus>, NotifyError> {
        let Some(mut notification) = store.claim_notification(id, requeue, self.lease_ttl(0))?
        else {
            tracing::debug!(notification_id = %id, "Notification not claimable, skipping");
            return Ok(None);
        };
        let Some(token) = notification.lease_token() else {
            return Ok(None);
        };

        while notification.status == DeliveryStatus::Pending {
            match self.send(&notification).await {
                Ok(()) => {
                    notification.mark_delivered();
                    tracing::info!(
                        notification_id = %notification.id,
                        attempts = notification.attempts,
                        "Notification delivered"
                    );
                }
                Err(e) => {
                    notification.record_failure(e.to_string(), self.settings.max_attempts);
                    if notification.status == DeliveryStatus::DeadLettered {
                        tracing::error!(
                            notification_id = %notification.id,
                            attempts = notification.attempts,
                            error = %e,
                            "Notification dead-lettered"
                        );
                    } else {
                        tracing::warn!(
                            notification_id = %notification.id,
                            attempts = notification.attempts,
                            error = %e,
                            "Notification delivery failed, will retry"
                        );
                        notification.renew(self.lease_ttl(notification.attempts));
                    }
                }
            }

            if !store.settle_notification(&notification, &token)? {
                tracing::warn!(
                    notification_id = %notification.id,
                    "Delivery lease lost, leaving the row to its new holder"
                );
                return Ok(None);
            }

            if notification.status == DeliveryStatus::Pending {
                tokio::time::sleep(self.backoff(notification.attempts)).await;
            }
        }

        Ok(Some(notification.status))
    }

    /// Re-deliver every pending or dead-lettered row that no one is delivering.
    ///
    /// # Errors
    ///
    /// Returns `NotifyError::Store` if the outbox cannot be read.
    pub async fn replay(&self, store: &dyn Store) -> Result<ReplaySummary, NotifyError> {
        let rows = store.list_undelivered_notifications()?;
        if rows.is_empty() {
            return Ok(ReplaySummary::default());
        }

        tracing::info!(count = rows.len(), "Replaying outbox");

        let ids: Vec<NotificationId> = rows.iter().map(|row| row.id).collect();
        let deliveries = ids.iter().map(|id| self.deliver(store, id, true));

        let mut summary = ReplaySummary::default();
        for outcome in join_all(deliveries).await {
            match outcome {
                Ok(Some(DeliveryStatus::Delivered)) => summary.delivered += 1,
                Ok(Some(_)) => summary.failed += 1,
                Ok(None) => summary.in_flight += 1,
                Err(e) => {
                    tracing::error!(error = %e, "Outbox replay could not persist a row");
                    summary.failed += 1;
                }
            }
        }

        Ok(summary)
    }

    /// POST a single row to the sink.
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        let payload = WebhookPayload {
            id: notification.id,
            content: notification.event.summary(),
            event: &notification.event,
        };
        let body = serde_json::to_vec(&payload)?;

        let mut request = self
            .client
            .post(&self.settings.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json");

        if let Some(secret) = &self.settings.secret {
            let timestamp = chrono::Utc::now().timestamp();
            request = request.header(SIGNATURE_HEADER, sign_payload(secret, timestamp, &body));
        }

        let response = request.body(body).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Status(status.as_u16()));
        }
        Ok(())
    }

    /// How long a lease must last to cover the wait after `attempts` failures plus
    /// one send.
    fn lease_ttl(&self, attempts: u32) -> Duration {
        let wait = if attempts == 0 {
            Duration::ZERO
        } else {
            self.backoff(attempts)
        };
        wait + DELIVERY_TIMEOUT + LEASE_GRACE
    }

    /// Delay before the next attempt after `attempts` failures.
    fn backoff(&self, attempts: u32) -> Duration {
        let shift = attempts.saturating_sub(1).min(MAX_BACKOFF_SHIFT);
        self.settings.backoff.saturating_mul(1 << shift)
    }
}
