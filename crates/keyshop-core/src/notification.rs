//! Outbox notifications.
//!
//! Notifications are written to the outbox in the same batch as the mutation that
//! triggers them and delivered to the webhook sink later, with retries.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{KeyId, LeaseId, NotificationId, UserId};

/// An event worth telling the operators about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum NotificationEvent {
    /// A voucher was redeemed and the balance credited.
    TopupSuccess {
        /// The credited user.
        user_id: UserId,
        /// Credited amount in minor units.
        amount_cents: i64,
        /// The redeemed voucher.
        voucher_code: String,
    },
    /// A key's hardware binding was cleared.
    HwidReset {
        /// The key owner.
        user_id: UserId,
        /// The reset key.
        key_id: KeyId,
    },
}

impl NotificationEvent {
    /// One-line human summary, used as the webhook `content` field.
    #[must_use]
    pub fn summary(&self) -> String {
        match self {
            Self::TopupSuccess {
                user_id,
                amount_cents,
                ..
            } => format!(
                "User {user_id} topped up {}",
                crate::balance::format_amount(*amount_cents)
            ),
            Self::HwidReset { user_id, key_id } => {
                format!("User {user_id} reset HWID of key {key_id}")
            }
        }
    }
}

/// Delivery state of an outbox row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    /// Waiting for (re)delivery.
    Pending,
    /// Accepted by the sink.
    Delivered,
    /// Gave up after the configured number of attempts.
    DeadLettered,
}

/// Exclusive right to deliver a row until `expires_at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    /// Identifies the holder; only the holder may write the row back.
    pub token: LeaseId,
    /// When another deliverer may take the row over.
    pub expires_at: DateTime<Utc>,
}

/// An outbox row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Row identifier.
    pub id: NotificationId,

    /// The event to deliver.
    pub event: NotificationEvent,

    /// Delivery state.
    pub status: DeliveryStatus,

    /// Number of delivery attempts so far.
    pub attempts: u32,

    /// Error from the most recent failed attempt.
    pub last_error: Option<String>,

    /// Delivery lease, held while a deliverer owns the row.
    #[serde(default)]
    pub lease: Option<Lease>,

    /// When the row was enqueued.
    pub created_at: DateTime<Utc>,

    /// When the row last changed.
    pub updated_at: DateTime<Utc>,
}

impl Notification {
    /// Create a pending notification.
    #[must_use]
    pub fn new(event: NotificationEvent) -> Self {
        let now = Utc::now();
        Self {
            id: NotificationId::generate(),
            event,
            status: DeliveryStatus::Pending,
            attempts: 0,
            last_error: None,
            lease: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Record a failed attempt, dead-lettering once `max_attempts` is reached.
    pub fn record_failure(&mut self, error: impl Into<String>, max_attempts: u32) {
        self.attempts += 1;
        self.last_error = Some(error.into());
        if self.attempts >= max_attempts {
            self.status = DeliveryStatus::DeadLettered;
            self.lease = None;
        }
        self.updated_at = Utc::now();
    }

    /// Record a successful delivery.
    pub fn mark_delivered(&mut self) {
        self.attempts += 1;
        self.status = DeliveryStatus::Delivered;
        self.last_error = None;
        self.lease = None;
        self.updated_at = Utc::now();
    }

    /// Put a dead-lettered row back in the queue for a fresh round of attempts.
    pub fn requeue(&mut self) {
        if self.status == DeliveryStatus::DeadLettered {
            self.status = DeliveryStatus::Pending;
            self.attempts = 0;
            self.updated_at = Utc::now();
        }
    }

    /// Whether a deliverer holds an unexpired lease.
    #[must_use]
    pub fn is_leased(&self) -> bool {
        self.is_leased_at(Utc::now())
    }

    /// Whether a deliverer holds a lease that is still valid at `now`.
    #[must_use]
    pub fn is_leased_at(&self, now: DateTime<Utc>) -> bool {
        self.lease.is_some_and(|l| l.expires_at > now)
    }

    /// Take a fresh lease lasting `ttl` and return its token.
    pub fn acquire(&mut self, ttl: Duration) -> LeaseId {
        let token = LeaseId::generate();
        self.lease = Some(Lease {
            token,
            expires_at: lease_expiry(ttl),
        });
        token
    }

    /// Extend the current lease to `ttl` from now. No-op without a lease.
    pub fn renew(&mut self, ttl: Duration) {
        if let Some(lease) = self.lease.as_mut() {
            lease.expires_at = lease_expiry(ttl);
        }
    }

    /// Token of the current lease, if any.
    #[must_use]
    pub fn lease_token(&self) -> Option<LeaseId> {
        self.lease.map(|l| l.token)
    }
}

fn lease_expiry(ttl: Duration) -> DateTime<Utc> {
    let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(365));
    Utc::now()
        .checked_add_signed(ttl)
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topup() -> Notification {
        Notification::new(NotificationEvent::TopupSuccess {
            user_id: UserId::generate(),
            amount_cents: 5_000,
            voucher_code: "ABCDEFGHIJ12345678".into(),
        })
    }

    #[test]
    fn failures_dead_letter_at_limit() {
        let mut n = topup();
        n.record_failure("503", 2);
        assert_eq!(n.status, DeliveryStatus::Pending);
        n.record_failure("503", 2);
        assert_eq!(n.status, DeliveryStatus::DeadLettered);
        assert_eq!(n.attempts, 2);
        assert_eq!(n.last_error.as_deref(), Some("503"));

        n.requeue();
        assert_eq!(n.status, DeliveryStatus::Pending);
        assert_eq!(n.attempts, 0);
    }

    #[test]
    fn lease_blocks_until_expiry_and_clears_on_settle() {
        let mut n = topup();
        assert!(!n.is_leased());

        let token = n.acquire(Duration::from_secs(60));
        assert_eq!(n.lease_token(), Some(token));
        assert!(n.is_leased());
        assert!(!n.is_leased_at(Utc::now() + chrono::Duration::seconds(61)));

        n.mark_delivered();
        assert!(n.lease.is_none());
    }

    #[test]
    fn dead_lettering_releases_lease() {
        let mut n = topup();
        n.acquire(Duration::from_secs(60));
        n.record_failure("503", 2);
        assert!(n.lease.is_some());
        n.record_failure("503", 2);
        assert_eq!(n.status, DeliveryStatus::DeadLettered);
        assert!(n.lease.is_none());
    }

    #[test]
    fn event_is_tagged() {
        let json = serde_json::to_value(&topup().event).unwrap();
        assert_eq!(json["event"], "topup_success");
        assert_eq!(json["amount_cents"], 5_000);
    }

    #[test]
    fn summary_formats_amount() {
        assert!(topup().event.summary().ends_with("topped up 50.00"));
    }
}
