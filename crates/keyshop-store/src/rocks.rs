//! `RocksDB` storage implementation.
//!
//! This module provides the `RocksStore` implementation of the `Store` trait.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, Direction, IteratorMode,
    MultiThreaded, Options, WriteBatch,
};

use keyshop_core::{
    AuditAction, AuditLog, DeliveryStatus, Key, KeyId, KeyStatus, LeaseId, Notification,
    NotificationEvent, NotificationId, Transaction, TransactionId, UserBalance, UserId,
    VoucherCode,
};

use crate::error::{Result, StoreError};
use crate::keys;
use crate::schema::{all_column_families, cf};
use crate::{Claim, HwidReset, Store, Topup};

/// RocksDB-backed storage implementation.
pub struct RocksStore {
    db: Arc<DBWithThreadMode<MultiThreaded>>,
    /// Serialises read-check-write sequences so that compound operations behave as
    /// compare-and-swap against each other.
    write_lock: Mutex<()>,
}

impl RocksStore {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = DBWithThreadMode::open_cf_descriptors(&opts, path, cf_descriptors)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Mutex::new(()),
        })
    }

    /// Get a column family handle.
    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family not found: {name}")))
    }

    /// Take the store-wide write lock.
    fn lock(&self) -> Result<MutexGuard<'_, ()>> {
        self.write_lock
            .lock()
            .map_err(|_| StoreError::Database("write lock poisoned".into()))
    }

    /// Serialize a value using CBOR.
    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize a value from CBOR.
    fn deserialize<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
        ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn get_record<T: serde::de::DeserializeOwned>(
        &self,
        cf_name: &str,
        key: &[u8],
    ) -> Result<Option<T>> {
        let cf = self.cf(cf_name)?;
        self.db
            .get_cf(&cf, key)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    /// Collect all keys in a column family that start with `prefix`, in byte order.
    fn scan_keys(&self, cf_name: &str, prefix: &[u8]) -> Result<Vec<Vec<u8>>> {
        let cf = self.cf(cf_name)?;
        let mode = if prefix.is_empty() {
            IteratorMode::Start
        } else {
            IteratorMode::From(prefix, Direction::Forward)
        };

        let mut out = Vec::new();
        for item in self.db.iterator_cf(&cf, mode) {
            let (key, _) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            if !key.starts_with(prefix) {
                break;
            }
            out.push(key.to_vec());
        }
        Ok(out)
    }

    /// Load the records referenced by `user_id || ulid` index entries.
    fn load_indexed<T: serde::de::DeserializeOwned>(
        &self,
        index_cf: &str,
        record_cf: &str,
        user_id: &UserId,
    ) -> Result<Vec<T>> {
        let mut records = Vec::new();
        for key in self.scan_keys(index_cf, &keys::user_prefix(user_id))? {
            let Some(suffix) = keys::index_suffix(&key) else {
                tracing::warn!(index = index_cf, "Skipping malformed index entry");
                continue;
            };
            if let Some(record) = self.get_record(record_cf, &suffix)? {
                records.push(record);
            }
        }
        Ok(records)
    }

    fn write(&self, batch: WriteBatch) -> Result<()> {
        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    /// Stage a key record together with all of its index entries.
    fn stage_key(&self, batch: &mut WriteBatch, key: &Key) -> Result<()> {
        let cf_keys = self.cf(cf::KEYS)?;
        let cf_by_code = self.cf(cf::KEYS_BY_CODE)?;
        let cf_pending = self.cf(cf::PENDING_KEYS)?;
        let cf_by_owner = self.cf(cf::KEYS_BY_OWNER)?;

        let record_key = keys::key_key(&key.id);
        batch.put_cf(&cf_keys, &record_key, Self::serialize(key)?);
        batch.put_cf(&cf_by_code, keys::code_key(&key.code), &record_key);

        if key.status == KeyStatus::Pending && key.owner_id.is_none() {
            batch.put_cf(&cf_pending, &record_key, []);
        } else {
            batch.delete_cf(&cf_pending, &record_key);
        }

        if let Some(owner) = &key.owner_id {
            batch.put_cf(&cf_by_owner, keys::user_index_key(owner, key.id.to_bytes()), []);
        }
        Ok(())
    }

    fn stage_balance(&self, batch: &mut WriteBatch, balance: &UserBalance) -> Result<()> {
        let cf = self.cf(cf::BALANCES)?;
        batch.put_cf(
            &cf,
            keys::balance_key(&balance.user_id),
            Self::serialize(balance)?,
        );
        Ok(())
    }

    fn stage_transaction(&self, batch: &mut WriteBatch, transaction: &Transaction) -> Result<()> {
        let cf_tx = self.cf(cf::TRANSACTIONS)?;
        let cf_by_user = self.cf(cf::TRANSACTIONS_BY_USER)?;

        batch.put_cf(
            &cf_tx,
            keys::transaction_key(&transaction.id),
            Self::serialize(transaction)?,
        );
        batch.put_cf(
            &cf_by_user,
            keys::user_index_key(&transaction.user_id, transaction.id.to_bytes()),
            [],
        ); // Index entry (empty value)
        Ok(())
    }

    fn stage_audit_log(&self, batch: &mut WriteBatch, log: &AuditLog) -> Result<()> {
        let cf_logs = self.cf(cf::AUDIT_LOGS)?;
        let cf_by_user = self.cf(cf::AUDIT_LOGS_BY_USER)?;

        batch.put_cf(&cf_logs, keys::audit_log_key(&log.id), Self::serialize(log)?);
        batch.put_cf(
            &cf_by_user,
            keys::user_index_key(&log.user_id, log.id.to_bytes()),
            [],
        );
        Ok(())
    }

    fn stage_notification(&self, batch: &mut WriteBatch, notification: &Notification) -> Result<()> {
        let cf = self.cf(cf::OUTBOX)?;
        batch.put_cf(
            &cf,
            keys::notification_key(&notification.id),
            Self::serialize(notification)?,
        );
        Ok(())
    }

    /// Clear the binding of each key and stage it, plus one outbox row per key.
    fn stage_resets(&self, batch: &mut WriteBatch, keys: Vec<Key>, notify: bool) -> Result<HwidReset> {
        let mut outcome = HwidReset::default();
        for mut key in keys {
            key.reset_hwid();
            self.stage_key(batch, &key)?;

            if notify {
                if let Some(owner) = key.owner_id {
                    let notification = Notification::new(NotificationEvent::HwidReset {
                        user_id: owner,
                        key_id: key.id,
                    });
                    self.stage_notification(batch, &notification)?;
                    outcome.notifications.push(notification);
                }
            }
            outcome.keys.push(key);
        }
        Ok(outcome)
    }
}

impl Store for RocksStore {
    // =========================================================================
    // Key Operations
    // =========================================================================

    fn insert_key(&self, key: &Key) -> Result<bool> {
        let _guard = self.lock()?;

        if self.get_key_by_code(&key.code)?.is_some() {
            return Ok(false);
        }

        let mut batch = WriteBatch::default();
        self.stage_key(&mut batch, key)?;
        self.write(batch)?;
        Ok(true)
    }

    fn get_key(&self, key_id: &KeyId) -> Result<Option<Key>> {
        self.get_record(cf::KEYS, &keys::key_key(key_id))
    }

    fn get_key_by_code(&self, code: &str) -> Result<Option<Key>> {
        let cf = self.cf(cf::KEYS_BY_CODE)?;
        let Some(id_bytes) = self
            .db
            .get_cf(&cf, keys::code_key(code))
            .map_err(|e| StoreError::Database(e.to_string()))?
        else {
            return Ok(None);
        };

        let bytes = keys::ulid_bytes(&id_bytes)
            .ok_or_else(|| StoreError::Serialization("malformed code index entry".into()))?;
        self.get_key(&KeyId::from_bytes(bytes))
    }

    fn list_keys_by_owner(&self, owner: &UserId) -> Result<Vec<Key>> {
        self.load_indexed(cf::KEYS_BY_OWNER, cf::KEYS, owner)
    }

    fn list_pending_keys(&self) -> Result<Vec<Key>> {
        let mut out = Vec::new();
        for key in self.scan_keys(cf::PENDING_KEYS, &[])? {
            if let Some(record) = self.get_record::<Key>(cf::KEYS, &key)? {
                out.push(record);
            }
        }
        Ok(out)
    }

    // =========================================================================
    // Balance and Ledger Operations
    // =========================================================================

    fn get_balance(&self, user_id: &UserId) -> Result<Option<UserBalance>> {
        self.get_record(cf::BALANCES, &keys::balance_key(user_id))
    }

    fn get_transaction(&self, transaction_id: &TransactionId) -> Result<Option<Transaction>> {
        self.get_record(cf::TRANSACTIONS, &keys::transaction_key(transaction_id))
    }

    fn list_transactions_by_user(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Transaction>> {
        // ULIDs are time-ordered, so reversing the index scan gives newest first
        let mut index_keys = self.scan_keys(cf::TRANSACTIONS_BY_USER, &keys::user_prefix(user_id))?;
        index_keys.reverse();

        let mut transactions = Vec::new();
        for key in index_keys.into_iter().skip(offset).take(limit) {
            let Some(suffix) = keys::index_suffix(&key) else {
                continue;
            };
            if let Some(tx) = self.get_transaction(&TransactionId::from_bytes(suffix))? {
                transactions.push(tx);
            }
        }

        Ok(transactions)
    }

    // =========================================================================
    // Audit Operations
    // =========================================================================

    fn put_audit_log(&self, log: &AuditLog) -> Result<()> {
        let mut batch = WriteBatch::default();
        self.stage_audit_log(&mut batch, log)?;
        self.write(batch)
    }

    fn list_audit_logs_by_user(&self, user_id: &UserId) -> Result<Vec<AuditLog>> {
        self.load_indexed(cf::AUDIT_LOGS_BY_USER, cf::AUDIT_LOGS, user_id)
    }

    // =========================================================================
    // Outbox Operations
    // =========================================================================

    fn get_notification(&self, id: &NotificationId) -> Result<Option<Notification>> {
        self.get_record(cf::OUTBOX, &keys::notification_key(id))
    }

    fn put_notification(&self, notification: &Notification) -> Result<()> {
        let mut batch = WriteBatch::default();
        self.stage_notification(&mut batch, notification)?;
        self.write(batch)
    }

    fn list_undelivered_notifications(&self) -> Result<Vec<Notification>> {
        let mut out = Vec::new();
        for key in self.scan_keys(cf::OUTBOX, &[])? {
            if let Some(notification) = self.get_record::<Notification>(cf::OUTBOX, &key)? {
                if notification.status != DeliveryStatus::Delivered {
                    out.push(notification);
                }
            }
        }
        Ok(out)
    }

    fn claim_notification(
        &self,
        id: &NotificationId,
        requeue: bool,
        ttl: Duration,
    ) -> Result<Option<Notification>> {
        let _guard = self.lock()?;

        let Some(mut notification) = self.get_notification(id)? else {
            return Ok(None);
        };
        if notification.is_leased() {
            return Ok(None);
        }
        if requeue {
            notification.requeue();
        }
        if notification.status != DeliveryStatus::Pending {
            return Ok(None);
        }

        notification.acquire(ttl);
        let mut batch = WriteBatch::default();
        self.stage_notification(&mut batch, &notification)?;
        self.write(batch)?;

        Ok(Some(notification))
    }

    fn settle_notification(&self, notification: &Notification, token: &LeaseId) -> Result<bool> {
        let _guard = self.lock()?;

        let held = self
            .get_notification(&notification.id)?
            .and_then(|stored| stored.lease_token())
            .is_some_and(|current| current == *token);
        if !held {
            return Ok(false);
        }

        let mut batch = WriteBatch::default();
        self.stage_notification(&mut batch, notification)?;
        self.write(batch)?;
        Ok(true)
    }

    // =========================================================================
    // Compound Operations
    // =========================================================================

    fn activate_key(&self, code: &str, owner: &UserId) -> Result<Key> {
        let _guard = self.lock()?;

        let mut key = self.get_key_by_code(code)?.ok_or(StoreError::NotFound)?;
        // Wrong owner and wrong status are indistinguishable from a missing key
        key.activate(owner).map_err(|_| StoreError::NotFound)?;

        let mut batch = WriteBatch::default();
        self.stage_key(&mut batch, &key)?;
        self.write(batch)?;

        Ok(key)
    }

    fn claim_key(&self, map_name: &str, owner: &UserId, price_cents: i64) -> Result<Claim> {
        if price_cents <= 0 {
            return Err(StoreError::Domain(format!(
                "key price must be positive, got {price_cents}"
            )));
        }

        let _guard = self.lock()?;

        // Check balance before touching any key
        let mut balance = self
            .get_balance(owner)?
            .unwrap_or_else(|| UserBalance::empty(*owner));
        if balance.balance_cents < price_cents {
            return Err(StoreError::InsufficientBalance {
                balance: balance.balance_cents,
                required: price_cents,
            });
        }

        // Oldest matching stock wins
        let mut key = self
            .list_pending_keys()?
            .into_iter()
            .find(|k| k.is_claimable_for(map_name))
            .ok_or_else(|| StoreError::NoStock {
                map: map_name.to_string(),
            })?;

        key.claim(*owner, map_name)?;
        let balance_cents = balance.debit(price_cents)?;
        let transaction = Transaction::purchase(*owner, price_cents, balance_cents, key.id, map_name);

        // Write atomically
        let mut batch = WriteBatch::default();
        self.stage_key(&mut batch, &key)?;
        self.stage_balance(&mut batch, &balance)?;
        self.stage_transaction(&mut batch, &transaction)?;
        self.write(batch)?;

        Ok(Claim {
            key,
            transaction,
            balance_cents,
        })
    }

    fn bind_hwid(&self, code: &str, hwid: &str) -> Result<(Key, bool)> {
        let _guard = self.lock()?;

        let mut key = self.get_key_by_code(code)?.ok_or(StoreError::NotFound)?;
        if key.status != KeyStatus::Active {
            return Err(StoreError::NotFound);
        }

        let bound = key.bind_hwid(hwid)?;
        if bound {
            let mut batch = WriteBatch::default();
            self.stage_key(&mut batch, &key)?;
            self.write(batch)?;
        }

        Ok((key, bound))
    }

    fn reset_hwid(&self, key_id: &KeyId, owner: &UserId, notify: bool) -> Result<HwidReset> {
        let _guard = self.lock()?;

        let key = self
            .get_key(key_id)?
            .filter(|k| k.owner_id.as_ref() == Some(owner))
            .ok_or(StoreError::NotFound)?;

        let mut batch = WriteBatch::default();
        let outcome = self.stage_resets(&mut batch, vec![key], notify)?;
        self.write(batch)?;

        Ok(outcome)
    }

    fn reset_hwids_for_owner(&self, owner: &UserId, notify: bool) -> Result<HwidReset> {
        let _guard = self.lock()?;

        let owned = self.list_keys_by_owner(owner)?;
        if owned.is_empty() {
            return Err(StoreError::NotFound);
        }

        let mut batch = WriteBatch::default();
        let outcome = self.stage_resets(&mut batch, owned, notify)?;
        self.write(batch)?;

        Ok(outcome)
    }

    fn credit_topup(
        &self,
        user_id: &UserId,
        amount_cents: i64,
        voucher: &VoucherCode,
        notify: bool,
    ) -> Result<Topup> {
        let _guard = self.lock()?;

        let mut balance = self
            .get_balance(user_id)?
            .unwrap_or_else(|| UserBalance::empty(*user_id));
        let balance_cents = balance.credit(amount_cents)?;

        let transaction = Transaction::topup(*user_id, amount_cents, balance_cents, voucher.as_str());
        let log = AuditLog::new(
            *user_id,
            AuditAction::TopupSuccess,
            serde_json::json!({
                "voucher_code": voucher.as_str(),
                "amount_cents": amount_cents,
                "balance_after_cents": balance_cents,
                "transaction_id": transaction.id.to_string(),
            }),
        );
        let notification = notify.then(|| {
            Notification::new(NotificationEvent::TopupSuccess {
                user_id: *user_id,
                amount_cents,
                voucher_code: voucher.to_string(),
            })
        });

        // Write atomically
        let mut batch = WriteBatch::default();
        self.stage_balance(&mut batch, &balance)?;
        self.stage_transaction(&mut batch, &transaction)?;
        self.stage_audit_log(&mut batch, &log)?;
        if let Some(notification) = &notification {
            self.stage_notification(&mut batch, notification)?;
        }
        self.write(batch)?;

        Ok(Topup {
            transaction,
            log,
            notification,
            balance_cents,
        })
    }
}
