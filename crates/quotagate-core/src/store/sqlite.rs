//! SqliteStore: SQLite-backed credential registry and window counters.
//!
//! Provides:
//! - Hash-only credential lookup
//! - Window charges as one conditional upsert (`ON CONFLICT ... WHERE count < quota`)
//! - The whole validate-and-charge chain inside a single `BEGIN IMMEDIATE`
//!   transaction, so concurrent connections to the same file serialize
//! - An admission deadline: the lock wait is capped by it, and a chain that
//!   finishes late is rolled back instead of committed
//!
//! `open` never creates tables. An opened but unprovisioned database is the
//! "not provisioned" signature the gateway may answer with fallback keys.

use super::schema::CREDENTIAL_SCHEMA;
use super::{
    pipeline, window_usage, AdmissionBackend, CredentialAdmin, CredentialStore, RevokeOutcome,
    StoreError, UsageSnapshot,
};
use crate::counter::{ConsumeOutcome, QuotaCounter};
use crate::credential::{Credential, CredentialHash, Quota};
use crate::decision::UsageDecision;
use crate::window::{Window, WindowClock, WindowKey};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

#[path = "sqlite_internal/mod.rs"]
mod sqlite_internal;

use sqlite_internal::{ops, TxnView};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite-backed credential store.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    clock: WindowClock,
}

impl SqliteStore {
    /// Open a file-backed store. Does not provision the schema.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// Create a provisioned in-memory store (for testing).
    pub fn memory() -> Result<Self, StoreError> {
        let store = Self::from_connection(Connection::open_in_memory()?)?;
        store.provision()?;
        Ok(store)
    }

    /// Wrap an existing connection. Does not provision the schema.
    pub fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        Self::init_connection(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            clock: WindowClock::default(),
        })
    }

    pub fn with_clock(mut self, clock: WindowClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn clock(&self) -> &WindowClock {
        &self.clock
    }

    fn init_connection(conn: &Connection) -> Result<(), StoreError> {
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        // WAL mode for file-backed DBs (no-op for in-memory)
        let _ = conn.execute("PRAGMA journal_mode = WAL", []);
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(())
    }

    /// Create tables and triggers. Idempotent.
    pub fn provision(&self) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute_batch(CREDENTIAL_SCHEMA)?;
        tracing::info!(event = "store_provisioned");
        Ok(())
    }

    pub fn is_provisioned(&self) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let tables: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master
             WHERE type = 'table' AND name IN ('credentials', 'usage_counters')",
            [],
            |row| row.get(0),
        )?;
        Ok(tables == 2)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Database("connection lock poisoned".to_string()))
    }

    /// Run `f` inside `BEGIN IMMEDIATE`, committing on success.
    fn immediate<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let conn = self.lock()?;
        Self::in_transaction(&conn, None, f)
    }

    /// Like [`Self::immediate`], but gives up once `deadline` has passed.
    ///
    /// The lock wait is capped at the time left, and work that completes
    /// after the deadline is rolled back.
    fn immediate_until<T>(
        &self,
        deadline: Instant,
        f: impl FnOnce(&Connection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let conn = self.lock()?;
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(StoreError::DeadlineElapsed);
        }

        conn.busy_timeout(remaining.min(BUSY_TIMEOUT))?;
        let result = Self::in_transaction(&conn, Some(deadline), f);
        if let Err(e) = conn.busy_timeout(BUSY_TIMEOUT) {
            tracing::warn!(event = "busy_timeout_restore_failed", error = %e);
        }
        result
    }

    fn in_transaction<T>(
        conn: &Connection,
        deadline: Option<Instant>,
        f: impl FnOnce(&Connection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        // BEGIN IMMEDIATE acquires the write lock up front
        conn.execute("BEGIN IMMEDIATE", [])?;

        let result = f(conn).and_then(|value| match deadline {
            Some(deadline) if Instant::now() >= deadline => Err(StoreError::DeadlineElapsed),
            _ => Ok(value),
        });

        match &result {
            Ok(_) => {
                if let Err(e) = conn.execute("COMMIT", []) {
                    // a failed COMMIT leaves the transaction open on this connection
                    let _ = conn.execute("ROLLBACK", []);
                    return Err(e.into());
                }
            }
            Err(_) => {
                let _ = conn.execute("ROLLBACK", []);
            }
        }

        result
    }

    /// Synchronous form of [`AdmissionBackend::validate_and_consume`],
    /// without a deadline.
    pub fn validate_and_consume_blocking(
        &self,
        hash: &CredentialHash,
        now: DateTime<Utc>,
    ) -> Result<UsageDecision, StoreError> {
        let clock = self.clock;
        self.immediate(|conn| {
            let view = TxnView(conn);
            pipeline::evaluate(&view, &view, &clock, hash, now)
        })
    }

    /// Synchronous form of [`AdmissionBackend::validate_and_consume`].
    pub fn validate_and_consume_until(
        &self,
        hash: &CredentialHash,
        now: DateTime<Utc>,
        deadline: Instant,
    ) -> Result<UsageDecision, StoreError> {
        let clock = self.clock;
        self.immediate_until(deadline, |conn| {
            let view = TxnView(conn);
            pipeline::evaluate(&view, &view, &clock, hash, now)
        })
    }
}

impl CredentialStore for SqliteStore {
    fn find_by_hash(&self, hash: &CredentialHash) -> Result<Option<Credential>, StoreError> {
        let conn = self.lock()?;
        ops::find_by_hash(&conn, hash)
    }

    fn touch_last_used(&self, id: &str, now: DateTime<Utc>) -> Result<(), StoreError> {
        let conn = self.lock()?;
        ops::touch_last_used(&conn, id, now)
    }
}

impl QuotaCounter for SqliteStore {
    fn consume(
        &self,
        credential_id: &str,
        key: &WindowKey,
        quota: Quota,
        now: DateTime<Utc>,
    ) -> Result<ConsumeOutcome, StoreError> {
        self.immediate(|conn| ops::consume(conn, credential_id, key, quota, now))
    }

    fn current(&self, credential_id: &str, key: &WindowKey) -> Result<u64, StoreError> {
        let conn = self.lock()?;
        ops::current(&conn, credential_id, key)
    }
}

impl CredentialAdmin for SqliteStore {
    fn insert(&self, credential: &Credential) -> Result<(), StoreError> {
        let conn = self.lock()?;
        ops::insert(&conn, credential)
    }

    fn revoke(&self, id: &str, now: DateTime<Utc>) -> Result<RevokeOutcome, StoreError> {
        let outcome = self.immediate(|conn| ops::revoke(conn, id, now))?;
        tracing::info!(event = "credential_revoked", credential_id = %id, outcome = ?outcome);
        Ok(outcome)
    }

    fn get(&self, id: &str) -> Result<Option<Credential>, StoreError> {
        let conn = self.lock()?;
        ops::get(&conn, id)
    }

    fn list(&self) -> Result<Vec<Credential>, StoreError> {
        let conn = self.lock()?;
        ops::list(&conn)
    }

    fn usage(&self, id: &str, now: DateTime<Utc>) -> Result<UsageSnapshot, StoreError> {
        let conn = self.lock()?;
        let credential = ops::get(&conn, id)?.ok_or_else(|| StoreError::CredentialNotFound {
            id: id.to_string(),
        })?;
        let minute_key = self.clock.key(Window::Minute, now);
        let day_key = self.clock.key(Window::Day, now);
        let minute = ops::current(&conn, id, &minute_key)?;
        let day = ops::current(&conn, id, &day_key)?;
        Ok(UsageSnapshot {
            credential_id: credential.id,
            minute: window_usage(minute_key, minute, credential.minute_quota),
            day: window_usage(day_key, day, credential.daily_quota),
        })
    }
}

#[async_trait]
impl AdmissionBackend for SqliteStore {
    async fn validate_and_consume(
        &self,
        hash: &CredentialHash,
        now: DateTime<Utc>,
        deadline: Instant,
    ) -> Result<UsageDecision, StoreError> {
        let store = self.clone();
        let hash = hash.clone();
        tokio::task::spawn_blocking(move || store.validate_and_consume_until(&hash, now, deadline))
            .await
            .map_err(|e| StoreError::Database(format!("admission task failed: {e}")))?
    }
}
