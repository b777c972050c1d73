//! Credential storage and the admission primitive exposed to the gateway.
//!
//! ```text
//! ┌───────────────────────┐  validate_and_consume(hash, now, deadline)  ┌────────────────────┐
//! │ AuthorizationGateway  │────────────────────────────────────────────▶│ AdmissionBackend   │
//! └───────────────────────┘                                             │  ├ CredentialStore │
//!                                                                       │  └ QuotaCounter    │
//!                                                                       └────────────────────┘
//! ```
//!
//! Both backends run the same fixed-order [`pipeline::evaluate`]. The SQLite
//! backend wraps it in one `BEGIN IMMEDIATE` transaction; the in-memory
//! backend relies on the per-window atomicity of its counter.

mod memory;
pub mod pipeline;
mod schema;
mod sqlite;

pub use memory::MemoryStore;
pub use schema::CREDENTIAL_SCHEMA;
pub use sqlite::SqliteStore;

use crate::credential::{
    Credential, CredentialHash, IssuedCredential, NewCredential, Quota, SecretGenerator,
};
use crate::decision::UsageDecision;
use crate::window::WindowKey;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Instant;
use thiserror::Error;

/// Storage errors.
///
/// [`StoreError::NotProvisioned`] is the only signature that may route a
/// request to the fallback key set; everything else fails closed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Credential store not provisioned: {0}")]
    NotProvisioned(String),

    #[error("Credential not found: {id}")]
    CredentialNotFound { id: String },

    #[error("A credential with this secret hash already exists")]
    DuplicateHash,

    #[error("Corrupt credential row: {0}")]
    Corrupt(String),

    #[error("Database error: {0}")]
    Database(String),

    /// The admission deadline passed before the chain could commit.
    #[error("Admission deadline elapsed; nothing was charged")]
    DeadlineElapsed,
}

impl StoreError {
    pub fn is_not_provisioned(&self) -> bool {
        matches!(self, Self::NotProvisioned(_))
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        let msg = e.to_string();
        if msg.contains("no such table") {
            StoreError::NotProvisioned(msg)
        } else {
            StoreError::Database(msg)
        }
    }
}

/// Outcome of a revocation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RevokeOutcome {
    Revoked,
    /// The credential was already revoked; nothing changed.
    AlreadyRevoked,
}

/// Read-only view of one window's usage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WindowUsage {
    pub bucket: String,
    pub count: u64,
    pub quota: Quota,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UsageSnapshot {
    pub credential_id: String,
    pub minute: WindowUsage,
    pub day: WindowUsage,
}

/// Lookup side of the registry. Lookups are by hash only.
pub trait CredentialStore {
    fn find_by_hash(&self, hash: &CredentialHash) -> Result<Option<Credential>, StoreError>;

    /// Called only after a request is fully admitted.
    fn touch_last_used(&self, id: &str, now: DateTime<Utc>) -> Result<(), StoreError>;
}

/// Administrative side of the registry: issuance, revocation, inspection.
pub trait CredentialAdmin {
    fn insert(&self, credential: &Credential) -> Result<(), StoreError>;

    /// Flip status to revoked. Never deletes, never reactivates.
    fn revoke(&self, id: &str, now: DateTime<Utc>) -> Result<RevokeOutcome, StoreError>;

    fn get(&self, id: &str) -> Result<Option<Credential>, StoreError>;

    fn list(&self) -> Result<Vec<Credential>, StoreError>;

    /// Current minute and day counts without charging either window.
    fn usage(&self, id: &str, now: DateTime<Utc>) -> Result<UsageSnapshot, StoreError>;

    /// Generate a secret, persist its hash and return the raw secret once.
    fn issue(
        &self,
        request: NewCredential,
        now: DateTime<Utc>,
    ) -> Result<IssuedCredential, StoreError> {
        let (secret, hash) = SecretGenerator::default().generate();
        let credential = request.into_credential(hash, now);
        self.insert(&credential)?;
        tracing::info!(
            event = "credential_issued",
            credential_id = %credential.id,
            tier = %credential.tier,
            fingerprint = %credential.key_hash.fingerprint()
        );
        Ok(IssuedCredential { credential, secret })
    }
}

/// The single primitive the gateway consumes: validate the credential,
/// conditionally charge both windows and report the reason, as one logical
/// unit.
///
/// A backend that cannot finish before `deadline` must not leave a charge
/// behind: the caller has already answered the request by then.
#[async_trait]
pub trait AdmissionBackend: Send + Sync {
    async fn validate_and_consume(
        &self,
        hash: &CredentialHash,
        now: DateTime<Utc>,
        deadline: Instant,
    ) -> Result<UsageDecision, StoreError>;
}

pub(crate) fn window_usage(key: WindowKey, count: u64, quota: Quota) -> WindowUsage {
    WindowUsage {
        bucket: key.bucket,
        count,
        quota,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_table_maps_to_not_provisioned() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        let err: StoreError = conn
            .query_row("SELECT id FROM credentials", [], |row| row.get::<_, String>(0))
            .unwrap_err()
            .into();
        assert!(err.is_not_provisioned(), "got {err:?}");
    }

    #[test]
    fn test_other_sqlite_errors_are_generic() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        let err: StoreError = conn.execute("NOT VALID SQL", []).unwrap_err().into();
        assert!(matches!(err, StoreError::Database(_)));
    }
}
