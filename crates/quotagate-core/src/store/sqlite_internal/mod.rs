//! Connection-level helpers for `store::sqlite`.
//!
//! Everything here takes a borrowed `Connection` and never opens its own
//! transaction; `SqliteStore` decides the transaction boundaries.

pub(crate) mod ops;
pub(crate) mod rows;

#[cfg(test)]
mod tests;

use super::super::{CredentialStore, StoreError};
use crate::counter::{ConsumeOutcome, QuotaCounter};
use crate::credential::{Credential, CredentialHash, Quota};
use crate::window::WindowKey;
use chrono::{DateTime, Utc};
use rusqlite::Connection;

/// Store and counter view over a connection already inside a transaction.
pub(crate) struct TxnView<'a>(pub(crate) &'a Connection);

impl CredentialStore for TxnView<'_> {
    fn find_by_hash(&self, hash: &CredentialHash) -> Result<Option<Credential>, StoreError> {
        ops::find_by_hash(self.0, hash)
    }

    fn touch_last_used(&self, id: &str, now: DateTime<Utc>) -> Result<(), StoreError> {
        ops::touch_last_used(self.0, id, now)
    }
}

impl QuotaCounter for TxnView<'_> {
    fn consume(
        &self,
        credential_id: &str,
        key: &WindowKey,
        quota: Quota,
        now: DateTime<Utc>,
    ) -> Result<ConsumeOutcome, StoreError> {
        ops::consume(self.0, credential_id, key, quota, now)
    }

    fn current(&self, credential_id: &str, key: &WindowKey) -> Result<u64, StoreError> {
        ops::current(self.0, credential_id, key)
    }
}
