use super::super::super::StoreError;
use crate::credential::{Credential, CredentialHash, Quota};
use chrono::{DateTime, Utc};
use rusqlite::Row;

pub(crate) const CREDENTIAL_COLUMNS: &str = "id, name, key_hash, tier, status, daily_quota, \
     minute_quota, created_at, last_used_at, revoked_at";

/// Raw column values, converted after the row borrow ends.
pub(crate) struct CredentialRow {
    id: String,
    name: String,
    key_hash: String,
    tier: String,
    status: String,
    daily_quota: Option<i64>,
    minute_quota: Option<i64>,
    created_at: String,
    last_used_at: Option<String>,
    revoked_at: Option<String>,
}

impl CredentialRow {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            key_hash: row.get(2)?,
            tier: row.get(3)?,
            status: row.get(4)?,
            daily_quota: row.get(5)?,
            minute_quota: row.get(6)?,
            created_at: row.get(7)?,
            last_used_at: row.get(8)?,
            revoked_at: row.get(9)?,
        })
    }

    pub(crate) fn into_credential(self) -> Result<Credential, StoreError> {
        Ok(Credential {
            tier: self.tier.parse().map_err(StoreError::Corrupt)?,
            status: self.status.parse().map_err(StoreError::Corrupt)?,
            daily_quota: quota_from_sql(self.daily_quota)?,
            minute_quota: quota_from_sql(self.minute_quota)?,
            created_at: parse_ts(&self.created_at)?,
            last_used_at: self.last_used_at.as_deref().map(parse_ts).transpose()?,
            revoked_at: self.revoked_at.as_deref().map(parse_ts).transpose()?,
            key_hash: CredentialHash::from_stored(self.key_hash),
            id: self.id,
            name: self.name,
        })
    }
}

pub(crate) fn quota_to_sql(quota: Quota) -> Result<Option<i64>, StoreError> {
    quota
        .limit()
        .map(|q| {
            i64::try_from(q).map_err(|_| StoreError::Corrupt(format!("quota {q} out of range")))
        })
        .transpose()
}

pub(crate) fn quota_from_sql(v: Option<i64>) -> Result<Quota, StoreError> {
    match v {
        None => Ok(Quota::Unlimited),
        Some(q) => u64::try_from(q)
            .map(Quota::Limited)
            .map_err(|_| StoreError::Corrupt(format!("negative quota {q}"))),
    }
}

pub(crate) fn count_from_sql(v: i64) -> u64 {
    u64::try_from(v).unwrap_or(0)
}

pub(crate) fn parse_ts(s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("invalid timestamp '{s}': {e}")))
}
