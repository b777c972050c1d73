use super::super::super::{RevokeOutcome, StoreError};
use super::rows::{count_from_sql, quota_to_sql, CredentialRow, CREDENTIAL_COLUMNS};
use crate::counter::ConsumeOutcome;
use crate::credential::{Credential, CredentialHash, Quota};
use crate::window::WindowKey;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

pub(crate) fn find_by_hash(
    conn: &Connection,
    hash: &CredentialHash,
) -> Result<Option<Credential>, StoreError> {
    let row = conn
        .query_row(
            &format!("SELECT {CREDENTIAL_COLUMNS} FROM credentials WHERE key_hash = ?1"),
            [hash.as_str()],
            CredentialRow::from_row,
        )
        .optional()?;
    row.map(CredentialRow::into_credential).transpose()
}

pub(crate) fn get(conn: &Connection, id: &str) -> Result<Option<Credential>, StoreError> {
    let row = conn
        .query_row(
            &format!("SELECT {CREDENTIAL_COLUMNS} FROM credentials WHERE id = ?1"),
            [id],
            CredentialRow::from_row,
        )
        .optional()?;
    row.map(CredentialRow::into_credential).transpose()
}

pub(crate) fn list(conn: &Connection) -> Result<Vec<Credential>, StoreError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {CREDENTIAL_COLUMNS} FROM credentials ORDER BY created_at, id"
    ))?;
    let rows = stmt
        .query_map([], CredentialRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter()
        .map(CredentialRow::into_credential)
        .collect()
}

pub(crate) fn insert(conn: &Connection, c: &Credential) -> Result<(), StoreError> {
    let result = conn.execute(
        r#"
        INSERT INTO credentials (
            id, name, key_hash, tier, status, daily_quota, minute_quota,
            created_at, last_used_at, revoked_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        "#,
        params![
            c.id,
            c.name,
            c.key_hash.as_str(),
            c.tier.as_str(),
            c.status.as_str(),
            quota_to_sql(c.daily_quota)?,
            quota_to_sql(c.minute_quota)?,
            c.created_at.to_rfc3339(),
            c.last_used_at.map(|t| t.to_rfc3339()),
            c.revoked_at.map(|t| t.to_rfc3339()),
        ],
    );

    if let Err(e) = result {
        if e.to_string().contains("UNIQUE constraint failed: credentials.key_hash") {
            return Err(StoreError::DuplicateHash);
        }
        return Err(e.into());
    }
    Ok(())
}

pub(crate) fn touch_last_used(
    conn: &Connection,
    id: &str,
    now: DateTime<Utc>,
) -> Result<(), StoreError> {
    conn.execute(
        "UPDATE credentials SET last_used_at = ?2 WHERE id = ?1",
        params![id, now.to_rfc3339()],
    )?;
    Ok(())
}

/// Only an active row changes; `revoked_at` keeps its first value.
pub(crate) fn revoke(
    conn: &Connection,
    id: &str,
    now: DateTime<Utc>,
) -> Result<RevokeOutcome, StoreError> {
    let changed = conn.execute(
        "UPDATE credentials SET status = 'revoked', revoked_at = ?2
         WHERE id = ?1 AND status = 'active'",
        params![id, now.to_rfc3339()],
    )?;
    if changed == 1 {
        return Ok(RevokeOutcome::Revoked);
    }

    let exists: Option<String> = conn
        .query_row("SELECT status FROM credentials WHERE id = ?1", [id], |row| {
            row.get(0)
        })
        .optional()?;
    match exists {
        Some(_) => Ok(RevokeOutcome::AlreadyRevoked),
        None => Err(StoreError::CredentialNotFound { id: id.to_string() }),
    }
}

/// One conditional upsert: inserts the window at 1, or increments it only
/// while `count < quota`. `RETURNING` yields no row when the guard fails.
const CONSUME_SQL: &str = r#"
    INSERT INTO usage_counters (credential_id, window_kind, bucket, count, updated_at)
    VALUES (?1, ?2, ?3, 1, ?4)
    ON CONFLICT(credential_id, window_kind, bucket) DO UPDATE SET
        count = usage_counters.count + 1,
        updated_at = excluded.updated_at
    WHERE ?5 IS NULL OR usage_counters.count < ?5
    RETURNING count
"#;

pub(crate) fn consume(
    conn: &Connection,
    credential_id: &str,
    key: &WindowKey,
    quota: Quota,
    now: DateTime<Utc>,
) -> Result<ConsumeOutcome, StoreError> {
    // A zero quota would otherwise be admitted by the initial insert.
    if quota == Quota::Limited(0) {
        return Ok(ConsumeOutcome::denied(current(conn, credential_id, key)?));
    }

    let charged: Option<i64> = conn
        .query_row(
            CONSUME_SQL,
            params![
                credential_id,
                key.window.as_str(),
                key.bucket,
                now.to_rfc3339(),
                quota_to_sql(quota)?,
            ],
            |row| row.get(0),
        )
        .optional()?;

    match charged {
        Some(count) => Ok(ConsumeOutcome::admitted(count_from_sql(count))),
        None => Ok(ConsumeOutcome::denied(current(conn, credential_id, key)?)),
    }
}

pub(crate) fn current(
    conn: &Connection,
    credential_id: &str,
    key: &WindowKey,
) -> Result<u64, StoreError> {
    let count: Option<i64> = conn
        .query_row(
            "SELECT count FROM usage_counters
             WHERE credential_id = ?1 AND window_kind = ?2 AND bucket = ?3",
            params![credential_id, key.window.as_str(), key.bucket],
            |row| row.get(0),
        )
        .optional()?;
    Ok(count.map(count_from_sql).unwrap_or(0))
}
