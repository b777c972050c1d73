//! SQLite schema for the credential registry.
//!
//! Tables:
//! - `credentials`: hashed secrets, tier, status and quotas (never deleted)
//! - `usage_counters`: one row per (credential, window kind, bucket)

/// DDL for the credential registry.
///
/// Schema version: 1
pub const CREDENTIAL_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS credentials (
    id            TEXT PRIMARY KEY,
    name          TEXT NOT NULL,
    key_hash      TEXT NOT NULL UNIQUE,
    tier          TEXT NOT NULL CHECK (tier IN ('free', 'starter', 'enterprise')),
    status        TEXT NOT NULL DEFAULT 'active' CHECK (status IN ('active', 'revoked')),
    daily_quota   INTEGER CHECK (daily_quota IS NULL OR daily_quota >= 0),
    minute_quota  INTEGER CHECK (minute_quota IS NULL OR minute_quota >= 0),
    created_at    TEXT NOT NULL,
    last_used_at  TEXT,
    revoked_at    TEXT
);

-- Lazily created on first charge, never deleted
CREATE TABLE IF NOT EXISTS usage_counters (
    credential_id TEXT NOT NULL REFERENCES credentials(id),
    window_kind   TEXT NOT NULL CHECK (window_kind IN ('minute', 'day')),
    bucket        TEXT NOT NULL,
    count         INTEGER NOT NULL,
    updated_at    TEXT NOT NULL,
    PRIMARY KEY (credential_id, window_kind, bucket)
);

-- Revocation is one-way
CREATE TRIGGER IF NOT EXISTS credentials_no_reactivation
BEFORE UPDATE OF status ON credentials
WHEN OLD.status = 'revoked' AND NEW.status <> 'revoked'
BEGIN
    SELECT RAISE(ABORT, 'revoked credentials cannot be reactivated');
END;
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_schema_is_valid_sql() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(CREDENTIAL_SCHEMA).unwrap();
    }

    #[test]
    fn test_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(CREDENTIAL_SCHEMA).unwrap();
        conn.execute_batch(CREDENTIAL_SCHEMA).unwrap();
    }

    #[test]
    fn test_revoked_row_cannot_be_reactivated() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(CREDENTIAL_SCHEMA).unwrap();
        conn.execute(
            "INSERT INTO credentials (id, name, key_hash, tier, status, created_at)
             VALUES ('k1', 'n', 'h', 'free', 'revoked', '2026-01-01T00:00:00Z')",
            [],
        )
        .unwrap();

        let err = conn
            .execute("UPDATE credentials SET status = 'active' WHERE id = 'k1'", [])
            .unwrap_err();
        assert!(err.to_string().contains("cannot be reactivated"));
    }
}
