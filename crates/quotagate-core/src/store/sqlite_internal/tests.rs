use super::super::SqliteStore;
use super::ops;
use crate::counter::{ConsumeOutcome, QuotaCounter};
use crate::credential::{Credential, CredentialHash, NewCredential, Quota, Status, Tier};
use crate::decision::Reason;
use crate::store::{CredentialAdmin, CredentialStore, RevokeOutcome, StoreError};
use crate::window::{Window, WindowClock};
use chrono::{DateTime, Duration, TimeZone, Utc};
use rusqlite::Connection;
use std::time::Instant;

fn fixed_now() -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000, 0).unwrap()
}

fn seed(store: &SqliteStore, secret: &str, daily: Quota, minute: Quota) -> Credential {
    let credential = NewCredential::new("test-key", Tier::Starter)
        .with_daily_quota(daily)
        .with_minute_quota(minute)
        .into_credential(CredentialHash::of(secret), fixed_now());
    store.insert(&credential).unwrap();
    credential
}

// === A) Provisioning ===

#[test]
fn test_memory_store_is_provisioned() {
    let store = SqliteStore::memory().unwrap();
    assert!(store.is_provisioned().unwrap());
}

#[test]
fn test_open_does_not_create_tables() {
    let store = SqliteStore::from_connection(Connection::open_in_memory().unwrap()).unwrap();
    assert!(!store.is_provisioned().unwrap());

    let err = store
        .find_by_hash(&CredentialHash::of("qg_anything"))
        .unwrap_err();
    assert!(err.is_not_provisioned(), "got {err:?}");

    let err = store
        .validate_and_consume_blocking(&CredentialHash::of("qg_anything"), fixed_now())
        .unwrap_err();
    assert!(err.is_not_provisioned(), "got {err:?}");

    store.provision().unwrap();
    assert!(store.is_provisioned().unwrap());
}

#[test]
fn test_store_sets_foreign_keys() {
    let store = SqliteStore::memory().unwrap();
    let conn = store.conn.lock().unwrap();
    let fk: i32 = conn
        .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
        .unwrap();
    assert_eq!(fk, 1);
}

// === B) Registry ===

#[test]
fn test_find_by_hash_roundtrip() {
    let store = SqliteStore::memory().unwrap();
    let seeded = seed(&store, "qg_a", Quota::Limited(10), Quota::Unlimited);

    let found = store
        .find_by_hash(&CredentialHash::of("qg_a"))
        .unwrap()
        .unwrap();
    assert_eq!(found, seeded);
    assert!(store
        .find_by_hash(&CredentialHash::of("qg_b"))
        .unwrap()
        .is_none());
}

#[test]
fn test_raw_secret_is_never_persisted() {
    let store = SqliteStore::memory().unwrap();
    let issued = store
        .issue(NewCredential::new("ci", Tier::Free), fixed_now())
        .unwrap();

    let conn = store.conn.lock().unwrap();
    let leaked: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM credentials WHERE key_hash = ?1 OR name = ?1 OR id = ?1",
            [&issued.secret],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(leaked, 0);
}

#[test]
fn test_duplicate_hash_rejected() {
    let store = SqliteStore::memory().unwrap();
    seed(&store, "qg_dup", Quota::Unlimited, Quota::Unlimited);
    let again = NewCredential::new("other", Tier::Free)
        .into_credential(CredentialHash::of("qg_dup"), fixed_now());
    assert_eq!(store.insert(&again), Err(StoreError::DuplicateHash));
}

#[test]
fn test_revoke_is_idempotent() {
    let store = SqliteStore::memory().unwrap();
    let c = seed(&store, "qg_r", Quota::Limited(100), Quota::Unlimited);

    let first_at = fixed_now() + Duration::hours(1);
    assert_eq!(store.revoke(&c.id, first_at).unwrap(), RevokeOutcome::Revoked);
    assert_eq!(
        store.revoke(&c.id, first_at + Duration::hours(1)).unwrap(),
        RevokeOutcome::AlreadyRevoked
    );

    let stored = store.get(&c.id).unwrap().unwrap();
    assert_eq!(stored.status, Status::Revoked);
    assert_eq!(stored.revoked_at, Some(first_at));
}

#[test]
fn test_revoke_unknown_id() {
    let store = SqliteStore::memory().unwrap();
    assert!(matches!(
        store.revoke("key_missing", fixed_now()),
        Err(StoreError::CredentialNotFound { .. })
    ));
}

// === C) Window counters ===

#[test]
fn test_consume_boundary_and_denied_count_unchanged() {
    let store = SqliteStore::memory().unwrap();
    let c = seed(&store, "qg_c", Quota::Unlimited, Quota::Limited(2));
    let key = WindowClock::default().key(Window::Minute, fixed_now());

    assert_eq!(
        store
            .consume(&c.id, &key, Quota::Limited(2), fixed_now())
            .unwrap(),
        ConsumeOutcome::admitted(1)
    );
    assert_eq!(
        store
            .consume(&c.id, &key, Quota::Limited(2), fixed_now())
            .unwrap(),
        ConsumeOutcome::admitted(2)
    );
    assert_eq!(
        store
            .consume(&c.id, &key, Quota::Limited(2), fixed_now())
            .unwrap(),
        ConsumeOutcome::denied(2)
    );
    assert_eq!(store.current(&c.id, &key).unwrap(), 2);
}

#[test]
fn test_consume_zero_quota_never_admits() {
    let store = SqliteStore::memory().unwrap();
    let c = seed(&store, "qg_z", Quota::Limited(0), Quota::Unlimited);
    let key = WindowClock::default().key(Window::Day, fixed_now());

    assert_eq!(
        store
            .consume(&c.id, &key, Quota::Limited(0), fixed_now())
            .unwrap(),
        ConsumeOutcome::denied(0)
    );
}

#[test]
fn test_consume_unlimited() {
    let store = SqliteStore::memory().unwrap();
    let c = seed(&store, "qg_u", Quota::Unlimited, Quota::Unlimited);
    let key = WindowClock::default().key(Window::Minute, fixed_now());
    for i in 1..=40 {
        let out = store
            .consume(&c.id, &key, Quota::Unlimited, fixed_now())
            .unwrap();
        assert_eq!(out, ConsumeOutcome::admitted(i));
    }
}

// === D) Full chain ===

#[test]
fn test_chain_revoked_touches_no_window() {
    let store = SqliteStore::memory().unwrap();
    let c = seed(&store, "qg_rev", Quota::Limited(100), Quota::Limited(5));
    store.revoke(&c.id, fixed_now()).unwrap();

    let d = store
        .validate_and_consume_blocking(&CredentialHash::of("qg_rev"), fixed_now())
        .unwrap();
    assert_eq!(d.reason, Reason::RevokedKey);
    assert_eq!(d.daily_quota, Some(100));
    assert_eq!(d.daily_count, None);

    let usage = store.usage(&c.id, fixed_now()).unwrap();
    assert_eq!(usage.minute.count, 0);
    assert_eq!(usage.day.count, 0);
}

#[test]
fn test_chain_touches_last_used_only_on_admission() {
    let store = SqliteStore::memory().unwrap();
    let c = seed(&store, "qg_t", Quota::Limited(1), Quota::Unlimited);

    let t1 = fixed_now();
    let d = store
        .validate_and_consume_blocking(&CredentialHash::of("qg_t"), t1)
        .unwrap();
    assert!(d.allowed);
    assert_eq!(store.get(&c.id).unwrap().unwrap().last_used_at, Some(t1));

    let t2 = t1 + Duration::seconds(5);
    let d = store
        .validate_and_consume_blocking(&CredentialHash::of("qg_t"), t2)
        .unwrap();
    assert_eq!(d.reason, Reason::DailyLimitExceeded);
    assert_eq!(store.get(&c.id).unwrap().unwrap().last_used_at, Some(t1));
}

#[test]
fn test_chain_daily_denial_keeps_minute_charge() {
    let store = SqliteStore::memory().unwrap();
    let c = seed(&store, "qg_m", Quota::Limited(1), Quota::Limited(10));
    let hash = CredentialHash::of("qg_m");

    store
        .validate_and_consume_blocking(&hash, fixed_now())
        .unwrap();
    let d = store
        .validate_and_consume_blocking(&hash, fixed_now())
        .unwrap();
    assert_eq!(d.reason, Reason::DailyLimitExceeded);
    assert_eq!(d.minute_count, Some(2));
    assert_eq!(d.daily_count, Some(1));

    let usage = store.usage(&c.id, fixed_now()).unwrap();
    assert_eq!(usage.minute.count, 2);
    assert_eq!(usage.day.count, 1);
}

#[test]
fn test_day_window_follows_reference_offset() {
    let clock = WindowClock::with_offset_minutes(120).unwrap();
    let store = SqliteStore::memory().unwrap().with_clock(clock);
    let c = seed(&store, "qg_tz", Quota::Limited(5), Quota::Unlimited);

    store
        .validate_and_consume_blocking(&CredentialHash::of("qg_tz"), fixed_now())
        .unwrap();
    let usage = store.usage(&c.id, fixed_now()).unwrap();
    assert_eq!(usage.day.bucket, "2023-11-15");
    assert_eq!(usage.day.count, 1);
}

// === E) Deadlines and transaction hygiene ===

#[test]
fn test_elapsed_deadline_charges_nothing() {
    let store = SqliteStore::memory().unwrap();
    let credential = seed(&store, "qg_late", Quota::Limited(10), Quota::Limited(10));
    let hash = CredentialHash::of("qg_late");

    let past = Instant::now()
        .checked_sub(std::time::Duration::from_millis(1))
        .unwrap();
    let err = store
        .validate_and_consume_until(&hash, fixed_now(), past)
        .unwrap_err();
    assert_eq!(err, StoreError::DeadlineElapsed);
    assert_eq!(store.usage(&credential.id, fixed_now()).unwrap().day.count, 0);

    let decision = store
        .validate_and_consume_until(
            &hash,
            fixed_now(),
            Instant::now() + std::time::Duration::from_secs(5),
        )
        .unwrap();
    assert_eq!(decision.reason, Reason::Ok);
    assert_eq!(store.usage(&credential.id, fixed_now()).unwrap().day.count, 1);
}

#[test]
fn test_work_finishing_after_deadline_is_rolled_back() {
    let store = SqliteStore::memory().unwrap();
    let credential = seed(&store, "qg_slow", Quota::Limited(10), Quota::Limited(10));
    let key = store.clock().key(Window::Day, fixed_now());

    let deadline = Instant::now() + std::time::Duration::from_millis(20);
    let err = store
        .immediate_until(deadline, |conn| {
            let outcome = ops::consume(conn, &credential.id, &key, Quota::Limited(10), fixed_now())?;
            std::thread::sleep(std::time::Duration::from_millis(50));
            Ok(outcome)
        })
        .unwrap_err();

    assert_eq!(err, StoreError::DeadlineElapsed);
    assert_eq!(store.current(&credential.id, &key).unwrap(), 0);
}

#[test]
fn test_failed_commit_does_not_wedge_the_connection() {
    let store = SqliteStore::memory().unwrap();

    // deferred foreign keys are only checked at COMMIT
    let err = store
        .immediate(|conn| {
            conn.execute_batch(
                "PRAGMA defer_foreign_keys = ON;
                 INSERT INTO usage_counters (credential_id, window_kind, bucket, count, updated_at)
                 VALUES ('key_ghost', 'day', '2026-01-01', 1, '2026-01-01T00:00:00+00:00');",
            )?;
            Ok(())
        })
        .unwrap_err();
    assert!(matches!(err, StoreError::Database(_)), "got {err:?}");

    seed(&store, "qg_after", Quota::Limited(5), Quota::Limited(5));
    let decision = store
        .validate_and_consume_blocking(&CredentialHash::of("qg_after"), fixed_now())
        .unwrap();
    assert_eq!(decision.reason, Reason::Ok);
}
