//! In-process credential store for tests and single-node deployments.
//!
//! Registry rows live behind an `RwLock`; window charges go through
//! [`MemoryQuotaCounter`], whose per-window CAS loop is the only atomicity
//! the chain relies on.

use super::{
    pipeline, window_usage, AdmissionBackend, CredentialAdmin, CredentialStore, RevokeOutcome,
    StoreError, UsageSnapshot,
};
use crate::counter::{MemoryQuotaCounter, QuotaCounter};
use crate::credential::{Credential, CredentialHash, Status};
use crate::decision::UsageDecision;
use crate::window::{Window, WindowClock};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

#[derive(Debug, Default)]
struct Registry {
    by_id: HashMap<String, Credential>,
    id_by_hash: HashMap<CredentialHash, String>,
}

/// Memory-backed registry plus counters. Cheap to clone; clones share state.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    registry: Arc<RwLock<Registry>>,
    counter: Arc<MemoryQuotaCounter>,
    clock: WindowClock,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_clock(mut self, clock: WindowClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn clock(&self) -> &WindowClock {
        &self.clock
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Registry>, StoreError> {
        self.registry
            .read()
            .map_err(|_| StoreError::Database("registry lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Registry>, StoreError> {
        self.registry
            .write()
            .map_err(|_| StoreError::Database("registry lock poisoned".to_string()))
    }

    pub fn validate_and_consume_blocking(
        &self,
        hash: &CredentialHash,
        now: DateTime<Utc>,
    ) -> Result<UsageDecision, StoreError> {
        pipeline::evaluate(self, self.counter.as_ref(), &self.clock, hash, now)
    }
}

impl CredentialStore for MemoryStore {
    fn find_by_hash(&self, hash: &CredentialHash) -> Result<Option<Credential>, StoreError> {
        let registry = self.read()?;
        Ok(registry
            .id_by_hash
            .get(hash)
            .and_then(|id| registry.by_id.get(id))
            .cloned())
    }

    fn touch_last_used(&self, id: &str, now: DateTime<Utc>) -> Result<(), StoreError> {
        let mut registry = self.write()?;
        if let Some(c) = registry.by_id.get_mut(id) {
            c.last_used_at = Some(now);
        }
        Ok(())
    }
}

impl CredentialAdmin for MemoryStore {
    fn insert(&self, credential: &Credential) -> Result<(), StoreError> {
        let mut registry = self.write()?;
        if registry.id_by_hash.contains_key(&credential.key_hash) {
            return Err(StoreError::DuplicateHash);
        }
        if registry.by_id.contains_key(&credential.id) {
            return Err(StoreError::Database(format!(
                "duplicate credential id: {}",
                credential.id
            )));
        }
        registry
            .id_by_hash
            .insert(credential.key_hash.clone(), credential.id.clone());
        registry
            .by_id
            .insert(credential.id.clone(), credential.clone());
        Ok(())
    }

    fn revoke(&self, id: &str, now: DateTime<Utc>) -> Result<RevokeOutcome, StoreError> {
        let outcome = {
            let mut registry = self.write()?;
            let credential =
                registry
                    .by_id
                    .get_mut(id)
                    .ok_or_else(|| StoreError::CredentialNotFound { id: id.to_string() })?;
            match credential.status {
                Status::Revoked => RevokeOutcome::AlreadyRevoked,
                Status::Active => {
                    credential.status = Status::Revoked;
                    credential.revoked_at = Some(now);
                    RevokeOutcome::Revoked
                }
            }
        };
        tracing::info!(event = "credential_revoked", credential_id = %id, outcome = ?outcome);
        Ok(outcome)
    }

    fn get(&self, id: &str) -> Result<Option<Credential>, StoreError> {
        Ok(self.read()?.by_id.get(id).cloned())
    }

    fn list(&self) -> Result<Vec<Credential>, StoreError> {
        let mut all: Vec<Credential> = self.read()?.by_id.values().cloned().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(all)
    }

    fn usage(&self, id: &str, now: DateTime<Utc>) -> Result<UsageSnapshot, StoreError> {
        let credential = self
            .get(id)?
            .ok_or_else(|| StoreError::CredentialNotFound { id: id.to_string() })?;
        let minute_key = self.clock.key(Window::Minute, now);
        let day_key = self.clock.key(Window::Day, now);
        let minute = self.counter.current(id, &minute_key)?;
        let day = self.counter.current(id, &day_key)?;
        Ok(UsageSnapshot {
            credential_id: credential.id,
            minute: window_usage(minute_key, minute, credential.minute_quota),
            day: window_usage(day_key, day, credential.daily_quota),
        })
    }
}

#[async_trait]
impl AdmissionBackend for MemoryStore {
    async fn validate_and_consume(
        &self,
        hash: &CredentialHash,
        now: DateTime<Utc>,
        _deadline: Instant,
    ) -> Result<UsageDecision, StoreError> {
        self.validate_and_consume_blocking(hash, now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::{NewCredential, Quota, Tier};
    use crate::decision::Reason;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 30).unwrap()
    }

    fn seed(store: &MemoryStore, secret: &str, daily: Quota, minute: Quota) -> Credential {
        let c = NewCredential::new("mem", Tier::Free)
            .with_daily_quota(daily)
            .with_minute_quota(minute)
            .into_credential(CredentialHash::of(secret), now());
        store.insert(&c).unwrap();
        c
    }

    #[test]
    fn test_unknown_hash_is_invalid_key() {
        let store = MemoryStore::new();
        let d = store
            .validate_and_consume_blocking(&CredentialHash::of("qg_nope"), now())
            .unwrap();
        assert_eq!(d, UsageDecision::invalid_key());
    }

    #[test]
    fn test_daily_two_three_calls() {
        let store = MemoryStore::new();
        seed(&store, "qg_d2", Quota::Limited(2), Quota::Unlimited);
        let hash = CredentialHash::of("qg_d2");

        let first = store.validate_and_consume_blocking(&hash, now()).unwrap();
        assert!(first.allowed);
        assert_eq!(first.daily_count, Some(1));

        let second = store
            .validate_and_consume_blocking(&hash, now() + Duration::minutes(1))
            .unwrap();
        assert!(second.allowed);
        assert_eq!(second.daily_count, Some(2));

        let third = store
            .validate_and_consume_blocking(&hash, now() + Duration::minutes(2))
            .unwrap();
        assert!(!third.allowed);
        assert_eq!(third.reason, Reason::DailyLimitExceeded);
        assert_eq!(third.daily_count, Some(2));
    }

    #[test]
    fn test_minute_limit_leaves_day_untouched() {
        let store = MemoryStore::new();
        let c = seed(&store, "qg_m5", Quota::Limited(100), Quota::Limited(5));
        let hash = CredentialHash::of("qg_m5");

        for _ in 0..5 {
            assert!(store.validate_and_consume_blocking(&hash, now()).unwrap().allowed);
        }
        let d = store.validate_and_consume_blocking(&hash, now()).unwrap();
        assert_eq!(d.reason, Reason::MinuteLimitExceeded);
        assert_eq!(d.minute_count, Some(5));
        assert_eq!(d.daily_count, None);
        assert_eq!(d.daily_quota, Some(100));

        assert_eq!(store.usage(&c.id, now()).unwrap().day.count, 5);
    }

    #[test]
    fn test_revoke_then_deny() {
        let store = MemoryStore::new();
        let c = seed(&store, "qg_rv", Quota::Limited(100), Quota::Unlimited);
        assert_eq!(store.revoke(&c.id, now()).unwrap(), RevokeOutcome::Revoked);
        assert_eq!(
            store.revoke(&c.id, now()).unwrap(),
            RevokeOutcome::AlreadyRevoked
        );

        let d = store
            .validate_and_consume_blocking(&CredentialHash::of("qg_rv"), now())
            .unwrap();
        assert_eq!(d.reason, Reason::RevokedKey);
        assert_eq!(d.daily_quota, Some(100));
        assert_eq!(d.daily_count, None);
        assert_eq!(d.minute_count, None);
    }

    #[test]
    fn test_duplicate_hash() {
        let store = MemoryStore::new();
        seed(&store, "qg_same", Quota::Unlimited, Quota::Unlimited);
        let again = NewCredential::new("again", Tier::Free)
            .into_credential(CredentialHash::of("qg_same"), now());
        assert_eq!(store.insert(&again), Err(StoreError::DuplicateHash));
    }

    #[test]
    fn test_issue_defaults_to_tier_quotas() {
        let store = MemoryStore::new();
        let issued = store
            .issue(NewCredential::new("default", Tier::Free), now())
            .unwrap();
        assert!(issued.secret.starts_with("qg_"));
        assert_eq!(issued.credential.daily_quota, Quota::Limited(100));
        assert_eq!(issued.credential.minute_quota, Quota::Limited(10));

        let found = store
            .find_by_hash(&CredentialHash::of(&issued.secret))
            .unwrap()
            .unwrap();
        assert_eq!(found.id, issued.credential.id);
    }

    #[test]
    fn test_list_is_ordered_by_creation() {
        let store = MemoryStore::new();
        let later = NewCredential::new("b", Tier::Free)
            .into_credential(CredentialHash::of("qg_b"), now() + Duration::seconds(1));
        let earlier = NewCredential::new("a", Tier::Free)
            .into_credential(CredentialHash::of("qg_a"), now());
        store.insert(&later).unwrap();
        store.insert(&earlier).unwrap();

        let names: Vec<_> = store
            .list()
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["a", "b"]);
    }
}
