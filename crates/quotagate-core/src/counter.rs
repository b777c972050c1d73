//! Dual-window usage counters with an indivisible check-and-increment.
//!
//! The contract every implementation upholds: for a finite quota `Q`, no
//! interleaving of concurrent [`QuotaCounter::consume`] calls on the same
//! `(credential, window)` can push the count above `Q`. A denied call leaves
//! the count untouched and reports it as-is.

use crate::credential::Quota;
use crate::store::StoreError;
use crate::window::WindowKey;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Result of one conditional charge against a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsumeOutcome {
    /// Post-increment count when admitted, unchanged count otherwise.
    pub count: u64,
    pub admitted: bool,
}

impl ConsumeOutcome {
    pub fn admitted(count: u64) -> Self {
        Self {
            count,
            admitted: true,
        }
    }

    pub fn denied(count: u64) -> Self {
        Self {
            count,
            admitted: false,
        }
    }
}

pub trait QuotaCounter {
    /// Charge one unit against `key` if `quota` allows it.
    ///
    /// Must be linearizable per `(credential_id, key)`: never a separate read
    /// followed by a conditional write.
    fn consume(
        &self,
        credential_id: &str,
        key: &WindowKey,
        quota: Quota,
        now: DateTime<Utc>,
    ) -> Result<ConsumeOutcome, StoreError>;

    /// Current count without charging. Zero when the window was never used.
    fn current(&self, credential_id: &str, key: &WindowKey) -> Result<u64, StoreError>;
}

#[derive(Debug, Default)]
struct CounterSlot {
    count: AtomicU64,
}

/// In-process counter: one atomic slot per `(credential, window)`, charged
/// through a compare-and-swap retry loop.
#[derive(Debug, Default)]
pub struct MemoryQuotaCounter {
    slots: Mutex<HashMap<(String, WindowKey), Arc<CounterSlot>>>,
}

impl MemoryQuotaCounter {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, credential_id: &str, key: &WindowKey) -> Result<Arc<CounterSlot>, StoreError> {
        let mut slots = self
            .slots
            .lock()
            .map_err(|_| StoreError::Database("quota counter lock poisoned".to_string()))?;
        Ok(slots
            .entry((credential_id.to_string(), key.clone()))
            .or_default()
            .clone())
    }
}

impl QuotaCounter for MemoryQuotaCounter {
    fn consume(
        &self,
        credential_id: &str,
        key: &WindowKey,
        quota: Quota,
        _now: DateTime<Utc>,
    ) -> Result<ConsumeOutcome, StoreError> {
        let slot = self.slot(credential_id, key)?;
        let mut current = slot.count.load(Ordering::Acquire);
        loop {
            if !quota.admits(current) {
                return Ok(ConsumeOutcome::denied(current));
            }
            let Some(next) = current.checked_add(1) else {
                return Ok(ConsumeOutcome::denied(current));
            };
            match slot.count.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(ConsumeOutcome::admitted(next)),
                Err(actual) => current = actual,
            }
        }
    }

    fn current(&self, credential_id: &str, key: &WindowKey) -> Result<u64, StoreError> {
        let slots = self
            .slots
            .lock()
            .map_err(|_| StoreError::Database("quota counter lock poisoned".to_string()))?;
        Ok(slots
            .get(&(credential_id.to_string(), key.clone()))
            .map(|s| s.count.load(Ordering::Acquire))
            .unwrap_or(0))
    }
}
