//! Session to credential binding.
//!
//! A binding is written once when the session starts and only read after
//! that. A second writer for the same session id loses and is handed the
//! existing fingerprint instead.

use crate::credential::Fingerprint;
use crate::error::AuthError;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindOutcome {
    Created,
    /// The session was already bound; carries the original fingerprint.
    Existing(Fingerprint),
}

#[derive(Debug, Default)]
pub struct SessionBindings {
    inner: RwLock<HashMap<String, Fingerprint>>,
}

impl SessionBindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&self, session_id: &str, fingerprint: Fingerprint) -> BindOutcome {
        let mut map = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        match map.get(session_id) {
            Some(existing) => BindOutcome::Existing(existing.clone()),
            None => {
                map.insert(session_id.to_string(), fingerprint);
                BindOutcome::Created
            }
        }
    }

    pub fn lookup(&self, session_id: &str) -> Option<Fingerprint> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(session_id)
            .cloned()
    }

    /// Check that `fingerprint` is the one that opened `session_id`.
    pub fn verify(&self, session_id: &str, fingerprint: &Fingerprint) -> Result<(), AuthError> {
        match self.lookup(session_id) {
            None => Err(AuthError::UnknownSession),
            Some(bound) if &bound == fingerprint => Ok(()),
            Some(bound) => {
                tracing::info!(
                    event = "session_mismatch",
                    session_id = %session_id,
                    bound = %bound,
                    presented = %fingerprint
                );
                Err(AuthError::SessionMismatch)
            }
        }
    }

    /// Drop a binding. Returns whether one existed.
    pub fn close(&self, session_id: &str) -> bool {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(session_id)
            .is_some()
    }

    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
