//! Static shared secrets honored while the credential store is not
//! provisioned (or deliberately absent).
//!
//! Matching is an explicit length check followed by a constant-time byte
//! comparison. Every configured key is compared; there is no early exit on
//! the first hit.

use crate::credential::CredentialHash;
use crate::decision::Admission;
use std::fmt;
use subtle::{Choice, ConstantTimeEq};

#[derive(Clone, Default)]
pub struct FallbackKeySet {
    keys: Vec<Vec<u8>>,
}

impl FallbackKeySet {
    /// Empty entries are dropped; an empty secret never matches.
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            keys: keys
                .into_iter()
                .map(|k| k.as_ref().trim().as_bytes().to_vec())
                .filter(|k| !k.is_empty())
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn matches(&self, raw: &str) -> bool {
        let presented = raw.as_bytes();
        if presented.is_empty() {
            return false;
        }
        let mut hit = Choice::from(0u8);
        for key in &self.keys {
            if key.len() != presented.len() {
                continue;
            }
            hit |= key.as_slice().ct_eq(presented);
        }
        hit.into()
    }

    /// Untracked fallback identity for a matching secret.
    pub fn admit(&self, raw: &str) -> Option<Admission> {
        if !self.matches(raw) {
            return None;
        }
        Some(Admission::fallback(CredentialHash::of(raw).fingerprint()))
    }
}

impl fmt::Debug for FallbackKeySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FallbackKeySet([REDACTED; {}])", self.keys.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::Source;

    #[test]
    fn test_matches_any_configured_key() {
        let set = FallbackKeySet::new(["alpha-secret", "beta-secret-longer"]);
        assert!(set.matches("alpha-secret"));
        assert!(set.matches("beta-secret-longer"));
        assert!(!set.matches("alpha-secreT"));
        assert!(!set.matches("alpha"));
        assert!(!set.matches(""));
    }

    #[test]
    fn test_empty_entries_are_ignored() {
        let set = FallbackKeySet::new(["", "  "]);
        assert!(set.is_empty());
        assert!(!set.matches(""));
    }

    #[test]
    fn test_admit_is_untracked_and_tagged() {
        let set = FallbackKeySet::new(["shared"]);
        let admission = set.admit("shared").unwrap();
        assert_eq!(admission.source, Source::Fallback);
        assert_eq!(admission.fingerprint, CredentialHash::of("shared").fingerprint());
        assert!(admission.decision.allowed);
        assert_eq!(admission.decision.daily_quota, None);
        assert_eq!(admission.tier(), None);
        assert!(set.admit("other").is_none());
    }

    #[test]
    fn test_debug_redacts_keys() {
        let set = FallbackKeySet::new(["super-secret"]);
        let dbg = format!("{set:?}");
        assert!(!dbg.contains("super-secret"));
    }
}
