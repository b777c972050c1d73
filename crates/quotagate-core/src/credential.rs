//! Credential model: tiers, status, quotas and the one-way secret hash.
//!
//! Raw secrets only ever exist in two places: the caller's request and the
//! single [`IssuedCredential`] returned at issuance. Everything persisted or
//! logged is derived from [`CredentialHash`].

use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Prefix carried by every issued secret.
pub const SECRET_PREFIX: &str = "qg_";

/// Random bytes per issued secret (hex encoded after the prefix).
pub const SECRET_BYTES: usize = 32;

/// Hex characters kept from the digest when deriving a fingerprint.
const FINGERPRINT_LEN: usize = 16;

/// Sentinel fingerprint used for sessions opened with authorization disabled.
pub const ANONYMOUS_FINGERPRINT: &str = "anonymous";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Free,
    Starter,
    Enterprise,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Starter => "starter",
            Self::Enterprise => "enterprise",
        }
    }

    /// Quotas applied at issuance when the caller does not override them.
    /// Returned as `(daily, minute)`.
    pub fn default_quotas(&self) -> (Quota, Quota) {
        match self {
            Self::Free => (Quota::Limited(100), Quota::Limited(10)),
            Self::Starter => (Quota::Limited(5_000), Quota::Limited(60)),
            Self::Enterprise => (Quota::Unlimited, Quota::Unlimited),
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "free" => Ok(Self::Free),
            "starter" => Ok(Self::Starter),
            "enterprise" => Ok(Self::Enterprise),
            other => Err(format!("unknown tier '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Active,
    Revoked,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Revoked => "revoked",
        }
    }
}

impl FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "revoked" => Ok(Self::Revoked),
            other => Err(format!("unknown credential status '{}'", other)),
        }
    }
}

/// A per-window usage ceiling. Serialized as a nullable integer where
/// `null` means unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Option<u64>", into = "Option<u64>")]
pub enum Quota {
    Limited(u64),
    Unlimited,
}

impl Quota {
    pub fn limit(&self) -> Option<u64> {
        match self {
            Self::Limited(q) => Some(*q),
            Self::Unlimited => None,
        }
    }

    /// Whether a window currently at `count` may take one more charge.
    pub fn admits(&self, count: u64) -> bool {
        match self {
            Self::Limited(q) => count < *q,
            Self::Unlimited => true,
        }
    }

    /// `quota - count` floored at zero; `None` when unlimited.
    pub fn remaining(&self, count: u64) -> Option<u64> {
        self.limit().map(|q| q.saturating_sub(count))
    }
}

impl From<Option<u64>> for Quota {
    fn from(v: Option<u64>) -> Self {
        match v {
            Some(q) => Self::Limited(q),
            None => Self::Unlimited,
        }
    }
}

impl From<Quota> for Option<u64> {
    fn from(q: Quota) -> Self {
        q.limit()
    }
}

impl fmt::Display for Quota {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Limited(q) => write!(f, "{}", q),
            Self::Unlimited => f.write_str("unlimited"),
        }
    }
}

impl FromStr for Quota {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("unlimited") {
            return Ok(Self::Unlimited);
        }
        s.parse::<u64>()
            .map(Self::Limited)
            .map_err(|e| format!("invalid quota '{}': {}", s, e))
    }
}

/// SHA-256 hex digest of a raw secret. The only form in which a secret is
/// stored or looked up.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CredentialHash(String);

impl CredentialHash {
    pub fn of(raw: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(raw.as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    /// Wrap a digest read back from storage.
    pub fn from_stored(hex_digest: impl Into<String>) -> Self {
        Self(hex_digest.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn fingerprint(&self) -> Fingerprint {
        let mut hasher = Sha256::new();
        hasher.update(b"fingerprint:");
        hasher.update(self.0.as_bytes());
        let digest = hex::encode(hasher.finalize());
        Fingerprint(digest[..FINGERPRINT_LEN].to_string())
    }
}

// Digests are not secret, but keeping them out of Debug output keeps logs
// free of lookup keys.
impl fmt::Debug for CredentialHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CredentialHash({})", self.fingerprint())
    }
}

/// Short non-reversible derivative of a [`CredentialHash`]. Equality only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn anonymous() -> Self {
        Self(ANONYMOUS_FINGERPRINT.to_string())
    }

    pub fn is_anonymous(&self) -> bool {
        self.0 == ANONYMOUS_FINGERPRINT
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A stored credential. Never carries the raw secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub id: String,
    pub name: String,
    pub key_hash: CredentialHash,
    pub tier: Tier,
    pub status: Status,
    pub daily_quota: Quota,
    pub minute_quota: Quota,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl Credential {
    pub fn is_active(&self) -> bool {
        self.status == Status::Active
    }
}

/// Issuance request. Quotas left as `None` fall back to the tier defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCredential {
    pub name: String,
    pub tier: Tier,
    pub daily_quota: Option<Quota>,
    pub minute_quota: Option<Quota>,
}

impl NewCredential {
    pub fn new(name: impl Into<String>, tier: Tier) -> Self {
        Self {
            name: name.into(),
            tier,
            daily_quota: None,
            minute_quota: None,
        }
    }

    pub fn with_daily_quota(mut self, quota: Quota) -> Self {
        self.daily_quota = Some(quota);
        self
    }

    pub fn with_minute_quota(mut self, quota: Quota) -> Self {
        self.minute_quota = Some(quota);
        self
    }

    /// Build the stored row for this request from an already generated hash.
    pub fn into_credential(self, key_hash: CredentialHash, now: DateTime<Utc>) -> Credential {
        let (default_daily, default_minute) = self.tier.default_quotas();
        Credential {
            id: format!("key_{}", uuid::Uuid::new_v4().simple()),
            name: self.name,
            key_hash,
            tier: self.tier,
            status: Status::Active,
            daily_quota: self.daily_quota.unwrap_or(default_daily),
            minute_quota: self.minute_quota.unwrap_or(default_minute),
            created_at: now,
            last_used_at: None,
            revoked_at: None,
        }
    }
}

/// Result of issuance: the stored row plus the raw secret, shown exactly once.
#[derive(Clone)]
pub struct IssuedCredential {
    pub credential: Credential,
    pub secret: String,
}

impl fmt::Debug for IssuedCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuedCredential")
            .field("credential", &self.credential)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Generates raw secrets of the form `qg_<hex>`.
#[derive(Debug, Clone)]
pub struct SecretGenerator {
    prefix: String,
    byte_len: usize,
}

impl Default for SecretGenerator {
    fn default() -> Self {
        Self {
            prefix: SECRET_PREFIX.to_string(),
            byte_len: SECRET_BYTES,
        }
    }
}

impl SecretGenerator {
    /// Returns `(raw_secret, hash)`.
    pub fn generate(&self) -> (String, CredentialHash) {
        let mut bytes = vec![0u8; self.byte_len];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        let secret = format!("{}{}", self.prefix, hex::encode(bytes));
        let hash = CredentialHash::of(&secret);
        (secret, hash)
    }
}
