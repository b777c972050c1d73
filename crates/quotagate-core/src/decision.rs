//! Decision record handed to the transport layer.
//!
//! `null` quota means unlimited; `null` count means the window was not
//! evaluated for this decision.

use crate::credential::{Credential, Fingerprint, Quota, Tier};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Response header names attached to admitted requests.
pub const HEADER_DAILY_LIMIT: &str = "x-ratelimit-daily-limit";
pub const HEADER_DAILY_REMAINING: &str = "x-ratelimit-daily-remaining";
pub const HEADER_MINUTE_LIMIT: &str = "x-ratelimit-minute-limit";
pub const HEADER_MINUTE_REMAINING: &str = "x-ratelimit-minute-remaining";
pub const HEADER_TIER: &str = "x-api-tier";
pub const HEADER_SOURCE: &str = "x-auth-source";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reason {
    Ok,
    InvalidKey,
    RevokedKey,
    MinuteLimitExceeded,
    DailyLimitExceeded,
}

impl Reason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::InvalidKey => "invalid_key",
            Self::RevokedKey => "revoked_key",
            Self::MinuteLimitExceeded => "minute_limit_exceeded",
            Self::DailyLimitExceeded => "daily_limit_exceeded",
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageDecision {
    pub allowed: bool,
    pub reason: Reason,
    pub credential_id: Option<String>,
    pub key_name: Option<String>,
    pub tier: Option<Tier>,
    pub daily_quota: Option<u64>,
    pub daily_count: Option<u64>,
    pub minute_quota: Option<u64>,
    pub minute_count: Option<u64>,
}

impl UsageDecision {
    fn for_credential(credential: &Credential, allowed: bool, reason: Reason) -> Self {
        Self {
            allowed,
            reason,
            credential_id: Some(credential.id.clone()),
            key_name: Some(credential.name.clone()),
            tier: Some(credential.tier),
            daily_quota: credential.daily_quota.limit(),
            daily_count: None,
            minute_quota: credential.minute_quota.limit(),
            minute_count: None,
        }
    }

    /// Unknown hash: every identity, quota and count field is null.
    pub fn invalid_key() -> Self {
        Self {
            allowed: false,
            reason: Reason::InvalidKey,
            credential_id: None,
            key_name: None,
            tier: None,
            daily_quota: None,
            daily_count: None,
            minute_quota: None,
            minute_count: None,
        }
    }

    /// Quotas echoed for observability; no window was touched.
    pub fn revoked_key(credential: &Credential) -> Self {
        Self::for_credential(credential, false, Reason::RevokedKey)
    }

    pub fn minute_limit_exceeded(credential: &Credential, minute_count: u64) -> Self {
        Self {
            minute_count: Some(minute_count),
            ..Self::for_credential(credential, false, Reason::MinuteLimitExceeded)
        }
    }

    /// `minute_count` is the already-charged minute count; that charge stands.
    pub fn daily_limit_exceeded(
        credential: &Credential,
        minute_count: u64,
        daily_count: u64,
    ) -> Self {
        Self {
            minute_count: Some(minute_count),
            daily_count: Some(daily_count),
            ..Self::for_credential(credential, false, Reason::DailyLimitExceeded)
        }
    }

    pub fn admitted(credential: &Credential, minute_count: u64, daily_count: u64) -> Self {
        Self {
            minute_count: Some(minute_count),
            daily_count: Some(daily_count),
            ..Self::for_credential(credential, true, Reason::Ok)
        }
    }

    /// Admission without any store involvement (fallback or anonymous).
    pub fn untracked() -> Self {
        Self {
            allowed: true,
            reason: Reason::Ok,
            ..Self::invalid_key()
        }
    }
}

/// Where an admission came from. Fallback admissions stay distinguishable
/// from store-backed ones in logs and response headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Store,
    Fallback,
    Anonymous,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Store => "store",
            Self::Fallback => "fallback",
            Self::Anonymous => "anonymous",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A successful authorization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Admission {
    pub source: Source,
    pub fingerprint: Fingerprint,
    pub decision: UsageDecision,
}

impl Admission {
    pub fn store(fingerprint: Fingerprint, decision: UsageDecision) -> Self {
        Self {
            source: Source::Store,
            fingerprint,
            decision,
        }
    }

    pub fn fallback(fingerprint: Fingerprint) -> Self {
        Self {
            source: Source::Fallback,
            fingerprint,
            decision: UsageDecision::untracked(),
        }
    }

    pub fn anonymous() -> Self {
        Self {
            source: Source::Anonymous,
            fingerprint: Fingerprint::anonymous(),
            decision: UsageDecision::untracked(),
        }
    }

    pub fn tier(&self) -> Option<Tier> {
        self.decision.tier
    }

    /// Remaining-quota headers. Limit/remaining pairs are omitted for
    /// unlimited windows; remaining is floored at zero.
    pub fn quota_headers(&self) -> Vec<(&'static str, String)> {
        let d = &self.decision;
        let mut headers = Vec::new();

        let windows = [
            (d.daily_quota, d.daily_count, HEADER_DAILY_LIMIT, HEADER_DAILY_REMAINING),
            (d.minute_quota, d.minute_count, HEADER_MINUTE_LIMIT, HEADER_MINUTE_REMAINING),
        ];
        for (quota, count, limit_header, remaining_header) in windows {
            let quota = Quota::from(quota);
            if let (Some(limit), Some(remaining)) =
                (quota.limit(), quota.remaining(count.unwrap_or(0)))
            {
                headers.push((limit_header, limit.to_string()));
                headers.push((remaining_header, remaining.to_string()));
            }
        }
        if let Some(tier) = d.tier {
            headers.push((HEADER_TIER, tier.as_str().to_string()));
        }
        headers.push((HEADER_SOURCE, self.source.as_str().to_string()));
        headers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::{CredentialHash, NewCredential, Quota};
    use chrono::Utc;

    fn credential() -> Credential {
        NewCredential::new("reporting", Tier::Starter)
            .with_daily_quota(Quota::Limited(100))
            .with_minute_quota(Quota::Unlimited)
            .into_credential(CredentialHash::of("qg_x"), Utc::now())
    }

    #[test]
    fn test_invalid_key_is_all_null() {
        let json = serde_json::to_value(UsageDecision::invalid_key()).unwrap();
        assert_eq!(json["allowed"], false);
        assert_eq!(json["reason"], "invalid_key");
        for field in [
            "credential_id",
            "key_name",
            "tier",
            "daily_quota",
            "daily_count",
            "minute_quota",
            "minute_count",
        ] {
            assert!(json[field].is_null(), "{field} should be null");
        }
    }

    #[test]
    fn test_revoked_echoes_quotas_without_counts() {
        let d = UsageDecision::revoked_key(&credential());
        assert_eq!(d.reason, Reason::RevokedKey);
        assert_eq!(d.daily_quota, Some(100));
        assert_eq!(d.minute_quota, None);
        assert_eq!(d.daily_count, None);
        assert_eq!(d.minute_count, None);
    }

    #[test]
    fn test_quota_headers_omit_unlimited_windows() {
        let c = credential();
        let admission = Admission::store(
            c.key_hash.fingerprint(),
            UsageDecision::admitted(&c, 12, 99),
        );
        let headers = admission.quota_headers();
        assert!(headers.contains(&(HEADER_DAILY_LIMIT, "100".to_string())));
        assert!(headers.contains(&(HEADER_DAILY_REMAINING, "1".to_string())));
        assert!(!headers.iter().any(|(k, _)| *k == HEADER_MINUTE_LIMIT));
        assert!(headers.contains(&(HEADER_TIER, "starter".to_string())));
        assert!(headers.contains(&(HEADER_SOURCE, "store".to_string())));
    }

    #[test]
    fn test_remaining_floors_at_zero() {
        let mut d = UsageDecision::admitted(&credential(), 1, 1);
        d.daily_count = Some(150);
        let headers = Admission::store(Fingerprint::anonymous(), d).quota_headers();
        assert!(headers.contains(&(HEADER_DAILY_REMAINING, "0".to_string())));
    }

    #[test]
    fn test_fallback_headers_only_carry_source() {
        let headers = Admission::fallback(CredentialHash::of("shared").fingerprint()).quota_headers();
        assert_eq!(headers, vec![(HEADER_SOURCE, "fallback".to_string())]);
    }
}
