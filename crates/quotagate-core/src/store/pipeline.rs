//! Fixed-order validate-and-charge chain.
//!
//! 1. Look up the hash (`invalid_key` when absent)
//! 2. Check status (`revoked_key`, no window touched)
//! 3. Charge the minute window (`minute_limit_exceeded`)
//! 4. Charge the day window (`daily_limit_exceeded`)
//! 5. Touch `last_used_at` and admit
//!
//! A step's side effect only runs when every earlier step passed. The minute
//! charge from step 3 is kept when step 4 denies.

use super::{CredentialStore, StoreError};
use crate::counter::QuotaCounter;
use crate::credential::CredentialHash;
use crate::decision::UsageDecision;
use crate::window::{Window, WindowClock};
use chrono::{DateTime, Utc};

pub fn evaluate<S, C>(
    store: &S,
    counter: &C,
    clock: &WindowClock,
    hash: &CredentialHash,
    now: DateTime<Utc>,
) -> Result<UsageDecision, StoreError>
where
    S: CredentialStore + ?Sized,
    C: QuotaCounter + ?Sized,
{
    let Some(credential) = store.find_by_hash(hash)? else {
        return Ok(UsageDecision::invalid_key());
    };

    if !credential.is_active() {
        return Ok(UsageDecision::revoked_key(&credential));
    }

    let minute = counter.consume(
        &credential.id,
        &clock.key(Window::Minute, now),
        credential.minute_quota,
        now,
    )?;
    if !minute.admitted {
        return Ok(UsageDecision::minute_limit_exceeded(
            &credential,
            minute.count,
        ));
    }

    let day = counter.consume(
        &credential.id,
        &clock.key(Window::Day, now),
        credential.daily_quota,
        now,
    )?;
    if !day.admitted {
        return Ok(UsageDecision::daily_limit_exceeded(
            &credential,
            minute.count,
            day.count,
        ));
    }

    store.touch_last_used(&credential.id, now)?;
    Ok(UsageDecision::admitted(&credential, minute.count, day.count))
}
