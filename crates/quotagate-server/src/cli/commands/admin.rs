//! Operator commands against the SQLite registry.

use crate::cli::args::IssueArgs;
use anyhow::{bail, Context};
use chrono::{DateTime, Utc};
use quotagate_core::{
    Credential, CredentialAdmin, Fingerprint, GatewayConfig, NewCredential, Quota, SqliteStore,
    Status, StoreHandle, Tier,
};
use serde::Serialize;

/// Listing view: everything but the hash itself.
#[derive(Debug, Serialize)]
pub struct CredentialView {
    pub id: String,
    pub name: String,
    pub tier: Tier,
    pub status: Status,
    pub daily_quota: Quota,
    pub minute_quota: Quota,
    pub fingerprint: Fingerprint,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl From<Credential> for CredentialView {
    fn from(c: Credential) -> Self {
        Self {
            fingerprint: c.key_hash.fingerprint(),
            id: c.id,
            name: c.name,
            tier: c.tier,
            status: c.status,
            daily_quota: c.daily_quota,
            minute_quota: c.minute_quota,
            created_at: c.created_at,
            last_used_at: c.last_used_at,
            revoked_at: c.revoked_at,
        }
    }
}

fn registry(config: &GatewayConfig) -> anyhow::Result<SqliteStore> {
    match config.open_store().context("opening credential store")? {
        StoreHandle::Sqlite(store) => Ok(store),
        other => bail!(
            "admin commands need a sqlite store (configured: {})",
            other.kind()
        ),
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn migrate(config: &GatewayConfig) -> anyhow::Result<i32> {
    let store = registry(config)?;
    store.provision().context("provisioning schema")?;
    eprintln!("credential store provisioned");
    Ok(0)
}

pub fn issue(config: &GatewayConfig, args: IssueArgs) -> anyhow::Result<i32> {
    let store = registry(config)?;
    let mut request = NewCredential::new(args.name, args.tier);
    if let Some(q) = args.daily_quota {
        request = request.with_daily_quota(q);
    }
    if let Some(q) = args.minute_quota {
        request = request.with_minute_quota(q);
    }

    let issued = store.issue(request, Utc::now()).context("issuing credential")?;

    #[derive(Serialize)]
    struct Issued {
        #[serde(flatten)]
        credential: CredentialView,
        secret: String,
    }
    print_json(&Issued {
        credential: issued.credential.into(),
        secret: issued.secret,
    })?;
    eprintln!("store the secret now; it cannot be shown again");
    Ok(0)
}

pub fn revoke(config: &GatewayConfig, id: &str) -> anyhow::Result<i32> {
    let store = registry(config)?;
    let outcome = store
        .revoke(id, Utc::now())
        .with_context(|| format!("revoking {id}"))?;
    print_json(&serde_json::json!({ "id": id, "outcome": outcome }))?;
    Ok(0)
}

pub fn list(config: &GatewayConfig) -> anyhow::Result<i32> {
    let store = registry(config)?;
    let views: Vec<CredentialView> = store
        .list()
        .context("listing credentials")?
        .into_iter()
        .map(CredentialView::from)
        .collect();
    print_json(&views)?;
    Ok(0)
}

pub fn usage(config: &GatewayConfig, id: &str) -> anyhow::Result<i32> {
    let store = registry(config)?;
    let snapshot = store
        .usage(id, Utc::now())
        .with_context(|| format!("reading usage for {id}"))?;
    print_json(&snapshot)?;
    Ok(0)
}
