//! Credential admission and dual-window quota enforcement.
//!
//! This crate turns an opaque caller-supplied secret into an allow/deny
//! decision, providing:
//!
//! - Hash-only credential registry (SQLite or in-memory)
//! - Per-minute and per-day quotas with an indivisible check-and-increment
//! - Static fallback keys, honored only while the store is not provisioned
//! - Session to credential binding for long-lived connections
//!
//! # Quick Start
//!
//! ```no_run
//! use quotagate_core::{
//!     AuthorizationGateway, CredentialAdmin, NewCredential, SqliteStore, Tier,
//! };
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let store = SqliteStore::open(std::path::Path::new("quotagate.db"))?;
//! store.provision()?;
//! let issued = store.issue(NewCredential::new("ci", Tier::Free), chrono::Utc::now())?;
//!
//! let gateway = AuthorizationGateway::new(Some(Arc::new(store)));
//! let admission = gateway.authorize(&issued.secret, chrono::Utc::now()).await?;
//! println!("admitted via {}", admission.source);
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration
//!
//! | Environment Variable | Description |
//! |---------------------|-------------|
//! | `QUOTAGATE_AUTH_MODE` | `required` (default) or `disabled` |
//! | `QUOTAGATE_STORE` | `sqlite` (default), `memory` or `none` |
//! | `QUOTAGATE_DB_PATH` | SQLite file (default: `quotagate.db`) |
//! | `QUOTAGATE_FALLBACK_ENABLED` | Honor fallback keys while the store is not provisioned |
//! | `QUOTAGATE_FALLBACK_KEYS` | Comma-separated fallback secrets |
//! | `QUOTAGATE_BACKEND_TIMEOUT_MS` | Admission backend timeout (default: 5000) |
//! | `QUOTAGATE_DAY_UTC_OFFSET_MINUTES` | Fixed UTC offset for day windows (default: 0) |

pub mod config;
pub mod counter;
pub mod credential;
pub mod decision;
pub mod error;
pub mod fallback;
pub mod gateway;
pub mod session;
pub mod store;
pub mod window;

pub use config::{
    AuthMode, ConfigError, FallbackConfig, GatewayConfig, StoreConfig, StoreHandle,
};
pub use counter::{ConsumeOutcome, MemoryQuotaCounter, QuotaCounter};
pub use credential::{
    Credential, CredentialHash, Fingerprint, IssuedCredential, NewCredential, Quota,
    SecretGenerator, Status, Tier,
};
pub use decision::{Admission, Reason, Source, UsageDecision};
pub use error::{AuthError, Denial};
pub use fallback::FallbackKeySet;
pub use gateway::AuthorizationGateway;
pub use session::{BindOutcome, SessionBindings};
pub use store::{
    AdmissionBackend, CredentialAdmin, CredentialStore, MemoryStore, RevokeOutcome, SqliteStore,
    StoreError, UsageSnapshot, WindowUsage,
};
pub use window::{Window, WindowClock, WindowKey};
