pub mod args;
pub mod commands;

pub use args::{Cli, Command};
pub use commands::dispatch;

use anyhow::Context;
use quotagate_core::{GatewayConfig, StoreConfig};

/// File (if any), then `QUOTAGATE_*` variables, then global flags.
pub fn load_config(cli: &Cli) -> anyhow::Result<GatewayConfig> {
    let mut config = match &cli.config {
        Some(path) => GatewayConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => GatewayConfig::default(),
    };
    config
        .apply_env(|name| std::env::var(name).ok())
        .context("applying QUOTAGATE_* environment")?;

    if let Some(db) = &cli.db {
        config.store = StoreConfig::Sqlite { path: db.clone() };
    }
    Ok(config)
}
