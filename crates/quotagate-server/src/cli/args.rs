use crate::logging::LogFormat;
use clap::{Parser, Subcommand};
use quotagate_core::{Quota, Tier};
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "quotagate",
    version,
    about = "Credential admission and quota enforcement gateway"
)]
pub struct Cli {
    /// YAML config file. Environment variables and flags override it.
    #[arg(long, global = true, env = "QUOTAGATE_CONFIG")]
    pub config: Option<PathBuf>,

    /// SQLite database path (overrides config and QUOTAGATE_DB_PATH)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        value_enum,
        default_value_t = LogFormat::Text,
        env = "QUOTAGATE_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the HTTP gateway
    Serve(ServeArgs),
    /// Create the credential tables (idempotent)
    Migrate,
    /// Issue a credential and print its secret once
    Issue(IssueArgs),
    /// Revoke a credential by id
    Revoke(RevokeArgs),
    /// List credentials (never secrets)
    List,
    /// Show current minute and day usage without charging
    Usage(UsageArgs),
}

#[derive(clap::Args, Debug)]
pub struct ServeArgs {
    #[arg(long, default_value = "127.0.0.1:8080", env = "QUOTAGATE_LISTEN")]
    pub listen: SocketAddr,

    /// Admit every request as the anonymous identity
    #[arg(long)]
    pub auth_disabled: bool,

    #[arg(long)]
    pub backend_timeout_ms: Option<u64>,
}

#[derive(clap::Args, Debug)]
pub struct IssueArgs {
    #[arg(long)]
    pub name: String,

    #[arg(long, default_value = "free")]
    pub tier: Tier,

    /// Daily quota, a number or `unlimited` (default: tier default)
    #[arg(long)]
    pub daily_quota: Option<Quota>,

    /// Per-minute quota, a number or `unlimited` (default: tier default)
    #[arg(long)]
    pub minute_quota: Option<Quota>,
}

#[derive(clap::Args, Debug)]
pub struct RevokeArgs {
    pub id: String,
}

#[derive(clap::Args, Debug)]
pub struct UsageArgs {
    pub id: String,
}
