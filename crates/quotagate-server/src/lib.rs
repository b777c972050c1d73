//! HTTP transport adapter and operator CLI for the quotagate admission core.
//!
//! - [`http::router`]: `/health` plus the session-bearing `/mcp` endpoint,
//!   guarded by [`http::admission_layer`]
//! - [`cli`]: `serve`, `migrate` and the credential admin commands

pub mod cli;
pub mod http;
pub mod logging;
