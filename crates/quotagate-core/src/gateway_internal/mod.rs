//! Implementation modules for `gateway`.
//!
//! `src/gateway.rs` is the stable facade; the decision tree lives in `run`.

pub(crate) mod run;
