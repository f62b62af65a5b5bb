//! api-proxy is a single-upstream HTTP reverse proxy.
//!
//! Every inbound request (except the local health check) is relayed to one
//! configured upstream over a pooled connection, with forwarding headers
//! added, a per-request deadline, and a fixed mapping of upstream failures
//! to `502 Bad Gateway` / `504 Gateway Timeout` JSON responses.
//!
//! # Architecture
//!
//! - [`cli`] -- Command-line argument parsing with clap derive macros.
//! - [`cmd`] -- Subcommand dispatch and execution (run, validate, health).
//! - [`config`] -- Immutable startup configuration and its validation.
//! - [`error`] -- Unified error types using `thiserror`.
//! - [`health`] -- `GET /health` endpoint handler.
//! - [`logging`] -- Structured tracing setup with JSON and pretty-print output.
//! - [`middleware`] -- Panic-to-500 conversion at the outermost boundary.
//! - [`proxy`] -- Core forwarding: transport pool, header rewriting, body
//!   preparation, failure classification, and protocol upgrades.
//! - [`server`] -- Axum server setup, shared application state, and graceful
//!   shutdown with a bounded grace period.

// Binary crate; public functions are internal, not consumed by external users.
#![allow(clippy::missing_errors_doc)]

pub mod cli;
pub mod cmd;
pub mod config;
pub mod error;
pub mod health;
pub mod logging;
pub mod middleware;
pub mod proxy;
pub mod server;
