//! Command-line interface definitions using clap derive macros.
//!
//! Contains the top-level [`Cli`] parser, the [`Commands`] enum for
//! subcommands (run, validate, health), and their associated argument
//! structs. Every flag has an environment variable equivalent for
//! container deployments.

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(
    name = "api-proxy",
    version,
    about = "Single-upstream HTTP reverse proxy",
    propagate_version = true,
    after_help = "\x1b[1mQuick start:\x1b[0m\n  \
        api-proxy run                                   Proxy :3001 to http://localhost:3000\n  \
        api-proxy run -u https://api.internal -p 8080   Specific upstream and port\n  \
        api-proxy validate -u https://api.internal      Check settings without starting"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the proxy server
    Run(Box<RunArgs>),

    /// Validate upstream settings without starting
    Validate(ValidateArgs),

    /// Check health of a running instance
    Health(HealthArgs),
}

/// Settings that describe the upstream and how it is reached.
#[derive(Args, Clone, Debug)]
pub struct UpstreamArgs {
    /// Upstream base URL (http:// or https://)
    #[arg(
        short,
        long,
        env = "UPSTREAM_URL",
        default_value = "http://localhost:3000"
    )]
    pub upstream_url: String,

    /// Upstream request timeout in milliseconds (connect + first response byte)
    #[arg(long, env = "TIMEOUT", default_value_t = 30_000)]
    pub timeout: u64,

    /// Reuse upstream connections (any value other than "false" enables it)
    #[arg(
        long,
        env = "KEEP_ALIVE",
        default_value = "true",
        action = ArgAction::Set,
        value_parser = parse_keep_alive
    )]
    pub keep_alive: bool,
}

#[derive(Args)]
#[command(after_help = "\x1b[1mExamples:\x1b[0m\n  \
        api-proxy run                                       Defaults from env\n  \
        api-proxy run -u http://backend:8080 --timeout 5000 Custom upstream\n  \
        api-proxy run --environment production --json       Quiet JSON logs")]
pub struct RunArgs {
    #[command(flatten)]
    pub upstream: UpstreamArgs,

    /// Listen port
    #[arg(short, long, env = "PORT", default_value_t = 3001)]
    pub port: u16,

    /// Listen address
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Environment tag; "development" logs every proxied request
    #[arg(long, env = "APP_ENV", default_value = "development")]
    pub environment: String,

    // -- Logging --
    /// Log level
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: LogLevel,

    /// Force pretty (human-readable) log output
    #[arg(long)]
    pub pretty: bool,

    /// Force JSON log output (overrides TTY detection)
    #[arg(long, conflicts_with = "pretty")]
    pub json: bool,

    // -- Tuning --
    /// Largest JSON request body that is buffered and re-serialized, in bytes
    #[arg(
        long,
        env = "MAX_JSON_BODY",
        default_value_t = 1024,
        help_heading = "Tuning"
    )]
    pub max_json_body: usize,
}

#[derive(Args)]
pub struct ValidateArgs {
    #[command(flatten)]
    pub upstream: UpstreamArgs,

    /// Output format
    #[arg(long, default_value = "text")]
    pub format: ValidateFormat,
}

#[derive(Args)]
pub struct HealthArgs {
    /// URL of the running instance
    #[arg(default_value = "http://localhost:3001")]
    pub url: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[allow(clippy::unnecessary_wraps)]
fn parse_keep_alive(value: &str) -> Result<bool, String> {
    Ok(value != "false")
}

#[derive(Clone, Debug, ValueEnum)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    #[must_use]
    pub const fn to_tracing_level(&self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

#[derive(Clone, Debug, ValueEnum)]
pub enum ValidateFormat {
    Text,
    Json,
}
