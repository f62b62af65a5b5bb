//! Subcommand dispatch and execution.
//!
//! The [`dispatch`] function routes the parsed CLI to the appropriate
//! subcommand handler: [`run`], [`validate`], or [`health`]. Each handler
//! lives in its own submodule.

pub mod health;
pub mod run;
pub mod validate;

use crate::cli::{Cli, Commands};
use crate::error::ApiProxyError;

pub async fn dispatch(cli: Cli) -> Result<(), ApiProxyError> {
    match cli.command {
        Some(Commands::Run(args)) => run::execute(*args).await,
        Some(Commands::Validate(ref args)) => validate::execute(args),
        Some(Commands::Health(args)) => health::execute(args).await,
        None => {
            print_welcome();
            Ok(())
        }
    }
}

fn print_welcome() {
    let version = env!("CARGO_PKG_VERSION");
    println!(
        "\n  api-proxy v{version} - single-upstream HTTP reverse proxy\n\n  \
         No command provided. To get started:\n\n    \
         api-proxy run                              Proxy :3001 to $UPSTREAM_URL\n    \
         api-proxy run -u http://backend:8080       Start with a specific upstream\n    \
         api-proxy validate                         Check the upstream settings\n    \
         api-proxy --help                           See all commands and options\n"
    );
}
