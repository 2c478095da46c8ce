//! authz CLI
//!
//! Command-line interface for authz fact store administration.

#![warn(clippy::all)]
#![forbid(unsafe_code)]

use std::process::ExitCode;

use anyhow::{Context, Result};
use authz_cli::{AuthzConfig, Cli, Command, ConfigAction, commands, config::CONFIG_ENV, logging};
use clap::Parser;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Cli::parse();

    // `config init` creates the file the other commands would fail to read.
    let config = match &args.command {
        Command::Config {
            action: ConfigAction::Init { .. },
        } => AuthzConfig::default(),
        _ => AuthzConfig::load(args.config.as_deref(), std::env::vars())
            .context("failed to load configuration")?,
    };
    logging::init(config.log.level.as_deref());

    let env_path = std::env::var(CONFIG_ENV).ok();
    let config_path = AuthzConfig::resolve_path(args.config.as_deref(), env_path.as_deref());
    tracing::debug!(config = %config_path.display(), "configuration loaded");

    let mut stdout = std::io::stdout().lock();
    let code = commands::run(args.command, &config, &config_path, &mut stdout).await?;
    Ok(code)
}
