//! Command-line surface of the `authz` binary.

use std::path::PathBuf;

use authz_core::FactKind;
use clap::{Parser, Subcommand};

use crate::error::Error;

/// authz - group and user authorization administration
#[derive(Parser, Debug)]
#[command(name = "authz")]
#[command(version, about = "Administer authz policy facts", long_about = None)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "AUTHZ_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Command,
}

/// Top-level commands.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Create the fact table if it does not exist
    Migrate,

    /// Replace every stored fact with the lines of a file
    Seed {
        /// File with one fact line per row (`p, subject, object, action`)
        file: PathBuf,
    },

    /// Print stored facts, optionally filtered
    Dump {
        /// Only facts of this kind (`p` or `g`)
        #[arg(long)]
        kind: Option<FactKind>,

        /// Only facts whose first field is this subject (e.g. `group::3`)
        #[arg(long)]
        subject: Option<String>,
    },

    /// Evaluate one request; exits non-zero when denied
    Check {
        /// Requesting subject, e.g. `user::7`
        subject: String,
        /// Object, e.g. `permission::2`
        object: String,
        /// Action, e.g. `read`
        action: String,
    },

    /// Show a group's members and effective permissions
    ShowGroup {
        /// Group id
        group: i32,
    },

    /// Converge a group to exactly the given users and permissions
    Reconcile {
        /// Group id
        #[arg(long)]
        group: i32,

        /// Desired member (repeatable)
        #[arg(long = "user")]
        users: Vec<i32>,

        /// Desired permission as `ID=ACTION` (repeatable)
        #[arg(long = "permission", value_parser = parse_permission_grant)]
        permissions: Vec<(i32, String)>,
    },

    /// Remove every fact naming a group
    DeleteGroup {
        /// Group id
        group: i32,
    },

    /// Keep the policy refreshed from storage until interrupted
    Serve,

    /// Configuration helpers
    Config {
        /// Config action
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// `authz config` actions.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ConfigAction {
    /// Print the resolved config file path
    Path,

    /// Print the effective configuration as TOML
    Show,

    /// Write a default configuration file
    Init {
        /// Target file (defaults to the resolved path)
        #[arg(long)]
        file: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Print the effective configuration as environment variables
    Export {
        /// Omit `export` so the output can be used as a docker env file
        #[arg(long)]
        docker_env: bool,
    },
}

/// Parses `ID=ACTION`.
pub fn parse_permission_grant(value: &str) -> Result<(i32, String), Error> {
    let (id, action) = value
        .split_once('=')
        .ok_or_else(|| Error::invalid_argument(format!("expected ID=ACTION, got '{value}'")))?;
    let id = id
        .trim()
        .parse::<i32>()
        .map_err(|_| Error::invalid_argument(format!("'{id}' is not a permission id")))?;
    let action = action.trim();
    if action.is_empty() {
        return Err(Error::invalid_argument(format!("missing action in '{value}'")));
    }
    Ok((id, action.to_string()))
}
