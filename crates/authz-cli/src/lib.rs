//! # authz-cli
//!
//! Administration tooling for the authz fact store:
//! - schema creation and bulk seeding from fact lines
//! - filtered dumps and one-off authorization checks
//! - group reconciliation and cascade deletion
//! - a long-running refresh loop (`serve`)
//! - configuration file helpers

#![warn(missing_docs)]
#![warn(clippy::all)]
#![forbid(unsafe_code)]

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod logging;

pub use cli::{Cli, Command, ConfigAction};
pub use config::AuthzConfig;
pub use error::{Error, Result};
