//! Configuration file and environment overrides.
//!
//! The file is TOML. Every key has a default, so an absent file is the same
//! as an empty one. `AUTHZ_*` environment variables win over file values.

use std::path::{Path, PathBuf};
use std::time::Duration;

use authz_acl::RefreshConfig;
use authz_storage::DEFAULT_TABLE;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// File read when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "authz.toml";

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "AUTHZ_CONFIG";

// ============================================================================
// Sections
// ============================================================================

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthzConfig {
    /// Fact store connection.
    pub database: DatabaseConfig,
    /// Background refresh.
    pub policy: PolicyConfig,
    /// Log output.
    pub log: LogConfig,
}

/// `[database]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// `postgres://...` or `sqlite:...`.
    pub url: String,
    /// Pool size.
    pub max_connections: u32,
    /// Fact table name.
    pub table: String,
    /// Bound on each storage call, in seconds.
    pub operation_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://authz.db?mode=rwc".to_string(),
            max_connections: 5,
            table: DEFAULT_TABLE.to_string(),
            operation_timeout_secs: 30,
        }
    }
}

/// `[policy]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Seconds between reloads.
    pub refresh_interval_secs: u64,
    /// Seconds a single reload may take.
    pub refresh_timeout_secs: u64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: 60,
            refresh_timeout_secs: 10,
        }
    }
}

/// `[log]`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Filter directive, e.g. `info,authz=debug`. Unset means the built-in default.
    pub level: Option<String>,
}

// ============================================================================
// Loading
// ============================================================================

impl AuthzConfig {
    /// Picks the file to read: the explicit path, then `AUTHZ_CONFIG`, then
    /// `authz.toml` in the working directory.
    pub fn resolve_path(explicit: Option<&Path>, env_path: Option<&str>) -> PathBuf {
        explicit
            .map(Path::to_path_buf)
            .or_else(|| env_path.filter(|p| !p.is_empty()).map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
    }

    /// Reads `path`. A missing file yields the defaults only when the path
    /// was not asked for explicitly.
    pub fn from_file(path: &Path, required: bool) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::from_toml(&content).map_err(|source| Error::Toml {
                path: path.to_path_buf(),
                source,
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && !required => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(Error::io_with_path(e, path)),
        }
    }

    /// Parses TOML text.
    pub fn from_toml(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Renders the configuration as TOML.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::config(e.to_string()))
    }

    /// Full load: file, then overrides from `vars`, then validation.
    pub fn load<I>(explicit: Option<&Path>, vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let vars: Vec<(String, String)> = vars.into_iter().collect();
        let env_path = vars
            .iter()
            .find(|(key, _)| key == CONFIG_ENV)
            .map(|(_, value)| value.as_str());
        let required = explicit.is_some() || env_path.is_some_and(|p| !p.is_empty());
        let path = Self::resolve_path(explicit, env_path);

        let mut config = Self::from_file(&path, required)?;
        config.apply_env_overrides(vars)?;
        config.validate()?;
        Ok(config)
    }

    /// Applies recognised `AUTHZ_*` variables. Unknown keys are ignored.
    pub fn apply_env_overrides<I>(&mut self, vars: I) -> Result<()>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            match key.as_str() {
                "AUTHZ_DATABASE_URL" => self.database.url = value,
                "AUTHZ_DATABASE_MAX_CONNECTIONS" => {
                    self.database.max_connections = parse_number(&key, &value)?;
                }
                "AUTHZ_DATABASE_TABLE" => self.database.table = value,
                "AUTHZ_DATABASE_OPERATION_TIMEOUT_SECS" => {
                    self.database.operation_timeout_secs = parse_number(&key, &value)?;
                }
                "AUTHZ_POLICY_REFRESH_INTERVAL_SECS" => {
                    self.policy.refresh_interval_secs = parse_number(&key, &value)?;
                }
                "AUTHZ_POLICY_REFRESH_TIMEOUT_SECS" => {
                    self.policy.refresh_timeout_secs = parse_number(&key, &value)?;
                }
                "AUTHZ_LOG_LEVEL" => self.log.level = Some(value),
                _ => {}
            }
        }
        Ok(())
    }

    /// Rejects values the services cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.database.url.trim().is_empty() {
            return Err(Error::config("database.url must not be empty"));
        }
        if self.database.max_connections == 0 {
            return Err(Error::config("database.max_connections must be positive"));
        }
        authz_storage::database::validate_table_name(&self.database.table)?;
        if self.database.operation_timeout_secs == 0 {
            return Err(Error::config(
                "database.operation_timeout_secs must be positive",
            ));
        }
        if self.policy.refresh_interval_secs == 0 {
            return Err(Error::config("policy.refresh_interval_secs must be positive"));
        }
        if self.policy.refresh_timeout_secs == 0 {
            return Err(Error::config("policy.refresh_timeout_secs must be positive"));
        }
        Ok(())
    }

    /// Refresh cadence for the policy engine.
    pub fn refresh_config(&self) -> RefreshConfig {
        RefreshConfig {
            interval: Duration::from_secs(self.policy.refresh_interval_secs),
            timeout: Duration::from_secs(self.policy.refresh_timeout_secs),
        }
    }

    /// Bound on each storage call.
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.database.operation_timeout_secs)
    }

    /// The configuration as `AUTHZ_*` variables, in a stable order.
    pub fn to_env_vars(&self) -> Vec<(String, String)> {
        let mut vars = vec![
            ("AUTHZ_DATABASE_URL".to_string(), self.database.url.clone()),
            (
                "AUTHZ_DATABASE_MAX_CONNECTIONS".to_string(),
                self.database.max_connections.to_string(),
            ),
            ("AUTHZ_DATABASE_TABLE".to_string(), self.database.table.clone()),
            (
                "AUTHZ_DATABASE_OPERATION_TIMEOUT_SECS".to_string(),
                self.database.operation_timeout_secs.to_string(),
            ),
            (
                "AUTHZ_POLICY_REFRESH_INTERVAL_SECS".to_string(),
                self.policy.refresh_interval_secs.to_string(),
            ),
            (
                "AUTHZ_POLICY_REFRESH_TIMEOUT_SECS".to_string(),
                self.policy.refresh_timeout_secs.to_string(),
            ),
        ];
        if let Some(level) = &self.log.level {
            vars.push(("AUTHZ_LOG_LEVEL".to_string(), level.clone()));
        }
        vars
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::config(format!("{key}: expected a non-negative integer, got '{value}'")))
}
