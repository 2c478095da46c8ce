//! Shared fixtures for the CLI tests.

use std::path::PathBuf;
use std::process::ExitCode;

use authz_cli::{AuthzConfig, Command, commands};
use tempfile::TempDir;

/// A configuration pointing at a fresh SQLite database.
pub struct Workspace {
    dir: TempDir,
    pub config: AuthzConfig,
}

impl Workspace {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let mut config = AuthzConfig::default();
        config.database.url = format!(
            "sqlite://{}?mode=rwc",
            dir.path().join("authz.db").display()
        );
        config.database.max_connections = 1;
        Self { dir, config }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Writes `content` to a file in the workspace.
    pub fn write(&self, name: &str, content: &str) -> PathBuf {
        let path = self.path(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    /// Runs a command, returning its exit code and output.
    pub async fn run(&self, command: Command) -> (ExitCode, String) {
        let mut out = Vec::new();
        let code = commands::run(command, &self.config, &self.config_path(), &mut out)
            .await
            .unwrap();
        (code, String::from_utf8(out).unwrap())
    }

    /// Runs a command that is expected to fail.
    pub async fn run_err(&self, command: Command) -> authz_cli::Error {
        let mut out = Vec::new();
        commands::run(command, &self.config, &self.config_path(), &mut out)
            .await
            .unwrap_err()
    }

    fn config_path(&self) -> PathBuf {
        self.path("authz.toml")
    }

    /// The stored fact lines, sorted.
    pub async fn dump(&self) -> Vec<String> {
        let (_, out) = self
            .run(Command::Dump {
                kind: None,
                subject: None,
            })
            .await;
        out.lines().map(str::to_string).collect()
    }
}

/// Whether `code` is the success code.
pub fn succeeded(code: ExitCode) -> bool {
    format!("{code:?}") == format!("{:?}", ExitCode::SUCCESS)
}
