//! Command implementations.
//!
//! Every command writes its result to the supplied writer so the binary can
//! pass stdout and tests can pass a buffer. Diagnostics go through `tracing`.

use std::future::Future;
use std::io::Write;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use authz_acl::{PolicyEngine, Reconciler};
use authz_core::{Fact, FactKind, FactSet, Group, Permission, Subject, SubjectKind, User};
use authz_storage::{FactFilter, FactStore, SqlFactStore};

use crate::cli::{Command, ConfigAction};
use crate::config::AuthzConfig;
use crate::error::{Error, Result};

// ============================================================================
// Dispatch
// ============================================================================

/// Runs `command`. `config_path` is the file the configuration was read from.
pub async fn run(
    command: Command,
    config: &AuthzConfig,
    config_path: &Path,
    out: &mut dyn Write,
) -> Result<ExitCode> {
    match command {
        Command::Migrate => migrate(config, out).await,
        Command::Seed { file } => seed(config, &file, out).await,
        Command::Dump { kind, subject } => dump(config, kind, subject.as_deref(), out).await,
        Command::Check {
            subject,
            object,
            action,
        } => check(config, &subject, &object, &action, out).await,
        Command::ShowGroup { group } => show_group(config, group, out).await,
        Command::Reconcile {
            group,
            users,
            permissions,
        } => reconcile(config, group, &users, &permissions, out).await,
        Command::DeleteGroup { group } => delete_group(config, group, out).await,
        Command::Serve => {
            let engine = open_engine(config).await?;
            serve(engine, config, shutdown_signal(), out).await
        }
        Command::Config { action } => config_command(action, config, config_path, out),
    }
}

/// Connects to the configured store and makes sure the table exists.
pub async fn open_store(config: &AuthzConfig) -> Result<Arc<SqlFactStore>> {
    let store = SqlFactStore::connect(
        &config.database.url,
        config.database.max_connections,
        &config.database.table,
    )
    .await?
    .with_operation_timeout(config.operation_timeout());
    store.ensure_schema().await?;
    Ok(Arc::new(store))
}

/// Opens the store and loads the full policy.
pub async fn open_engine(config: &AuthzConfig) -> Result<Arc<PolicyEngine>> {
    let store = open_store(config).await?;
    let engine = PolicyEngine::new(store).await?;
    Ok(Arc::new(engine))
}

// ============================================================================
// Storage commands
// ============================================================================

async fn migrate(config: &AuthzConfig, out: &mut dyn Write) -> Result<ExitCode> {
    let store = open_store(config).await?;
    writeln!(out, "table {} ready", store.table())?;
    store.close().await;
    Ok(ExitCode::SUCCESS)
}

/// Reads fact lines. Blank lines and `#` comments are skipped.
///
/// Every subject field must be namespaced (`user::7`, `group::3`,
/// `permission::2`).
pub fn read_fact_file(path: &Path) -> Result<FactSet> {
    let content = std::fs::read_to_string(path).map_err(|e| Error::io_with_path(e, path))?;
    parse_fact_lines(&content).map_err(|(line, e)| {
        Error::invalid_argument(format!("{}:{line}: {e}", path.display()))
    })
}

fn parse_fact_lines(content: &str) -> std::result::Result<FactSet, (usize, authz_core::Error)> {
    let mut facts = FactSet::new();
    for (index, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let fact = Fact::parse_line(line).map_err(|e| (index + 1, e))?;
        fact.validate_subjects().map_err(|e| (index + 1, e))?;
        facts.insert(fact);
    }
    Ok(facts)
}

async fn seed(config: &AuthzConfig, file: &Path, out: &mut dyn Write) -> Result<ExitCode> {
    let facts = read_fact_file(file)?;
    let store = open_store(config).await?;
    store.replace_all(&facts).await?;
    tracing::info!(facts = facts.len(), file = %file.display(), "seeded fact store");
    writeln!(out, "seeded {} facts", facts.len())?;
    store.close().await;
    Ok(ExitCode::SUCCESS)
}

/// Builds the storage filter for `dump`.
pub fn dump_filter(kind: Option<FactKind>, subject: Option<&str>) -> Result<FactFilter> {
    let mut filter = FactFilter::new();
    if let Some(kind) = kind {
        filter = filter.kind(kind);
    }
    if let Some(subject) = subject {
        let subject = Subject::parse(subject)?;
        filter = filter.field(0, [subject.to_string()])?;
    }
    Ok(filter)
}

async fn dump(
    config: &AuthzConfig,
    kind: Option<FactKind>,
    subject: Option<&str>,
    out: &mut dyn Write,
) -> Result<ExitCode> {
    let filter = dump_filter(kind, subject)?;
    let store = open_store(config).await?;
    let loaded = store.load_filtered(&filter).await?;

    let mut lines: Vec<String> = loaded.facts.iter().map(|fact| fact.to_line()).collect();
    lines.sort();
    for line in &lines {
        writeln!(out, "{line}")?;
    }
    tracing::debug!(facts = lines.len(), partial = loaded.is_partial, "dumped facts");
    store.close().await;
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// Policy commands
// ============================================================================

async fn check(
    config: &AuthzConfig,
    subject: &str,
    object: &str,
    action: &str,
    out: &mut dyn Write,
) -> Result<ExitCode> {
    let subject = Subject::parse(subject)?;
    let object = Subject::parse(object)?;
    let engine = open_engine(config).await?;

    let allowed = engine
        .enforce(&subject.to_string(), &object.to_string(), action)
        .await;
    writeln!(out, "{}", if allowed { "allow" } else { "deny" })?;
    Ok(if allowed {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}

async fn show_group(config: &AuthzConfig, group_id: i32, out: &mut dyn Write) -> Result<ExitCode> {
    let group = Subject::checked(SubjectKind::Group, group_id)?.to_string();
    let engine = open_engine(config).await?;

    let users = engine.users_granted(&group).await;
    let mut permissions: Vec<String> = engine
        .implicit_permissions(&group)
        .await
        .into_iter()
        .map(|p| format!("{} {}", p.object, p.action))
        .collect();
    permissions.sort();

    writeln!(out, "{group}")?;
    writeln!(out, "users:")?;
    for user in &users {
        writeln!(out, "  {user}")?;
    }
    writeln!(out, "permissions:")?;
    for permission in &permissions {
        writeln!(out, "  {permission}")?;
    }
    Ok(ExitCode::SUCCESS)
}

async fn reconcile(
    config: &AuthzConfig,
    group_id: i32,
    users: &[i32],
    permissions: &[(i32, String)],
    out: &mut dyn Write,
) -> Result<ExitCode> {
    let engine = open_engine(config).await?;
    let reconciler = Reconciler::new(engine);

    // Only ids and actions matter to the fact base; the rest is placeholder.
    let mut group = Group::new(group_id, format!("group-{group_id}"), 0);
    let users: Vec<User> = users
        .iter()
        .map(|&id| User::new(id, format!("user-{id}"), 0))
        .collect();
    let permissions: Vec<Permission> = permissions
        .iter()
        .map(|(id, action)| Permission::new(*id, format!("permission-{id}"), 0, action.as_str()))
        .collect();

    let report = reconciler
        .reconcile_group_membership(&mut group, &users, &permissions)
        .await?;
    writeln!(
        out,
        "{}: +{} -{} permissions, +{} -{} users",
        group.subject(),
        report.permissions_added,
        report.permissions_removed,
        report.users_added,
        report.users_removed
    )?;
    Ok(ExitCode::SUCCESS)
}

async fn delete_group(config: &AuthzConfig, group_id: i32, out: &mut dyn Write) -> Result<ExitCode> {
    let group = Subject::checked(SubjectKind::Group, group_id)?.to_string();
    let engine = open_engine(config).await?;
    let removed = engine.remove_all_roles_for(&group).await?;
    writeln!(
        out,
        "{group}: {}",
        if removed { "facts removed" } else { "nothing to remove" }
    )?;
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// Serve
// ============================================================================

async fn shutdown_signal() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}

/// Refreshes `engine` in the background until `shutdown` resolves.
pub async fn serve<F>(
    engine: Arc<PolicyEngine>,
    config: &AuthzConfig,
    shutdown: F,
    out: &mut dyn Write,
) -> Result<ExitCode>
where
    F: Future<Output = Result<()>>,
{
    let refresh = config.refresh_config();
    let task = engine.start_background_refresh(refresh);
    let service = task.service().clone();
    if let Err(reason) = service.wait_available(refresh.timeout).await {
        task.stop().await;
        return Err(Error::Service(reason));
    }
    tracing::info!(
        facts = engine.fact_count().await,
        store = engine.store().name(),
        "serving policy"
    );

    let waited = shutdown.await;
    let stats = task.stats();
    task.stop().await;
    waited?;

    let state = service.state();
    if !state.is_terminal() {
        tracing::warn!(state = %state, "policy refresh did not stop");
    }
    writeln!(
        out,
        "refresh cycles: {} applied, {} skipped, {} retried, {} failed",
        stats.applied, stats.skipped, stats.retries, stats.failures
    )?;
    writeln!(out, "refresh {state} since {}", service.since().to_rfc3339())?;
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// Config
// ============================================================================

fn config_command(
    action: ConfigAction,
    config: &AuthzConfig,
    config_path: &Path,
    out: &mut dyn Write,
) -> Result<ExitCode> {
    match action {
        ConfigAction::Path => {
            writeln!(out, "{}", config_path.display())?;
            if !config_path.exists() {
                tracing::warn!("config file does not exist, run `authz config init` to create it");
            }
        }
        ConfigAction::Show => write!(out, "{}", config.to_toml_string()?)?,
        ConfigAction::Init { file, force } => {
            let path = file.as_deref().unwrap_or(config_path);
            init_config_file(path, force)?;
            writeln!(out, "config file created at {}", path.display())?;
        }
        ConfigAction::Export { docker_env } => {
            for (key, value) in config.to_env_vars() {
                if docker_env {
                    writeln!(out, "{key}={value}")?;
                } else {
                    writeln!(out, "export {key}=\"{value}\"")?;
                }
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

/// Writes the default configuration to `path`.
pub fn init_config_file(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        return Err(Error::config(format!(
            "config file already exists at {}, use --force to overwrite",
            path.display()
        )));
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| Error::io_with_path(e, parent))?;
    }
    let text = AuthzConfig::default().to_toml_string()?;
    std::fs::write(path, text).map_err(|e| Error::io_with_path(e, path))
}
