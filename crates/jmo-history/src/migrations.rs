//! Schema migration framework.
//!
//! A migration pairs up/down routines with a semver-comparable version.
//! SQL-file migrations are discovered from a directory of
//! `v<major>_<minor>_<patch>.sql` files split by `-- migrate:up` /
//! `-- migrate:down` markers; programmatic migrations implement the trait
//! directly. Each migration runs in its own transaction and appends a
//! `schema_version` row; on failure the down routine is attempted and the
//! sequence stops.

use std::path::Path;

use chrono::{TimeZone, Utc};
use rusqlite::Connection;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::error::Result;
use crate::store::HistoryDb;

/// One schema migration.
pub trait Migration {
    /// Target schema version, e.g. `"1.1.0"`.
    fn version(&self) -> &str;

    /// Apply the migration. Runs inside a transaction managed by the
    /// caller.
    fn up(&self, conn: &Connection) -> rusqlite::Result<()>;

    /// Best-effort rollback. SQLite's limited `ALTER TABLE` support means
    /// many migrations implement this as a no-op.
    fn down(&self, conn: &Connection) -> rusqlite::Result<()>;
}

/// A migration loaded from a `.sql` file.
pub struct SqlMigration {
    version: String,
    up_sql: String,
    down_sql: String,
}

impl SqlMigration {
    pub fn new(version: &str, up_sql: &str, down_sql: &str) -> Self {
        SqlMigration {
            version: version.to_string(),
            up_sql: up_sql.to_string(),
            down_sql: down_sql.to_string(),
        }
    }

    /// Parse `v1_2_0.sql` content. Everything after `-- migrate:up` (or
    /// the whole file) is the up script; an optional `-- migrate:down`
    /// marker introduces the rollback script.
    fn from_file(version: String, content: &str) -> Self {
        const UP_MARKER: &str = "-- migrate:up";
        const DOWN_MARKER: &str = "-- migrate:down";

        let (up_part, down_part) = match content.split_once(DOWN_MARKER) {
            Some((up, down)) => (up, down),
            None => (content, ""),
        };
        let up_sql = up_part
            .split_once(UP_MARKER)
            .map(|(_, rest)| rest)
            .unwrap_or(up_part)
            .trim()
            .to_string();
        SqlMigration {
            version,
            up_sql,
            down_sql: down_part.trim().to_string(),
        }
    }
}

impl Migration for SqlMigration {
    fn version(&self) -> &str {
        &self.version
    }

    fn up(&self, conn: &Connection) -> rusqlite::Result<()> {
        if self.up_sql.is_empty() {
            return Ok(());
        }
        conn.execute_batch(&self.up_sql)
    }

    fn down(&self, conn: &Connection) -> rusqlite::Result<()> {
        if self.down_sql.is_empty() {
            return Ok(());
        }
        conn.execute_batch(&self.down_sql)
    }
}

/// Parse `"1.2.3"` into `(1, 2, 3)`; missing or non-numeric parts are 0.
pub fn parse_version(version: &str) -> (u64, u64, u64) {
    let mut parts = version.split('.');
    let mut next = || {
        parts
            .next()
            .and_then(|p| p.parse::<u64>().ok())
            .unwrap_or(0)
    };
    (next(), next(), next())
}

/// Translate `v1_2_0` file stems to `"1.2.0"`.
fn version_from_stem(stem: &str) -> Option<String> {
    let rest = stem.strip_prefix('v')?;
    let parts: Vec<&str> = rest.split('_').collect();
    if parts.len() != 3 || parts.iter().any(|p| p.parse::<u64>().is_err()) {
        return None;
    }
    Some(parts.join("."))
}

/// Scan a directory for `v<major>_<minor>_<patch>.sql` migration files,
/// sorted ascending by parsed version. Unreadable or misnamed files are
/// skipped with a warning.
pub fn discover_migrations(dir: &Path) -> Vec<SqlMigration> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        warn!(dir = %dir.display(), "migrations directory not found");
        return Vec::new();
    };

    let mut migrations: Vec<SqlMigration> = Vec::new();
    for entry in entries.filter_map(|e| e.ok()) {
        let path = entry.path();
        if path.extension().map(|e| e != "sql").unwrap_or(true) {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let Some(version) = version_from_stem(stem) else {
            warn!(file = %path.display(), "ignoring file without v<maj>_<min>_<patch> name");
            continue;
        };
        match std::fs::read_to_string(&path) {
            Ok(content) => migrations.push(SqlMigration::from_file(version, &content)),
            Err(err) => warn!(file = %path.display(), %err, "failed to read migration"),
        }
    }
    migrations.sort_by_key(|m| parse_version(&m.version));
    migrations
}

/// Current schema version: latest `schema_version` row by
/// `(applied_at DESC, version DESC)`, or `"0.0.0"` when absent.
pub fn current_version(conn: &Connection) -> String {
    conn.query_row(
        "SELECT version FROM schema_version ORDER BY applied_at DESC, version DESC LIMIT 1",
        [],
        |row| row.get::<_, String>(0),
    )
    .unwrap_or_else(|_| "0.0.0".to_string())
}

/// One failed migration's details.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationFailure {
    pub version: String,
    pub error: String,
    pub rollback_error: Option<String>,
}

/// Result of a migration run.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationReport {
    pub applied: Vec<String>,
    pub errors: Vec<MigrationFailure>,
    pub final_version: String,
    pub rollback_performed: bool,
}

/// Apply pending migrations up to `target` (unbounded when `None`).
pub fn run_migrations(
    db: &mut HistoryDb,
    migrations: &[&dyn Migration],
    target: Option<&str>,
) -> Result<MigrationReport> {
    let current = current_version(db.conn());
    let current_parsed = parse_version(&current);
    let target_parsed = target.map(parse_version).unwrap_or((u64::MAX, 0, 0));
    info!(%current, ?target, "running migrations");

    let mut pending: Vec<&&dyn Migration> = migrations
        .iter()
        .filter(|m| {
            let v = parse_version(m.version());
            v > current_parsed && v <= target_parsed
        })
        .collect();
    pending.sort_by_key(|m| parse_version(m.version()));

    let mut applied: Vec<String> = Vec::new();
    let mut errors: Vec<MigrationFailure> = Vec::new();
    let mut rollback_performed = false;

    for migration in pending {
        let version = migration.version().to_string();
        info!(%version, "applying migration");

        let apply = |conn: &mut Connection| -> rusqlite::Result<()> {
            let tx = conn.transaction()?;
            migration.up(&tx)?;
            let now = Utc::now().timestamp();
            let now_iso = Utc
                .timestamp_opt(now, 0)
                .single()
                .map(|t| t.to_rfc3339())
                .unwrap_or_default();
            tx.execute(
                "INSERT INTO schema_version (version, applied_at, applied_at_iso) VALUES (?1, ?2, ?3)",
                rusqlite::params![version, now, now_iso],
            )?;
            tx.commit()
        };

        match apply(db.conn_mut()) {
            Ok(()) => {
                info!(%version, "migration applied");
                applied.push(version);
            }
            Err(err) => {
                error!(%version, %err, "migration failed; attempting rollback");
                let rollback_error = match migration.down(db.conn()) {
                    Ok(()) => {
                        rollback_performed = true;
                        None
                    }
                    Err(rollback_err) => {
                        error!(%version, %rollback_err, "rollback failed");
                        Some(rollback_err.to_string())
                    }
                };
                errors.push(MigrationFailure {
                    version,
                    error: err.to_string(),
                    rollback_error,
                });
                break;
            }
        }
    }

    let final_version = applied.last().cloned().unwrap_or(current);
    Ok(MigrationReport {
        applied,
        errors,
        final_version,
        rollback_performed,
    })
}
