//! Integrity verification and dump/reimport recovery.

use std::path::{Path, PathBuf};
use std::time::Instant;

use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::error::Result;
use crate::schema::STORE_SCHEMA_VERSION;
use crate::store::HistoryDb;

/// Outcome of one pragma check: `"ok"` or the collected messages.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum CheckOutcome {
    Ok(String),
    Messages(Vec<String>),
}

impl CheckOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, CheckOutcome::Ok(s) if s == "ok")
    }

    fn ok() -> Self {
        CheckOutcome::Ok("ok".to_string())
    }
}

/// Verification report from the three pragma checks plus statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub integrity_check: CheckOutcome,
    pub foreign_key_check: CheckOutcome,
    pub quick_check: CheckOutcome,
    pub stats: IntegrityStats,
}

/// Row counts and size collected during verification.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntegrityStats {
    pub scans_count: i64,
    pub findings_count: i64,
    pub schema_version_count: i64,
    pub indices_count: i64,
    pub size_bytes: u64,
}

/// Recovery report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryReport {
    pub success: bool,
    pub backup_path: Option<PathBuf>,
    pub errors: Vec<String>,
    pub rows_recovered: RowsRecovered,
    pub recovery_time_sec: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RowsRecovered {
    pub scans: usize,
    pub findings: usize,
    pub schema_versions: usize,
}

/// Open without touching the schema: a possibly-corrupt database must be
/// inspected as-is, never initialized or repaired implicitly.
fn open_raw(db_path: &Path) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    conn.busy_timeout(std::time::Duration::from_secs(30))?;
    conn.execute_batch("PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

fn pragma_messages(conn: &Connection, pragma: &str) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA {pragma}"))?;
    let rows = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Run the three structural checks and collect statistics.
///
/// Integrity violations are only ever detected here; writes never attempt
/// silent correction.
pub fn verify_database(db_path: &Path) -> Result<IntegrityReport> {
    let conn = open_raw(db_path)?;
    let conn = &conn;
    let mut errors: Vec<String> = Vec::new();

    info!(path = %db_path.display(), "verifying database integrity");

    // 1. Full structural check.
    let integrity_check = match pragma_messages(conn, "integrity_check") {
        Ok(messages) if messages.len() == 1 && messages[0] == "ok" => CheckOutcome::ok(),
        Ok(messages) => {
            errors.extend(messages.clone());
            error!(?messages, "integrity_check failed");
            CheckOutcome::Messages(messages)
        }
        Err(err) => {
            errors.push(err.to_string());
            CheckOutcome::Messages(vec![format!("error: {err}")])
        }
    };

    // 2. Foreign-key check (pragma enabled first by the connection policy).
    let foreign_key_check = {
        let result: rusqlite::Result<Vec<String>> = (|| {
            let mut stmt = conn.prepare("PRAGMA foreign_key_check")?;
            let rows = stmt
                .query_map([], |row| {
                    let table: String = row.get(0)?;
                    let rowid: Option<i64> = row.get(1)?;
                    let referenced: String = row.get(2)?;
                    Ok(format!(
                        "Table {table} row {} references missing {referenced}",
                        rowid.map_or("?".to_string(), |r| r.to_string())
                    ))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })();
        match result {
            Ok(violations) if violations.is_empty() => CheckOutcome::ok(),
            Ok(violations) => {
                warn!(?violations, "foreign key violations");
                errors.extend(violations.clone());
                CheckOutcome::Messages(violations)
            }
            Err(err) => {
                warn!(%err, "foreign_key_check errored");
                CheckOutcome::Messages(vec![format!("error: {err}")])
            }
        }
    };

    // 3. Fast corruption scan.
    let quick_check = match pragma_messages(conn, "quick_check") {
        Ok(messages) if messages.len() == 1 && messages[0] == "ok" => CheckOutcome::ok(),
        Ok(messages) => {
            errors.extend(messages.clone());
            CheckOutcome::Messages(messages)
        }
        Err(err) => {
            errors.push(err.to_string());
            CheckOutcome::Messages(vec![format!("error: {err}")])
        }
    };

    let count = |sql: &str| -> i64 {
        conn.query_row(sql, [], |r| r.get(0)).unwrap_or_default()
    };
    let stats = IntegrityStats {
        scans_count: count("SELECT COUNT(*) FROM scans"),
        findings_count: count("SELECT COUNT(*) FROM findings"),
        schema_version_count: count("SELECT COUNT(*) FROM schema_version"),
        indices_count: count("SELECT COUNT(*) FROM sqlite_master WHERE type='index'"),
        size_bytes: std::fs::metadata(db_path).map(|m| m.len()).unwrap_or(0),
    };

    let is_valid = errors.is_empty();
    if is_valid {
        info!("database integrity verification passed");
    } else {
        error!(error_count = errors.len(), "database integrity verification failed");
    }

    Ok(IntegrityReport {
        is_valid,
        errors,
        integrity_check,
        foreign_key_check,
        quick_check,
        stats,
    })
}

/// One table's dump: column names (from `PRAGMA table_info`) plus rows.
struct TableDump {
    columns: Vec<String>,
    rows: Vec<Vec<SqlValue>>,
}

fn dump_table(conn: &Connection, table: &str) -> rusqlite::Result<TableDump> {
    let mut info = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let columns: Vec<String> = info
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<rusqlite::Result<_>>()?;

    let mut stmt = conn.prepare(&format!("SELECT {} FROM {table}", columns.join(", ")))?;
    let column_count = columns.len();
    let rows = stmt
        .query_map([], |row| {
            let mut values = Vec::with_capacity(column_count);
            for i in 0..column_count {
                values.push(row.get::<_, SqlValue>(i)?);
            }
            Ok(values)
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(TableDump { columns, rows })
}

fn reinsert_table(conn: &Connection, table: &str, dump: &TableDump) -> rusqlite::Result<()> {
    if dump.rows.is_empty() {
        return Ok(());
    }
    let placeholders = vec!["?"; dump.columns.len()].join(", ");
    let sql = format!(
        "INSERT INTO {table} ({}) VALUES ({placeholders})",
        dump.columns.join(", ")
    );
    let mut stmt = conn.prepare(&sql)?;
    for row in &dump.rows {
        stmt.execute(params_from_iter(row.iter()))?;
    }
    Ok(())
}

/// Recover a database by dump and reimport.
///
/// Steps: back the file up, dump every row of `scans`, `findings` and
/// `schema_version` into memory, delete and re-initialize the database,
/// reimport with foreign keys off (column order discovered from
/// `PRAGMA table_info`), then verify. Post-verification issues are
/// reported as warnings, not failure.
pub fn recover_database(db_path: &Path) -> Result<RecoveryReport> {
    let started = Instant::now();
    let mut errors: Vec<String> = Vec::new();

    info!(path = %db_path.display(), "starting database recovery");

    // 1. Backup, preserving permissions.
    let backup_path = db_path.with_extension("backup");
    if let Err(err) = copy_preserving(db_path, &backup_path) {
        errors.push(format!("backup failed: {err}"));
        return Ok(RecoveryReport {
            success: false,
            backup_path: None,
            errors,
            rows_recovered: RowsRecovered::default(),
            recovery_time_sec: started.elapsed().as_secs_f64(),
        });
    }

    // 2. Dump all rows into memory.
    let dumps = (|| -> Result<(TableDump, TableDump, TableDump)> {
        let old = open_raw(db_path)?;
        let scans = dump_table(&old, "scans")?;
        let findings = dump_table(&old, "findings")?;
        let versions = dump_table(&old, "schema_version")?;
        Ok((scans, findings, versions))
    })();
    let (scans, findings, versions) = match dumps {
        Ok(dumps) => dumps,
        Err(err) => {
            errors.push(format!("data dump failed: {err}"));
            return Ok(RecoveryReport {
                success: false,
                backup_path: Some(backup_path),
                errors,
                rows_recovered: RowsRecovered::default(),
                recovery_time_sec: started.elapsed().as_secs_f64(),
            });
        }
    };
    info!(
        scans = scans.rows.len(),
        findings = findings.rows.len(),
        versions = versions.rows.len(),
        "dumped rows"
    );

    // 3. Delete the file (and WAL siblings) and re-initialize from scratch.
    let fresh = (|| -> Result<HistoryDb> {
        std::fs::remove_file(db_path)?;
        for suffix in ["-wal", "-shm"] {
            let mut sibling = db_path.as_os_str().to_owned();
            sibling.push(suffix);
            let _ = std::fs::remove_file(PathBuf::from(sibling));
        }
        HistoryDb::open(db_path)
    })();
    let fresh = match fresh {
        Ok(db) => db,
        Err(err) => {
            errors.push(format!("fresh database creation failed: {err}"));
            return Ok(RecoveryReport {
                success: false,
                backup_path: Some(backup_path),
                errors,
                rows_recovered: RowsRecovered::default(),
                recovery_time_sec: started.elapsed().as_secs_f64(),
            });
        }
    };

    // 4. Reimport with foreign keys off; skip the baseline version row
    //    (already present from init).
    let version_col = versions
        .columns
        .iter()
        .position(|c| c == "version")
        .unwrap_or(0);
    let versions_to_import = TableDump {
        columns: versions.columns.clone(),
        rows: versions
            .rows
            .iter()
            .filter(|row| {
                !matches!(&row[version_col], SqlValue::Text(v) if v == STORE_SCHEMA_VERSION)
            })
            .cloned()
            .collect(),
    };

    let import = (|| -> rusqlite::Result<()> {
        fresh.conn().execute_batch("PRAGMA foreign_keys=OFF;")?;
        reinsert_table(fresh.conn(), "scans", &scans)?;
        reinsert_table(fresh.conn(), "findings", &findings)?;
        reinsert_table(fresh.conn(), "schema_version", &versions_to_import)?;
        fresh.conn().execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(())
    })();
    if let Err(err) = import {
        errors.push(format!("data import failed: {err}"));
        return Ok(RecoveryReport {
            success: false,
            backup_path: Some(backup_path),
            errors,
            rows_recovered: RowsRecovered::default(),
            recovery_time_sec: started.elapsed().as_secs_f64(),
        });
    }
    drop(fresh);

    // 5. Verify; report issues without failing the recovery.
    match verify_database(db_path) {
        Ok(report) if !report.is_valid => {
            warn!(errors = ?report.errors, "post-recovery verification issues");
        }
        Err(err) => warn!(%err, "post-recovery verification errored"),
        _ => {}
    }

    let rows_recovered = RowsRecovered {
        scans: scans.rows.len(),
        findings: findings.rows.len(),
        schema_versions: versions_to_import.rows.len(),
    };
    let recovery_time_sec = started.elapsed().as_secs_f64();
    info!(?rows_recovered, recovery_time_sec, "database recovery complete");

    Ok(RecoveryReport {
        success: errors.is_empty(),
        backup_path: Some(backup_path),
        errors,
        rows_recovered,
        recovery_time_sec,
    })
}

/// `copy2`-style copy: contents plus permission bits.
fn copy_preserving(from: &Path, to: &Path) -> std::io::Result<()> {
    std::fs::copy(from, to)?;
    if let Ok(metadata) = std::fs::metadata(from) {
        let _ = std::fs::set_permissions(to, metadata.permissions());
    }
    Ok(())
}
