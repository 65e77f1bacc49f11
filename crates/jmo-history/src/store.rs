//! The history database: connection policy, store-scan, and query helpers.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{TimeZone, Utc};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use jmo_core::{collect_git_context, layout, CommonFinding, Severity, TargetKind, JMO_VERSION};
use jmo_normalize::FindingsDocument;

use crate::crypto;
use crate::error::{HistoryError, Result};
use crate::redact::redact_raw;
use crate::schema;

/// Default store location under the working tree.
pub fn default_db_path() -> PathBuf {
    PathBuf::from(".jmo").join("history.db")
}

/// Connection busy timeout tolerating concurrent writers.
const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

/// One row of `scans`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScanRow {
    pub id: String,
    pub timestamp: i64,
    pub timestamp_iso: String,
    pub commit_hash: Option<String>,
    pub commit_short: Option<String>,
    pub branch: Option<String>,
    pub tag: Option<String>,
    pub is_dirty: bool,
    pub profile: String,
    pub tools: Vec<String>,
    pub targets: Vec<String>,
    pub target_type: String,
    pub total_findings: i64,
    pub critical_count: i64,
    pub high_count: i64,
    pub medium_count: i64,
    pub low_count: i64,
    pub info_count: i64,
    pub jmo_version: String,
    pub hostname: Option<String>,
    pub username: Option<String>,
    pub ci_provider: Option<String>,
    pub ci_build_id: Option<String>,
    pub duration_seconds: Option<f64>,
}

/// One row of `findings`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FindingRow {
    pub scan_id: String,
    pub fingerprint: String,
    pub severity: String,
    pub tool: String,
    pub tool_version: Option<String>,
    pub rule_id: String,
    pub path: String,
    pub start_line: Option<i64>,
    pub end_line: Option<i64>,
    pub title: Option<String>,
    pub message: String,
    pub remediation: Option<String>,
    pub owasp_top10: Option<String>,
    pub cwe_top25: Option<String>,
    pub cis_controls: Option<String>,
    pub nist_csf: Option<String>,
    pub pci_dss: Option<String>,
    pub mitre_attack: Option<String>,
    pub cvss_score: Option<f64>,
    pub confidence: Option<String>,
    pub likelihood: Option<String>,
    pub impact: Option<String>,
    pub raw_finding: String,
}

impl FindingRow {
    /// Rehydrate the normalized finding from the stored raw blob.
    ///
    /// Encrypted blobs need the key material; omitted blobs are
    /// reconstructed from the row's public columns.
    pub fn to_common(&self, key_material: Option<&str>) -> Result<CommonFinding> {
        let raw = if crypto::is_encrypted(&self.raw_finding) {
            let key = key_material
                .ok_or(HistoryError::EncryptionKeyMissing(crypto::ENCRYPTION_KEY_ENV))?;
            crypto::decrypt_raw(&self.raw_finding, key)?
        } else {
            self.raw_finding.clone()
        };
        if !raw.is_empty() {
            if let Ok(finding) = serde_json::from_str::<CommonFinding>(&raw) {
                return Ok(finding);
            }
        }
        let severity: Severity = self
            .severity
            .parse()
            .map_err(|_| HistoryError::InvalidInput(format!("bad severity: {}", self.severity)))?;
        let mut finding = CommonFinding::new(
            &self.tool,
            &self.rule_id,
            &self.path,
            self.start_line,
            severity,
            &self.message,
        );
        finding.id = self.fingerprint.clone();
        finding.tool.version = self.tool_version.clone();
        finding.location.end_line = self.end_line;
        finding.title = self.title.clone();
        finding.remediation = self.remediation.clone();
        Ok(finding)
    }
}

/// Filters for [`HistoryDb::list_scans`].
#[derive(Debug, Clone, Default)]
pub struct ScanFilter {
    pub branch: Option<String>,
    pub profile: Option<String>,
    pub since: Option<i64>,
    pub limit: usize,
}

/// Database statistics for `history stats`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DbStats {
    pub total_scans: i64,
    pub total_findings: i64,
    pub min_date: Option<String>,
    pub max_date: Option<String>,
    pub scans_by_branch: Vec<(String, i64)>,
    pub scans_by_profile: Vec<(String, i64)>,
    pub findings_by_severity: Vec<(String, i64)>,
    pub top_tools: Vec<(String, i64)>,
    pub db_size_bytes: u64,
}

/// Inputs for [`HistoryDb::store_scan`].
#[derive(Debug, Clone)]
pub struct StoreScanOptions {
    pub results_dir: PathBuf,
    pub profile: String,
    pub tools: Vec<String>,
    pub commit_hash: Option<String>,
    pub branch: Option<String>,
    pub tag: Option<String>,
    pub jmo_version: String,
    pub duration_seconds: Option<f64>,
    /// Record hostname/username only when explicitly opted in.
    pub collect_metadata: bool,
    /// Redact secret-bearing keys inside raw payloads.
    pub redact_secrets: bool,
    /// Persist raw blobs at all.
    pub store_raw: bool,
    /// Encrypt raw blobs with this key material.
    pub encryption_key: Option<String>,
    /// Parent levels probed for `.git` during auto-detection.
    pub git_walk_limit: usize,
}

impl StoreScanOptions {
    pub fn new(results_dir: impl Into<PathBuf>, profile: &str, tools: Vec<String>) -> Self {
        StoreScanOptions {
            results_dir: results_dir.into(),
            profile: profile.to_string(),
            tools,
            commit_hash: None,
            branch: None,
            tag: None,
            jmo_version: JMO_VERSION.to_string(),
            duration_seconds: None,
            collect_metadata: false,
            redact_secrets: true,
            store_raw: true,
            encryption_key: None,
            git_walk_limit: jmo_core::gitctx::GIT_WALK_LIMIT,
        }
    }
}

/// Connection wrapper over the single-file store.
pub struct HistoryDb {
    conn: Connection,
    path: PathBuf,
}

impl HistoryDb {
    /// Open (creating directories and schema as needed) with the standard
    /// connection policy: WAL journal, NORMAL synchronous, 10,000-page
    /// cache, in-memory temp store, foreign keys on, 30 s busy timeout.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=NORMAL;
             PRAGMA cache_size=10000;
             PRAGMA temp_store=MEMORY;
             PRAGMA foreign_keys=ON;",
        )?;
        let db = HistoryDb {
            conn,
            path: path.to_path_buf(),
        };
        schema::init_schema(&db.conn)?;
        db.tighten_permissions();
        Ok(db)
    }

    /// Owner-read/write only; more permissive bits are corrected here.
    fn tighten_permissions(&self) {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Ok(metadata) = std::fs::metadata(&self.path) {
                let mode = metadata.permissions().mode() & 0o777;
                if mode != 0o600 {
                    let _ = std::fs::set_permissions(
                        &self.path,
                        std::fs::Permissions::from_mode(0o600),
                    );
                }
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    pub(crate) fn conn_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    /// Store a completed scan: insert the scan row with zero counts (the
    /// triggers drive them), batch-insert findings with one prepared
    /// statement, and record scan metadata, all in one transaction.
    pub fn store_scan(&mut self, opts: &StoreScanOptions) -> Result<String> {
        // 1. Validate inputs.
        if !opts.results_dir.exists() {
            return Err(HistoryError::InvalidInput(format!(
                "results directory not found: {}",
                opts.results_dir.display()
            )));
        }
        let findings_path = layout::findings_json_path(&opts.results_dir);
        if !findings_path.exists() {
            return Err(HistoryError::InvalidInput(format!(
                "findings document not found: {}",
                findings_path.display()
            )));
        }
        if !matches!(opts.profile.as_str(), "fast" | "balanced" | "deep") {
            return Err(HistoryError::InvalidInput(format!(
                "invalid profile: {}",
                opts.profile
            )));
        }

        let document = FindingsDocument::load(&findings_path)?;

        // 2. Detect target type and collect target names.
        let target_type = layout::detect_target_type(&opts.results_dir)
            .map(|k| k.as_str().to_string())
            .unwrap_or_else(|| "unknown".to_string());
        let targets = layout::collect_targets(&opts.results_dir);

        // 3. Git context from the first repo target unless provided.
        let mut git_ctx = jmo_core::GitContext::default();
        if target_type == TargetKind::Repo.as_str()
            && (opts.commit_hash.is_none() || opts.branch.is_none())
        {
            if let Some(first) = targets.first() {
                let candidate = layout::kind_root(&opts.results_dir, TargetKind::Repo).join(first);
                git_ctx = collect_git_context(&candidate, opts.git_walk_limit);
            }
        }
        let commit_hash = opts.commit_hash.clone().or(git_ctx.commit_hash);
        let commit_short = git_ctx
            .commit_short
            .or_else(|| commit_hash.as_ref().map(|h| h.chars().take(7).collect()));
        let branch = opts.branch.clone().or(git_ctx.branch);
        let tag = opts.tag.clone().or(git_ctx.tag);

        // 4. Provenance.
        let (hostname, username) = if opts.collect_metadata {
            (env_hostname(), env_username())
        } else {
            (None, None)
        };
        let (ci_provider, ci_build_id) = detect_ci();

        let scan_id = Uuid::new_v4().to_string();
        let now = Utc::now().timestamp();
        let now_iso = Utc
            .timestamp_opt(now, 0)
            .single()
            .map(|t| t.to_rfc3339())
            .unwrap_or_default();

        // 5-8. Transaction: scan row, findings batch, metadata.
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO scans (
                id, timestamp, timestamp_iso,
                commit_hash, commit_short, branch, tag, is_dirty,
                profile, tools, targets, target_type,
                total_findings, critical_count, high_count, medium_count, low_count, info_count,
                jmo_version, hostname, username, ci_provider, ci_build_id,
                duration_seconds
            ) VALUES (
                ?1, ?2, ?3,
                ?4, ?5, ?6, ?7, ?8,
                ?9, ?10, ?11, ?12,
                0, 0, 0, 0, 0, 0,
                ?13, ?14, ?15, ?16, ?17,
                ?18
            )",
            params![
                scan_id,
                now,
                now_iso,
                commit_hash,
                commit_short,
                branch,
                tag,
                git_ctx.is_dirty as i64,
                opts.profile,
                serde_json::to_string(&opts.tools)?,
                serde_json::to_string(&targets)?,
                target_type,
                opts.jmo_version,
                hostname,
                username,
                ci_provider,
                ci_build_id,
                opts.duration_seconds,
            ],
        )?;

        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO findings (
                    scan_id, fingerprint,
                    severity, tool, tool_version, rule_id,
                    path, start_line, end_line,
                    title, message, remediation,
                    owasp_top10, cwe_top25, cis_controls, nist_csf, pci_dss, mitre_attack,
                    cvss_score, confidence, likelihood, impact,
                    raw_finding
                ) VALUES (
                    ?1, ?2,
                    ?3, ?4, ?5, ?6,
                    ?7, ?8, ?9,
                    ?10, ?11, ?12,
                    ?13, ?14, ?15, ?16, ?17, ?18,
                    ?19, ?20, ?21, ?22,
                    ?23
                )",
            )?;

            for finding in &document.findings {
                let raw_blob = prepare_raw_blob(finding, opts)?;
                let compliance = finding.compliance.as_ref();
                stmt.execute(params![
                    scan_id,
                    finding.id,
                    finding.severity.as_str(),
                    finding.tool.name,
                    finding.tool.version,
                    finding.rule_id,
                    finding.location.path,
                    finding.location.start_line,
                    finding.location.end_line,
                    finding.title,
                    finding.message,
                    finding.remediation,
                    json_opt(compliance.and_then(|c| c.owasp_top10_2021.as_ref()))?,
                    json_opt(compliance.and_then(|c| c.cwe_top25_2024.as_ref()))?,
                    json_opt(compliance.and_then(|c| c.cis_controls_v8_1.as_ref()))?,
                    json_opt(compliance.and_then(|c| c.nist_csf_2_0.as_ref()))?,
                    json_opt(compliance.and_then(|c| c.pci_dss_4_0.as_ref()))?,
                    json_opt(compliance.and_then(|c| c.mitre_attack.as_ref()))?,
                    finding.cvss.as_ref().and_then(|c| c.score),
                    finding.risk.as_ref().and_then(|r| r.confidence).map(|v| v.as_str()),
                    finding.risk.as_ref().and_then(|r| r.likelihood).map(|v| v.as_str()),
                    finding.risk.as_ref().and_then(|r| r.impact).map(|v| v.as_str()),
                    raw_blob,
                ])?;
            }
        }

        tx.execute(
            "INSERT INTO scan_metadata (scan_id, key, value) VALUES (?1, 'results_dir', ?2)",
            params![
                scan_id,
                opts.results_dir
                    .canonicalize()
                    .unwrap_or_else(|_| opts.results_dir.clone())
                    .to_string_lossy()
                    .into_owned()
            ],
        )?;

        tx.commit()?;
        self.tighten_permissions();
        info!(
            scan_id = %scan_id,
            findings = document.findings.len(),
            tools = opts.tools.len(),
            "stored scan"
        );
        Ok(scan_id)
    }

    /// Resolve a full id or unique prefix to its scan row.
    pub fn get_scan(&self, id_or_prefix: &str) -> Result<ScanRow> {
        let exact = self
            .conn
            .query_row(
                &format!("SELECT {SCAN_COLUMNS} FROM scans WHERE id = ?1"),
                [id_or_prefix],
                scan_from_row,
            )
            .optional()?;
        if let Some(row) = exact {
            return Ok(row);
        }

        let mut stmt = self.conn.prepare(&format!(
            "SELECT {SCAN_COLUMNS} FROM scans WHERE id LIKE ?1 LIMIT 2"
        ))?;
        let matches: Vec<ScanRow> = stmt
            .query_map([format!("{id_or_prefix}%")], scan_from_row)?
            .collect::<rusqlite::Result<_>>()?;
        match matches.len() {
            0 => Err(HistoryError::ScanNotFound(id_or_prefix.to_string())),
            1 => Ok(matches.into_iter().next().expect("len checked")),
            _ => Err(HistoryError::AmbiguousScanId(id_or_prefix.to_string())),
        }
    }

    /// List scans with optional filters, newest first.
    pub fn list_scans(&self, filter: &ScanFilter) -> Result<Vec<ScanRow>> {
        let mut clauses: Vec<&str> = Vec::new();
        let mut params_vec: Vec<SqlValue> = Vec::new();
        if let Some(branch) = &filter.branch {
            clauses.push("branch = ?");
            params_vec.push(SqlValue::Text(branch.clone()));
        }
        if let Some(profile) = &filter.profile {
            clauses.push("profile = ?");
            params_vec.push(SqlValue::Text(profile.clone()));
        }
        if let Some(since) = filter.since {
            clauses.push("timestamp >= ?");
            params_vec.push(SqlValue::Integer(since));
        }
        let where_sql = if clauses.is_empty() {
            "1=1".to_string()
        } else {
            clauses.join(" AND ")
        };
        let limit = if filter.limit == 0 { 50 } else { filter.limit };
        params_vec.push(SqlValue::Integer(limit as i64));

        let sql = format!(
            "SELECT {SCAN_COLUMNS} FROM scans WHERE {where_sql} ORDER BY timestamp DESC LIMIT ?"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(params_vec), scan_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// All findings for a scan, optionally filtered by severity, ordered
    /// by severity then path for stable listings.
    pub fn findings_for_scan(
        &self,
        scan_id: &str,
        severity: Option<Severity>,
    ) -> Result<Vec<FindingRow>> {
        let order = "ORDER BY CASE severity
                WHEN 'CRITICAL' THEN 0 WHEN 'HIGH' THEN 1 WHEN 'MEDIUM' THEN 2
                WHEN 'LOW' THEN 3 ELSE 4 END, path";
        let rows = match severity {
            Some(sev) => {
                let sql = format!(
                    "SELECT {FINDING_COLUMNS} FROM findings WHERE scan_id = ?1 AND severity = ?2 {order}"
                );
                let mut stmt = self.conn.prepare(&sql)?;
                let result = stmt
                    .query_map(params![scan_id, sev.as_str()], finding_from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                result
            }
            None => {
                let sql =
                    format!("SELECT {FINDING_COLUMNS} FROM findings WHERE scan_id = ?1 {order}");
                let mut stmt = self.conn.prepare(&sql)?;
                let result = stmt
                    .query_map([scan_id], finding_from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                result
            }
        };
        Ok(rows)
    }

    /// Fingerprints present in a scan.
    pub fn fingerprints_for_scan(&self, scan_id: &str) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT fingerprint FROM findings WHERE scan_id = ?1")?;
        let rows = stmt
            .query_map([scan_id], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Most frequent rule ids within one scan, count-descending with a
    /// stable rule-id tiebreak.
    pub fn top_rules_for_scan(&self, scan_id: &str, limit: usize) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT rule_id FROM findings WHERE scan_id = ?1
             GROUP BY rule_id ORDER BY COUNT(*) DESC, rule_id LIMIT ?2",
        )?;
        let rules = stmt
            .query_map(params![scan_id, limit as i64], |row| {
                row.get::<_, String>(0)
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rules)
    }

    /// Metadata rows for a scan.
    pub fn metadata_for_scan(&self, scan_id: &str) -> Result<BTreeMap<String, String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT key, value FROM scan_metadata WHERE scan_id = ?1")?;
        let rows = stmt
            .query_map([scan_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows.into_iter().collect())
    }

    /// Delete a scan (findings and metadata cascade). Returns whether a
    /// row was removed.
    pub fn delete_scan(&mut self, scan_id: &str) -> Result<bool> {
        let affected = self
            .conn
            .execute("DELETE FROM scans WHERE id = ?1", [scan_id])?;
        Ok(affected > 0)
    }

    /// Count scans older than the cutoff.
    pub fn count_scans_older_than(&self, older_than_seconds: i64) -> Result<usize> {
        let cutoff = Utc::now().timestamp() - older_than_seconds;
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM scans WHERE timestamp < ?1",
            [cutoff],
            |r| r.get(0),
        )?;
        Ok(count as usize)
    }

    /// Delete scans older than the cutoff. Returns deleted scan count.
    pub fn prune_older_than(&mut self, older_than_seconds: i64) -> Result<usize> {
        let cutoff = Utc::now().timestamp() - older_than_seconds;
        let affected = self
            .conn
            .execute("DELETE FROM scans WHERE timestamp < ?1", [cutoff])?;
        Ok(affected)
    }

    /// `VACUUM` + `ANALYZE` maintenance pass.
    pub fn optimize(&self) -> Result<()> {
        self.conn.execute_batch("VACUUM; ANALYZE;")?;
        Ok(())
    }

    /// Database statistics.
    pub fn stats(&self) -> Result<DbStats> {
        let total_scans: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM scans", [], |r| r.get(0))?;
        let total_findings: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM findings", [], |r| r.get(0))?;
        let (min_date, max_date): (Option<String>, Option<String>) = self.conn.query_row(
            "SELECT MIN(timestamp_iso), MAX(timestamp_iso) FROM scans",
            [],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )?;

        let pairs = |sql: &str| -> Result<Vec<(String, i64)>> {
            let mut stmt = self.conn.prepare(sql)?;
            let rows = stmt
                .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        };

        Ok(DbStats {
            total_scans,
            total_findings,
            min_date,
            max_date,
            scans_by_branch: pairs(
                "SELECT branch, COUNT(*) FROM scans WHERE branch IS NOT NULL
                 GROUP BY branch ORDER BY COUNT(*) DESC LIMIT 10",
            )?,
            scans_by_profile: pairs(
                "SELECT profile, COUNT(*) FROM scans GROUP BY profile ORDER BY COUNT(*) DESC",
            )?,
            findings_by_severity: pairs(
                "SELECT severity, COUNT(*) FROM findings GROUP BY severity
                 ORDER BY CASE severity
                    WHEN 'CRITICAL' THEN 1 WHEN 'HIGH' THEN 2 WHEN 'MEDIUM' THEN 3
                    WHEN 'LOW' THEN 4 WHEN 'INFO' THEN 5 END",
            )?,
            top_tools: pairs(
                "SELECT tool, COUNT(*) FROM findings GROUP BY tool ORDER BY COUNT(*) DESC LIMIT 10",
            )?,
            db_size_bytes: std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0),
        })
    }

    /// Read-only SQL escape hatch for `history query`. Rejects anything
    /// that is not a single SELECT/PRAGMA/EXPLAIN statement.
    pub fn query_rows(&self, sql: &str) -> Result<(Vec<String>, Vec<Vec<String>>)> {
        let trimmed = sql.trim().trim_end_matches(';').trim();
        let lowered = trimmed.to_ascii_lowercase();
        let read_only = lowered.starts_with("select")
            || lowered.starts_with("pragma")
            || lowered.starts_with("explain");
        if !read_only || trimmed.contains(';') {
            return Err(HistoryError::InvalidInput(
                "only a single read-only SELECT/PRAGMA statement is allowed".to_string(),
            ));
        }

        let mut stmt = self.conn.prepare(trimmed)?;
        let columns: Vec<String> = stmt
            .column_names()
            .into_iter()
            .map(|c| c.to_string())
            .collect();
        let column_count = columns.len();
        let rows = stmt
            .query_map([], |row| {
                let mut out = Vec::with_capacity(column_count);
                for i in 0..column_count {
                    let value: SqlValue = row.get(i)?;
                    out.push(display_value(&value));
                }
                Ok(out)
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok((columns, rows))
    }
}

fn display_value(value: &SqlValue) -> String {
    match value {
        SqlValue::Null => "NULL".to_string(),
        SqlValue::Integer(i) => i.to_string(),
        SqlValue::Real(f) => f.to_string(),
        SqlValue::Text(s) => s.clone(),
        SqlValue::Blob(b) => format!("<{} bytes>", b.len()),
    }
}

/// Serialize the finding for the `raw_finding` column, applying the
/// configured redaction/encryption/omission policy.
fn prepare_raw_blob(finding: &CommonFinding, opts: &StoreScanOptions) -> Result<String> {
    if !opts.store_raw {
        return Ok(String::new());
    }
    let mut value = serde_json::to_value(finding)?;
    if opts.redact_secrets {
        redact_raw(&mut value);
    }
    let text = serde_json::to_string(&value)?;
    match &opts.encryption_key {
        Some(key) => crypto::encrypt_raw(&text, key),
        None => Ok(text),
    }
}

fn json_opt(value: Option<&Vec<String>>) -> Result<Option<String>> {
    value
        .map(|v| serde_json::to_string(v).map_err(HistoryError::from))
        .transpose()
}

fn env_hostname() -> Option<String> {
    std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("HOST"))
        .ok()
        .filter(|v| !v.is_empty())
}

fn env_username() -> Option<String> {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .ok()
        .filter(|v| !v.is_empty())
}

fn detect_ci() -> (Option<String>, Option<String>) {
    if std::env::var_os("GITHUB_ACTIONS").is_some() {
        return (
            Some("github".to_string()),
            std::env::var("GITHUB_RUN_ID").ok(),
        );
    }
    if std::env::var_os("GITLAB_CI").is_some() {
        return (
            Some("gitlab".to_string()),
            std::env::var("CI_PIPELINE_ID").ok(),
        );
    }
    if std::env::var_os("JENKINS_URL").is_some() {
        return (
            Some("jenkins".to_string()),
            std::env::var("BUILD_NUMBER").ok(),
        );
    }
    (None, None)
}

const SCAN_COLUMNS: &str = "id, timestamp, timestamp_iso, commit_hash, commit_short, branch, tag, \
     is_dirty, profile, tools, targets, target_type, total_findings, critical_count, high_count, \
     medium_count, low_count, info_count, jmo_version, hostname, username, ci_provider, \
     ci_build_id, duration_seconds";

fn scan_from_row(row: &Row<'_>) -> rusqlite::Result<ScanRow> {
    let tools_json: String = row.get(9)?;
    let targets_json: String = row.get(10)?;
    Ok(ScanRow {
        id: row.get(0)?,
        timestamp: row.get(1)?,
        timestamp_iso: row.get(2)?,
        commit_hash: row.get(3)?,
        commit_short: row.get(4)?,
        branch: row.get(5)?,
        tag: row.get(6)?,
        is_dirty: row.get::<_, i64>(7)? != 0,
        profile: row.get(8)?,
        tools: serde_json::from_str(&tools_json).unwrap_or_default(),
        targets: serde_json::from_str(&targets_json).unwrap_or_default(),
        target_type: row.get(11)?,
        total_findings: row.get(12)?,
        critical_count: row.get(13)?,
        high_count: row.get(14)?,
        medium_count: row.get(15)?,
        low_count: row.get(16)?,
        info_count: row.get(17)?,
        jmo_version: row.get(18)?,
        hostname: row.get(19)?,
        username: row.get(20)?,
        ci_provider: row.get(21)?,
        ci_build_id: row.get(22)?,
        duration_seconds: row.get(23)?,
    })
}

const FINDING_COLUMNS: &str = "scan_id, fingerprint, severity, tool, tool_version, rule_id, path, \
     start_line, end_line, title, message, remediation, owasp_top10, cwe_top25, cis_controls, \
     nist_csf, pci_dss, mitre_attack, cvss_score, confidence, likelihood, impact, raw_finding";

fn finding_from_row(row: &Row<'_>) -> rusqlite::Result<FindingRow> {
    Ok(FindingRow {
        scan_id: row.get(0)?,
        fingerprint: row.get(1)?,
        severity: row.get(2)?,
        tool: row.get(3)?,
        tool_version: row.get(4)?,
        rule_id: row.get(5)?,
        path: row.get(6)?,
        start_line: row.get(7)?,
        end_line: row.get(8)?,
        title: row.get(9)?,
        message: row.get(10)?,
        remediation: row.get(11)?,
        owasp_top10: row.get(12)?,
        cwe_top25: row.get(13)?,
        cis_controls: row.get(14)?,
        nist_csf: row.get(15)?,
        pci_dss: row.get(16)?,
        mitre_attack: row.get(17)?,
        cvss_score: row.get(18)?,
        confidence: row.get(19)?,
        likelihood: row.get(20)?,
        impact: row.get(21)?,
        raw_finding: row.get(22)?,
    })
}
