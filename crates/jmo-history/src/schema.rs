//! Schema DDL: tables, indices, triggers and views.
//!
//! The per-scan severity counters are maintained exclusively by the
//! AFTER INSERT / AFTER DELETE triggers on `findings`; application code
//! inserts scans with zero counts and never writes the counters directly.

use chrono::{TimeZone, Utc};
use rusqlite::Connection;

use crate::error::Result;

/// Baseline schema version recorded at initialization.
pub const STORE_SCHEMA_VERSION: &str = "1.0.0";

const CREATE_SCHEMA_VERSION_TABLE: &str = "
CREATE TABLE IF NOT EXISTS schema_version (
    version TEXT PRIMARY KEY,
    applied_at INTEGER NOT NULL,
    applied_at_iso TEXT NOT NULL
);
";

const CREATE_SCANS_TABLE: &str = "
CREATE TABLE IF NOT EXISTS scans (
    id TEXT PRIMARY KEY,

    timestamp INTEGER NOT NULL,
    timestamp_iso TEXT NOT NULL,

    -- Git context (nullable for non-repo targets)
    commit_hash TEXT,
    commit_short TEXT,
    branch TEXT,
    tag TEXT,
    is_dirty INTEGER DEFAULT 0,

    -- Scan configuration
    profile TEXT NOT NULL,
    tools TEXT NOT NULL,
    targets TEXT NOT NULL,
    target_type TEXT NOT NULL,

    -- Results summary, driven by triggers
    total_findings INTEGER NOT NULL DEFAULT 0,
    critical_count INTEGER NOT NULL DEFAULT 0,
    high_count INTEGER NOT NULL DEFAULT 0,
    medium_count INTEGER NOT NULL DEFAULT 0,
    low_count INTEGER NOT NULL DEFAULT 0,
    info_count INTEGER NOT NULL DEFAULT 0,

    -- Provenance
    jmo_version TEXT NOT NULL,
    hostname TEXT,
    username TEXT,
    ci_provider TEXT,
    ci_build_id TEXT,

    duration_seconds REAL,

    CHECK (profile IN ('fast', 'balanced', 'deep')),
    CHECK (target_type IN ('repo', 'image', 'iac', 'url', 'gitlab', 'k8s', 'unknown'))
);
";

const CREATE_FINDINGS_TABLE: &str = "
CREATE TABLE IF NOT EXISTS findings (
    scan_id TEXT NOT NULL,
    fingerprint TEXT NOT NULL,

    severity TEXT NOT NULL,
    tool TEXT NOT NULL,
    tool_version TEXT,
    rule_id TEXT NOT NULL,

    path TEXT NOT NULL,
    start_line INTEGER,
    end_line INTEGER,

    title TEXT,
    message TEXT NOT NULL,
    remediation TEXT,

    -- Compliance mappings, JSON text
    owasp_top10 TEXT,
    cwe_top25 TEXT,
    cis_controls TEXT,
    nist_csf TEXT,
    pci_dss TEXT,
    mitre_attack TEXT,

    -- Risk scoring
    cvss_score REAL,
    confidence TEXT,
    likelihood TEXT,
    impact TEXT,

    raw_finding TEXT NOT NULL,

    PRIMARY KEY (scan_id, fingerprint),
    FOREIGN KEY (scan_id) REFERENCES scans(id) ON DELETE CASCADE,
    CHECK (severity IN ('CRITICAL', 'HIGH', 'MEDIUM', 'LOW', 'INFO')),
    CHECK (confidence IN ('HIGH', 'MEDIUM', 'LOW') OR confidence IS NULL),
    CHECK (likelihood IN ('HIGH', 'MEDIUM', 'LOW') OR likelihood IS NULL),
    CHECK (impact IN ('HIGH', 'MEDIUM', 'LOW') OR impact IS NULL)
);
";

const CREATE_SCAN_METADATA_TABLE: &str = "
CREATE TABLE IF NOT EXISTS scan_metadata (
    scan_id TEXT NOT NULL,
    key TEXT NOT NULL,
    value TEXT NOT NULL,

    PRIMARY KEY (scan_id, key),
    FOREIGN KEY (scan_id) REFERENCES scans(id) ON DELETE CASCADE
);
";

const CREATE_ATTESTATIONS_TABLE: &str = "
CREATE TABLE IF NOT EXISTS attestations (
    scan_id TEXT PRIMARY KEY,
    attestation_json TEXT NOT NULL,
    signature_path TEXT,
    certificate_path TEXT,
    rekor_entry TEXT,
    rekor_published INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL,
    slsa_level TEXT,

    FOREIGN KEY (scan_id) REFERENCES scans(id) ON DELETE CASCADE
);
";

const CREATE_INDICES: [&str; 14] = [
    "CREATE INDEX IF NOT EXISTS idx_scans_timestamp ON scans(timestamp DESC);",
    "CREATE INDEX IF NOT EXISTS idx_scans_branch ON scans(branch) WHERE branch IS NOT NULL;",
    "CREATE INDEX IF NOT EXISTS idx_scans_tag ON scans(tag) WHERE tag IS NOT NULL;",
    "CREATE INDEX IF NOT EXISTS idx_scans_commit ON scans(commit_hash) WHERE commit_hash IS NOT NULL;",
    "CREATE INDEX IF NOT EXISTS idx_scans_target_type ON scans(target_type);",
    "CREATE INDEX IF NOT EXISTS idx_scans_profile ON scans(profile);",
    "CREATE INDEX IF NOT EXISTS idx_findings_scan_id ON findings(scan_id);",
    "CREATE INDEX IF NOT EXISTS idx_findings_fingerprint ON findings(fingerprint);",
    "CREATE INDEX IF NOT EXISTS idx_findings_severity ON findings(severity);",
    "CREATE INDEX IF NOT EXISTS idx_findings_tool ON findings(tool);",
    "CREATE INDEX IF NOT EXISTS idx_findings_rule_id ON findings(rule_id);",
    "CREATE INDEX IF NOT EXISTS idx_findings_path ON findings(path);",
    "CREATE INDEX IF NOT EXISTS idx_findings_cvss ON findings(cvss_score DESC) WHERE cvss_score IS NOT NULL;",
    "CREATE INDEX IF NOT EXISTS idx_metadata_scan_id ON scan_metadata(scan_id);",
];

const CREATE_TRIGGERS: [&str; 2] = [
    "
    CREATE TRIGGER IF NOT EXISTS update_scan_counts_on_insert
    AFTER INSERT ON findings
    BEGIN
        UPDATE scans
        SET
            total_findings = total_findings + 1,
            critical_count = critical_count + CASE WHEN NEW.severity = 'CRITICAL' THEN 1 ELSE 0 END,
            high_count = high_count + CASE WHEN NEW.severity = 'HIGH' THEN 1 ELSE 0 END,
            medium_count = medium_count + CASE WHEN NEW.severity = 'MEDIUM' THEN 1 ELSE 0 END,
            low_count = low_count + CASE WHEN NEW.severity = 'LOW' THEN 1 ELSE 0 END,
            info_count = info_count + CASE WHEN NEW.severity = 'INFO' THEN 1 ELSE 0 END
        WHERE id = NEW.scan_id;
    END;
    ",
    "
    CREATE TRIGGER IF NOT EXISTS update_scan_counts_on_delete
    AFTER DELETE ON findings
    BEGIN
        UPDATE scans
        SET
            total_findings = total_findings - 1,
            critical_count = critical_count - CASE WHEN OLD.severity = 'CRITICAL' THEN 1 ELSE 0 END,
            high_count = high_count - CASE WHEN OLD.severity = 'HIGH' THEN 1 ELSE 0 END,
            medium_count = medium_count - CASE WHEN OLD.severity = 'MEDIUM' THEN 1 ELSE 0 END,
            low_count = low_count - CASE WHEN OLD.severity = 'LOW' THEN 1 ELSE 0 END,
            info_count = info_count - CASE WHEN OLD.severity = 'INFO' THEN 1 ELSE 0 END
        WHERE id = OLD.scan_id;
    END;
    ",
];

const CREATE_VIEWS: [&str; 2] = [
    "
    CREATE VIEW IF NOT EXISTS latest_scan_by_branch AS
    SELECT
        s.branch,
        MAX(s.timestamp) AS latest_timestamp,
        s.id AS scan_id
    FROM scans s
    WHERE s.branch IS NOT NULL
    GROUP BY s.branch;
    ",
    "
    CREATE VIEW IF NOT EXISTS finding_history AS
    SELECT
        f.fingerprint,
        f.severity,
        f.rule_id,
        f.path,
        MIN(s.timestamp) AS first_seen,
        MAX(s.timestamp) AS last_seen,
        COUNT(DISTINCT s.id) AS scan_count
    FROM findings f
    JOIN scans s ON f.scan_id = s.id
    GROUP BY f.fingerprint;
    ",
];

/// Create all tables, indices, triggers and views, and record the baseline
/// schema version. Idempotent.
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch("BEGIN;")?;
    let result = (|| -> Result<()> {
        conn.execute_batch(CREATE_SCHEMA_VERSION_TABLE)?;
        conn.execute_batch(CREATE_SCANS_TABLE)?;
        conn.execute_batch(CREATE_FINDINGS_TABLE)?;
        conn.execute_batch(CREATE_SCAN_METADATA_TABLE)?;
        conn.execute_batch(CREATE_ATTESTATIONS_TABLE)?;
        for sql in CREATE_INDICES {
            conn.execute_batch(sql)?;
        }
        for sql in CREATE_TRIGGERS {
            conn.execute_batch(sql)?;
        }
        for sql in CREATE_VIEWS {
            conn.execute_batch(sql)?;
        }

        let existing: i64 = conn.query_row(
            "SELECT COUNT(*) FROM schema_version WHERE version = ?1",
            [STORE_SCHEMA_VERSION],
            |row| row.get(0),
        )?;
        if existing == 0 {
            let now = Utc::now().timestamp();
            let now_iso = Utc
                .timestamp_opt(now, 0)
                .single()
                .map(|t| t.to_rfc3339())
                .unwrap_or_default();
            conn.execute(
                "INSERT INTO schema_version (version, applied_at, applied_at_iso) VALUES (?1, ?2, ?3)",
                rusqlite::params![STORE_SCHEMA_VERSION, now, now_iso],
            )?;
        }
        Ok(())
    })();

    match result {
        Ok(()) => {
            conn.execute_batch("COMMIT;")?;
            Ok(())
        }
        Err(err) => {
            let _ = conn.execute_batch("ROLLBACK;");
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys=ON;").unwrap();
        conn
    }

    #[test]
    fn test_init_schema_idempotent() {
        let conn = memory_conn();
        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap();
        let versions: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_version", [], |r| r.get(0))
            .unwrap();
        assert_eq!(versions, 1);
    }

    #[test]
    fn test_all_tables_exist() {
        let conn = memory_conn();
        init_schema(&conn).unwrap();
        for table in [
            "scans",
            "findings",
            "scan_metadata",
            "schema_version",
            "attestations",
        ] {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
                    [table],
                    |r| r.get(0),
                )
                .unwrap();
            assert_eq!(count, 1, "missing table {table}");
        }
    }

    #[test]
    fn test_severity_check_constraint() {
        let conn = memory_conn();
        init_schema(&conn).unwrap();
        conn.execute(
            "INSERT INTO scans (id, timestamp, timestamp_iso, profile, tools, targets, target_type, jmo_version)
             VALUES ('s1', 1, 'iso', 'fast', '[]', '[]', 'repo', '1.0.0')",
            [],
        )
        .unwrap();
        let res = conn.execute(
            "INSERT INTO findings (scan_id, fingerprint, severity, tool, rule_id, path, message, raw_finding)
             VALUES ('s1', 'f1', 'SEVERE', 't', 'r', 'p', 'm', '{}')",
            [],
        );
        assert!(res.is_err(), "severity outside the enum must be rejected");
    }

    #[test]
    fn test_profile_check_constraint() {
        let conn = memory_conn();
        init_schema(&conn).unwrap();
        let res = conn.execute(
            "INSERT INTO scans (id, timestamp, timestamp_iso, profile, tools, targets, target_type, jmo_version)
             VALUES ('s1', 1, 'iso', 'turbo', '[]', '[]', 'repo', '1.0.0')",
            [],
        );
        assert!(res.is_err());
    }

    #[test]
    fn test_triggers_maintain_counts() {
        let conn = memory_conn();
        init_schema(&conn).unwrap();
        conn.execute(
            "INSERT INTO scans (id, timestamp, timestamp_iso, profile, tools, targets, target_type, jmo_version)
             VALUES ('s1', 1, 'iso', 'balanced', '[]', '[]', 'repo', '1.0.0')",
            [],
        )
        .unwrap();
        for (fp, sev) in [("f1", "CRITICAL"), ("f2", "HIGH"), ("f3", "HIGH"), ("f4", "INFO")] {
            conn.execute(
                "INSERT INTO findings (scan_id, fingerprint, severity, tool, rule_id, path, message, raw_finding)
                 VALUES ('s1', ?1, ?2, 't', 'r', 'p', 'm', '{}')",
                rusqlite::params![fp, sev],
            )
            .unwrap();
        }
        let (total, critical, high, info): (i64, i64, i64, i64) = conn
            .query_row(
                "SELECT total_findings, critical_count, high_count, info_count FROM scans WHERE id='s1'",
                [],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
            )
            .unwrap();
        assert_eq!((total, critical, high, info), (4, 1, 2, 1));

        conn.execute("DELETE FROM findings WHERE fingerprint='f2'", [])
            .unwrap();
        let (total, high): (i64, i64) = conn
            .query_row(
                "SELECT total_findings, high_count FROM scans WHERE id='s1'",
                [],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .unwrap();
        assert_eq!((total, high), (3, 1));
    }

    #[test]
    fn test_foreign_key_rejects_orphan_finding() {
        let conn = memory_conn();
        init_schema(&conn).unwrap();
        let res = conn.execute(
            "INSERT INTO findings (scan_id, fingerprint, severity, tool, rule_id, path, message, raw_finding)
             VALUES ('missing-scan', 'f1', 'HIGH', 't', 'r', 'p', 'm', '{}')",
            [],
        );
        assert!(res.is_err());
    }

    #[test]
    fn test_cascade_delete() {
        let conn = memory_conn();
        init_schema(&conn).unwrap();
        conn.execute(
            "INSERT INTO scans (id, timestamp, timestamp_iso, profile, tools, targets, target_type, jmo_version)
             VALUES ('s1', 1, 'iso', 'deep', '[]', '[]', 'repo', '1.0.0')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO findings (scan_id, fingerprint, severity, tool, rule_id, path, message, raw_finding)
             VALUES ('s1', 'f1', 'LOW', 't', 'r', 'p', 'm', '{}')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO scan_metadata (scan_id, key, value) VALUES ('s1', 'results_dir', '/tmp/x')",
            [],
        )
        .unwrap();

        conn.execute("DELETE FROM scans WHERE id='s1'", []).unwrap();
        let findings: i64 = conn
            .query_row("SELECT COUNT(*) FROM findings", [], |r| r.get(0))
            .unwrap();
        let metadata: i64 = conn
            .query_row("SELECT COUNT(*) FROM scan_metadata", [], |r| r.get(0))
            .unwrap();
        assert_eq!((findings, metadata), (0, 0));
    }

    #[test]
    fn test_duplicate_fingerprint_rejected_within_scan() {
        let conn = memory_conn();
        init_schema(&conn).unwrap();
        conn.execute(
            "INSERT INTO scans (id, timestamp, timestamp_iso, profile, tools, targets, target_type, jmo_version)
             VALUES ('s1', 1, 'iso', 'fast', '[]', '[]', 'repo', '1.0.0')",
            [],
        )
        .unwrap();
        let insert = "INSERT INTO findings (scan_id, fingerprint, severity, tool, rule_id, path, message, raw_finding)
             VALUES ('s1', 'dup', 'LOW', 't', 'r', 'p', 'm', '{}')";
        conn.execute(insert, []).unwrap();
        assert!(conn.execute(insert, []).is_err());
    }

    #[test]
    fn test_views_exist_and_answer() {
        let conn = memory_conn();
        init_schema(&conn).unwrap();
        conn.execute(
            "INSERT INTO scans (id, timestamp, timestamp_iso, branch, profile, tools, targets, target_type, jmo_version)
             VALUES ('s1', 100, 'iso', 'main', 'fast', '[]', '[]', 'repo', '1.0.0')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO scans (id, timestamp, timestamp_iso, branch, profile, tools, targets, target_type, jmo_version)
             VALUES ('s2', 200, 'iso', 'main', 'fast', '[]', '[]', 'repo', '1.0.0')",
            [],
        )
        .unwrap();
        let (branch, ts): (String, i64) = conn
            .query_row(
                "SELECT branch, latest_timestamp FROM latest_scan_by_branch WHERE branch='main'",
                [],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .unwrap();
        assert_eq!(branch, "main");
        assert_eq!(ts, 200);
    }

    #[test]
    fn test_documented_queries_use_indices() {
        let conn = memory_conn();
        init_schema(&conn).unwrap();
        for (query, needle) in [
            (
                "EXPLAIN QUERY PLAN SELECT * FROM scans WHERE branch = 'main'",
                "idx_scans_branch",
            ),
            (
                "EXPLAIN QUERY PLAN SELECT * FROM findings WHERE scan_id = 'x'",
                "idx_findings_scan_id",
            ),
            (
                "EXPLAIN QUERY PLAN SELECT * FROM findings WHERE fingerprint = 'x'",
                "idx_findings_fingerprint",
            ),
        ] {
            let mut stmt = conn.prepare(query).unwrap();
            let plans: Vec<String> = stmt
                .query_map([], |row| row.get::<_, String>(3))
                .unwrap()
                .filter_map(|r| r.ok())
                .collect();
            let plan = plans.join(" | ");
            assert!(
                plan.contains("USING INDEX") || plan.contains(needle) || plan.contains("PRIMARY KEY"),
                "query not index-backed: {plan}"
            );
        }
    }
}
