//! Hostile-input behavior: everything reaches SQLite through parameterized
//! statements, so quote-laden and injection-shaped strings are stored and
//! read back verbatim without touching the schema.

use std::path::Path;

use jmo_core::{CommonFinding, Severity};
use jmo_history::{HistoryDb, ScanFilter, StoreScanOptions};
use jmo_normalize::{DocumentMeta, FindingsDocument};

fn seed_results(dir: &Path, findings: Vec<CommonFinding>) -> std::path::PathBuf {
    let results = dir.join("results");
    std::fs::create_dir_all(results.join("individual-repos/app")).unwrap();
    let meta = DocumentMeta::new("balanced", vec!["trivy".to_string()], 1, findings.len());
    FindingsDocument::new(meta, findings)
        .write(&results.join("summaries/findings.json"))
        .unwrap();
    results
}

const HOSTILE: &[&str] = &[
    "'; DROP TABLE scans; --",
    "\" OR \"1\"=\"1",
    "Robert'); DELETE FROM findings; --",
    "path/with'quote.py",
    "unicode payload: ß∂ƒ© 攻撃 %s %1$n",
];

#[test]
fn hostile_strings_are_inert_and_roundtrip() {
    let tmp = tempfile::tempdir().unwrap();
    let findings: Vec<CommonFinding> = HOSTILE
        .iter()
        .enumerate()
        .map(|(i, payload)| {
            CommonFinding::new(
                "trivy",
                &format!("RULE-{i}-{payload}"),
                payload,
                Some(1),
                Severity::High,
                payload,
            )
        })
        .collect();
    let results = seed_results(tmp.path(), findings);

    let mut db = HistoryDb::open(&tmp.path().join("history.db")).unwrap();
    let scan_id = db
        .store_scan(&StoreScanOptions::new(&results, "balanced", vec![]))
        .unwrap();

    // all rows landed; the schema survived
    let rows = db.findings_for_scan(&scan_id, None).unwrap();
    assert_eq!(rows.len(), HOSTILE.len());
    for payload in HOSTILE.iter() {
        assert!(
            rows.iter().any(|r| r.message == *payload),
            "payload not stored verbatim: {payload}"
        );
    }
    let scans = db
        .list_scans(&ScanFilter {
            limit: 10,
            ..Default::default()
        })
        .unwrap();
    assert_eq!(scans.len(), 1);
}

#[test]
fn hostile_branch_filter_is_parameterized() {
    let tmp = tempfile::tempdir().unwrap();
    let results = seed_results(tmp.path(), Vec::new());
    let mut db = HistoryDb::open(&tmp.path().join("history.db")).unwrap();
    let mut opts = StoreScanOptions::new(&results, "fast", vec![]);
    opts.branch = Some("main".to_string());
    db.store_scan(&opts).unwrap();

    // filtering by an injection-shaped branch matches nothing and breaks nothing
    let scans = db
        .list_scans(&ScanFilter {
            branch: Some("main' OR '1'='1".to_string()),
            limit: 10,
            ..Default::default()
        })
        .unwrap();
    assert!(scans.is_empty());

    let scans = db
        .list_scans(&ScanFilter {
            branch: Some("main".to_string()),
            limit: 10,
            ..Default::default()
        })
        .unwrap();
    assert_eq!(scans.len(), 1);
}

#[test]
fn query_escape_hatch_refuses_writes() {
    let tmp = tempfile::tempdir().unwrap();
    let db = HistoryDb::open(&tmp.path().join("history.db")).unwrap();

    for stmt in [
        "DROP TABLE scans",
        "DELETE FROM findings",
        "INSERT INTO scans (id) VALUES ('x')",
        "UPDATE scans SET profile='fast'",
        "SELECT 1; DROP TABLE scans",
        "ATTACH DATABASE '/tmp/evil.db' AS evil",
    ] {
        assert!(db.query_rows(stmt).is_err(), "accepted: {stmt}");
    }

    // reads still work
    assert!(db.query_rows("SELECT COUNT(*) FROM scans").is_ok());
    assert!(db.query_rows("PRAGMA integrity_check").is_ok());
}
