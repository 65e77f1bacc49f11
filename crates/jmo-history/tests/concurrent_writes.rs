//! Concurrent-writer behavior: many threads storing scans into the same
//! database file must all land, with lock contention absorbed by the busy
//! timeout rather than surfacing to callers.

use std::path::Path;

use jmo_core::{CommonFinding, Severity};
use jmo_history::{HistoryDb, ScanFilter, StoreScanOptions};
use jmo_normalize::{DocumentMeta, FindingsDocument};

fn seed_results_dir(dir: &Path, findings: Vec<CommonFinding>) -> std::path::PathBuf {
    let results = dir.join("results");
    std::fs::create_dir_all(results.join("individual-repos/app")).unwrap();
    let meta = DocumentMeta::new("balanced", vec!["trivy".to_string()], 1, findings.len());
    FindingsDocument::new(meta, findings)
        .write(&results.join("summaries/findings.json"))
        .unwrap();
    results
}

#[test]
fn ten_writers_five_scans_each_all_persist() {
    let tmp = tempfile::tempdir().unwrap();
    let db_path = tmp.path().join("history.db");

    // initialize the schema once before the writers race
    drop(HistoryDb::open(&db_path).unwrap());

    let handles: Vec<_> = (0..10)
        .map(|writer| {
            let db_path = db_path.clone();
            let base = tmp.path().join(format!("writer-{writer}"));
            std::thread::spawn(move || {
                for scan in 0..5 {
                    let findings = vec![CommonFinding::new(
                        "trivy",
                        &format!("CVE-{writer}-{scan}"),
                        "src/app.py",
                        Some(1),
                        Severity::High,
                        "concurrent write probe",
                    )];
                    let results = seed_results_dir(&base.join(scan.to_string()), findings);

                    // each writer holds its own connection
                    let mut db = HistoryDb::open(&db_path).expect("open");
                    db.store_scan(&StoreScanOptions::new(&results, "balanced", vec![]))
                        .expect("store_scan must not surface locking errors");
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("writer thread panicked");
    }

    let db = HistoryDb::open(&db_path).unwrap();
    let scans = db
        .list_scans(&ScanFilter {
            limit: 1000,
            ..Default::default()
        })
        .unwrap();
    assert_eq!(scans.len(), 50);

    // every scan carries exactly its one finding, counted by the triggers
    for scan in &scans {
        assert_eq!(scan.total_findings, 1);
        assert_eq!(scan.high_count, 1);
    }
}
