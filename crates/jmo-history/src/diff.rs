//! Fingerprint-set diff between two scans.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::store::{FindingRow, HistoryDb};

/// Three disjoint finding lists. `new` and `unchanged` carry records from
/// the second scan, `resolved` from the first.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiffResult {
    pub new: Vec<FindingRow>,
    pub resolved: Vec<FindingRow>,
    pub unchanged: Vec<FindingRow>,
}

impl DiffResult {
    pub fn counts(&self) -> (usize, usize, usize) {
        (self.new.len(), self.resolved.len(), self.unchanged.len())
    }
}

/// Compare two scans by fingerprint. Both ids accept unique prefixes;
/// unknown or ambiguous ids fail.
pub fn compute_diff(db: &HistoryDb, baseline_id: &str, current_id: &str) -> Result<DiffResult> {
    let baseline = db.get_scan(baseline_id)?;
    let current = db.get_scan(current_id)?;

    let baseline_findings: HashMap<String, FindingRow> = db
        .findings_for_scan(&baseline.id, None)?
        .into_iter()
        .map(|f| (f.fingerprint.clone(), f))
        .collect();
    let current_findings: HashMap<String, FindingRow> = db
        .findings_for_scan(&current.id, None)?
        .into_iter()
        .map(|f| (f.fingerprint.clone(), f))
        .collect();

    let mut result = DiffResult::default();
    for (fingerprint, finding) in &current_findings {
        if baseline_findings.contains_key(fingerprint) {
            result.unchanged.push(finding.clone());
        } else {
            result.new.push(finding.clone());
        }
    }
    for (fingerprint, finding) in &baseline_findings {
        if !current_findings.contains_key(fingerprint) {
            result.resolved.push(finding.clone());
        }
    }

    // deterministic output ordering
    let sort_key = |f: &FindingRow| (f.path.clone(), f.fingerprint.clone());
    result.new.sort_by_key(sort_key);
    result.resolved.sort_by_key(sort_key);
    result.unchanged.sort_by_key(sort_key);
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HistoryError;
    use crate::store::testutil::{sample_finding, seed_results_dir};
    use crate::store::StoreScanOptions;
    use jmo_core::Severity;

    fn store(
        db: &mut HistoryDb,
        dir: &std::path::Path,
        label: &str,
        rules: &[&str],
    ) -> String {
        let findings = rules
            .iter()
            .map(|r| sample_finding(r, Severity::High))
            .collect();
        let results = seed_results_dir(&dir.join(label), "app", findings);
        db.store_scan(&StoreScanOptions::new(&results, "balanced", vec![]))
            .unwrap()
    }

    #[test]
    fn test_diff_identical_scans() {
        let tmp = tempfile::tempdir().unwrap();
        let mut db = HistoryDb::open(&tmp.path().join("history.db")).unwrap();
        let a = store(&mut db, tmp.path(), "a", &["f1", "f2"]);
        let b = store(&mut db, tmp.path(), "b", &["f1", "f2"]);

        let diff = compute_diff(&db, &a, &b).unwrap();
        assert_eq!(diff.counts(), (0, 0, 2));
    }

    #[test]
    fn test_diff_self_is_all_unchanged() {
        let tmp = tempfile::tempdir().unwrap();
        let mut db = HistoryDb::open(&tmp.path().join("history.db")).unwrap();
        let a = store(&mut db, tmp.path(), "a", &["f1", "f2", "f3"]);
        let diff = compute_diff(&db, &a, &a).unwrap();
        assert_eq!(diff.counts(), (0, 0, 3));
    }

    #[test]
    fn test_diff_new_and_resolved() {
        let tmp = tempfile::tempdir().unwrap();
        let mut db = HistoryDb::open(&tmp.path().join("history.db")).unwrap();
        let a = store(&mut db, tmp.path(), "a", &["old", "shared"]);
        let b = store(&mut db, tmp.path(), "b", &["shared", "fresh"]);

        let diff = compute_diff(&db, &a, &b).unwrap();
        assert_eq!(diff.counts(), (1, 1, 1));
        assert_eq!(diff.new[0].rule_id, "fresh");
        assert_eq!(diff.resolved[0].rule_id, "old");
        // records for new/unchanged come from the second scan
        assert_eq!(diff.new[0].scan_id, db.get_scan(&b).unwrap().id);
        assert_eq!(diff.resolved[0].scan_id, db.get_scan(&a).unwrap().id);
    }

    #[test]
    fn test_diff_invalid_id_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let mut db = HistoryDb::open(&tmp.path().join("history.db")).unwrap();
        let a = store(&mut db, tmp.path(), "a", &["f1"]);
        assert!(matches!(
            compute_diff(&db, &a, "no-such-scan"),
            Err(HistoryError::ScanNotFound(_))
        ));
    }
}
