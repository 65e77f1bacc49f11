//! Per-branch trend summary query helper.
//!
//! Selects every scan for a branch inside the time window, builds aligned
//! per-severity vectors, aggregates the top recurring rules, and classifies
//! the overall movement. The richer statistics (Mann-Kendall, scoring,
//! insights) live in the trend engine crate, which builds on this query.

use std::collections::BTreeMap;

use chrono::Utc;
use rusqlite::params_from_iter;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::store::{HistoryDb, ScanFilter};

/// First-to-last deltas with a coarse classification.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImprovementMetrics {
    /// `improving` | `degrading` | `stable` | `insufficient_data`
    pub trend: String,
    pub total_change: i64,
    pub critical_change: i64,
    pub high_change: i64,
}

/// One `(rule_id, severity)` aggregate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TopRule {
    pub rule_id: String,
    pub severity: String,
    pub count: i64,
}

/// Trend summary for one branch over a day window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendSummary {
    pub branch: String,
    pub scan_count: usize,
    pub date_range: (String, String),
    pub scan_ids: Vec<String>,
    pub timestamps: Vec<i64>,
    /// Severity name → per-scan counts, aligned with `timestamps`.
    pub severity_trends: BTreeMap<String, Vec<i64>>,
    pub totals: Vec<i64>,
    pub top_rules: Vec<TopRule>,
    pub improvement_metrics: ImprovementMetrics,
}

/// Classification thresholds: more than five findings either way.
const STABLE_BAND: i64 = 5;

/// Compute the trend summary. Returns `None` when the window holds no
/// scans for the branch.
pub fn trend_summary(db: &HistoryDb, branch: &str, days: u32) -> Result<Option<TrendSummary>> {
    let end_time = Utc::now().timestamp();
    let start_time = end_time - (days as i64 * 86_400);

    let mut scans = db.list_scans(&ScanFilter {
        branch: Some(branch.to_string()),
        since: Some(start_time),
        limit: 1_000_000,
        ..Default::default()
    })?;
    scans.retain(|s| s.timestamp <= end_time);
    // list_scans returns newest first; time series want ascending order
    scans.sort_by_key(|s| s.timestamp);

    if scans.is_empty() {
        return Ok(None);
    }

    let mut severity_trends: BTreeMap<String, Vec<i64>> = BTreeMap::new();
    severity_trends.insert(
        "CRITICAL".to_string(),
        scans.iter().map(|s| s.critical_count).collect(),
    );
    severity_trends.insert(
        "HIGH".to_string(),
        scans.iter().map(|s| s.high_count).collect(),
    );
    severity_trends.insert(
        "MEDIUM".to_string(),
        scans.iter().map(|s| s.medium_count).collect(),
    );
    severity_trends.insert(
        "LOW".to_string(),
        scans.iter().map(|s| s.low_count).collect(),
    );
    severity_trends.insert(
        "INFO".to_string(),
        scans.iter().map(|s| s.info_count).collect(),
    );
    let totals: Vec<i64> = scans.iter().map(|s| s.total_findings).collect();
    let timestamps: Vec<i64> = scans.iter().map(|s| s.timestamp).collect();
    let scan_ids: Vec<String> = scans.iter().map(|s| s.id.clone()).collect();

    let top_rules = top_rules_for_scans(db, &scan_ids)?;

    let improvement_metrics = if scans.len() >= 2 {
        let first = &scans[0];
        let last = &scans[scans.len() - 1];
        let total_change = last.total_findings - first.total_findings;
        let trend = if total_change < -STABLE_BAND {
            "improving"
        } else if total_change > STABLE_BAND {
            "degrading"
        } else {
            "stable"
        };
        ImprovementMetrics {
            trend: trend.to_string(),
            total_change,
            critical_change: last.critical_count - first.critical_count,
            high_change: last.high_count - first.high_count,
        }
    } else {
        ImprovementMetrics {
            trend: "insufficient_data".to_string(),
            total_change: 0,
            critical_change: 0,
            high_change: 0,
        }
    };

    Ok(Some(TrendSummary {
        branch: branch.to_string(),
        scan_count: scans.len(),
        date_range: (
            scans[0].timestamp_iso.clone(),
            scans[scans.len() - 1].timestamp_iso.clone(),
        ),
        scan_ids,
        timestamps,
        severity_trends,
        totals,
        top_rules,
        improvement_metrics,
    }))
}

/// Top ten `(rule_id, severity)` pairs by count across the given scans.
fn top_rules_for_scans(db: &HistoryDb, scan_ids: &[String]) -> Result<Vec<TopRule>> {
    if scan_ids.is_empty() {
        return Ok(Vec::new());
    }
    let placeholders = vec!["?"; scan_ids.len()].join(",");
    let sql = format!(
        "SELECT rule_id, severity, COUNT(*) as count
         FROM findings
         WHERE scan_id IN ({placeholders})
         GROUP BY rule_id, severity
         ORDER BY count DESC
         LIMIT 10"
    );
    let mut stmt = db.conn().prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(scan_ids.iter()), |row| {
            Ok(TopRule {
                rule_id: row.get(0)?,
                severity: row.get(1)?,
                count: row.get(2)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::testutil::{sample_finding, seed_results_dir};
    use crate::store::StoreScanOptions;
    use jmo_core::Severity;

    /// Store a scan on `branch` with `total` HIGH findings, then rewrite
    /// its timestamp so series ordering is deterministic.
    fn store_at(
        db: &mut HistoryDb,
        dir: &std::path::Path,
        label: &str,
        branch: &str,
        total: usize,
        timestamp: i64,
    ) -> String {
        let findings = (0..total)
            .map(|i| sample_finding(&format!("{label}-{i}"), Severity::High))
            .collect();
        let results = seed_results_dir(&dir.join(label), "app", findings);
        let mut opts = StoreScanOptions::new(&results, "balanced", vec![]);
        opts.branch = Some(branch.to_string());
        let id = db.store_scan(&opts).unwrap();
        db.conn()
            .execute(
                "UPDATE scans SET timestamp = ?1 WHERE id = ?2",
                rusqlite::params![timestamp, id],
            )
            .unwrap();
        id
    }

    #[test]
    fn test_improving_series() {
        let tmp = tempfile::tempdir().unwrap();
        let mut db = HistoryDb::open(&tmp.path().join("history.db")).unwrap();
        let base = Utc::now().timestamp() - 9 * 3600;
        // totals 10, 9, 8, ... 1
        for (i, total) in (1..=10).rev().enumerate() {
            store_at(
                &mut db,
                tmp.path(),
                &format!("s{i}"),
                "main",
                total,
                base + i as i64 * 3600,
            );
        }

        let trend = trend_summary(&db, "main", 30).unwrap().unwrap();
        assert_eq!(trend.scan_count, 10);
        assert_eq!(trend.totals, vec![10, 9, 8, 7, 6, 5, 4, 3, 2, 1]);
        assert_eq!(trend.improvement_metrics.trend, "improving");
        assert_eq!(trend.improvement_metrics.total_change, -9);
    }

    #[test]
    fn test_stable_and_degrading() {
        let tmp = tempfile::tempdir().unwrap();
        let mut db = HistoryDb::open(&tmp.path().join("history.db")).unwrap();
        let base = Utc::now().timestamp() - 7200;
        store_at(&mut db, tmp.path(), "a", "dev", 3, base);
        store_at(&mut db, tmp.path(), "b", "dev", 6, base + 3600);
        let trend = trend_summary(&db, "dev", 30).unwrap().unwrap();
        assert_eq!(trend.improvement_metrics.trend, "stable");

        store_at(&mut db, tmp.path(), "c", "dev", 20, base + 7000);
        let trend = trend_summary(&db, "dev", 30).unwrap().unwrap();
        assert_eq!(trend.improvement_metrics.trend, "degrading");
        assert_eq!(trend.improvement_metrics.total_change, 17);
    }

    #[test]
    fn test_insufficient_data_single_scan() {
        let tmp = tempfile::tempdir().unwrap();
        let mut db = HistoryDb::open(&tmp.path().join("history.db")).unwrap();
        store_at(&mut db, tmp.path(), "only", "main", 2, Utc::now().timestamp());
        let trend = trend_summary(&db, "main", 30).unwrap().unwrap();
        assert_eq!(trend.improvement_metrics.trend, "insufficient_data");
    }

    #[test]
    fn test_no_scans_returns_none() {
        let tmp = tempfile::tempdir().unwrap();
        let db = HistoryDb::open(&tmp.path().join("history.db")).unwrap();
        assert!(trend_summary(&db, "ghost", 30).unwrap().is_none());
    }

    #[test]
    fn test_top_rules_aggregate() {
        let tmp = tempfile::tempdir().unwrap();
        let mut db = HistoryDb::open(&tmp.path().join("history.db")).unwrap();
        let base = Utc::now().timestamp() - 3600;
        // the same rule id appears in both scans
        for (i, label) in ["x", "y"].iter().enumerate() {
            let findings = vec![sample_finding("CVE-COMMON", Severity::High)];
            let results = seed_results_dir(&tmp.path().join(label), "app", findings);
            let mut opts = StoreScanOptions::new(&results, "fast", vec![]);
            opts.branch = Some("main".to_string());
            let id = db.store_scan(&opts).unwrap();
            db.conn()
                .execute(
                    "UPDATE scans SET timestamp = ?1 WHERE id = ?2",
                    rusqlite::params![base + i as i64, id],
                )
                .unwrap();
        }
        let trend = trend_summary(&db, "main", 30).unwrap().unwrap();
        assert_eq!(trend.top_rules[0].rule_id, "CVE-COMMON");
        assert_eq!(trend.top_rules[0].count, 2);
    }

    #[test]
    fn test_window_excludes_old_scans() {
        let tmp = tempfile::tempdir().unwrap();
        let mut db = HistoryDb::open(&tmp.path().join("history.db")).unwrap();
        let now = Utc::now().timestamp();
        store_at(&mut db, tmp.path(), "old", "main", 1, now - 90 * 86_400);
        store_at(&mut db, tmp.path(), "new", "main", 1, now - 3600);
        let trend = trend_summary(&db, "main", 30).unwrap().unwrap();
        assert_eq!(trend.scan_count, 1);
    }
}
