//! Full trend analysis over the history store.

use std::collections::{BTreeMap, HashSet};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use jmo_history::{trend_summary, HistoryDb, ScanRow, TopRule};

use crate::error::Result;
use crate::insights::{generate_insights, Insight, InsightContext};
use crate::mannkendall::{mann_kendall, MannKendall};
use crate::regression::{detect_regressions, Regression};
use crate::score::ScoreBlock;

/// Analysis metadata block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisMetadata {
    pub branch: String,
    pub scan_count: usize,
    pub date_range: DateRange,
    pub scan_ids: Vec<String>,
    pub analysis_timestamp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DateRange {
    pub start: String,
    pub end: String,
}

/// Aligned time-series block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeverityTrends {
    pub by_severity: BTreeMap<String, Vec<i64>>,
    pub total: Vec<i64>,
    pub timestamps: Vec<i64>,
}

/// Improvement metrics over the window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImprovementBlock {
    /// `last.total − first.total`; negative is improvement.
    pub net_change: i64,
    /// Findings resolved across consecutive scan pairs.
    pub resolved: i64,
    /// Findings introduced across consecutive scan pairs.
    pub introduced: i64,
    pub percent_change: f64,
    pub by_severity: BTreeMap<String, i64>,
    pub trend: String,
}

/// The complete analysis structure consumed by exporters and the CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendAnalysis {
    pub metadata: AnalysisMetadata,
    pub severity_trends: SeverityTrends,
    pub security_score: ScoreBlock,
    pub improvement_metrics: ImprovementBlock,
    pub regressions: Vec<Regression>,
    pub insights: Vec<Insight>,
    pub top_rules: Vec<TopRule>,
    /// Mann-Kendall results keyed by series name (`total` plus severities).
    pub statistics: BTreeMap<String, MannKendall>,
}

/// Analyze one branch over a day window. `None` when the window is empty.
pub fn analyze_trends(db: &HistoryDb, branch: &str, days: u32) -> Result<Option<TrendAnalysis>> {
    let Some(summary) = trend_summary(db, branch, days)? else {
        return Ok(None);
    };
    info!(branch, days, scans = summary.scan_count, "analyzing trends");

    let scans: Vec<ScanRow> = summary
        .scan_ids
        .iter()
        .map(|id| db.get_scan(id))
        .collect::<jmo_history::Result<_>>()?;

    // Resolved/introduced via consecutive fingerprint-set diffs.
    let fingerprint_sets: Vec<HashSet<String>> = scans
        .iter()
        .map(|scan| {
            db.fingerprints_for_scan(&scan.id)
                .map(|fps| fps.into_iter().collect())
        })
        .collect::<jmo_history::Result<_>>()?;
    let mut resolved = 0i64;
    let mut introduced = 0i64;
    for pair in fingerprint_sets.windows(2) {
        resolved += pair[0].difference(&pair[1]).count() as i64;
        introduced += pair[1].difference(&pair[0]).count() as i64;
    }

    // Posture score series and its trend.
    let counts: Vec<(i64, i64, i64, i64)> = scans
        .iter()
        .map(|s| (s.critical_count, s.high_count, s.medium_count, s.low_count))
        .collect();
    let security_score = ScoreBlock::from_counts(&counts);

    // Mann-Kendall over total and each severity series.
    let mut statistics = BTreeMap::new();
    let totals_f: Vec<f64> = summary.totals.iter().map(|v| *v as f64).collect();
    statistics.insert("total".to_string(), mann_kendall(&totals_f));
    for (severity, series) in &summary.severity_trends {
        let series_f: Vec<f64> = series.iter().map(|v| *v as f64).collect();
        statistics.insert(severity.clone(), mann_kendall(&series_f));
    }

    let regressions = detect_regressions(&scans);

    // Severity deltas first → last.
    let mut by_severity = BTreeMap::new();
    for (severity, series) in &summary.severity_trends {
        let delta = match (series.first(), series.last()) {
            (Some(first), Some(last)) => last - first,
            _ => 0,
        };
        by_severity.insert(severity.clone(), delta);
    }

    let net_change = summary.improvement_metrics.total_change;
    let first_total = summary.totals.first().copied().unwrap_or(0);
    let percent_change = if first_total != 0 {
        net_change as f64 / first_total as f64 * 100.0
    } else {
        0.0
    };

    let top_rule_streak = top_rule_streak(db, &scans)?;
    let insights = generate_insights(&InsightContext {
        scan_count: scans.len(),
        total_change: net_change,
        resolved,
        introduced,
        regressions: &regressions,
        top_rule_streak,
    });

    Ok(Some(TrendAnalysis {
        metadata: AnalysisMetadata {
            branch: branch.to_string(),
            scan_count: summary.scan_count,
            date_range: DateRange {
                start: summary.date_range.0.clone(),
                end: summary.date_range.1.clone(),
            },
            scan_ids: summary.scan_ids.clone(),
            analysis_timestamp: Utc::now().to_rfc3339(),
        },
        severity_trends: SeverityTrends {
            by_severity: summary.severity_trends.clone(),
            total: summary.totals.clone(),
            timestamps: summary.timestamps.clone(),
        },
        security_score,
        improvement_metrics: ImprovementBlock {
            net_change,
            resolved,
            introduced,
            percent_change,
            by_severity,
            trend: summary.improvement_metrics.trend.clone(),
        },
        regressions,
        insights,
        top_rules: summary.top_rules.clone(),
        statistics,
    }))
}

/// Longest current streak of one rule inside the per-scan top three,
/// counted backwards from the latest scan.
fn top_rule_streak(db: &HistoryDb, scans: &[ScanRow]) -> Result<Option<(String, usize)>> {
    if scans.is_empty() {
        return Ok(None);
    }
    let top3_per_scan: Vec<Vec<String>> = scans
        .iter()
        .map(|scan| top3_rules(db, &scan.id))
        .collect::<Result<_>>()?;

    let Some(latest) = top3_per_scan.last() else {
        return Ok(None);
    };
    let mut best: Option<(String, usize)> = None;
    for rule in latest {
        let streak = top3_per_scan
            .iter()
            .rev()
            .take_while(|top3| top3.contains(rule))
            .count();
        if best.as_ref().map(|(_, s)| streak > *s).unwrap_or(true) {
            best = Some((rule.clone(), streak));
        }
    }
    Ok(best)
}

fn top3_rules(db: &HistoryDb, scan_id: &str) -> Result<Vec<String>> {
    Ok(db.top_rules_for_scan(scan_id, 3)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use jmo_core::{CommonFinding, Severity};
    use jmo_history::StoreScanOptions;
    use jmo_normalize::{DocumentMeta, FindingsDocument};
    use std::path::Path;

    fn seed_scan(
        db: &mut HistoryDb,
        dir: &Path,
        label: &str,
        rules: &[(&str, Severity)],
        timestamp: i64,
    ) -> String {
        let findings: Vec<CommonFinding> = rules
            .iter()
            .map(|(rule, severity)| {
                CommonFinding::new("trivy", rule, "src/app.py", Some(1), *severity, rule)
            })
            .collect();
        let results = dir.join(label).join("results");
        std::fs::create_dir_all(results.join("individual-repos/app")).unwrap();
        let meta = DocumentMeta::new("balanced", vec!["trivy".to_string()], 1, findings.len());
        FindingsDocument::new(meta, findings)
            .write(&results.join("summaries/findings.json"))
            .unwrap();

        let mut opts = StoreScanOptions::new(&results, "balanced", vec![]);
        opts.branch = Some("main".to_string());
        let id = db.store_scan(&opts).unwrap();
        db.conn()
            .execute(
                "UPDATE scans SET timestamp = ?1 WHERE id = ?2",
                rusqlite::params![timestamp, id],
            )
            .unwrap();
        id
    }

    fn open_db(dir: &Path) -> HistoryDb {
        HistoryDb::open(&dir.join("history.db")).unwrap()
    }

    #[test]
    fn test_empty_branch_returns_none() {
        let tmp = tempfile::tempdir().unwrap();
        let db = open_db(tmp.path());
        assert!(analyze_trends(&db, "main", 30).unwrap().is_none());
    }

    #[test]
    fn test_resolved_and_introduced_counts() {
        let tmp = tempfile::tempdir().unwrap();
        let mut db = open_db(tmp.path());
        let base = Utc::now().timestamp() - 7200;
        seed_scan(
            &mut db,
            tmp.path(),
            "a",
            &[("old-1", Severity::High), ("shared", Severity::High)],
            base,
        );
        seed_scan(
            &mut db,
            tmp.path(),
            "b",
            &[("shared", Severity::High), ("new-1", Severity::High), ("new-2", Severity::High)],
            base + 3600,
        );

        let analysis = analyze_trends(&db, "main", 30).unwrap().unwrap();
        assert_eq!(analysis.improvement_metrics.resolved, 1);
        assert_eq!(analysis.improvement_metrics.introduced, 2);
        assert_eq!(analysis.improvement_metrics.net_change, 1);
    }

    #[test]
    fn test_regression_detected_in_analysis() {
        let tmp = tempfile::tempdir().unwrap();
        let mut db = open_db(tmp.path());
        let base = Utc::now().timestamp() - 7200;
        seed_scan(&mut db, tmp.path(), "a", &[], base);
        seed_scan(
            &mut db,
            tmp.path(),
            "b",
            &[("crit-1", Severity::Critical)],
            base + 3600,
        );

        let analysis = analyze_trends(&db, "main", 30).unwrap().unwrap();
        let regression = analysis
            .regressions
            .iter()
            .find(|r| r.severity == "CRITICAL")
            .expect("critical regression");
        assert_eq!(regression.previous_value, 0.0);
        assert_eq!(regression.current_value, 1.0);
        // strong regression surfaces as a HIGH-priority insight
        assert!(analysis
            .insights
            .iter()
            .any(|i| i.category == "regression" && i.priority == "HIGH"));
    }

    #[test]
    fn test_statistics_on_improving_series() {
        let tmp = tempfile::tempdir().unwrap();
        let mut db = open_db(tmp.path());
        let base = Utc::now().timestamp() - 10 * 3600;
        for (i, count) in (1..=10).rev().enumerate() {
            let rules: Vec<(String, Severity)> = (0..count)
                .map(|n| (format!("r{n}"), Severity::High))
                .collect();
            let rules_ref: Vec<(&str, Severity)> =
                rules.iter().map(|(r, s)| (r.as_str(), *s)).collect();
            seed_scan(
                &mut db,
                tmp.path(),
                &format!("s{i}"),
                &rules_ref,
                base + i as i64 * 3600,
            );
        }

        let analysis = analyze_trends(&db, "main", 30).unwrap().unwrap();
        assert_eq!(analysis.improvement_metrics.trend, "improving");
        assert_eq!(analysis.improvement_metrics.net_change, -9);
        let total_stat = &analysis.statistics["total"];
        assert!(total_stat.significant);
        assert_eq!(total_stat.trend.as_str(), "decreasing");
        assert_eq!(analysis.security_score.trend, "improving");
        // r0 persists across all ten scans
        assert!(analysis
            .insights
            .iter()
            .any(|i| i.category == "recurring_rule"));
    }

    #[test]
    fn test_percent_change() {
        let tmp = tempfile::tempdir().unwrap();
        let mut db = open_db(tmp.path());
        let base = Utc::now().timestamp() - 7200;
        seed_scan(
            &mut db,
            tmp.path(),
            "a",
            &[("a", Severity::Low), ("b", Severity::Low), ("c", Severity::Low), ("d", Severity::Low)],
            base,
        );
        seed_scan(&mut db, tmp.path(), "b", &[("a", Severity::Low)], base + 3600);

        let analysis = analyze_trends(&db, "main", 30).unwrap().unwrap();
        assert_eq!(analysis.improvement_metrics.net_change, -3);
        assert!((analysis.improvement_metrics.percent_change + 75.0).abs() < 1e-9);
        assert_eq!(analysis.improvement_metrics.by_severity["LOW"], -3);
    }
}
