//! Pure export transforms of the analysis structure.
//!
//! CSV for spreadsheets/BI, Prometheus text exposition, a Grafana
//! dashboard definition, and the compact dashboard JSON consumed by
//! lightweight frontends.

use serde_json::{json, Value};

use crate::analyzer::TrendAnalysis;
use crate::error::Result;
use crate::score::posture_score;

/// Remediation rate over the window: `|net_change| / max(1, scan_count − 1)`.
fn remediation_rate(analysis: &TrendAnalysis) -> f64 {
    let intervals = analysis.metadata.scan_count.saturating_sub(1).max(1);
    analysis.improvement_metrics.net_change.unsigned_abs() as f64 / intervals as f64
}

/// Per-interval resolution/introduction rates.
fn flow_rates(analysis: &TrendAnalysis) -> (f64, f64) {
    let intervals = analysis.metadata.scan_count.saturating_sub(1).max(1) as f64;
    (
        analysis.improvement_metrics.resolved as f64 / intervals,
        analysis.improvement_metrics.introduced as f64 / intervals,
    )
}

/// CSV: one row per scan with severity columns, per-scan score, and the
/// trend/remediation-rate columns filled on the latest row only.
pub fn export_csv(analysis: &TrendAnalysis) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record([
        "Timestamp",
        "Scan ID",
        "CRITICAL",
        "HIGH",
        "MEDIUM",
        "LOW",
        "INFO",
        "Total",
        "Security Score",
        "Score Trend",
        "Remediation Rate",
    ])?;

    let trends = &analysis.severity_trends;
    let get = |name: &str, i: usize| -> i64 {
        trends
            .by_severity
            .get(name)
            .and_then(|series| series.get(i))
            .copied()
            .unwrap_or(0)
    };
    let rows = trends.timestamps.len();
    for i in 0..rows {
        let (critical, high, medium, low, info) = (
            get("CRITICAL", i),
            get("HIGH", i),
            get("MEDIUM", i),
            get("LOW", i),
            get("INFO", i),
        );
        let total = critical + high + medium + low + info;
        let score = posture_score(critical, high, medium, low);
        let is_latest = i == rows - 1;

        writer.write_record([
            trends.timestamps[i].to_string(),
            analysis
                .metadata
                .scan_ids
                .get(i)
                .cloned()
                .unwrap_or_default(),
            critical.to_string(),
            high.to_string(),
            medium.to_string(),
            low.to_string(),
            info.to_string(),
            total.to_string(),
            format!("{score:.1}"),
            if is_latest {
                analysis.security_score.trend.clone()
            } else {
                String::new()
            },
            if is_latest {
                format!("{:.2}", remediation_rate(analysis))
            } else {
                String::new()
            },
        ])?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Prometheus text exposition: gauges for the latest severity counts,
/// posture score, flow rates and scan count, plus per-rule gauges.
pub fn export_prometheus(analysis: &TrendAnalysis) -> String {
    let latest = |name: &str| -> i64 {
        analysis
            .severity_trends
            .by_severity
            .get(name)
            .and_then(|series| series.last())
            .copied()
            .unwrap_or(0)
    };
    let (remediation, introduction) = flow_rates(analysis);

    let mut out = format!(
        "# HELP jmo_security_findings Security findings by severity\n\
         # TYPE jmo_security_findings gauge\n\
         jmo_security_findings{{severity=\"critical\"}} {}\n\
         jmo_security_findings{{severity=\"high\"}} {}\n\
         jmo_security_findings{{severity=\"medium\"}} {}\n\
         jmo_security_findings{{severity=\"low\"}} {}\n\
         jmo_security_findings{{severity=\"info\"}} {}\n\
         \n\
         # HELP jmo_security_score Security posture score (0-10)\n\
         # TYPE jmo_security_score gauge\n\
         jmo_security_score {}\n\
         \n\
         # HELP jmo_remediation_rate Findings resolved per scan interval\n\
         # TYPE jmo_remediation_rate gauge\n\
         jmo_remediation_rate {:.2}\n\
         \n\
         # HELP jmo_introduction_rate Findings introduced per scan interval\n\
         # TYPE jmo_introduction_rate gauge\n\
         jmo_introduction_rate {:.2}\n\
         \n\
         # HELP jmo_net_remediation Net change in findings over the window\n\
         # TYPE jmo_net_remediation gauge\n\
         jmo_net_remediation {}\n\
         \n\
         # HELP jmo_scan_count Scans analyzed\n\
         # TYPE jmo_scan_count gauge\n\
         jmo_scan_count {}\n",
        latest("CRITICAL"),
        latest("HIGH"),
        latest("MEDIUM"),
        latest("LOW"),
        latest("INFO"),
        analysis.security_score.current_score,
        remediation,
        introduction,
        analysis.improvement_metrics.net_change,
        analysis.metadata.scan_count,
    );

    if !analysis.top_rules.is_empty() {
        out.push_str("\n# HELP jmo_rule_findings Findings per rule\n");
        out.push_str("# TYPE jmo_rule_findings gauge\n");
        for rule in analysis.top_rules.iter().take(10) {
            let safe_rule: String = rule
                .rule_id
                .chars()
                .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
                .collect();
            out.push_str(&format!(
                "jmo_rule_findings{{rule=\"{safe_rule}\"}} {}\n",
                rule.count
            ));
        }
    }
    out
}

/// Grafana dashboard JSON with the fixed panel layout: score gauge,
/// severity timeline, remediation/net stats, rule bar gauge.
pub fn export_grafana(_analysis: &TrendAnalysis) -> Value {
    json!({
        "dashboard": {
            "title": "JMo Security Trends",
            "uid": "jmo-security-trends",
            "tags": ["security", "jmo"],
            "timezone": "utc",
            "schemaVersion": 38,
            "version": 1,
            "panels": [
                {
                    "id": 1,
                    "title": "Security Score",
                    "type": "gauge",
                    "gridPos": {"h": 8, "w": 12, "x": 0, "y": 0},
                    "targets": [{"expr": "jmo_security_score", "refId": "A"}],
                    "options": {"showThresholdLabels": false, "showThresholdMarkers": true},
                    "fieldConfig": {
                        "defaults": {
                            "min": 0,
                            "max": 10,
                            "thresholds": {
                                "mode": "absolute",
                                "steps": [
                                    {"value": 0, "color": "red"},
                                    {"value": 3, "color": "orange"},
                                    {"value": 5, "color": "yellow"},
                                    {"value": 7, "color": "green"},
                                    {"value": 9, "color": "dark-green"}
                                ]
                            }
                        }
                    }
                },
                {
                    "id": 2,
                    "title": "Severity Timeline",
                    "type": "timeseries",
                    "gridPos": {"h": 8, "w": 12, "x": 12, "y": 0},
                    "targets": [
                        {"expr": "jmo_security_findings{severity=\"critical\"}", "refId": "A", "legendFormat": "CRITICAL"},
                        {"expr": "jmo_security_findings{severity=\"high\"}", "refId": "B", "legendFormat": "HIGH"},
                        {"expr": "jmo_security_findings{severity=\"medium\"}", "refId": "C", "legendFormat": "MEDIUM"}
                    ],
                    "fieldConfig": {
                        "defaults": {"custom": {"lineInterpolation": "smooth", "fillOpacity": 10}},
                        "overrides": [
                            {
                                "matcher": {"id": "byName", "options": "CRITICAL"},
                                "properties": [{"id": "color", "value": {"mode": "fixed", "fixedColor": "red"}}]
                            },
                            {
                                "matcher": {"id": "byName", "options": "HIGH"},
                                "properties": [{"id": "color", "value": {"mode": "fixed", "fixedColor": "orange"}}]
                            }
                        ]
                    }
                },
                {
                    "id": 3,
                    "title": "Remediation Rate",
                    "type": "stat",
                    "gridPos": {"h": 4, "w": 6, "x": 0, "y": 8},
                    "targets": [{"expr": "jmo_remediation_rate", "refId": "A"}],
                    "options": {"textMode": "value_and_name", "colorMode": "background"},
                    "fieldConfig": {
                        "defaults": {
                            "unit": "findings/day",
                            "decimals": 2,
                            "thresholds": {
                                "mode": "absolute",
                                "steps": [
                                    {"value": 0, "color": "red"},
                                    {"value": 1, "color": "yellow"},
                                    {"value": 5, "color": "green"}
                                ]
                            }
                        }
                    }
                },
                {
                    "id": 4,
                    "title": "Net Remediation",
                    "type": "stat",
                    "gridPos": {"h": 4, "w": 6, "x": 6, "y": 8},
                    "targets": [{"expr": "jmo_net_remediation", "refId": "A"}],
                    "options": {"textMode": "value_and_name", "colorMode": "background"},
                    "fieldConfig": {
                        "defaults": {
                            "unit": "findings",
                            "thresholds": {
                                "mode": "absolute",
                                "steps": [
                                    {"value": -20, "color": "red"},
                                    {"value": 0, "color": "yellow"},
                                    {"value": 20, "color": "green"}
                                ]
                            }
                        }
                    }
                },
                {
                    "id": 5,
                    "title": "Rule Effectiveness",
                    "type": "bargauge",
                    "gridPos": {"h": 8, "w": 12, "x": 12, "y": 8},
                    "targets": [{"expr": "jmo_rule_findings", "refId": "A", "legendFormat": "{{rule}}"}],
                    "options": {"orientation": "horizontal", "displayMode": "gradient"}
                }
            ]
        },
        "overwrite": true
    })
}

/// Compact dashboard JSON for lightweight frontends.
pub fn export_dashboard(analysis: &TrendAnalysis) -> Value {
    json!({
        "version": "1.0.0",
        "generated_at": analysis.metadata.analysis_timestamp,
        "security_score": analysis.security_score.current_score,
        "score_trend": analysis.security_score.trend,
        "score_grade": analysis.security_score.grade,
        "metadata": {
            "branch": analysis.metadata.branch,
            "scan_count": analysis.metadata.scan_count,
            "date_range": {
                "start": analysis.metadata.date_range.start,
                "end": analysis.metadata.date_range.end,
            },
        },
        "severity_trends": {
            "by_severity": analysis.severity_trends.by_severity,
            "total": analysis.severity_trends.total,
            "timestamps": analysis.severity_trends.timestamps,
        },
        "insights": analysis.insights,
        "regressions": analysis.regressions,
        "improvement_metrics": {
            "net_change": analysis.improvement_metrics.net_change,
            "resolved": analysis.improvement_metrics.resolved,
            "introduced": analysis.improvement_metrics.introduced,
            "percent_change": analysis.improvement_metrics.percent_change,
            "by_severity": analysis.improvement_metrics.by_severity,
        },
        "top_rules": analysis.top_rules.iter().take(10).collect::<Vec<_>>(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::{AnalysisMetadata, DateRange, SeverityTrends, TrendAnalysis};
    use crate::insights::Insight;
    use crate::score::ScoreBlock;
    use std::collections::BTreeMap;

    fn sample_analysis() -> TrendAnalysis {
        let mut by_severity = BTreeMap::new();
        by_severity.insert("CRITICAL".to_string(), vec![1, 0]);
        by_severity.insert("HIGH".to_string(), vec![3, 2]);
        by_severity.insert("MEDIUM".to_string(), vec![0, 0]);
        by_severity.insert("LOW".to_string(), vec![0, 0]);
        by_severity.insert("INFO".to_string(), vec![0, 0]);

        TrendAnalysis {
            metadata: AnalysisMetadata {
                branch: "main".to_string(),
                scan_count: 2,
                date_range: DateRange {
                    start: "2026-07-01T00:00:00Z".to_string(),
                    end: "2026-07-02T00:00:00Z".to_string(),
                },
                scan_ids: vec!["scan-a".to_string(), "scan-b".to_string()],
                analysis_timestamp: "2026-07-02T01:00:00Z".to_string(),
            },
            severity_trends: SeverityTrends {
                by_severity,
                total: vec![4, 2],
                timestamps: vec![100, 200],
            },
            security_score: ScoreBlock {
                current_score: 8.0,
                grade: "B".to_string(),
                trend: "improving".to_string(),
                series: vec![4.0, 8.0],
            },
            improvement_metrics: crate::analyzer::ImprovementBlock {
                net_change: -2,
                resolved: 2,
                introduced: 0,
                percent_change: -50.0,
                by_severity: BTreeMap::new(),
                trend: "stable".to_string(),
            },
            regressions: Vec::new(),
            insights: vec![Insight {
                category: "data".to_string(),
                severity: "INFO".to_string(),
                priority: "INFO".to_string(),
                icon: "ℹ️".to_string(),
                message: "m".to_string(),
                details: "d".to_string(),
                recommended_action: "a".to_string(),
            }],
            top_rules: vec![jmo_history::TopRule {
                rule_id: "CVE-2024-1".to_string(),
                severity: "HIGH".to_string(),
                count: 3,
            }],
            statistics: BTreeMap::new(),
        }
    }

    #[test]
    fn test_csv_one_row_per_scan() {
        let csv_text = export_csv(&sample_analysis()).unwrap();
        let lines: Vec<&str> = csv_text.trim().lines().collect();
        assert_eq!(lines.len(), 3); // header + two scans
        assert!(lines[0].starts_with("Timestamp,Scan ID,CRITICAL"));
        // latest row carries the trend and remediation rate
        assert!(lines[2].contains("improving"));
        assert!(lines[2].contains("2.00"));
        assert!(!lines[1].contains("improving"));
    }

    #[test]
    fn test_csv_per_scan_score() {
        let csv_text = export_csv(&sample_analysis()).unwrap();
        // first scan: 1 critical + 3 high → 10 - 3 - 3 = 4.0
        assert!(csv_text.contains("4.0"));
    }

    #[test]
    fn test_prometheus_gauges() {
        let text = export_prometheus(&sample_analysis());
        assert!(text.contains("jmo_security_findings{severity=\"critical\"} 0"));
        assert!(text.contains("jmo_security_findings{severity=\"high\"} 2"));
        assert!(text.contains("jmo_security_score 8"));
        assert!(text.contains("jmo_net_remediation -2"));
        assert!(text.contains("jmo_scan_count 2"));
        assert!(text.contains("jmo_rule_findings{rule=\"CVE_2024_1\"} 3"));
    }

    #[test]
    fn test_grafana_panel_layout() {
        let dashboard = export_grafana(&sample_analysis());
        let panels = dashboard["dashboard"]["panels"].as_array().unwrap();
        assert_eq!(panels.len(), 5);
        assert_eq!(panels[0]["type"], "gauge");
        assert_eq!(panels[1]["type"], "timeseries");
        assert_eq!(dashboard["dashboard"]["uid"], "jmo-security-trends");
    }

    #[test]
    fn test_dashboard_compact_shape() {
        let value = export_dashboard(&sample_analysis());
        assert_eq!(value["version"], "1.0.0");
        assert_eq!(value["security_score"], 8.0);
        assert_eq!(value["score_grade"], "B");
        assert_eq!(value["metadata"]["branch"], "main");
        assert_eq!(value["metadata"]["scan_count"], 2);
        assert_eq!(value["severity_trends"]["total"][1], 2);
        assert_eq!(value["improvement_metrics"]["net_change"], -2);
        assert_eq!(value["insights"].as_array().unwrap().len(), 1);
        assert_eq!(value["top_rules"][0]["rule_id"], "CVE-2024-1");
    }
}
