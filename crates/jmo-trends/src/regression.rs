//! Regression detection between consecutive scans.

use serde::{Deserialize, Serialize};

use jmo_history::ScanRow;

use crate::score::posture_score;

/// Score drop beyond this is a regression on its own.
pub const SCORE_DROP_THRESHOLD: f64 = 0.5;

/// One adverse change between two consecutive scans.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Regression {
    pub severity: String,
    pub category: String,
    pub message: String,
    pub previous_value: f64,
    pub current_value: f64,
}

/// Per-severity increase thresholds: CRITICAL any increase, HIGH +3,
/// MEDIUM +10, LOW +25; INFO is ignored.
fn count_threshold(severity: &str) -> Option<i64> {
    match severity {
        "CRITICAL" => Some(0),
        "HIGH" => Some(3),
        "MEDIUM" => Some(10),
        "LOW" => Some(25),
        _ => None,
    }
}

/// Detect regressions over a time-ascending scan series.
pub fn detect_regressions(scans: &[ScanRow]) -> Vec<Regression> {
    let mut regressions = Vec::new();

    for pair in scans.windows(2) {
        let (previous, current) = (&pair[0], &pair[1]);

        for (severity, prev_count, curr_count) in [
            ("CRITICAL", previous.critical_count, current.critical_count),
            ("HIGH", previous.high_count, current.high_count),
            ("MEDIUM", previous.medium_count, current.medium_count),
            ("LOW", previous.low_count, current.low_count),
        ] {
            let Some(threshold) = count_threshold(severity) else {
                continue;
            };
            let increase = curr_count - prev_count;
            if increase > threshold {
                regressions.push(Regression {
                    severity: severity.to_string(),
                    category: "severity_increase".to_string(),
                    message: format!(
                        "{severity} findings rose from {prev_count} to {curr_count}"
                    ),
                    previous_value: prev_count as f64,
                    current_value: curr_count as f64,
                });
            }
        }

        let prev_score = posture_score(
            previous.critical_count,
            previous.high_count,
            previous.medium_count,
            previous.low_count,
        );
        let curr_score = posture_score(
            current.critical_count,
            current.high_count,
            current.medium_count,
            current.low_count,
        );
        if prev_score - curr_score > SCORE_DROP_THRESHOLD {
            regressions.push(Regression {
                severity: "HIGH".to_string(),
                category: "score_drop".to_string(),
                message: format!(
                    "security score dropped from {prev_score:.1} to {curr_score:.1}"
                ),
                previous_value: prev_score,
                current_value: curr_score,
            });
        }
    }
    regressions
}
