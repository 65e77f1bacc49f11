//! Security posture score and grade.

use serde::{Deserialize, Serialize};

use crate::mannkendall::{mann_kendall, TrendDirection};

/// Derived posture score in `[0, 10]`:
/// `10 − 3·critical − 1·high − 0.3·medium − 0.1·low`, clamped.
pub fn posture_score(critical: i64, high: i64, medium: i64, low: i64) -> f64 {
    let score = 10.0
        - 3.0 * critical as f64
        - 1.0 * high as f64
        - 0.3 * medium as f64
        - 0.1 * low as f64;
    score.clamp(0.0, 10.0)
}

/// Letter grade: A ≥ 9, B ≥ 7, C ≥ 5, D ≥ 3, else F.
pub fn grade(score: f64) -> char {
    if score >= 9.0 {
        'A'
    } else if score >= 7.0 {
        'B'
    } else if score >= 5.0 {
        'C'
    } else if score >= 3.0 {
        'D'
    } else {
        'F'
    }
}

/// Score block of the analysis structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreBlock {
    pub current_score: f64,
    pub grade: String,
    /// Mann-Kendall direction of the per-scan score series.
    pub trend: String,
    pub series: Vec<f64>,
}

impl ScoreBlock {
    /// Build the block from per-scan severity counts, newest last.
    pub fn from_counts(counts: &[(i64, i64, i64, i64)]) -> Self {
        let series: Vec<f64> = counts
            .iter()
            .map(|&(c, h, m, l)| posture_score(c, h, m, l))
            .collect();
        let current_score = series.last().copied().unwrap_or(10.0);
        let trend = match mann_kendall(&series).trend {
            // for scores, upward movement is the good direction
            TrendDirection::Increasing => "improving",
            TrendDirection::Decreasing => "degrading",
            TrendDirection::NoTrend => "stable",
        };
        ScoreBlock {
            current_score,
            grade: grade(current_score).to_string(),
            trend: trend.to_string(),
            series,
        }
    }
}
