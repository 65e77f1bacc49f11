//! Mann-Kendall nonparametric test for monotonic trend.
//!
//! Statistic `S = Σ_{i<j} sign(x_j − x_i)` over all pairs; variance
//! `n(n−1)(2n+5)/18` with tie correction `Σ t(t−1)(2t+5)/18` per tie
//! group; `Z = (S − sign(S)) / sqrt(Var)`; two-sided p-value from the
//! standard normal CDF; significance at p < 0.05.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Significance threshold for the two-sided test.
pub const SIGNIFICANCE_LEVEL: f64 = 0.05;

/// Direction of a validated monotonic trend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TrendDirection {
    Increasing,
    Decreasing,
    NoTrend,
}

impl TrendDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrendDirection::Increasing => "increasing",
            TrendDirection::Decreasing => "decreasing",
            TrendDirection::NoTrend => "no-trend",
        }
    }
}

/// Test result.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MannKendall {
    pub trend: TrendDirection,
    pub s: i64,
    pub z: f64,
    pub p_value: f64,
    pub significant: bool,
}

impl MannKendall {
    fn no_trend(s: i64) -> Self {
        MannKendall {
            trend: TrendDirection::NoTrend,
            s,
            z: 0.0,
            p_value: 1.0,
            significant: false,
        }
    }
}

/// Run the test over a series.
pub fn mann_kendall(values: &[f64]) -> MannKendall {
    let n = values.len();
    if n < 3 {
        return MannKendall::no_trend(0);
    }

    let mut s: i64 = 0;
    for i in 0..n {
        for j in (i + 1)..n {
            let diff = values[j] - values[i];
            if diff > 0.0 {
                s += 1;
            } else if diff < 0.0 {
                s -= 1;
            }
        }
    }

    // Tie correction over groups of equal values.
    let mut tie_groups: HashMap<u64, u64> = HashMap::new();
    for value in values {
        *tie_groups.entry(value.to_bits()).or_insert(0) += 1;
    }
    let nf = n as f64;
    let mut variance = nf * (nf - 1.0) * (2.0 * nf + 5.0) / 18.0;
    for &count in tie_groups.values() {
        if count > 1 {
            let t = count as f64;
            variance -= t * (t - 1.0) * (2.0 * t + 5.0) / 18.0;
        }
    }

    if s == 0 || variance <= 0.0 {
        return MannKendall::no_trend(s);
    }

    let z = (s as f64 - s.signum() as f64) / variance.sqrt();
    let p_value = 2.0 * (1.0 - normal_cdf(z.abs()));
    let significant = p_value < SIGNIFICANCE_LEVEL;

    let trend = if significant {
        if s > 0 {
            TrendDirection::Increasing
        } else {
            TrendDirection::Decreasing
        }
    } else {
        TrendDirection::NoTrend
    };

    MannKendall {
        trend,
        s,
        z,
        p_value,
        significant,
    }
}

/// Standard normal CDF via the Abramowitz-Stegun erf approximation
/// (max absolute error ≈ 1.5e-7).
fn normal_cdf(x: f64) -> f64 {
    0.5 * (1.0 + erf(x / std::f64::consts::SQRT_2))
}

fn erf(x: f64) -> f64 {
    const A1: f64 = 0.254829592;
    const A2: f64 = -0.284496736;
    const A3: f64 = 1.421413741;
    const A4: f64 = -1.453152027;
    const A5: f64 = 1.061405429;
    const P: f64 = 0.3275911;

    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();
    let t = 1.0 / (1.0 + P * x);
    let y = 1.0 - (((((A5 * t + A4) * t) + A3) * t + A2) * t + A1) * t * (-x * x).exp();
    sign * y
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_series_is_no_trend() {
        let result = mann_kendall(&[1.0, 2.0]);
        assert_eq!(result.trend, TrendDirection::NoTrend);
        assert_eq!(result.s, 0);
        assert_eq!(result.z, 0.0);
    }

    #[test]
    fn test_strictly_increasing() {
        let values: Vec<f64> = (1..=10).map(|v| v as f64).collect();
        let result = mann_kendall(&values);
        // all 45 pairs increase
        assert_eq!(result.s, 45);
        assert!(result.z > 0.0);
        assert!(result.significant);
        assert_eq!(result.trend, TrendDirection::Increasing);
    }

    #[test]
    fn test_strictly_decreasing() {
        let values: Vec<f64> = (1..=10).rev().map(|v| v as f64).collect();
        let result = mann_kendall(&values);
        assert_eq!(result.s, -45);
        assert!(result.z < 0.0);
        assert!(result.significant);
        assert_eq!(result.trend, TrendDirection::Decreasing);
    }

    #[test]
    fn test_constant_series() {
        let result = mann_kendall(&[5.0; 8]);
        assert_eq!(result.s, 0);
        assert_eq!(result.trend, TrendDirection::NoTrend);
        assert!(!result.significant);
    }

    #[test]
    fn test_noise_is_not_significant() {
        let values = [3.0, 1.0, 4.0, 1.0, 5.0, 2.0, 3.0];
        let result = mann_kendall(&values);
        assert!(!result.significant);
        assert_eq!(result.trend, TrendDirection::NoTrend);
    }

    #[test]
    fn test_variance_matches_closed_form_without_ties() {
        // n=10 distinct values: Var(S) = 10*9*25/18 = 125
        let values: Vec<f64> = (1..=10).map(|v| v as f64).collect();
        let result = mann_kendall(&values);
        // Z = (45 - 1) / sqrt(125)
        let expected_z = 44.0 / 125.0_f64.sqrt();
        assert!((result.z - expected_z).abs() < 1e-9);
    }

    #[test]
    fn test_tie_correction_reduces_variance() {
        // same S direction, but heavy ties shrink the variance
        let tied = [1.0, 1.0, 1.0, 1.0, 2.0, 2.0, 2.0, 3.0];
        let result = mann_kendall(&tied);
        assert!(result.s > 0);
        // hand-computed: n=8 → base 8*7*21/18 = 65.333;
        // ties 4,3 → 4*3*13/18 + 3*2*11/18 = 8.667 + 3.667 = 12.333
        let expected_var: f64 = 65.333333333 - 12.333333333;
        let expected_z = (result.s as f64 - 1.0) / expected_var.sqrt();
        assert!((result.z - expected_z).abs() < 1e-6);
    }

    #[test]
    fn test_normal_cdf_reference_points() {
        assert!((normal_cdf(0.0) - 0.5).abs() < 1e-7);
        assert!((normal_cdf(1.96) - 0.975).abs() < 1e-3);
        assert!((normal_cdf(-1.96) - 0.025).abs() < 1e-3);
    }
}
