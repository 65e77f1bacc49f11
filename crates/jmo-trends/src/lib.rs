//! Diff & Trend Engine.
//!
//! Reads only from the history store. Builds time series per branch,
//! validates monotonic trends with the Mann-Kendall test, derives a
//! security posture score and grade, detects regressions between
//! consecutive scans, generates narrative insights, and provides pure
//! export transforms (CSV, Prometheus, Grafana, compact dashboard JSON).

pub mod analyzer;
pub mod attribution;
pub mod error;
pub mod export;
pub mod insights;
pub mod mannkendall;
pub mod regression;
pub mod score;

pub use analyzer::{analyze_trends, AnalysisMetadata, SeverityTrends, TrendAnalysis};
pub use attribution::{attribute_findings, DeveloperAttribution};
pub use error::{Result, TrendError};
pub use export::{export_csv, export_dashboard, export_grafana, export_prometheus};
pub use insights::{generate_insights, Insight, InsightContext};
pub use mannkendall::{mann_kendall, MannKendall, TrendDirection};
pub use regression::{detect_regressions, Regression};
pub use score::{grade, posture_score, ScoreBlock};
