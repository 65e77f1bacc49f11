//! Adapter for checkov JSON reports.
//!
//! Checkov emits `{"results": {"failed_checks": [...]}}` for a single
//! framework and an array of such objects when multiple frameworks ran.

use serde::{Deserialize, Serialize};

use jmo_core::{CommonFinding, Severity};

use super::{decode, raw_of};

#[derive(Debug, Serialize, Deserialize, Default)]
struct Report {
    #[serde(default)]
    check_type: Option<String>,
    #[serde(default)]
    results: ResultsBlock,
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct ResultsBlock {
    #[serde(default)]
    failed_checks: Vec<FailedCheck>,
}

#[derive(Debug, Serialize, Deserialize)]
struct FailedCheck {
    #[serde(default)]
    check_id: String,
    #[serde(default)]
    check_name: String,
    #[serde(default)]
    file_path: String,
    #[serde(default)]
    file_line_range: Vec<i64>,
    #[serde(default)]
    severity: Option<String>,
    #[serde(default)]
    guideline: Option<String>,
    #[serde(default)]
    resource: Option<String>,
}

pub(crate) fn parse(target: &str, bytes: &[u8]) -> Vec<CommonFinding> {
    // Multi-framework runs produce an array of reports.
    let reports: Vec<Report> =
        if let Ok(reports) = serde_json::from_slice::<Vec<Report>>(bytes) {
            reports
        } else {
            match decode::<Report>("checkov", target, bytes) {
                Some(report) => vec![report],
                None => return Vec::new(),
            }
        };

    reports
        .into_iter()
        .flat_map(|report| report.results.failed_checks)
        .map(|check| {
            // Checkov frequently omits severity; default policy violations
            // to MEDIUM rather than INFO.
            let severity = check
                .severity
                .as_deref()
                .map(Severity::normalize)
                .unwrap_or(Severity::Medium);
            let start_line = check.file_line_range.first().copied();
            let mut finding = CommonFinding::new(
                "checkov",
                &check.check_id,
                &check.file_path,
                start_line,
                severity,
                &check.check_name,
            );
            finding.location.end_line = check.file_line_range.get(1).copied();
            finding.title = Some(check.check_name.clone());
            finding.references = check.guideline.clone().map(|g| vec![g]);
            finding.raw = raw_of(&check);
            finding
        })
        .collect()
}
