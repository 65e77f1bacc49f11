//! Adapter for tfsec JSON reports (`{"results": [...]}` envelope).

use serde::{Deserialize, Serialize};

use jmo_core::{CommonFinding, Severity};

use super::{decode, raw_of};

#[derive(Debug, Serialize, Deserialize, Default)]
struct Report {
    // tfsec emits `"results": null` for clean scans
    #[serde(default)]
    results: Option<Vec<Issue>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Issue {
    #[serde(default)]
    rule_id: String,
    #[serde(default)]
    long_id: Option<String>,
    #[serde(default)]
    description: String,
    #[serde(default)]
    severity: String,
    #[serde(default)]
    resolution: Option<String>,
    #[serde(default)]
    links: Vec<String>,
    #[serde(default)]
    location: IssueLocation,
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct IssueLocation {
    #[serde(default)]
    filename: String,
    #[serde(default)]
    start_line: Option<i64>,
    #[serde(default)]
    end_line: Option<i64>,
}

pub(crate) fn parse(target: &str, bytes: &[u8]) -> Vec<CommonFinding> {
    let Some(report) = decode::<Report>("tfsec", target, bytes) else {
        return Vec::new();
    };

    report
        .results
        .unwrap_or_default()
        .into_iter()
        .map(|issue| {
            let severity = Severity::normalize(&issue.severity);
            let mut finding = CommonFinding::new(
                "tfsec",
                &issue.rule_id,
                &issue.location.filename,
                issue.location.start_line,
                severity,
                &issue.description,
            );
            finding.location.end_line = issue.location.end_line;
            finding.title = issue.long_id.clone();
            finding.remediation = issue.resolution.clone();
            if !issue.links.is_empty() {
                finding.references = Some(issue.links.clone());
            }
            finding.raw = raw_of(&issue);
            finding
        })
        .collect()
}
