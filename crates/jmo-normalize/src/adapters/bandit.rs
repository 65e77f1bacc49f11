//! Adapter for bandit JSON reports (`{"results": [...]}` envelope).

use serde::{Deserialize, Serialize};

use jmo_core::{CommonFinding, Compliance, Risk, RiskLevel, Severity};

use super::{decode, raw_of};

#[derive(Debug, Serialize, Deserialize, Default)]
struct Report {
    #[serde(default)]
    results: Vec<Issue>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Issue {
    #[serde(default)]
    test_id: String,
    #[serde(default)]
    test_name: String,
    #[serde(default)]
    issue_text: String,
    #[serde(default)]
    filename: String,
    #[serde(default)]
    line_number: Option<i64>,
    #[serde(default)]
    issue_severity: String,
    #[serde(default)]
    issue_confidence: String,
    #[serde(default)]
    issue_cwe: Option<CweRef>,
    #[serde(default)]
    more_info: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct CweRef {
    #[serde(default)]
    id: Option<u32>,
    #[serde(default)]
    link: Option<String>,
}

fn risk_level(raw: &str) -> Option<RiskLevel> {
    match raw.to_ascii_uppercase().as_str() {
        "HIGH" => Some(RiskLevel::High),
        "MEDIUM" => Some(RiskLevel::Medium),
        "LOW" => Some(RiskLevel::Low),
        _ => None,
    }
}

pub(crate) fn parse(target: &str, bytes: &[u8]) -> Vec<CommonFinding> {
    let Some(report) = decode::<Report>("bandit", target, bytes) else {
        return Vec::new();
    };

    report
        .results
        .into_iter()
        .map(|issue| {
            let severity = Severity::normalize(&issue.issue_severity);
            let mut finding = CommonFinding::new(
                "bandit",
                &issue.test_id,
                &issue.filename,
                issue.line_number,
                severity,
                &issue.issue_text,
            );
            finding.title = Some(issue.test_name.clone());
            finding.references = issue.more_info.clone().map(|u| vec![u]);
            finding.risk = Some(Risk {
                confidence: risk_level(&issue.issue_confidence),
                likelihood: None,
                impact: None,
            });
            if let Some(cwe) = issue.issue_cwe.as_ref().and_then(|c| c.id) {
                finding.compliance = Some(Compliance {
                    cwe_top25_2024: Some(vec![format!("CWE-{cwe}")]),
                    ..Default::default()
                });
            }
            finding.raw = raw_of(&issue);
            finding
        })
        .collect()
}
