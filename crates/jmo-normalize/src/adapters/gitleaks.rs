//! Adapter for gitleaks JSON reports (top-level array of leaks).

use serde::{Deserialize, Serialize};

use jmo_core::{CommonFinding, Severity};

use super::{decode, raw_of};

#[derive(Debug, Serialize, Deserialize)]
struct Leak {
    #[serde(rename = "RuleID", default)]
    rule_id: String,
    #[serde(rename = "Description", default)]
    description: String,
    #[serde(rename = "File", default)]
    file: String,
    #[serde(rename = "StartLine", default)]
    start_line: Option<i64>,
    #[serde(rename = "EndLine", default)]
    end_line: Option<i64>,
    #[serde(rename = "Match", default)]
    matched: Option<String>,
    #[serde(rename = "Secret", default)]
    secret: Option<String>,
    #[serde(rename = "Commit", default)]
    commit: Option<String>,
    #[serde(flatten)]
    rest: serde_json::Map<String, serde_json::Value>,
}

pub(crate) fn parse(target: &str, bytes: &[u8]) -> Vec<CommonFinding> {
    let Some(leaks) = decode::<Vec<Leak>>("gitleaks", target, bytes) else {
        return Vec::new();
    };

    leaks
        .into_iter()
        .map(|leak| {
            let message = if leak.description.is_empty() {
                format!("Hardcoded secret detected by rule {}", leak.rule_id)
            } else {
                leak.description.clone()
            };
            let mut finding = CommonFinding::new(
                "gitleaks",
                &leak.rule_id,
                &leak.file,
                leak.start_line,
                Severity::High,
                &message,
            );
            finding.location.end_line = leak.end_line;
            finding.title = Some(message.clone());
            finding.tags = Some(vec!["secret".to_string()]);
            finding.raw = raw_of(&leak);
            finding
        })
        .collect()
}
