//! Adapter for semgrep JSON reports (`{"results": [...]}` envelope).

use serde::{Deserialize, Serialize};

use jmo_core::{CommonFinding, Compliance, Risk, RiskLevel, Severity};

use super::{decode, raw_of};

#[derive(Debug, Serialize, Deserialize, Default)]
struct Report {
    #[serde(default)]
    results: Vec<ResultRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ResultRecord {
    #[serde(default)]
    check_id: String,
    #[serde(default)]
    path: String,
    #[serde(default)]
    start: Option<Position>,
    #[serde(default)]
    end: Option<Position>,
    #[serde(default)]
    extra: Extra,
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct Position {
    #[serde(default)]
    line: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct Extra {
    #[serde(default)]
    message: String,
    #[serde(default)]
    severity: String,
    #[serde(default)]
    fix: Option<String>,
    #[serde(default)]
    metadata: serde_json::Value,
}

/// `ERROR`→HIGH, `WARNING`→MEDIUM, `INFO`→INFO; unknown values degrade to
/// INFO. Stable by construction.
fn map_severity(raw: &str) -> Severity {
    match raw.to_ascii_uppercase().as_str() {
        "ERROR" => Severity::High,
        "WARNING" => Severity::Medium,
        _ => Severity::Info,
    }
}

/// Metadata fields may be a single string or a list of strings.
fn string_list(value: &serde_json::Value) -> Option<Vec<String>> {
    match value {
        serde_json::Value::String(s) => Some(vec![s.clone()]),
        serde_json::Value::Array(items) => {
            let list: Vec<String> = items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect();
            if list.is_empty() {
                None
            } else {
                Some(list)
            }
        }
        _ => None,
    }
}

pub(crate) fn parse(target: &str, bytes: &[u8]) -> Vec<CommonFinding> {
    let Some(report) = decode::<Report>("semgrep", target, bytes) else {
        return Vec::new();
    };

    report
        .results
        .into_iter()
        .map(|record| {
            let start_line = record.start.as_ref().and_then(|p| p.line);
            let severity = map_severity(&record.extra.severity);
            let mut finding = CommonFinding::new(
                "semgrep",
                &record.check_id,
                &record.path,
                start_line,
                severity,
                &record.extra.message,
            );
            finding.location.end_line = record.end.as_ref().and_then(|p| p.line);
            finding.remediation = record.extra.fix.clone();

            let metadata = &record.extra.metadata;
            let owasp = metadata.get("owasp").and_then(string_list);
            let cwe = metadata.get("cwe").and_then(string_list);
            if owasp.is_some() || cwe.is_some() {
                finding.compliance = Some(Compliance {
                    owasp_top10_2021: owasp,
                    cwe_top25_2024: cwe,
                    ..Default::default()
                });
            }
            finding.references = metadata.get("references").and_then(string_list);
            if let Some(confidence) = metadata
                .get("confidence")
                .and_then(|v| v.as_str())
                .and_then(|s| match s.to_ascii_uppercase().as_str() {
                    "HIGH" => Some(RiskLevel::High),
                    "MEDIUM" => Some(RiskLevel::Medium),
                    "LOW" => Some(RiskLevel::Low),
                    _ => None,
                })
            {
                finding.risk = Some(Risk {
                    confidence: Some(confidence),
                    likelihood: None,
                    impact: None,
                });
            }

            finding.raw = raw_of(&record);
            finding
        })
        .collect()
}
