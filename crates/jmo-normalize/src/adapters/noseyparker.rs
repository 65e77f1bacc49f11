//! Adapter for the two-phase secret scanner's JSON report.
//!
//! The report is an array of rule groups, each carrying its matches. The
//! `{"matches": [...]}` envelope written by stub artifacts is also accepted.

use serde::{Deserialize, Serialize};

use jmo_core::{CommonFinding, Severity};

use super::{decode, raw_of};

#[derive(Debug, Serialize, Deserialize)]
struct RuleGroup {
    #[serde(default)]
    rule_name: String,
    #[serde(default)]
    matches: Vec<Match>,
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct Envelope {
    #[serde(default)]
    matches: Vec<Match>,
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct Match {
    #[serde(default)]
    rule_name: Option<String>,
    #[serde(default)]
    provenance: Vec<Provenance>,
    #[serde(default)]
    location: Option<MatchLocation>,
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct Provenance {
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    repo_path: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct MatchLocation {
    #[serde(default)]
    source_span: Option<SourceSpan>,
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct SourceSpan {
    #[serde(default)]
    start: Option<SpanPoint>,
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct SpanPoint {
    #[serde(default)]
    line: Option<i64>,
}

impl Match {
    fn path(&self) -> String {
        self.provenance
            .iter()
            .find_map(|p| p.path.clone().or_else(|| p.repo_path.clone()))
            .unwrap_or_default()
    }

    fn start_line(&self) -> Option<i64> {
        self.location
            .as_ref()?
            .source_span
            .as_ref()?
            .start
            .as_ref()?
            .line
    }
}

fn normalize(rule_name: &str, matched: Match) -> CommonFinding {
    let path = matched.path();
    let start_line = matched.start_line();
    let message = format!("Secret matching rule '{rule_name}' detected");
    let mut finding = CommonFinding::new(
        "noseyparker",
        rule_name,
        &path,
        start_line,
        Severity::High,
        &message,
    );
    finding.title = Some(message.clone());
    finding.tags = Some(vec!["secret".to_string()]);
    finding.raw = raw_of(&matched);
    finding
}

pub(crate) fn parse(target: &str, bytes: &[u8]) -> Vec<CommonFinding> {
    // Report form: array of rule groups.
    if let Ok(groups) = serde_json::from_slice::<Vec<RuleGroup>>(bytes) {
        return groups
            .into_iter()
            .flat_map(|group| {
                let rule = group.rule_name;
                group
                    .matches
                    .into_iter()
                    .map(move |m| normalize(&rule, m))
            })
            .collect();
    }

    // Stub/envelope form.
    let Some(envelope) = decode::<Envelope>("noseyparker", target, bytes) else {
        return Vec::new();
    };
    envelope
        .matches
        .into_iter()
        .map(|m| {
            let rule = m.rule_name.clone().unwrap_or_else(|| "unknown".to_string());
            normalize(&rule, m)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rule_group_report() {
        let body = r#"[{
            "rule_name": "AWS API Key",
            "matches": [{
                "provenance": [{"path": "deploy/creds.txt"}],
                "location": {"source_span": {"start": {"line": 3}}}
            }]
        }]"#;
        let findings = parse("app", body.as_bytes());
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].rule_id, "AWS API Key");
        assert_eq!(findings[0].location.path, "deploy/creds.txt");
        assert_eq!(findings[0].location.start_line, Some(3));
        assert_eq!(findings[0].severity, Severity::High);
    }

    #[test]
    fn test_parse_envelope_form() {
        let body = r#"{"matches": [{"rule_name": "Generic Secret",
            "provenance": [{"repo_path": "/repo"}]}]}"#;
        let findings = parse("app", body.as_bytes());
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].rule_id, "Generic Secret");
    }

    #[test]
    fn test_stub_envelope_is_empty() {
        assert!(parse("app", br#"{"matches": []}"#).is_empty());
    }
}
