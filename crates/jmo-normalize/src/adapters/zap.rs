//! Adapter for ZAP baseline JSON reports (`{"site": [...]}` envelope).

use serde::{Deserialize, Serialize};

use jmo_core::{CommonFinding, Compliance, Severity};

use super::{decode, raw_of};

#[derive(Debug, Serialize, Deserialize, Default)]
struct Report {
    #[serde(default)]
    site: Vec<Site>,
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct Site {
    #[serde(rename = "@name", default)]
    name: String,
    #[serde(default)]
    alerts: Vec<Alert>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Alert {
    #[serde(default)]
    pluginid: String,
    #[serde(default)]
    alert: String,
    #[serde(default)]
    riskcode: String,
    #[serde(default)]
    desc: Option<String>,
    #[serde(default)]
    solution: Option<String>,
    #[serde(default)]
    reference: Option<String>,
    #[serde(default)]
    cweid: Option<String>,
    #[serde(default)]
    instances: Vec<Instance>,
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct Instance {
    #[serde(default)]
    uri: String,
}

/// ZAP risk codes: 3 high, 2 medium, 1 low, 0 informational.
fn map_riskcode(code: &str) -> Severity {
    match code.trim() {
        "3" => Severity::High,
        "2" => Severity::Medium,
        "1" => Severity::Low,
        _ => Severity::Info,
    }
}

/// Strip the `<p>…</p>` markup ZAP wraps its text in.
fn strip_markup(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_tag = false;
    for c in text.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            c if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub(crate) fn parse(target: &str, bytes: &[u8]) -> Vec<CommonFinding> {
    let Some(report) = decode::<Report>("zap", target, bytes) else {
        return Vec::new();
    };

    let mut findings = Vec::new();
    for site in report.site {
        for alert in site.alerts {
            let severity = map_riskcode(&alert.riskcode);
            let path = alert
                .instances
                .first()
                .map(|i| i.uri.clone())
                .unwrap_or_else(|| site.name.clone());
            let message = alert
                .desc
                .as_deref()
                .map(strip_markup)
                .filter(|d| !d.is_empty())
                .unwrap_or_else(|| alert.alert.clone());
            let mut finding =
                CommonFinding::new("zap", &alert.pluginid, &path, None, severity, &message);
            finding.title = Some(alert.alert.clone());
            finding.remediation = alert.solution.as_deref().map(strip_markup);
            finding.references = alert
                .reference
                .as_deref()
                .map(strip_markup)
                .map(|refs| refs.split(' ').map(str::to_string).collect());
            if let Some(cwe) = alert.cweid.as_deref().filter(|c| !c.is_empty() && *c != "-1") {
                finding.compliance = Some(Compliance {
                    cwe_top25_2024: Some(vec![format!("CWE-{cwe}")]),
                    ..Default::default()
                });
            }
            finding.raw = raw_of(&alert);
            findings.push(finding);
        }
    }
    findings
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_alert() {
        let body = r#"{
            "@version": "2.14.0",
            "site": [{
                "@name": "https://example.com",
                "alerts": [{
                    "pluginid": "10038",
                    "alert": "Content Security Policy Header Not Set",
                    "riskcode": "2",
                    "desc": "<p>CSP is an added layer of security.</p>",
                    "solution": "<p>Set the Content-Security-Policy header.</p>",
                    "cweid": "693",
                    "instances": [{"uri": "https://example.com/login", "method": "GET"}]
                }]
            }]
        }"#;
        let findings = parse("site", body.as_bytes());
        assert_eq!(findings.len(), 1);
        let f = &findings[0];
        assert_eq!(f.severity, Severity::Medium);
        assert_eq!(f.location.path, "https://example.com/login");
        assert_eq!(f.message, "CSP is an added layer of security.");
        assert_eq!(
            f.remediation.as_deref(),
            Some("Set the Content-Security-Policy header.")
        );
        assert_eq!(
            f.compliance.as_ref().unwrap().cwe_top25_2024.as_ref().unwrap()[0],
            "CWE-693"
        );
    }

    #[test]
    fn test_riskcode_mapping() {
        assert_eq!(map_riskcode("3"), Severity::High);
        assert_eq!(map_riskcode("2"), Severity::Medium);
        assert_eq!(map_riskcode("1"), Severity::Low);
        assert_eq!(map_riskcode("0"), Severity::Info);
        assert_eq!(map_riskcode("weird"), Severity::Info);
    }

    #[test]
    fn test_missing_instances_fall_back_to_site() {
        let body = r#"{"site": [{"@name": "https://example.com",
            "alerts": [{"pluginid": "1", "alert": "a", "riskcode": "1"}]}]}"#;
        let findings = parse("site", body.as_bytes());
        assert_eq!(findings[0].location.path, "https://example.com");
    }

    #[test]
    fn test_stub_envelope() {
        assert!(parse("site", br#"{"site": []}"#).is_empty());
    }
}
