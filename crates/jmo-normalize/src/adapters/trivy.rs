//! Adapter for trivy JSON reports (`{"Results": [...]}` envelope).
//!
//! Each result block can carry vulnerabilities, misconfigurations and
//! secrets; all three are normalized.

use serde::{Deserialize, Serialize};

use jmo_core::{CommonFinding, Cvss, Severity};

use super::{decode, raw_of};

#[derive(Debug, Serialize, Deserialize, Default)]
struct Report {
    #[serde(rename = "Results", default)]
    results: Vec<ResultBlock>,
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct ResultBlock {
    #[serde(rename = "Target", default)]
    target: String,
    #[serde(rename = "Vulnerabilities", default)]
    vulnerabilities: Vec<Vulnerability>,
    #[serde(rename = "Misconfigurations", default)]
    misconfigurations: Vec<Misconfiguration>,
    #[serde(rename = "Secrets", default)]
    secrets: Vec<Secret>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Vulnerability {
    #[serde(rename = "VulnerabilityID", default)]
    id: String,
    #[serde(rename = "PkgName", default)]
    pkg_name: String,
    #[serde(rename = "InstalledVersion", default)]
    installed_version: Option<String>,
    #[serde(rename = "FixedVersion", default)]
    fixed_version: Option<String>,
    #[serde(rename = "Severity", default)]
    severity: String,
    #[serde(rename = "Title", default)]
    title: Option<String>,
    #[serde(rename = "Description", default)]
    description: Option<String>,
    #[serde(rename = "PrimaryURL", default)]
    primary_url: Option<String>,
    #[serde(rename = "References", default)]
    references: Vec<String>,
    #[serde(rename = "CVSS", default)]
    cvss: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct Misconfiguration {
    #[serde(rename = "ID", default)]
    id: String,
    #[serde(rename = "Title", default)]
    title: Option<String>,
    #[serde(rename = "Description", default)]
    description: Option<String>,
    #[serde(rename = "Message", default)]
    message: Option<String>,
    #[serde(rename = "Severity", default)]
    severity: String,
    #[serde(rename = "Resolution", default)]
    resolution: Option<String>,
    #[serde(rename = "PrimaryURL", default)]
    primary_url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Secret {
    #[serde(rename = "RuleID", default)]
    rule_id: String,
    #[serde(rename = "Title", default)]
    title: Option<String>,
    #[serde(rename = "Severity", default)]
    severity: String,
    #[serde(rename = "StartLine", default)]
    start_line: Option<i64>,
    #[serde(rename = "EndLine", default)]
    end_line: Option<i64>,
}

impl Vulnerability {
    /// Highest CVSS v3 score across reporting sources.
    fn cvss_score(&self) -> Option<f64> {
        self.cvss
            .as_object()?
            .values()
            .filter_map(|source| source.get("V3Score").and_then(|v| v.as_f64()))
            .fold(None, |best: Option<f64>, score| {
                Some(best.map_or(score, |b| b.max(score)))
            })
    }
}

pub(crate) fn parse(target: &str, bytes: &[u8]) -> Vec<CommonFinding> {
    let Some(report) = decode::<Report>("trivy", target, bytes) else {
        return Vec::new();
    };

    let mut findings = Vec::new();
    for block in report.results {
        let path = block.target.clone();

        for vuln in block.vulnerabilities {
            let severity = Severity::normalize(&vuln.severity);
            let message = vuln
                .title
                .clone()
                .or_else(|| vuln.description.clone())
                .unwrap_or_else(|| format!("{} in {}", vuln.id, vuln.pkg_name));
            let mut finding =
                CommonFinding::new("trivy", &vuln.id, &path, None, severity, &message);
            finding.title = vuln.title.clone();
            finding.remediation = vuln
                .fixed_version
                .as_ref()
                .map(|v| format!("Upgrade {} to {}", vuln.pkg_name, v));
            let mut references = vuln.references.clone();
            if let Some(url) = &vuln.primary_url {
                if !references.contains(url) {
                    references.insert(0, url.clone());
                }
            }
            if !references.is_empty() {
                finding.references = Some(references);
            }
            if let Some(score) = vuln.cvss_score() {
                finding.cvss = Some(Cvss { score: Some(score) });
            }
            finding.raw = raw_of(&vuln);
            findings.push(finding);
        }

        for misconfig in block.misconfigurations {
            let severity = Severity::normalize(&misconfig.severity);
            let message = misconfig
                .message
                .clone()
                .or_else(|| misconfig.description.clone())
                .unwrap_or_else(|| misconfig.id.clone());
            let mut finding =
                CommonFinding::new("trivy", &misconfig.id, &path, None, severity, &message);
            finding.title = misconfig.title.clone();
            finding.remediation = misconfig.resolution.clone();
            finding.references = misconfig.primary_url.clone().map(|u| vec![u]);
            finding.raw = raw_of(&misconfig);
            findings.push(finding);
        }

        for secret in block.secrets {
            let severity = Severity::normalize(&secret.severity);
            let message = secret
                .title
                .clone()
                .unwrap_or_else(|| format!("Secret detected by rule {}", secret.rule_id));
            let mut finding = CommonFinding::new(
                "trivy",
                &secret.rule_id,
                &path,
                secret.start_line,
                severity,
                &message,
            );
            finding.location.end_line = secret.end_line;
            finding.tags = Some(vec!["secret".to_string()]);
            finding.raw = raw_of(&secret);
            findings.push(finding);
        }
    }
    findings
}
