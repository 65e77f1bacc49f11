//! Adapter for osv-scanner JSON reports.

use serde::{Deserialize, Serialize};

use jmo_core::{CommonFinding, Severity};

use super::{decode, raw_of};

#[derive(Debug, Serialize, Deserialize, Default)]
struct Report {
    #[serde(default)]
    results: Vec<SourceResult>,
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct SourceResult {
    #[serde(default)]
    source: Source,
    #[serde(default)]
    packages: Vec<PackageResult>,
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct Source {
    #[serde(default)]
    path: String,
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct PackageResult {
    #[serde(default)]
    package: PackageId,
    #[serde(default)]
    vulnerabilities: Vec<Vulnerability>,
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct PackageId {
    #[serde(default)]
    name: String,
    #[serde(default)]
    version: String,
    #[serde(default)]
    ecosystem: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Vulnerability {
    #[serde(default)]
    id: String,
    #[serde(default)]
    aliases: Vec<String>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    details: Option<String>,
    #[serde(default)]
    database_specific: serde_json::Value,
    #[serde(default)]
    references: Vec<Reference>,
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct Reference {
    #[serde(default)]
    url: String,
}

impl Vulnerability {
    fn severity(&self) -> Severity {
        self.database_specific
            .get("severity")
            .and_then(|v| v.as_str())
            .map(Severity::normalize)
            // advisories without a qualitative severity default to MEDIUM
            .unwrap_or(Severity::Medium)
    }
}

pub(crate) fn parse(target: &str, bytes: &[u8]) -> Vec<CommonFinding> {
    let Some(report) = decode::<Report>("osv-scanner", target, bytes) else {
        return Vec::new();
    };

    let mut findings = Vec::new();
    for source_result in report.results {
        let path = source_result.source.path.clone();
        for package in source_result.packages {
            let pkg = format!("{}@{}", package.package.name, package.package.version);
            for vuln in package.vulnerabilities {
                let severity = vuln.severity();
                let message = vuln
                    .summary
                    .clone()
                    .unwrap_or_else(|| format!("{} affects {}", vuln.id, pkg));
                let mut finding =
                    CommonFinding::new("osv-scanner", &vuln.id, &path, None, severity, &message);
                finding.title = vuln.summary.clone();
                let references: Vec<String> =
                    vuln.references.iter().map(|r| r.url.clone()).collect();
                if !references.is_empty() {
                    finding.references = Some(references);
                }
                if !vuln.aliases.is_empty() {
                    finding.tags = Some(vuln.aliases.clone());
                }
                finding.raw = raw_of(&vuln);
                findings.push(finding);
            }
        }
    }
    findings
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_vulnerability() {
        let body = r#"{
            "results": [{
                "source": {"path": "package-lock.json"},
                "packages": [{
                    "package": {"name": "minimist", "version": "1.2.0", "ecosystem": "npm"},
                    "vulnerabilities": [{
                        "id": "GHSA-xvch-5gv4-984h",
                        "aliases": ["CVE-2021-44906"],
                        "summary": "Prototype Pollution in minimist",
                        "database_specific": {"severity": "CRITICAL"},
                        "references": [{"url": "https://github.com/advisories/GHSA-xvch-5gv4-984h"}]
                    }]
                }]
            }]
        }"#;
        let findings = parse("app", body.as_bytes());
        assert_eq!(findings.len(), 1);
        let f = &findings[0];
        assert_eq!(f.severity, Severity::Critical);
        assert_eq!(f.location.path, "package-lock.json");
        assert_eq!(f.tags.as_ref().unwrap()[0], "CVE-2021-44906");
    }

    #[test]
    fn test_missing_severity_defaults_to_medium() {
        let body = r#"{"results": [{"source": {"path": "p"}, "packages": [{
            "package": {"name": "x", "version": "1"},
            "vulnerabilities": [{"id": "OSV-1"}]
        }]}]}"#;
        let findings = parse("app", body.as_bytes());
        assert_eq!(findings[0].severity, Severity::Medium);
    }

    #[test]
    fn test_stub_envelope() {
        assert!(parse("app", br#"{"results": []}"#).is_empty());
    }
}
