//! The normalized finding record (`CommonFinding`, schema 1.2.0) and the
//! stable fingerprint function used as the deduplication key everywhere.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::severity::Severity;

/// Schema version carried by every normalized finding.
pub const SCHEMA_VERSION: &str = "1.2.0";

/// Hex characters kept from the SHA-256 digest.
///
/// Fingerprints are compared as opaque strings across scans, processes and
/// machines; changing this constant breaks every stored fingerprint.
pub const FINGERPRINT_LENGTH: usize = 16;

/// Characters of the whitespace-normalized message that participate in the
/// fingerprint input.
pub const MESSAGE_SNIPPET_LENGTH: usize = 200;

/// Compute the stable fingerprint for a finding.
///
/// `hex(sha256("{tool}|{rule_id}|{path}|{start_line_or_0}|{snippet}"))` cut
/// to [`FINGERPRINT_LENGTH`] characters, where the snippet is the message
/// with runs of whitespace collapsed to single spaces, trimmed, and cut to
/// [`MESSAGE_SNIPPET_LENGTH`] characters.
pub fn fingerprint(
    tool: &str,
    rule_id: &str,
    path: &str,
    start_line: Option<i64>,
    message: &str,
) -> String {
    let snippet: String = message.split_whitespace().collect::<Vec<_>>().join(" ");
    let snippet: String = snippet.chars().take(MESSAGE_SNIPPET_LENGTH).collect();
    let input = format!(
        "{}|{}|{}|{}|{}",
        tool,
        rule_id,
        path,
        start_line.unwrap_or(0),
        snippet
    );
    let digest = Sha256::digest(input.as_bytes());
    hex::encode(digest)[..FINGERPRINT_LENGTH].to_string()
}

/// Reporting tool identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ToolInfo {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Source location of a finding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_line: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_line: Option<i64>,
}

/// Qualitative risk level used for confidence / likelihood / impact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    High,
    Medium,
    Low,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::High => "HIGH",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::Low => "LOW",
        }
    }
}

/// Qualitative risk assessment block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Risk {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<RiskLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub likelihood: Option<RiskLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub impact: Option<RiskLevel>,
}

/// CVSS block (score only; vector strings stay in the raw payload).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Cvss {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

/// Compliance framework mappings (schema 1.2.0).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Compliance {
    #[serde(
        rename = "owaspTop10_2021",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub owasp_top10_2021: Option<Vec<String>>,
    #[serde(
        rename = "cweTop25_2024",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub cwe_top25_2024: Option<Vec<String>>,
    #[serde(
        rename = "cisControlsV8_1",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub cis_controls_v8_1: Option<Vec<String>>,
    #[serde(rename = "nistCsf2_0", default, skip_serializing_if = "Option::is_none")]
    pub nist_csf_2_0: Option<Vec<String>>,
    #[serde(rename = "pciDss4_0", default, skip_serializing_if = "Option::is_none")]
    pub pci_dss_4_0: Option<Vec<String>>,
    #[serde(rename = "mitreAttack", default, skip_serializing_if = "Option::is_none")]
    pub mitre_attack: Option<Vec<String>>,
}

impl Compliance {
    /// True when no framework mapping is present.
    pub fn is_empty(&self) -> bool {
        self.owasp_top10_2021.is_none()
            && self.cwe_top25_2024.is_none()
            && self.cis_controls_v8_1.is_none()
            && self.nist_csf_2_0.is_none()
            && self.pci_dss_4_0.is_none()
            && self.mitre_attack.is_none()
    }
}

/// The system-wide normalized finding record.
///
/// Adapters produce these; the store persists them; reporters and the trend
/// engine consume them. `id` is the fingerprint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommonFinding {
    pub schema_version: String,
    pub id: String,
    pub severity: Severity,
    pub tool: ToolInfo,
    pub rule_id: String,
    pub location: Location,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub references: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compliance: Option<Compliance>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk: Option<Risk>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cvss: Option<Cvss>,
    /// Fingerprints of cross-tool duplicates folded into this finding.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_findings: Option<Vec<String>>,
    /// Original tool record, preserved for downstream consumers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<serde_json::Value>,
}

impl CommonFinding {
    /// Build a finding with its fingerprint derived from the identity
    /// fields. Optional fields start unset.
    pub fn new(
        tool: &str,
        rule_id: &str,
        path: &str,
        start_line: Option<i64>,
        severity: Severity,
        message: &str,
    ) -> Self {
        let id = fingerprint(tool, rule_id, path, start_line, message);
        CommonFinding {
            schema_version: SCHEMA_VERSION.to_string(),
            id,
            severity,
            tool: ToolInfo {
                name: tool.to_string(),
                version: None,
            },
            rule_id: rule_id.to_string(),
            location: Location {
                path: path.to_string(),
                start_line,
                end_line: None,
            },
            title: None,
            message: message.to_string(),
            remediation: None,
            references: None,
            tags: None,
            compliance: None,
            risk: None,
            cvss: None,
            related_findings: None,
            raw: None,
        }
    }
}
