//! Adapter for trufflehog output: NDJSON records on stdout, one secret
//! candidate per line. A JSON array form is also accepted.

use serde::{Deserialize, Serialize};
use tracing::debug;

use jmo_core::{CommonFinding, Risk, RiskLevel, Severity};

use super::raw_of;

#[derive(Debug, Serialize, Deserialize)]
struct Record {
    #[serde(rename = "DetectorName", default)]
    detector_name: String,
    #[serde(rename = "DecoderName", default)]
    decoder_name: Option<String>,
    #[serde(rename = "Verified", default)]
    verified: bool,
    #[serde(rename = "SourceMetadata", default)]
    source_metadata: Option<SourceMetadata>,
    #[serde(rename = "Redacted", default)]
    redacted: Option<String>,
    #[serde(flatten)]
    rest: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct SourceMetadata {
    #[serde(rename = "Data", default)]
    data: Option<SourceData>,
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct SourceData {
    #[serde(rename = "Git", default)]
    git: Option<FileRef>,
    #[serde(rename = "Filesystem", default)]
    filesystem: Option<FileRef>,
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct FileRef {
    #[serde(default)]
    file: String,
    #[serde(default)]
    line: Option<i64>,
}

impl Record {
    fn location(&self) -> (String, Option<i64>) {
        let data = self
            .source_metadata
            .as_ref()
            .and_then(|m| m.data.as_ref());
        if let Some(git) = data.and_then(|d| d.git.as_ref()) {
            return (git.file.clone(), git.line);
        }
        if let Some(fs) = data.and_then(|d| d.filesystem.as_ref()) {
            return (fs.file.clone(), fs.line);
        }
        (String::new(), None)
    }
}

pub(crate) fn parse(target: &str, bytes: &[u8]) -> Vec<CommonFinding> {
    let text = String::from_utf8_lossy(bytes);

    // Stub artifacts use the array form; live output is NDJSON.
    let records: Vec<Record> = if let Ok(array) = serde_json::from_str::<Vec<Record>>(&text) {
        array
    } else {
        let mut parsed = Vec::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<Record>(line) {
                Ok(record) => parsed.push(record),
                Err(err) => {
                    debug!(tool = "trufflehog", target, %err, "skipping malformed line");
                }
            }
        }
        parsed
    };

    records
        .into_iter()
        .filter(|r| !r.detector_name.is_empty())
        .map(|record| {
            let (path, line) = record.location();
            // Verified secrets are upgraded; unverified candidates stay MEDIUM.
            let severity = if record.verified {
                Severity::High
            } else {
                Severity::Medium
            };
            let message = if record.verified {
                format!("Verified {} credential detected", record.detector_name)
            } else {
                format!("Potential {} credential detected", record.detector_name)
            };
            let mut finding = CommonFinding::new(
                "trufflehog",
                &record.detector_name,
                &path,
                line,
                severity,
                &message,
            );
            finding.title = Some(message.clone());
            finding.tags = Some(vec!["secret".to_string()]);
            finding.risk = Some(Risk {
                confidence: Some(if record.verified {
                    RiskLevel::High
                } else {
                    RiskLevel::Medium
                }),
                likelihood: None,
                impact: None,
            });
            finding.raw = raw_of(&record);
            finding
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ndjson_lines() {
        let body = concat!(
            r#"{"DetectorName":"AWS","Verified":true,"SourceMetadata":{"Data":{"Git":{"file":"src/deploy.sh","line":7}}}}"#,
            "\n",
            r#"{"DetectorName":"Slack","Verified":false,"SourceMetadata":{"Data":{"Filesystem":{"file":".env","line":2}}}}"#,
            "\n",
        );
        let findings = parse("app", body.as_bytes());
        assert_eq!(findings.len(), 2);
        assert_eq!(findings[0].severity, Severity::High);
        assert_eq!(findings[0].location.path, "src/deploy.sh");
        assert_eq!(findings[1].severity, Severity::Medium);
        assert_eq!(findings[1].location.start_line, Some(2));
    }

    #[test]
    fn test_malformed_lines_are_skipped_not_fatal() {
        let body = concat!(
            "garbage line\n",
            r#"{"DetectorName":"GitHub","Verified":false}"#,
            "\n",
        );
        let findings = parse("app", body.as_bytes());
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].rule_id, "GitHub");
    }

    #[test]
    fn test_stub_array_form() {
        assert!(parse("app", b"[]").is_empty());
    }

    #[test]
    fn test_verified_and_unverified_fingerprints_differ() {
        let verified =
            parse("app", br#"{"DetectorName":"AWS","Verified":true}"#.as_slice());
        let unverified =
            parse("app", br#"{"DetectorName":"AWS","Verified":false}"#.as_slice());
        assert_ne!(verified[0].id, unverified[0].id);
    }
}
