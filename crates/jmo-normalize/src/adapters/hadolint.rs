//! Adapter for hadolint JSON reports (top-level array of rule hits).

use serde::{Deserialize, Serialize};

use jmo_core::{CommonFinding, Severity};

use super::{decode, raw_of};

#[derive(Debug, Serialize, Deserialize)]
struct Hit {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    line: Option<i64>,
    #[serde(default)]
    column: Option<i64>,
    #[serde(default)]
    file: String,
    #[serde(default)]
    level: String,
}

/// hadolint levels: error/warning/info/style.
fn map_level(level: &str) -> Severity {
    match level.to_ascii_lowercase().as_str() {
        "error" => Severity::High,
        "warning" => Severity::Medium,
        "info" => Severity::Low,
        _ => Severity::Info,
    }
}

pub(crate) fn parse(target: &str, bytes: &[u8]) -> Vec<CommonFinding> {
    let Some(hits) = decode::<Vec<Hit>>("hadolint", target, bytes) else {
        return Vec::new();
    };

    hits.into_iter()
        .map(|hit| {
            let severity = map_level(&hit.level);
            let mut finding = CommonFinding::new(
                "hadolint",
                &hit.code,
                &hit.file,
                hit.line,
                severity,
                &hit.message,
            );
            finding.references = Some(vec![format!(
                "https://github.com/hadolint/hadolint/wiki/{}",
                hit.code
            )]);
            finding.raw = raw_of(&hit);
            finding
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hits() {
        let body = r#"[
            {"code": "DL3006", "message": "Always tag the version of an image",
             "line": 1, "column": 1, "file": "Dockerfile", "level": "warning"},
            {"code": "DL3059", "message": "Multiple consecutive RUN",
             "line": 9, "file": "Dockerfile", "level": "style"}
        ]"#;
        let findings = parse("app", body.as_bytes());
        assert_eq!(findings.len(), 2);
        assert_eq!(findings[0].severity, Severity::Medium);
        assert_eq!(findings[1].severity, Severity::Info);
        assert!(findings[0].references.as_ref().unwrap()[0].contains("DL3006"));
    }

    #[test]
    fn test_level_mapping() {
        assert_eq!(map_level("error"), Severity::High);
        assert_eq!(map_level("warning"), Severity::Medium);
        assert_eq!(map_level("info"), Severity::Low);
        assert_eq!(map_level("style"), Severity::Info);
    }
}
