//! Adapter for syft SBOM output.
//!
//! Syft inventories packages; it does not report vulnerabilities. The
//! artifact is validated as JSON so corrupt output still logs a warning,
//! but the package inventory yields no findings.

use serde::Deserialize;

use jmo_core::CommonFinding;

use super::decode;

#[derive(Debug, Deserialize, Default)]
struct Sbom {
    #[serde(default)]
    artifacts: Vec<serde_json::Value>,
}

pub(crate) fn parse(target: &str, bytes: &[u8]) -> Vec<CommonFinding> {
    let _sbom = decode::<Sbom>("syft", target, bytes);
    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sbom_yields_no_findings() {
        let body = r#"{"artifacts": [{"name": "openssl", "version": "3.0.2"}]}"#;
        assert!(parse("app", body.as_bytes()).is_empty());
        assert!(parse("app", br#"{"artifacts": []}"#).is_empty());
    }
}
