//! Per-tool output adapters.
//!
//! Each adapter is a pure function `(target_name, bytes) → Vec<CommonFinding>`
//! decoding one tool's native output shape. Adapters MUST fail soft:
//! malformed or partial output yields zero findings and a logged warning,
//! never an error that halts aggregation. Required `CommonFinding` fields
//! are always set; missing optional fields stay unset. The original tool
//! record is preserved under `raw`.

use jmo_core::CommonFinding;
use tracing::warn;

mod bandit;
mod checkov;
mod gitleaks;
mod hadolint;
mod noseyparker;
mod osv;
mod semgrep;
mod syft;
mod tfsec;
mod trivy;
mod trufflehog;
mod zap;

/// Route one artifact to its tool adapter. Unknown tools yield nothing.
pub fn parse_artifact(tool: &str, target: &str, bytes: &[u8]) -> Vec<CommonFinding> {
    match tool {
        "gitleaks" => gitleaks::parse(target, bytes),
        "trufflehog" => trufflehog::parse(target, bytes),
        "semgrep" => semgrep::parse(target, bytes),
        "noseyparker" => noseyparker::parse(target, bytes),
        "syft" => syft::parse(target, bytes),
        "trivy" => trivy::parse(target, bytes),
        "hadolint" => hadolint::parse(target, bytes),
        "checkov" => checkov::parse(target, bytes),
        "bandit" => bandit::parse(target, bytes),
        "tfsec" => tfsec::parse(target, bytes),
        "osv-scanner" => osv::parse(target, bytes),
        "zap" => zap::parse(target, bytes),
        other => {
            warn!(tool = other, target, "no adapter for tool output; skipping artifact");
            Vec::new()
        }
    }
}

/// Shared fail-soft JSON decode: log and return `None` on malformed input.
pub(crate) fn decode<T: serde::de::DeserializeOwned>(
    tool: &str,
    target: &str,
    bytes: &[u8],
) -> Option<T> {
    match serde_json::from_slice::<T>(bytes) {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(tool, target, %err, "malformed tool output; yielding zero findings");
            None
        }
    }
}

/// Raw record preservation helper.
pub(crate) fn raw_of<T: serde::Serialize>(record: &T) -> Option<serde_json::Value> {
    serde_json::to_value(record).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_tool_yields_nothing() {
        assert!(parse_artifact("mystery-tool", "app", b"{}").is_empty());
    }

    #[test]
    fn test_every_known_adapter_tolerates_garbage() {
        for tool in [
            "gitleaks",
            "trufflehog",
            "semgrep",
            "noseyparker",
            "syft",
            "trivy",
            "hadolint",
            "checkov",
            "bandit",
            "tfsec",
            "osv-scanner",
            "zap",
        ] {
            assert!(parse_artifact(tool, "app", b"not json at all").is_empty());
            assert!(parse_artifact(tool, "app", b"").is_empty());
            assert!(parse_artifact(tool, "app", b"42").is_empty());
        }
    }
}
