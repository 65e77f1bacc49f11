//! Suppression rules.
//!
//! An optional YAML file (`jmo.suppress.yml`, looked up in the results
//! directory then the working directory) lists rules that silence known
//! findings. A rule matches when every field it specifies equals the
//! finding's value; fields left out don't participate.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use jmo_core::CommonFinding;

/// File name probed for suppression rules.
pub const SUPPRESS_FILE: &str = "jmo.suppress.yml";

/// One suppression rule. Any subset of fields may be set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SuppressionRule {
    #[serde(default)]
    pub tool: Option<String>,
    #[serde(default)]
    pub rule_id: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub fingerprint: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

impl SuppressionRule {
    /// True when no selector field is set; such rules never match.
    fn is_vacuous(&self) -> bool {
        self.tool.is_none()
            && self.rule_id.is_none()
            && self.path.is_none()
            && self.fingerprint.is_none()
    }

    pub fn matches(&self, finding: &CommonFinding) -> bool {
        if self.is_vacuous() {
            return false;
        }
        if let Some(tool) = &self.tool {
            if *tool != finding.tool.name {
                return false;
            }
        }
        if let Some(rule_id) = &self.rule_id {
            if *rule_id != finding.rule_id {
                return false;
            }
        }
        if let Some(path) = &self.path {
            if *path != finding.location.path {
                return false;
            }
        }
        if let Some(fingerprint) = &self.fingerprint {
            if *fingerprint != finding.id {
                return false;
            }
        }
        true
    }
}

/// Parsed suppressions file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Suppressions {
    #[serde(default)]
    pub suppressions: Vec<SuppressionRule>,
}

impl Suppressions {
    pub fn is_empty(&self) -> bool {
        self.suppressions.is_empty()
    }
}

/// Locate the suppressions file: results dir first, then the working dir.
pub fn discover_suppress_file(results_dir: &Path) -> Option<PathBuf> {
    let in_results = results_dir.join(SUPPRESS_FILE);
    if in_results.exists() {
        return Some(in_results);
    }
    let in_cwd = std::env::current_dir().ok()?.join(SUPPRESS_FILE);
    in_cwd.exists().then_some(in_cwd)
}

/// Load suppression rules from a YAML file. Both the `suppressions:` map
/// form and a bare list of rules are accepted. Unreadable or malformed
/// files degrade to no suppressions.
pub fn load_suppressions(path: Option<&Path>) -> Option<Suppressions> {
    let path = path?;
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) => {
            warn!(path = %path.display(), %err, "failed to read suppressions file");
            return None;
        }
    };
    if let Ok(sup) = serde_yaml::from_str::<Suppressions>(&text) {
        if !sup.is_empty() {
            return Some(sup);
        }
    }
    if let Ok(rules) = serde_yaml::from_str::<Vec<SuppressionRule>>(&text) {
        return Some(Suppressions {
            suppressions: rules,
        });
    }
    debug!(path = %path.display(), "suppressions file empty or malformed");
    None
}

/// Split findings into retained ones and the ids of suppressed ones.
pub fn filter_suppressed(
    findings: Vec<CommonFinding>,
    suppressions: &Suppressions,
) -> (Vec<CommonFinding>, Vec<String>) {
    let mut retained = Vec::with_capacity(findings.len());
    let mut suppressed_ids = Vec::new();
    for finding in findings {
        if suppressions
            .suppressions
            .iter()
            .any(|rule| rule.matches(&finding))
        {
            suppressed_ids.push(finding.id.clone());
        } else {
            retained.push(finding);
        }
    }
    (retained, suppressed_ids)
}
