//! Cross-tool duplicate clustering.
//!
//! Multiple tools often report the same underlying problem. Findings are
//! grouped by `(canonicalized rule id, canonical path, start line)`; each
//! group keeps exactly one representative (highest severity, ties broken
//! by lexicographic fingerprint) with the other fingerprints attached to
//! the representative's `relatedFindings` list.

use std::collections::HashMap;

use jmo_core::CommonFinding;

fn canonical_rule(rule_id: &str) -> String {
    rule_id.trim().to_ascii_lowercase()
}

fn canonical_path(path: &str) -> String {
    let normalized = path.replace('\\', "/");
    normalized
        .strip_prefix("./")
        .unwrap_or(&normalized)
        .to_string()
}

fn cluster_key(finding: &CommonFinding) -> (String, String, Option<i64>) {
    (
        canonical_rule(&finding.rule_id),
        canonical_path(&finding.location.path),
        finding.location.start_line,
    )
}

/// Collapse duplicate findings, preserving first-occurrence order of the
/// surviving representatives.
pub fn cluster_findings(findings: Vec<CommonFinding>) -> Vec<CommonFinding> {
    let mut representatives: Vec<CommonFinding> = Vec::with_capacity(findings.len());
    let mut index_by_key: HashMap<(String, String, Option<i64>), usize> = HashMap::new();

    for finding in findings {
        let key = cluster_key(&finding);
        match index_by_key.get(&key) {
            None => {
                index_by_key.insert(key, representatives.len());
                representatives.push(finding);
            }
            Some(&idx) => {
                let current = &mut representatives[idx];
                let replace = finding.severity > current.severity
                    || (finding.severity == current.severity && finding.id < current.id);
                if replace {
                    let mut promoted = finding;
                    let mut related = current
                        .related_findings
                        .take()
                        .unwrap_or_default();
                    related.push(current.id.clone());
                    if let Some(extra) = promoted.related_findings.take() {
                        related.extend(extra);
                    }
                    promoted.related_findings = Some(related);
                    *current = promoted;
                } else {
                    current
                        .related_findings
                        .get_or_insert_with(Vec::new)
                        .push(finding.id.clone());
                }
            }
        }
    }
    representatives
}

#[cfg(test)]
mod tests {
    use super::*;
    use jmo_core::Severity;

    fn finding(
        tool: &str,
        rule: &str,
        path: &str,
        line: Option<i64>,
        severity: Severity,
    ) -> CommonFinding {
        CommonFinding::new(tool, rule, path, line, severity, &format!("{tool} saw {rule}"))
    }

    #[test]
    fn test_cross_tool_duplicates_collapse() {
        let a = finding("trivy", "CVE-2024-1", "src/a.py", Some(10), Severity::Medium);
        let b = finding("osv-scanner", "cve-2024-1", "./src/a.py", Some(10), Severity::High);
        let dropped_id = a.id.clone();
        let kept_id = b.id.clone();

        let clustered = cluster_findings(vec![a, b]);
        assert_eq!(clustered.len(), 1);
        assert_eq!(clustered[0].id, kept_id);
        assert_eq!(
            clustered[0].related_findings.as_ref().unwrap(),
            &vec![dropped_id]
        );
    }

    #[test]
    fn test_severity_tie_breaks_on_fingerprint() {
        let a = finding("semgrep", "rule", "f.py", Some(1), Severity::High);
        let b = finding("bandit", "RULE", "f.py", Some(1), Severity::High);
        let expected = if a.id < b.id { a.id.clone() } else { b.id.clone() };
        let clustered = cluster_findings(vec![a, b]);
        assert_eq!(clustered.len(), 1);
        assert_eq!(clustered[0].id, expected);
    }

    #[test]
    fn test_distinct_lines_stay_separate() {
        let a = finding("semgrep", "rule", "f.py", Some(1), Severity::High);
        let b = finding("semgrep", "rule", "f.py", Some(2), Severity::High);
        assert_eq!(cluster_findings(vec![a, b]).len(), 2);
    }

    #[test]
    fn test_windows_separators_canonicalize() {
        let a = finding("tfsec", "aws-1", "infra/main.tf", None, Severity::Low);
        let b = finding("checkov", "AWS-1", "infra\\main.tf", None, Severity::Low);
        assert_eq!(cluster_findings(vec![a, b]).len(), 1);
    }

    #[test]
    fn test_order_of_representatives_preserved() {
        let first = finding("semgrep", "r1", "a.py", Some(1), Severity::Low);
        let second = finding("semgrep", "r2", "b.py", Some(2), Severity::Critical);
        let clustered = cluster_findings(vec![first.clone(), second]);
        assert_eq!(clustered[0].id, first.id);
    }

    #[test]
    fn test_three_way_cluster_accumulates_related() {
        let a = finding("trivy", "cve-7", "x", Some(5), Severity::Low);
        let b = finding("osv-scanner", "cve-7", "x", Some(5), Severity::Medium);
        let c = finding("grype", "cve-7", "x", Some(5), Severity::Critical);
        let winner = c.id.clone();
        let clustered = cluster_findings(vec![a, b, c]);
        assert_eq!(clustered.len(), 1);
        assert_eq!(clustered[0].id, winner);
        assert_eq!(clustered[0].related_findings.as_ref().unwrap().len(), 2);
    }
}
