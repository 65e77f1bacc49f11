//! Results-directory layout shared by the orchestrator (writer), the
//! normalization pipeline (reader) and the history store (detector).
//!
//! ```text
//! <results>/individual-repos/<repo>/<tool>.json
//! <results>/individual-images/<sanitized-image>/<tool>.json
//! <results>/summaries/findings.json
//! ```

use std::path::{Path, PathBuf};

use crate::target::{Target, TargetKind};

/// Subdirectory holding aggregated reporter output.
pub const SUMMARIES_DIR: &str = "summaries";

/// File name of the aggregated findings document.
pub const FINDINGS_JSON: &str = "findings.json";

/// Root directory for a target kind under the results dir.
pub fn kind_root(results_dir: &Path, kind: TargetKind) -> PathBuf {
    results_dir.join(kind.results_subdir())
}

/// Per-target output directory.
pub fn target_dir(results_dir: &Path, target: &Target) -> PathBuf {
    kind_root(results_dir, target.kind).join(target.name())
}

/// Path of one tool's raw artifact for a target.
pub fn artifact_path(results_dir: &Path, target: &Target, tool: &str) -> PathBuf {
    target_dir(results_dir, target).join(format!("{tool}.json"))
}

/// Aggregated findings document path.
pub fn findings_json_path(results_dir: &Path) -> PathBuf {
    results_dir.join(SUMMARIES_DIR).join(FINDINGS_JSON)
}

/// Detect the primary target type from the directory structure. Returns
/// `None` when no known subtree exists.
pub fn detect_target_type(results_dir: &Path) -> Option<TargetKind> {
    TargetKind::all()
        .into_iter()
        .find(|kind| kind_root(results_dir, *kind).exists())
}

/// Collect target names (subdirectory names) for the detected target type.
pub fn collect_targets(results_dir: &Path) -> Vec<String> {
    let Some(kind) = detect_target_type(results_dir) else {
        return Vec::new();
    };
    let root = kind_root(results_dir, kind);
    let mut names: Vec<String> = std::fs::read_dir(&root)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .filter(|e| e.path().is_dir())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_path_shape() {
        let t = Target::new(TargetKind::Repo, "/src/my-app");
        let p = artifact_path(Path::new("results"), &t, "semgrep");
        assert_eq!(
            p,
            Path::new("results/individual-repos/my-app/semgrep.json")
        );
    }

    #[test]
    fn test_detect_target_type() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(detect_target_type(dir.path()), None);

        std::fs::create_dir_all(dir.path().join("individual-images/nginx_latest")).unwrap();
        assert_eq!(detect_target_type(dir.path()), Some(TargetKind::Image));
    }

    #[test]
    fn test_collect_targets_sorted() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("individual-repos/zeta")).unwrap();
        std::fs::create_dir_all(dir.path().join("individual-repos/alpha")).unwrap();
        // stray file is ignored
        std::fs::write(dir.path().join("individual-repos/notes.txt"), "x").unwrap();

        assert_eq!(collect_targets(dir.path()), vec!["alpha", "zeta"]);
    }

    #[test]
    fn test_collect_targets_empty_when_unknown() {
        let dir = tempfile::tempdir().unwrap();
        assert!(collect_targets(dir.path()).is_empty());
    }
}
