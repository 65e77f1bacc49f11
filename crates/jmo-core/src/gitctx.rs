//! Git context capture for scan provenance.
//!
//! Runs `git` subprocesses in the target directory with a short timeout
//! each. Every accessor is best-effort: a missing binary, a non-repo
//! directory or a timeout degrades to "no git context" rather than failing
//! the scan.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Wall-clock budget for each individual git invocation.
const GIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default number of parent directories probed for a `.git` entry.
pub const GIT_WALK_LIMIT: usize = 5;

/// Captured repository state at scan time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GitContext {
    pub commit_hash: Option<String>,
    pub commit_short: Option<String>,
    pub branch: Option<String>,
    pub tag: Option<String>,
    pub is_dirty: bool,
}

impl GitContext {
    pub fn is_empty(&self) -> bool {
        self.commit_hash.is_none() && self.branch.is_none()
    }
}

/// Walk up from `start` looking for a directory containing `.git`,
/// probing at most `max_levels` ancestors (the start directory included).
pub fn find_git_root(start: &Path, max_levels: usize) -> Option<PathBuf> {
    let mut candidate = start.to_path_buf();
    for _ in 0..max_levels {
        if candidate.join(".git").exists() {
            return Some(candidate);
        }
        match candidate.parent() {
            Some(parent) => candidate = parent.to_path_buf(),
            None => break,
        }
    }
    None
}

/// Capture git context from the repository at or above `start`.
///
/// Discovery walks at most `max_levels` parents; deeper working trees
/// degrade to an empty context.
pub fn collect_git_context(start: &Path, max_levels: usize) -> GitContext {
    let Some(root) = find_git_root(start, max_levels) else {
        debug!(path = %start.display(), "no .git found within walk limit");
        return GitContext::default();
    };

    let commit_hash = run_git(&root, &["rev-parse", "HEAD"]);
    let commit_short = run_git(&root, &["rev-parse", "--short", "HEAD"]);
    let branch = run_git(&root, &["rev-parse", "--abbrev-ref", "HEAD"]);
    let tag = run_git(&root, &["describe", "--tags", "--exact-match"]);
    let is_dirty = run_git(&root, &["status", "--porcelain"])
        .map(|out| !out.is_empty())
        .unwrap_or(false);

    GitContext {
        commit_hash,
        commit_short,
        branch,
        tag,
        is_dirty,
    }
}

/// Run one git command, returning trimmed stdout on success. `None` covers
/// a missing binary, a non-zero exit, empty output and a timeout.
fn run_git(repo_dir: &Path, args: &[&str]) -> Option<String> {
    let mut child = Command::new("git")
        .args(args)
        .current_dir(repo_dir)
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .stdin(Stdio::null())
        .spawn()
        .ok()?;

    let start = Instant::now();
    loop {
        match child.try_wait() {
            Ok(Some(status)) => {
                if !status.success() {
                    return None;
                }
                break;
            }
            Ok(None) => {
                if start.elapsed() > GIT_TIMEOUT {
                    let _ = child.kill();
                    let _ = child.wait();
                    debug!(?args, "git call timed out");
                    return None;
                }
                std::thread::sleep(Duration::from_millis(10));
            }
            Err(_) => return None,
        }
    }

    let mut out = String::new();
    use std::io::Read;
    child.stdout.take()?.read_to_string(&mut out).ok()?;
    let trimmed = out.trim().to_string();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn git(dir: &Path, args: &[&str]) {
        let out = Command::new("git")
            .args(args)
            .current_dir(dir)
            .output()
            .unwrap();
        assert!(
            out.status.success(),
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&out.stderr)
        );
    }

    fn make_repo() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        git(dir.path(), &["init", "-b", "main"]);
        git(dir.path(), &["config", "user.name", "tester"]);
        git(dir.path(), &["config", "user.email", "tester@example.com"]);
        git(dir.path(), &["commit", "--allow-empty", "-m", "initial"]);
        dir
    }

    #[test]
    fn test_collect_context_from_repo() {
        let repo = make_repo();
        let ctx = collect_git_context(repo.path(), GIT_WALK_LIMIT);
        let hash = ctx.commit_hash.expect("commit hash");
        assert_eq!(hash.len(), 40);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(ctx.branch.as_deref(), Some("main"));
        assert!(!ctx.is_dirty);
        assert!(ctx.tag.is_none());
    }

    #[test]
    fn test_dirty_flag() {
        let repo = make_repo();
        std::fs::write(repo.path().join("new.txt"), "uncommitted").unwrap();
        let ctx = collect_git_context(repo.path(), GIT_WALK_LIMIT);
        assert!(ctx.is_dirty);
    }

    #[test]
    fn test_non_repo_degrades_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = collect_git_context(dir.path(), GIT_WALK_LIMIT);
        assert!(ctx.is_empty());
        assert!(!ctx.is_dirty);
    }

    #[test]
    fn test_walk_up_finds_parent_repo() {
        let repo = make_repo();
        let nested = repo.path().join("a/b/c");
        std::fs::create_dir_all(&nested).unwrap();
        assert!(find_git_root(&nested, 5).is_some());
        // limit too small to reach the repo root
        assert!(find_git_root(&nested, 2).is_none());
    }

    #[test]
    fn test_tag_on_exact_match() {
        let repo = make_repo();
        git(repo.path(), &["tag", "v1.0.0"]);
        let ctx = collect_git_context(repo.path(), GIT_WALK_LIMIT);
        assert_eq!(ctx.tag.as_deref(), Some("v1.0.0"));
    }
}
