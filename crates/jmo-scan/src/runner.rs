//! Per-tool subprocess runner.
//!
//! Contract for each (target, tool) pair: evaluate the pre-check, locate
//! the binary, build the argument vector (no shell interpretation), run the
//! subprocess under its timeout, interpret the exit code against the tool's
//! `ok_rcs` set, and retry failures with backoff `min(1s × attempt, 3s)`.
//! Success additionally requires the artifact file to exist on disk.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, warn};

use jmo_core::ToolSpec;

use crate::twophase;

/// Synthetic exit code reported when a subprocess exceeds its timeout.
pub const TIMEOUT_RC: i32 = 124;

/// Outcome of one tool invocation for one target.
#[derive(Debug, Clone, Default)]
pub struct ToolOutcome {
    /// Exit code in `ok_rcs` AND artifact present on disk.
    pub ok: bool,
    /// Process launches performed, across retries and fallback. Zero when
    /// the tool was skipped before any execution.
    pub attempts: u32,
}

impl ToolOutcome {
    pub fn skipped() -> Self {
        ToolOutcome {
            ok: false,
            attempts: 0,
        }
    }
}

/// Result of a subprocess run (after retries).
#[derive(Debug)]
pub(crate) struct CmdResult {
    pub rc: i32,
    pub stdout: String,
    #[allow(dead_code)]
    pub stderr: String,
    pub attempts: u32,
}

/// Check whether a binary is reachable through `PATH`.
pub fn tool_exists(name: &str) -> bool {
    let Some(paths) = std::env::var_os("PATH") else {
        return false;
    };
    std::env::split_paths(&paths).any(|dir| is_executable(&dir.join(name)))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

fn backoff(attempt: u32) -> Duration {
    Duration::from_secs_f64((attempt as f64).min(3.0))
}

/// Run a command with timeout and retries.
///
/// The argument vector is executed directly; no shell is involved. Stdout
/// is captured only when `capture_stdout` is set; stderr is always captured
/// for diagnostics. A timeout kills the child and reports [`TIMEOUT_RC`].
pub(crate) async fn run_cmd(
    argv: &[String],
    timeout: Duration,
    retries: u32,
    capture_stdout: bool,
    ok_rcs: &[i32],
) -> CmdResult {
    debug_assert!(!argv.is_empty());
    let max_attempts = retries + 1;
    let mut last = CmdResult {
        rc: 1,
        stdout: String::new(),
        stderr: String::new(),
        attempts: 0,
    };

    for attempt in 1..=max_attempts {
        last.attempts = attempt;
        match run_once(argv, timeout, capture_stdout).await {
            Ok((rc, stdout, stderr)) => {
                last.rc = rc;
                last.stdout = stdout;
                last.stderr = stderr;
                if ok_rcs.contains(&rc) || attempt == max_attempts {
                    return last;
                }
            }
            Err(err) => {
                debug!(tool = %argv[0], attempt, %err, "spawn failed");
                last.rc = 1;
                last.stderr = err.to_string();
                if attempt == max_attempts {
                    return last;
                }
            }
        }
        tokio::time::sleep(backoff(attempt)).await;
    }
    last
}

async fn run_once(
    argv: &[String],
    timeout: Duration,
    capture_stdout: bool,
) -> std::io::Result<(i32, String, String)> {
    let mut cmd = Command::new(&argv[0]);
    cmd.args(&argv[1..])
        .stdin(Stdio::null())
        .stdout(if capture_stdout {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = cmd.spawn()?;
    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(output) => {
            let output = output?;
            let rc = output.status.code().unwrap_or(-1);
            Ok((
                rc,
                String::from_utf8_lossy(&output.stdout).into_owned(),
                String::from_utf8_lossy(&output.stderr).into_owned(),
            ))
        }
        // kill_on_drop reaps the child when the future is dropped here
        Err(_elapsed) => Ok((TIMEOUT_RC, String::new(), String::new())),
    }
}

/// Execute one tool against one target, writing its artifact.
///
/// `target_path` is the tool-facing identifier (filesystem path, image
/// reference, …); `artifact` is where the JSON output must land.
pub async fn run_tool(
    spec: &ToolSpec,
    target_name: &str,
    target_path: &Path,
    artifact: &Path,
    timeout_secs: u64,
    retries: u32,
    flags: &[String],
) -> ToolOutcome {
    // 1. Pre-check: a required file must exist inside the target.
    if let Some(pre_check) = spec.pre_check {
        let required = pre_check(target_path);
        if !required.exists() {
            warn!(
                tool = spec.name,
                target = target_name,
                required = %required.display(),
                "pre-check failed; skipping tool"
            );
            return ToolOutcome::skipped();
        }
    }

    if spec.two_phase {
        return twophase::run_two_phase(spec, target_name, target_path, artifact, timeout_secs, retries)
            .await;
    }

    // 2. Binary lookup.
    if !tool_exists(spec.name) {
        warn!(tool = spec.name, target = target_name, "binary not found in PATH; skipping tool");
        return ToolOutcome::skipped();
    }

    if let Some(parent) = artifact.parent() {
        if let Err(err) = std::fs::create_dir_all(parent) {
            warn!(tool = spec.name, %err, "failed to create artifact directory");
            return ToolOutcome::skipped();
        }
    }

    // 3-5. Build argv, execute with timeout/retries, interpret exit code.
    let argv = (spec.build_argv)(target_path, artifact, flags);
    let timeout = Duration::from_secs(timeout_secs);
    let result = run_cmd(&argv, timeout, retries, spec.capture_stdout, spec.ok_rcs).await;

    if spec.capture_stdout && !result.stdout.is_empty() {
        if let Err(err) = std::fs::write(artifact, &result.stdout) {
            warn!(tool = spec.name, target = target_name, %err, "failed to write captured stdout");
        }
    }

    // 6. Success requires both the exit code and the artifact on disk.
    let rc_ok = spec.rc_ok(result.rc);
    let artifact_exists = artifact.exists();
    let ok = rc_ok && artifact_exists;

    if !ok {
        warn!(
            tool = spec.name,
            target = target_name,
            rc = result.rc,
            artifact_exists,
            attempts = result.attempts,
            "tool execution failed"
        );
    }

    ToolOutcome {
        ok,
        attempts: result.attempts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_run_cmd_captures_stdout() {
        let res = run_cmd(
            &argv(&["echo", "hello"]),
            Duration::from_secs(5),
            0,
            true,
            &[0],
        )
        .await;
        assert_eq!(res.rc, 0);
        assert_eq!(res.attempts, 1);
        assert!(res.stdout.contains("hello"));
    }

    #[tokio::test]
    async fn test_run_cmd_retries_until_exhausted() {
        let res = run_cmd(&argv(&["false"]), Duration::from_secs(5), 2, false, &[0]).await;
        assert_eq!(res.attempts, 3);
        assert_ne!(res.rc, 0);
    }

    #[tokio::test]
    async fn test_run_cmd_nonzero_in_ok_set_is_success_first_try() {
        let res = run_cmd(&argv(&["false"]), Duration::from_secs(5), 3, false, &[0, 1]).await;
        assert_eq!(res.attempts, 1);
        assert_eq!(res.rc, 1);
    }

    #[tokio::test]
    async fn test_run_cmd_timeout_reports_124() {
        let res = run_cmd(
            &argv(&["sleep", "5"]),
            Duration::from_millis(100),
            0,
            false,
            &[0],
        )
        .await;
        assert_eq!(res.rc, TIMEOUT_RC);
    }

    #[tokio::test]
    async fn test_run_cmd_missing_binary() {
        let res = run_cmd(
            &argv(&["definitely-not-a-binary-xyz"]),
            Duration::from_secs(1),
            1,
            false,
            &[0],
        )
        .await;
        assert_eq!(res.attempts, 2);
        assert_ne!(res.rc, 0);
    }

    #[test]
    fn test_tool_exists_for_common_binaries() {
        assert!(tool_exists("sh"));
        assert!(!tool_exists("definitely-not-a-binary-xyz"));
    }

    #[test]
    fn test_backoff_caps_at_three_seconds() {
        assert_eq!(backoff(1), Duration::from_secs(1));
        assert_eq!(backoff(2), Duration::from_secs(2));
        assert_eq!(backoff(3), Duration::from_secs(3));
        assert_eq!(backoff(10), Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_run_tool_missing_binary_is_skip() {
        let spec = jmo_core::catalog::global().get("gitleaks").unwrap();
        let dir = tempfile::tempdir().unwrap();
        // gitleaks is not installed in the test environment
        if tool_exists("gitleaks") {
            return;
        }
        let outcome = run_tool(
            spec,
            "repo",
            dir.path(),
            &dir.path().join("gitleaks.json"),
            5,
            0,
            &[],
        )
        .await;
        assert!(!outcome.ok);
        assert_eq!(outcome.attempts, 0);
    }

    #[tokio::test]
    async fn test_run_tool_pre_check_skip() {
        let spec = jmo_core::catalog::global().get("hadolint").unwrap();
        let dir = tempfile::tempdir().unwrap();
        // no Dockerfile in the target
        let outcome = run_tool(
            spec,
            "repo",
            dir.path(),
            &dir.path().join("hadolint.json"),
            5,
            0,
            &[],
        )
        .await;
        assert!(!outcome.ok);
        assert_eq!(outcome.attempts, 0);
    }
}
