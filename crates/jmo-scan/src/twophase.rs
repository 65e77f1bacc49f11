//! Two-phase secret scanner runner.
//!
//! The scanner runs in two phases: `scan` into an on-disk datastore, then
//! `report --format json` out of it. The scratch datastore lives in a
//! temporary directory that is removed on every exit path, including
//! unwind (TempDir cleans up on drop). When the local binary is missing or
//! both phases fail, the runner falls back to an equivalent container
//! invocation through a helper script, provided a container runtime is on
//! PATH. Fallback launches count toward the attempt total.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, warn};

use jmo_core::ToolSpec;

use crate::runner::{run_cmd, tool_exists, ToolOutcome};

/// Helper script used for the container fallback, resolved relative to the
/// working directory.
pub const CONTAINER_HELPER: &str = "scripts/run_noseyparker_docker.sh";

/// Run the two-phase scanner for one target.
pub async fn run_two_phase(
    spec: &ToolSpec,
    target_name: &str,
    target_path: &Path,
    artifact: &Path,
    timeout_secs: u64,
    retries: u32,
) -> ToolOutcome {
    if let Some(parent) = artifact.parent() {
        if let Err(err) = std::fs::create_dir_all(parent) {
            warn!(tool = spec.name, %err, "failed to create artifact directory");
            return ToolOutcome::skipped();
        }
    }

    let timeout = Duration::from_secs(timeout_secs);
    let mut attempts = 0u32;

    if tool_exists(spec.name) {
        let (ok, used) = run_local(spec, target_path, artifact, timeout, retries).await;
        attempts += used;
        if ok {
            return ToolOutcome { ok: true, attempts };
        }
        debug!(
            tool = spec.name,
            target = target_name,
            "local run failed; attempting container fallback"
        );
    } else {
        debug!(
            tool = spec.name,
            target = target_name,
            "local binary not found; attempting container fallback"
        );
    }

    let (ok, used) = run_container(spec, target_path, artifact, timeout, retries).await;
    attempts += used;

    ToolOutcome {
        ok: ok && artifact.exists(),
        attempts: attempts.max(1),
    }
}

/// Local two-phase run against a scratch datastore. Returns
/// (success, launches used).
async fn run_local(
    spec: &ToolSpec,
    target_path: &Path,
    artifact: &Path,
    timeout: Duration,
    retries: u32,
) -> (bool, u32) {
    let datastore_dir = match tempfile::Builder::new().prefix("np-").tempdir() {
        Ok(dir) => dir,
        Err(err) => {
            warn!(tool = spec.name, %err, "failed to create scratch datastore");
            return (false, 0);
        }
    };
    let datastore: PathBuf = datastore_dir.path().join("datastore");

    // Phase 1: scan into the datastore.
    let scan_argv = vec![
        spec.name.to_string(),
        "scan".to_string(),
        "--datastore".to_string(),
        datastore.to_string_lossy().into_owned(),
        target_path.to_string_lossy().into_owned(),
    ];
    let scan = run_cmd(&scan_argv, timeout, retries, false, &[0]).await;
    let mut used = scan.attempts;
    if scan.rc != 0 {
        debug!(tool = spec.name, rc = scan.rc, "scan phase failed");
        return (false, used);
    }

    // Phase 2: report out of the datastore as JSON on stdout.
    let report_argv = vec![
        spec.name.to_string(),
        "report".to_string(),
        "--datastore".to_string(),
        datastore.to_string_lossy().into_owned(),
        "--format".to_string(),
        "json".to_string(),
    ];
    let report = run_cmd(&report_argv, timeout, retries, true, &[0]).await;
    used += report.attempts;
    if report.rc != 0 {
        debug!(tool = spec.name, rc = report.rc, "report phase failed");
        return (false, used);
    }

    if let Err(err) = std::fs::write(artifact, &report.stdout) {
        warn!(tool = spec.name, %err, "failed to write report output");
        return (false, used);
    }
    (true, used)
    // datastore_dir dropped here; scratch state removed on every path
}

/// Container fallback through the helper script. Returns
/// (success, launches used); zero launches when the fallback is unavailable.
async fn run_container(
    spec: &ToolSpec,
    target_path: &Path,
    artifact: &Path,
    timeout: Duration,
    retries: u32,
) -> (bool, u32) {
    let helper = Path::new(CONTAINER_HELPER);
    if !helper.exists() {
        debug!(tool = spec.name, helper = %helper.display(), "container helper not found");
        return (false, 0);
    }
    if !tool_exists("docker") {
        debug!(tool = spec.name, "no container runtime on PATH; cannot fall back");
        return (false, 0);
    }

    let argv = vec![
        "bash".to_string(),
        helper.to_string_lossy().into_owned(),
        "--repo".to_string(),
        target_path.to_string_lossy().into_owned(),
        "--out".to_string(),
        artifact.to_string_lossy().into_owned(),
    ];
    let result = run_cmd(&argv, timeout, retries, false, &[0]).await;
    if result.rc != 0 {
        debug!(tool = spec.name, rc = result.rc, "container fallback failed");
    }
    (result.rc == 0, result.attempts)
}
