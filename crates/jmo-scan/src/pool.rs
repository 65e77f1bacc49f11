//! Bounded worker pool fanning out per-target scan jobs.
//!
//! One tokio task per target, gated by a semaphore sized to the resolved
//! thread count. Tools within a job run sequentially in the configured
//! order. A shared stop flag provides cooperative cancellation: in-flight
//! subprocesses finish, no new jobs or tools are dispatched.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

use jmo_core::{catalog, layout, ScanSettings, Target};

use crate::error::{Result, ScanError};
use crate::progress::{JobUpdate, ProgressTracker};
use crate::runner::run_tool;
use crate::stub::write_stub;

/// Per-target result: tool statuses and attempt counts.
#[derive(Debug, Clone)]
pub struct JobResult {
    pub target_name: String,
    pub statuses: BTreeMap<String, bool>,
    pub attempts: BTreeMap<String, u32>,
}

impl JobResult {
    /// True when every tool for this target succeeded (or was masked).
    pub fn all_ok(&self) -> bool {
        self.statuses.values().all(|ok| *ok)
    }
}

/// Aggregated orchestrator outcome.
#[derive(Debug, Default)]
pub struct ScanReport {
    pub jobs: Vec<JobResult>,
    /// True when cancellation stopped the scan before all jobs dispatched.
    pub interrupted: bool,
}

impl ScanReport {
    /// Process exit code: 0 on complete success, 1 when any job reported a
    /// tool failure not masked by `allow_missing_tools`.
    pub fn exit_code(&self) -> i32 {
        if self.jobs.iter().all(JobResult::all_ok) {
            0
        } else {
            1
        }
    }
}

/// The scan orchestrator.
#[derive(Debug, Clone)]
pub struct Orchestrator {
    pub settings: ScanSettings,
    pub results_dir: PathBuf,
    pub allow_missing_tools: bool,
}

impl Orchestrator {
    pub fn new(settings: ScanSettings, results_dir: PathBuf, allow_missing_tools: bool) -> Self {
        Orchestrator {
            settings,
            results_dir,
            allow_missing_tools,
        }
    }

    /// Filter targets through the include/exclude glob patterns, matched
    /// against the target display name.
    pub fn filter_targets(&self, targets: &[Target]) -> Vec<Target> {
        targets
            .iter()
            .filter(|t| {
                let name = t.name();
                let included = self.settings.include.is_empty()
                    || self
                        .settings
                        .include
                        .iter()
                        .any(|pat| glob_match(pat, &name));
                let excluded = self
                    .settings
                    .exclude
                    .iter()
                    .any(|pat| glob_match(pat, &name));
                included && !excluded
            })
            .cloned()
            .collect()
    }

    /// Execute every applicable (target, tool) pair.
    ///
    /// `cancel` is the cooperative stop flag: once set, no new jobs are
    /// dispatched and running jobs skip their remaining tools.
    pub async fn run(
        &self,
        targets: &[Target],
        cancel: Arc<AtomicBool>,
        progress: Arc<ProgressTracker>,
    ) -> Result<ScanReport> {
        let targets = self.filter_targets(targets);
        if targets.is_empty() {
            warn!("no targets to scan");
            return Ok(ScanReport::default());
        }

        let max_workers = self.settings.max_workers();
        info!(
            targets = targets.len(),
            workers = max_workers,
            tools = ?self.settings.tools,
            "starting scan"
        );

        let semaphore = Arc::new(Semaphore::new(max_workers));
        let mut join_set: JoinSet<JobResult> = JoinSet::new();
        let mut interrupted = false;

        for target in targets {
            if cancel.load(Ordering::Relaxed) {
                info!("stop flag set; not dispatching further jobs");
                interrupted = true;
                break;
            }
            let permit_source = Arc::clone(&semaphore);
            let cancel = Arc::clone(&cancel);
            let progress = Arc::clone(&progress);
            let orchestrator = self.clone();

            join_set.spawn(async move {
                let _permit = permit_source
                    .acquire_owned()
                    .await
                    .expect("semaphore closed");
                orchestrator.run_job(&target, &cancel, &progress).await
            });
        }

        let mut jobs = Vec::new();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(job) => {
                    let ok = job.all_ok();
                    let retried: BTreeMap<_, _> = job
                        .attempts
                        .iter()
                        .filter(|(_, n)| **n > 1)
                        .map(|(t, n)| (t.clone(), *n))
                        .collect();
                    if ok {
                        info!(target = %job.target_name, statuses = ?job.statuses, retries = ?retried, "scanned");
                    } else {
                        warn!(target = %job.target_name, statuses = ?job.statuses, retries = ?retried, "scanned with issues");
                    }
                    jobs.push(job);
                }
                Err(err) => return Err(ScanError::Join(err.to_string())),
            }
        }

        interrupted = interrupted || cancel.load(Ordering::Relaxed);
        Ok(ScanReport { jobs, interrupted })
    }

    /// Scan one target with every configured tool, sequentially.
    async fn run_job(
        &self,
        target: &Target,
        cancel: &AtomicBool,
        progress: &ProgressTracker,
    ) -> JobResult {
        let started = Instant::now();
        let name = target.name();
        let mut statuses = BTreeMap::new();
        let mut attempts = BTreeMap::new();

        // The job owns its output directory; no two jobs share one.
        let out_dir = layout::target_dir(&self.results_dir, target);
        if let Err(err) = std::fs::create_dir_all(&out_dir) {
            warn!(target = %name, %err, "failed to create target output directory");
        }

        for tool_name in &self.settings.tools {
            if cancel.load(Ordering::Relaxed) {
                break;
            }
            let Some(spec) = catalog::global().get(tool_name) else {
                warn!(tool = %tool_name, "unknown tool in configuration; skipping");
                continue;
            };
            if !spec.accepts(target.kind) {
                continue;
            }

            let artifact = layout::artifact_path(&self.results_dir, target, tool_name);
            let outcome = run_tool(
                spec,
                &name,
                std::path::Path::new(&target.identifier),
                &artifact,
                self.settings.tool_timeout(tool_name),
                self.settings.retries,
                self.settings.tool_flags(tool_name),
            )
            .await;

            if outcome.attempts > 0 {
                attempts.insert(tool_name.clone(), outcome.attempts);
            }

            if outcome.ok {
                statuses.insert(tool_name.clone(), true);
            } else if self.allow_missing_tools {
                // Masked: write a schema-valid stub so downstream iteration
                // stays uniform, and report the tool as OK.
                if let Err(err) = write_stub(spec, &artifact) {
                    warn!(tool = %tool_name, target = %name, %err, "failed to write stub artifact");
                    statuses.insert(tool_name.clone(), false);
                } else {
                    warn!(tool = %tool_name, target = %name, "tool skipped or failed; stub created");
                    statuses.insert(tool_name.clone(), true);
                }
            } else {
                statuses.insert(tool_name.clone(), false);
            }
        }

        let ok = statuses.values().all(|v| *v);
        let elapsed = started.elapsed().as_secs_f64();
        let (done, total) = progress.record(JobUpdate {
            kind: target.kind,
            name: name.clone(),
            elapsed_secs: if ok { elapsed } else { -elapsed },
        });
        info!(target = %name, done, total, eta = ?progress.eta_seconds(), "job complete");

        JobResult {
            target_name: name,
            statuses,
            attempts,
        }
    }
}

fn glob_match(pattern: &str, name: &str) -> bool {
    glob::Pattern::new(pattern)
        .map(|p| p.matches(name))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use jmo_core::{
        effective_scan_settings_with_env, CliScanOverrides, Config, TargetKind,
    };

    fn settings(tools: &[&str]) -> ScanSettings {
        let cli = CliScanOverrides {
            tools: Some(tools.iter().map(|s| s.to_string()).collect()),
            threads: Some(2),
            ..Default::default()
        };
        effective_scan_settings_with_env(&Config::default(), &cli, None)
    }

    fn repo_target(dir: &std::path::Path, name: &str) -> Target {
        let path = dir.join(name);
        std::fs::create_dir_all(&path).unwrap();
        Target::new(TargetKind::Repo, path.to_string_lossy())
    }

    #[tokio::test]
    async fn test_allow_missing_tools_masks_and_writes_stubs() {
        let work = tempfile::tempdir().unwrap();
        let results = work.path().join("results");
        let target = repo_target(work.path(), "app");

        let orch = Orchestrator::new(settings(&["gitleaks", "semgrep"]), results.clone(), true);
        let progress = Arc::new(ProgressTracker::new(1));
        let report = orch
            .run(&[target], Arc::new(AtomicBool::new(false)), progress)
            .await
            .unwrap();

        assert_eq!(report.exit_code(), 0);
        assert_eq!(report.jobs.len(), 1);
        assert!(report.jobs[0].all_ok());
        // stub artifacts exist for the whole tool list
        assert!(results.join("individual-repos/app/gitleaks.json").exists());
        assert!(results.join("individual-repos/app/semgrep.json").exists());
    }

    #[tokio::test]
    async fn test_missing_tools_fail_without_masking() {
        if crate::runner::tool_exists("gitleaks") {
            return;
        }
        let work = tempfile::tempdir().unwrap();
        let target = repo_target(work.path(), "app");
        let orch = Orchestrator::new(
            settings(&["gitleaks"]),
            work.path().join("results"),
            false,
        );
        let progress = Arc::new(ProgressTracker::new(1));
        let report = orch
            .run(&[target], Arc::new(AtomicBool::new(false)), progress)
            .await
            .unwrap();
        assert_eq!(report.exit_code(), 1);
        assert!(!report.jobs[0].statuses["gitleaks"]);
    }

    #[tokio::test]
    async fn test_cancel_before_dispatch_runs_nothing() {
        let work = tempfile::tempdir().unwrap();
        let targets = vec![
            repo_target(work.path(), "a"),
            repo_target(work.path(), "b"),
        ];
        let orch = Orchestrator::new(settings(&["semgrep"]), work.path().join("results"), true);
        let cancel = Arc::new(AtomicBool::new(true));
        let progress = Arc::new(ProgressTracker::new(targets.len()));
        let report = orch.run(&targets, cancel, progress).await.unwrap();
        assert!(report.interrupted);
        assert!(report.jobs.is_empty());
        assert_eq!(report.exit_code(), 0);
    }

    #[test]
    fn test_include_exclude_filters() {
        let mut s = settings(&["semgrep"]);
        s.include = vec!["app-*".to_string()];
        s.exclude = vec!["app-legacy".to_string()];
        let orch = Orchestrator::new(s, PathBuf::from("results"), true);

        let targets = vec![
            Target::new(TargetKind::Repo, "/src/app-web"),
            Target::new(TargetKind::Repo, "/src/app-legacy"),
            Target::new(TargetKind::Repo, "/src/other"),
        ];
        let filtered = orch.filter_targets(&targets);
        let names: Vec<String> = filtered.iter().map(Target::name).collect();
        assert_eq!(names, vec!["app-web"]);
    }

    #[tokio::test]
    async fn test_tools_not_applicable_to_kind_are_skipped() {
        let work = tempfile::tempdir().unwrap();
        let results = work.path().join("results");
        // bandit only applies to repos; an image target should skip it
        let target = Target::new(TargetKind::Image, "nginx:latest");
        let orch = Orchestrator::new(settings(&["bandit"]), results.clone(), true);
        let progress = Arc::new(ProgressTracker::new(1));
        let report = orch
            .run(&[target], Arc::new(AtomicBool::new(false)), progress)
            .await
            .unwrap();
        assert!(report.jobs[0].statuses.is_empty());
        assert!(!results
            .join("individual-images/nginx_latest/bandit.json")
            .exists());
    }

    #[tokio::test]
    async fn test_many_targets_bounded_pool() {
        let work = tempfile::tempdir().unwrap();
        let targets: Vec<Target> = (0..12)
            .map(|i| repo_target(work.path(), &format!("repo-{i}")))
            .collect();
        let orch = Orchestrator::new(settings(&["semgrep"]), work.path().join("results"), true);
        let progress = Arc::new(ProgressTracker::new(targets.len()));
        let report = orch
            .run(&targets, Arc::new(AtomicBool::new(false)), Arc::clone(&progress))
            .await
            .unwrap();
        assert_eq!(report.jobs.len(), 12);
        assert_eq!(progress.completed(), 12);
        assert_eq!(report.exit_code(), 0);
    }
}
