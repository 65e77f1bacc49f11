//! `jmo scan`: orchestrate scanners across targets.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Args;
use tracing::{error, info, warn};

use jmo_core::{
    catalog, effective_scan_settings, load_config, CliScanOverrides, Target, TargetKind,
};
use jmo_history::{HistoryDb, StoreScanOptions, ENCRYPTION_KEY_ENV};
use jmo_normalize::{DocumentMeta, FindingsDocument, PipelineOptions};
use jmo_scan::{Orchestrator, ProgressTracker};

use crate::EXIT_CONFIG_ERROR;

#[derive(Args, Clone, Debug)]
pub struct ScanArgs {
    /// Path to a single repository to scan
    #[arg(long)]
    pub repo: Option<PathBuf>,

    /// Directory whose immediate subfolders are repos to scan
    #[arg(long)]
    pub repos_dir: Option<PathBuf>,

    /// File listing repo paths (one per line)
    #[arg(long)]
    pub targets: Option<PathBuf>,

    /// Container image reference (repeatable)
    #[arg(long)]
    pub image: Vec<String>,

    /// File listing image references
    #[arg(long)]
    pub images_file: Option<PathBuf>,

    /// Terraform state/plan file (repeatable)
    #[arg(long)]
    pub terraform_state: Vec<PathBuf>,

    /// CloudFormation template (repeatable)
    #[arg(long)]
    pub cloudformation: Vec<PathBuf>,

    /// Kubernetes manifest (repeatable)
    #[arg(long)]
    pub k8s_manifest: Vec<PathBuf>,

    /// Web endpoint URL (repeatable)
    #[arg(long)]
    pub url: Vec<String>,

    /// File listing URLs
    #[arg(long)]
    pub urls_file: Option<PathBuf>,

    /// OpenAPI/Swagger spec for endpoint scanning
    #[arg(long)]
    pub api_spec: Option<PathBuf>,

    /// GitLab project path (repeatable)
    #[arg(long)]
    pub gitlab_project: Vec<String>,

    /// Kubernetes cluster context (repeatable)
    #[arg(long)]
    pub k8s_context: Vec<String>,

    /// Base results directory
    #[arg(long, default_value = "results")]
    pub results_dir: PathBuf,

    /// Config file
    #[arg(long, default_value = "jmo.yml")]
    pub config: PathBuf,

    /// Override tools list from config
    #[arg(long, num_args = 1..)]
    pub tools: Option<Vec<String>>,

    /// Per-tool timeout seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Concurrent targets to scan
    #[arg(long)]
    pub threads: Option<u32>,

    /// Profile name from config.profiles
    #[arg(long)]
    pub profile_name: Option<String>,

    /// Write empty stub artifacts for missing/failed tools
    #[arg(long)]
    pub allow_missing_tools: bool,

    /// Store the scan in the history database afterwards
    #[arg(long)]
    pub store_history: bool,

    /// History database path
    #[arg(long)]
    pub db: Option<PathBuf>,

    /// Encrypt raw findings at rest (key from JMO_ENCRYPTION_KEY)
    #[arg(long)]
    pub encrypt_findings: bool,

    /// Do not persist raw tool payloads
    #[arg(long)]
    pub no_store_raw_findings: bool,

    /// Record hostname/username in scan provenance
    #[arg(long)]
    pub collect_metadata: bool,
}

/// Materialize targets from the CLI inputs. Missing paths are warned about
/// and skipped, matching fail-soft scanning semantics.
pub fn materialize_targets(args: &ScanArgs) -> Result<Vec<Target>> {
    let mut targets = Vec::new();

    if let Some(repo) = &args.repo {
        if repo.exists() {
            targets.push(Target::new(TargetKind::Repo, repo.to_string_lossy()));
        } else {
            warn!(path = %repo.display(), "repository path not found");
        }
    }
    if let Some(repos_dir) = &args.repos_dir {
        match std::fs::read_dir(repos_dir) {
            Ok(entries) => {
                let mut repos: Vec<PathBuf> = entries
                    .filter_map(|e| e.ok())
                    .map(|e| e.path())
                    .filter(|p| p.is_dir())
                    .collect();
                repos.sort();
                for repo in repos {
                    targets.push(Target::new(TargetKind::Repo, repo.to_string_lossy()));
                }
            }
            Err(_) => warn!(path = %repos_dir.display(), "repositories directory not found"),
        }
    }
    if let Some(list) = &args.targets {
        for line in read_lines(list)? {
            let path = PathBuf::from(&line);
            if path.exists() {
                targets.push(Target::new(TargetKind::Repo, line));
            } else {
                warn!(path = %line, "target repository path not found");
            }
        }
    }

    for image in &args.image {
        targets.push(Target::new(TargetKind::Image, image));
    }
    if let Some(file) = &args.images_file {
        for line in read_lines(file)? {
            targets.push(Target::new(TargetKind::Image, line));
        }
    }

    for iac in args.terraform_state.iter().chain(&args.cloudformation) {
        targets.push(Target::new(TargetKind::Iac, iac.to_string_lossy()));
    }
    for manifest in &args.k8s_manifest {
        targets.push(Target::new(TargetKind::Iac, manifest.to_string_lossy()));
    }

    for url in &args.url {
        targets.push(Target::new(TargetKind::Url, url));
    }
    if let Some(file) = &args.urls_file {
        for line in read_lines(file)? {
            targets.push(Target::new(TargetKind::Url, line));
        }
    }
    if let Some(spec) = &args.api_spec {
        targets.push(Target::new(TargetKind::Url, spec.to_string_lossy()));
    }

    for project in &args.gitlab_project {
        targets.push(Target::new(TargetKind::Gitlab, project));
    }
    for context in &args.k8s_context {
        targets.push(Target::new(TargetKind::K8s, context));
    }

    Ok(targets)
}

fn read_lines(path: &Path) -> Result<Vec<String>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}

/// Install the cooperative stop flag: the first interrupt/terminate sets
/// it and lets in-flight work drain; the second terminates immediately.
fn install_signal_handler(cancel: Arc<AtomicBool>) {
    tokio::spawn(async move {
        wait_for_signal().await;
        warn!("signal received; finishing in-flight jobs then stopping");
        cancel.store(true, Ordering::Relaxed);
        wait_for_signal().await;
        std::process::exit(130);
    });
}

async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = match signal(SignalKind::terminate()) {
            Ok(term) => term,
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = term.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

pub async fn run(args: ScanArgs) -> Result<i32> {
    let started = Instant::now();

    let cfg = load_config(Some(&args.config));
    let overrides = CliScanOverrides {
        tools: args.tools.clone(),
        threads: args.threads,
        timeout: args.timeout,
        profile: args.profile_name.clone(),
    };
    let settings = effective_scan_settings(&cfg, &overrides);

    // Unknown tool names fail fast, before any scanning starts.
    if let Err(err) = catalog::global().validate_selection(settings.tools.iter().map(String::as_str))
    {
        error!("{err}");
        return Ok(EXIT_CONFIG_ERROR);
    }
    if args.encrypt_findings && std::env::var(ENCRYPTION_KEY_ENV).is_err() {
        error!("--encrypt-findings requires {ENCRYPTION_KEY_ENV} to be set");
        return Ok(EXIT_CONFIG_ERROR);
    }

    let targets = materialize_targets(&args)?;
    if targets.is_empty() {
        warn!("no targets to scan");
        return Ok(0);
    }

    let cancel = Arc::new(AtomicBool::new(false));
    install_signal_handler(Arc::clone(&cancel));

    let orchestrator = Orchestrator::new(
        settings.clone(),
        args.results_dir.clone(),
        args.allow_missing_tools,
    );
    let filtered = orchestrator.filter_targets(&targets);
    let progress = Arc::new(ProgressTracker::new(filtered.len()));
    let report = orchestrator.run(&targets, cancel, progress).await?;

    let duration = started.elapsed().as_secs_f64();
    info!(
        jobs = report.jobs.len(),
        interrupted = report.interrupted,
        duration_seconds = format!("{duration:.1}"),
        "scan complete"
    );

    if args.store_history && !report.interrupted {
        store_history(&args, &settings.tools, &settings.profile_name, duration).await?;
    }

    Ok(report.exit_code())
}

/// Aggregate the artifacts just written and persist the scan.
async fn store_history(
    args: &ScanArgs,
    tools: &[String],
    profile_name: &str,
    duration_seconds: f64,
) -> Result<()> {
    let opts = PipelineOptions::default();
    let output = jmo_normalize::gather_results(&args.results_dir, &opts).await?;

    let meta = DocumentMeta::new(
        profile_name,
        tools.to_vec(),
        jmo_core::layout::collect_targets(&args.results_dir).len(),
        output.findings.len(),
    );
    FindingsDocument::new(meta, output.findings)
        .write(&jmo_core::layout::findings_json_path(&args.results_dir))?;

    // the store constrains profiles to the canonical trio
    let profile = match profile_name {
        "fast" | "balanced" | "deep" => profile_name,
        _ => "balanced",
    };
    let db_path = args
        .db
        .clone()
        .unwrap_or_else(jmo_history::default_db_path);
    let mut store_opts = StoreScanOptions::new(&args.results_dir, profile, tools.to_vec());
    store_opts.duration_seconds = Some(duration_seconds);
    store_opts.collect_metadata = args.collect_metadata;
    store_opts.store_raw = !args.no_store_raw_findings;
    if args.encrypt_findings {
        store_opts.encryption_key = std::env::var(ENCRYPTION_KEY_ENV).ok();
    }

    let mut db = HistoryDb::open(&db_path)?;
    let scan_id = db.store_scan(&store_opts)?;
    info!(scan_id = %scan_id, db = %db_path.display(), "scan stored in history");
    Ok(())
}
