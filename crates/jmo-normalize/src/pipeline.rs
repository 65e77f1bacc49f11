//! The aggregation pipeline.
//!
//! Walks every `individual-*` subtree under the results directory, parses
//! each `<tool>.json` artifact through its adapter on a bounded worker
//! pool, then applies suppressions and cross-tool clustering. Adapters are
//! pure and share no state; the only shared state is the finding
//! accumulator behind a mutex.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info};

use jmo_core::{layout, CommonFinding, TargetKind};

use crate::adapters::parse_artifact;
use crate::cluster::cluster_findings;
use crate::error::{NormalizeError, Result};
use crate::profiling::{JobTiming, ProfilingContext};
use crate::suppress::{discover_suppress_file, filter_suppressed, load_suppressions};

/// Pipeline configuration.
pub struct PipelineOptions {
    /// Bounded parse-worker count.
    pub threads: usize,
    /// Explicit suppressions file; `None` triggers discovery.
    pub suppress_file: Option<PathBuf>,
    /// Profiling accumulator (disabled context when profiling is off).
    pub profiling: Arc<ProfilingContext>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        PipelineOptions {
            threads: 4,
            suppress_file: None,
            profiling: Arc::new(ProfilingContext::new(false)),
        }
    }
}

/// Pipeline result: retained findings plus suppressed fingerprints for the
/// suppression report.
#[derive(Debug, Default)]
pub struct PipelineOutput {
    pub findings: Vec<CommonFinding>,
    pub suppressed_ids: Vec<String>,
}

/// One artifact on disk awaiting parsing.
#[derive(Debug, Clone)]
struct ArtifactRef {
    target: String,
    tool: String,
    path: PathBuf,
}

fn enumerate_artifacts(results_dir: &Path) -> Vec<ArtifactRef> {
    let mut artifacts = Vec::new();
    for kind in TargetKind::all() {
        let root = layout::kind_root(results_dir, kind);
        let Ok(targets) = std::fs::read_dir(&root) else {
            continue;
        };
        for target_entry in targets.filter_map(|e| e.ok()) {
            if !target_entry.path().is_dir() {
                continue;
            }
            let target = target_entry.file_name().to_string_lossy().into_owned();
            let Ok(files) = std::fs::read_dir(target_entry.path()) else {
                continue;
            };
            for file in files.filter_map(|e| e.ok()) {
                let path = file.path();
                if path.extension().map(|e| e == "json").unwrap_or(false) {
                    let tool = path
                        .file_stem()
                        .map(|s| s.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    artifacts.push(ArtifactRef {
                        target: target.clone(),
                        tool,
                        path,
                    });
                }
            }
        }
    }
    artifacts.sort_by(|a, b| (&a.target, &a.tool).cmp(&(&b.target, &b.tool)));
    artifacts
}

/// Walk the results directory and produce the normalized, deduplicated
/// finding collection.
pub async fn gather_results(results_dir: &Path, opts: &PipelineOptions) -> Result<PipelineOutput> {
    let artifacts = enumerate_artifacts(results_dir);
    info!(artifacts = artifacts.len(), "aggregating tool outputs");

    let accumulator: Arc<Mutex<Vec<CommonFinding>>> = Arc::new(Mutex::new(Vec::new()));
    let semaphore = Arc::new(Semaphore::new(opts.threads.max(1)));
    let mut join_set: JoinSet<()> = JoinSet::new();

    for artifact in artifacts {
        let accumulator = Arc::clone(&accumulator);
        let semaphore = Arc::clone(&semaphore);
        let profiling = Arc::clone(&opts.profiling);

        join_set.spawn(async move {
            let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
            let started = Instant::now();
            let parsed = tokio::task::spawn_blocking(move || {
                let bytes = std::fs::read(&artifact.path).unwrap_or_default();
                let findings = parse_artifact(&artifact.tool, &artifact.target, &bytes);
                (artifact, findings)
            })
            .await;

            if let Ok((artifact, findings)) = parsed {
                debug!(
                    target = %artifact.target,
                    tool = %artifact.tool,
                    count = findings.len(),
                    "parsed artifact"
                );
                profiling.record(JobTiming {
                    target: artifact.target,
                    tool: artifact.tool,
                    seconds: started.elapsed().as_secs_f64(),
                    findings: findings.len(),
                });
                accumulator
                    .lock()
                    .expect("accumulator lock poisoned")
                    .extend(findings);
            }
        });
    }

    while let Some(joined) = join_set.join_next().await {
        joined.map_err(|e| NormalizeError::Join(e.to_string()))?;
    }

    let raw_findings = Arc::try_unwrap(accumulator)
        .map_err(|_| NormalizeError::Join("accumulator still shared".to_string()))?
        .into_inner()
        .expect("accumulator lock poisoned");

    // Suppressions, then cross-tool clustering.
    let suppress_path = opts
        .suppress_file
        .clone()
        .or_else(|| discover_suppress_file(results_dir));
    let (retained, suppressed_ids) = match load_suppressions(suppress_path.as_deref()) {
        Some(suppressions) => filter_suppressed(raw_findings, &suppressions),
        None => (raw_findings, Vec::new()),
    };
    let mut findings = cluster_findings(retained);

    // Stable output ordering: severity descending, then path, then rule.
    findings.sort_by(|a, b| {
        b.severity
            .cmp(&a.severity)
            .then_with(|| a.location.path.cmp(&b.location.path))
            .then_with(|| a.rule_id.cmp(&b.rule_id))
    });

    info!(
        findings = findings.len(),
        suppressed = suppressed_ids.len(),
        "aggregation complete"
    );
    Ok(PipelineOutput {
        findings,
        suppressed_ids,
    })
}
