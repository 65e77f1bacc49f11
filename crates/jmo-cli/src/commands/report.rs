//! `jmo report`: aggregate findings, write the normalized document, and
//! apply the severity threshold.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use clap::Args;
use serde_json::json;
use tracing::{error, info};

use jmo_core::{load_config, Severity, SEVERITY_ORDER};
use jmo_normalize::{DocumentMeta, FindingsDocument, PipelineOptions, ProfilingContext};

use crate::EXIT_CONFIG_ERROR;

#[derive(Args, Clone, Debug)]
pub struct ReportArgs {
    /// Directory with individual-* tool outputs
    #[arg(value_name = "RESULTS_DIR")]
    pub results_dir_pos: Option<PathBuf>,

    /// Directory with individual-* tool outputs (optional form)
    #[arg(long = "results-dir")]
    pub results_dir_opt: Option<PathBuf>,

    /// Output directory (default: <results_dir>/summaries)
    #[arg(long)]
    pub out: Option<PathBuf>,

    /// Config file
    #[arg(long, default_value = "jmo.yml")]
    pub config: PathBuf,

    /// Severity threshold for a non-zero exit (CRITICAL..INFO)
    #[arg(long)]
    pub fail_on: Option<String>,

    /// Collect per-artifact timings into timings.json
    #[arg(long)]
    pub profile: bool,

    /// Override worker threads for aggregation
    #[arg(long)]
    pub threads: Option<u32>,

    /// Accepted for symmetry with scan; reporting tolerates missing tool
    /// outputs by default
    #[arg(long)]
    pub allow_missing_tools: bool,
}

/// Exit code from the threshold: 1 when any finding at or above the
/// threshold severity exists.
pub fn fail_code(threshold: Option<Severity>, counts: &BTreeMap<Severity, usize>) -> i32 {
    let Some(threshold) = threshold else {
        return 0;
    };
    let triggered = SEVERITY_ORDER
        .iter()
        .take_while(|sev| **sev >= threshold)
        .any(|sev| counts.get(sev).copied().unwrap_or(0) > 0);
    if triggered {
        1
    } else {
        0
    }
}

fn severity_counts(findings: &[jmo_core::CommonFinding]) -> BTreeMap<Severity, usize> {
    let mut counts = BTreeMap::new();
    for finding in findings {
        *counts.entry(finding.severity).or_insert(0) += 1;
    }
    counts
}

fn write_summary_md(
    path: &std::path::Path,
    counts: &BTreeMap<Severity, usize>,
    findings: &[jmo_core::CommonFinding],
) -> Result<()> {
    let mut out = String::from("# Security Findings Summary\n\n");
    out.push_str("| Severity | Count |\n|---|---|\n");
    for severity in SEVERITY_ORDER {
        out.push_str(&format!(
            "| {severity} | {} |\n",
            counts.get(&severity).copied().unwrap_or(0)
        ));
    }
    out.push_str(&format!("\nTotal findings: {}\n", findings.len()));
    if !findings.is_empty() {
        out.push_str("\n## Top findings\n\n");
        for finding in findings.iter().take(20) {
            out.push_str(&format!(
                "- **{}** `{}` {} ({})\n",
                finding.severity,
                finding.rule_id,
                finding.location.path,
                finding.tool.name
            ));
        }
    }
    std::fs::write(path, out)?;
    Ok(())
}

pub async fn run(args: ReportArgs) -> Result<i32> {
    let cfg = load_config(Some(&args.config));

    let Some(results_dir) = args
        .results_dir_opt
        .clone()
        .or_else(|| args.results_dir_pos.clone())
    else {
        error!("results_dir not provided: pass it positionally or with --results-dir");
        return Ok(EXIT_CONFIG_ERROR);
    };

    let threshold = match &args.fail_on {
        Some(raw) => match raw.parse::<Severity>() {
            Ok(sev) => Some(sev),
            Err(_) => {
                error!("invalid --fail-on severity: {raw}");
                return Ok(EXIT_CONFIG_ERROR);
            }
        },
        None => cfg.fail_on,
    };

    let out_dir = args
        .out
        .clone()
        .unwrap_or_else(|| results_dir.join("summaries"));
    std::fs::create_dir_all(&out_dir)?;

    // Profiling comes from the flag or the JMO_PROFILE environment toggle.
    let profiling_enabled = args.profile
        || std::env::var("JMO_PROFILE")
            .map(|v| !v.is_empty() && v != "0")
            .unwrap_or(false);
    let profiling = Arc::new(ProfilingContext::new(profiling_enabled));

    let threads = args
        .threads
        .map(|n| n.max(1) as usize)
        .unwrap_or_else(|| {
            jmo_core::effective_scan_settings(&cfg, &Default::default()).max_workers()
        });

    let started = Instant::now();
    let opts = PipelineOptions {
        threads,
        suppress_file: None,
        profiling: Arc::clone(&profiling),
    };
    let output = jmo_normalize::gather_results(&results_dir, &opts).await?;
    let elapsed = started.elapsed().as_secs_f64();

    let counts = severity_counts(&output.findings);
    let mut tools: Vec<String> = output
        .findings
        .iter()
        .map(|f| f.tool.name.clone())
        .collect();
    tools.sort();
    tools.dedup();
    let meta = DocumentMeta::new(
        cfg.default_profile.as_deref().unwrap_or("balanced"),
        tools,
        jmo_core::layout::collect_targets(&results_dir).len(),
        output.findings.len(),
    );

    // findings.json is the pipeline contract and is always written; the
    // richer renderers consume it downstream. The markdown summary follows
    // the configured outputs.
    FindingsDocument::new(meta, output.findings.clone()).write(&out_dir.join("findings.json"))?;
    if cfg.outputs.iter().any(|o| o == "md") {
        write_summary_md(&out_dir.join("SUMMARY.md"), &counts, &output.findings)?;
    }

    if !output.suppressed_ids.is_empty() {
        let body = output
            .suppressed_ids
            .iter()
            .map(|id| format!("- `{id}`\n"))
            .collect::<String>();
        std::fs::write(
            out_dir.join("SUPPRESSIONS.md"),
            format!("# Suppressed findings\n\n{body}"),
        )?;
    }

    if profiling_enabled {
        let report = profiling.take();
        let recommended = num_recommended_threads(&cfg);
        let timings = json!({
            "aggregate_seconds": (elapsed * 1000.0).round() / 1000.0,
            "recommended_threads": recommended,
            "jobs": report.jobs,
            "meta": report.meta,
        });
        std::fs::write(
            out_dir.join("timings.json"),
            serde_json::to_vec_pretty(&timings)?,
        )?;
    }

    let code = fail_code(threshold, &counts);
    info!(
        out_dir = %out_dir.display(),
        threshold = threshold.map(|t| t.as_str()).unwrap_or("none"),
        exit = code,
        "reports written"
    );
    Ok(code)
}

fn num_recommended_threads(cfg: &jmo_core::Config) -> u32 {
    let cpus = std::thread::available_parallelism()
        .map(|n| n.get() as u32)
        .unwrap_or(cfg.profiling.default_threads);
    cpus.clamp(cfg.profiling.min_threads, cfg.profiling.max_threads)
}
