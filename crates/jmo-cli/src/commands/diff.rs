//! `jmo diff`: compare two stored scans.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, ValueEnum};
use tracing::error;

use jmo_history::{compute_diff, DiffResult, HistoryDb};

use crate::EXIT_CONFIG_ERROR;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DiffFormat {
    Json,
    Md,
}

#[derive(Args, Clone, Debug)]
pub struct DiffArgs {
    /// Baseline scan id (full or unique prefix)
    #[arg(value_name = "BASELINE")]
    pub baseline: Option<String>,

    /// Current scan id (full or unique prefix)
    #[arg(value_name = "CURRENT")]
    pub current: Option<String>,

    /// Scan ids given as repeated flags instead of positionals
    #[arg(long = "scan")]
    pub scans: Vec<String>,

    /// History database path
    #[arg(long)]
    pub db: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value = "json")]
    pub format: DiffFormat,

    /// Write output to a file instead of stdout
    #[arg(long)]
    pub output: Option<PathBuf>,
}

fn resolve_ids(args: &DiffArgs) -> Option<(String, String)> {
    match (&args.baseline, &args.current, args.scans.as_slice()) {
        (Some(a), Some(b), []) => Some((a.clone(), b.clone())),
        (None, None, [a, b]) => Some((a.clone(), b.clone())),
        _ => None,
    }
}

fn render_markdown(baseline: &str, current: &str, diff: &DiffResult) -> String {
    let (new, resolved, unchanged) = diff.counts();
    let mut out = format!(
        "# Scan diff\n\nBaseline: `{baseline}`\nCurrent: `{current}`\n\n\
         | New | Resolved | Unchanged |\n|---|---|---|\n| {new} | {resolved} | {unchanged} |\n"
    );
    if !diff.new.is_empty() {
        out.push_str("\n## New findings\n\n");
        for finding in diff.new.iter().take(25) {
            out.push_str(&format!(
                "- **{}** `{}` {}\n",
                finding.severity, finding.rule_id, finding.path
            ));
        }
    }
    if !diff.resolved.is_empty() {
        out.push_str("\n## Resolved findings\n\n");
        for finding in diff.resolved.iter().take(25) {
            out.push_str(&format!(
                "- **{}** `{}` {}\n",
                finding.severity, finding.rule_id, finding.path
            ));
        }
    }
    out
}

pub fn run(args: DiffArgs) -> Result<i32> {
    let Some((baseline, current)) = resolve_ids(&args) else {
        error!("provide two scan ids: positionally or via two --scan flags");
        return Ok(EXIT_CONFIG_ERROR);
    };

    let db_path = args.db.clone().unwrap_or_else(jmo_history::default_db_path);
    if !db_path.exists() {
        error!(db = %db_path.display(), "history database not found");
        return Ok(1);
    }
    let db = HistoryDb::open(&db_path)?;

    let diff = match compute_diff(&db, &baseline, &current) {
        Ok(diff) => diff,
        Err(err) => {
            error!("{err}");
            return Ok(1);
        }
    };

    let rendered = match args.format {
        DiffFormat::Json => serde_json::to_string_pretty(&diff)?,
        DiffFormat::Md => render_markdown(&baseline, &current, &diff),
    };
    match &args.output {
        Some(path) => std::fs::write(path, rendered)?,
        None => println!("{rendered}"),
    }
    Ok(0)
}
