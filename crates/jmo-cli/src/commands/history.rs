//! `jmo history`: the historical store surface.

use std::io::Write;
use std::path::PathBuf;

use anyhow::Result;
use chrono::Utc;
use clap::{Args, Subcommand, ValueEnum};
use tracing::{error, info};

use jmo_history::{
    compute_diff, discover_migrations, recover_database, run_migrations, trend_summary,
    verify_database, HistoryDb, Migration, ScanFilter, StoreScanOptions, ENCRYPTION_KEY_ENV,
};

use super::parse_time_delta;
use crate::EXIT_CONFIG_ERROR;

#[derive(Args, Clone, Debug)]
pub struct DbArg {
    /// History database path (default: .jmo/history.db)
    #[arg(long)]
    pub db: Option<PathBuf>,
}

impl DbArg {
    fn path(&self) -> PathBuf {
        self.db.clone().unwrap_or_else(jmo_history::default_db_path)
    }

    fn open_existing(&self) -> Result<Option<HistoryDb>> {
        let path = self.path();
        if !path.exists() {
            error!(
                db = %path.display(),
                "history database not found; run a scan with --store-history or `jmo history store`"
            );
            return Ok(None);
        }
        Ok(Some(HistoryDb::open(&path)?))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum QueryFormat {
    Table,
    Json,
    Csv,
}

#[derive(Subcommand, Clone, Debug)]
pub enum HistoryAction {
    /// Store a completed scan from a results directory
    Store {
        /// Results directory containing summaries/findings.json
        results_dir: PathBuf,
        #[command(flatten)]
        db: DbArg,
        /// Profile recorded with the scan
        #[arg(long, default_value = "balanced")]
        profile: String,
        /// Tool names that were run
        #[arg(long, num_args = 1..)]
        tools: Option<Vec<String>>,
        /// Git commit hash override
        #[arg(long)]
        commit: Option<String>,
        /// Git branch override
        #[arg(long)]
        branch: Option<String>,
        /// Git tag override
        #[arg(long)]
        tag: Option<String>,
        /// Encrypt raw findings (key from JMO_ENCRYPTION_KEY)
        #[arg(long)]
        encrypt_findings: bool,
        /// Do not persist raw tool payloads
        #[arg(long)]
        no_store_raw_findings: bool,
        /// Record hostname/username
        #[arg(long)]
        collect_metadata: bool,
    },

    /// List stored scans
    List {
        #[command(flatten)]
        db: DbArg,
        #[arg(long)]
        json: bool,
        #[arg(long)]
        branch: Option<String>,
        #[arg(long)]
        profile: Option<String>,
        /// Only scans newer than this delta (e.g. 7d, 12h)
        #[arg(long)]
        since: Option<String>,
        #[arg(long, default_value = "50")]
        limit: usize,
    },

    /// Show one scan in detail
    Show {
        /// Scan id (full or unique prefix)
        scan_id: String,
        #[command(flatten)]
        db: DbArg,
        #[arg(long)]
        json: bool,
        /// Include the scan's findings
        #[arg(long)]
        findings: bool,
    },

    /// Run a read-only SQL query against the store
    Query {
        query: String,
        #[command(flatten)]
        db: DbArg,
        #[arg(long, value_enum, default_value = "table")]
        format: QueryFormat,
    },

    /// Delete scans older than a threshold
    Prune {
        #[command(flatten)]
        db: DbArg,
        /// Age threshold (e.g. 90d)
        #[arg(long)]
        older_than: String,
        /// Report what would be deleted without deleting
        #[arg(long)]
        dry_run: bool,
        /// Skip the confirmation prompt
        #[arg(long)]
        force: bool,
    },

    /// Export scans with findings to JSON or CSV
    Export {
        #[command(flatten)]
        db: DbArg,
        /// Export a single scan instead of all
        #[arg(long)]
        scan_id: Option<String>,
        /// Only scans newer than this delta
        #[arg(long)]
        since: Option<String>,
        #[arg(long, value_enum, default_value = "json")]
        format: ExportFormat,
    },

    /// Show database statistics
    Stats {
        #[command(flatten)]
        db: DbArg,
        #[arg(long)]
        json: bool,
    },

    /// Compare two stored scans
    Diff {
        scan_id_1: String,
        scan_id_2: String,
        #[command(flatten)]
        db: DbArg,
        #[arg(long)]
        json: bool,
    },

    /// Show per-branch trend summary
    Trends {
        #[command(flatten)]
        db: DbArg,
        #[arg(long, default_value = "main")]
        branch: String,
        #[arg(long, default_value = "30")]
        days: u32,
        #[arg(long)]
        json: bool,
    },

    /// VACUUM and ANALYZE the database
    Optimize {
        #[command(flatten)]
        db: DbArg,
    },

    /// Apply pending schema migrations
    Migrate {
        #[command(flatten)]
        db: DbArg,
        /// Stop at this version (default: apply all)
        #[arg(long)]
        target: Option<String>,
        /// Directory of v<maj>_<min>_<patch>.sql files
        #[arg(long, default_value = "migrations")]
        migrations_dir: PathBuf,
    },

    /// Run integrity verification
    Verify {
        #[command(flatten)]
        db: DbArg,
        #[arg(long)]
        json: bool,
    },

    /// Recover a corrupted database by dump/reimport
    Repair {
        #[command(flatten)]
        db: DbArg,
        /// Skip the confirmation prompt
        #[arg(long)]
        force: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExportFormat {
    Json,
    Csv,
}

pub fn run(action: HistoryAction) -> Result<i32> {
    match action {
        HistoryAction::Store {
            results_dir,
            db,
            profile,
            tools,
            commit,
            branch,
            tag,
            encrypt_findings,
            no_store_raw_findings,
            collect_metadata,
        } => cmd_store(
            results_dir,
            db,
            profile,
            tools,
            commit,
            branch,
            tag,
            encrypt_findings,
            no_store_raw_findings,
            collect_metadata,
        ),
        HistoryAction::List {
            db,
            json,
            branch,
            profile,
            since,
            limit,
        } => cmd_list(db, json, branch, profile, since, limit),
        HistoryAction::Show {
            scan_id,
            db,
            json,
            findings,
        } => cmd_show(db, &scan_id, json, findings),
        HistoryAction::Query { query, db, format } => cmd_query(db, &query, format),
        HistoryAction::Prune {
            db,
            older_than,
            dry_run,
            force,
        } => cmd_prune(db, &older_than, dry_run, force),
        HistoryAction::Export {
            db,
            scan_id,
            since,
            format,
        } => cmd_export(db, scan_id, since, format),
        HistoryAction::Stats { db, json } => cmd_stats(db, json),
        HistoryAction::Diff {
            scan_id_1,
            scan_id_2,
            db,
            json,
        } => cmd_diff(db, &scan_id_1, &scan_id_2, json),
        HistoryAction::Trends {
            db,
            branch,
            days,
            json,
        } => cmd_trends(db, &branch, days, json),
        HistoryAction::Optimize { db } => cmd_optimize(db),
        HistoryAction::Migrate {
            db,
            target,
            migrations_dir,
        } => cmd_migrate(db, target, migrations_dir),
        HistoryAction::Verify { db, json } => cmd_verify(db, json),
        HistoryAction::Repair { db, force } => cmd_repair(db, force),
    }
}

#[allow(clippy::too_many_arguments)]
fn cmd_store(
    results_dir: PathBuf,
    db: DbArg,
    profile: String,
    tools: Option<Vec<String>>,
    commit: Option<String>,
    branch: Option<String>,
    tag: Option<String>,
    encrypt_findings: bool,
    no_store_raw_findings: bool,
    collect_metadata: bool,
) -> Result<i32> {
    if !results_dir.exists() {
        error!(path = %results_dir.display(), "results directory not found");
        return Ok(1);
    }

    // Detect tools from the findings document when not given.
    let tools = match tools {
        Some(tools) => tools,
        None => {
            let findings_path = jmo_core::layout::findings_json_path(&results_dir);
            match jmo_normalize::FindingsDocument::load(&findings_path) {
                Ok(doc) => {
                    let mut tools: Vec<String> =
                        doc.findings.iter().map(|f| f.tool.name.clone()).collect();
                    tools.sort();
                    tools.dedup();
                    tools
                }
                Err(_) => Vec::new(),
            }
        }
    };

    let mut opts = StoreScanOptions::new(&results_dir, &profile, tools);
    opts.commit_hash = commit;
    opts.branch = branch;
    opts.tag = tag;
    opts.collect_metadata = collect_metadata;
    opts.store_raw = !no_store_raw_findings;
    if encrypt_findings {
        match std::env::var(ENCRYPTION_KEY_ENV) {
            Ok(key) => opts.encryption_key = Some(key),
            Err(_) => {
                error!("--encrypt-findings requires {ENCRYPTION_KEY_ENV} to be set");
                return Ok(EXIT_CONFIG_ERROR);
            }
        }
    }

    let mut store = HistoryDb::open(&db.path())?;
    match store.store_scan(&opts) {
        Ok(scan_id) => {
            println!("Stored scan: {scan_id}");
            println!("Database: {}", db.path().display());
            Ok(0)
        }
        Err(jmo_history::HistoryError::InvalidInput(msg)) => {
            error!("{msg}");
            Ok(EXIT_CONFIG_ERROR)
        }
        Err(err) => {
            error!("failed to store scan: {err}");
            Ok(1)
        }
    }
}

fn since_to_epoch(since: Option<&str>) -> Result<Option<i64>, ()> {
    match since {
        None => Ok(None),
        Some(raw) => match parse_time_delta(raw) {
            Some(seconds) => Ok(Some(Utc::now().timestamp() - seconds)),
            None => Err(()),
        },
    }
}

fn cmd_list(
    db: DbArg,
    json: bool,
    branch: Option<String>,
    profile: Option<String>,
    since: Option<String>,
    limit: usize,
) -> Result<i32> {
    let Some(store) = db.open_existing()? else {
        return Ok(1);
    };
    let Ok(since) = since_to_epoch(since.as_deref()) else {
        error!("invalid --since delta");
        return Ok(EXIT_CONFIG_ERROR);
    };

    let scans = store.list_scans(&ScanFilter {
        branch,
        profile,
        since,
        limit,
    })?;
    if scans.is_empty() {
        println!("No scans found.");
        return Ok(0);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&scans)?);
    } else {
        println!(
            "{:<12} {:<20} {:<16} {:<9} {:>8} {:>9} {:>6}",
            "Scan ID", "Timestamp", "Branch", "Profile", "Findings", "Critical", "High"
        );
        for scan in &scans {
            println!(
                "{:<12} {:<20} {:<16} {:<9} {:>8} {:>9} {:>6}",
                &scan.id[..8.min(scan.id.len())],
                scan.timestamp_iso.chars().take(19).collect::<String>(),
                scan.branch.as_deref().unwrap_or("N/A"),
                scan.profile,
                scan.total_findings,
                scan.critical_count,
                scan.high_count
            );
        }
    }
    Ok(0)
}

fn cmd_show(db: DbArg, scan_id: &str, json: bool, with_findings: bool) -> Result<i32> {
    let Some(store) = db.open_existing()? else {
        return Ok(1);
    };
    let scan = match store.get_scan(scan_id) {
        Ok(scan) => scan,
        Err(err) => {
            error!("{err}");
            return Ok(1);
        }
    };
    let findings = if with_findings {
        store.findings_for_scan(&scan.id, None)?
    } else {
        Vec::new()
    };

    if json {
        let mut value = serde_json::to_value(&scan)?;
        if with_findings {
            value["findings"] = serde_json::to_value(&findings)?;
        }
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(0);
    }

    println!("Scan: {}", scan.id);
    println!("Timestamp:   {}", scan.timestamp_iso);
    if let Some(branch) = &scan.branch {
        println!("Branch:      {branch}");
    }
    if let Some(commit) = &scan.commit_short {
        let dirty = if scan.is_dirty { " (dirty)" } else { " (clean)" };
        println!("Commit:      {commit}{dirty}");
    }
    println!("Profile:     {}", scan.profile);
    println!("Tools:       {}", scan.tools.join(", "));
    if let Some(duration) = scan.duration_seconds {
        println!("Duration:    {duration:.1}s");
    }
    println!();
    println!("Findings:");
    println!("  CRITICAL:  {}", scan.critical_count);
    println!("  HIGH:      {}", scan.high_count);
    println!("  MEDIUM:    {}", scan.medium_count);
    println!("  LOW:       {}", scan.low_count);
    println!("  INFO:      {}", scan.info_count);
    println!("  TOTAL:     {}", scan.total_findings);

    if with_findings && !findings.is_empty() {
        println!();
        println!("Top findings:");
        for finding in findings.iter().take(10) {
            println!(
                "  [{}] {} in {}:{}",
                finding.severity,
                finding.rule_id,
                finding.path,
                finding
                    .start_line
                    .map(|l| l.to_string())
                    .unwrap_or_else(|| "?".to_string())
            );
        }
    }
    Ok(0)
}

fn cmd_query(db: DbArg, query: &str, format: QueryFormat) -> Result<i32> {
    let Some(store) = db.open_existing()? else {
        return Ok(1);
    };
    let (columns, rows) = match store.query_rows(query) {
        Ok(result) => result,
        Err(err) => {
            error!("query failed: {err}");
            return Ok(1);
        }
    };

    match format {
        QueryFormat::Json => {
            let objects: Vec<serde_json::Value> = rows
                .iter()
                .map(|row| {
                    columns
                        .iter()
                        .zip(row)
                        .map(|(col, val)| (col.clone(), serde_json::Value::String(val.clone())))
                        .collect()
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&objects)?);
        }
        QueryFormat::Csv => {
            let stdout = std::io::stdout();
            let mut handle = stdout.lock();
            writeln!(handle, "{}", columns.join(","))?;
            for row in &rows {
                writeln!(handle, "{}", row.join(","))?;
            }
        }
        QueryFormat::Table => {
            println!("{}", columns.join(" | "));
            for row in &rows {
                println!("{}", row.join(" | "));
            }
        }
    }
    Ok(0)
}

fn cmd_prune(db: DbArg, older_than: &str, dry_run: bool, force: bool) -> Result<i32> {
    let Some(mut store) = db.open_existing()? else {
        return Ok(1);
    };
    let Some(seconds) = parse_time_delta(older_than) else {
        error!("invalid --older-than delta: {older_than}");
        return Ok(EXIT_CONFIG_ERROR);
    };

    let count = store.count_scans_older_than(seconds)?;
    if count == 0 {
        println!("No scans to prune.");
        return Ok(0);
    }
    if dry_run {
        println!("[DRY RUN] Would delete {count} scans older than {older_than}");
        return Ok(0);
    }
    if !force && !confirm(&format!("Delete {count} scans older than {older_than}?"))? {
        println!("Aborted.");
        return Ok(0);
    }

    let deleted = store.prune_older_than(seconds)?;
    println!("Deleted {deleted} scans");
    Ok(0)
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{prompt} (y/N): ");
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    Ok(answer.trim().eq_ignore_ascii_case("y"))
}

fn cmd_export(
    db: DbArg,
    scan_id: Option<String>,
    since: Option<String>,
    format: ExportFormat,
) -> Result<i32> {
    let Some(store) = db.open_existing()? else {
        return Ok(1);
    };
    let scans = match &scan_id {
        Some(id) => match store.get_scan(id) {
            Ok(scan) => vec![scan],
            Err(err) => {
                error!("{err}");
                return Ok(1);
            }
        },
        None => {
            let Ok(since) = since_to_epoch(since.as_deref()) else {
                error!("invalid --since delta");
                return Ok(EXIT_CONFIG_ERROR);
            };
            store.list_scans(&ScanFilter {
                since,
                limit: 10_000,
                ..Default::default()
            })?
        }
    };

    match format {
        ExportFormat::Json => {
            let mut export = Vec::new();
            for scan in &scans {
                let findings = store.findings_for_scan(&scan.id, None)?;
                let mut value = serde_json::to_value(scan)?;
                value["findings"] = serde_json::to_value(&findings)?;
                export.push(value);
            }
            println!("{}", serde_json::to_string_pretty(&export)?);
        }
        ExportFormat::Csv => {
            let stdout = std::io::stdout();
            let mut handle = stdout.lock();
            writeln!(
                handle,
                "scan_id,timestamp,branch,profile,fingerprint,severity,tool,rule_id,path,start_line,message"
            )?;
            for scan in &scans {
                for finding in store.findings_for_scan(&scan.id, None)? {
                    let message: String = finding.message.chars().take(100).collect();
                    writeln!(
                        handle,
                        "{},{},{},{},{},{},{},{},{},{},{}",
                        scan.id,
                        scan.timestamp_iso,
                        scan.branch.as_deref().unwrap_or(""),
                        scan.profile,
                        finding.fingerprint,
                        finding.severity,
                        finding.tool,
                        finding.rule_id,
                        finding.path,
                        finding
                            .start_line
                            .map(|l| l.to_string())
                            .unwrap_or_default(),
                        message.replace(',', ";")
                    )?;
                }
            }
        }
    }
    Ok(0)
}

fn cmd_stats(db: DbArg, json: bool) -> Result<i32> {
    let Some(store) = db.open_existing()? else {
        return Ok(1);
    };
    let stats = store.stats()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(0);
    }

    println!("Database: {}", db.path().display());
    println!(
        "Size:     {:.2} MB",
        stats.db_size_bytes as f64 / (1024.0 * 1024.0)
    );
    println!("Scans:    {}", stats.total_scans);
    println!("Findings: {}", stats.total_findings);
    if let (Some(min), Some(max)) = (&stats.min_date, &stats.max_date) {
        println!(
            "Range:    {} to {}",
            min.chars().take(10).collect::<String>(),
            max.chars().take(10).collect::<String>()
        );
    }
    if !stats.scans_by_branch.is_empty() {
        println!("\nScans by branch:");
        for (branch, count) in &stats.scans_by_branch {
            println!("  {branch:<20} {count}");
        }
    }
    if !stats.findings_by_severity.is_empty() {
        println!("\nFindings by severity:");
        for (severity, count) in &stats.findings_by_severity {
            println!("  {severity:<10} {count}");
        }
    }
    if !stats.top_tools.is_empty() {
        println!("\nTop tools:");
        for (tool, count) in &stats.top_tools {
            println!("  {tool:<20} {count}");
        }
    }
    Ok(0)
}

fn cmd_diff(db: DbArg, scan_id_1: &str, scan_id_2: &str, json: bool) -> Result<i32> {
    let Some(store) = db.open_existing()? else {
        return Ok(1);
    };
    let diff = match compute_diff(&store, scan_id_1, scan_id_2) {
        Ok(diff) => diff,
        Err(err) => {
            error!("{err}");
            return Ok(1);
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&diff)?);
        return Ok(0);
    }
    let (new, resolved, unchanged) = diff.counts();
    println!("Diff: {scan_id_1} -> {scan_id_2}");
    println!("  New:       {new}");
    println!("  Resolved:  {resolved}");
    println!("  Unchanged: {unchanged}");
    for finding in diff.new.iter().take(10) {
        println!("  + [{}] {} {}", finding.severity, finding.rule_id, finding.path);
    }
    for finding in diff.resolved.iter().take(10) {
        println!("  - [{}] {} {}", finding.severity, finding.rule_id, finding.path);
    }
    Ok(0)
}

fn cmd_trends(db: DbArg, branch: &str, days: u32, json: bool) -> Result<i32> {
    let Some(store) = db.open_existing()? else {
        return Ok(1);
    };
    let Some(trend) = trend_summary(&store, branch, days)? else {
        println!("No scans found for branch '{branch}' in the last {days} days");
        return Ok(1);
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&trend)?);
        return Ok(0);
    }
    println!("Security trends: {branch} (last {days} days)");
    println!("Scans analyzed: {}", trend.scan_count);
    println!(
        "Date range:     {} to {}",
        trend.date_range.0.chars().take(10).collect::<String>(),
        trend.date_range.1.chars().take(10).collect::<String>()
    );
    let metrics = &trend.improvement_metrics;
    println!("Trend:          {}", metrics.trend.to_uppercase());
    println!("Total change:   {:+}", metrics.total_change);
    println!("CRITICAL:       {:+}", metrics.critical_change);
    println!("HIGH:           {:+}", metrics.high_change);
    if !trend.top_rules.is_empty() {
        println!("\nTop rules:");
        for (i, rule) in trend.top_rules.iter().take(10).enumerate() {
            println!(
                "  {:>2}. {:<30} {:<8} (x{})",
                i + 1,
                rule.rule_id,
                rule.severity,
                rule.count
            );
        }
    }
    Ok(0)
}

fn cmd_optimize(db: DbArg) -> Result<i32> {
    let Some(store) = db.open_existing()? else {
        return Ok(1);
    };
    store.optimize()?;
    info!(db = %db.path().display(), "database optimized");
    println!("Database optimized.");
    Ok(0)
}

fn cmd_migrate(db: DbArg, target: Option<String>, migrations_dir: PathBuf) -> Result<i32> {
    let mut store = HistoryDb::open(&db.path())?;
    let discovered = discover_migrations(&migrations_dir);
    let refs: Vec<&dyn Migration> = discovered
        .iter()
        .map(|m| m as &dyn Migration)
        .collect();
    let report = run_migrations(&mut store, &refs, target.as_deref())?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(if report.errors.is_empty() { 0 } else { 1 })
}

fn cmd_verify(db: DbArg, json: bool) -> Result<i32> {
    let path = db.path();
    if !path.exists() {
        error!(db = %path.display(), "history database not found");
        return Ok(1);
    }
    let report = verify_database(&path)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else if report.is_valid {
        println!(
            "Integrity OK ({} scans, {} findings)",
            report.stats.scans_count, report.stats.findings_count
        );
    } else {
        println!("Integrity FAILED:");
        for error in &report.errors {
            println!("  - {error}");
        }
    }
    Ok(if report.is_valid { 0 } else { 1 })
}

fn cmd_repair(db: DbArg, force: bool) -> Result<i32> {
    let path = db.path();
    if !path.exists() {
        error!(db = %path.display(), "history database not found");
        return Ok(1);
    }
    if !force && !confirm("Recover the database via dump/reimport?")? {
        println!("Aborted.");
        return Ok(0);
    }
    let report = recover_database(&path)?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(if report.success { 0 } else { 1 })
}
