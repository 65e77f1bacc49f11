//! JMo: security scan orchestration and analytics.
//!
//! ## Commands
//!
//! - `scan`: run configured tools against targets and write raw artifacts
//! - `report`: aggregate findings and apply severity thresholds
//! - `ci`: scan then report, for pipelines
//! - `diff`: compare two stored scans
//! - `history`: the historical store surface (store/list/show/query/…)
//! - `trends`: trend analysis, scoring, insights, exports
//! - `attest` / `verify`: attestation stubs (generation lives outside core)
//!
//! Exit codes: `0` success, `1` generic failure (threshold hit, tool
//! failure, verification failure), `2` configuration or argument error.

use clap::{Parser, Subcommand};
use tracing::error;

mod commands;

use commands::{attest, ci, diff, history, report, scan, trends};

/// Exit code for configuration and argument errors.
pub const EXIT_CONFIG_ERROR: i32 = 2;

#[derive(Parser)]
#[command(name = "jmo")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Security scan orchestration and analytics", long_about = None)]
struct Cli {
    /// Log level: DEBUG|INFO|WARN|ERROR (default: from config)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Emit human-friendly colored logs instead of JSON lines
    #[arg(long, global = true)]
    human_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run configured tools on targets and write JSON artifacts
    Scan(scan::ScanArgs),

    /// Aggregate findings and emit the normalized document
    Report(report::ReportArgs),

    /// Scan then report; convenient for CI pipelines
    Ci(ci::CiArgs),

    /// Compare two stored scans by fingerprint
    Diff(diff::DiffArgs),

    /// Historical scan store operations
    History {
        #[command(subcommand)]
        action: history::HistoryAction,
    },

    /// Trend analysis over stored scans
    Trends {
        #[command(subcommand)]
        action: trends::TrendsAction,
    },

    /// Generate an attestation stub for a scan subject
    Attest(attest::AttestArgs),

    /// Verify an attestation (0 verified, 1 tamper/missing, 2 error)
    Verify(attest::VerifyArgs),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let level = cli
        .log_level
        .as_deref()
        .and_then(|raw| raw.parse::<jmo_core::LogLevel>().ok())
        .map(jmo_core::LogLevel::to_tracing)
        .unwrap_or(tracing::Level::INFO);
    jmo_core::init_tracing(!cli.human_logs, level);

    let outcome = match cli.command {
        Commands::Scan(args) => scan::run(args).await,
        Commands::Report(args) => report::run(args).await,
        Commands::Ci(args) => ci::run(args).await,
        Commands::Diff(args) => diff::run(args),
        Commands::History { action } => history::run(action),
        Commands::Trends { action } => trends::run(action),
        Commands::Attest(args) => attest::run_attest(args),
        Commands::Verify(args) => attest::run_verify(args),
    };

    let code = match outcome {
        Ok(code) => code,
        Err(err) => {
            error!("{err:#}");
            1
        }
    };
    std::process::exit(code);
}
