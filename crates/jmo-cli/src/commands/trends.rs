//! `jmo trends`: trend analysis over the history store.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Subcommand};
use tracing::error;

use jmo_history::HistoryDb;
use jmo_trends::{
    analyze_trends, attribute_findings, export_csv, export_dashboard, export_grafana,
    export_prometheus, TrendAnalysis,
};

use crate::EXIT_CONFIG_ERROR;

#[derive(Args, Clone, Debug)]
pub struct WindowArgs {
    /// Branch to analyze
    #[arg(long, default_value = "main")]
    pub branch: String,

    /// Day window
    #[arg(long, default_value = "30")]
    pub days: u32,

    /// History database path
    #[arg(long)]
    pub db: Option<PathBuf>,
}

impl WindowArgs {
    fn analyze(&self) -> Result<Option<TrendAnalysis>> {
        let path = self.db.clone().unwrap_or_else(jmo_history::default_db_path);
        if !path.exists() {
            error!(db = %path.display(), "history database not found");
            return Ok(None);
        }
        let db = HistoryDb::open(&path)?;
        Ok(analyze_trends(&db, &self.branch, self.days)?)
    }
}

#[derive(Subcommand, Clone, Debug)]
pub enum TrendsAction {
    /// Full analysis with optional export artifacts
    Analyze {
        #[command(flatten)]
        window: WindowArgs,
        /// Write the full analysis JSON here
        #[arg(long)]
        export_json: Option<PathBuf>,
        /// Write a CSV timeline here
        #[arg(long)]
        export_csv: Option<PathBuf>,
        /// Write Prometheus metrics here
        #[arg(long)]
        export_prometheus: Option<PathBuf>,
        /// Write a Grafana dashboard definition here
        #[arg(long)]
        export_grafana: Option<PathBuf>,
        /// Write the compact dashboard JSON here
        #[arg(long)]
        export_dashboard: Option<PathBuf>,
    },

    /// Human-readable trend summary
    Show {
        #[command(flatten)]
        window: WindowArgs,
    },

    /// Regressions between consecutive scans
    Regressions {
        #[command(flatten)]
        window: WindowArgs,
        #[arg(long)]
        json: bool,
    },

    /// Security posture score and grade
    Score {
        #[command(flatten)]
        window: WindowArgs,
        #[arg(long)]
        json: bool,
    },

    /// Compare two branches over the same window
    Compare {
        /// First branch
        branch_a: String,
        /// Second branch
        branch_b: String,
        #[arg(long, default_value = "30")]
        days: u32,
        #[arg(long)]
        db: Option<PathBuf>,
    },

    /// Generated insights
    Insights {
        #[command(flatten)]
        window: WindowArgs,
        #[arg(long)]
        json: bool,
    },

    /// Explain the statistical validation behind the trend verdicts
    Explain {
        #[command(flatten)]
        window: WindowArgs,
    },

    /// Attribute findings of the latest scan to developers via git blame
    Developers {
        #[command(flatten)]
        window: WindowArgs,
        /// Repository to blame against
        #[arg(long, default_value = ".")]
        repo: PathBuf,
        /// JSON file mapping author name to team
        #[arg(long)]
        team_map: Option<PathBuf>,
        #[arg(long)]
        json: bool,
    },
}

pub fn run(action: TrendsAction) -> Result<i32> {
    match action {
        TrendsAction::Analyze {
            window,
            export_json,
            export_csv: csv_path,
            export_prometheus: prom_path,
            export_grafana: grafana_path,
            export_dashboard: dashboard_path,
        } => {
            let Some(analysis) = window.analyze()? else {
                return no_data(&window);
            };
            if let Some(path) = export_json {
                std::fs::write(&path, serde_json::to_vec_pretty(&analysis)?)?;
            }
            if let Some(path) = csv_path {
                std::fs::write(&path, export_csv(&analysis)?)?;
            }
            if let Some(path) = prom_path {
                std::fs::write(&path, export_prometheus(&analysis))?;
            }
            if let Some(path) = grafana_path {
                std::fs::write(&path, serde_json::to_vec_pretty(&export_grafana(&analysis))?)?;
            }
            if let Some(path) = dashboard_path {
                std::fs::write(
                    &path,
                    serde_json::to_vec_pretty(&export_dashboard(&analysis))?,
                )?;
            }
            println!("{}", serde_json::to_string_pretty(&analysis)?);
            Ok(0)
        }

        TrendsAction::Show { window } => {
            let Some(analysis) = window.analyze()? else {
                return no_data(&window);
            };
            print_summary(&analysis);
            Ok(0)
        }

        TrendsAction::Regressions { window, json } => {
            let Some(analysis) = window.analyze()? else {
                return no_data(&window);
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&analysis.regressions)?);
            } else if analysis.regressions.is_empty() {
                println!("No regressions in the window.");
            } else {
                for regression in &analysis.regressions {
                    println!(
                        "[{}] {} ({:.1} -> {:.1})",
                        regression.severity,
                        regression.message,
                        regression.previous_value,
                        regression.current_value
                    );
                }
            }
            Ok(0)
        }

        TrendsAction::Score { window, json } => {
            let Some(analysis) = window.analyze()? else {
                return no_data(&window);
            };
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&analysis.security_score)?
                );
            } else {
                println!(
                    "Security score: {:.1}/10 (grade {}, {})",
                    analysis.security_score.current_score,
                    analysis.security_score.grade,
                    analysis.security_score.trend
                );
            }
            Ok(0)
        }

        TrendsAction::Compare {
            branch_a,
            branch_b,
            days,
            db,
        } => {
            let window_a = WindowArgs {
                branch: branch_a.clone(),
                days,
                db: db.clone(),
            };
            let window_b = WindowArgs {
                branch: branch_b.clone(),
                days,
                db,
            };
            let (a, b) = (window_a.analyze()?, window_b.analyze()?);
            match (a, b) {
                (Some(a), Some(b)) => {
                    println!(
                        "{:<16} score {:>4.1} ({})  net {:+}",
                        branch_a,
                        a.security_score.current_score,
                        a.security_score.grade,
                        a.improvement_metrics.net_change
                    );
                    println!(
                        "{:<16} score {:>4.1} ({})  net {:+}",
                        branch_b,
                        b.security_score.current_score,
                        b.security_score.grade,
                        b.improvement_metrics.net_change
                    );
                    Ok(0)
                }
                _ => {
                    error!("one or both branches have no scans in the window");
                    Ok(1)
                }
            }
        }

        TrendsAction::Insights { window, json } => {
            let Some(analysis) = window.analyze()? else {
                return no_data(&window);
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&analysis.insights)?);
            } else if analysis.insights.is_empty() {
                println!("No insights for this window.");
            } else {
                for insight in &analysis.insights {
                    println!(
                        "{} [{}] {}\n    {}\n    -> {}",
                        insight.icon,
                        insight.priority,
                        insight.message,
                        insight.details,
                        insight.recommended_action
                    );
                }
            }
            Ok(0)
        }

        TrendsAction::Explain { window } => {
            let Some(analysis) = window.analyze()? else {
                return no_data(&window);
            };
            println!(
                "Mann-Kendall validation for '{}' over {} scans:",
                window.branch, analysis.metadata.scan_count
            );
            for (series, stat) in &analysis.statistics {
                println!(
                    "  {:<10} S={:>5}  Z={:>7.3}  p={:.4}  {} ({})",
                    series,
                    stat.s,
                    stat.z,
                    stat.p_value,
                    stat.trend.as_str(),
                    if stat.significant {
                        "significant"
                    } else {
                        "not significant"
                    }
                );
            }
            Ok(0)
        }

        TrendsAction::Developers {
            window,
            repo,
            team_map,
            json,
        } => {
            let path = window
                .db
                .clone()
                .unwrap_or_else(jmo_history::default_db_path);
            if !path.exists() {
                error!(db = %path.display(), "history database not found");
                return Ok(1);
            }
            let db = HistoryDb::open(&path)?;
            let scans = db.list_scans(&jmo_history::ScanFilter {
                branch: Some(window.branch.clone()),
                limit: 1,
                ..Default::default()
            })?;
            let Some(latest) = scans.first() else {
                return no_data(&window);
            };

            let team_map: BTreeMap<String, String> = match &team_map {
                Some(path) => match std::fs::read_to_string(path) {
                    Ok(text) => serde_json::from_str(&text).unwrap_or_default(),
                    Err(err) => {
                        error!(path = %path.display(), %err, "failed to read team map");
                        return Ok(EXIT_CONFIG_ERROR);
                    }
                },
                None => BTreeMap::new(),
            };

            let locations: Vec<(String, Option<i64>)> = db
                .findings_for_scan(&latest.id, None)?
                .into_iter()
                .map(|f| (f.path, f.start_line))
                .collect();
            let attribution = attribute_findings(&repo, &locations, &team_map);

            if json {
                println!("{}", serde_json::to_string_pretty(&attribution)?);
            } else {
                println!("Findings by author (scan {}):", &latest.id[..8]);
                for (author, count) in &attribution.by_author {
                    println!("  {author:<30} {count}");
                }
                if !attribution.by_team.is_empty() {
                    println!("By team:");
                    for (team, count) in &attribution.by_team {
                        println!("  {team:<30} {count}");
                    }
                }
                if attribution.unattributed > 0 {
                    println!("Unattributed: {}", attribution.unattributed);
                }
            }
            Ok(0)
        }
    }
}

fn no_data(window: &WindowArgs) -> Result<i32> {
    println!(
        "No scans found for branch '{}' in the last {} days",
        window.branch, window.days
    );
    Ok(1)
}

fn print_summary(analysis: &TrendAnalysis) {
    println!(
        "Security trends: {} ({} scans)",
        analysis.metadata.branch, analysis.metadata.scan_count
    );
    println!(
        "Window:   {} to {}",
        analysis
            .metadata
            .date_range
            .start
            .chars()
            .take(10)
            .collect::<String>(),
        analysis
            .metadata
            .date_range
            .end
            .chars()
            .take(10)
            .collect::<String>()
    );
    println!(
        "Score:    {:.1}/10 (grade {}, {})",
        analysis.security_score.current_score,
        analysis.security_score.grade,
        analysis.security_score.trend
    );
    let metrics = &analysis.improvement_metrics;
    println!(
        "Movement: {} (net {:+}, resolved {}, introduced {})",
        metrics.trend.to_uppercase(),
        metrics.net_change,
        metrics.resolved,
        metrics.introduced
    );
    if !analysis.regressions.is_empty() {
        println!("Regressions: {}", analysis.regressions.len());
    }
    if !analysis.insights.is_empty() {
        println!("Insights:");
        for insight in &analysis.insights {
            println!("  {} [{}] {}", insight.icon, insight.priority, insight.message);
        }
    }
}
