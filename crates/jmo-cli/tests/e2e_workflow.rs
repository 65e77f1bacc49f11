//! End-to-end workflow: orchestrate (with stub artifacts), aggregate,
//! store into history, diff, and analyze trends, all through the library
//! APIs the CLI composes.

use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use jmo_core::{
    effective_scan_settings_with_env, CliScanOverrides, Config, Target, TargetKind,
};
use jmo_history::{compute_diff, HistoryDb, ScanFilter, StoreScanOptions};
use jmo_normalize::{gather_results, DocumentMeta, FindingsDocument, PipelineOptions};
use jmo_scan::{Orchestrator, ProgressTracker};
use jmo_trends::analyze_trends;

fn make_repo(base: &Path, name: &str) -> Target {
    let path = base.join(name);
    std::fs::create_dir_all(&path).unwrap();
    Target::new(TargetKind::Repo, path.to_string_lossy())
}

/// Inject a live finding into one target's gitleaks artifact, as if the
/// scanner had run.
fn plant_finding(results: &Path, target: &str, rule: &str) {
    let artifact = results
        .join("individual-repos")
        .join(target)
        .join("gitleaks.json");
    std::fs::create_dir_all(artifact.parent().unwrap()).unwrap();
    std::fs::write(
        artifact,
        format!(
            r#"[{{"RuleID": "{rule}", "Description": "leaked credential", "File": "config.py", "StartLine": 3}}]"#
        ),
    )
    .unwrap();
}

async fn scan_and_store(
    work: &Path,
    label: &str,
    rules: &[&str],
    db_path: &Path,
) -> String {
    let results = work.join(label).join("results");
    let target = make_repo(&work.join(label), "app");

    // Orchestrate with missing tools masked: every artifact becomes a stub.
    let cli = CliScanOverrides {
        tools: Some(vec!["gitleaks".to_string(), "semgrep".to_string()]),
        threads: Some(2),
        ..Default::default()
    };
    let settings = effective_scan_settings_with_env(&Config::default(), &cli, None);
    let orchestrator = Orchestrator::new(settings, results.clone(), true);
    let progress = Arc::new(ProgressTracker::new(1));
    let report = orchestrator
        .run(
            std::slice::from_ref(&target),
            Arc::new(AtomicBool::new(false)),
            progress,
        )
        .await
        .unwrap();
    assert_eq!(report.exit_code(), 0);

    // Overwrite the gitleaks stub with the planted findings.
    for rule in rules {
        plant_finding(&results, "app", rule);
    }

    // Aggregate and write the findings document.
    let output = gather_results(&results, &PipelineOptions::default())
        .await
        .unwrap();
    assert_eq!(output.findings.len(), rules.len().min(1));
    let meta = DocumentMeta::new(
        "balanced",
        vec!["gitleaks".to_string(), "semgrep".to_string()],
        1,
        output.findings.len(),
    );
    FindingsDocument::new(meta, output.findings)
        .write(&results.join("summaries/findings.json"))
        .unwrap();

    // Store with a fixed branch so trends line up.
    let mut db = HistoryDb::open(db_path).unwrap();
    let mut opts = StoreScanOptions::new(
        &results,
        "balanced",
        vec!["gitleaks".to_string(), "semgrep".to_string()],
    );
    opts.branch = Some("main".to_string());
    db.store_scan(&opts).unwrap()
}

#[tokio::test]
async fn full_workflow_scan_report_store_diff_trends() {
    let work = tempfile::tempdir().unwrap();
    let db_path = work.path().join("history.db");

    // One artifact per scan; a single rule means one finding per scan.
    let first = scan_and_store(work.path(), "first", &["aws-access-key"], &db_path).await;
    let second = scan_and_store(work.path(), "second", &["slack-webhook"], &db_path).await;

    let db = HistoryDb::open(&db_path).unwrap();
    let scans = db
        .list_scans(&ScanFilter {
            limit: 10,
            ..Default::default()
        })
        .unwrap();
    assert_eq!(scans.len(), 2);
    for scan in &scans {
        assert_eq!(scan.total_findings, 1);
        assert_eq!(scan.profile, "balanced");
        assert_eq!(scan.target_type, "repo");
    }

    // Diff: the rule changed, so one new and one resolved.
    let diff = compute_diff(&db, &first, &second).unwrap();
    assert_eq!(diff.counts(), (1, 1, 0));
    assert_eq!(diff.new[0].rule_id, "slack-webhook");
    assert_eq!(diff.resolved[0].rule_id, "aws-access-key");

    // Trends across the two stored scans.
    let analysis = analyze_trends(&db, "main", 30).unwrap().unwrap();
    assert_eq!(analysis.metadata.scan_count, 2);
    assert_eq!(analysis.improvement_metrics.resolved, 1);
    assert_eq!(analysis.improvement_metrics.introduced, 1);
    assert_eq!(analysis.improvement_metrics.net_change, 0);
    // two scans is below the statistics floor
    assert!(analysis
        .insights
        .iter()
        .any(|i| i.category == "data" && i.priority == "INFO"));
}

#[tokio::test]
async fn stub_only_scan_stores_empty_history_row() {
    let work = tempfile::tempdir().unwrap();
    let db_path = work.path().join("history.db");
    let scan_id = scan_and_store(work.path(), "empty", &[], &db_path).await;

    let db = HistoryDb::open(&db_path).unwrap();
    let scan = db.get_scan(&scan_id).unwrap();
    assert_eq!(scan.total_findings, 0);
    assert_eq!(scan.critical_count, 0);
    assert!(db.findings_for_scan(&scan_id, None).unwrap().is_empty());
}
