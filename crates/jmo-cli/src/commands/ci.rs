//! `jmo ci`: scan then report, for pipelines.

use anyhow::Result;
use clap::Args;
use tracing::error;

use super::{report, scan};

#[derive(Args, Clone, Debug)]
pub struct CiArgs {
    #[command(flatten)]
    pub scan: scan::ScanArgs,

    /// Severity threshold for a non-zero exit (CRITICAL..INFO)
    #[arg(long)]
    pub fail_on: Option<String>,

    /// Collect timings.json during the report stage
    #[arg(long)]
    pub profile: bool,
}

pub async fn run(args: CiArgs) -> Result<i32> {
    let scan_code = scan::run(args.scan.clone()).await?;
    if scan_code != 0 && !args.scan.allow_missing_tools {
        error!(exit = scan_code, "scan stage failed; aborting ci");
        return Ok(scan_code);
    }

    let report_args = report::ReportArgs {
        results_dir_pos: Some(args.scan.results_dir.clone()),
        results_dir_opt: None,
        out: None,
        config: args.scan.config.clone(),
        fail_on: args.fail_on.clone(),
        profile: args.profile,
        threads: args.scan.threads,
        allow_missing_tools: args.scan.allow_missing_tools,
    };
    report::run(report_args).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn empty_scan_args(results_dir: PathBuf) -> scan::ScanArgs {
        scan::ScanArgs {
            repo: None,
            repos_dir: None,
            targets: None,
            image: Vec::new(),
            images_file: None,
            terraform_state: Vec::new(),
            cloudformation: Vec::new(),
            k8s_manifest: Vec::new(),
            url: Vec::new(),
            urls_file: None,
            api_spec: None,
            gitlab_project: Vec::new(),
            k8s_context: Vec::new(),
            results_dir,
            config: PathBuf::from("jmo.yml"),
            tools: None,
            timeout: None,
            threads: Some(1),
            profile_name: None,
            allow_missing_tools: true,
            store_history: false,
            db: None,
            encrypt_findings: false,
            no_store_raw_findings: false,
            collect_metadata: false,
        }
    }

    #[tokio::test]
    async fn test_ci_end_to_end_with_stub_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("repo")).unwrap();

        let mut scan_args = empty_scan_args(dir.path().join("results"));
        scan_args.repo = Some(dir.path().join("repo"));
        let args = CiArgs {
            scan: scan_args,
            fail_on: Some("CRITICAL".to_string()),
            profile: false,
        };

        // missing tools are masked by stubs; no findings, threshold quiet
        assert_eq!(run(args).await.unwrap(), 0);
        assert!(dir
            .path()
            .join("results/summaries/findings.json")
            .exists());
    }
}
