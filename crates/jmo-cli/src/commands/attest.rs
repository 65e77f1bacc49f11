//! `jmo attest` / `jmo verify`: attestation stubs.
//!
//! Attestation generation and Sigstore signing live outside the core; only
//! the history-store hook and the documented exit-code contract are
//! honored here (0 verified, 1 tamper/missing, 2 error).

use std::path::PathBuf;

use anyhow::Result;
use chrono::Utc;
use clap::Args;
use serde_json::json;
use tracing::{error, info, warn};

use jmo_history::{store_attestation, AttestationRecord, HistoryDb};

use crate::EXIT_CONFIG_ERROR;

#[derive(Args, Clone, Debug)]
pub struct AttestArgs {
    /// Scan id (or artifact path) to attest
    pub subject: String,

    /// Where to write the attestation document
    #[arg(long, default_value = "attestation.json")]
    pub attestation: PathBuf,

    /// History database path (for the storage hook)
    #[arg(long)]
    pub db: Option<PathBuf>,
}

#[derive(Args, Clone, Debug)]
pub struct VerifyArgs {
    /// Scan id (or artifact path) the attestation refers to
    pub subject: String,

    /// Attestation document to verify
    #[arg(long, default_value = "attestation.json")]
    pub attestation: PathBuf,
}

/// Emit an unsigned provenance stub and hook it into the store when the
/// subject resolves to a stored scan.
pub fn run_attest(args: AttestArgs) -> Result<i32> {
    let document = json!({
        "_type": "https://in-toto.io/Statement/v1",
        "predicateType": "https://slsa.dev/provenance/v1",
        "subject": [{"name": args.subject}],
        "predicate": {
            "builder": {"id": format!("jmo@{}", jmo_core::JMO_VERSION)},
            "generated_at": Utc::now().to_rfc3339(),
            "unsigned_stub": true,
        }
    });
    let body = serde_json::to_string_pretty(&document)?;
    if let Err(err) = std::fs::write(&args.attestation, &body) {
        error!(path = %args.attestation.display(), %err, "failed to write attestation");
        return Ok(EXIT_CONFIG_ERROR);
    }

    // Storage hook: attach to the scan when the subject is a stored scan.
    let db_path = args.db.clone().unwrap_or_else(jmo_history::default_db_path);
    if db_path.exists() {
        let db = HistoryDb::open(&db_path)?;
        if let Ok(scan) = db.get_scan(&args.subject) {
            store_attestation(&db, &AttestationRecord::new(&scan.id, &body))?;
            info!(scan_id = %scan.id, "attestation stored with scan");
        }
    }

    println!("Wrote unsigned attestation stub: {}", args.attestation.display());
    Ok(0)
}

/// Verify the stub: missing or malformed documents are failures (exit 1);
/// a readable statement naming the subject verifies (exit 0).
pub fn run_verify(args: VerifyArgs) -> Result<i32> {
    let body = match std::fs::read_to_string(&args.attestation) {
        Ok(body) => body,
        Err(_) => {
            warn!(path = %args.attestation.display(), "attestation missing");
            return Ok(1);
        }
    };
    let document: serde_json::Value = match serde_json::from_str(&body) {
        Ok(document) => document,
        Err(_) => {
            warn!("attestation is not valid JSON; treating as tampered");
            return Ok(1);
        }
    };

    let subject_matches = document["subject"]
        .as_array()
        .map(|subjects| {
            subjects
                .iter()
                .any(|s| s["name"].as_str() == Some(args.subject.as_str()))
        })
        .unwrap_or(false);
    if !subject_matches {
        warn!("attestation subject does not match");
        return Ok(1);
    }
    println!("Attestation verified for subject: {}", args.subject);
    Ok(0)
}
