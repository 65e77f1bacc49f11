//! Attestation storage hook.
//!
//! Attestation generation and verification live outside the core; only the
//! scan-keyed storage rows are handled here.

use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::store::HistoryDb;

/// One stored attestation, keyed by scan id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AttestationRecord {
    pub scan_id: String,
    pub attestation_json: String,
    pub signature_path: Option<String>,
    pub certificate_path: Option<String>,
    pub rekor_entry: Option<String>,
    pub rekor_published: bool,
    pub created_at: i64,
    pub slsa_level: Option<String>,
}

impl AttestationRecord {
    pub fn new(scan_id: &str, attestation_json: &str) -> Self {
        AttestationRecord {
            scan_id: scan_id.to_string(),
            attestation_json: attestation_json.to_string(),
            signature_path: None,
            certificate_path: None,
            rekor_entry: None,
            rekor_published: false,
            created_at: Utc::now().timestamp(),
            slsa_level: None,
        }
    }
}

/// Insert or replace the attestation for a scan.
pub fn store_attestation(db: &HistoryDb, record: &AttestationRecord) -> Result<()> {
    db.conn().execute(
        "INSERT OR REPLACE INTO attestations (
            scan_id, attestation_json, signature_path, certificate_path,
            rekor_entry, rekor_published, created_at, slsa_level
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            record.scan_id,
            record.attestation_json,
            record.signature_path,
            record.certificate_path,
            record.rekor_entry,
            record.rekor_published as i64,
            record.created_at,
            record.slsa_level,
        ],
    )?;
    Ok(())
}

/// Fetch the attestation for a scan, if any.
pub fn get_attestation(db: &HistoryDb, scan_id: &str) -> Result<Option<AttestationRecord>> {
    let record = db
        .conn()
        .query_row(
            "SELECT scan_id, attestation_json, signature_path, certificate_path,
                    rekor_entry, rekor_published, created_at, slsa_level
             FROM attestations WHERE scan_id = ?1",
            [scan_id],
            |row| {
                Ok(AttestationRecord {
                    scan_id: row.get(0)?,
                    attestation_json: row.get(1)?,
                    signature_path: row.get(2)?,
                    certificate_path: row.get(3)?,
                    rekor_entry: row.get(4)?,
                    rekor_published: row.get::<_, i64>(5)? != 0,
                    created_at: row.get(6)?,
                    slsa_level: row.get(7)?,
                })
            },
        )
        .optional()?;
    Ok(record)
}
