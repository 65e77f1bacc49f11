//! The metadata-wrapped findings document.
//!
//! Downstream consumers work against the envelope form; the loader also
//! accepts a bare top-level list of findings and synthesizes default
//! metadata for it.

use std::path::Path;

use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};

use jmo_core::{CommonFinding, JMO_VERSION, OUTPUT_VERSION, SCHEMA_VERSION};

use crate::error::Result;

/// `meta` block of the aggregated document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentMeta {
    pub output_version: String,
    pub jmo_version: String,
    pub schema_version: String,
    pub timestamp: i64,
    pub timestamp_iso: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scan_id: Option<String>,
    pub profile: String,
    pub tools: Vec<String>,
    pub target_count: usize,
    pub finding_count: usize,
    pub platform: String,
}

impl DocumentMeta {
    pub fn new(profile: &str, tools: Vec<String>, target_count: usize, finding_count: usize) -> Self {
        let now = Utc::now();
        DocumentMeta {
            output_version: OUTPUT_VERSION.to_string(),
            jmo_version: JMO_VERSION.to_string(),
            schema_version: SCHEMA_VERSION.to_string(),
            timestamp: now.timestamp(),
            timestamp_iso: now.to_rfc3339(),
            scan_id: None,
            profile: profile.to_string(),
            tools,
            target_count,
            finding_count,
            platform: std::env::consts::OS.to_string(),
        }
    }
}

impl Default for DocumentMeta {
    fn default() -> Self {
        let mut meta = DocumentMeta::new("balanced", Vec::new(), 0, 0);
        // a default meta carries the epoch rather than "now", so loads of
        // bare lists are reproducible
        meta.timestamp = 0;
        meta.timestamp_iso = Utc
            .timestamp_opt(0, 0)
            .single()
            .map(|t| t.to_rfc3339())
            .unwrap_or_default();
        meta
    }
}

/// Aggregated findings document: `{"meta": {...}, "findings": [...]}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FindingsDocument {
    pub meta: DocumentMeta,
    pub findings: Vec<CommonFinding>,
}

impl FindingsDocument {
    pub fn new(meta: DocumentMeta, findings: Vec<CommonFinding>) -> Self {
        FindingsDocument { meta, findings }
    }

    /// Load a document from disk. Accepts both the envelope form and a bare
    /// top-level list of findings.
    pub fn load(path: &Path) -> Result<FindingsDocument> {
        let bytes = std::fs::read(path)?;
        Self::from_slice(&bytes)
    }

    /// Parse from bytes; see [`FindingsDocument::load`].
    pub fn from_slice(bytes: &[u8]) -> Result<FindingsDocument> {
        if let Ok(doc) = serde_json::from_slice::<FindingsDocument>(bytes) {
            return Ok(doc);
        }
        let findings: Vec<CommonFinding> = serde_json::from_slice(bytes)?;
        let mut meta = DocumentMeta::default();
        meta.finding_count = findings.len();
        Ok(FindingsDocument { meta, findings })
    }

    /// Serialize to pretty JSON on disk, creating parent directories.
    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_vec_pretty(self)?)?;
        Ok(())
    }
}
