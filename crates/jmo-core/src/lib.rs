//! Core contracts shared by every JMo crate.
//!
//! This crate defines the normalized finding schema (`CommonFinding`), the
//! severity lattice, the stable fingerprint function, target and tool
//! descriptors, configuration loading with layered resolution, git context
//! capture, and the results-directory layout that the orchestrator writes
//! and the normalization pipeline reads.

pub mod catalog;
pub mod config;
pub mod error;
pub mod finding;
pub mod gitctx;
pub mod layout;
pub mod severity;
pub mod target;
pub mod telemetry;

pub use catalog::{ToolCatalog, ToolSpec};
pub use config::{
    effective_scan_settings, effective_scan_settings_with_env, load_config, CliScanOverrides,
    Config, LogLevel, PerToolOverrides, ProfileOverrides, ScanSettings, ThreadCount,
};
pub use error::{CoreError, Result};
pub use finding::{
    fingerprint, CommonFinding, Compliance, Cvss, Location, Risk, RiskLevel, ToolInfo,
    FINGERPRINT_LENGTH, MESSAGE_SNIPPET_LENGTH, SCHEMA_VERSION,
};
pub use gitctx::{collect_git_context, GitContext};
pub use severity::{Severity, SEVERITY_ORDER};
pub use target::{sanitize_name, Target, TargetKind};
pub use telemetry::init_tracing;

/// JMo release version, stamped into scan provenance and document metadata.
pub const JMO_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Version of the aggregated findings document envelope.
pub const OUTPUT_VERSION: &str = "1.0.0";
