//! Historical Store.
//!
//! A single-file embedded SQLite database under `.jmo/history.db` by
//! default. Versioned schema with CHECK constraints, trigger-maintained
//! per-scan severity aggregates, covering indices for every documented
//! query, integrity verification, dump/reimport recovery, and a small
//! migration framework. Store operations communicate outcomes through
//! result structs rather than panics.

pub mod attest;
pub mod crypto;
pub mod diff;
pub mod error;
pub mod integrity;
pub mod migrations;
pub mod redact;
pub mod schema;
pub mod store;
pub mod trend;

pub use attest::{get_attestation, store_attestation, AttestationRecord};
pub use crypto::{decrypt_raw, encrypt_raw, is_encrypted, ENCRYPTION_KEY_ENV};
pub use diff::{compute_diff, DiffResult};
pub use error::{HistoryError, Result};
pub use integrity::{recover_database, verify_database, IntegrityReport, RecoveryReport};
pub use migrations::{
    discover_migrations, parse_version, run_migrations, Migration, MigrationFailure,
    MigrationReport, SqlMigration,
};
pub use schema::STORE_SCHEMA_VERSION;
pub use store::{
    default_db_path, DbStats, FindingRow, HistoryDb, ScanFilter, ScanRow, StoreScanOptions,
};
pub use trend::{trend_summary, ImprovementMetrics, TopRule, TrendSummary};
