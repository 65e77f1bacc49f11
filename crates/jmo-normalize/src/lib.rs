//! Normalization & Deduplication Pipeline.
//!
//! Walks the orchestrator's filesystem output, routes each tool artifact to
//! its adapter, flattens everything into `CommonFinding` records, applies
//! suppressions, clusters cross-tool duplicates, and wraps the result in a
//! metadata envelope for reporters and the history store.

pub mod adapters;
pub mod cluster;
pub mod document;
pub mod error;
pub mod pipeline;
pub mod profiling;
pub mod suppress;

pub use cluster::cluster_findings;
pub use document::{DocumentMeta, FindingsDocument};
pub use error::{NormalizeError, Result};
pub use pipeline::{gather_results, PipelineOptions, PipelineOutput};
pub use profiling::{JobTiming, ProfilingContext, ProfilingReport};
pub use suppress::{filter_suppressed, load_suppressions, SuppressionRule, Suppressions};
