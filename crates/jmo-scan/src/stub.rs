//! Stub artifacts for skipped tools.
//!
//! When a tool is missing or fails and `allow_missing_tools` is set, an
//! empty but schema-valid artifact is written so the normalization pipeline
//! can iterate tool outputs uniformly.

use std::path::Path;

use jmo_core::ToolSpec;

use crate::error::Result;

/// Write the tool's empty payload to the artifact path, creating parent
/// directories as needed.
pub fn write_stub(spec: &ToolSpec, artifact: &Path) -> Result<()> {
    if let Some(parent) = artifact.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let payload = (spec.stub)();
    std::fs::write(artifact, serde_json::to_vec(&payload)?)?;
    Ok(())
}
