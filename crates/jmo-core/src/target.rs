//! Scan targets: repositories, container images, IaC files, web endpoints,
//! GitLab projects and Kubernetes clusters.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// The kind of subject a scan runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    Repo,
    Image,
    Iac,
    Url,
    Gitlab,
    K8s,
}

impl TargetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetKind::Repo => "repo",
            TargetKind::Image => "image",
            TargetKind::Iac => "iac",
            TargetKind::Url => "url",
            TargetKind::Gitlab => "gitlab",
            TargetKind::K8s => "k8s",
        }
    }

    /// Per-kind subtree under the results root.
    pub fn results_subdir(&self) -> &'static str {
        match self {
            TargetKind::Repo => "individual-repos",
            TargetKind::Image => "individual-images",
            TargetKind::Iac => "individual-iac",
            TargetKind::Url => "individual-web",
            TargetKind::Gitlab => "individual-gitlab",
            TargetKind::K8s => "individual-k8s",
        }
    }

    /// All kinds, in the order the detector probes them.
    pub fn all() -> [TargetKind; 6] {
        [
            TargetKind::Repo,
            TargetKind::Image,
            TargetKind::Iac,
            TargetKind::Url,
            TargetKind::Gitlab,
            TargetKind::K8s,
        ]
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Map every character outside `[A-Za-z0-9._-]` to `_` so identifiers like
/// image references and URLs become safe directory names.
pub fn sanitize_name(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// One scan subject. Immutable for the duration of a scan; only the derived
/// display name is ever persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    pub kind: TargetKind,
    /// Filesystem path, image reference, URL, cluster context, …
    pub identifier: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl Target {
    pub fn new(kind: TargetKind, identifier: impl Into<String>) -> Self {
        Target {
            kind,
            identifier: identifier.into(),
            display_name: None,
        }
    }

    /// The name used for the per-target output directory and in logs.
    ///
    /// Derivation depends on the kind: path basename for repos, basename
    /// without extension for IaC files, sanitized identifier otherwise.
    pub fn name(&self) -> String {
        if let Some(name) = &self.display_name {
            return sanitize_name(name);
        }
        match self.kind {
            TargetKind::Repo => Path::new(&self.identifier)
                .file_name()
                .map(|n| sanitize_name(&n.to_string_lossy()))
                .unwrap_or_else(|| sanitize_name(&self.identifier)),
            TargetKind::Iac => Path::new(&self.identifier)
                .file_stem()
                .map(|n| sanitize_name(&n.to_string_lossy()))
                .unwrap_or_else(|| sanitize_name(&self.identifier)),
            _ => sanitize_name(&self.identifier),
        }
    }
}
