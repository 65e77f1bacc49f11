//! Process-wide tool catalog.
//!
//! Every external scanner is described by a [`ToolSpec`] capability set:
//! which target kinds it applies to, which exit codes mean success, whether
//! the JSON payload arrives on stdout or is written to a path, an optional
//! pre-check, the argument-vector builder, and a schema-valid stub payload.
//! Entries are registered once at startup and immutable afterwards.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use serde_json::json;

use crate::error::{CoreError, Result};
use crate::target::TargetKind;

/// Builds the argument vector for one invocation. Arguments are passed as a
/// list to the process spawner; there is no shell interpretation.
pub type ArgvFn = fn(target: &Path, artifact: &Path, flags: &[String]) -> Vec<String>;

/// Returns a path that must exist inside the target for the tool to apply.
pub type PreCheckFn = fn(target: &Path) -> PathBuf;

/// Produces the tool's schema-valid empty payload, written as a stub
/// artifact when a skipped tool is masked by `allow_missing_tools`.
pub type StubFn = fn() -> serde_json::Value;

/// Immutable description of one external scanner.
#[derive(Clone)]
pub struct ToolSpec {
    pub name: &'static str,
    pub kinds: &'static [TargetKind],
    /// Exit codes that signal success. Many scanners exit 1 when findings
    /// exist, which is success for us.
    pub ok_rcs: &'static [i32],
    /// True when the JSON payload arrives on stdout and must be written to
    /// the artifact path by the runner.
    pub capture_stdout: bool,
    /// True for the two-phase secret scanner (scan, then report) with a
    /// scratch datastore and container fallback.
    pub two_phase: bool,
    pub pre_check: Option<PreCheckFn>,
    pub build_argv: ArgvFn,
    pub stub: StubFn,
}

impl std::fmt::Debug for ToolSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolSpec")
            .field("name", &self.name)
            .field("ok_rcs", &self.ok_rcs)
            .field("capture_stdout", &self.capture_stdout)
            .field("two_phase", &self.two_phase)
            .finish()
    }
}

impl ToolSpec {
    pub fn accepts(&self, kind: TargetKind) -> bool {
        self.kinds.contains(&kind)
    }

    pub fn rc_ok(&self, rc: i32) -> bool {
        self.ok_rcs.contains(&rc)
    }
}

/// Registry of tool specs, keyed by stable tool name.
#[derive(Debug, Default)]
pub struct ToolCatalog {
    tools: BTreeMap<&'static str, ToolSpec>,
}

impl ToolCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, spec: ToolSpec) {
        self.tools.insert(spec.name, spec);
    }

    pub fn get(&self, name: &str) -> Option<&ToolSpec> {
        self.tools.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.tools.keys().copied()
    }

    /// Reject unknown tool names up front, at configuration-resolution time.
    pub fn validate_selection<'a, I: IntoIterator<Item = &'a str>>(&self, names: I) -> Result<()> {
        for name in names {
            if !self.contains(name) {
                return Err(CoreError::UnknownTool(name.to_string()));
            }
        }
        Ok(())
    }

    /// The catalog with every built-in scanner registered.
    pub fn builtin() -> Self {
        let mut cat = ToolCatalog::new();
        for spec in builtin_specs() {
            cat.register(spec);
        }
        cat
    }
}

/// Process-wide catalog, populated on first use.
pub fn global() -> &'static ToolCatalog {
    static CATALOG: OnceLock<ToolCatalog> = OnceLock::new();
    CATALOG.get_or_init(ToolCatalog::builtin)
}

const REPO_ONLY: &[TargetKind] = &[TargetKind::Repo, TargetKind::Gitlab];
const REPO_IAC: &[TargetKind] = &[TargetKind::Repo, TargetKind::Gitlab, TargetKind::Iac];
const FS_AND_IMAGES: &[TargetKind] = &[
    TargetKind::Repo,
    TargetKind::Gitlab,
    TargetKind::Image,
    TargetKind::Iac,
    TargetKind::K8s,
];

fn s(v: &str) -> String {
    v.to_string()
}

fn path_arg(p: &Path) -> String {
    p.to_string_lossy().into_owned()
}

fn builtin_specs() -> Vec<ToolSpec> {
    vec![
        ToolSpec {
            name: "gitleaks",
            kinds: REPO_ONLY,
            ok_rcs: &[0, 1],
            capture_stdout: false,
            two_phase: false,
            pre_check: None,
            build_argv: |target, artifact, flags| {
                let mut argv = vec![
                    s("gitleaks"),
                    s("detect"),
                    s("--source"),
                    path_arg(target),
                    s("--report-format"),
                    s("json"),
                    s("--report-path"),
                    path_arg(artifact),
                    s("--verbose"),
                ];
                argv.extend(flags.iter().cloned());
                argv
            },
            stub: || json!([]),
        },
        ToolSpec {
            name: "trufflehog",
            kinds: REPO_ONLY,
            ok_rcs: &[0, 1],
            capture_stdout: true,
            two_phase: false,
            pre_check: None,
            build_argv: |target, _artifact, flags| {
                let mut argv = vec![
                    s("trufflehog"),
                    s("git"),
                    format!("file://{}", target.to_string_lossy()),
                    s("--json"),
                    s("--no-update"),
                ];
                argv.extend(flags.iter().cloned());
                argv
            },
            stub: || json!([]),
        },
        ToolSpec {
            name: "semgrep",
            kinds: REPO_ONLY,
            ok_rcs: &[0, 1, 2],
            capture_stdout: false,
            two_phase: false,
            pre_check: None,
            build_argv: |target, artifact, flags| {
                let mut argv = vec![
                    s("semgrep"),
                    s("--config=auto"),
                    s("--json"),
                    s("--output"),
                    path_arg(artifact),
                ];
                argv.extend(flags.iter().cloned());
                argv.push(path_arg(target));
                argv
            },
            stub: || json!({"results": []}),
        },
        ToolSpec {
            name: "noseyparker",
            kinds: REPO_ONLY,
            ok_rcs: &[0],
            capture_stdout: true,
            two_phase: true,
            pre_check: None,
            // Argv of the scan phase; the report phase is assembled by the
            // two-phase runner around the shared datastore.
            build_argv: |target, _artifact, flags| {
                let mut argv = vec![s("noseyparker"), s("scan")];
                argv.extend(flags.iter().cloned());
                argv.push(path_arg(target));
                argv
            },
            stub: || json!({"matches": []}),
        },
        ToolSpec {
            name: "syft",
            kinds: FS_AND_IMAGES,
            ok_rcs: &[0],
            capture_stdout: true,
            two_phase: false,
            pre_check: None,
            build_argv: |target, _artifact, flags| {
                let mut argv = vec![s("syft"), path_arg(target), s("-o"), s("json")];
                argv.extend(flags.iter().cloned());
                argv
            },
            stub: || json!({"artifacts": []}),
        },
        ToolSpec {
            name: "trivy",
            kinds: FS_AND_IMAGES,
            ok_rcs: &[0, 1],
            capture_stdout: false,
            two_phase: false,
            pre_check: None,
            build_argv: |target, artifact, flags| {
                let mut argv = vec![
                    s("trivy"),
                    s("fs"),
                    s("-q"),
                    s("-f"),
                    s("json"),
                    s("--scanners"),
                    s("vuln,secret,misconfig"),
                ];
                argv.extend(flags.iter().cloned());
                argv.push(path_arg(target));
                argv.push(s("-o"));
                argv.push(path_arg(artifact));
                argv
            },
            stub: || json!({"Results": []}),
        },
        ToolSpec {
            name: "hadolint",
            kinds: REPO_ONLY,
            ok_rcs: &[0, 1],
            capture_stdout: true,
            two_phase: false,
            pre_check: Some(|target| target.join("Dockerfile")),
            build_argv: |target, _artifact, flags| {
                let mut argv = vec![s("hadolint"), s("-f"), s("json")];
                argv.extend(flags.iter().cloned());
                argv.push(path_arg(&target.join("Dockerfile")));
                argv
            },
            stub: || json!([]),
        },
        ToolSpec {
            name: "checkov",
            kinds: REPO_IAC,
            ok_rcs: &[0, 1],
            capture_stdout: true,
            two_phase: false,
            pre_check: None,
            build_argv: |target, _artifact, flags| {
                let mut argv = vec![s("checkov"), s("-d"), path_arg(target), s("-o"), s("json")];
                argv.extend(flags.iter().cloned());
                argv
            },
            stub: || json!({"results": {"failed_checks": []}}),
        },
        ToolSpec {
            name: "bandit",
            kinds: REPO_ONLY,
            ok_rcs: &[0, 1],
            capture_stdout: true,
            two_phase: false,
            pre_check: None,
            build_argv: |target, _artifact, flags| {
                let mut argv = vec![
                    s("bandit"),
                    s("-q"),
                    s("-r"),
                    path_arg(target),
                    s("-f"),
                    s("json"),
                ];
                argv.extend(flags.iter().cloned());
                argv
            },
            stub: || json!({"results": []}),
        },
        ToolSpec {
            name: "tfsec",
            kinds: REPO_IAC,
            ok_rcs: &[0, 1],
            capture_stdout: true,
            two_phase: false,
            pre_check: None,
            build_argv: |target, _artifact, flags| {
                let mut argv = vec![s("tfsec"), path_arg(target), s("--format"), s("json")];
                argv.extend(flags.iter().cloned());
                argv
            },
            stub: || json!({"results": []}),
        },
        ToolSpec {
            name: "zap",
            kinds: &[TargetKind::Url],
            // baseline exits 1 on warnings and 2 on alerts; both carry output
            ok_rcs: &[0, 1, 2],
            capture_stdout: false,
            two_phase: false,
            pre_check: None,
            build_argv: |target, artifact, flags| {
                let mut argv = vec![
                    s("zap-baseline.py"),
                    s("-t"),
                    path_arg(target),
                    s("-J"),
                    path_arg(artifact),
                ];
                argv.extend(flags.iter().cloned());
                argv
            },
            stub: || json!({"site": []}),
        },
        ToolSpec {
            name: "osv-scanner",
            kinds: REPO_ONLY,
            ok_rcs: &[0, 1],
            capture_stdout: false,
            two_phase: false,
            pre_check: None,
            build_argv: |target, artifact, flags| {
                let mut argv = vec![
                    s("osv-scanner"),
                    s("--format"),
                    s("json"),
                    s("--output"),
                    path_arg(artifact),
                ];
                argv.extend(flags.iter().cloned());
                argv.push(path_arg(target));
                argv
            },
            stub: || json!({"results": []}),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_catalog_contents() {
        let cat = ToolCatalog::builtin();
        for name in [
            "gitleaks",
            "trufflehog",
            "semgrep",
            "noseyparker",
            "syft",
            "trivy",
            "hadolint",
            "checkov",
            "bandit",
            "tfsec",
            "osv-scanner",
            "zap",
        ] {
            assert!(cat.contains(name), "missing {name}");
        }
        assert!(!cat.contains("frobnicator"));
    }

    #[test]
    fn test_validate_selection_rejects_unknown() {
        let cat = ToolCatalog::builtin();
        assert!(cat.validate_selection(["trivy", "semgrep"]).is_ok());
        let err = cat.validate_selection(["trivy", "nope"]).unwrap_err();
        assert!(err.to_string().contains("nope"));
    }

    #[test]
    fn test_exit_code_sets() {
        let cat = ToolCatalog::builtin();
        let semgrep = cat.get("semgrep").unwrap();
        assert!(semgrep.rc_ok(0));
        assert!(semgrep.rc_ok(1));
        assert!(semgrep.rc_ok(2));
        assert!(!semgrep.rc_ok(3));

        let syft = cat.get("syft").unwrap();
        assert!(!syft.rc_ok(1));
    }

    #[test]
    fn test_argv_has_no_shell_metacharacters_handling() {
        // Arguments are a plain vector; a hostile target path stays one arg.
        let cat = ToolCatalog::builtin();
        let spec = cat.get("semgrep").unwrap();
        let argv = (spec.build_argv)(
            Path::new("/tmp/repo; rm -rf /"),
            Path::new("/tmp/out.json"),
            &[],
        );
        assert!(argv.contains(&"/tmp/repo; rm -rf /".to_string()));
    }

    #[test]
    fn test_per_tool_flags_are_passed_verbatim() {
        let cat = ToolCatalog::builtin();
        let spec = cat.get("trivy").unwrap();
        let flags = vec!["--severity".to_string(), "HIGH,CRITICAL".to_string()];
        let argv = (spec.build_argv)(Path::new("/r"), Path::new("/o.json"), &flags);
        let pos = argv.iter().position(|a| a == "--severity").unwrap();
        assert_eq!(argv[pos + 1], "HIGH,CRITICAL");
    }

    #[test]
    fn test_hadolint_pre_check_points_at_dockerfile() {
        let cat = ToolCatalog::builtin();
        let spec = cat.get("hadolint").unwrap();
        let required = (spec.pre_check.unwrap())(Path::new("/repo"));
        assert_eq!(required, Path::new("/repo/Dockerfile"));
    }

    #[test]
    fn test_stub_payloads_are_schema_valid_shapes() {
        let cat = ToolCatalog::builtin();
        assert!((cat.get("gitleaks").unwrap().stub)().is_array());
        assert_eq!(
            (cat.get("semgrep").unwrap().stub)(),
            json!({"results": []})
        );
        assert_eq!(
            (cat.get("checkov").unwrap().stub)(),
            json!({"results": {"failed_checks": []}})
        );
    }

    #[test]
    fn test_global_catalog_is_stable() {
        let a = global() as *const ToolCatalog;
        let b = global() as *const ToolCatalog;
        assert_eq!(a, b);
    }
}
