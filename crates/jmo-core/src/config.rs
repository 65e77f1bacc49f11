//! Configuration loading and layered resolution.
//!
//! Effective scan settings are computed by layering, lowest to highest
//! precedence: built-in defaults → `jmo.yml` → selected profile → CLI
//! overrides → environment (`JMO_THREADS`). Invalid values in the YAML file
//! coerce silently to defaults; configuration load never aborts.

use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use tracing::debug;

use crate::severity::Severity;

/// Lower bound for resolved worker counts.
pub const THREADS_MIN: usize = 1;
/// Upper bound for resolved worker counts.
pub const THREADS_MAX: usize = 128;
/// Per-tool timeout applied when neither config nor CLI sets one.
pub const TIMEOUT_DEFAULT: u64 = 600;
/// Profile applied when none is selected anywhere.
pub const DEFAULT_PROFILE: &str = "balanced";

/// Logging verbosity, mirroring the config file's `log_level` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }

    pub fn to_tracing(self) -> tracing::Level {
        match self {
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

impl FromStr for LogLevel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DEBUG" => Ok(LogLevel::Debug),
            "INFO" => Ok(LogLevel::Info),
            "WARN" | "WARNING" => Ok(LogLevel::Warn),
            "ERROR" => Ok(LogLevel::Error),
            _ => Err(()),
        }
    }
}

/// Parallelism setting: an explicit count or `"auto"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThreadCount {
    Auto,
    Count(u32),
}

/// Per-tool overrides from `per_tool:` sections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PerToolOverrides {
    #[serde(default)]
    pub flags: Vec<String>,
    #[serde(default)]
    pub timeout: Option<u64>,
}

/// One named profile's overrides.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProfileOverrides {
    pub tools: Option<Vec<String>>,
    pub threads: Option<ThreadCount>,
    pub timeout: Option<u64>,
    pub include: Option<Vec<String>>,
    pub exclude: Option<Vec<String>>,
    pub retries: Option<u32>,
    pub per_tool: BTreeMap<String, PerToolOverrides>,
}

/// Thread recommendations surfaced when profiling is enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProfilingThreads {
    pub min_threads: u32,
    pub max_threads: u32,
    pub default_threads: u32,
}

impl Default for ProfilingThreads {
    fn default() -> Self {
        ProfilingThreads {
            min_threads: 2,
            max_threads: 8,
            default_threads: 4,
        }
    }
}

/// Parsed `jmo.yml`.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub tools: Vec<String>,
    pub outputs: Vec<String>,
    pub fail_on: Option<Severity>,
    pub threads: Option<ThreadCount>,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub timeout: Option<u64>,
    pub log_level: LogLevel,
    pub default_profile: Option<String>,
    pub profiles: BTreeMap<String, ProfileOverrides>,
    pub per_tool: BTreeMap<String, PerToolOverrides>,
    pub retries: u32,
    pub profiling: ProfilingThreads,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            tools: vec![
                "trufflehog".to_string(),
                "semgrep".to_string(),
                "syft".to_string(),
                "trivy".to_string(),
                "checkov".to_string(),
                "hadolint".to_string(),
                "zap".to_string(),
            ],
            outputs: vec![
                "json".to_string(),
                "md".to_string(),
                "yaml".to_string(),
                "html".to_string(),
            ],
            fail_on: None,
            threads: None,
            include: Vec::new(),
            exclude: Vec::new(),
            timeout: None,
            log_level: LogLevel::Info,
            default_profile: None,
            profiles: BTreeMap::new(),
            per_tool: BTreeMap::new(),
            retries: 0,
            profiling: ProfilingThreads::default(),
        }
    }
}

/// Load configuration from a YAML file. Missing file, unreadable content or
/// invalid field values all degrade to defaults rather than aborting.
pub fn load_config(path: Option<&Path>) -> Config {
    let Some(path) = path else {
        return Config::default();
    };
    let Ok(text) = std::fs::read_to_string(path) else {
        return Config::default();
    };
    let Ok(value) = serde_yaml::from_str::<Value>(&text) else {
        debug!(path = %path.display(), "config file is not valid YAML; using defaults");
        return Config::default();
    };
    parse_config(&value)
}

fn parse_config(map: &Value) -> Config {
    let mut cfg = Config::default();

    if let Some(tools) = str_list(map.get("tools")) {
        cfg.tools = tools;
    }
    if let Some(outputs) = str_list(map.get("outputs")) {
        cfg.outputs = outputs;
    }
    if let Some(fail_on) = map.get("fail_on").and_then(Value::as_str) {
        cfg.fail_on = fail_on.parse().ok();
    }
    cfg.threads = thread_count(map.get("threads"));
    if let Some(include) = str_list(map.get("include")) {
        cfg.include = include;
    }
    if let Some(exclude) = str_list(map.get("exclude")) {
        cfg.exclude = exclude;
    }
    cfg.timeout = pos_u64(map.get("timeout"));
    if let Some(level) = map
        .get("log_level")
        .and_then(Value::as_str)
        .and_then(|s| s.parse::<LogLevel>().ok())
    {
        cfg.log_level = level;
    }
    if let Some(name) = map.get("default_profile").and_then(Value::as_str) {
        let trimmed = name.trim();
        if !trimmed.is_empty() {
            cfg.default_profile = Some(trimmed.to_string());
        }
    }
    if let Some(profiles) = map.get("profiles").and_then(Value::as_mapping) {
        for (key, val) in profiles {
            if let Some(name) = key.as_str() {
                cfg.profiles.insert(name.to_string(), parse_profile(val));
            }
        }
    }
    cfg.per_tool = parse_per_tool(map.get("per_tool"));
    if let Some(retries) = map.get("retries").and_then(Value::as_u64) {
        cfg.retries = retries.min(u32::MAX as u64) as u32;
    }
    if let Some(prof) = map.get("profiling") {
        if let Some(v) = pos_u64(prof.get("min_threads")) {
            cfg.profiling.min_threads = v as u32;
        }
        if let Some(v) = pos_u64(prof.get("max_threads")) {
            cfg.profiling.max_threads = v as u32;
        }
        if let Some(v) = pos_u64(prof.get("default_threads")) {
            cfg.profiling.default_threads = v as u32;
        }
    }
    cfg
}

fn parse_profile(map: &Value) -> ProfileOverrides {
    let mut profile = ProfileOverrides::default();
    profile.tools = str_list(map.get("tools"));
    profile.threads = thread_count(map.get("threads"));
    profile.timeout = pos_u64(map.get("timeout"));
    profile.include = str_list(map.get("include"));
    profile.exclude = str_list(map.get("exclude"));
    profile.retries = map
        .get("retries")
        .and_then(Value::as_u64)
        .map(|v| v.min(u32::MAX as u64) as u32);
    profile.per_tool = parse_per_tool(map.get("per_tool"));
    profile
}

fn parse_per_tool(value: Option<&Value>) -> BTreeMap<String, PerToolOverrides> {
    let mut out = BTreeMap::new();
    let Some(map) = value.and_then(Value::as_mapping) else {
        return out;
    };
    for (key, val) in map {
        let Some(tool) = key.as_str() else { continue };
        let mut overrides = PerToolOverrides::default();
        if let Some(flags) = str_list(val.get("flags")) {
            overrides.flags = flags;
        }
        overrides.timeout = pos_u64(val.get("timeout"));
        out.insert(tool.to_string(), overrides);
    }
    out
}

fn str_list(value: Option<&Value>) -> Option<Vec<String>> {
    let seq = value?.as_sequence()?;
    Some(
        seq.iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
    )
}

fn pos_u64(value: Option<&Value>) -> Option<u64> {
    value?.as_u64().filter(|v| *v > 0)
}

fn thread_count(value: Option<&Value>) -> Option<ThreadCount> {
    let value = value?;
    if let Some(s) = value.as_str() {
        if s.eq_ignore_ascii_case("auto") {
            return Some(ThreadCount::Auto);
        }
        return None;
    }
    value
        .as_u64()
        .filter(|v| *v > 0)
        .map(|v| ThreadCount::Count(v.min(u32::MAX as u64) as u32))
}

/// CLI overrides feeding the resolution below.
#[derive(Debug, Clone, Default)]
pub struct CliScanOverrides {
    pub tools: Option<Vec<String>>,
    pub threads: Option<u32>,
    pub timeout: Option<u64>,
    pub profile: Option<String>,
}

/// Fully resolved settings for one scan invocation. Built once, then passed
/// through; nothing downstream reads the environment again.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanSettings {
    pub profile_name: String,
    pub tools: Vec<String>,
    pub threads: Option<ThreadCount>,
    pub timeout: u64,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub retries: u32,
    pub per_tool: BTreeMap<String, PerToolOverrides>,
}

impl ScanSettings {
    /// Per-tool timeout: tool override when set, else the scan timeout.
    pub fn tool_timeout(&self, tool: &str) -> u64 {
        self.per_tool
            .get(tool)
            .and_then(|pt| pt.timeout)
            .unwrap_or(self.timeout)
    }

    /// Per-tool extra flags, empty when none configured.
    pub fn tool_flags(&self, tool: &str) -> &[String] {
        self.per_tool
            .get(tool)
            .map(|pt| pt.flags.as_slice())
            .unwrap_or(&[])
    }

    /// Resolve the bounded worker count: explicit count, else CPU count,
    /// clamped to `[THREADS_MIN, THREADS_MAX]`.
    pub fn max_workers(&self) -> usize {
        let requested = match self.threads {
            Some(ThreadCount::Count(n)) => n as usize,
            Some(ThreadCount::Auto) | None => num_cpus::get(),
        };
        requested.clamp(THREADS_MIN, THREADS_MAX)
    }
}

/// Compute effective scan settings. Reads `JMO_THREADS` from the process
/// environment; see [`effective_scan_settings_with_env`] for the seam used
/// in tests.
pub fn effective_scan_settings(cfg: &Config, cli: &CliScanOverrides) -> ScanSettings {
    let env_threads = std::env::var("JMO_THREADS")
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .filter(|v| *v > 0);
    effective_scan_settings_with_env(cfg, cli, env_threads)
}

/// Layered resolution with the environment injected explicitly.
pub fn effective_scan_settings_with_env(
    cfg: &Config,
    cli: &CliScanOverrides,
    env_threads: Option<u32>,
) -> ScanSettings {
    let profile_name = cli
        .profile
        .clone()
        .or_else(|| cfg.default_profile.clone())
        .unwrap_or_else(|| DEFAULT_PROFILE.to_string());
    let empty = ProfileOverrides::default();
    let profile = cfg.profiles.get(&profile_name).unwrap_or(&empty);

    let tools = cli
        .tools
        .clone()
        .or_else(|| profile.tools.clone())
        .unwrap_or_else(|| cfg.tools.clone());

    let mut threads = cfg.threads;
    if let Some(t) = profile.threads {
        threads = Some(t);
    }
    if let Some(n) = cli.threads {
        threads = Some(ThreadCount::Count(n.max(1)));
    }
    if let Some(n) = env_threads {
        threads = Some(ThreadCount::Count(n));
    }

    let timeout = cli
        .timeout
        .or(profile.timeout)
        .or(cfg.timeout)
        .unwrap_or(TIMEOUT_DEFAULT);

    let include = profile.include.clone().unwrap_or_else(|| cfg.include.clone());
    let exclude = profile.exclude.clone().unwrap_or_else(|| cfg.exclude.clone());
    let retries = profile.retries.unwrap_or(cfg.retries);

    // Profile per-tool entries override the global ones key by key.
    let mut per_tool = cfg.per_tool.clone();
    for (tool, overrides) in &profile.per_tool {
        per_tool.insert(tool.clone(), overrides.clone());
    }

    ScanSettings {
        profile_name,
        tools,
        threads,
        timeout,
        include,
        exclude,
        retries,
        per_tool,
    }
}
