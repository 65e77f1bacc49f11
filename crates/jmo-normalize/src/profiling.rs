//! Per-job profiling context.
//!
//! Passed explicitly through the pipeline instead of living in process-wide
//! mutable state. Timings accumulate while the pipeline runs; the reporter
//! takes the report once, which clears the context.

use std::collections::BTreeMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

/// One parsed artifact's timing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobTiming {
    pub target: String,
    pub tool: String,
    pub seconds: f64,
    pub findings: usize,
}

/// Read-once snapshot handed to the reporter.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ProfilingReport {
    pub jobs: Vec<JobTiming>,
    pub meta: BTreeMap<String, String>,
}

/// Shared, thread-safe timing accumulator.
#[derive(Debug, Default)]
pub struct ProfilingContext {
    enabled: bool,
    jobs: Mutex<Vec<JobTiming>>,
    meta: Mutex<BTreeMap<String, String>>,
}

impl ProfilingContext {
    pub fn new(enabled: bool) -> Self {
        ProfilingContext {
            enabled,
            ..Default::default()
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn record(&self, timing: JobTiming) {
        if self.enabled {
            self.jobs.lock().expect("profiling lock poisoned").push(timing);
        }
    }

    pub fn set_meta(&self, key: impl Into<String>, value: impl Into<String>) {
        if self.enabled {
            self.meta
                .lock()
                .expect("profiling lock poisoned")
                .insert(key.into(), value.into());
        }
    }

    /// Take the accumulated report, clearing the context.
    pub fn take(&self) -> ProfilingReport {
        ProfilingReport {
            jobs: std::mem::take(&mut *self.jobs.lock().expect("profiling lock poisoned")),
            meta: std::mem::take(&mut *self.meta.lock().expect("profiling lock poisoned")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timing(tool: &str) -> JobTiming {
        JobTiming {
            target: "app".to_string(),
            tool: tool.to_string(),
            seconds: 0.5,
            findings: 3,
        }
    }

    #[test]
    fn test_disabled_context_records_nothing() {
        let ctx = ProfilingContext::new(false);
        ctx.record(timing("semgrep"));
        ctx.set_meta("k", "v");
        let report = ctx.take();
        assert!(report.jobs.is_empty());
        assert!(report.meta.is_empty());
    }

    #[test]
    fn test_take_clears() {
        let ctx = ProfilingContext::new(true);
        ctx.record(timing("trivy"));
        ctx.set_meta("targets", "1");
        let first = ctx.take();
        assert_eq!(first.jobs.len(), 1);
        assert_eq!(first.meta["targets"], "1");
        let second = ctx.take();
        assert!(second.jobs.is_empty());
    }
}
