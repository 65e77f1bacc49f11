//! Narrative insight generation.
//!
//! Each rule fires independently; an analysis may produce any subset.

use serde::{Deserialize, Serialize};

use crate::regression::Regression;

/// Strong improvement fires at this net change or better.
pub const STRONG_IMPROVEMENT_CHANGE: i64 = -20;
/// Remediation-velocity threshold: net resolved findings in the window.
pub const HIGH_VELOCITY_NET: i64 = 15;
/// Consecutive scans a rule must stay in the top three to be "recurring".
pub const RECURRING_RULE_STREAK: usize = 3;

/// One structured narrative record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Insight {
    pub category: String,
    pub severity: String,
    /// `HIGH` | `MEDIUM` | `LOW` | `INFO`
    pub priority: String,
    pub icon: String,
    pub message: String,
    pub details: String,
    pub recommended_action: String,
}

/// Inputs to insight generation, derived by the analyzer.
#[derive(Debug, Clone, Default)]
pub struct InsightContext<'a> {
    pub scan_count: usize,
    pub total_change: i64,
    pub resolved: i64,
    pub introduced: i64,
    pub regressions: &'a [Regression],
    /// Rule id and streak length of the longest current top-3 streak.
    pub top_rule_streak: Option<(String, usize)>,
}

/// Apply the generation rules to the context.
pub fn generate_insights(ctx: &InsightContext<'_>) -> Vec<Insight> {
    let mut insights = Vec::new();

    if ctx.scan_count < 3 {
        insights.push(Insight {
            category: "data".to_string(),
            severity: "INFO".to_string(),
            priority: "INFO".to_string(),
            icon: "ℹ️".to_string(),
            message: format!("Only {} scan(s) in the window", ctx.scan_count),
            details: "Trend statistics need at least three scans to be meaningful.".to_string(),
            recommended_action: "Keep scanning on a regular cadence to build history."
                .to_string(),
        });
    }

    if ctx.total_change <= STRONG_IMPROVEMENT_CHANGE {
        insights.push(Insight {
            category: "improvement".to_string(),
            severity: "INFO".to_string(),
            priority: "HIGH".to_string(),
            icon: "📈".to_string(),
            message: format!("Findings dropped by {} over the window", -ctx.total_change),
            details: format!(
                "Net change of {} findings between the first and last scan.",
                ctx.total_change
            ),
            recommended_action: "Capture what worked and fold it into the team playbook."
                .to_string(),
        });
    }

    let strong_regression = ctx
        .regressions
        .iter()
        .find(|r| r.severity == "CRITICAL" || r.severity == "HIGH");
    if let Some(regression) = strong_regression {
        insights.push(Insight {
            category: "regression".to_string(),
            severity: regression.severity.clone(),
            priority: "HIGH".to_string(),
            icon: "🚨".to_string(),
            message: "Security posture regressed between consecutive scans".to_string(),
            details: regression.message.clone(),
            recommended_action: "Triage the newly introduced findings before the next release."
                .to_string(),
        });
    }

    if let Some((rule_id, streak)) = &ctx.top_rule_streak {
        if *streak >= RECURRING_RULE_STREAK {
            insights.push(Insight {
                category: "recurring_rule".to_string(),
                severity: "MEDIUM".to_string(),
                priority: "MEDIUM".to_string(),
                icon: "🔁".to_string(),
                message: format!("Rule {rule_id} keeps appearing in the top findings"),
                details: format!(
                    "{rule_id} has been in the top three for {streak} consecutive scans."
                ),
                recommended_action:
                    "Address the root cause or add a targeted suppression with a reason."
                        .to_string(),
            });
        }
    }

    if ctx.resolved - ctx.introduced >= HIGH_VELOCITY_NET {
        insights.push(Insight {
            category: "remediation_velocity".to_string(),
            severity: "INFO".to_string(),
            priority: "MEDIUM".to_string(),
            icon: "⚡".to_string(),
            message: "High remediation velocity".to_string(),
            details: format!(
                "{} findings resolved against {} introduced in the window.",
                ctx.resolved, ctx.introduced
            ),
            recommended_action: "Keep the fix-forward momentum going.".to_string(),
        });
    }

    insights
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_ctx() -> InsightContext<'static> {
        InsightContext {
            scan_count: 10,
            ..Default::default()
        }
    }

    #[test]
    fn test_insufficient_data() {
        let ctx = InsightContext {
            scan_count: 2,
            ..Default::default()
        };
        let insights = generate_insights(&ctx);
        assert_eq!(insights.len(), 1);
        assert_eq!(insights[0].priority, "INFO");
        assert_eq!(insights[0].category, "data");
    }

    #[test]
    fn test_strong_improvement() {
        let ctx = InsightContext {
            total_change: -25,
            ..base_ctx()
        };
        let insights = generate_insights(&ctx);
        assert!(insights
            .iter()
            .any(|i| i.category == "improvement" && i.priority == "HIGH"));
    }

    #[test]
    fn test_strong_regression() {
        let regressions = vec![Regression {
            severity: "CRITICAL".to_string(),
            category: "severity_increase".to_string(),
            message: "CRITICAL findings rose from 0 to 1".to_string(),
            previous_value: 0.0,
            current_value: 1.0,
        }];
        let ctx = InsightContext {
            regressions: &regressions,
            ..base_ctx()
        };
        let insights = generate_insights(&ctx);
        let regression = insights
            .iter()
            .find(|i| i.category == "regression")
            .unwrap();
        assert_eq!(regression.priority, "HIGH");
        assert!(regression.details.contains("rose from 0 to 1"));
    }

    #[test]
    fn test_recurring_rule_needs_streak_of_three() {
        let ctx = InsightContext {
            top_rule_streak: Some(("CVE-2024-1".to_string(), 2)),
            ..base_ctx()
        };
        assert!(generate_insights(&ctx)
            .iter()
            .all(|i| i.category != "recurring_rule"));

        let ctx = InsightContext {
            top_rule_streak: Some(("CVE-2024-1".to_string(), 3)),
            ..base_ctx()
        };
        assert!(generate_insights(&ctx)
            .iter()
            .any(|i| i.category == "recurring_rule" && i.priority == "MEDIUM"));
    }

    #[test]
    fn test_remediation_velocity() {
        let ctx = InsightContext {
            resolved: 20,
            introduced: 4,
            ..base_ctx()
        };
        assert!(generate_insights(&ctx)
            .iter()
            .any(|i| i.category == "remediation_velocity"));

        let ctx = InsightContext {
            resolved: 20,
            introduced: 10,
            ..base_ctx()
        };
        assert!(generate_insights(&ctx)
            .iter()
            .all(|i| i.category != "remediation_velocity"));
    }

    #[test]
    fn test_quiet_window_yields_nothing() {
        let insights = generate_insights(&base_ctx());
        assert!(insights.is_empty());
    }
}
