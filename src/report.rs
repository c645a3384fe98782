use std::fmt::Write;

use chrono::NaiveDate;

use crate::correlation::{biomarker_correlations, CorrelationStrength};
use crate::effectiveness::{personalized_plan, treatment_outcomes};
use crate::models::{HealthHistory, TreatmentCatalog};
use crate::recommend::RecommendationEngine;
use crate::status::{active_alerts, biomarker_summary};
use crate::trend::{health_trends, Significance};

pub fn build_report(
    email: &str,
    as_of: NaiveDate,
    since: NaiveDate,
    history: &HealthHistory,
    catalog: &TreatmentCatalog,
    engine: &RecommendationEngine,
) -> String {
    let summary = biomarker_summary(history);
    let alerts = active_alerts(history);
    let trends = health_trends(history, since);
    let correlations = biomarker_correlations(history);
    let outcomes = treatment_outcomes(history, catalog, as_of);
    let recommendations = engine.recommend(history, catalog);
    let plan = personalized_plan(history, catalog, as_of);

    let mut output = String::new();

    let _ = writeln!(output, "# Wellness Analytics Report");
    let _ = writeln!(output, "Generated for {} on {} (trends since {})", email, as_of, since);
    let _ = writeln!(output);
    let _ = writeln!(output, "## Health Status");

    if summary.total == 0 {
        let _ = writeln!(output, "No biomarker results on record.");
    } else {
        let _ = writeln!(output, "Overall: {}", plan.current_health_status);
        let _ = writeln!(
            output,
            "- {} biomarkers tracked: {:.0}% optimal, {} warning, {} critical",
            summary.total,
            summary.optimal_percentage(),
            summary.warning,
            summary.critical
        );
        let _ = writeln!(
            output,
            "- {} improving, {} declining",
            summary.improving, summary.declining
        );
        if let Some(last) = summary.last_updated {
            let _ = writeln!(output, "- Last lab result: {}", last);
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Active Alerts");

    if alerts.is_empty() {
        let _ = writeln!(output, "No active alerts.");
    } else {
        for alert in &alerts {
            let _ = writeln!(output, "- {} ({})", alert.message, alert.raised_on);
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Significant Trends");

    let significant: Vec<_> = trends
        .iter()
        .filter(|t| t.significance == Significance::Significant)
        .collect();
    if significant.is_empty() {
        let _ = writeln!(output, "No significant trends in this window.");
    } else {
        for trend in significant {
            let _ = writeln!(
                output,
                "- {} [{}]: {} (slope {:.2} over {} points, latest {}{})",
                trend.metric_name,
                trend.kind.label(),
                trend.direction,
                trend.strength,
                trend.data_points,
                trend.last_value,
                trend
                    .units
                    .as_deref()
                    .map(|u| format!(" {u}"))
                    .unwrap_or_default()
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Biomarker Correlations");

    let notable: Vec<_> = correlations
        .iter()
        .filter(|c| c.strength != CorrelationStrength::Weak)
        .take(5)
        .collect();
    if notable.is_empty() {
        let _ = writeln!(output, "No strong or moderate correlations found.");
    } else {
        for c in notable {
            let _ = writeln!(
                output,
                "- {} / {}: r = {:.2} ({:?} {:?}, {} paired results)",
                c.first, c.second, c.coefficient, c.strength, c.sign, c.data_points
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Treatment Outcomes");

    if outcomes.is_empty() {
        let _ = writeln!(output, "No treatments on record.");
    } else {
        for outcome in &outcomes {
            let _ = writeln!(
                output,
                "- {} since {}: {:.1}/100 ({:?}), {} biomarkers and {} PROMIS domains measured",
                outcome.treatment_name,
                outcome.start_date,
                outcome.overall_effectiveness,
                outcome.level(),
                outcome.biomarker_outcomes.len(),
                outcome.promis_outcomes.len()
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Recommendations");

    if recommendations.is_empty() {
        let _ = writeln!(output, "No new treatments to recommend.");
    } else {
        for rec in recommendations.iter().take(5) {
            let _ = writeln!(
                output,
                "- {} (priority {}): {}",
                rec.treatment_name, rec.priority_score, rec.reasoning
            );
        }
    }

    if !plan.health_goals.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "## Health Goals");
        for goal in &plan.health_goals {
            let _ = writeln!(output, "- {}", goal);
        }
        let _ = writeln!(output);
        let _ = writeln!(output, "Monitoring: {}", plan.monitoring_plan);
    }

    output
}
