use std::fmt;

use chrono::NaiveDate;
use serde::Serialize;

use crate::models::{BiomarkerSample, HealthHistory, LifestyleMetric};

/// Percent change below which a two-point trend counts as flat.
pub const STABLE_PERCENT_BAND: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TrendDirection {
    Improving,
    Declining,
    Stable,
}

impl fmt::Display for TrendDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TrendDirection::Improving => "Improving",
            TrendDirection::Declining => "Declining",
            TrendDirection::Stable => "Stable",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum MetricKind {
    Biomarker,
    Promis,
    Lifestyle,
}

impl MetricKind {
    /// Minimum |slope| per sample step for a trend to count as significant.
    pub fn significance_threshold(&self) -> f64 {
        match self {
            MetricKind::Biomarker => 0.1,
            MetricKind::Promis => 2.0,
            MetricKind::Lifestyle => 0.5,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            MetricKind::Biomarker => "Biomarker",
            MetricKind::Promis => "PROMIS",
            MetricKind::Lifestyle => "Lifestyle",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Significance {
    Stable,
    Significant,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthTrend {
    pub metric_name: String,
    pub kind: MetricKind,
    pub direction: TrendDirection,
    pub strength: f64,
    pub significance: Significance,
    pub data_points: usize,
    pub last_value: f64,
    pub units: Option<String>,
}

/// Ordinary least squares slope with x taken as the sample position.
///
/// Calendar spacing is ignored: samples a week apart and a year apart weigh
/// the same. Fewer than two values give a flat slope.
pub fn linear_slope(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }

    let n_f = n as f64;
    let mut sum_x = 0.0;
    let mut sum_y = 0.0;
    let mut sum_xy = 0.0;
    let mut sum_x2 = 0.0;
    for (i, y) in values.iter().enumerate() {
        let x = i as f64;
        sum_x += x;
        sum_y += y;
        sum_xy += x * y;
        sum_x2 += x * x;
    }

    let denominator = n_f * sum_x2 - sum_x * sum_x;
    if denominator == 0.0 {
        return 0.0;
    }
    (n_f * sum_xy - sum_x * sum_y) / denominator
}

pub fn slope_direction(slope: f64) -> TrendDirection {
    if slope > 0.0 {
        TrendDirection::Improving
    } else if slope < 0.0 {
        TrendDirection::Declining
    } else {
        TrendDirection::Stable
    }
}

pub fn significance(kind: MetricKind, slope: f64) -> Significance {
    if slope.abs() > kind.significance_threshold() {
        Significance::Significant
    } else {
        Significance::Stable
    }
}

pub fn percent_change(previous: f64, recent: f64) -> f64 {
    if previous == 0.0 {
        return 0.0;
    }
    (recent - previous) / previous * 100.0
}

pub fn two_point_trend(previous: f64, recent: f64) -> TrendDirection {
    if previous == 0.0 {
        return TrendDirection::Stable;
    }
    let change = percent_change(previous, recent);
    if change.abs() < STABLE_PERCENT_BAND {
        TrendDirection::Stable
    } else if change > 0.0 {
        TrendDirection::Improving
    } else {
        TrendDirection::Declining
    }
}

/// Two-point trend over the latest pair of a chronologically ordered series.
pub fn recent_trend(series: &[&BiomarkerSample]) -> TrendDirection {
    match series {
        [.., previous, recent] => two_point_trend(previous.value, recent.value),
        _ => TrendDirection::Stable,
    }
}

/// Trend line for one metric, `None` below two observations.
pub fn trend_for(
    metric_name: &str,
    kind: MetricKind,
    values: &[f64],
    units: Option<String>,
) -> Option<HealthTrend> {
    let last_value = *values.last()?;
    if values.len() < 2 {
        return None;
    }
    let slope = linear_slope(values);
    Some(HealthTrend {
        metric_name: metric_name.to_string(),
        kind,
        direction: slope_direction(slope),
        strength: slope.abs(),
        significance: significance(kind, slope),
        data_points: values.len(),
        last_value,
        units,
    })
}

/// Regression trends for every biomarker, PROMIS domain and lifestyle metric
/// with at least two observations on or after `since`.
pub fn health_trends(history: &HealthHistory, since: NaiveDate) -> Vec<HealthTrend> {
    let mut trends = Vec::new();

    for name in history.biomarker_names() {
        let series: Vec<&BiomarkerSample> = history
            .biomarker_series(name)
            .into_iter()
            .filter(|b| b.test_date >= since)
            .collect();
        let values: Vec<f64> = series.iter().map(|b| b.value).collect();
        let units = series.last().map(|b| b.units.clone());
        if let Some(trend) = trend_for(name, MetricKind::Biomarker, &values, units) {
            trends.push(trend);
        }
    }

    for domain in history.promis_domains() {
        let values: Vec<f64> = history
            .promis_series(domain)
            .into_iter()
            .filter(|p| p.assessed_on >= since)
            .map(|p| p.t_score)
            .collect();
        if let Some(trend) = trend_for(domain, MetricKind::Promis, &values, None) {
            trends.push(trend);
        }
    }

    let mut lifestyle: Vec<_> = history
        .lifestyle
        .iter()
        .filter(|l| l.recorded_on >= since)
        .collect();
    lifestyle.sort_by_key(|l| (l.recorded_on, l.id));
    for metric in LifestyleMetric::ALL {
        let values: Vec<f64> = lifestyle.iter().filter_map(|l| metric.value(l)).collect();
        if let Some(trend) = trend_for(metric.label(), MetricKind::Lifestyle, &values, None) {
            trends.push(trend);
        }
    }

    trends.sort_by(|a, b| {
        b.significance.cmp(&a.significance).then(
            b.strength
                .partial_cmp(&a.strength)
                .unwrap_or(std::cmp::Ordering::Equal),
        )
    });
    tracing::debug!(count = trends.len(), %since, "computed health trends");
    trends
}
