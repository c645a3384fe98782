use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use serde::Serialize;

use crate::models::{BiomarkerSample, BiomarkerStatus, HealthHistory, Range};
use crate::trend::{recent_trend, TrendDirection};

/// Biomarkers whose abnormal readings escalate straight to critical.
pub const CRITICAL_BIOMARKERS: [&str; 3] = ["C-Reactive Protein", "HbA1c", "Vitamin D"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum AlertLevel {
    Normal,
    Info,
    Warning,
    Critical,
}

impl fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AlertLevel::Normal => "Normal",
            AlertLevel::Info => "Info",
            AlertLevel::Warning => "Warning",
            AlertLevel::Critical => "Critical",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusIndicator {
    pub biomarker_name: String,
    pub current_value: f64,
    pub units: String,
    pub status: BiomarkerStatus,
    pub trend: TrendDirection,
    pub severity: u8,
    pub alert_level: AlertLevel,
    pub last_updated: NaiveDate,
    pub optimal_range: Option<Range>,
    pub reference_range: Option<Range>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    pub biomarker_name: String,
    pub alert_level: AlertLevel,
    pub message: String,
    pub raised_on: NaiveDate,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BiomarkerSummary {
    pub total: usize,
    pub optimal: usize,
    pub warning: usize,
    pub critical: usize,
    pub improving: usize,
    pub declining: usize,
    pub last_updated: Option<NaiveDate>,
}

impl BiomarkerSummary {
    fn percentage(&self, count: usize) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            count as f64 / self.total as f64 * 100.0
        }
    }

    pub fn optimal_percentage(&self) -> f64 {
        self.percentage(self.optimal)
    }

    pub fn warning_percentage(&self) -> f64 {
        self.percentage(self.warning)
    }

    pub fn critical_percentage(&self) -> f64 {
        self.percentage(self.critical)
    }
}

/// Latest sample per biomarker name. Same-day readings resolve to the highest sequence id.
pub fn latest_per_name(samples: &[BiomarkerSample]) -> Vec<&BiomarkerSample> {
    let mut latest: BTreeMap<&str, &BiomarkerSample> = BTreeMap::new();
    for sample in samples {
        latest
            .entry(sample.name.as_str())
            .and_modify(|current| {
                if (sample.test_date, sample.id) > (current.test_date, current.id) {
                    *current = sample;
                }
            })
            .or_insert(sample);
    }
    latest.into_values().collect()
}

/// Distance from the optimal range on a 1-5 scale, 0 when optimal.
///
/// Readings flagged High are measured against the optimal maximum, all other
/// non-optimal readings against the optimal minimum. Without an optimal range
/// (or with a zero boundary) severity is not computable and reads as 0.
pub fn severity(sample: &BiomarkerSample) -> u8 {
    if sample.status == BiomarkerStatus::Optimal {
        return 0;
    }
    let Some(optimal) = sample.optimal_range else {
        return 0;
    };

    let boundary = if sample.status == BiomarkerStatus::High {
        optimal.max
    } else {
        optimal.min
    };
    if boundary == 0.0 {
        return 0;
    }

    let deviation = ((sample.value - boundary) / boundary).abs();
    (deviation * 10.0).round().clamp(1.0, 5.0) as u8
}

pub fn alert_level(sample: &BiomarkerSample, trend: TrendDirection) -> AlertLevel {
    let out_of_range = matches!(sample.status, BiomarkerStatus::High | BiomarkerStatus::Low);

    if CRITICAL_BIOMARKERS.contains(&sample.name.as_str()) {
        if out_of_range {
            return AlertLevel::Critical;
        }
        if sample.status == BiomarkerStatus::Normal {
            return AlertLevel::Warning;
        }
    }

    if out_of_range {
        return AlertLevel::Warning;
    }
    if sample.status == BiomarkerStatus::Normal && trend == TrendDirection::Declining {
        return AlertLevel::Info;
    }
    AlertLevel::Normal
}

pub fn alert_message(indicator: &StatusIndicator) -> String {
    match indicator.alert_level {
        AlertLevel::Critical => format!(
            "CRITICAL: {} is {} ({} {})",
            indicator.biomarker_name, indicator.status, indicator.current_value, indicator.units
        ),
        AlertLevel::Warning => format!(
            "WARNING: {} is {} ({} {})",
            indicator.biomarker_name, indicator.status, indicator.current_value, indicator.units
        ),
        AlertLevel::Info => format!(
            "INFO: {} is {} but trending {}",
            indicator.biomarker_name, indicator.status, indicator.trend
        ),
        AlertLevel::Normal => format!(
            "Normal: {} is {}",
            indicator.biomarker_name, indicator.status
        ),
    }
}

/// One indicator per biomarker, most urgent first.
pub fn status_indicators(history: &HealthHistory) -> Vec<StatusIndicator> {
    let mut indicators: Vec<StatusIndicator> = latest_per_name(&history.biomarkers)
        .into_iter()
        .map(|latest| {
            let trend = recent_trend(&history.biomarker_series(&latest.name));
            StatusIndicator {
                biomarker_name: latest.name.clone(),
                current_value: latest.value,
                units: latest.units.clone(),
                status: latest.status,
                trend,
                severity: severity(latest),
                alert_level: alert_level(latest, trend),
                last_updated: latest.test_date,
                optimal_range: latest.optimal_range,
                reference_range: latest.reference_range,
            }
        })
        .collect();

    indicators.sort_by(|a, b| {
        b.alert_level
            .cmp(&a.alert_level)
            .then_with(|| a.biomarker_name.cmp(&b.biomarker_name))
    });
    indicators
}

pub fn active_alerts(history: &HealthHistory) -> Vec<Alert> {
    let alerts: Vec<Alert> = status_indicators(history)
        .iter()
        .filter(|indicator| indicator.alert_level >= AlertLevel::Warning)
        .map(|indicator| Alert {
            biomarker_name: indicator.biomarker_name.clone(),
            alert_level: indicator.alert_level,
            message: alert_message(indicator),
            raised_on: indicator.last_updated,
        })
        .collect();

    if !alerts.is_empty() {
        tracing::debug!(count = alerts.len(), "active biomarker alerts");
    }
    alerts
}

pub fn summarize(indicators: &[StatusIndicator]) -> BiomarkerSummary {
    BiomarkerSummary {
        total: indicators.len(),
        optimal: indicators
            .iter()
            .filter(|i| i.status == BiomarkerStatus::Optimal)
            .count(),
        warning: indicators
            .iter()
            .filter(|i| i.alert_level == AlertLevel::Warning)
            .count(),
        critical: indicators
            .iter()
            .filter(|i| i.alert_level == AlertLevel::Critical)
            .count(),
        improving: indicators
            .iter()
            .filter(|i| i.trend == TrendDirection::Improving)
            .count(),
        declining: indicators
            .iter()
            .filter(|i| i.trend == TrendDirection::Declining)
            .count(),
        last_updated: indicators.iter().map(|i| i.last_updated).max(),
    }
}

pub fn biomarker_summary(history: &HealthHistory) -> BiomarkerSummary {
    summarize(&status_indicators(history))
}
