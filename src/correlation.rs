use serde::Serialize;

use crate::models::{BiomarkerSample, HealthHistory};

/// Largest day gap at which two samples are still paired.
pub const ALIGNMENT_TOLERANCE_DAYS: i64 = 30;
/// Fewer aligned pairs than this and no coefficient is reported.
pub const MIN_ALIGNED_PAIRS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CorrelationStrength {
    Strong,
    Moderate,
    Weak,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CorrelationSign {
    Positive,
    Negative,
}

#[derive(Debug, Clone, Serialize)]
pub struct Correlation {
    pub first: String,
    pub second: String,
    pub coefficient: f64,
    pub data_points: usize,
    pub strength: CorrelationStrength,
    pub sign: CorrelationSign,
}

/// Pairs every sample in `a` with the closest-dated sample in `b`.
///
/// Pairs further apart than the tolerance are dropped. A sample in `b` can be
/// reused for several samples in `a`; on equal gaps the earlier `b` wins.
pub fn align_nearest(
    a: &[&BiomarkerSample],
    b: &[&BiomarkerSample],
    tolerance_days: i64,
) -> Vec<(f64, f64)> {
    let mut pairs = Vec::new();

    for point in a {
        let closest = b
            .iter()
            .map(|other| ((other.test_date - point.test_date).num_days().abs(), *other))
            .min_by_key(|(gap, other)| (*gap, other.test_date, other.id));

        if let Some((gap, other)) = closest {
            if gap <= tolerance_days {
                pairs.push((point.value, other.value));
            }
        }
    }

    pairs
}

/// Sample Pearson coefficient over mean-centred sums.
///
/// A series whose spread is lost in rounding counts as constant and yields
/// 0.0, the same as an exactly flat one.
pub fn pearson(pairs: &[(f64, f64)]) -> f64 {
    if pairs.len() < 2 {
        return 0.0;
    }

    let n = pairs.len() as f64;
    let mean_x = pairs.iter().map(|(x, _)| x).sum::<f64>() / n;
    let mean_y = pairs.iter().map(|(_, y)| y).sum::<f64>() / n;

    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    let (mut sum_x2, mut sum_y2) = (0.0, 0.0);
    for &(x, y) in pairs {
        let (dx, dy) = (x - mean_x, y - mean_y);
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
        sum_x2 += x * x;
        sum_y2 += y * y;
    }

    if sxx <= f64::EPSILON * sum_x2 || syy <= f64::EPSILON * sum_y2 {
        return 0.0;
    }
    let r = sxy / (sxx * syy).sqrt();
    if r.is_finite() {
        r.clamp(-1.0, 1.0)
    } else {
        0.0
    }
}

pub fn classify_strength(coefficient: f64) -> CorrelationStrength {
    let magnitude = coefficient.abs();
    if magnitude > 0.7 {
        CorrelationStrength::Strong
    } else if magnitude > 0.4 {
        CorrelationStrength::Moderate
    } else {
        CorrelationStrength::Weak
    }
}

pub fn classify_sign(coefficient: f64) -> CorrelationSign {
    if coefficient > 0.0 {
        CorrelationSign::Positive
    } else {
        CorrelationSign::Negative
    }
}

/// `None` when the series do not overlap in enough places to say anything.
pub fn correlate(
    first: &str,
    a: &[&BiomarkerSample],
    second: &str,
    b: &[&BiomarkerSample],
) -> Option<Correlation> {
    let pairs = align_nearest(a, b, ALIGNMENT_TOLERANCE_DAYS);
    if pairs.len() < MIN_ALIGNED_PAIRS {
        return None;
    }

    let coefficient = pearson(&pairs);
    Some(Correlation {
        first: first.to_string(),
        second: second.to_string(),
        coefficient,
        data_points: pairs.len(),
        strength: classify_strength(coefficient),
        sign: classify_sign(coefficient),
    })
}

/// Correlations across every pair of biomarkers on record, strongest first.
pub fn biomarker_correlations(history: &HealthHistory) -> Vec<Correlation> {
    let names: Vec<&str> = history.biomarker_names().into_iter().collect();
    let series: Vec<Vec<&BiomarkerSample>> =
        names.iter().map(|name| history.biomarker_series(name)).collect();

    let mut correlations = Vec::new();
    for i in 0..names.len() {
        for j in (i + 1)..names.len() {
            if let Some(correlation) = correlate(names[i], &series[i], names[j], &series[j]) {
                correlations.push(correlation);
            }
        }
    }

    correlations.sort_by(|a, b| {
        b.coefficient
            .abs()
            .partial_cmp(&a.coefficient.abs())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    tracing::debug!(
        biomarkers = names.len(),
        correlations = correlations.len(),
        "computed biomarker correlations"
    );
    correlations
}
