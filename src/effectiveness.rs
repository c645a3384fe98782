use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;

use crate::models::{
    BiomarkerSample, BiomarkerStatus, EvidenceLevel, HealthHistory, PromisSample, Sample,
    TreatmentCatalog, TreatmentCategory, TreatmentEpisode,
};
use crate::status::latest_per_name;
use crate::trend::{percent_change, trend_for, HealthTrend, MetricKind};

pub const BIOMARKER_WEIGHT: f64 = 40.0;
pub const PROMIS_WEIGHT: f64 = 30.0;
pub const SIDE_EFFECT_WEIGHT: f64 = 20.0;
pub const ADHERENCE_WEIGHT: f64 = 10.0;
pub const RATING_BONUS_PER_POINT: f64 = 2.0;
/// Effectiveness gap beyond which one treatment is called clearly better.
pub const COMPARISON_GAP: f64 = 20.0;
/// Outcomes at or above this score become suggestions in a personal plan.
pub const SUGGESTION_THRESHOLD: f64 = 70.0;
/// PROMIS T-scores below this count as a concern.
pub const PROMIS_CONCERN_T_SCORE: f64 = 45.0;

const SEVERITY_KEYWORDS: [(&str, u8); 8] = [
    ("mild", 1),
    ("minor", 1),
    ("slight", 1),
    ("moderate", 2),
    ("medium", 2),
    ("severe", 3),
    ("serious", 3),
    ("significant", 3),
];

/// Directional reading of a status change, best state being Optimal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StatusShift {
    Improved,
    Unchanged,
    Worsened,
}

impl StatusShift {
    pub fn between(before: BiomarkerStatus, after: BiomarkerStatus) -> Self {
        match after.desirability().cmp(&before.desirability()) {
            Ordering::Greater => StatusShift::Improved,
            Ordering::Equal => StatusShift::Unchanged,
            Ordering::Less => StatusShift::Worsened,
        }
    }
}

/// Status change as raw storage-ordinal subtraction (Low=0 .. Optimal=3).
///
/// High sits between Normal and Optimal on this scale, so Normal to High counts
/// as a gain. Outcome scoring still uses this value; `StatusShift` is reported
/// next to it.
pub fn legacy_status_delta(before: BiomarkerStatus, after: BiomarkerStatus) -> i32 {
    after.ordinal() - before.ordinal()
}

#[derive(Debug, Clone, Serialize)]
pub struct BiomarkerOutcome {
    pub biomarker_name: String,
    pub before_value: f64,
    pub after_value: f64,
    pub percent_change: f64,
    pub legacy_status_delta: i32,
    pub status_shift: StatusShift,
    pub units: String,
    pub final_status: BiomarkerStatus,
    pub is_improvement: bool,
}

impl BiomarkerOutcome {
    /// Improvement judged with the directional status tag instead of ordinal subtraction.
    pub fn is_directional_improvement(&self) -> bool {
        self.percent_change > 0.0 && self.status_shift != StatusShift::Worsened
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PromisOutcome {
    pub domain: String,
    pub before_t_score: f64,
    pub after_t_score: f64,
    pub t_score_change: f64,
    pub before_percentile: f64,
    pub after_percentile: f64,
    pub percentile_change: f64,
    pub is_improvement: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SideEffectSeverity {
    None,
    Mild,
    Moderate,
    Severe,
}

#[derive(Debug, Clone, Serialize)]
pub struct SideEffectAnalysis {
    pub side_effects: Vec<String>,
    pub count: usize,
    pub average_severity: f64,
    pub most_common: Vec<String>,
    pub severity_level: SideEffectSeverity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EffectivenessLevel {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl EffectivenessLevel {
    pub fn from_score(score: f64) -> Self {
        if score >= 80.0 {
            EffectivenessLevel::Excellent
        } else if score >= 60.0 {
            EffectivenessLevel::Good
        } else if score >= 40.0 {
            EffectivenessLevel::Fair
        } else {
            EffectivenessLevel::Poor
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TreatmentOutcome {
    pub episode_id: i64,
    pub treatment_id: i64,
    pub treatment_name: String,
    pub category: Option<TreatmentCategory>,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub dosage: Option<String>,
    pub frequency: Option<String>,
    pub response_rating: Option<i32>,
    pub provider_supervised: bool,
    pub biomarker_outcomes: Vec<BiomarkerOutcome>,
    pub promis_outcomes: Vec<PromisOutcome>,
    pub side_effects: SideEffectAnalysis,
    pub adherence: f64,
    pub overall_effectiveness: f64,
}

impl TreatmentOutcome {
    pub fn level(&self) -> EffectivenessLevel {
        EffectivenessLevel::from_score(self.overall_effectiveness)
    }

    pub fn average_biomarker_change(&self) -> f64 {
        mean(self.biomarker_outcomes.iter().map(|o| o.percent_change))
    }

    pub fn average_t_score_change(&self) -> f64 {
        mean(self.promis_outcomes.iter().map(|o| o.t_score_change))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TreatmentComparison {
    pub first: String,
    pub second: String,
    pub effectiveness_gap: f64,
    pub first_biomarker_change: f64,
    pub second_biomarker_change: f64,
    pub first_t_score_change: f64,
    pub second_t_score_change: f64,
    pub first_side_effect_severity: f64,
    pub second_side_effect_severity: f64,
    pub adherence_gap: f64,
    pub recommendation: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TreatmentTimeline {
    pub episode_id: i64,
    pub treatment_name: String,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub dosage: Option<String>,
    pub frequency: Option<String>,
    pub biomarkers: Vec<BiomarkerSample>,
    pub promis: Vec<PromisSample>,
    pub trends: Vec<HealthTrend>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TreatmentSuggestion {
    pub treatment_name: String,
    pub category: TreatmentCategory,
    pub evidence_level: EvidenceLevel,
    pub safety_rating: i32,
    pub recommended_dosage: Option<String>,
    pub expected_effectiveness: f64,
    pub expected_biomarker_improvements: usize,
    pub expected_promis_improvements: usize,
    pub monitoring_required: bool,
    pub common_side_effects: Option<String>,
    pub contraindications: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PersonalizedPlan {
    pub current_health_status: String,
    pub suggestions: Vec<TreatmentSuggestion>,
    pub health_goals: Vec<String>,
    pub monitoring_plan: String,
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

fn fraction(hits: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        hits as f64 / total as f64
    }
}

/// Latest reading before the episode and latest reading inside its window.
fn before_and_after<'a, T>(
    series: &[&'a T],
    episode: &TreatmentEpisode,
    date_of: impl Fn(&T) -> NaiveDate,
) -> Option<(&'a T, &'a T)> {
    let before = series
        .iter()
        .rev()
        .copied()
        .find(|s| date_of(*s) < episode.start_date)?;
    let after = series
        .iter()
        .rev()
        .copied()
        .find(|s| episode.covers(date_of(*s)))?;
    Some((before, after))
}

pub fn biomarker_outcomes(
    history: &HealthHistory,
    episode: &TreatmentEpisode,
) -> Vec<BiomarkerOutcome> {
    history
        .biomarker_names()
        .into_iter()
        .filter_map(|name| {
            let series = history.biomarker_series(name);
            let (before, after) = before_and_after(&series, episode, |b| b.test_date)?;
            let change = percent_change(before.value, after.value);
            let legacy_delta = legacy_status_delta(before.status, after.status);
            Some(BiomarkerOutcome {
                biomarker_name: name.to_string(),
                before_value: before.value,
                after_value: after.value,
                percent_change: change,
                legacy_status_delta: legacy_delta,
                status_shift: StatusShift::between(before.status, after.status),
                units: before.units.clone(),
                final_status: after.status,
                is_improvement: change > 0.0 && legacy_delta >= 0,
            })
        })
        .collect()
}

pub fn promis_outcomes(history: &HealthHistory, episode: &TreatmentEpisode) -> Vec<PromisOutcome> {
    history
        .promis_domains()
        .into_iter()
        .filter_map(|domain| {
            let series = history.promis_series(domain);
            let (before, after) = before_and_after(&series, episode, |p| p.assessed_on)?;
            let change = after.t_score - before.t_score;
            let before_percentile = before.percentile_rank.unwrap_or(0.0);
            let after_percentile = after.percentile_rank.unwrap_or(0.0);
            Some(PromisOutcome {
                domain: domain.to_string(),
                before_t_score: before.t_score,
                after_t_score: after.t_score,
                t_score_change: change,
                before_percentile,
                after_percentile,
                percentile_change: after_percentile - before_percentile,
                is_improvement: change > 0.0,
            })
        })
        .collect()
}

fn mention_severity(effect: &str) -> u8 {
    let lowered = effect.to_lowercase();
    SEVERITY_KEYWORDS
        .iter()
        .find(|(keyword, _)| lowered.contains(keyword))
        .map_or(0, |(_, severity)| *severity)
}

pub fn analyze_side_effects(noted: Option<&str>) -> SideEffectAnalysis {
    let side_effects: Vec<String> = noted
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();

    let count = side_effects.len();
    let average_severity = mean(side_effects.iter().map(|s| f64::from(mention_severity(s))));

    let severity_level = if count == 0 {
        SideEffectSeverity::None
    } else if average_severity <= 1.0 {
        SideEffectSeverity::Mild
    } else if average_severity <= 2.0 {
        SideEffectSeverity::Moderate
    } else {
        SideEffectSeverity::Severe
    };

    // Grouped case-insensitively; ties keep first-mention order.
    let mut tallies: Vec<(String, usize)> = Vec::new();
    for effect in &side_effects {
        let key = effect.to_lowercase();
        match tallies.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 += 1,
            None => tallies.push((key, 1)),
        }
    }
    tallies.sort_by(|a, b| b.1.cmp(&a.1));
    let most_common = tallies.into_iter().take(3).map(|(k, _)| k).collect();

    SideEffectAnalysis {
        side_effects,
        count,
        average_severity,
        most_common,
        severity_level,
    }
}

/// Share of the planned course elapsed by `as_of`, capped at 100. Ongoing courses score 100.
pub fn adherence_score(episode: &TreatmentEpisode, as_of: NaiveDate) -> f64 {
    let Some(end) = episode.end_date else {
        return 100.0;
    };
    let planned = (end - episode.start_date).num_days();
    if planned <= 0 {
        return 100.0;
    }
    let elapsed = (as_of - episode.start_date).num_days().max(0);
    (elapsed as f64 / planned as f64 * 100.0).min(100.0)
}

/// Weighted 0-100 score. Empty outcome lists contribute nothing to their share.
pub fn overall_effectiveness(
    biomarkers: &[BiomarkerOutcome],
    promis: &[PromisOutcome],
    side_effects: &SideEffectAnalysis,
    adherence: f64,
    response_rating: Option<i32>,
) -> f64 {
    let biomarker_hits = biomarkers.iter().filter(|o| o.is_improvement).count();
    let promis_hits = promis.iter().filter(|o| o.is_improvement).count();

    let mut score = fraction(biomarker_hits, biomarkers.len()) * BIOMARKER_WEIGHT;
    score += fraction(promis_hits, promis.len()) * PROMIS_WEIGHT;
    score += (100.0 - side_effects.average_severity) / 100.0 * SIDE_EFFECT_WEIGHT;
    score += adherence / 100.0 * ADHERENCE_WEIGHT;
    if let Some(rating) = response_rating {
        score += f64::from(rating) * RATING_BONUS_PER_POINT;
    }

    score.clamp(0.0, 100.0)
}

fn treatment_name(catalog: &TreatmentCatalog, treatment_id: i64) -> String {
    catalog
        .by_id(treatment_id)
        .map(|t| t.name.clone())
        .unwrap_or_else(|| format!("Treatment #{treatment_id}"))
}

pub fn score_episode(
    history: &HealthHistory,
    catalog: &TreatmentCatalog,
    episode: &TreatmentEpisode,
    as_of: NaiveDate,
) -> TreatmentOutcome {
    let biomarker_outcomes = biomarker_outcomes(history, episode);
    let promis_outcomes = promis_outcomes(history, episode);
    let side_effects = analyze_side_effects(episode.side_effects_noted.as_deref());
    let adherence = adherence_score(episode, as_of);
    let overall_effectiveness = overall_effectiveness(
        &biomarker_outcomes,
        &promis_outcomes,
        &side_effects,
        adherence,
        episode.response_rating,
    );

    TreatmentOutcome {
        episode_id: episode.id,
        treatment_id: episode.treatment_id,
        treatment_name: treatment_name(catalog, episode.treatment_id),
        category: catalog.by_id(episode.treatment_id).map(|t| t.category),
        start_date: episode.start_date,
        end_date: episode.end_date,
        dosage: episode.dosage.clone(),
        frequency: episode.frequency.clone(),
        response_rating: episode.response_rating,
        provider_supervised: episode.provider_supervised,
        biomarker_outcomes,
        promis_outcomes,
        side_effects,
        adherence,
        overall_effectiveness,
    }
}

/// Every episode on record scored and ranked, most effective first.
pub fn treatment_outcomes(
    history: &HealthHistory,
    catalog: &TreatmentCatalog,
    as_of: NaiveDate,
) -> Vec<TreatmentOutcome> {
    let mut outcomes: Vec<TreatmentOutcome> = history
        .treatments
        .iter()
        .map(|episode| score_episode(history, catalog, episode, as_of))
        .collect();

    outcomes.sort_by(|a, b| {
        b.overall_effectiveness
            .partial_cmp(&a.overall_effectiveness)
            .unwrap_or(Ordering::Equal)
    });
    tracing::debug!(episodes = outcomes.len(), %as_of, "scored treatment outcomes");
    outcomes
}

pub fn comparison_recommendation(first: &str, second: &str, gap: f64) -> String {
    if gap > COMPARISON_GAP {
        format!("{first} is significantly more effective than {second}")
    } else if gap < -COMPARISON_GAP {
        format!("{second} is significantly more effective than {first}")
    } else {
        "Both treatments show similar effectiveness".to_string()
    }
}

/// Pairwise comparison of scored outcomes, widest gap first.
pub fn compare_treatments(outcomes: &[TreatmentOutcome]) -> Vec<TreatmentComparison> {
    let mut comparisons = Vec::new();

    for (i, first) in outcomes.iter().enumerate() {
        for second in &outcomes[i + 1..] {
            let gap = first.overall_effectiveness - second.overall_effectiveness;
            comparisons.push(TreatmentComparison {
                first: first.treatment_name.clone(),
                second: second.treatment_name.clone(),
                effectiveness_gap: gap,
                first_biomarker_change: first.average_biomarker_change(),
                second_biomarker_change: second.average_biomarker_change(),
                first_t_score_change: first.average_t_score_change(),
                second_t_score_change: second.average_t_score_change(),
                first_side_effect_severity: first.side_effects.average_severity,
                second_side_effect_severity: second.side_effects.average_severity,
                adherence_gap: first.adherence - second.adherence,
                recommendation: comparison_recommendation(
                    &first.treatment_name,
                    &second.treatment_name,
                    gap,
                ),
            });
        }
    }

    comparisons.sort_by(|a, b| {
        b.effectiveness_gap
            .abs()
            .partial_cmp(&a.effectiveness_gap.abs())
            .unwrap_or(Ordering::Equal)
    });
    comparisons
}

/// Measurements recorded during one episode, with a trend line per metric.
pub fn treatment_timeline(
    history: &HealthHistory,
    catalog: &TreatmentCatalog,
    episode_id: i64,
) -> Option<TreatmentTimeline> {
    let episode = history.treatments.iter().find(|t| t.id == episode_id)?;

    let mut biomarkers = Vec::new();
    let mut promis = Vec::new();
    for sample in history.samples() {
        if !episode.covers(sample.date()) {
            continue;
        }
        match sample {
            Sample::Biomarker(b) => biomarkers.push(b.clone()),
            Sample::Promis(p) => promis.push(p.clone()),
            Sample::Lifestyle(_) | Sample::Treatment(_) => {}
        }
    }

    let mut series: BTreeMap<(MetricKind, &str), (Vec<f64>, Option<String>)> = BTreeMap::new();
    for b in &biomarkers {
        series
            .entry((MetricKind::Biomarker, b.name.as_str()))
            .or_insert_with(|| (Vec::new(), Some(b.units.clone())))
            .0
            .push(b.value);
    }
    for p in &promis {
        series
            .entry((MetricKind::Promis, p.domain.as_str()))
            .or_insert_with(|| (Vec::new(), None))
            .0
            .push(p.t_score);
    }
    let trends = series
        .into_iter()
        .filter_map(|((kind, name), (values, units))| trend_for(name, kind, &values, units))
        .collect();

    Some(TreatmentTimeline {
        episode_id: episode.id,
        treatment_name: treatment_name(catalog, episode.treatment_id),
        start_date: episode.start_date,
        end_date: episode.end_date,
        dosage: episode.dosage.clone(),
        frequency: episode.frequency.clone(),
        biomarkers,
        promis,
        trends,
    })
}

pub fn health_status_label(optimal_percentage: f64) -> &'static str {
    if optimal_percentage >= 80.0 {
        "Excellent"
    } else if optimal_percentage >= 60.0 {
        "Good"
    } else if optimal_percentage >= 40.0 {
        "Fair"
    } else {
        "Needs Improvement"
    }
}

/// Plan built from what already worked for this subject plus current gaps.
pub fn personalized_plan(
    history: &HealthHistory,
    catalog: &TreatmentCatalog,
    as_of: NaiveDate,
) -> PersonalizedPlan {
    let outcomes = treatment_outcomes(history, catalog, as_of);

    let mut suggestions: Vec<TreatmentSuggestion> = outcomes
        .iter()
        .filter(|o| o.overall_effectiveness >= SUGGESTION_THRESHOLD)
        .filter_map(|o| {
            let treatment = catalog.by_id(o.treatment_id)?;
            Some(TreatmentSuggestion {
                treatment_name: treatment.name.clone(),
                category: treatment.category,
                evidence_level: treatment.evidence_level,
                safety_rating: treatment.safety_rating,
                recommended_dosage: treatment.typical_dosage.clone(),
                expected_effectiveness: o.overall_effectiveness,
                expected_biomarker_improvements: o
                    .biomarker_outcomes
                    .iter()
                    .filter(|b| b.percent_change > 0.0)
                    .count(),
                expected_promis_improvements: o
                    .promis_outcomes
                    .iter()
                    .filter(|p| p.t_score_change > 0.0)
                    .count(),
                monitoring_required: treatment
                    .monitoring_required
                    .as_deref()
                    .is_some_and(|m| !m.trim().is_empty()),
                common_side_effects: treatment.common_side_effects.clone(),
                contraindications: treatment.contraindications.clone(),
            })
        })
        .collect();
    suggestions.sort_by(|a, b| {
        b.expected_effectiveness
            .partial_cmp(&a.expected_effectiveness)
            .unwrap_or(Ordering::Equal)
    });

    let latest_biomarkers = latest_per_name(&history.biomarkers);
    let optimal = latest_biomarkers
        .iter()
        .filter(|b| b.status == BiomarkerStatus::Optimal)
        .count();
    let optimal_percentage = fraction(optimal, latest_biomarkers.len()) * 100.0;

    let mut health_goals: Vec<String> = latest_biomarkers
        .iter()
        .filter(|b| b.status != BiomarkerStatus::Optimal)
        .take(3)
        .map(|b| format!("Improve {} to optimal range", b.name))
        .collect();
    let low_domains = history.promis_domains().into_iter().filter(|domain| {
        history
            .promis_series(domain)
            .last()
            .is_some_and(|p| p.t_score < PROMIS_CONCERN_T_SCORE)
    });
    health_goals.extend(
        low_domains
            .take(2)
            .map(|domain| format!("Improve {domain} PROMIS score")),
    );

    let monitored: Vec<&str> = suggestions
        .iter()
        .filter(|s| s.monitoring_required)
        .map(|s| s.treatment_name.as_str())
        .collect();
    let monitoring_plan = if monitored.is_empty() {
        "Standard monitoring recommended".to_string()
    } else {
        format!("Monitor: {}", monitored.join(", "))
    };

    PersonalizedPlan {
        current_health_status: health_status_label(optimal_percentage).to_string(),
        suggestions,
        health_goals,
        monitoring_plan,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::*;
    use crate::models::BiomarkerStatus::{High, Low, Normal, Optimal};

    fn improved_biomarker(name: &str, is_improvement: bool) -> BiomarkerOutcome {
        BiomarkerOutcome {
            biomarker_name: name.to_string(),
            before_value: 10.0,
            after_value: 12.0,
            percent_change: 20.0,
            legacy_status_delta: 0,
            status_shift: StatusShift::Unchanged,
            units: "mg/dL".to_string(),
            final_status: Optimal,
            is_improvement,
        }
    }

    fn improved_promis(domain: &str) -> PromisOutcome {
        PromisOutcome {
            domain: domain.to_string(),
            before_t_score: 40.0,
            after_t_score: 46.0,
            t_score_change: 6.0,
            before_percentile: 0.0,
            after_percentile: 0.0,
            percentile_change: 0.0,
            is_improvement: true,
        }
    }

    #[test]
    fn full_marks_scenario_clamps_to_one_hundred() {
        let biomarkers = vec![
            improved_biomarker("A", true),
            improved_biomarker("B", true),
            improved_biomarker("C", true),
            improved_biomarker("D", false),
        ];
        let promis = vec![improved_promis("Fatigue"), improved_promis("Anxiety")];
        let side_effects = analyze_side_effects(None);
        let score = overall_effectiveness(&biomarkers, &promis, &side_effects, 100.0, Some(5));
        assert_eq!(score, 100.0);
    }

    #[test]
    fn empty_outcomes_still_earn_side_effect_adherence_and_rating_terms() {
        let none = analyze_side_effects(None);
        assert_eq!(overall_effectiveness(&[], &[], &none, 100.0, None), 30.0);
        assert_eq!(overall_effectiveness(&[], &[], &none, 100.0, Some(3)), 36.0);
        assert_eq!(overall_effectiveness(&[], &[], &none, 0.0, None), 20.0);
    }

    #[test]
    fn score_never_leaves_bounds() {
        let heavy = analyze_side_effects(Some("severe rash, serious nausea, significant headache"));
        let bad = vec![improved_biomarker("A", false)];
        for rating in [None, Some(1), Some(5), Some(50)] {
            for adherence in [0.0, 50.0, 100.0] {
                let score = overall_effectiveness(&bad, &[], &heavy, adherence, rating);
                assert!((0.0..=100.0).contains(&score));
            }
        }
    }

    #[test]
    fn side_effects_are_keyworded_and_ranked() {
        let analysis =
            analyze_side_effects(Some("Mild nausea, severe headache, mild nausea, ,fatigue"));
        assert_eq!(analysis.count, 4);
        assert!((analysis.average_severity - 5.0 / 4.0).abs() < 1e-9);
        assert_eq!(analysis.severity_level, SideEffectSeverity::Moderate);
        assert_eq!(analysis.most_common[0], "mild nausea");
        assert_eq!(analysis.most_common.len(), 3);

        let empty = analyze_side_effects(Some("  "));
        assert_eq!(empty.count, 0);
        assert_eq!(empty.severity_level, SideEffectSeverity::None);
        assert_eq!(
            analyze_side_effects(Some("slight itch")).severity_level,
            SideEffectSeverity::Mild
        );
        assert_eq!(
            analyze_side_effects(Some("serious rash")).severity_level,
            SideEffectSeverity::Severe
        );
    }

    #[test]
    fn adherence_tracks_elapsed_share_of_planned_course() {
        let mut ep = episode(1, 1, date(2026, 1, 1));
        assert_eq!(adherence_score(&ep, date(2026, 1, 5)), 100.0);

        ep.end_date = Some(date(2026, 1, 11));
        assert_eq!(adherence_score(&ep, date(2026, 1, 6)), 50.0);
        assert_eq!(adherence_score(&ep, date(2026, 3, 1)), 100.0);
        assert_eq!(adherence_score(&ep, date(2025, 12, 1)), 0.0);

        ep.end_date = Some(date(2026, 1, 1));
        assert_eq!(adherence_score(&ep, date(2026, 1, 6)), 100.0);
    }

    #[test]
    fn status_delta_keeps_ordinal_subtraction_alongside_direction() {
        // Normal -> High rises on the storage ordinal but is clinically worse.
        assert_eq!(legacy_status_delta(Normal, High), 1);
        assert_eq!(
            StatusShift::between(Normal, High),
            StatusShift::Worsened
        );
        assert_eq!(
            StatusShift::between(Low, Optimal),
            StatusShift::Improved
        );
        assert_eq!(
            StatusShift::between(Low, High),
            StatusShift::Unchanged
        );

        let history = HealthHistory {
            biomarkers: vec![
                biomarker(1, "LDL", date(2026, 1, 1), 95.0, Some((0.0, 100.0)), Normal),
                biomarker(2, "LDL", date(2026, 3, 1), 120.0, Some((0.0, 100.0)), High),
            ],
            ..HealthHistory::default()
        };
        let outcomes = biomarker_outcomes(&history, &episode(1, 1, date(2026, 2, 1)));
        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].is_improvement);
        assert!(!outcomes[0].is_directional_improvement());
    }

    #[test]
    fn outcomes_use_latest_before_start_and_latest_inside_window() {
        let history = HealthHistory {
            biomarkers: vec![
                biomarker(1, "Vitamin D", date(2025, 10, 1), 20.0, Some((40.0, 60.0)), Low),
                biomarker(2, "Vitamin D", date(2026, 1, 1), 30.0, Some((40.0, 60.0)), Low),
                biomarker(3, "Vitamin D", date(2026, 2, 1), 36.0, Some((40.0, 60.0)), Low),
                biomarker(4, "Vitamin D", date(2026, 6, 1), 70.0, Some((40.0, 60.0)), High),
                biomarker(5, "TSH", date(2026, 2, 1), 2.0, None, Optimal),
            ],
            promis: vec![
                promis(1, "Fatigue", date(2025, 12, 1), 41.0),
                promis(2, "Fatigue", date(2026, 2, 15), 47.0),
            ],
            ..HealthHistory::default()
        };
        let mut ep = episode(1, 1, date(2026, 1, 15));
        ep.end_date = Some(date(2026, 3, 1));

        let bio = biomarker_outcomes(&history, &ep);
        assert_eq!(bio.len(), 1);
        assert_eq!(bio[0].before_value, 30.0);
        assert_eq!(bio[0].after_value, 36.0);
        assert!((bio[0].percent_change - 20.0).abs() < 1e-9);
        assert!(bio[0].is_improvement);

        let pro = promis_outcomes(&history, &ep);
        assert_eq!(pro.len(), 1);
        assert_eq!(pro[0].t_score_change, 6.0);
        assert!(pro[0].is_improvement);
    }

    #[test]
    fn outcomes_rank_and_compare() {
        let mut strong = episode(1, 1, date(2026, 2, 1));
        strong.response_rating = Some(5);
        // Starts after the last reading, so it has no measured outcomes.
        let mut weak = episode(2, 5, date(2026, 5, 1));
        weak.side_effects_noted = Some("severe injection site pain".to_string());
        weak.end_date = Some(date(2026, 12, 1));

        let history = HealthHistory {
            biomarkers: vec![
                biomarker(1, "Vitamin D", date(2026, 1, 1), 32.0, Some((40.0, 60.0)), Low),
                biomarker(2, "Vitamin D", date(2026, 4, 1), 44.0, Some((40.0, 60.0)), Optimal),
            ],
            treatments: vec![weak, strong],
            ..HealthHistory::default()
        };

        let outcomes = treatment_outcomes(&history, &catalog(), date(2026, 3, 3));
        assert_eq!(outcomes[0].treatment_name, "Vitamin D3");
        assert_eq!(outcomes[0].overall_effectiveness, 80.0);
        assert_eq!(outcomes[0].level(), EffectivenessLevel::Excellent);
        assert_eq!(outcomes[1].treatment_name, "BPC-157");

        let comparisons = compare_treatments(&outcomes);
        assert_eq!(comparisons.len(), 1);
        assert!(comparisons[0].effectiveness_gap > 20.0);
        assert_eq!(
            comparisons[0].recommendation,
            "Vitamin D3 is significantly more effective than BPC-157"
        );
    }

    #[test]
    fn comparison_message_is_directional() {
        assert_eq!(
            comparison_recommendation("A", "B", -25.0),
            "B is significantly more effective than A"
        );
        assert_eq!(
            comparison_recommendation("A", "B", 20.0),
            "Both treatments show similar effectiveness"
        );
    }

    #[test]
    fn timeline_collects_window_samples_and_trends() {
        let mut ep = episode(7, 1, date(2026, 1, 1));
        ep.end_date = Some(date(2026, 6, 30));
        let history = HealthHistory {
            biomarkers: vec![
                biomarker(1, "Vitamin D", date(2025, 12, 1), 30.0, None, Low),
                biomarker(2, "Vitamin D", date(2026, 2, 1), 36.0, None, Low),
                biomarker(3, "Vitamin D", date(2026, 5, 1), 44.0, None, Optimal),
            ],
            promis: vec![promis(1, "Fatigue", date(2026, 3, 1), 44.0)],
            treatments: vec![ep],
            ..HealthHistory::default()
        };

        let timeline = treatment_timeline(&history, &catalog(), 7).unwrap();
        assert_eq!(timeline.treatment_name, "Vitamin D3");
        assert_eq!(timeline.biomarkers.len(), 2);
        assert_eq!(timeline.promis.len(), 1);
        assert_eq!(timeline.trends.len(), 1);
        assert!((timeline.trends[0].strength - 8.0).abs() < 1e-9);
        assert!(treatment_timeline(&history, &catalog(), 99).is_none());
    }

    #[test]
    fn timeline_groups_trends_per_metric_in_key_order() {
        let ep = episode(7, 1, date(2026, 1, 1));
        let history = HealthHistory {
            biomarkers: vec![
                biomarker(1, "Vitamin D", date(2026, 1, 10), 30.0, None, Low),
                biomarker(2, "Ferritin", date(2026, 1, 10), 80.0, None, Normal),
                biomarker(3, "Vitamin D", date(2026, 3, 10), 40.0, None, Low),
                biomarker(4, "Ferritin", date(2026, 3, 10), 60.0, None, Normal),
            ],
            promis: vec![
                promis(1, "Fatigue", date(2026, 2, 1), 60.0),
                promis(2, "Fatigue", date(2026, 4, 1), 50.0),
            ],
            treatments: vec![ep],
            ..HealthHistory::default()
        };

        let timeline = treatment_timeline(&history, &catalog(), 7).unwrap();
        let keys: Vec<(MetricKind, &str)> = timeline
            .trends
            .iter()
            .map(|t| (t.kind, t.metric_name.as_str()))
            .collect();
        assert_eq!(
            keys,
            vec![
                (MetricKind::Biomarker, "Ferritin"),
                (MetricKind::Biomarker, "Vitamin D"),
                (MetricKind::Promis, "Fatigue"),
            ]
        );
        assert_eq!(timeline.trends[0].data_points, 2);
        assert_eq!(timeline.trends[0].last_value, 60.0);
        assert_eq!(timeline.trends[0].units.as_deref(), Some("ng/mL"));
        assert_eq!(timeline.trends[2].units, None);
    }

    #[test]
    fn plan_suggests_proven_treatments_and_sets_goals() {
        let mut ep = episode(1, 1, date(2026, 2, 1));
        ep.response_rating = Some(5);
        let history = HealthHistory {
            biomarkers: vec![
                biomarker(1, "Vitamin D", date(2026, 1, 1), 32.0, Some((40.0, 60.0)), Low),
                biomarker(2, "Vitamin D", date(2026, 4, 1), 44.0, Some((40.0, 60.0)), Optimal),
                biomarker(3, "TSH", date(2026, 4, 1), 2.8, Some((1.0, 2.5)), High),
            ],
            promis: vec![promis(1, "Fatigue", date(2026, 4, 1), 41.0)],
            treatments: vec![ep],
            ..HealthHistory::default()
        };

        let plan = personalized_plan(&history, &catalog(), date(2026, 5, 1));
        assert_eq!(plan.current_health_status, "Fair");
        assert_eq!(plan.suggestions.len(), 1);
        assert_eq!(plan.suggestions[0].treatment_name, "Vitamin D3");
        assert_eq!(plan.suggestions[0].expected_biomarker_improvements, 1);
        assert_eq!(
            plan.health_goals,
            vec![
                "Improve TSH to optimal range".to_string(),
                "Improve Fatigue PROMIS score".to_string()
            ]
        );
        assert_eq!(plan.monitoring_plan, "Standard monitoring recommended");
    }

    #[test]
    fn empty_profile_has_no_outcomes() {
        let history = HealthHistory::default();
        assert!(treatment_outcomes(&history, &catalog(), date(2026, 1, 1)).is_empty());
        let plan = personalized_plan(&history, &catalog(), date(2026, 1, 1));
        assert!(plan.suggestions.is_empty());
        assert_eq!(plan.current_health_status, "Needs Improvement");
    }
}
