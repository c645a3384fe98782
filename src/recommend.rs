use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::models::{
    BiomarkerStatus, EvidenceLevel, HealthHistory, Range, RegulatoryStatus, Treatment,
    TreatmentCatalog, TreatmentCategory,
};
use crate::status::{latest_per_name, severity};
use crate::trend::{recent_trend, TrendDirection};

/// PROMIS T-scores below this surface as an issue.
pub const PROMIS_ISSUE_T_SCORE: f64 = 45.0;

/// Which treatments address which biomarker or PROMIS domain, by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreatmentMappings {
    #[serde(default)]
    pub biomarkers: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub promis: BTreeMap<String, Vec<String>>,
}

impl Default for TreatmentMappings {
    fn default() -> Self {
        fn table(entries: Vec<(&str, Vec<&str>)>) -> BTreeMap<String, Vec<String>> {
            entries
                .into_iter()
                .map(|(key, names)| {
                    (
                        key.to_string(),
                        names.iter().map(|n| n.to_string()).collect(),
                    )
                })
                .collect()
        }

        const VITAMIN_D3: &str = "Vitamin D3";
        const OMEGA_3: &str = "Omega-3 EPA/DHA";
        const NAD: &str = "NAD+ Precursor (NMN/NR)";
        const BPC_157: &str = "BPC-157";

        Self {
            biomarkers: table(vec![
                ("Vitamin D", vec![VITAMIN_D3]),
                ("C-Reactive Protein", vec![OMEGA_3, NAD]),
                ("Total Cholesterol", vec![OMEGA_3]),
                ("LDL Cholesterol", vec![OMEGA_3]),
                ("HbA1c", vec![NAD]),
                ("TSH", vec![BPC_157]),
            ]),
            promis: table(vec![
                ("Physical Function", vec![BPC_157, NAD]),
                ("Fatigue", vec![NAD, VITAMIN_D3]),
                ("Depression", vec![OMEGA_3, NAD]),
                ("Anxiety", vec![OMEGA_3]),
            ]),
        }
    }
}

impl TreatmentMappings {
    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }

    pub fn for_biomarker(&self, name: &str) -> &[String] {
        self.biomarkers.get(name).map_or(&[], Vec::as_slice)
    }

    pub fn for_promis(&self, domain: &str) -> &[String] {
        self.promis.get(domain).map_or(&[], Vec::as_slice)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PromisSeverity {
    Mild,
    Moderate,
    Severe,
}

impl PromisSeverity {
    pub fn from_t_score(t_score: f64) -> Self {
        if t_score < 35.0 {
            PromisSeverity::Severe
        } else if t_score < 40.0 {
            PromisSeverity::Moderate
        } else {
            PromisSeverity::Mild
        }
    }

    pub fn weight(&self) -> i32 {
        match self {
            PromisSeverity::Severe => 15,
            PromisSeverity::Moderate => 10,
            PromisSeverity::Mild => 5,
        }
    }
}

impl fmt::Display for PromisSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PromisSeverity::Mild => "Mild",
            PromisSeverity::Moderate => "Moderate",
            PromisSeverity::Severe => "Severe",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BiomarkerIssue {
    pub biomarker_name: String,
    pub current_value: f64,
    pub units: String,
    pub optimal_range: Option<Range>,
    pub status: BiomarkerStatus,
    pub severity: u8,
    pub trend: TrendDirection,
}

#[derive(Debug, Clone, Serialize)]
pub struct PromisIssue {
    pub domain: String,
    pub t_score: f64,
    pub percentile_rank: f64,
    pub severity: PromisSeverity,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum Issue {
    Biomarker(BiomarkerIssue),
    Promis(PromisIssue),
}

impl Issue {
    fn severity_component(&self) -> i32 {
        match self {
            Issue::Biomarker(issue) => {
                let declining = if issue.trend == TrendDirection::Declining { 5 } else { 0 };
                i32::from(issue.severity) * 3 + declining
            }
            Issue::Promis(issue) => issue.severity.weight(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Recommendation {
    pub treatment_id: i64,
    pub treatment_name: String,
    pub category: TreatmentCategory,
    pub evidence_level: EvidenceLevel,
    pub safety_rating: i32,
    pub priority_score: i32,
    pub reasoning: String,
    pub issue: Issue,
}

/// Every latest biomarker reading that is not optimal.
pub fn biomarker_issues(history: &HealthHistory) -> Vec<BiomarkerIssue> {
    latest_per_name(&history.biomarkers)
        .into_iter()
        .filter(|latest| latest.status != BiomarkerStatus::Optimal)
        .map(|latest| BiomarkerIssue {
            biomarker_name: latest.name.clone(),
            current_value: latest.value,
            units: latest.units.clone(),
            optimal_range: latest.optimal_range,
            status: latest.status,
            severity: severity(latest),
            trend: recent_trend(&history.biomarker_series(&latest.name)),
        })
        .collect()
}

/// Every PROMIS domain whose latest T-score is below average.
pub fn promis_issues(history: &HealthHistory) -> Vec<PromisIssue> {
    history
        .promis_domains()
        .into_iter()
        .filter_map(|domain| history.promis_series(domain).last().copied())
        .filter(|latest| latest.t_score < PROMIS_ISSUE_T_SCORE)
        .map(|latest| PromisIssue {
            domain: latest.domain.clone(),
            t_score: latest.t_score,
            percentile_rank: latest.percentile_rank.unwrap_or(0.0),
            severity: PromisSeverity::from_t_score(latest.t_score),
        })
        .collect()
}

pub fn priority_score(treatment: &Treatment, issue: &Issue) -> i32 {
    let evidence = (6 - treatment.evidence_level.ordinal()) * 10;
    let safety = treatment.safety_rating * 5;
    let regulatory = if treatment.regulatory_status == RegulatoryStatus::FdaApproved {
        10
    } else {
        0
    };
    evidence + safety + issue.severity_component() + regulatory
}

pub fn reasoning(treatment: &Treatment, issue: &Issue) -> String {
    let mut parts = Vec::new();

    match issue {
        Issue::Biomarker(b) => {
            let optimal = b
                .optimal_range
                .map_or_else(|| "n/a".to_string(), |r| r.to_string());
            parts.push(format!(
                "Targets {} ({} {})",
                b.biomarker_name, b.current_value, b.units
            ));
            parts.push(format!("Optimal range: {} {}", optimal, b.units));
            parts.push(format!("Current status: {} (Trend: {})", b.status, b.trend));
        }
        Issue::Promis(p) => {
            parts.push(format!("Addresses {} concerns", p.domain));
            parts.push(format!(
                "T-score: {} (Percentile: {}%)",
                p.t_score, p.percentile_rank as i64
            ));
            parts.push(format!("Severity: {}", p.severity));
        }
    }

    parts.push(format!("Evidence: {}", treatment.evidence_level.badge()));
    parts.push(format!("Safety: {}/5", treatment.safety_rating));
    parts.push(format!(
        "Cost: {}",
        treatment.cost_range.as_deref().unwrap_or("unknown")
    ));
    parts.join(" | ")
}

/// Maps current deficiencies to catalog treatments the subject is not already on.
#[derive(Debug, Clone, Default)]
pub struct RecommendationEngine {
    mappings: TreatmentMappings,
}

impl RecommendationEngine {
    pub fn new(mappings: TreatmentMappings) -> Self {
        Self { mappings }
    }

    fn candidates<'c>(
        &self,
        names: &[String],
        catalog: &'c TreatmentCatalog,
        active: &BTreeSet<i64>,
    ) -> Vec<&'c Treatment> {
        names
            .iter()
            .filter_map(|name| catalog.by_name(name))
            .filter(|treatment| !active.contains(&treatment.id))
            .collect()
    }

    pub fn recommend(
        &self,
        history: &HealthHistory,
        catalog: &TreatmentCatalog,
    ) -> Vec<Recommendation> {
        let active = history.active_treatment_ids();

        let issues = biomarker_issues(history)
            .into_iter()
            .map(Issue::Biomarker)
            .chain(promis_issues(history).into_iter().map(Issue::Promis));

        let mut best: Vec<Recommendation> = Vec::new();
        for issue in issues {
            let names = match &issue {
                Issue::Biomarker(b) => self.mappings.for_biomarker(&b.biomarker_name),
                Issue::Promis(p) => self.mappings.for_promis(&p.domain),
            };

            for treatment in self.candidates(names, catalog, &active) {
                let candidate = Recommendation {
                    treatment_id: treatment.id,
                    treatment_name: treatment.name.clone(),
                    category: treatment.category,
                    evidence_level: treatment.evidence_level,
                    safety_rating: treatment.safety_rating,
                    priority_score: priority_score(treatment, &issue),
                    reasoning: reasoning(treatment, &issue),
                    issue: issue.clone(),
                };

                match best.iter_mut().find(|r| r.treatment_id == candidate.treatment_id) {
                    Some(existing) if existing.priority_score < candidate.priority_score => {
                        *existing = candidate;
                    }
                    Some(_) => {}
                    None => best.push(candidate),
                }
            }
        }

        best.sort_by(|a, b| {
            b.priority_score
                .cmp(&a.priority_score)
                .then_with(|| a.treatment_name.cmp(&b.treatment_name))
        });
        tracing::debug!(count = best.len(), "generated treatment recommendations");
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::*;
    use crate::models::BiomarkerStatus::{High, Low, Optimal};

    fn vitamin_d_low() -> HealthHistory {
        HealthHistory {
            biomarkers: vec![biomarker(
                1,
                "Vitamin D",
                date(2026, 4, 1),
                32.0,
                Some((40.0, 60.0)),
                Low,
            )],
            ..HealthHistory::default()
        }
    }

    #[test]
    fn low_vitamin_d_recommends_vitamin_d3() {
        let engine = RecommendationEngine::default();
        let recs = engine.recommend(&vitamin_d_low(), &catalog());

        assert_eq!(recs.len(), 1);
        let rec = &recs[0];
        assert_eq!(rec.treatment_name, "Vitamin D3");
        // (6 - 1) * 10 + 5 * 5 + 2 * 3 + 10
        assert_eq!(rec.priority_score, 91);
        assert!(rec.reasoning.contains("Vitamin D (32 ng/mL)"));
        assert!(rec.reasoning.contains("Optimal range: 40-60 ng/mL"));
        assert!(rec.reasoning.ends_with("Evidence: GOLD | Safety: 5/5 | Cost: $10-25/month"));
    }

    #[test]
    fn active_treatments_are_excluded() {
        let mut history = vitamin_d_low();
        history.treatments.push(episode(1, 1, date(2026, 1, 1)));
        let recs = RecommendationEngine::default().recommend(&history, &catalog());
        assert!(recs.is_empty());

        history.treatments[0].end_date = Some(date(2026, 3, 1));
        let recs = RecommendationEngine::default().recommend(&history, &catalog());
        assert_eq!(recs.len(), 1);
    }

    #[test]
    fn declining_trend_adds_priority() {
        let mut history = vitamin_d_low();
        history.biomarkers.insert(
            0,
            biomarker(0, "Vitamin D", date(2026, 1, 1), 40.0, Some((40.0, 60.0)), Optimal),
        );
        let recs = RecommendationEngine::default().recommend(&history, &catalog());
        assert_eq!(recs[0].priority_score, 96);
        assert!(recs[0].reasoning.contains("Trend: Declining"));
    }

    #[test]
    fn duplicates_keep_highest_priority_instance() {
        let history = HealthHistory {
            biomarkers: vec![
                biomarker(1, "C-Reactive Protein", date(2026, 4, 1), 2.1, Some((0.1, 1.0)), High),
                biomarker(2, "LDL Cholesterol", date(2026, 4, 1), 101.0, Some((50.0, 100.0)), High),
            ],
            promis: vec![promis(1, "Depression", date(2026, 4, 1), 33.0)],
            ..HealthHistory::default()
        };

        let recs = RecommendationEngine::default().recommend(&history, &catalog());
        let names: Vec<&str> = recs.iter().map(|r| r.treatment_name.as_str()).collect();
        assert_eq!(names, vec!["Omega-3 EPA/DHA", "NAD+ Precursor (NMN/NR)"]);

        // CRP (severity 5) ties Depression (Severe), so the first issue seen is kept.
        let omega = &recs[0];
        assert_eq!(omega.priority_score, 50 + 25 + 15 + 10);
        assert!(matches!(
            &omega.issue,
            Issue::Biomarker(b) if b.biomarker_name == "C-Reactive Protein"
        ));

        let nad = &recs[1];
        assert_eq!(nad.priority_score, 30 + 20 + 15);
    }

    #[test]
    fn promis_issue_grading_and_reasoning() {
        assert_eq!(PromisSeverity::from_t_score(34.9), PromisSeverity::Severe);
        assert_eq!(PromisSeverity::from_t_score(38.0), PromisSeverity::Moderate);
        assert_eq!(PromisSeverity::from_t_score(44.0), PromisSeverity::Mild);

        let mut fatigue = promis(1, "Fatigue", date(2026, 4, 1), 41.0);
        fatigue.percentile_rank = Some(18.6);
        let history = HealthHistory {
            promis: vec![fatigue, promis(2, "Anxiety", date(2026, 4, 1), 52.0)],
            ..HealthHistory::default()
        };
        let issues = promis_issues(&history);
        assert_eq!(issues.len(), 1);

        let recs = RecommendationEngine::default().recommend(&history, &catalog());
        let names: Vec<&str> = recs.iter().map(|r| r.treatment_name.as_str()).collect();
        assert_eq!(names, vec!["Vitamin D3", "NAD+ Precursor (NMN/NR)"]);
        let expected =
            "Addresses Fatigue concerns | T-score: 41 (Percentile: 18%) | Severity: Mild";
        assert!(recs[0].reasoning.starts_with(expected));
    }

    #[test]
    fn injected_mappings_replace_defaults() {
        let mappings = TreatmentMappings::from_json(
            r#"{ "biomarkers": { "Vitamin D": ["BPC-157", "Not In Catalog"] } }"#,
        )
        .unwrap();
        assert!(mappings.promis.is_empty());

        let engine = RecommendationEngine::new(mappings);
        let recs = engine.recommend(&vitamin_d_low(), &catalog());
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].treatment_name, "BPC-157");
    }

    #[test]
    fn optimal_and_unmapped_profiles_yield_nothing() {
        let history = HealthHistory {
            biomarkers: vec![
                biomarker(1, "HbA1c", date(2026, 4, 1), 5.2, Some((4.0, 5.7)), Optimal),
                biomarker(2, "Ferritin", date(2026, 4, 1), 12.0, Some((50.0, 150.0)), Low),
            ],
            ..HealthHistory::default()
        };
        assert_eq!(biomarker_issues(&history).len(), 1);
        assert!(RecommendationEngine::default().recommend(&history, &catalog()).is_empty());
        assert!(RecommendationEngine::default()
            .recommend(&HealthHistory::default(), &catalog())
            .is_empty());
    }
}
