use std::collections::BTreeSet;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Range {
    pub min: f64,
    pub max: f64,
}

impl Range {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Builds a range only when both bounds are known.
    pub fn from_bounds(min: Option<f64>, max: Option<f64>) -> Option<Self> {
        match (min, max) {
            (Some(min), Some(max)) => Some(Self { min, max }),
            _ => None,
        }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.min, self.max)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BiomarkerStatus {
    Low,
    Normal,
    High,
    Optimal,
}

impl BiomarkerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BiomarkerStatus::Low => "Low",
            BiomarkerStatus::Normal => "Normal",
            BiomarkerStatus::High => "High",
            BiomarkerStatus::Optimal => "Optimal",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => Some(BiomarkerStatus::Low),
            "normal" => Some(BiomarkerStatus::Normal),
            "high" => Some(BiomarkerStatus::High),
            "optimal" => Some(BiomarkerStatus::Optimal),
            _ => None,
        }
    }

    /// Storage ordinal (Low=0, Normal=1, High=2, Optimal=3). Not a severity scale.
    pub fn ordinal(&self) -> i32 {
        match self {
            BiomarkerStatus::Low => 0,
            BiomarkerStatus::Normal => 1,
            BiomarkerStatus::High => 2,
            BiomarkerStatus::Optimal => 3,
        }
    }

    /// Clinical desirability: Optimal above Normal above either out-of-range state.
    pub fn desirability(&self) -> i32 {
        match self {
            BiomarkerStatus::Optimal => 2,
            BiomarkerStatus::Normal => 1,
            BiomarkerStatus::High | BiomarkerStatus::Low => 0,
        }
    }
}

impl fmt::Display for BiomarkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BiomarkerSample {
    pub id: i64,
    pub name: String,
    pub test_date: NaiveDate,
    pub value: f64,
    pub units: String,
    pub reference_range: Option<Range>,
    pub optimal_range: Option<Range>,
    pub status: BiomarkerStatus,
}

/// PROMIS domains the assessment instruments report.
pub const PROMIS_DOMAINS: [&str; 6] = [
    "Physical Function",
    "Fatigue",
    "Depression",
    "Anxiety",
    "Pain",
    "Sleep",
];

pub fn is_known_promis_domain(domain: &str) -> bool {
    PROMIS_DOMAINS.contains(&domain)
}

/// Domain is kept as free text; domains outside [`PROMIS_DOMAINS`] are still
/// trended but get no treatment mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromisSample {
    pub id: i64,
    pub domain: String,
    pub assessed_on: NaiveDate,
    pub t_score: f64,
    pub percentile_rank: Option<f64>,
    pub items_answered: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LifestyleSample {
    pub id: i64,
    pub recorded_on: NaiveDate,
    pub sleep_hours: Option<f64>,
    pub sleep_quality: Option<i32>,
    pub exercise_minutes: Option<i32>,
    pub exercise_intensity: Option<i32>,
    pub stress_level: Option<i32>,
    pub energy_level: Option<i32>,
    pub mood_rating: Option<i32>,
    pub weight: Option<f64>,
    pub body_fat_pct: Option<f64>,
}

/// Lifestyle fields that get a trend line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifestyleMetric {
    SleepHours,
    ExerciseMinutes,
    StressLevel,
    EnergyLevel,
    MoodRating,
}

impl LifestyleMetric {
    pub const ALL: [LifestyleMetric; 5] = [
        LifestyleMetric::SleepHours,
        LifestyleMetric::ExerciseMinutes,
        LifestyleMetric::StressLevel,
        LifestyleMetric::EnergyLevel,
        LifestyleMetric::MoodRating,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            LifestyleMetric::SleepHours => "Sleep Hours",
            LifestyleMetric::ExerciseMinutes => "Exercise Minutes",
            LifestyleMetric::StressLevel => "Stress",
            LifestyleMetric::EnergyLevel => "Energy",
            LifestyleMetric::MoodRating => "Mood",
        }
    }

    pub fn value(&self, sample: &LifestyleSample) -> Option<f64> {
        match self {
            LifestyleMetric::SleepHours => sample.sleep_hours,
            LifestyleMetric::ExerciseMinutes => sample.exercise_minutes.map(f64::from),
            LifestyleMetric::StressLevel => sample.stress_level.map(f64::from),
            LifestyleMetric::EnergyLevel => sample.energy_level.map(f64::from),
            LifestyleMetric::MoodRating => sample.mood_rating.map(f64::from),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreatmentEpisode {
    pub id: i64,
    pub treatment_id: i64,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub dosage: Option<String>,
    pub frequency: Option<String>,
    pub response_rating: Option<i32>,
    pub side_effects_noted: Option<String>,
    pub provider_supervised: bool,
}

impl TreatmentEpisode {
    pub fn is_active(&self) -> bool {
        self.end_date.is_none()
    }

    /// Whether a date falls in `[start_date, end_date]`, open-ended when ongoing.
    pub fn covers(&self, date: NaiveDate) -> bool {
        date >= self.start_date && self.end_date.map_or(true, |end| date <= end)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TreatmentCategory {
    Supplement,
    Peptide,
    Medication,
    Lifestyle,
}

impl TreatmentCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            TreatmentCategory::Supplement => "Supplement",
            TreatmentCategory::Peptide => "Peptide",
            TreatmentCategory::Medication => "Medication",
            TreatmentCategory::Lifestyle => "Lifestyle",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "supplement" => Some(TreatmentCategory::Supplement),
            "peptide" => Some(TreatmentCategory::Peptide),
            "medication" => Some(TreatmentCategory::Medication),
            "lifestyle" => Some(TreatmentCategory::Lifestyle),
            _ => None,
        }
    }
}

/// Evidence grade, 1 strongest through 5 weakest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EvidenceLevel {
    SystematicReviews,
    RandomizedTrials,
    CohortStudies,
    CaseReports,
    PreclinicalOnly,
}

impl EvidenceLevel {
    pub fn ordinal(&self) -> i32 {
        match self {
            EvidenceLevel::SystematicReviews => 1,
            EvidenceLevel::RandomizedTrials => 2,
            EvidenceLevel::CohortStudies => 3,
            EvidenceLevel::CaseReports => 4,
            EvidenceLevel::PreclinicalOnly => 5,
        }
    }

    pub fn from_ordinal(value: i32) -> Option<Self> {
        match value {
            1 => Some(EvidenceLevel::SystematicReviews),
            2 => Some(EvidenceLevel::RandomizedTrials),
            3 => Some(EvidenceLevel::CohortStudies),
            4 => Some(EvidenceLevel::CaseReports),
            5 => Some(EvidenceLevel::PreclinicalOnly),
            _ => None,
        }
    }

    pub fn badge(&self) -> &'static str {
        match self {
            EvidenceLevel::SystematicReviews => "GOLD",
            EvidenceLevel::RandomizedTrials => "SILVER",
            EvidenceLevel::CohortStudies => "BRONZE",
            EvidenceLevel::CaseReports => "EXPERIMENTAL",
            EvidenceLevel::PreclinicalOnly => "RESEARCH",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RegulatoryStatus {
    FdaApproved,
    OffLabel,
    Experimental,
    Restricted,
    Banned,
}

impl RegulatoryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegulatoryStatus::FdaApproved => "fda_approved",
            RegulatoryStatus::OffLabel => "off_label",
            RegulatoryStatus::Experimental => "experimental",
            RegulatoryStatus::Restricted => "restricted",
            RegulatoryStatus::Banned => "banned",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "fda_approved" => Some(RegulatoryStatus::FdaApproved),
            "off_label" => Some(RegulatoryStatus::OffLabel),
            "experimental" => Some(RegulatoryStatus::Experimental),
            "restricted" => Some(RegulatoryStatus::Restricted),
            "banned" => Some(RegulatoryStatus::Banned),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Treatment {
    pub id: i64,
    pub name: String,
    pub category: TreatmentCategory,
    pub evidence_level: EvidenceLevel,
    pub regulatory_status: RegulatoryStatus,
    pub mechanism: Option<String>,
    pub typical_dosage: Option<String>,
    pub monitoring_required: Option<String>,
    pub common_side_effects: Option<String>,
    pub contraindications: Option<String>,
    pub cost_range: Option<String>,
    pub safety_rating: i32,
}

#[derive(Debug, Clone, Default)]
pub struct TreatmentCatalog {
    pub treatments: Vec<Treatment>,
}

impl TreatmentCatalog {
    pub fn new(treatments: Vec<Treatment>) -> Self {
        Self { treatments }
    }

    pub fn by_id(&self, id: i64) -> Option<&Treatment> {
        self.treatments.iter().find(|t| t.id == id)
    }

    pub fn by_name(&self, name: &str) -> Option<&Treatment> {
        self.treatments.iter().find(|t| t.name == name)
    }
}

/// One subject's records as read from the store for a single query.
#[derive(Debug, Clone, Default)]
pub struct HealthHistory {
    pub biomarkers: Vec<BiomarkerSample>,
    pub promis: Vec<PromisSample>,
    pub lifestyle: Vec<LifestyleSample>,
    pub treatments: Vec<TreatmentEpisode>,
}

impl HealthHistory {
    pub fn is_empty(&self) -> bool {
        self.biomarkers.is_empty()
            && self.promis.is_empty()
            && self.lifestyle.is_empty()
            && self.treatments.is_empty()
    }

    pub fn biomarker_names(&self) -> BTreeSet<&str> {
        self.biomarkers.iter().map(|b| b.name.as_str()).collect()
    }

    pub fn promis_domains(&self) -> BTreeSet<&str> {
        self.promis.iter().map(|p| p.domain.as_str()).collect()
    }

    /// Chronological series for one biomarker, ties broken by sequence id.
    pub fn biomarker_series(&self, name: &str) -> Vec<&BiomarkerSample> {
        let mut series: Vec<&BiomarkerSample> =
            self.biomarkers.iter().filter(|b| b.name == name).collect();
        series.sort_by_key(|b| (b.test_date, b.id));
        series
    }

    pub fn promis_series(&self, domain: &str) -> Vec<&PromisSample> {
        let mut series: Vec<&PromisSample> =
            self.promis.iter().filter(|p| p.domain == domain).collect();
        series.sort_by_key(|p| (p.assessed_on, p.id));
        series
    }

    pub fn active_treatment_ids(&self) -> BTreeSet<i64> {
        self.treatments
            .iter()
            .filter(|t| t.is_active())
            .map(|t| t.treatment_id)
            .collect()
    }

    /// Every record as a tagged sample, ordered by date.
    pub fn samples(&self) -> Vec<Sample<'_>> {
        let mut samples: Vec<Sample<'_>> = self
            .biomarkers
            .iter()
            .map(Sample::Biomarker)
            .chain(self.promis.iter().map(Sample::Promis))
            .chain(self.lifestyle.iter().map(Sample::Lifestyle))
            .chain(self.treatments.iter().map(Sample::Treatment))
            .collect();
        samples.sort_by_key(|s| (s.date(), s.id()));
        samples
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Sample<'a> {
    Biomarker(&'a BiomarkerSample),
    Promis(&'a PromisSample),
    Lifestyle(&'a LifestyleSample),
    Treatment(&'a TreatmentEpisode),
}

impl Sample<'_> {
    pub fn date(&self) -> NaiveDate {
        match self {
            Sample::Biomarker(b) => b.test_date,
            Sample::Promis(p) => p.assessed_on,
            Sample::Lifestyle(l) => l.recorded_on,
            Sample::Treatment(t) => t.start_date,
        }
    }

    pub fn id(&self) -> i64 {
        match self {
            Sample::Biomarker(b) => b.id,
            Sample::Promis(p) => p.id,
            Sample::Lifestyle(l) => l.id,
            Sample::Treatment(t) => t.id,
        }
    }
}
