use chrono::NaiveDate;
use thiserror::Error;

use crate::models::{BiomarkerStatus, Range};

#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("biomarker name is required")]
    MissingName,

    #[error("units are required for {0}")]
    MissingUnits(String),

    #[error("value must be positive, got {0}")]
    NonPositiveValue(f64),

    #[error("{which} range minimum {min} is not below maximum {max}")]
    InvertedRange {
        which: &'static str,
        min: f64,
        max: f64,
    },

    #[error("optimal range {optimal} falls outside reference range {reference}")]
    OptimalOutsideReference { optimal: Range, reference: Range },

    #[error("unknown biomarker status {0:?}")]
    UnknownStatus(String),

    #[error("PROMIS domain is required")]
    MissingDomain,

    #[error("T-score {0} is outside 20-80")]
    TScoreOutOfRange(f64),

    #[error("percentile rank {0} is outside 0-100")]
    PercentileOutOfRange(f64),

    #[error("at least one item must be answered, got {0}")]
    NoItemsAnswered(i32),

    #[error("response rating {0} is outside 1-5")]
    RatingOutOfRange(i32),

    #[error("treatment name is required")]
    MissingTreatment,

    #[error("episode ends on {end}, before it starts on {start}")]
    EndsBeforeStart { start: NaiveDate, end: NaiveDate },
}

/// A biomarker result as submitted for import, before it has a sequence id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewBiomarker {
    pub name: String,
    pub test_date: NaiveDate,
    pub value: f64,
    pub units: String,
    pub reference_range: Option<Range>,
    pub optimal_range: Option<Range>,
    pub status: BiomarkerStatus,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewPromis {
    pub domain: String,
    pub assessed_on: NaiveDate,
    pub t_score: f64,
    pub percentile_rank: Option<f64>,
    pub items_answered: i32,
}

/// A treatment episode as submitted for import; the treatment is named, not
/// yet resolved against the catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEpisode {
    pub treatment_name: String,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub dosage: Option<String>,
    pub frequency: Option<String>,
    pub response_rating: Option<i32>,
    pub side_effects_noted: Option<String>,
    pub provider_supervised: bool,
}

fn check_range(which: &'static str, range: Option<Range>) -> Result<(), ValidationError> {
    match range {
        Some(r) if r.min >= r.max => Err(ValidationError::InvertedRange {
            which,
            min: r.min,
            max: r.max,
        }),
        _ => Ok(()),
    }
}

pub fn validate_biomarker(record: &NewBiomarker) -> Result<(), ValidationError> {
    if record.name.trim().is_empty() {
        return Err(ValidationError::MissingName);
    }
    if record.units.trim().is_empty() {
        return Err(ValidationError::MissingUnits(record.name.clone()));
    }
    if record.value.is_nan() || record.value <= 0.0 {
        return Err(ValidationError::NonPositiveValue(record.value));
    }

    check_range("reference", record.reference_range)?;
    check_range("optimal", record.optimal_range)?;

    if let (Some(optimal), Some(reference)) = (record.optimal_range, record.reference_range) {
        if optimal.min < reference.min || optimal.max > reference.max {
            return Err(ValidationError::OptimalOutsideReference { optimal, reference });
        }
    }
    Ok(())
}

pub fn validate_t_score(t_score: f64) -> Result<(), ValidationError> {
    if (20.0..=80.0).contains(&t_score) {
        Ok(())
    } else {
        Err(ValidationError::TScoreOutOfRange(t_score))
    }
}

pub fn validate_response_rating(rating: i32) -> Result<(), ValidationError> {
    if (1..=5).contains(&rating) {
        Ok(())
    } else {
        Err(ValidationError::RatingOutOfRange(rating))
    }
}

pub fn validate_promis(record: &NewPromis) -> Result<(), ValidationError> {
    if record.domain.trim().is_empty() {
        return Err(ValidationError::MissingDomain);
    }
    validate_t_score(record.t_score)?;
    if let Some(rank) = record.percentile_rank {
        if !(0.0..=100.0).contains(&rank) {
            return Err(ValidationError::PercentileOutOfRange(rank));
        }
    }
    if record.items_answered < 1 {
        return Err(ValidationError::NoItemsAnswered(record.items_answered));
    }
    Ok(())
}

pub fn validate_episode(record: &NewEpisode) -> Result<(), ValidationError> {
    if record.treatment_name.trim().is_empty() {
        return Err(ValidationError::MissingTreatment);
    }
    if let Some(end) = record.end_date {
        if end < record.start_date {
            return Err(ValidationError::EndsBeforeStart {
                start: record.start_date,
                end,
            });
        }
    }
    if let Some(rating) = record.response_rating {
        validate_response_rating(rating)?;
    }
    Ok(())
}

/// Status implied by where a value sits relative to its ranges.
///
/// Used when an import row leaves the status column blank. The reference range
/// decides Low/High; inside it, the optimal range decides Optimal vs Normal.
pub fn classify_value(
    value: f64,
    reference: Option<Range>,
    optimal: Option<Range>,
) -> BiomarkerStatus {
    if let Some(reference) = reference {
        if value < reference.min {
            return BiomarkerStatus::Low;
        }
        if value > reference.max {
            return BiomarkerStatus::High;
        }
    }
    match optimal {
        Some(optimal) if optimal.contains(value) => BiomarkerStatus::Optimal,
        Some(optimal) if reference.is_none() && value < optimal.min => BiomarkerStatus::Low,
        Some(optimal) if reference.is_none() && value > optimal.max => BiomarkerStatus::High,
        _ => BiomarkerStatus::Normal,
    }
}

/// Explicit status text wins; a blank column falls back to [`classify_value`].
pub fn resolve_status(
    raw: Option<&str>,
    value: f64,
    reference: Option<Range>,
    optimal: Option<Range>,
) -> Result<BiomarkerStatus, ValidationError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(text) => BiomarkerStatus::parse(text)
            .ok_or_else(|| ValidationError::UnknownStatus(text.to_string())),
        None => Ok(classify_value(value, reference, optimal)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vitamin_d(value: f64) -> NewBiomarker {
        NewBiomarker {
            name: "Vitamin D".to_string(),
            test_date: NaiveDate::from_ymd_opt(2026, 4, 1).unwrap(),
            value,
            units: "ng/mL".to_string(),
            reference_range: Some(Range::new(30.0, 100.0)),
            optimal_range: Some(Range::new(40.0, 60.0)),
            status: BiomarkerStatus::Optimal,
        }
    }

    #[test]
    fn accepts_well_formed_record() {
        assert_eq!(validate_biomarker(&vitamin_d(44.0)), Ok(()));
    }

    #[test]
    fn rejects_missing_fields_and_bad_values() {
        let mut record = vitamin_d(44.0);
        record.name = " ".to_string();
        assert_eq!(validate_biomarker(&record), Err(ValidationError::MissingName));

        let mut record = vitamin_d(44.0);
        record.units.clear();
        assert!(matches!(validate_biomarker(&record), Err(ValidationError::MissingUnits(_))));

        assert_eq!(
            validate_biomarker(&vitamin_d(0.0)),
            Err(ValidationError::NonPositiveValue(0.0))
        );
        assert!(validate_biomarker(&vitamin_d(f64::NAN)).is_err());
    }

    #[test]
    fn rejects_inconsistent_ranges() {
        let mut record = vitamin_d(44.0);
        record.optimal_range = Some(Range::new(60.0, 40.0));
        assert!(matches!(
            validate_biomarker(&record),
            Err(ValidationError::InvertedRange { which: "optimal", .. })
        ));

        let mut record = vitamin_d(44.0);
        record.optimal_range = Some(Range::new(20.0, 60.0));
        let err = validate_biomarker(&record).unwrap_err();
        assert_eq!(
            err.to_string(),
            "optimal range 20-60 falls outside reference range 30-100"
        );
    }

    #[test]
    fn score_bounds() {
        assert!(validate_t_score(20.0).is_ok());
        assert!(validate_t_score(80.5).is_err());
        assert!(validate_response_rating(5).is_ok());
        assert_eq!(validate_response_rating(0), Err(ValidationError::RatingOutOfRange(0)));
    }

    fn fatigue(t_score: f64) -> NewPromis {
        NewPromis {
            domain: "Fatigue".to_string(),
            assessed_on: NaiveDate::from_ymd_opt(2026, 4, 1).unwrap(),
            t_score,
            percentile_rank: Some(35.0),
            items_answered: 8,
        }
    }

    fn vitamin_d3_episode() -> NewEpisode {
        NewEpisode {
            treatment_name: "Vitamin D3".to_string(),
            start_date: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            end_date: None,
            dosage: Some("4000 IU daily".to_string()),
            frequency: None,
            response_rating: Some(4),
            side_effects_noted: None,
            provider_supervised: false,
        }
    }

    #[test]
    fn promis_rows_are_bounded() {
        assert_eq!(validate_promis(&fatigue(45.8)), Ok(()));
        assert_eq!(
            validate_promis(&fatigue(85.0)),
            Err(ValidationError::TScoreOutOfRange(85.0))
        );

        let mut record = fatigue(45.8);
        record.domain = "  ".to_string();
        assert_eq!(validate_promis(&record), Err(ValidationError::MissingDomain));

        let mut record = fatigue(45.8);
        record.percentile_rank = Some(101.0);
        assert_eq!(
            validate_promis(&record),
            Err(ValidationError::PercentileOutOfRange(101.0))
        );

        let mut record = fatigue(45.8);
        record.items_answered = 0;
        assert_eq!(validate_promis(&record), Err(ValidationError::NoItemsAnswered(0)));
    }

    #[test]
    fn episode_rows_check_rating_and_dates() {
        assert_eq!(validate_episode(&vitamin_d3_episode()), Ok(()));

        let mut record = vitamin_d3_episode();
        record.response_rating = None;
        assert_eq!(validate_episode(&record), Ok(()));

        let mut record = vitamin_d3_episode();
        record.response_rating = Some(6);
        assert_eq!(validate_episode(&record), Err(ValidationError::RatingOutOfRange(6)));

        let mut record = vitamin_d3_episode();
        record.end_date = NaiveDate::from_ymd_opt(2025, 12, 1);
        let err = validate_episode(&record).unwrap_err();
        assert_eq!(
            err.to_string(),
            "episode ends on 2025-12-01, before it starts on 2026-01-01"
        );

        let mut record = vitamin_d3_episode();
        record.treatment_name.clear();
        assert_eq!(validate_episode(&record), Err(ValidationError::MissingTreatment));
    }

    #[test]
    fn blank_status_is_derived_from_ranges() {
        let reference = Some(Range::new(30.0, 100.0));
        let optimal = Some(Range::new(40.0, 60.0));
        assert_eq!(classify_value(25.0, reference, optimal), BiomarkerStatus::Low);
        assert_eq!(classify_value(35.0, reference, optimal), BiomarkerStatus::Normal);
        assert_eq!(classify_value(50.0, reference, optimal), BiomarkerStatus::Optimal);
        assert_eq!(classify_value(120.0, reference, optimal), BiomarkerStatus::High);
        assert_eq!(classify_value(35.0, None, optimal), BiomarkerStatus::Low);
        assert_eq!(classify_value(35.0, None, None), BiomarkerStatus::Normal);

        assert_eq!(
            resolve_status(Some(""), 50.0, reference, optimal),
            Ok(BiomarkerStatus::Optimal)
        );
        assert_eq!(
            resolve_status(Some("high"), 50.0, reference, optimal),
            Ok(BiomarkerStatus::High)
        );
        assert_eq!(
            resolve_status(Some("elevated"), 50.0, reference, optimal),
            Err(ValidationError::UnknownStatus("elevated".to_string()))
        );
    }
}
