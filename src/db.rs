use anyhow::Context;
use chrono::{Duration, Months, NaiveDate, Utc};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::{
    is_known_promis_domain, BiomarkerSample, BiomarkerStatus, EvidenceLevel, HealthHistory,
    LifestyleSample, PromisSample, Range, RegulatoryStatus, Treatment, TreatmentCatalog,
    TreatmentCategory, TreatmentEpisode,
};
use crate::validate::{
    resolve_status, validate_biomarker, validate_episode, validate_promis, NewBiomarker,
    NewEpisode, NewPromis,
};

pub const DEMO_EMAIL: &str = "demo@wellness.com";

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

async fn upsert_subject(pool: &PgPool, email: &str, display_name: &str) -> anyhow::Result<Uuid> {
    let id: Uuid = sqlx::query(
        r#"
        INSERT INTO wellness.subjects (id, email, display_name)
        VALUES ($1, $2, $3)
        ON CONFLICT (email) DO UPDATE SET display_name = wellness.subjects.display_name
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(email)
    .bind(display_name)
    .fetch_one(pool)
    .await
    .with_context(|| format!("failed to upsert subject {email}"))?
    .get("id");
    Ok(id)
}

pub async fn subject_id(pool: &PgPool, email: &str) -> anyhow::Result<Option<Uuid>> {
    let row = sqlx::query("SELECT id FROM wellness.subjects WHERE email = $1")
        .bind(email)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|r| r.get("id")))
}

struct SeedTreatment {
    name: &'static str,
    category: TreatmentCategory,
    evidence: EvidenceLevel,
    regulatory: RegulatoryStatus,
    mechanism: &'static str,
    dosage: &'static str,
    monitoring: &'static str,
    side_effects: &'static str,
    contraindications: &'static str,
    cost: &'static str,
    safety: i16,
}

const SEED_TREATMENTS: [SeedTreatment; 5] = [
    SeedTreatment {
        name: "Vitamin D3",
        category: TreatmentCategory::Supplement,
        evidence: EvidenceLevel::SystematicReviews,
        regulatory: RegulatoryStatus::FdaApproved,
        mechanism: "Supports calcium absorption, immune function, and bone health",
        dosage: "2000-4000 IU daily",
        monitoring: "25(OH)D levels every 3-6 months",
        side_effects: "Rare at appropriate doses; kidney stones with excessive intake",
        contraindications: "Hypercalcemia, sarcoidosis",
        cost: "$10-25/month",
        safety: 5,
    },
    SeedTreatment {
        name: "Omega-3 EPA/DHA",
        category: TreatmentCategory::Supplement,
        evidence: EvidenceLevel::SystematicReviews,
        regulatory: RegulatoryStatus::FdaApproved,
        mechanism: "Anti-inflammatory effects, supports cardiovascular and brain health",
        dosage: "1-3g daily (combined EPA/DHA)",
        monitoring: "Lipid panel, bleeding time if on anticoagulants",
        side_effects: "Fish taste, GI upset, possible increased bleeding",
        contraindications: "Fish allergy, severe bleeding disorders",
        cost: "$20-50/month",
        safety: 5,
    },
    SeedTreatment {
        name: "NAD+ Precursor (NMN/NR)",
        category: TreatmentCategory::Supplement,
        evidence: EvidenceLevel::CohortStudies,
        regulatory: RegulatoryStatus::Experimental,
        mechanism: "Cellular energy metabolism, potential anti-aging effects",
        dosage: "250-500mg daily",
        monitoring: "Liver function, metabolic markers",
        side_effects: "Flushing, GI upset, possible nausea",
        contraindications: "Pregnancy, breastfeeding, cancer history",
        cost: "$50-150/month",
        safety: 4,
    },
    SeedTreatment {
        name: "Rapamycin (Sirolimus)",
        category: TreatmentCategory::Medication,
        evidence: EvidenceLevel::CaseReports,
        regulatory: RegulatoryStatus::OffLabel,
        mechanism: "mTOR pathway inhibition, potential lifespan extension",
        dosage: "1-6mg weekly (longevity protocol)",
        monitoring: "CBC, metabolic panel, lipids every 3 months",
        side_effects: "Mouth sores, immunosuppression, elevated cholesterol",
        contraindications: "Active infection, pregnancy, severe liver disease",
        cost: "$40-80/month",
        safety: 2,
    },
    SeedTreatment {
        name: "BPC-157",
        category: TreatmentCategory::Peptide,
        evidence: EvidenceLevel::PreclinicalOnly,
        regulatory: RegulatoryStatus::Experimental,
        mechanism: "Tissue repair and healing, gut health support",
        dosage: "250-500mcg daily (subcutaneous)",
        monitoring: "Clinical assessment, liver function",
        side_effects: "Injection site reactions, possible fatigue",
        contraindications: "Pregnancy, breastfeeding, active cancer",
        cost: "$100-200/month",
        safety: 3,
    },
];

fn months_ago(today: NaiveDate, months: u32) -> anyhow::Result<NaiveDate> {
    today
        .checked_sub_months(Months::new(months))
        .context("seed date out of range")
}

/// Name, value, units, reference range, optimal range, status.
type PanelEntry = (
    &'static str,
    f64,
    &'static str,
    (f64, f64),
    (f64, f64),
    BiomarkerStatus,
);

/// Demo biomarker panel at a given number of months into the six-month window.
fn seed_panel(m: u32) -> Vec<PanelEntry> {
    use BiomarkerStatus::{High, Low, Optimal};

    let mf = f64::from(m);
    let crp_status = if m >= 3 { Optimal } else { High };
    let vit_d_status = if m >= 3 { Optimal } else { Low };
    let tsh_status = if m >= 6 { Optimal } else { High };

    vec![
        ("Total Cholesterol", 185.0 - 2.0 * mf, "mg/dL", (150.0, 250.0), (150.0, 200.0), Optimal),
        ("LDL Cholesterol", 95.0 - mf, "mg/dL", (0.0, 130.0), (0.0, 100.0), Optimal),
        ("C-Reactive Protein", 2.1 - 0.3 * mf, "mg/L", (0.0, 3.0), (0.0, 1.0), crp_status),
        ("HbA1c", 5.2, "%", (4.0, 6.4), (4.0, 5.7), Optimal),
        ("Fasting Glucose", 88.0, "mg/dL", (70.0, 110.0), (70.0, 100.0), Optimal),
        ("Vitamin D", 32.0 + 4.0 * mf, "ng/mL", (20.0, 80.0), (40.0, 60.0), vit_d_status),
        ("TSH", 2.8 - 0.1 * mf, "mIU/L", (0.4, 4.5), (1.0, 2.5), tsh_status),
    ]
}

/// Domain, T-score, percentile rank, items answered.
const SEED_PROMIS: [(&str, f64, f64, i32); 5] = [
    ("Physical Function", 55.2, 65.0, 8),
    ("Fatigue", 45.8, 35.0, 8),
    ("Pain", 40.1, 25.0, 6),
    ("Depression", 42.3, 28.0, 8),
    ("Anxiety", 48.9, 45.0, 7),
];

/// Loads the demo subject: treatment catalog, a six-month biomarker panel,
/// one PROMIS assessment, weekly lifestyle logs and two ongoing episodes.
/// Safe to run repeatedly.
pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let today = Utc::now().date_naive();
    let subject = upsert_subject(pool, DEMO_EMAIL, "Demo Subject").await?;

    let mut treatment_ids = Vec::with_capacity(SEED_TREATMENTS.len());
    for t in &SEED_TREATMENTS {
        let id: i64 = sqlx::query(
            r#"
            INSERT INTO wellness.treatments
            (name, category, evidence_level, regulatory_status, mechanism, typical_dosage,
             monitoring_required, common_side_effects, contraindications, cost_range, safety_rating)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (name) DO UPDATE
            SET evidence_level = EXCLUDED.evidence_level, safety_rating = EXCLUDED.safety_rating
            RETURNING id
            "#,
        )
        .bind(t.name)
        .bind(t.category.as_str())
        .bind(t.evidence.ordinal() as i16)
        .bind(t.regulatory.as_str())
        .bind(t.mechanism)
        .bind(t.dosage)
        .bind(t.monitoring)
        .bind(t.side_effects)
        .bind(t.contraindications)
        .bind(t.cost)
        .bind(t.safety)
        .fetch_one(pool)
        .await?
        .get("id");
        treatment_ids.push(id);
    }

    let base = months_ago(today, 6)?;
    for m in [0u32, 3, 6] {
        let test_date = base
            .checked_add_months(Months::new(m))
            .context("seed date out of range")?;
        for (name, value, units, reference, optimal, status) in seed_panel(m) {
            sqlx::query(
                r#"
                INSERT INTO wellness.biomarker_results
                (subject_id, biomarker_name, test_date, value, units,
                 reference_min, reference_max, optimal_min, optimal_max, status, source_key)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                ON CONFLICT (source_key) DO NOTHING
                "#,
            )
            .bind(subject)
            .bind(name)
            .bind(test_date)
            .bind(value)
            .bind(units)
            .bind(reference.0)
            .bind(reference.1)
            .bind(optimal.0)
            .bind(optimal.1)
            .bind(status.as_str())
            .bind(format!("seed-{name}-{m}"))
            .execute(pool)
            .await?;
        }
    }

    let assessed_on = months_ago(today, 3)?;
    for (domain, t_score, percentile, items) in SEED_PROMIS {
        sqlx::query(
            r#"
            INSERT INTO wellness.promis_results
            (subject_id, domain, assessed_on, t_score, percentile_rank, items_answered, source_key)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (source_key) DO NOTHING
            "#,
        )
        .bind(subject)
        .bind(domain)
        .bind(assessed_on)
        .bind(t_score)
        .bind(percentile)
        .bind(items)
        .bind(format!("seed-promis-{domain}"))
        .execute(pool)
        .await?;
    }

    for week in 0..8i64 {
        let recorded_on = today - Duration::weeks(8 - week);
        let wobble = (week % 3) as i32;
        sqlx::query(
            r#"
            INSERT INTO wellness.lifestyle_metrics
            (subject_id, recorded_on, sleep_hours, sleep_quality, exercise_minutes,
             exercise_intensity, stress_level, energy_level, mood_rating, source_key)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (source_key) DO NOTHING
            "#,
        )
        .bind(subject)
        .bind(recorded_on)
        .bind(6.5 + 0.125 * week as f64)
        .bind(6 + wobble)
        .bind(150 + 10 * week as i32)
        .bind(5 + wobble)
        .bind(6 - (week / 2) as i32)
        .bind(5 + (week / 2) as i32)
        .bind(6 + wobble)
        .bind(format!("seed-lifestyle-{week}"))
        .execute(pool)
        .await?;
    }

    let episodes = [
        (treatment_ids[0], 4u32, "4000 IU daily", "Once daily with breakfast"),
        (treatment_ids[1], 3u32, "2g daily", "Twice daily with meals"),
    ];
    let rating = 4i16;
    for (treatment_id, started_months_ago, dosage, frequency) in episodes {
        sqlx::query(
            r#"
            INSERT INTO wellness.treatment_episodes
            (subject_id, treatment_id, start_date, dosage, frequency,
             response_rating, provider_supervised, source_key)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (source_key) DO NOTHING
            "#,
        )
        .bind(subject)
        .bind(treatment_id)
        .bind(months_ago(today, started_months_ago)?)
        .bind(dosage)
        .bind(frequency)
        .bind(rating)
        .bind(false)
        .bind(format!("seed-episode-{treatment_id}"))
        .execute(pool)
        .await?;
    }

    tracing::info!(subject = %subject, email = DEMO_EMAIL, "seeded demo subject");
    Ok(())
}

/// Every record on file for a subject. An unknown email yields an empty history.
pub async fn fetch_history(pool: &PgPool, email: &str) -> anyhow::Result<HealthHistory> {
    let Some(subject) = subject_id(pool, email).await? else {
        tracing::warn!(email, "no subject on record");
        return Ok(HealthHistory::default());
    };

    let mut history = HealthHistory::default();

    let rows = sqlx::query(
        r#"
        SELECT id, biomarker_name, test_date, value, units,
               reference_min, reference_max, optimal_min, optimal_max, status
        FROM wellness.biomarker_results
        WHERE subject_id = $1
        ORDER BY test_date, id
        "#,
    )
    .bind(subject)
    .fetch_all(pool)
    .await?;
    for row in rows {
        let status: String = row.get("status");
        history.biomarkers.push(BiomarkerSample {
            id: row.get("id"),
            name: row.get("biomarker_name"),
            test_date: row.get("test_date"),
            value: row.get("value"),
            units: row.get("units"),
            reference_range: Range::from_bounds(row.get("reference_min"), row.get("reference_max")),
            optimal_range: Range::from_bounds(row.get("optimal_min"), row.get("optimal_max")),
            status: BiomarkerStatus::parse(&status)
                .with_context(|| format!("unknown biomarker status {status:?}"))?,
        });
    }

    let rows = sqlx::query(
        r#"
        SELECT id, domain, assessed_on, t_score, percentile_rank, items_answered
        FROM wellness.promis_results
        WHERE subject_id = $1
        ORDER BY assessed_on, id
        "#,
    )
    .bind(subject)
    .fetch_all(pool)
    .await?;
    for row in rows {
        history.promis.push(PromisSample {
            id: row.get("id"),
            domain: row.get("domain"),
            assessed_on: row.get("assessed_on"),
            t_score: row.get("t_score"),
            percentile_rank: row.get("percentile_rank"),
            items_answered: row.get("items_answered"),
        });
    }

    let rows = sqlx::query(
        r#"
        SELECT id, recorded_on, sleep_hours, sleep_quality, exercise_minutes, exercise_intensity,
               stress_level, energy_level, mood_rating, weight, body_fat_pct
        FROM wellness.lifestyle_metrics
        WHERE subject_id = $1
        ORDER BY recorded_on, id
        "#,
    )
    .bind(subject)
    .fetch_all(pool)
    .await?;
    for row in rows {
        history.lifestyle.push(LifestyleSample {
            id: row.get("id"),
            recorded_on: row.get("recorded_on"),
            sleep_hours: row.get("sleep_hours"),
            sleep_quality: row.get("sleep_quality"),
            exercise_minutes: row.get("exercise_minutes"),
            exercise_intensity: row.get("exercise_intensity"),
            stress_level: row.get("stress_level"),
            energy_level: row.get("energy_level"),
            mood_rating: row.get("mood_rating"),
            weight: row.get("weight"),
            body_fat_pct: row.get("body_fat_pct"),
        });
    }

    let rows = sqlx::query(
        r#"
        SELECT id, treatment_id, start_date, end_date, dosage, frequency,
               response_rating, side_effects_noted, provider_supervised
        FROM wellness.treatment_episodes
        WHERE subject_id = $1
        ORDER BY start_date, id
        "#,
    )
    .bind(subject)
    .fetch_all(pool)
    .await?;
    for row in rows {
        let rating: Option<i16> = row.get("response_rating");
        history.treatments.push(TreatmentEpisode {
            id: row.get("id"),
            treatment_id: row.get("treatment_id"),
            start_date: row.get("start_date"),
            end_date: row.get("end_date"),
            dosage: row.get("dosage"),
            frequency: row.get("frequency"),
            response_rating: rating.map(i32::from),
            side_effects_noted: row.get("side_effects_noted"),
            provider_supervised: row.get("provider_supervised"),
        });
    }

    tracing::debug!(
        email,
        biomarkers = history.biomarkers.len(),
        promis = history.promis.len(),
        lifestyle = history.lifestyle.len(),
        episodes = history.treatments.len(),
        "loaded health history"
    );
    Ok(history)
}

pub async fn fetch_catalog(pool: &PgPool) -> anyhow::Result<TreatmentCatalog> {
    let rows = sqlx::query(
        r#"
        SELECT id, name, category, evidence_level, regulatory_status, mechanism,
               typical_dosage, monitoring_required, common_side_effects, contraindications,
               cost_range, safety_rating
        FROM wellness.treatments
        ORDER BY id
        "#,
    )
    .fetch_all(pool)
    .await?;

    let mut treatments = Vec::with_capacity(rows.len());
    for row in rows {
        let name: String = row.get("name");
        let category: String = row.get("category");
        let evidence: i16 = row.get("evidence_level");
        let regulatory: String = row.get("regulatory_status");
        let safety: i16 = row.get("safety_rating");

        treatments.push(Treatment {
            id: row.get("id"),
            category: TreatmentCategory::parse(&category)
                .with_context(|| format!("{name}: unknown category {category:?}"))?,
            evidence_level: EvidenceLevel::from_ordinal(i32::from(evidence))
                .with_context(|| format!("{name}: unknown evidence level {evidence}"))?,
            regulatory_status: RegulatoryStatus::parse(&regulatory)
                .with_context(|| format!("{name}: unknown regulatory status {regulatory:?}"))?,
            mechanism: row.get("mechanism"),
            typical_dosage: row.get("typical_dosage"),
            monitoring_required: row.get("monitoring_required"),
            common_side_effects: row.get("common_side_effects"),
            contraindications: row.get("contraindications"),
            cost_range: row.get("cost_range"),
            safety_rating: i32::from(safety),
            name,
        });
    }

    Ok(TreatmentCatalog::new(treatments))
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ImportSummary {
    pub inserted: usize,
    pub duplicates: usize,
    pub skipped: usize,
}

impl ImportSummary {
    /// Counts one insert attempt; a conflict on the source key is a duplicate.
    fn tally(&mut self, rows_affected: u64) {
        if rows_affected > 0 {
            self.inserted += 1;
        } else {
            self.duplicates += 1;
        }
    }
}

/// Imports biomarker results for one subject, creating the subject if needed.
///
/// Rows that fail to parse or validate are logged and skipped. Re-importing
/// the same file inserts nothing new.
pub async fn import_csv(
    pool: &PgPool,
    csv_path: &std::path::Path,
    email: &str,
) -> anyhow::Result<ImportSummary> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        biomarker_name: String,
        test_date: NaiveDate,
        value: f64,
        units: String,
        reference_min: Option<f64>,
        reference_max: Option<f64>,
        optimal_min: Option<f64>,
        optimal_max: Option<f64>,
        status: Option<String>,
    }

    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let display_name = email.split('@').next().unwrap_or(email);
    let subject = upsert_subject(pool, email, display_name).await?;
    let mut summary = ImportSummary::default();

    for (index, result) in reader.deserialize::<CsvRow>().enumerate() {
        let line = index + 2;
        let row = match result {
            Ok(row) => row,
            Err(err) => {
                tracing::warn!(line, error = %err, "skipping unreadable row");
                summary.skipped += 1;
                continue;
            }
        };

        let reference_range = Range::from_bounds(row.reference_min, row.reference_max);
        let optimal_range = Range::from_bounds(row.optimal_min, row.optimal_max);
        let status =
            resolve_status(row.status.as_deref(), row.value, reference_range, optimal_range);
        let record = status
            .map(|status| NewBiomarker {
                name: row.biomarker_name.trim().to_string(),
                test_date: row.test_date,
                value: row.value,
                units: row.units.trim().to_string(),
                reference_range,
                optimal_range,
                status,
            })
            .and_then(|record| validate_biomarker(&record).map(|()| record));
        let record = match record {
            Ok(record) => record,
            Err(err) => {
                tracing::warn!(line, error = %err, "skipping invalid row");
                summary.skipped += 1;
                continue;
            }
        };

        let source_key = format!(
            "import-{subject}-{}-{}-{}",
            record.name, record.test_date, record.value
        );
        let result = sqlx::query(
            r#"
            INSERT INTO wellness.biomarker_results
            (subject_id, biomarker_name, test_date, value, units,
             reference_min, reference_max, optimal_min, optimal_max, status, source_key)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (source_key) DO NOTHING
            "#,
        )
        .bind(subject)
        .bind(&record.name)
        .bind(record.test_date)
        .bind(record.value)
        .bind(&record.units)
        .bind(record.reference_range.map(|r| r.min))
        .bind(record.reference_range.map(|r| r.max))
        .bind(record.optimal_range.map(|r| r.min))
        .bind(record.optimal_range.map(|r| r.max))
        .bind(record.status.as_str())
        .bind(source_key)
        .execute(pool)
        .await?;

        summary.tally(result.rows_affected());
    }

    tracing::info!(
        email,
        inserted = summary.inserted,
        duplicates = summary.duplicates,
        skipped = summary.skipped,
        "imported biomarker results"
    );
    Ok(summary)
}

/// Imports PROMIS assessments. Columns: domain, assessed_on, t_score,
/// percentile_rank (optional), items_answered.
pub async fn import_promis_csv(
    pool: &PgPool,
    csv_path: &std::path::Path,
    email: &str,
) -> anyhow::Result<ImportSummary> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        domain: String,
        assessed_on: NaiveDate,
        t_score: f64,
        percentile_rank: Option<f64>,
        items_answered: i32,
    }

    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let display_name = email.split('@').next().unwrap_or(email);
    let subject = upsert_subject(pool, email, display_name).await?;
    let mut summary = ImportSummary::default();

    for (index, result) in reader.deserialize::<CsvRow>().enumerate() {
        let line = index + 2;
        let record = match result {
            Ok(row) => NewPromis {
                domain: row.domain.trim().to_string(),
                assessed_on: row.assessed_on,
                t_score: row.t_score,
                percentile_rank: row.percentile_rank,
                items_answered: row.items_answered,
            },
            Err(err) => {
                tracing::warn!(line, error = %err, "skipping unreadable row");
                summary.skipped += 1;
                continue;
            }
        };
        if let Err(err) = validate_promis(&record) {
            tracing::warn!(line, error = %err, "skipping invalid row");
            summary.skipped += 1;
            continue;
        }
        if !is_known_promis_domain(&record.domain) {
            tracing::info!(line, domain = %record.domain, "unrecognised PROMIS domain kept as is");
        }

        let source_key = format!(
            "import-promis-{subject}-{}-{}",
            record.domain, record.assessed_on
        );
        let result = sqlx::query(
            r#"
            INSERT INTO wellness.promis_results
            (subject_id, domain, assessed_on, t_score, percentile_rank, items_answered, source_key)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (source_key) DO NOTHING
            "#,
        )
        .bind(subject)
        .bind(&record.domain)
        .bind(record.assessed_on)
        .bind(record.t_score)
        .bind(record.percentile_rank)
        .bind(record.items_answered)
        .bind(source_key)
        .execute(pool)
        .await?;

        summary.tally(result.rows_affected());
    }

    tracing::info!(
        email,
        inserted = summary.inserted,
        duplicates = summary.duplicates,
        skipped = summary.skipped,
        "imported PROMIS assessments"
    );
    Ok(summary)
}

/// Imports treatment episodes. Treatments are named and must already be in
/// the catalog; rows naming anything else are skipped.
pub async fn import_episodes_csv(
    pool: &PgPool,
    csv_path: &std::path::Path,
    email: &str,
) -> anyhow::Result<ImportSummary> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        treatment_name: String,
        start_date: NaiveDate,
        end_date: Option<NaiveDate>,
        dosage: Option<String>,
        frequency: Option<String>,
        response_rating: Option<i32>,
        side_effects_noted: Option<String>,
        #[serde(default)]
        provider_supervised: bool,
    }

    let catalog = fetch_catalog(pool).await?;
    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let display_name = email.split('@').next().unwrap_or(email);
    let subject = upsert_subject(pool, email, display_name).await?;
    let mut summary = ImportSummary::default();

    for (index, result) in reader.deserialize::<CsvRow>().enumerate() {
        let line = index + 2;
        let record = match result {
            Ok(row) => NewEpisode {
                treatment_name: row.treatment_name.trim().to_string(),
                start_date: row.start_date,
                end_date: row.end_date,
                dosage: non_blank(row.dosage),
                frequency: non_blank(row.frequency),
                response_rating: row.response_rating,
                side_effects_noted: non_blank(row.side_effects_noted),
                provider_supervised: row.provider_supervised,
            },
            Err(err) => {
                tracing::warn!(line, error = %err, "skipping unreadable row");
                summary.skipped += 1;
                continue;
            }
        };
        if let Err(err) = validate_episode(&record) {
            tracing::warn!(line, error = %err, "skipping invalid row");
            summary.skipped += 1;
            continue;
        }
        let Some(treatment) = catalog.by_name(&record.treatment_name) else {
            tracing::warn!(line, treatment = %record.treatment_name, "skipping unknown treatment");
            summary.skipped += 1;
            continue;
        };

        let source_key = format!(
            "import-episode-{subject}-{}-{}",
            treatment.id, record.start_date
        );
        let result = sqlx::query(
            r#"
            INSERT INTO wellness.treatment_episodes
            (subject_id, treatment_id, start_date, end_date, dosage, frequency,
             response_rating, side_effects_noted, provider_supervised, source_key)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (source_key) DO NOTHING
            "#,
        )
        .bind(subject)
        .bind(treatment.id)
        .bind(record.start_date)
        .bind(record.end_date)
        .bind(&record.dosage)
        .bind(&record.frequency)
        .bind(record.response_rating.map(|r| r as i16))
        .bind(&record.side_effects_noted)
        .bind(record.provider_supervised)
        .bind(source_key)
        .execute(pool)
        .await?;

        summary.tally(result.rows_affected());
    }

    tracing::info!(
        email,
        inserted = summary.inserted,
        duplicates = summary.duplicates,
        skipped = summary.skipped,
        "imported treatment episodes"
    );
    Ok(summary)
}

fn non_blank(text: Option<String>) -> Option<String> {
    text.map(|t| t.trim().to_string()).filter(|t| !t.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::severity;

    #[test]
    fn seed_panel_passes_through_expected_states() {
        let start = seed_panel(0);
        let end = seed_panel(6);
        let vit_d = |panel: &[PanelEntry]| {
            panel.iter().find(|p| p.0 == "Vitamin D").map(|p| (p.1, p.5)).unwrap()
        };
        assert_eq!(vit_d(&start), (32.0, BiomarkerStatus::Low));
        assert_eq!(vit_d(&end), (56.0, BiomarkerStatus::Optimal));
        assert_eq!(start.len(), 7);
    }

    #[test]
    fn seed_low_vitamin_d_grades_like_a_real_sample() {
        let (name, value, units, reference, optimal, status) = seed_panel(0)
            .into_iter()
            .find(|p| p.0 == "Vitamin D")
            .unwrap();
        let sample = BiomarkerSample {
            id: 1,
            name: name.to_string(),
            test_date: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            value,
            units: units.to_string(),
            reference_range: Some(Range::new(reference.0, reference.1)),
            optimal_range: Some(Range::new(optimal.0, optimal.1)),
            status,
        };
        assert_eq!(severity(&sample), 2);
    }

    #[test]
    fn seed_promis_uses_known_domains_and_valid_scores() {
        for (domain, t_score, percentile, items) in SEED_PROMIS {
            assert!(is_known_promis_domain(domain), "{domain}");
            let record = NewPromis {
                domain: domain.to_string(),
                assessed_on: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
                t_score,
                percentile_rank: Some(percentile),
                items_answered: items,
            };
            assert_eq!(validate_promis(&record), Ok(()));
        }
        assert!(!is_known_promis_domain("Pain Interference"));
    }

    #[test]
    fn import_summary_counts_conflicts_as_duplicates() {
        let mut summary = ImportSummary::default();
        summary.tally(1);
        summary.tally(0);
        summary.tally(1);
        assert_eq!(
            summary,
            ImportSummary {
                inserted: 2,
                duplicates: 1,
                skipped: 0
            }
        );
        assert_eq!(non_blank(Some("  ".to_string())), None);
        assert_eq!(non_blank(Some(" daily ".to_string())), Some("daily".to_string()));
    }

    #[test]
    fn seed_catalog_round_trips_enum_text() {
        for t in &SEED_TREATMENTS {
            assert_eq!(TreatmentCategory::parse(t.category.as_str()), Some(t.category));
            assert_eq!(RegulatoryStatus::parse(t.regulatory.as_str()), Some(t.regulatory));
            assert_eq!(EvidenceLevel::from_ordinal(t.evidence.ordinal()), Some(t.evidence));
        }
    }
}
