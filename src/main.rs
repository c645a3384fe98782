use std::path::PathBuf;

use anyhow::Context;
use chrono::{Months, NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::EnvFilter;

mod config;
mod correlation;
mod db;
mod effectiveness;
mod models;
mod recommend;
mod report;
mod status;
mod trend;
mod validate;

use recommend::RecommendationEngine;

#[derive(Parser)]
#[command(name = "wellness-analytics")]
#[command(
    about = "Biomarker, PROMIS and treatment analytics for a personal health record",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Subject {
    /// Subject to analyse
    #[arg(long, default_value = db::DEMO_EMAIL)]
    email: String,
    /// Print JSON instead of text
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load the demo subject and treatment catalog
    Seed,
    /// Import biomarker results from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
        #[arg(long)]
        email: String,
    },
    /// Import PROMIS assessments from a CSV file
    ImportPromis {
        #[arg(long)]
        csv: PathBuf,
        #[arg(long)]
        email: String,
    },
    /// Import treatment episodes from a CSV file
    ImportEpisodes {
        #[arg(long)]
        csv: PathBuf,
        #[arg(long)]
        email: String,
    },
    /// Latest reading per biomarker with alert level
    Status {
        #[command(flatten)]
        subject: Subject,
    },
    /// Warning and critical biomarker alerts
    Alerts {
        #[command(flatten)]
        subject: Subject,
    },
    /// Counts of optimal, warning and critical biomarkers
    Summary {
        #[command(flatten)]
        subject: Subject,
    },
    /// Regression trends for biomarkers, PROMIS and lifestyle metrics
    Trends {
        #[command(flatten)]
        subject: Subject,
        #[arg(long, default_value_t = 6)]
        months: u32,
    },
    /// Pairwise biomarker correlations
    Correlations {
        #[command(flatten)]
        subject: Subject,
    },
    /// Effectiveness scores for every treatment episode
    Outcomes {
        #[command(flatten)]
        subject: Subject,
    },
    /// Pairwise comparison of treatment outcomes
    Compare {
        #[command(flatten)]
        subject: Subject,
    },
    /// Measurements recorded during one treatment episode
    Timeline {
        #[command(flatten)]
        subject: Subject,
        #[arg(long)]
        episode: i64,
    },
    /// Treatment plan built from past outcomes and current gaps
    Plan {
        #[command(flatten)]
        subject: Subject,
    },
    /// Treatments that target current deficiencies
    Recommend {
        #[command(flatten)]
        subject: Subject,
        /// JSON file overriding the built-in treatment mappings
        #[arg(long)]
        mappings: Option<PathBuf>,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Generate a markdown report
    Report {
        #[arg(long, default_value = db::DEMO_EMAIL)]
        email: String,
        #[arg(long, default_value_t = 6)]
        months: u32,
        #[arg(long)]
        mappings: Option<PathBuf>,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn window_start(as_of: NaiveDate, months: u32) -> anyhow::Result<NaiveDate> {
    as_of
        .checked_sub_months(Months::new(months))
        .with_context(|| format!("--months {months} reaches before the calendar start"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = config::Settings::from_env()?;

    let pool = PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .connect(&settings.database_url)
        .await
        .context("failed to connect to Postgres")?;

    let as_of = Utc::now().date_naive();

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&pool).await?;
            println!("Seed data inserted for {}.", db::DEMO_EMAIL);
        }
        Commands::Import { csv, email } => {
            let summary = db::import_csv(&pool, &csv, &email).await?;
            println!(
                "Inserted {} biomarker results from {} ({} duplicates, {} skipped).",
                summary.inserted,
                csv.display(),
                summary.duplicates,
                summary.skipped
            );
        }
        Commands::ImportPromis { csv, email } => {
            let summary = db::import_promis_csv(&pool, &csv, &email).await?;
            println!(
                "Inserted {} PROMIS assessments from {} ({} duplicates, {} skipped).",
                summary.inserted,
                csv.display(),
                summary.duplicates,
                summary.skipped
            );
        }
        Commands::ImportEpisodes { csv, email } => {
            let summary = db::import_episodes_csv(&pool, &csv, &email).await?;
            println!(
                "Inserted {} treatment episodes from {} ({} duplicates, {} skipped).",
                summary.inserted,
                csv.display(),
                summary.duplicates,
                summary.skipped
            );
        }
        Commands::Status { subject } => {
            let history = db::fetch_history(&pool, &subject.email).await?;
            let indicators = status::status_indicators(&history);
            if subject.json {
                return print_json(&indicators);
            }
            if indicators.is_empty() {
                println!("No biomarker results for {}.", subject.email);
            }
            for i in &indicators {
                println!(
                    "- {} {} {} ({}, {}, severity {}) [{}] as of {}",
                    i.biomarker_name,
                    i.current_value,
                    i.units,
                    i.status,
                    i.trend,
                    i.severity,
                    i.alert_level,
                    i.last_updated
                );
            }
        }
        Commands::Alerts { subject } => {
            let history = db::fetch_history(&pool, &subject.email).await?;
            let alerts = status::active_alerts(&history);
            if subject.json {
                return print_json(&alerts);
            }
            if alerts.is_empty() {
                println!("No active alerts.");
            }
            for alert in &alerts {
                println!("- {} ({})", alert.message, alert.raised_on);
            }
        }
        Commands::Summary { subject } => {
            let history = db::fetch_history(&pool, &subject.email).await?;
            let summary = status::biomarker_summary(&history);
            if subject.json {
                return print_json(&summary);
            }
            println!(
                "{} biomarkers: {} optimal ({:.1}%), {} warning ({:.1}%), {} critical ({:.1}%)",
                summary.total,
                summary.optimal,
                summary.optimal_percentage(),
                summary.warning,
                summary.warning_percentage(),
                summary.critical,
                summary.critical_percentage()
            );
            println!(
                "{} improving, {} declining, last updated {}",
                summary.improving,
                summary.declining,
                summary
                    .last_updated
                    .map_or_else(|| "never".to_string(), |d| d.to_string())
            );
        }
        Commands::Trends { subject, months } => {
            let since = window_start(as_of, months)?;
            let history = db::fetch_history(&pool, &subject.email).await?;
            let trends = trend::health_trends(&history, since);
            if subject.json {
                return print_json(&trends);
            }
            if trends.is_empty() {
                println!("Not enough data since {since} for any trend.");
            }
            for t in &trends {
                println!(
                    "- {} [{}] {} slope {:.3} ({:?}, {} points)",
                    t.metric_name,
                    t.kind.label(),
                    t.direction,
                    t.strength,
                    t.significance,
                    t.data_points
                );
            }
        }
        Commands::Correlations { subject } => {
            let history = db::fetch_history(&pool, &subject.email).await?;
            let correlations = correlation::biomarker_correlations(&history);
            if subject.json {
                return print_json(&correlations);
            }
            if correlations.is_empty() {
                println!("Not enough overlapping results to correlate.");
            }
            for c in &correlations {
                println!(
                    "- {} / {}: r = {:.3} ({:?} {:?}, n = {})",
                    c.first, c.second, c.coefficient, c.strength, c.sign, c.data_points
                );
            }
        }
        Commands::Outcomes { subject } => {
            let history = db::fetch_history(&pool, &subject.email).await?;
            let catalog = db::fetch_catalog(&pool).await?;
            let outcomes = effectiveness::treatment_outcomes(&history, &catalog, as_of);
            if subject.json {
                return print_json(&outcomes);
            }
            if outcomes.is_empty() {
                println!("No treatments on record.");
            }
            for o in &outcomes {
                let improved = o
                    .biomarker_outcomes
                    .iter()
                    .filter(|b| b.is_directional_improvement())
                    .count();
                println!(
                    "- #{} {} since {}: {:.1}/100 ({:?}); biomarkers {:+.1}% ({}/{} improved), \
                     PROMIS {:+.1}, adherence {:.0}%",
                    o.episode_id,
                    o.treatment_name,
                    o.start_date,
                    o.overall_effectiveness,
                    o.level(),
                    o.average_biomarker_change(),
                    improved,
                    o.biomarker_outcomes.len(),
                    o.average_t_score_change(),
                    o.adherence
                );
            }
        }
        Commands::Compare { subject } => {
            let history = db::fetch_history(&pool, &subject.email).await?;
            let catalog = db::fetch_catalog(&pool).await?;
            let outcomes = effectiveness::treatment_outcomes(&history, &catalog, as_of);
            let comparisons = effectiveness::compare_treatments(&outcomes);
            if subject.json {
                return print_json(&comparisons);
            }
            if comparisons.is_empty() {
                println!("Need at least two treatments to compare.");
            }
            for c in &comparisons {
                println!(
                    "- {} vs {}: gap {:+.1}. {}",
                    c.first, c.second, c.effectiveness_gap, c.recommendation
                );
            }
        }
        Commands::Timeline { subject, episode } => {
            let history = db::fetch_history(&pool, &subject.email).await?;
            let catalog = db::fetch_catalog(&pool).await?;
            let Some(timeline) = effectiveness::treatment_timeline(&history, &catalog, episode)
            else {
                println!("No treatment episode #{episode} for {}.", subject.email);
                return Ok(());
            };
            if subject.json {
                return print_json(&timeline);
            }
            println!(
                "{} from {} to {}",
                timeline.treatment_name,
                timeline.start_date,
                timeline
                    .end_date
                    .map_or_else(|| "ongoing".to_string(), |d| d.to_string())
            );
            for b in &timeline.biomarkers {
                println!("- {} {}: {} {} ({})", b.test_date, b.name, b.value, b.units, b.status);
            }
            for p in &timeline.promis {
                println!("- {} {}: T-score {}", p.assessed_on, p.domain, p.t_score);
            }
            for t in &timeline.trends {
                println!("  trend {}: {} ({} points)", t.metric_name, t.direction, t.data_points);
            }
        }
        Commands::Plan { subject } => {
            let history = db::fetch_history(&pool, &subject.email).await?;
            let catalog = db::fetch_catalog(&pool).await?;
            let plan = effectiveness::personalized_plan(&history, &catalog, as_of);
            if subject.json {
                return print_json(&plan);
            }
            println!("Current health status: {}", plan.current_health_status);
            for s in &plan.suggestions {
                println!(
                    "- Continue {} ({}): expected {:.1}/100",
                    s.treatment_name,
                    s.recommended_dosage.as_deref().unwrap_or("dosage per provider"),
                    s.expected_effectiveness
                );
            }
            for goal in &plan.health_goals {
                println!("- Goal: {goal}");
            }
            println!("Monitoring: {}", plan.monitoring_plan);
        }
        Commands::Recommend {
            subject,
            mappings,
            limit,
        } => {
            let engine = RecommendationEngine::new(config::load_mappings(mappings.as_deref())?);
            let history = db::fetch_history(&pool, &subject.email).await?;
            let catalog = db::fetch_catalog(&pool).await?;
            let mut recommendations = engine.recommend(&history, &catalog);
            recommendations.truncate(limit);
            if subject.json {
                return print_json(&recommendations);
            }
            if recommendations.is_empty() {
                println!("No new treatments to recommend.");
            }
            for r in &recommendations {
                println!("- {} (priority {})", r.treatment_name, r.priority_score);
                println!("  {}", r.reasoning);
            }
        }
        Commands::Report {
            email,
            months,
            mappings,
            out,
        } => {
            let since = window_start(as_of, months)?;
            let engine = RecommendationEngine::new(config::load_mappings(mappings.as_deref())?);
            let history = db::fetch_history(&pool, &email).await?;
            if history.is_empty() {
                tracing::warn!(email = %email, "no records on file, report will be empty");
            }
            let catalog = db::fetch_catalog(&pool).await?;
            let report = report::build_report(&email, as_of, since, &history, &catalog, &engine);
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
