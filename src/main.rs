use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;

mod db;
mod forecast;
mod insights;
mod models;
mod reliability;
mod report;
mod stats;

#[derive(Parser)]
#[command(name = "pipeline-forecast")]
#[command(about = "Seller reliability scoring and pipeline forecasting for the sales CRM", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Import leads from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Rank sellers by reliability score
    Score {
        #[arg(long)]
        owner: Option<String>,
        #[arg(long, default_value_t = 10)]
        limit: usize,
        #[arg(long)]
        json: bool,
    },
    /// Compute raw and reliability-adjusted pipeline forecasts
    Forecast {
        #[arg(long)]
        owner: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Meetings-to-close statistics and segment lift tables
    Insights {
        #[arg(long, default_value_t = 3)]
        top: usize,
        #[arg(long)]
        json: bool,
    },
    /// Generate a markdown report
    Report {
        #[arg(long)]
        owner: Option<String>,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to the CRM Postgres instance")?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")?;

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { csv } => {
            let inserted = db::import_csv(&pool, &csv).await?;
            println!("Inserted {inserted} leads from {}.", csv.display());
        }
        Commands::Score { owner, limit, json } => {
            let leads = db::fetch_leads(&pool, owner.as_deref()).await?;
            let history = db::fetch_probability_history(&pool, owner.as_deref()).await?;
            let sellers = forecast::forecast_sellers(&leads, &history);

            if sellers.is_empty() {
                println!("No leads found for this scope.");
                return Ok(());
            }

            if json {
                let top: Vec<_> = sellers.iter().take(limit).collect();
                println!("{}", serde_json::to_string_pretty(&top)?);
            } else {
                println!("Sellers by reliability score:");
                for seller in sellers.iter().take(limit) {
                    println!("{}", report::score_line(seller));
                }
            }
        }
        Commands::Forecast { owner, json } => {
            let leads = db::fetch_leads(&pool, owner.as_deref()).await?;
            let history = db::fetch_probability_history(&pool, owner.as_deref()).await?;
            let sellers = forecast::forecast_sellers(&leads, &history);
            let summary = forecast::summarize(&leads, &sellers);

            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&serde_json::json!({
                        "summary": summary,
                        "sellers": sellers,
                    }))?
                );
            } else {
                println!(
                    "Pipeline: {} leads, {} in negotiation.",
                    summary.total_leads, summary.negotiation_count
                );
                println!(
                    "Raw forecast {:.2}, adjusted forecast {:.2}, mean error {:.3}.",
                    summary.forecast_raw, summary.forecast_adjusted, summary.mean_error
                );
                for seller in sellers.iter() {
                    println!(
                        "- {}: {:.2} raw / {:.2} adjusted (score {:.1})",
                        seller.owner,
                        seller.pipeline_expected_value,
                        seller.pipeline_adjusted_value,
                        seller.score
                    );
                }
            }
        }
        Commands::Insights { top, json } => {
            let leads = db::fetch_leads(&pool, None).await?;
            let meetings = db::fetch_meetings(&pool).await?;
            let companies = db::fetch_companies(&pool).await?;

            let meeting_stats = insights::meetings_to_close(&leads, &meetings);
            let postponement = insights::postponement_segments(&meetings);
            let repeat = insights::repeat_business_segments(&companies);

            if json {
                let postponement_json: Vec<_> = postponement
                    .iter()
                    .map(|(dimension, segments)| {
                        serde_json::json!({
                            "dimension": dimension,
                            "segments": segments.iter().take(top).collect::<Vec<_>>(),
                        })
                    })
                    .collect();
                println!(
                    "{}",
                    serde_json::to_string_pretty(&serde_json::json!({
                        "meetings_to_close": meeting_stats,
                        "postponement": postponement_json,
                        "repeat_business": repeat.iter().take(top).collect::<Vec<_>>(),
                    }))?
                );
            } else {
                println!(
                    "Meetings to close: p50 {:.0} over {} deals ({} confidence), correlation {:.2}.",
                    meeting_stats.p50,
                    meeting_stats.sample_size,
                    meeting_stats.confidence,
                    meeting_stats.correlation
                );
                for (dimension, segments) in &postponement {
                    for segment in segments.iter().take(top) {
                        println!(
                            "- postponement / {dimension} {}: {:.0}% over {} meetings (lift {:+.0}pp)",
                            segment.label,
                            segment.rate * 100.0,
                            segment.sample_size,
                            segment.lift * 100.0
                        );
                    }
                }
                for segment in repeat.iter().take(top) {
                    println!(
                        "- repeat business / {}: {:.0}% over {} companies (lift {:+.0}pp)",
                        segment.label,
                        segment.rate * 100.0,
                        segment.sample_size,
                        segment.lift * 100.0
                    );
                }
            }
        }
        Commands::Report { owner, out } => {
            let leads = db::fetch_leads(&pool, owner.as_deref()).await?;
            let history = db::fetch_probability_history(&pool, owner.as_deref()).await?;
            let meetings = db::fetch_meetings(&pool).await?;
            let companies = db::fetch_companies(&pool).await?;

            let report = report::build_report(
                owner.as_deref(),
                &leads,
                &history,
                &meetings,
                &companies,
            );
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
