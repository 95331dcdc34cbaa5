use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use arb_crawler::application::{dump, input, Pipeline, PipelineOptions, RunSummary};
use arb_crawler::infrastructure::config::AppConfig;
use arb_crawler::infrastructure::parsing::{DetailParser, ListingParser};
use arb_crawler::infrastructure::{AppealRepository, DatabaseConnection, Fetcher};

#[derive(Parser)]
#[command(name = "arb-crawler", about = "Assessment appeal e-status crawler")]
struct Cli {
    /// JSON config file; defaults apply when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch, extract and store appeals for every roll number in the CSV
    Run {
        /// One-column roll number CSV
        #[arg(long, default_value = "data/roll-numbers.csv")]
        csv: PathBuf,

        /// Skip fetching appeal detail pages
        #[arg(long)]
        no_details: bool,

        /// Dump the run's aggregates to this JSON file
        #[arg(long)]
        dump: Option<PathBuf>,
    },
    /// Show row counts for the stored schema
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load_or_default(cli.config.as_deref()).await?;

    let db = DatabaseConnection::new(&config.database).await?;
    db.migrate().await?;
    let repository = AppealRepository::new(db.pool().clone());

    match cli.command {
        Commands::Run {
            csv,
            no_details,
            dump,
        } => run_pipeline(&config, repository, &csv, no_details, dump).await,
        Commands::Stats => {
            let counts = repository.counts().await?;
            println!("Properties:      {}", counts.properties);
            println!("Appeals:         {}", counts.appeals);
            println!("Appeal details:  {}", counts.appeal_details);
            println!("Representatives: {}", counts.representatives);
            println!("Rep. links:      {}", counts.representative_links);
            println!("Hearings:        {}", counts.hearings);
            Ok(())
        }
    }
}

async fn run_pipeline(
    config: &AppConfig,
    repository: AppealRepository,
    csv: &PathBuf,
    no_details: bool,
    dump_path: Option<PathBuf>,
) -> Result<()> {
    let rolls = input::load_roll_numbers(csv).await?;
    if rolls.is_empty() {
        println!("No roll numbers to process.");
        return Ok(());
    }
    let targets = input::resolve_targets(&config.pipeline.listing_url_template, &rolls);
    println!("Processing {} roll number(s)...", targets.len());

    let options = PipelineOptions {
        fetch_details: config.pipeline.fetch_details && !no_details,
        max_concurrent_rolls: config.pipeline.max_concurrent_rolls,
        deadline: config.pipeline.run_deadline_seconds.map(Duration::from_secs),
    };

    let pipeline = Pipeline::new(
        Fetcher::new(config.fetch.clone())?,
        ListingParser::new()?,
        DetailParser::new()?,
        repository.clone(),
        options,
    );

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, cancelling run");
                cancel.cancel();
            }
        });
    }

    let summary = pipeline.run(targets, cancel).await;
    print_summary(&summary);
    print_sample_digest(&repository, &summary).await;

    if let Some(path) = dump_path.or_else(|| config.pipeline.results_path.clone()) {
        dump::dump_run_summary(&path, &summary).await?;
        println!("Aggregates written to {}", path.display());
    }

    Ok(())
}

fn print_summary(summary: &RunSummary) {
    println!();
    println!("Run summary:");
    println!("  attempted:            {}", summary.total);
    println!("  succeeded:            {}", summary.succeeded);
    println!("  with partial detail:  {}", summary.succeeded_with_partial_detail);
    println!("  failed at listing:    {}", summary.failed_at_listing);

    if !summary.failures.is_empty() {
        println!("  failures:");
        for failure in &summary.failures {
            println!(
                "    {} ({} stage): {}",
                failure.roll_number, failure.stage, failure.cause
            );
        }
    }
}

/// Mirror of the stored state for the first successful roll number, as a
/// quick signal that the run actually landed in the database.
async fn print_sample_digest(repository: &AppealRepository, summary: &RunSummary) {
    let Some(first) = summary.results.first() else {
        return;
    };
    let roll = &first.aggregate.roll_number;

    let Ok(Some(property)) = repository.get_property(roll).await else {
        return;
    };
    let Ok(appeals) = repository.get_appeals_for_property(roll).await else {
        return;
    };

    println!();
    println!("Sample property: {}", property.roll_number);
    if let Some(description) = &property.description {
        println!("  description: {}", description);
    }
    println!("  stored appeals: {}", appeals.len());
    for appeal in appeals.iter().take(5) {
        println!(
            "    {} ({})",
            appeal.appeal_number,
            appeal.status.as_deref().unwrap_or("no status")
        );
    }
    if appeals.len() > 5 {
        println!("    ...and {} more", appeals.len() - 5);
    }
}
