use std::fs::File;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use clap::Parser;
use obra_data::{BudgetLineLoader, NewCertificationHeader};
use obra_db_sqlite::SqliteRepository;
use rust_decimal::Decimal;
use tracing_subscriber::EnvFilter;

/// Load a contract budget from a CSV file as a new draft certification.
///
/// The CSV file should have the following columns:
/// - code: Line code (e.g., 01.02)
/// - description: Work item description
/// - unit_of_measure: Unit of the quantities (m2, m3, ud...)
/// - unit_price: Contract price per unit
/// - budgeted_quantity: Contracted quantity
/// - previous_quantity: Quantity already certified (optional, empty for none)
#[derive(Parser, Debug)]
#[command(name = "obra-data-loader")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the CSV file containing the budget lines
    #[arg(short, long)]
    file: PathBuf,

    /// SQLite database path or URL (e.g., sqlite:obra.db?mode=rwc)
    #[arg(short, long, default_value = "sqlite:obra.db?mode=rwc")]
    database: String,

    /// Run database migrations before loading data
    #[arg(short, long, default_value_t = false)]
    migrate: bool,

    /// Code of the certification to create
    #[arg(short, long)]
    code: String,

    /// Project the certification belongs to
    #[arg(short, long)]
    project: String,

    /// Sequence number of the certification within the project
    #[arg(short, long, default_value_t = 1, value_parser = clap::value_parser!(i32).range(1..))]
    number: i32,

    /// Certification date (YYYY-MM-DD); defaults to today
    #[arg(long)]
    date: Option<NaiveDate>,

    /// Retention percentage applied to each certified amount
    #[arg(short, long, default_value_t = Decimal::ZERO)]
    retention: Decimal,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let args = Args::parse();

    let repo = SqliteRepository::new(&args.database)
        .await
        .with_context(|| format!("Failed to connect to database: {}", args.database))?;

    if args.migrate {
        println!("Running migrations...");
        repo.run_migrations()
            .await
            .context("Failed to run migrations")?;
        println!("Migrations complete.");
    }

    println!("Loading budget from: {}", args.file.display());

    let file = File::open(&args.file)
        .with_context(|| format!("Failed to open: {}", args.file.display()))?;

    let records = BudgetLineLoader::parse(file)
        .with_context(|| format!("Failed to parse CSV: {}", args.file.display()))?;

    println!("Parsed {} budget lines from CSV", records.len());

    let header = NewCertificationHeader {
        code: args.code,
        project_ref: args.project,
        number: args.number,
        certification_date: args.date.unwrap_or_else(|| Local::now().date_naive()),
        retention_percentage: args.retention,
        notes: None,
    };

    let certification = BudgetLineLoader::load(&repo, header, &records)
        .await
        .context("Failed to load budget into database")?;

    println!(
        "Created certification {} (#{}) with {} lines, budgeted amount {}.",
        certification.code,
        certification.number,
        certification.lines.len(),
        certification.totals.budgeted_amount
    );

    Ok(())
}
