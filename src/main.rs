use clap::Parser;
use learnhub::application::aggregates::AggregateService;
use learnhub::application::reconciliation::PaymentReconciler;
use learnhub::application::unit_of_work::Database;
use learnhub::config::EngineConfig;
use learnhub::domain::catalog::Course;
use learnhub::domain::ports::PersistenceBox;
use learnhub::domain::query::{Query, SortDirection};
use learnhub::infrastructure::in_memory::VolatilePersistence;
use learnhub::interfaces::csv::course_writer::CourseWriter;
use learnhub::interfaces::seed::CatalogSeed;
use learnhub::interfaces::webhook::event_reader::EventReader;
use miette::{IntoDiagnostic, Result};
use rust_decimal::Decimal;
use std::fs::File;
use std::io;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Payment gateway events, one JSON document per line
    events: PathBuf,

    /// Catalog to load before replaying the events (JSON)
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Fraction of each payment kept by the platform
    #[arg(long, default_value = "0.20")]
    platform_share: Decimal,

    /// Watched fraction at which a course counts as completed
    #[arg(long, default_value_t = 0.92)]
    completion_threshold: f64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let config = EngineConfig::new(cli.platform_share, cli.completion_threshold).into_diagnostic()?;

    let persistence = open_persistence(cli.db_path)?;
    let db = Database::open(persistence).await.into_diagnostic()?;

    if let Some(path) = cli.catalog {
        let file = File::open(path).into_diagnostic()?;
        let seed = CatalogSeed::from_reader(file).into_diagnostic()?;
        seed.apply(&db, &AggregateService::new(config))
            .await
            .into_diagnostic()?;
    }

    // Replay gateway events
    let reconciler = PaymentReconciler::new(db.clone(), config);
    let file = File::open(cli.events).into_diagnostic()?;
    for event in EventReader::new(file).events() {
        match event {
            Ok(event) => {
                if let Err(e) = reconciler.handle(&event).await {
                    eprintln!("Error processing event {}: {}", event.id, e);
                }
            }
            Err(e) => {
                eprintln!("Error reading event: {}", e);
            }
        }
    }

    // Output final course aggregates
    let view = db.read().await;
    let courses = view
        .find(&Query::<Course>::all().order_by("id", SortDirection::Ascending))
        .into_diagnostic()?;
    let stdout = io::stdout();
    let mut writer = CourseWriter::new(stdout.lock());
    writer
        .write_courses(courses.iter().map(|loaded| &loaded.entity))
        .into_diagnostic()?;

    Ok(())
}

#[cfg(feature = "storage-rocksdb")]
fn open_persistence(db_path: Option<PathBuf>) -> Result<PersistenceBox> {
    use learnhub::infrastructure::rocksdb::RocksDbPersistence;

    match db_path {
        Some(path) => Ok(Box::new(RocksDbPersistence::open(path).into_diagnostic()?)),
        None => Ok(Box::new(VolatilePersistence::new())),
    }
}

#[cfg(not(feature = "storage-rocksdb"))]
fn open_persistence(db_path: Option<PathBuf>) -> Result<PersistenceBox> {
    if db_path.is_some() {
        eprintln!(
            "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
        );
    }
    Ok(Box::new(VolatilePersistence::new()))
}
