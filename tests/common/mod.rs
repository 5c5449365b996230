use learnhub::application::aggregates::AggregateService;
use learnhub::application::unit_of_work::Database;
use learnhub::interfaces::seed::CatalogSeed;
use std::fs::File;

/// In-memory database loaded with `tests/fixtures/catalog.json`.
pub async fn fixture_db() -> Database {
    let db = Database::in_memory();
    let file = File::open("tests/fixtures/catalog.json").unwrap();
    CatalogSeed::from_reader(file)
        .unwrap()
        .apply(&db, &AggregateService::default())
        .await
        .unwrap();
    db
}
