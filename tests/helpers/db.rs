use consent_mgt::clock::FixedClock;
use consent_mgt::purpose_types::PurposeTypeRegistry;
use consent_mgt::{ConsentService, PurposeService};
use sea_orm::{Database, DatabaseConnection};
use sea_orm_migration::MigratorTrait;
use std::sync::Arc;
use tempfile::NamedTempFile;

/// 2025-01-01T00:00:00Z in milliseconds
pub const NOW: i64 = 1_735_689_600_000;

/// Test database with automatic cleanup
pub struct TestDb {
    connection: DatabaseConnection,
    _temp_file: NamedTempFile,
}

impl TestDb {
    /// Create a new test database with migrations applied
    pub async fn new() -> Self {
        // Create temporary SQLite database file
        let temp_file = NamedTempFile::new().expect("Failed to create temp file");
        let db_path = temp_file.path().to_str().expect("Invalid temp file path");
        let db_url = format!("sqlite://{}?mode=rwc", db_path);

        // Connect to database
        let connection = Database::connect(&db_url)
            .await
            .expect("Failed to connect to test database");

        // Run migrations
        migration::Migrator::up(&connection, None)
            .await
            .expect("Failed to run migrations");

        Self {
            connection,
            _temp_file: temp_file,
        }
    }

    /// Get database connection
    pub fn connection(&self) -> &DatabaseConnection {
        &self.connection
    }
}

/// Services wired against one test database and a controllable clock.
pub struct TestEnv {
    pub db: TestDb,
    pub clock: Arc<FixedClock>,
    pub consents: ConsentService,
    pub purposes: PurposeService,
}

impl TestEnv {
    pub async fn new() -> Self {
        let db = TestDb::new().await;
        let clock = Arc::new(FixedClock::new(NOW));
        let consents = ConsentService::new(db.connection().clone()).with_clock(clock.clone());
        let purposes = PurposeService::new(
            db.connection().clone(),
            Arc::new(PurposeTypeRegistry::with_builtin_types()),
        );
        Self {
            db,
            clock,
            consents,
            purposes,
        }
    }
}
