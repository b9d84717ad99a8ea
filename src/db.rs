use std::path::Path;
use std::str::FromStr;

use log::{error, info};
use rocket::fairing::{Fairing, Info, Kind};
use rocket::{Build, Rocket};
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

static MIGRATOR: Migrator = sqlx::migrate!("db/migrations");

pub struct DbPool(pub SqlitePool);

pub struct DbPoolFairing();
#[rocket::async_trait]
impl Fairing for DbPoolFairing {
    fn info(&self) -> Info {
        Info {
            name: "SQLite Database Pool with Migrations",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, rocket: Rocket<Build>) -> rocket::fairing::Result {
        let database_url = if cfg!(test) {
            "sqlite::memory:".to_string()
        } else {
            let figment = rocket.figment();
            let database_url = figment.extract_inner::<String>("database_url").expect("database_url");
            if database_url.starts_with("sqlite://") {
                let db_path = database_url.trim_start_matches("sqlite://");
                if !Path::new(db_path).exists() {
                    std::fs::File::create(db_path).expect("Failed to create SQLite database file");
                }
            }
            database_url
        };

        info!("Opening database: {database_url}");
        let opts = match SqliteConnectOptions::from_str(&database_url) {
            Ok(opts) => opts.journal_mode(SqliteJournalMode::Wal), // use WAL for better concurrency
            Err(err) => {
                error!("Invalid database url: {:?}", err);
                return Err(rocket);
            }
        };
        // a single connection keeps every test on the same in-memory database
        let max_connections = if cfg!(test) { 1 } else { 5 };
        let pool = match SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(opts)
            .await
        {
            Ok(pool) => pool,
            Err(err) => {
                error!("Database connection error: {:?}", err);
                return Err(rocket);
            }
        };

        match MIGRATOR.run(&pool).await {
            Ok(_) => info!("Migrations applied successfully!"),
            Err(err) => {
                error!("Migration error: {:?}", err);
                return Err(rocket);
            }
        };

        Ok(rocket.manage(DbPool(pool)))
    }
}
