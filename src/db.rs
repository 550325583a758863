use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, instrument};

/// Tables are created if absent at run start; the importer never drops or
/// migrates existing tables.
const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS pokemon (
    id     INTEGER PRIMARY KEY,
    name   TEXT NOT NULL UNIQUE,
    height INTEGER,
    weight INTEGER,
    sprite TEXT
);
CREATE TABLE IF NOT EXISTS types (
    id   INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE
);
CREATE TABLE IF NOT EXISTS abilities (
    id   INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE
);
CREATE TABLE IF NOT EXISTS moves (
    id   INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE
);
CREATE TABLE IF NOT EXISTS pokemon_types (
    pokemon_id INTEGER NOT NULL REFERENCES pokemon(id),
    type_id    INTEGER NOT NULL REFERENCES types(id),
    PRIMARY KEY (pokemon_id, type_id)
);
CREATE TABLE IF NOT EXISTS pokemon_abilities (
    pokemon_id INTEGER NOT NULL REFERENCES pokemon(id),
    ability_id INTEGER NOT NULL REFERENCES abilities(id),
    PRIMARY KEY (pokemon_id, ability_id)
);
CREATE TABLE IF NOT EXISTS pokemon_moves (
    pokemon_id INTEGER NOT NULL REFERENCES pokemon(id),
    move_id    INTEGER NOT NULL REFERENCES moves(id),
    PRIMARY KEY (pokemon_id, move_id)
);
CREATE TABLE IF NOT EXISTS pokemon_evolutions (
    pokemon_id INTEGER NOT NULL REFERENCES pokemon(id),
    related_id INTEGER NOT NULL REFERENCES pokemon(id),
    PRIMARY KEY (pokemon_id, related_id),
    CHECK (pokemon_id <> related_id)
);
"#;

#[derive(Clone)]
pub struct Db {
    pub pool: SqlitePool,
}

impl Db {
    #[instrument(skip(database_url))]
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let mut options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5))
            .foreign_keys(true);
        // WAL lets concurrent workers read while one commits; in-memory
        // databases only support the default journal
        if !database_url.contains(":memory:") {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await?;
        info!("connected to db");
        Ok(Self { pool })
    }

    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }
}

/// Classify a storage error as a retryable write conflict: a uniqueness
/// violation from a racing get-or-create, or the sqlite busy/locked family
/// surfaced when two writers collide.
pub fn is_write_conflict(err: &sqlx::Error) -> bool {
    let Some(db_err) = err.as_database_error() else {
        return false;
    };
    if matches!(db_err.kind(), sqlx::error::ErrorKind::UniqueViolation) {
        return true;
    }
    // SQLITE_BUSY (5), SQLITE_LOCKED (6) and their extended codes
    matches!(db_err.code().as_deref(), Some("5" | "6" | "261" | "517"))
}
