use anyhow::Result;

use crate::db::Db;
use crate::util::env as env_util;

const TABLES: &[&str] = &[
    "pokemon",
    "types",
    "abilities",
    "moves",
    "pokemon_types",
    "pokemon_abilities",
    "pokemon_moves",
    "pokemon_evolutions",
];

/// Print row counts for every table in the local store. A table that does
/// not exist yet counts as zero, so this is safe to run before any import.
pub async fn run(database_url: Option<String>) -> Result<()> {
    let db_url = database_url.unwrap_or_else(env_util::db_url);
    let db = Db::connect(&db_url, 2).await?;

    println!("table counts:");
    for table in TABLES {
        let n = count(&db, table).await?;
        println!("{table:>20}: {n}");
    }
    Ok(())
}

async fn count(db: &Db, table: &str) -> Result<i64> {
    let sql = format!("SELECT COUNT(*) FROM {table}");
    match sqlx::query_scalar::<_, i64>(&sql).fetch_one(&db.pool).await {
        Ok(n) => Ok(n),
        Err(e) if is_missing_table(&e) => Ok(0),
        Err(e) => Err(e.into()),
    }
}

fn is_missing_table(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .map(|db_err| db_err.message().contains("no such table"))
        .unwrap_or(false)
}
