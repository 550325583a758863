use anyhow::Result;
use sqlx::{Sqlite, Transaction};
use std::time::Duration;
use tracing::{info, warn};

use crate::api::models::PokemonDetail;
use crate::api::{ApiClient, FetchResult};
use crate::db::{is_write_conflict, Db};
use crate::importer::{BaseOutcome, SkipReason};

/// Retry ceiling for the whole check-insert-commit sequence on a write
/// conflict (total attempts, not extra retries).
pub const MAX_CONFLICT_ATTEMPTS: u32 = 15;
/// Wait before conflict attempt k is `k * CONFLICT_DELAY_STEP`.
pub const CONFLICT_DELAY_STEP: Duration = Duration::from_millis(10);

#[derive(Debug)]
pub enum InsertOutcome {
    Inserted { types: Vec<String> },
    AlreadyPresent,
}

/// One phase-1 unit: fetch the detail payload, then persist it. Every exit
/// path maps to a terminal outcome; nothing here aborts the batch.
pub async fn import_base(db: &Db, client: &ApiClient, id: i64) -> BaseOutcome {
    let detail = match client.fetch_detail(id).await {
        FetchResult::Ok(d) => d,
        FetchResult::NotFound => {
            info!(id, "not found upstream; skipped");
            return BaseOutcome::Skipped(SkipReason::NotFound);
        }
        FetchResult::Failed => {
            warn!(id, "detail fetch failed after retries");
            return BaseOutcome::Error;
        }
    };
    match insert_base(db, &detail).await {
        Ok(InsertOutcome::Inserted { types }) => {
            info!(id = detail.id, name = %detail.name, types = %types.join(", "), "imported base entry");
            BaseOutcome::Imported {
                id: detail.id,
                name: detail.name.to_lowercase(),
            }
        }
        Ok(InsertOutcome::AlreadyPresent) => {
            info!(id = detail.id, "already present; skipped");
            BaseOutcome::Skipped(SkipReason::AlreadyPresent)
        }
        Err(err) => {
            warn!(id, error = %err, "base import failed");
            BaseOutcome::Error
        }
    }
}

/// Persist one detail payload idempotently. Write conflicts (racing
/// get-or-create on the shared lookup tables) roll back and retry the whole
/// sequence with escalating delay; this trades bounded repeated work for not
/// holding locks across workers. Non-conflict errors surface immediately.
pub async fn insert_base(db: &Db, detail: &PokemonDetail) -> Result<InsertOutcome> {
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match try_insert(db, detail).await {
            Ok(outcome) => return Ok(outcome),
            Err(err) if is_write_conflict(&err) && attempt < MAX_CONFLICT_ATTEMPTS => {
                warn!(id = detail.id, attempt, error = %err, "write conflict; retrying transaction");
                tokio::time::sleep(CONFLICT_DELAY_STEP * attempt).await;
            }
            Err(err) => return Err(err.into()),
        }
    }
}

async fn try_insert(db: &Db, detail: &PokemonDetail) -> Result<InsertOutcome, sqlx::Error> {
    let mut tx = db.pool.begin().await?;

    let existing: Option<i64> = sqlx::query_scalar("SELECT id FROM pokemon WHERE id = ?")
        .bind(detail.id)
        .fetch_optional(&mut *tx)
        .await?;
    if existing.is_some() {
        // dropped transaction rolls back; nothing was written
        return Ok(InsertOutcome::AlreadyPresent);
    }

    sqlx::query("INSERT INTO pokemon (id, name, height, weight, sprite) VALUES (?, ?, ?, ?, ?)")
        .bind(detail.id)
        .bind(detail.name.to_lowercase())
        .bind(detail.height)
        .bind(detail.weight)
        .bind(detail.sprites.front_default.as_deref())
        .execute(&mut *tx)
        .await?;

    let mut types = Vec::with_capacity(detail.types.len());
    for slot in &detail.types {
        let name = slot.type_ref.name.to_lowercase();
        let type_id = get_or_create(&mut tx, "types", &name).await?;
        link(&mut tx, "pokemon_types", "type_id", detail.id, type_id).await?;
        types.push(name);
    }
    for slot in &detail.abilities {
        let name = slot.ability.name.to_lowercase();
        let ability_id = get_or_create(&mut tx, "abilities", &name).await?;
        link(&mut tx, "pokemon_abilities", "ability_id", detail.id, ability_id).await?;
    }
    for slot in &detail.moves {
        let name = slot.move_ref.name.to_lowercase();
        let move_id = get_or_create(&mut tx, "moves", &name).await?;
        link(&mut tx, "pokemon_moves", "move_id", detail.id, move_id).await?;
    }

    tx.commit().await?;
    Ok(InsertOutcome::Inserted { types })
}

/// Resolve a lookup row by unique name, inserting it if absent. The insert
/// joins the caller's open transaction, so later lookups in the same
/// transaction see the new row before commit.
async fn get_or_create(
    tx: &mut Transaction<'_, Sqlite>,
    table: &str,
    name: &str,
) -> Result<i64, sqlx::Error> {
    let select = format!("SELECT id FROM {table} WHERE name = ?");
    if let Some(id) = sqlx::query_scalar::<_, i64>(&select)
        .bind(name)
        .fetch_optional(&mut **tx)
        .await?
    {
        return Ok(id);
    }
    let insert = format!("INSERT INTO {table} (name) VALUES (?)");
    let res = sqlx::query(&insert).bind(name).execute(&mut **tx).await?;
    Ok(res.last_insert_rowid())
}

/// Attach one attribute link. OR IGNORE keeps links at-most-once even when a
/// payload repeats a name.
async fn link(
    tx: &mut Transaction<'_, Sqlite>,
    join_table: &str,
    fk_column: &str,
    pokemon_id: i64,
    target_id: i64,
) -> Result<(), sqlx::Error> {
    let sql = format!("INSERT OR IGNORE INTO {join_table} (pokemon_id, {fk_column}) VALUES (?, ?)");
    sqlx::query(&sql)
        .bind(pokemon_id)
        .bind(target_id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}
