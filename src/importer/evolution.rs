use anyhow::Result;
use std::collections::HashSet;
use tracing::{info, warn};

use crate::api::ApiClient;
use crate::db::Db;
use crate::importer::LinkOutcome;

/// One phase-2 unit: fetch the chain member set for an already-imported
/// entity and link relation edges against the store.
pub async fn link_pokemon(db: &Db, client: &ApiClient, id: i64) -> LinkOutcome {
    let name: Option<String> = match sqlx::query_scalar("SELECT name FROM pokemon WHERE id = ?")
        .bind(id)
        .fetch_optional(&db.pool)
        .await
    {
        Ok(row) => row,
        Err(err) => {
            warn!(id, error = %err, "base row lookup failed");
            return LinkOutcome::Error;
        }
    };
    let Some(name) = name else {
        warn!(id, "base entry missing from store; skipped");
        return LinkOutcome::Skipped;
    };

    let members = client.fetch_chain_members(id).await;
    match create_relations(db, id, &members).await {
        Ok(created) => {
            info!(id, name = %name, relations_created = created, "chain linked");
            LinkOutcome::Linked {
                id,
                relations_created: created,
            }
        }
        Err(err) => {
            warn!(id, error = %err, "relation linking failed");
            LinkOutcome::Error
        }
    }
}

/// Resolve chain-member names against already-persisted rows and create the
/// missing edges from the base entity outward, in one transaction. Members
/// absent from the store are silently skipped (never auto-imported here);
/// self-edges are never written; re-running creates nothing new.
pub async fn create_relations(db: &Db, base_id: i64, members: &HashSet<String>) -> Result<u64> {
    if members.is_empty() {
        return Ok(0);
    }

    let mut tx = db.pool.begin().await?;

    let placeholders = vec!["?"; members.len()].join(", ");
    let select = format!("SELECT id FROM pokemon WHERE name IN ({placeholders})");
    let mut query = sqlx::query_scalar::<_, i64>(&select);
    for name in members {
        query = query.bind(name.as_str());
    }
    let resolved = query.fetch_all(&mut *tx).await?;

    let mut created = 0u64;
    for member_id in resolved {
        if member_id == base_id {
            continue;
        }
        let res = sqlx::query(
            "INSERT OR IGNORE INTO pokemon_evolutions (pokemon_id, related_id) VALUES (?, ?)",
        )
        .bind(base_id)
        .bind(member_id)
        .execute(&mut *tx)
        .await?;
        created += res.rows_affected();
    }

    tx.commit().await?;
    Ok(created)
}
