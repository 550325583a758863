use anyhow::{Context, Result};
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::info;

use crate::api::ApiClient;
use crate::db::Db;
use crate::importer::base::import_base;
use crate::importer::evolution::link_pokemon;
use crate::importer::{BaseOutcome, LinkOutcome};

pub const DEFAULT_CONCURRENCY: usize = 10;

#[derive(Debug, Clone)]
pub struct ImportOptions {
    /// Lowest canonical id to import.
    pub start: i64,
    /// Highest id to import; defaults to the highest id in the listing.
    pub end: Option<i64>,
    /// Coordinator capacity: maximum fetch+persist units in flight.
    pub concurrency: usize,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            start: 1,
            end: None,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

#[derive(Debug, Default)]
pub struct RunSummary {
    pub attempted: usize,
    pub imported: usize,
    pub skipped: usize,
    pub errors: usize,
    pub chains_linked: usize,
    pub relations_created: u64,
    pub link_errors: usize,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "-- import summary --")?;
        writeln!(f, "entries attempted:  {}", self.attempted)?;
        writeln!(f, "imported:           {}", self.imported)?;
        writeln!(f, "skipped:            {}", self.skipped)?;
        writeln!(f, "errors:             {}", self.errors)?;
        writeln!(f, "chains linked:      {}", self.chains_linked)?;
        writeln!(f, "relations created:  {}", self.relations_created)?;
        write!(f, "relation errors:    {}", self.link_errors)
    }
}

/// Run the two-phase import: phase 1 fans every listed id in `[start, end]`
/// out through the semaphore and persists base entries; once every phase-1
/// item is terminal, phase 2 fans out over the ids phase 1 imported and
/// links evolution relations. One item's terminal error never aborts the
/// run; only the initial listing fetch can.
pub async fn run_import(db: &Db, client: &ApiClient, opts: &ImportOptions) -> Result<RunSummary> {
    db.ensure_schema().await?;

    let entries = client
        .list_catalog()
        .await
        .context("catalog listing failed; nothing to import")?;
    let max_id = entries.iter().map(|e| e.id).max().unwrap_or(0);
    let end = opts.end.unwrap_or(max_id);
    let ids: Vec<i64> = entries
        .iter()
        .map(|e| e.id)
        .filter(|id| *id >= opts.start && *id <= end)
        .collect();

    let capacity = opts.concurrency.max(1);
    let semaphore = Arc::new(Semaphore::new(capacity));
    info!(
        count = ids.len(),
        concurrency = capacity,
        "phase 1: importing base entries"
    );

    let mut summary = RunSummary {
        attempted: ids.len(),
        ..Default::default()
    };
    let mut imported_ids: Vec<i64> = Vec::new();
    {
        let mut futs: FuturesUnordered<_> = FuturesUnordered::new();
        for id in &ids {
            let id = *id;
            let sem = semaphore.clone();
            let db = db.clone();
            let client = client.clone();
            futs.push(async move {
                let _permit = sem.acquire_owned().await.expect("semaphore closed");
                import_base(&db, &client, id).await
            });
        }
        let mut processed = 0usize;
        while let Some(outcome) = futs.next().await {
            processed += 1;
            match outcome {
                BaseOutcome::Imported { id, .. } => {
                    summary.imported += 1;
                    imported_ids.push(id);
                }
                BaseOutcome::Skipped(_) => summary.skipped += 1,
                BaseOutcome::Error => summary.errors += 1,
            }
            if processed % 25 == 0 {
                info!(processed, total = summary.attempted, "phase 1 progress");
            }
        }
    }
    info!(
        imported = summary.imported,
        skipped = summary.skipped,
        errors = summary.errors,
        "phase 1 complete"
    );

    // Draining the first fan-out is the barrier: every phase-1 item is
    // terminal before any relation work starts.
    imported_ids.sort_unstable();
    if !imported_ids.is_empty() {
        info!(
            count = imported_ids.len(),
            "phase 2: linking evolution chains"
        );
        let mut futs: FuturesUnordered<_> = FuturesUnordered::new();
        for id in &imported_ids {
            let id = *id;
            let sem = semaphore.clone();
            let db = db.clone();
            let client = client.clone();
            futs.push(async move {
                let _permit = sem.acquire_owned().await.expect("semaphore closed");
                link_pokemon(&db, &client, id).await
            });
        }
        let mut processed = 0usize;
        let total = imported_ids.len();
        while let Some(outcome) = futs.next().await {
            processed += 1;
            match outcome {
                LinkOutcome::Linked {
                    relations_created, ..
                } => {
                    summary.chains_linked += 1;
                    summary.relations_created += relations_created;
                }
                LinkOutcome::Skipped => {}
                LinkOutcome::Error => summary.link_errors += 1,
            }
            if processed % 25 == 0 {
                info!(processed, total, "phase 2 progress");
            }
        }
        info!(
            relations_created = summary.relations_created,
            errors = summary.link_errors,
            "phase 2 complete"
        );
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn listing_body(ids: &[i64]) -> String {
        let results: Vec<_> = ids
            .iter()
            .map(|id| {
                serde_json::json!({
                    "name": format!("poke-{id}"),
                    "url": format!("https://pokeapi.co/api/v2/pokemon/{id}/")
                })
            })
            .collect();
        serde_json::json!({ "results": results }).to_string()
    }

    fn detail_body(id: i64, name: &str) -> String {
        serde_json::json!({
            "id": id,
            "name": name,
            "height": 7,
            "weight": 69,
            "sprites": { "front_default": null },
            "types": [ { "type": { "name": "grass" } } ],
            "abilities": [],
            "moves": []
        })
        .to_string()
    }

    fn chain_body(names: &[&str]) -> String {
        let mut node = serde_json::json!(null);
        for name in names.iter().rev() {
            let children = if node.is_null() {
                vec![]
            } else {
                vec![node.clone()]
            };
            node = serde_json::json!({ "species": { "name": name }, "evolves_to": children });
        }
        serde_json::json!({ "chain": node }).to_string()
    }

    fn test_client(server: &mockito::ServerGuard) -> ApiClient {
        ApiClient::new(server.url())
            .unwrap()
            .with_retry_policy(2, Duration::from_millis(2))
            .with_list_limit(100)
    }

    async fn test_db() -> Db {
        let db = Db::connect("sqlite::memory:", 1).await.unwrap();
        db.ensure_schema().await.unwrap();
        db
    }

    async fn json_mock(
        server: &mut mockito::ServerGuard,
        path: &str,
        body: String,
    ) -> mockito::Mock {
        server
            .mock("GET", path)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body)
            .create_async()
            .await
    }

    #[tokio::test]
    async fn two_phase_run_imports_skips_not_found_and_links_relations() {
        let mut server = mockito::Server::new_async().await;
        let _listing = server
            .mock("GET", "/pokemon")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(listing_body(&[1, 2, 3]))
            .create_async()
            .await;
        let _d1 = json_mock(&mut server, "/pokemon/1", detail_body(1, "bulbasaur")).await;
        let _d2 = server
            .mock("GET", "/pokemon/2")
            .with_status(404)
            .create_async()
            .await;
        let _d3 = json_mock(&mut server, "/pokemon/3", detail_body(3, "venusaur")).await;

        // both imported entries share one chain naming all three family members
        let chain_url = format!("{}/evolution-chain/1", server.url());
        let mut species_mocks = Vec::new();
        for id in [1, 3] {
            let mock = json_mock(
                &mut server,
                &format!("/pokemon-species/{id}"),
                serde_json::json!({ "evolution_chain": { "url": chain_url.clone() } }).to_string(),
            )
            .await;
            species_mocks.push(mock);
        }
        let _chain = json_mock(
            &mut server,
            "/evolution-chain/1",
            chain_body(&["bulbasaur", "ivysaur", "venusaur"]),
        )
        .await;

        let db = test_db().await;
        let client = test_client(&server);
        let summary = run_import(&db, &client, &ImportOptions::default())
            .await
            .unwrap();

        assert_eq!(summary.attempted, 3);
        assert_eq!(summary.imported, 2);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.errors, 0);
        assert_eq!(summary.chains_linked, 2);
        // ivysaur (id 2) was never imported: each base links only the other
        assert_eq!(summary.relations_created, 2);

        let edges: Vec<(i64, i64)> = sqlx::query_as(
            "SELECT pokemon_id, related_id FROM pokemon_evolutions ORDER BY pokemon_id",
        )
        .fetch_all(&db.pool)
        .await
        .unwrap();
        assert_eq!(edges, vec![(1, 3), (3, 1)]);

        let imported: Vec<i64> = sqlx::query_scalar("SELECT id FROM pokemon ORDER BY id")
            .fetch_all(&db.pool)
            .await
            .unwrap();
        assert_eq!(imported, vec![1, 3]);
    }

    #[tokio::test]
    async fn end_bound_restricts_the_id_range() {
        let mut server = mockito::Server::new_async().await;
        let _listing = server
            .mock("GET", "/pokemon")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(listing_body(&[1, 2, 3]))
            .create_async()
            .await;
        let _d1 = json_mock(&mut server, "/pokemon/1", detail_body(1, "bulbasaur")).await;
        // no species/chain mocks: the chain fetch degrades to zero relations

        let db = test_db().await;
        let client = test_client(&server);
        let opts = ImportOptions {
            end: Some(1),
            ..Default::default()
        };
        let summary = run_import(&db, &client, &opts).await.unwrap();

        assert_eq!(summary.attempted, 1);
        assert_eq!(summary.imported, 1);
        assert_eq!(summary.chains_linked, 1);
        assert_eq!(summary.relations_created, 0);
    }

    #[tokio::test]
    async fn listing_failure_aborts_the_run() {
        let mut server = mockito::Server::new_async().await;
        let _listing = server
            .mock("GET", "/pokemon")
            .match_query(mockito::Matcher::Any)
            .with_status(500)
            .create_async()
            .await;

        let db = test_db().await;
        let client = test_client(&server);
        assert!(run_import(&db, &client, &ImportOptions::default())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn fetch_errors_are_contained_to_their_item() {
        let mut server = mockito::Server::new_async().await;
        let _listing = server
            .mock("GET", "/pokemon")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(listing_body(&[1, 2]))
            .create_async()
            .await;
        let _d1 = json_mock(&mut server, "/pokemon/1", detail_body(1, "bulbasaur")).await;
        let _d2 = server
            .mock("GET", "/pokemon/2")
            .with_status(500)
            .create_async()
            .await;
        // no species/chain mocks: phase 2 degrades to zero relations

        let db = test_db().await;
        let client = test_client(&server);
        let summary = run_import(&db, &client, &ImportOptions::default())
            .await
            .unwrap();

        assert_eq!(summary.imported, 1);
        assert_eq!(summary.errors, 1);
        assert_eq!(summary.skipped, 0);
    }
}
