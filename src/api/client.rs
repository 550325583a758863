use anyhow::{Context, Result};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::api::models::{
    flatten_chain, parse_trailing_id, CatalogEntry, ChainEnvelope, ListResponse, PokemonDetail,
    SpeciesDetail,
};
use crate::util::env as env_util;

/// Retry ceiling for one remote resource (total attempts, not extra retries).
pub const DEFAULT_MAX_ATTEMPTS: u32 = 15;
/// Wait before attempt k is `k * RETRY_UNIT` (linear backoff).
pub const DEFAULT_RETRY_UNIT: Duration = Duration::from_secs(1);
const DEFAULT_LIST_LIMIT: u32 = 5000;
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Terminal result of a retried fetch. `NotFound` is definitive (the remote
/// confirmed the resource does not exist); `Failed` means the retry ceiling
/// was exhausted. Neither panics nor propagates, so callers classify items
/// without special-casing errors.
#[derive(Debug)]
pub enum FetchResult<T> {
    Ok(T),
    NotFound,
    Failed,
}

#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    list_limit: u32,
    max_attempts: u32,
    retry_unit: Duration,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let timeout = env_util::env_u64("POKESYNC_HTTP_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS);
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout))
            .build()
            .context("failed to build http client")?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self {
            http,
            base_url,
            list_limit: env_util::env_u32("POKESYNC_LIST_LIMIT", DEFAULT_LIST_LIMIT),
            max_attempts: env_util::env_u32("POKESYNC_MAX_RETRIES", DEFAULT_MAX_ATTEMPTS),
            retry_unit: DEFAULT_RETRY_UNIT,
        })
    }

    /// Override the retry policy (tests shrink the unit to keep runs fast).
    pub fn with_retry_policy(mut self, max_attempts: u32, retry_unit: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.retry_unit = retry_unit;
        self
    }

    pub fn with_list_limit(mut self, limit: u32) -> Self {
        self.list_limit = limit;
        self
    }

    /// Fetch the full catalog index in one call. Entries whose URL lacks a
    /// numeric trailing segment are dropped with a warning. A transport
    /// failure here is fatal to the run: no catalog, nothing to do.
    pub async fn list_catalog(&self) -> Result<Vec<CatalogEntry>> {
        let url = format!("{}/pokemon?limit={}", self.base_url, self.list_limit);
        let resp: ListResponse = self
            .http
            .get(&url)
            .send()
            .await
            .context("catalog listing request failed")?
            .error_for_status()
            .context("catalog listing returned an error status")?
            .json()
            .await
            .context("catalog listing body was not valid JSON")?;

        let mut entries = Vec::with_capacity(resp.results.len());
        for item in resp.results {
            match parse_trailing_id(&item.url) {
                Some(id) => entries.push(CatalogEntry {
                    name: item.name,
                    id,
                }),
                None => warn!(name = %item.name, url = %item.url, "listing entry has no numeric id; dropped"),
            }
        }
        debug!(count = entries.len(), "catalog listing fetched");
        Ok(entries)
    }

    /// Fetch one pokemon's detail payload. 404 returns `NotFound` without
    /// retrying; any other failure is retried up to the configured ceiling.
    pub async fn fetch_detail(&self, id: i64) -> FetchResult<PokemonDetail> {
        let url = format!("{}/pokemon/{}", self.base_url, id);
        self.get_json_with_retry(&url).await
    }

    /// Fetch the species resource for `id`, follow its evolution-chain
    /// pointer, and flatten the chain into a member-name set. Any failure at
    /// either step degrades to an empty set; a missing chain never aborts the
    /// item.
    pub async fn fetch_chain_members(&self, id: i64) -> HashSet<String> {
        let species_url = format!("{}/pokemon-species/{}", self.base_url, id);
        let species: SpeciesDetail = match self.get_json_with_retry(&species_url).await {
            FetchResult::Ok(s) => s,
            FetchResult::NotFound | FetchResult::Failed => {
                debug!(id, "species fetch failed; no chain members");
                return HashSet::new();
            }
        };
        let chain_url = match species.evolution_chain {
            Some(r) => r.url,
            None => return HashSet::new(),
        };
        if Url::parse(&chain_url).is_err() {
            warn!(id, url = %chain_url, "species carried an invalid chain url");
            return HashSet::new();
        }
        let envelope: ChainEnvelope = match self.get_json_with_retry(&chain_url).await {
            FetchResult::Ok(c) => c,
            FetchResult::NotFound | FetchResult::Failed => {
                debug!(id, "chain fetch failed; no chain members");
                return HashSet::new();
            }
        };
        flatten_chain(envelope.chain)
    }

    async fn get_json_with_retry<T: DeserializeOwned>(&self, url: &str) -> FetchResult<T> {
        for attempt in 1..=self.max_attempts {
            match self.get_json::<T>(url).await {
                Ok(Some(value)) => return FetchResult::Ok(value),
                Ok(None) => return FetchResult::NotFound,
                Err(err) => {
                    warn!(url, attempt, max_attempts = self.max_attempts, error = %err, "fetch attempt failed");
                    if attempt < self.max_attempts {
                        tokio::time::sleep(self.retry_unit * attempt).await;
                    }
                }
            }
        }
        FetchResult::Failed
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<Option<T>> {
        let resp = self
            .http
            .get(url)
            .header("Accept", "application/json")
            .send()
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let resp = resp.error_for_status()?;
        Ok(Some(resp.json::<T>().await?))
    }
}
