use std::env;

const DEFAULT_DB_URL: &str = "sqlite://pokedex.db";
const DEFAULT_API_URL: &str = "https://pokeapi.co/api/v2";

/// Load `.env` once at startup; missing files are fine.
pub fn init_env() {
    dotenv::dotenv().ok();
}

/// Resolve the local store URL: `DATABASE_URL`, else a sqlite file next to
/// the process.
pub fn db_url() -> String {
    env::var("DATABASE_URL")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_DB_URL.to_string())
}

/// Resolve the remote API base URL: `POKEAPI_URL`, else the public endpoint.
pub fn api_url() -> String {
    env::var("POKEAPI_URL")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_API_URL.to_string())
}

pub fn env_u32(key: &str, default: u32) -> u32 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(default)
}

pub fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}
