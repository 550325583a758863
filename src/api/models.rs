use serde::Deserialize;
use std::collections::HashSet;

/// Envelope of the full catalog listing (`GET /pokemon?limit=N`).
#[derive(Debug, Deserialize)]
pub struct ListResponse {
    #[serde(default)]
    pub results: Vec<ListEntry>,
}

#[derive(Debug, Deserialize)]
pub struct ListEntry {
    pub name: String,
    pub url: String,
}

/// One catalog entry after id extraction from the resource URL.
#[derive(Debug, Clone)]
pub struct CatalogEntry {
    pub name: String,
    pub id: i64,
}

/// Detail payload for one pokemon (`GET /pokemon/{id}`); only the fields the
/// importer persists.
#[derive(Debug, Deserialize)]
pub struct PokemonDetail {
    pub id: i64,
    pub name: String,
    pub height: Option<i64>,
    pub weight: Option<i64>,
    #[serde(default)]
    pub sprites: Sprites,
    #[serde(default)]
    pub types: Vec<TypeSlot>,
    #[serde(default)]
    pub abilities: Vec<AbilitySlot>,
    #[serde(default)]
    pub moves: Vec<MoveSlot>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Sprites {
    pub front_default: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TypeSlot {
    #[serde(rename = "type")]
    pub type_ref: NamedResource,
}

#[derive(Debug, Deserialize)]
pub struct AbilitySlot {
    pub ability: NamedResource,
}

#[derive(Debug, Deserialize)]
pub struct MoveSlot {
    #[serde(rename = "move")]
    pub move_ref: NamedResource,
}

#[derive(Debug, Deserialize)]
pub struct NamedResource {
    pub name: String,
}

/// Species payload; only the pointer to the evolution chain matters here.
#[derive(Debug, Deserialize)]
pub struct SpeciesDetail {
    pub evolution_chain: Option<ResourceRef>,
}

#[derive(Debug, Deserialize)]
pub struct ResourceRef {
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct ChainEnvelope {
    pub chain: ChainLink,
}

/// One node of the evolution-chain tree.
#[derive(Debug, Deserialize)]
pub struct ChainLink {
    pub species: NamedResource,
    #[serde(default)]
    pub evolves_to: Vec<ChainLink>,
}

/// Extract the canonical id from a resource URL's trailing path segment,
/// e.g. `https://pokeapi.co/api/v2/pokemon/25/` -> 25.
pub fn parse_trailing_id(url: &str) -> Option<i64> {
    url.trim_end_matches('/')
        .rsplit('/')
        .next()?
        .parse::<i64>()
        .ok()
}

/// Flatten a chain tree into the set of member names (lower-cased).
///
/// Uses an explicit work stack; a node whose name was already seen is not
/// descended into, so malformed data repeating a species cannot loop or
/// inflate the set.
pub fn flatten_chain(root: ChainLink) -> HashSet<String> {
    let mut names: HashSet<String> = HashSet::new();
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if names.insert(node.species.name.to_lowercase()) {
            stack.extend(node.evolves_to);
        }
    }
    names
}
