//! Flat-file JSON cache of detected arrival events.
//!
//! The document nests per route, then per stop:
//!
//! ```json
//! {
//!   "12": {
//!     "5579": {
//!       "direction": "12___I_F00",
//!       "order": 14,
//!       "lat": 37.76,
//!       "lon": -122.42,
//!       "eclipses": [ { "bus_id": "2101", "timestamp": 1542036120000 } ]
//!     }
//!   }
//! }
//! ```
//!
//! Merging extends the `eclipses` list per (route, stop) and inserts
//! unseen stops and routes whole, so repeated collection runs accumulate.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// One cached arrival event: a vehicle passing a stop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrivalEvent {
    pub bus_id: String,
    pub timestamp: i64,
}

/// Everything cached for one stop of one route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopEntry {
    pub direction: String,
    pub order: Option<usize>,
    pub lat: f64,
    pub lon: f64,
    pub eclipses: Vec<ArrivalEvent>,
}

/// Nested per-route, per-stop arrival cache. `BTreeMap` keys keep the
/// serialized form stable across runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArrivalStore(BTreeMap<String, BTreeMap<String, StopEntry>>);

impl ArrivalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route ids present in the cache.
    pub fn routes(&self) -> Vec<&str> {
        self.0.keys().map(String::as_str).collect()
    }

    /// Stop ids cached for a route.
    pub fn stops(&self, route: &str) -> Vec<&str> {
        self.0
            .get(route)
            .map(|stops| stops.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    pub fn get(&self, route: &str, stop: &str) -> Option<&StopEntry> {
        self.0.get(route)?.get(stop)
    }

    /// Iterates every `(route, stop, entry)` triple in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, &StopEntry)> {
        self.0.iter().flat_map(|(route, stops)| {
            stops
                .iter()
                .map(move |(stop, entry)| (route.as_str(), stop.as_str(), entry))
        })
    }

    /// Inserts an entry, replacing any existing one for (route, stop).
    pub fn insert(&mut self, route: &str, stop: &str, entry: StopEntry) {
        self.0
            .entry(route.to_string())
            .or_default()
            .insert(stop.to_string(), entry);
    }

    /// Folds `other` into `self`: known (route, stop) pairs extend their
    /// `eclipses`, everything else is inserted whole.
    pub fn merge(&mut self, other: ArrivalStore) {
        for (route_id, other_stops) in other.0 {
            let stops = self.0.entry(route_id).or_default();
            for (stop_id, other_entry) in other_stops {
                match stops.get_mut(&stop_id) {
                    Some(entry) => entry.eclipses.extend(other_entry.eclipses),
                    None => {
                        stops.insert(stop_id, other_entry);
                    }
                }
            }
        }
    }

    pub fn read_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading arrival cache {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("parsing arrival cache {}", path.display()))
    }

    pub fn write_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = serde_json::to_string(self)?;
        fs::write(path, content)
            .with_context(|| format!("writing arrival cache {}", path.display()))
    }
}
