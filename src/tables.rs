//! Normalizes raw telemetry into tabular stop and vehicle-position views.

use std::collections::HashMap;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::query::RouteData;

/// Per-route configuration from the metadata endpoint: directions with
/// their ordered stop lists, plus the route's own ordered stop list.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RouteConfig {
    #[serde(default)]
    pub directions: Vec<DirectionMeta>,
    #[serde(default)]
    pub stops: Vec<StopMeta>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DirectionMeta {
    pub id: String,
    #[serde(default)]
    pub stops: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StopMeta {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
}

/// One stop on a route, annotated with its direction and ordinal.
#[derive(Debug, Clone, PartialEq)]
pub struct Stop {
    pub sid: String,
    pub lat: f64,
    pub lon: f64,
    pub did: String,
    pub ord: Option<usize>,
}

/// One observed vehicle position.
#[derive(Debug, Clone, PartialEq)]
pub struct VehiclePosition {
    pub time_ms: i64,
    pub vid: String,
    pub lat: f64,
    pub lon: f64,
    pub did: String,
}

/// Builds the stop table, attaching direction ids and ordinals from the
/// route config.
///
/// Stops the config names in several directions take the last direction
/// listed; stops it names in none are dropped, since without a direction
/// they cannot be matched against vehicle headings downstream.
pub fn produce_stops(data: &[RouteData], config: &RouteConfig) -> Vec<Stop> {
    let mut directions: HashMap<&str, &str> = HashMap::new();
    for direction in &config.directions {
        for sid in &direction.stops {
            directions.insert(sid.as_str(), direction.id.as_str());
        }
    }

    let ordinals: HashMap<&str, usize> = config
        .stops
        .iter()
        .enumerate()
        .map(|(ordinal, stop)| (stop.id.as_str(), ordinal))
        .collect();

    let mut stops = Vec::new();
    for route in data {
        for raw in &route.stops {
            let Some(did) = directions.get(raw.sid.as_str()) else {
                continue;
            };
            stops.push(Stop {
                sid: raw.sid.clone(),
                lat: raw.lat,
                lon: raw.lon,
                did: (*did).to_string(),
                ord: ordinals.get(raw.sid.as_str()).copied(),
            });
        }
    }
    stops
}

/// Flattens routeStates × vehicles into position rows.
///
/// `vtime` comes off the wire as a decimal string; a value that does not
/// parse is malformed input for the whole unit, not a row to drop quietly.
pub fn produce_vehicles(data: &[RouteData]) -> Result<Vec<VehiclePosition>> {
    let mut positions = Vec::new();
    for route in data {
        for state in &route.route_states {
            let time_ms: i64 = state
                .vtime
                .parse()
                .with_context(|| format!("invalid vtime {:?}", state.vtime))?;

            for vehicle in &state.vehicles {
                positions.push(VehiclePosition {
                    time_ms,
                    vid: vehicle.vid.clone(),
                    lat: vehicle.lat,
                    lon: vehicle.lon,
                    did: vehicle.did.clone(),
                });
            }
        }
    }
    Ok(positions)
}
