//! Typed query construction for the vehicle-position endpoint.
//!
//! The endpoint is GraphQL-flavored: a single `trynState` operation taking
//! an agency, an epoch-millisecond window, and a route list, returning the
//! stops and the per-snapshot vehicle states for each requested route.

use anyhow::Result;
use serde::Deserialize;
use tracing::debug;

use crate::fetch::HttpClient;

/// A time- and route-bounded vehicle-position query.
#[derive(Debug, Clone)]
pub struct VehicleQuery {
    pub agency: String,
    pub start_time_ms: i64,
    pub end_time_ms: i64,
    pub routes: Vec<String>,
}

impl VehicleQuery {
    pub fn new(agency: &str, start_time_ms: i64, end_time_ms: i64, routes: &[String]) -> Self {
        Self {
            agency: agency.to_string(),
            start_time_ms,
            end_time_ms,
            routes: routes.to_vec(),
        }
    }

    /// Renders the GraphQL document.
    ///
    /// Every value is serialized through `serde_json`, so quoting and
    /// escaping are the encoder's job, never format-string pasting.
    pub fn document(&self) -> String {
        let agency = json_str(&self.agency);
        let start = json_str(&self.start_time_ms.to_string());
        let end = json_str(&self.end_time_ms.to_string());
        let routes = serde_json::Value::from(self.routes.clone()).to_string();

        format!(
            "{{ trynState(agency: {agency}, startTime: {start}, endTime: {end}, routes: {routes}) \
             {{ agency startTime routes {{ stops {{ sid lat lon }} \
             routeStates {{ vtime vehicles {{ vid lat lon did }} }} }} }} }}"
        )
    }

    /// Builds the GET request, attaching the document as the `query`
    /// parameter through the URL encoder.
    pub fn request(&self, base_url: &str) -> Result<reqwest::Request> {
        let url = reqwest::Url::parse_with_params(base_url, &[("query", self.document())])?;
        Ok(reqwest::Request::new(reqwest::Method::GET, url))
    }
}

fn json_str(value: &str) -> String {
    serde_json::Value::from(value).to_string()
}

/// Top-level response envelope. Every layer is optional: the endpoint
/// signals "no data" by omitting keys rather than by failing the request.
#[derive(Debug, Deserialize)]
pub struct QueryResponse {
    data: Option<QueryData>,
}

#[derive(Debug, Deserialize)]
struct QueryData {
    #[serde(rename = "trynState")]
    tryn_state: Option<TrynState>,
}

#[derive(Debug, Deserialize)]
struct TrynState {
    routes: Option<Vec<RouteData>>,
}

/// One requested route: its stops and the sequence of vehicle snapshots.
#[derive(Debug, Clone, Deserialize)]
pub struct RouteData {
    #[serde(default)]
    pub stops: Vec<RawStop>,
    #[serde(rename = "routeStates", default)]
    pub route_states: Vec<RouteState>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawStop {
    pub sid: String,
    pub lat: f64,
    pub lon: f64,
}

/// All vehicle positions observed at one snapshot instant.
///
/// `vtime` arrives as a decimal string of epoch milliseconds.
#[derive(Debug, Clone, Deserialize)]
pub struct RouteState {
    pub vtime: String,
    #[serde(default)]
    pub vehicles: Vec<RawVehicle>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawVehicle {
    pub vid: String,
    pub lat: f64,
    pub lon: f64,
    pub did: String,
}

impl QueryResponse {
    /// `None` when any expected key is absent, the endpoint's way of
    /// saying there is nothing for the requested window.
    pub fn into_routes(self) -> Option<Vec<RouteData>> {
        self.data?.tryn_state?.routes
    }
}

/// Fetches vehicle positions for the query window.
///
/// Returns `Ok(None)` for a response that is not the expected shape:
/// absence, not an error. `Err` is reserved for transport faults, which
/// callers absorb as skip-and-continue per unit of work.
pub async fn fetch_route_states<C: HttpClient>(
    client: &C,
    base_url: &str,
    query: &VehicleQuery,
) -> Result<Option<Vec<RouteData>>> {
    let resp = client.execute(query.request(base_url)?).await?;

    let parsed: QueryResponse = match resp.json().await {
        Ok(parsed) => parsed,
        Err(e) => {
            debug!(error = %e, "Response body was not the expected shape");
            return Ok(None);
        }
    };

    Ok(parsed.into_routes())
}
