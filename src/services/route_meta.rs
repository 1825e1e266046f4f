//! Trait for the route metadata source.

use anyhow::Result;
use headway_rater::tables::RouteConfig;

/// Abstraction over a route metadata provider (e.g., restbus).
///
/// Supplies what the telemetry feed omits: which direction each stop
/// serves and the stop ordering along the route.
#[async_trait::async_trait]
pub trait RouteMetaApi {
    /// Returns directions and the ordered stop list for one route.
    async fn route_config(&self, route: &str) -> Result<RouteConfig>;
}
