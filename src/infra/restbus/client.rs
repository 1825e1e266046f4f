use anyhow::Result;
use async_trait::async_trait;
use headway_rater::fetch::{BasicClient, HttpClient, get_json};
use headway_rater::tables::RouteConfig;

use crate::services::route_meta::RouteMetaApi;

/// Route metadata client for a restbus-style REST API.
///
/// `GET {base_url}/agencies/{agency}/routes/{route}` returns the route's
/// directions (each with an ordered stop-id list) and its ordered stops.
pub struct RestbusClient<C = BasicClient> {
    http: C,
    base_url: String,
    agency: String,
}

impl RestbusClient<BasicClient> {
    pub fn new(base_url: String, agency: String) -> Self {
        Self::with_client(BasicClient::new(), base_url, agency)
    }
}

impl<C: HttpClient> RestbusClient<C> {
    pub fn with_client(http: C, base_url: String, agency: String) -> Self {
        Self {
            http,
            base_url,
            agency,
        }
    }

    fn route_url(&self, route: &str) -> String {
        format!(
            "{}/agencies/{}/routes/{}",
            self.base_url.trim_end_matches('/'),
            self.agency,
            route
        )
    }
}

#[async_trait]
impl<C: HttpClient> RouteMetaApi for RestbusClient<C> {
    async fn route_config(&self, route: &str) -> Result<RouteConfig> {
        let url = self.route_url(route);
        let config: RouteConfig = get_json(&self.http, &url, &[])
            .await
            .map_err(|e| anyhow::anyhow!("Failed to fetch route config from {}: {}", url, e))?;
        Ok(config)
    }
}
