//! HTTP access seam.
//!
//! All network traffic goes through the [`HttpClient`] trait so request
//! construction stays testable without a live endpoint.

use anyhow::Result;
use async_trait::async_trait;
use serde::de::DeserializeOwned;

#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn execute(&self, req: reqwest::Request) -> reqwest::Result<reqwest::Response>;
}

/// Plain [`reqwest::Client`] wrapper used in production.
pub struct BasicClient(reqwest::Client);

impl BasicClient {
    pub fn new() -> Self {
        Self(reqwest::Client::new())
    }
}

impl Default for BasicClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpClient for BasicClient {
    async fn execute(&self, req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
        self.0.execute(req).await
    }
}

/// Issues a GET with the given query pairs and deserializes the JSON body.
///
/// Query values pass through the URL encoder, never through string pasting.
pub async fn get_json<C: HttpClient, T: DeserializeOwned>(
    client: &C,
    base_url: &str,
    query: &[(&str, String)],
) -> Result<T> {
    let url = reqwest::Url::parse_with_params(base_url, query)?;
    let req = reqwest::Request::new(reqwest::Method::GET, url);

    let resp = client.execute(req).await?;
    Ok(resp.json().await?)
}
