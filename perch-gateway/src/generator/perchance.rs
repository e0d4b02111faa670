//! Perchance download and stats API client.

use async_trait::async_trait;
use perch_core::GeneratorSettings;
use reqwest::Client;
use serde::Deserialize;
use url::Url;

use super::{GeneratorCatalog, GeneratorError};

#[derive(Debug, Deserialize)]
struct StatsResponse {
    data: StatsData,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatsData {
    last_edit_time: f64,
}

/// HTTP client for `perchance.org` generator pages.
pub struct PerchanceClient {
    client: Client,
    base_url: String,
}

impl PerchanceClient {
    pub fn new(settings: &GeneratorSettings) -> Result<Self, GeneratorError> {
        let client = Client::builder()
            .timeout(settings.request_timeout())
            .build()
            .map_err(|e| GeneratorError::Request(e.to_string()))?;
        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, path: &str, params: &[(&str, &str)]) -> Result<Url, GeneratorError> {
        Url::parse_with_params(&format!("{}{}", self.base_url, path), params)
            .map_err(|e| GeneratorError::Request(e.to_string()))
    }

    fn download_url(&self, name: &str) -> Result<Url, GeneratorError> {
        let cache_bust = rand::random::<u32>().to_string();
        self.endpoint(
            "/api/downloadGenerator",
            &[("generatorName", name), ("__cacheBust", cache_bust.as_str())],
        )
    }

    fn stats_url(&self, name: &str) -> Result<Url, GeneratorError> {
        self.endpoint("/api/getGeneratorStats", &[("name", name)])
    }
}

#[async_trait]
impl GeneratorCatalog for PerchanceClient {
    async fn download(&self, name: &str) -> Result<String, GeneratorError> {
        let response = self
            .client
            .get(self.download_url(name)?)
            .send()
            .await
            .map_err(|e| GeneratorError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(GeneratorError::NotFound(name.to_string()));
        }

        response
            .text()
            .await
            .map_err(|e| GeneratorError::Request(e.to_string()))
    }

    async fn last_edit_time(&self, name: &str) -> Result<i64, GeneratorError> {
        let response = self
            .client
            .get(self.stats_url(name)?)
            .send()
            .await
            .map_err(|e| GeneratorError::Request(e.to_string()))?
            .error_for_status()
            .map_err(|e| GeneratorError::Request(e.to_string()))?;

        let stats: StatsResponse = response
            .json()
            .await
            .map_err(|e| GeneratorError::Request(e.to_string()))?;
        Ok(stats.data.last_edit_time as i64)
    }
}
