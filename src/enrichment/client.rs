//! Keyword extraction service client

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde::Serialize;
use url::Url;

use crate::config::EnrichmentConfig;
use crate::config::HubConfig;
use crate::retry::RetryPolicy;
use crate::CastfeedError;
use crate::Result;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedKeyword {
    pub keyword: String,
    pub score: f64,
}

/// Text in, scored keywords out
#[async_trait]
pub trait KeywordExtractor: Send + Sync {
    async fn extract(&self, text: &str) -> Result<Vec<ExtractedKeyword>>;
}

#[derive(Serialize)]
struct ExtractRequest<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct ExtractResponse {
    #[serde(default)]
    keywords: Vec<ExtractedKeyword>,
}

/// [`KeywordExtractor`] that POSTs `{"text": ...}` to a JSON endpoint
#[derive(Debug, Clone)]
pub struct HttpKeywordExtractor {
    client: Client,
    endpoint: Url,
    api_key: Option<String>,
    retry: RetryPolicy,
}

impl HttpKeywordExtractor {
    /// # Errors
    /// Returns an error if the endpoint is not a valid URL or the client cannot be built
    pub fn new(endpoint: &str, api_key: Option<String>, retry: RetryPolicy) -> Result<Self> {
        Ok(Self {
            client: Client::builder().build()?,
            endpoint: Url::parse(endpoint)?,
            api_key,
            retry,
        })
    }

    /// Build from the `[enrichment]` section, reusing the hub retry settings
    ///
    /// # Errors
    /// Returns `ConfigError` when no endpoint is configured
    pub fn from_config(config: &EnrichmentConfig, hub: &HubConfig) -> Result<Self> {
        let endpoint = config
            .endpoint
            .as_deref()
            .ok_or_else(|| CastfeedError::ConfigError("enrichment.endpoint is not set".to_string()))?;
        Self::new(
            endpoint,
            config.api_key.clone(),
            RetryPolicy::new(hub.retry_attempts, hub.retry_delay()),
        )
    }

    async fn post(&self, text: &str) -> Result<Vec<ExtractedKeyword>> {
        let mut request = self.client.post(self.endpoint.clone()).json(&ExtractRequest { text });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(CastfeedError::Enrichment(format!("HTTP {status}: {body}")));
        }
        Ok(response.json::<ExtractResponse>().await?.keywords)
    }
}

#[async_trait]
impl KeywordExtractor for HttpKeywordExtractor {
    async fn extract(&self, text: &str) -> Result<Vec<ExtractedKeyword>> {
        self.retry.run("keyword extraction", || self.post(text)).await
    }
}
