//! SPARQL 1.1 protocol client over HTTP

use super::{SparqlResults, TripleStore};
use crate::config::StoreConfig;
use crate::{AggregationError, Result};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};

const SPARQL_QUERY: &str = "application/sparql-query";
const SPARQL_UPDATE: &str = "application/sparql-update";
const SPARQL_RESULTS_JSON: &str = "application/sparql-results+json";

/// Triple store reached through its SPARQL query and update endpoints
pub struct HttpStore {
    client: Client,
    config: StoreConfig,
}

impl HttpStore {
    /// Create a new HTTP store client
    pub fn new(config: StoreConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .user_agent(concat!("ontoagg/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AggregationError::Config(e.to_string()))?;
        Ok(Self { client, config })
    }

    async fn post_once(&self, url: &str, content_type: &str, body: &str) -> Result<String> {
        let response = self
            .client
            .post(url)
            .header(CONTENT_TYPE, content_type)
            .header(ACCEPT, SPARQL_RESULTS_JSON)
            .body(body.to_string())
            .send()
            .await
            .map_err(|e| AggregationError::Transport(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| AggregationError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(AggregationError::StoreStatus {
                status: status.as_u16(),
                body: text,
            });
        }
        Ok(text)
    }

    /// POST with exponential backoff on retryable failures
    async fn post(&self, url: &str, content_type: &str, body: &str) -> Result<String> {
        let mut backoff = self.config.initial_backoff();
        let mut attempt = 0u32;
        loop {
            match self.post_once(url, content_type, body).await {
                Ok(text) => return Ok(text),
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    attempt += 1;
                    warn!(
                        url,
                        attempt,
                        delay_ms = backoff.as_millis() as u64,
                        "store request failed, retrying: {}",
                        e
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = next_backoff(backoff, self.config.max_backoff());
                }
                Err(e) if e.is_retryable() => {
                    return Err(AggregationError::Transport(format!(
                        "giving up after {} attempts: {}",
                        attempt + 1,
                        e
                    )));
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn next_backoff(current: Duration, max: Duration) -> Duration {
    (current * 2).min(max)
}

impl TripleStore for HttpStore {
    async fn query(&self, sparql: &str) -> Result<SparqlResults> {
        debug!(bytes = sparql.len(), "sparql query");
        let text = self
            .post(&self.config.query_url, SPARQL_QUERY, sparql)
            .await?;
        Ok(serde_json::from_str(&text)?)
    }

    async fn update(&self, sparql: &str) -> Result<()> {
        debug!(bytes = sparql.len(), "sparql update");
        self.post(&self.config.update_url, SPARQL_UPDATE, sparql)
            .await
            .map(|_| ())
    }
}
