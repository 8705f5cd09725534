//! Embedding provider contract and the OpenAI-compatible HTTP client.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::error::EmbeddingError;
use crate::models::{EmbeddingConfig, ProviderEndpoint, ProviderKind};

/// Anything that turns an ordered batch of texts into position-aligned vectors.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed `texts`, returning one vector per input in input order.
    ///
    /// Rate limiting must be reported as [`EmbeddingError::Throttled`].
    async fn embed(
        &self,
        texts: &[String],
        dimensions: usize,
    ) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Endpoint description used in logs.
    fn endpoint(&self) -> &str;
}

/// Request body for the embeddings endpoint.
#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    input: &'a [String],
    model: &'a str,
    dimensions: usize,
}

/// Response from the embeddings endpoint.
#[derive(Debug, Deserialize)]
struct EmbedResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: Option<usize>,
    embedding: Vec<f32>,
}

/// Client for one OpenAI or Azure OpenAI embeddings endpoint.
#[derive(Debug, Clone)]
pub struct EmbeddingClient {
    client: Client,
    kind: ProviderKind,
    base_url: String,
    request_url: String,
    model: String,
    key: Option<String>,
}

impl EmbeddingClient {
    /// Create a client for a single endpoint.
    pub fn new(
        config: &EmbeddingConfig,
        endpoint: &ProviderEndpoint,
    ) -> Result<Self, EmbeddingError> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| EmbeddingError::ConnectionError(e.to_string()))?;

        let base_url = endpoint.url.trim_end_matches('/').to_string();
        let request_url = match config.provider {
            ProviderKind::Azure => format!(
                "{}/openai/deployments/{}/embeddings?api-version={}",
                base_url, config.model, config.api_version
            ),
            ProviderKind::OpenAi => format!("{}/embeddings", base_url),
        };

        Ok(Self {
            client,
            kind: config.provider,
            base_url,
            request_url,
            model: config.model.clone(),
            key: endpoint.key.clone(),
        })
    }

    /// Create one client per configured endpoint.
    pub fn from_config(config: &EmbeddingConfig) -> Result<Vec<Self>, crate::error::AppError> {
        let endpoints = config.endpoints()?;
        let clients = endpoints
            .iter()
            .map(|endpoint| Self::new(config, endpoint))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(clients)
    }

    #[cfg(test)]
    fn request_url(&self) -> &str {
        &self.request_url
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match (&self.key, self.kind) {
            (Some(key), ProviderKind::Azure) => request.header("api-key", key),
            (Some(key), ProviderKind::OpenAi) => request.bearer_auth(key),
            (None, _) => request,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for EmbeddingClient {
    async fn embed(
        &self,
        texts: &[String],
        dimensions: usize,
    ) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = EmbedRequest {
            input: texts,
            model: &self.model,
            dimensions,
        };

        let response = self
            .authorize(self.client.post(&self.request_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    EmbeddingError::Timeout
                } else if e.is_connect() {
                    EmbeddingError::ConnectionError(e.to_string())
                } else {
                    EmbeddingError::RequestError(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_failure(status, &body));
        }

        let embed_response: EmbedResponse = response
            .json()
            .await
            .map_err(|e| EmbeddingError::InvalidResponse(e.to_string()))?;

        Ok(into_ordered_vectors(embed_response))
    }

    fn endpoint(&self) -> &str {
        &self.base_url
    }
}

/// Map a non-success HTTP status to an embedding error.
fn classify_failure(status: StatusCode, body: &str) -> EmbeddingError {
    let message = format!("status {}: {}", status, body);
    if status == StatusCode::TOO_MANY_REQUESTS {
        EmbeddingError::Throttled(message)
    } else {
        EmbeddingError::ServerError(message)
    }
}

/// Order vectors by the `index` the provider reports so they line up with the input.
fn into_ordered_vectors(response: EmbedResponse) -> Vec<Vec<f32>> {
    let mut data = response.data;
    if data.iter().all(|d| d.index.is_some()) {
        data.sort_by_key(|d| d.index);
    }
    data.into_iter().map(|d| d.embedding).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Debug, Parser)]
    struct TestCli {
        #[command(flatten)]
        embedding: EmbeddingConfig,
    }

    fn config(extra: &[&str]) -> EmbeddingConfig {
        let mut args = vec!["vectorizer", "--provider-url", "https://res.openai.azure.com/"];
        args.extend_from_slice(extra);
        TestCli::try_parse_from(args).unwrap().embedding
    }

    #[test]
    fn test_azure_request_url() {
        let config = config(&["--model", "embed-small", "--api-version", "2024-06-01"]);
        let clients = EmbeddingClient::from_config(&config).unwrap();
        assert_eq!(clients.len(), 1);
        assert_eq!(clients[0].endpoint(), "https://res.openai.azure.com");
        assert_eq!(
            clients[0].request_url(),
            "https://res.openai.azure.com/openai/deployments/embed-small/embeddings?api-version=2024-06-01"
        );
    }

    #[test]
    fn test_openai_request_url() {
        let config = config(&["--provider", "openai"]);
        let clients = EmbeddingClient::from_config(&config).unwrap();
        assert_eq!(
            clients[0].request_url(),
            "https://res.openai.azure.com/embeddings"
        );
    }

    #[test]
    fn test_one_client_per_endpoint() {
        let config = config(&["--provider-url", "https://b.example.com", "--provider-key", "k1,k2"]);
        let clients = EmbeddingClient::from_config(&config).unwrap();
        assert_eq!(clients.len(), 2);
        assert_eq!(clients[1].endpoint(), "https://b.example.com");
    }

    #[test]
    fn test_status_429_is_throttled() {
        let err = classify_failure(StatusCode::TOO_MANY_REQUESTS, "rate limit");
        assert!(matches!(err, EmbeddingError::Throttled(ref m) if m.contains("429")));
    }

    #[test]
    fn test_other_status_is_server_error() {
        let err = classify_failure(StatusCode::BAD_REQUEST, "bad input");
        assert!(matches!(err, EmbeddingError::ServerError(_)));
        let err = classify_failure(StatusCode::SERVICE_UNAVAILABLE, "");
        assert!(matches!(err, EmbeddingError::ServerError(_)));
    }

    #[test]
    fn test_response_reordered_by_index() {
        let response: EmbedResponse = serde_json::from_str(
            r#"{"data":[{"index":1,"embedding":[2.0]},{"index":0,"embedding":[1.0]}]}"#,
        )
        .unwrap();
        assert_eq!(into_ordered_vectors(response), vec![vec![1.0], vec![2.0]]);
    }

    #[test]
    fn test_response_without_index_keeps_order() {
        let response: EmbedResponse =
            serde_json::from_str(r#"{"data":[{"embedding":[3.0]},{"embedding":[4.0]}]}"#).unwrap();
        assert_eq!(into_ordered_vectors(response), vec![vec![3.0], vec![4.0]]);
    }
}
