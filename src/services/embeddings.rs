use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur when calling the embedding service
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("API returned error: {0}")]
    ApiError(String),

    #[error("Unauthorized: invalid API key")]
    Unauthorized,

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),
}

/// Client for an OpenAI-compatible `/embeddings` endpoint
pub struct EmbeddingClient {
    endpoint: String,
    api_key: Option<String>,
    model: String,
    dimensions: Option<usize>,
    client: Client,
}

impl EmbeddingClient {
    pub fn new(
        endpoint: String,
        api_key: Option<String>,
        model: String,
        dimensions: Option<usize>,
        timeout: Duration,
    ) -> Result<Self, EmbeddingError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            endpoint,
            api_key,
            model,
            dimensions,
            client,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Embed a single query text
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let url = format!("{}/embeddings", self.endpoint.trim_end_matches('/'));

        let mut body = serde_json::json!({
            "model": self.model,
            "input": [text],
        });
        if let Some(dimensions) = self.dimensions {
            body["dimensions"] = dimensions.into();
        }

        tracing::debug!("Requesting embedding from {} ({} chars)", url, text.len());

        let mut request = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Err(EmbeddingError::Unauthorized);
        }
        if !response.status().is_success() {
            return Err(EmbeddingError::ApiError(format!(
                "Failed to embed query: {}",
                response.status()
            )));
        }

        let json: Value = response.json().await?;
        parse_embedding(&json)
    }
}

/// First vector of an `{"data": [{"index": 0, "embedding": [...]}]}` body
fn parse_embedding(json: &Value) -> Result<Vec<f32>, EmbeddingError> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| EmbeddingError::InvalidResponse("Missing data array".into()))?;

    let item = data
        .iter()
        .find(|item| item.get("index").and_then(|i| i.as_u64()).unwrap_or(0) == 0)
        .ok_or_else(|| EmbeddingError::InvalidResponse("Empty data array".into()))?;

    let values = item
        .get("embedding")
        .and_then(|e| e.as_array())
        .ok_or_else(|| EmbeddingError::InvalidResponse("Missing embedding array".into()))?;

    let embedding = values
        .iter()
        .map(|v| {
            v.as_f64()
                .map(|n| n as f32)
                .ok_or_else(|| EmbeddingError::InvalidResponse("Non-numeric embedding value".into()))
        })
        .collect::<Result<Vec<f32>, _>>()?;

    if embedding.is_empty() {
        return Err(EmbeddingError::InvalidResponse("Empty embedding".into()));
    }

    Ok(embedding)
}

/// pgvector text literal, e.g. `[0.1,0.2]`
pub fn to_vector_literal(embedding: &[f32]) -> String {
    let mut out = String::from("[");
    for (idx, value) in embedding.iter().enumerate() {
        if idx > 0 {
            out.push(',');
        }
        out.push_str(&value.to_string());
    }
    out.push(']');
    out
}
