//! Google Gemini over its REST API: text generation and embeddings.

use std::time::Duration;

use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::debug;

use crate::{
    error::{Error, Result},
    providers::{ChatModel, Embedder},
};

pub const DEFAULT_ENDPOINT: &str =
    "https://generativelanguage.googleapis.com/v1beta";
pub const EMBEDDING_MODEL: &str = "models/embedding-001";
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
const API_KEY_HEADER: &str = "x-goog-api-key";

/// The service rejects larger `batchEmbedContents` requests.
const MAX_BATCH: usize = 100;

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    /// Chat model, e.g. `gemini-1.5-flash`.
    pub model: String,
    pub timeout: Duration,
    /// API endpoint (for testing or proxy)
    pub endpoint: String,
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            timeout: REQUEST_TIMEOUT,
            endpoint: DEFAULT_ENDPOINT.to_string(),
        }
    }
}

/// Client for both the chat and the embedding endpoints.
pub struct GeminiClient {
    config: GeminiConfig,
    client: Client,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedRequest<'a> {
    model: &'a str,
    content: Content<'a>,
    task_type: &'a str,
}

#[derive(Debug, Serialize)]
struct BatchEmbedRequest<'a> {
    requests: Vec<EmbedRequest<'a>>,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: Embedding,
}

#[derive(Debug, Deserialize)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<Embedding>,
}

#[derive(Debug, Deserialize)]
struct Embedding {
    values: Vec<f32>,
}

impl GenerateResponse {
    /// Concatenated text of the first candidate.
    fn into_text(self) -> String {
        self.candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().map(|p| p.text).collect())
            .unwrap_or_default()
    }
}

fn embed_request<'a>(text: &'a str, task_type: &'a str) -> EmbedRequest<'a> {
    EmbedRequest {
        model: EMBEDDING_MODEL,
        content: Content {
            role: None,
            parts: vec![Part { text }],
        },
        task_type,
    }
}

impl GeminiClient {
    /// Build a client. An empty API key is a configuration error.
    pub fn new(config: GeminiConfig) -> Result<Self> {
        if config.api_key.trim().is_empty() {
            return Err(Error::Config(
                "Gemini API key is missing. Set GEMINI_API_KEY or run \
                 `pdfchat settings set --api-key`."
                    .to_string(),
            ));
        }

        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { config, client })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// The key travels in a header so it never shows up in a request URL.
    fn request<B: Serialize>(&self, path: &str, body: &B) -> RequestBuilder {
        self.client
            .post(format!("{}/{path}", self.config.endpoint))
            .header(API_KEY_HEADER, &self.config.api_key)
            .json(body)
    }

    async fn post<B: Serialize, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R> {
        let response = self
            .request(path, body)
            .send()
            .await
            .map_err(reqwest::Error::without_url)?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(Error::Provider {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.json().await.map_err(reqwest::Error::without_url)?)
    }
}

impl ChatModel for GeminiClient {
    async fn complete(&self, prompt: &str, temperature: f32) -> Result<String> {
        let request = GenerateRequest {
            contents: vec![Content {
                role: Some("user"),
                parts: vec![Part { text: prompt }],
            }],
            generation_config: GenerationConfig { temperature },
        };

        let path = format!("models/{}:generateContent", self.config.model);
        let response: GenerateResponse = self.post(&path, &request).await?;
        debug!(model = %self.config.model, "completion received");
        Ok(response.into_text())
    }
}

impl Embedder for GeminiClient {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let path = format!("{EMBEDDING_MODEL}:batchEmbedContents");
        let mut vectors = Vec::with_capacity(texts.len());

        for batch in texts.chunks(MAX_BATCH) {
            let request = BatchEmbedRequest {
                requests: batch
                    .iter()
                    .map(|t| embed_request(t, "RETRIEVAL_DOCUMENT"))
                    .collect(),
            };
            let response: BatchEmbedResponse = self.post(&path, &request).await?;
            if response.embeddings.len() != batch.len() {
                return Err(Error::Model(format!(
                    "expected {} embeddings, got {}",
                    batch.len(),
                    response.embeddings.len()
                )));
            }
            vectors.extend(response.embeddings.into_iter().map(|e| e.values));
        }

        Ok(vectors)
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let path = format!("{EMBEDDING_MODEL}:embedContent");
        let request = embed_request(text, "RETRIEVAL_QUERY");
        let response: EmbedResponse = self.post(&path, &request).await?;
        Ok(response.embedding.values)
    }
}

impl std::fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiClient")
            .field("model", &self.config.model)
            .field("endpoint", &self.config.endpoint)
            .finish_non_exhaustive()
    }
}
