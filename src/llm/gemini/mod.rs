
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

use super::http::{HttpTransport, join_endpoint};
use super::{EmbeddingTask, LanguageModel, ResponseFormat, fit_dimension};
use crate::ScoutError;
use crate::config::LlmConfig;

const API_KEY_HEADER: &str = "x-goog-api-key";
/// Upper bound on `requests` accepted by `batchEmbedContents`
const MAX_BATCH_REQUESTS: usize = 100;

/// Client for the Gemini REST API
#[derive(Debug, Clone)]
pub struct GeminiClient {
    base_url: Url,
    api_key: String,
    chat_model: String,
    embedding_model: String,
    dimension: usize,
    batch_size: usize,
    http: HttpTransport,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedContentRequest<'a> {
    model: String,
    content: Content<'a>,
    task_type: &'static str,
    output_dimensionality: usize,
}

#[derive(Debug, Serialize)]
struct BatchEmbedRequest<'a> {
    requests: Vec<EmbedContentRequest<'a>>,
}

#[derive(Debug, Deserialize)]
struct ContentEmbedding {
    values: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct EmbedContentResponse {
    embedding: ContentEmbedding,
}

#[derive(Debug, Deserialize)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<ContentEmbedding>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
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

impl GeminiClient {
    #[inline]
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let base_url = config
            .base_url()
            .context("Failed to parse Gemini base URL from config")?;
        let api_key = config
            .api_key()
            .context("Gemini requires an API key")?
            .to_string();

        Ok(Self {
            base_url,
            api_key,
            chat_model: strip_model_prefix(&config.chat_model).to_string(),
            embedding_model: strip_model_prefix(&config.embedding_model).to_string(),
            dimension: config.embedding_dimension as usize,
            batch_size: (config.batch_size as usize).clamp(1, MAX_BATCH_REQUESTS),
            http: HttpTransport::new(
                Duration::from_secs(config.timeout_secs),
                config.retry_attempts,
            ),
        })
    }

    fn auth_headers(&self) -> [(&str, &str); 1] {
        [(API_KEY_HEADER, self.api_key.as_str())]
    }

    fn endpoint(&self, model: &str, method: &str) -> Result<Url> {
        join_endpoint(&self.base_url, &format!("v1beta/models/{model}:{method}"))
            .with_context(|| format!("Failed to build {method} URL"))
    }

    fn embed_request<'a>(&self, text: &'a str, task: EmbeddingTask) -> EmbedContentRequest<'a> {
        EmbedContentRequest {
            model: format!("models/{}", self.embedding_model),
            content: Content {
                role: None,
                parts: vec![Part { text }],
            },
            task_type: task.as_gemini_str(),
            output_dimensionality: self.dimension,
        }
    }

    fn embed_chunk(&self, texts: &[String], task: EmbeddingTask) -> Result<Vec<Vec<f32>>> {
        let request = BatchEmbedRequest {
            requests: texts
                .iter()
                .map(|text| self.embed_request(text, task))
                .collect(),
        };
        let url = self.endpoint(&self.embedding_model, "batchEmbedContents")?;
        let request_json = serde_json::to_string(&request)
            .context("Failed to serialize batch embedding request")?;

        let response_text = self
            .http
            .post_json(url.as_str(), &self.auth_headers(), &request_json)
            .context("Failed to generate batch embeddings")?;

        let response: BatchEmbedResponse = serde_json::from_str(&response_text)
            .context("Failed to parse batch embedding response")?;

        if response.embeddings.len() != texts.len() {
            return Err(ScoutError::Embedding(format!(
                "Mismatch between request and response counts: {} vs {}",
                texts.len(),
                response.embeddings.len()
            ))
            .into());
        }

        Ok(response
            .embeddings
            .into_iter()
            .map(|e| fit_dimension(e.values, self.dimension))
            .collect())
    }
}

impl LanguageModel for GeminiClient {
    fn embed(&self, text: &str, task: EmbeddingTask) -> Result<Vec<f32>> {
        debug!("Generating Gemini embedding for text (length: {})", text.len());

        let url = self.endpoint(&self.embedding_model, "embedContent")?;
        let request_json = serde_json::to_string(&self.embed_request(text, task))
            .context("Failed to serialize embedding request")?;

        let response_text = self
            .http
            .post_json(url.as_str(), &self.auth_headers(), &request_json)
            .context("Failed to generate embedding")?;

        let response: EmbedContentResponse =
            serde_json::from_str(&response_text).context("Failed to parse embedding response")?;

        if response.embedding.values.is_empty() {
            return Err(
                ScoutError::Embedding("Gemini returned an empty embedding".to_string()).into(),
            );
        }

        Ok(fit_dimension(response.embedding.values, self.dimension))
    }

    fn embed_batch(&self, texts: &[String], task: EmbeddingTask) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Generating Gemini embeddings for {} texts", texts.len());

        let mut results = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(self.batch_size) {
            let batch = self
                .embed_chunk(chunk, task)
                .with_context(|| format!("Failed to process batch of {} texts", chunk.len()))?;
            results.extend(batch);
        }
        Ok(results)
    }

    fn generate(&self, prompt: &str, response: ResponseFormat) -> Result<String> {
        debug!(
            "Generating Gemini content with {} (prompt length: {})",
            self.chat_model,
            prompt.len()
        );

        let request = GenerateRequest {
            contents: vec![Content {
                role: Some("user"),
                parts: vec![Part { text: prompt }],
            }],
            generation_config: match response {
                ResponseFormat::Json => Some(GenerationConfig {
                    response_mime_type: "application/json",
                }),
                ResponseFormat::Text => None,
            },
        };
        let url = self.endpoint(&self.chat_model, "generateContent")?;
        let request_json =
            serde_json::to_string(&request).context("Failed to serialize generate request")?;

        let response_text = self
            .http
            .post_json(url.as_str(), &self.auth_headers(), &request_json)
            .context("Failed to generate content")?;

        let response: GenerateResponse =
            serde_json::from_str(&response_text).context("Failed to parse generate response")?;

        let text: String = response
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().map(|p| p.text).collect())
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(anyhow::anyhow!("Gemini returned no candidate text"));
        }

        Ok(text)
    }

    fn health_check(&self) -> Result<()> {
        let url = self
            .base_url
            .join(&format!("/v1beta/models/{}", self.chat_model))
            .context("Failed to build model URL")?;

        debug!("Checking Gemini model availability at {}", url);

        self.http
            .get(url.as_str(), &self.auth_headers())
            .with_context(|| format!("Gemini model '{}' is not reachable", self.chat_model))?;

        info!(
            "Health check passed for Gemini at {} with model {}",
            self.base_url, self.chat_model
        );
        Ok(())
    }

    fn model_name(&self) -> &str {
        &self.chat_model
    }
}

/// Accept both `gemini-1.5-pro` and `models/gemini-1.5-pro`
fn strip_model_prefix(model: &str) -> &str {
    let model = model.trim();
    model.strip_prefix("models/").unwrap_or(model)
}
