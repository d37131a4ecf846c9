#[cfg(test)]
mod tests;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use super::http::{HttpTransport, join_endpoint};
use super::{EmbeddingTask, LanguageModel, ResponseFormat, fit_dimension};
use crate::ScoutError;
use crate::config::LlmConfig;

/// Client for a local Ollama daemon
#[derive(Debug, Clone)]
pub struct OllamaClient {
    base_url: Url,
    chat_model: String,
    embedding_model: String,
    dimension: usize,
    batch_size: usize,
    http: HttpTransport,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'static str>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Debug, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    pub size: Option<u64>,
    pub digest: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    models: Vec<ModelInfo>,
}

impl OllamaClient {
    #[inline]
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let base_url = config
            .base_url()
            .context("Failed to generate Ollama URL from config")?;

        Ok(Self {
            base_url,
            chat_model: config.chat_model.trim().to_string(),
            embedding_model: config.embedding_model.trim().to_string(),
            dimension: config.embedding_dimension as usize,
            batch_size: config.batch_size.max(1) as usize,
            http: HttpTransport::new(
                Duration::from_secs(config.timeout_secs),
                config.retry_attempts,
            ),
        })
    }

    /// Ping the Ollama server to check if it's responsive
    #[inline]
    pub fn ping(&self) -> Result<()> {
        let url = join_endpoint(&self.base_url, "api/tags")
            .context("Failed to build ping URL")?;

        debug!("Pinging Ollama server at {}", url);

        self.http
            .get(url.as_str(), &[])
            .context("Failed to ping Ollama server")?;

        debug!("Server ping successful");
        Ok(())
    }

    /// Validate that both configured models are pulled
    #[inline]
    pub fn validate_models(&self) -> Result<()> {
        let models = self.list_models().context("Failed to list models")?;
        let available: Vec<&str> = models.iter().map(|m| m.name.as_str()).collect();

        for wanted in [&self.chat_model, &self.embedding_model] {
            if !available.iter().any(|name| same_model(name, wanted)) {
                warn!(
                    "Model {} not found. Available models: {:?}",
                    wanted, available
                );
                return Err(anyhow::anyhow!(
                    "Model '{}' is not available. Available models: {:?}",
                    wanted,
                    available
                ));
            }
        }

        debug!("Models {} and {} are available", self.chat_model, self.embedding_model);
        Ok(())
    }

    /// List all available models
    #[inline]
    pub fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let url = join_endpoint(&self.base_url, "api/tags")
            .context("Failed to build models URL")?;

        debug!("Fetching available models from {}", url);

        let response_text = self
            .http
            .get(url.as_str(), &[])
            .context("Failed to fetch models")?;

        let models_response: ModelsResponse =
            serde_json::from_str(&response_text).context("Failed to parse models response")?;

        debug!("Found {} models", models_response.models.len());
        Ok(models_response.models)
    }

    fn embed_chunk(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let request = EmbedRequest {
            model: &self.embedding_model,
            input: texts,
        };

        let url = join_endpoint(&self.base_url, "api/embed")
            .context("Failed to build embedding URL")?;

        let request_json =
            serde_json::to_string(&request).context("Failed to serialize embedding request")?;

        let response_text = self
            .http
            .post_json(url.as_str(), &[], &request_json)
            .context("Failed to generate embeddings")?;

        let response: EmbedResponse =
            serde_json::from_str(&response_text).context("Failed to parse embedding response")?;

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
            .map(|e| fit_dimension(e, self.dimension))
            .collect())
    }
}

impl LanguageModel for OllamaClient {
    /// Ollama has no task hint; queries and documents share one space
    fn embed(&self, text: &str, _task: EmbeddingTask) -> Result<Vec<f32>> {
        debug!("Generating embedding for text (length: {})", text.len());

        self.embed_chunk(&[text.to_string()])?
            .pop()
            .ok_or_else(|| ScoutError::Embedding("Ollama returned no embedding".to_string()).into())
    }

    fn embed_batch(&self, texts: &[String], _task: EmbeddingTask) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Generating embeddings for {} texts", texts.len());

        let mut results = Vec::with_capacity(texts.len());

        for chunk in texts.chunks(self.batch_size) {
            let batch = self
                .embed_chunk(chunk)
                .with_context(|| format!("Failed to process batch of {} texts", chunk.len()))?;
            results.extend(batch);
        }

        debug!("Generated {} embeddings total", results.len());
        Ok(results)
    }

    fn generate(&self, prompt: &str, response: ResponseFormat) -> Result<String> {
        let request = GenerateRequest {
            model: &self.chat_model,
            prompt,
            stream: false,
            format: match response {
                ResponseFormat::Json => Some("json"),
                ResponseFormat::Text => None,
            },
        };

        let url = join_endpoint(&self.base_url, "api/generate")
            .context("Failed to build generate URL")?;

        let request_json =
            serde_json::to_string(&request).context("Failed to serialize generate request")?;

        let response_text = self
            .http
            .post_json(url.as_str(), &[], &request_json)
            .context("Failed to generate response")?;

        let response: GenerateResponse =
            serde_json::from_str(&response_text).context("Failed to parse generate response")?;

        Ok(response.response)
    }

    fn health_check(&self) -> Result<()> {
        debug!("Performing health check for Ollama at {}", self.base_url);

        self.ping().context("Server ping failed")?;
        self.validate_models().context("Model validation failed")?;

        info!(
            "Health check passed for Ollama server at {} with models {} / {}",
            self.base_url, self.chat_model, self.embedding_model
        );
        Ok(())
    }

    fn model_name(&self) -> &str {
        &self.chat_model
    }
}

/// `llama3.2` and `llama3.2:latest` name the same model
fn same_model(available: &str, wanted: &str) -> bool {
    let strip = |name: &str| name.strip_suffix(":latest").unwrap_or(name).to_string();
    strip(available) == strip(wanted)
}
