#[cfg(test)]
pub(crate) mod fake;
#[cfg(test)]
mod tests;

pub mod gemini;
pub mod http;
pub mod ollama;
pub mod prompts;

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::debug;

use crate::config::{LlmConfig, LlmProvider};

pub use gemini::GeminiClient;
pub use ollama::OllamaClient;

/// Hint passed to the provider so documents and queries land in compatible
/// regions of the embedding space
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingTask {
    RetrievalDocument,
    RetrievalQuery,
}

impl EmbeddingTask {
    #[inline]
    pub fn as_gemini_str(self) -> &'static str {
        match self {
            EmbeddingTask::RetrievalDocument => "RETRIEVAL_DOCUMENT",
            EmbeddingTask::RetrievalQuery => "RETRIEVAL_QUERY",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseFormat {
    Text,
    Json,
}

/// A hosted or local model able to embed text and generate replies.
///
/// Implementations block on network I/O. Async callers go through
/// [`run_blocking`].
pub trait LanguageModel: Send + Sync {
    fn embed(&self, text: &str, task: EmbeddingTask) -> Result<Vec<f32>>;

    fn embed_batch(&self, texts: &[String], task: EmbeddingTask) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|text| self.embed(text, task)).collect()
    }

    fn generate(&self, prompt: &str, response: ResponseFormat) -> Result<String>;

    fn health_check(&self) -> Result<()>;

    fn model_name(&self) -> &str;
}

pub type SharedModel = Arc<dyn LanguageModel>;

/// Construct the client for the configured provider
#[inline]
pub fn build_model(config: &LlmConfig) -> Result<SharedModel> {
    debug!("Building {} language model client", config.provider);
    let model: SharedModel = match config.provider {
        LlmProvider::Gemini => {
            Arc::new(GeminiClient::new(config).context("Failed to create Gemini client")?)
        }
        LlmProvider::Ollama => {
            Arc::new(OllamaClient::new(config).context("Failed to create Ollama client")?)
        }
    };
    Ok(model)
}

/// Truncate or zero-pad `vector` to exactly `dimension` entries
#[inline]
pub fn fit_dimension(mut vector: Vec<f32>, dimension: usize) -> Vec<f32> {
    if vector.len() != dimension {
        debug!(
            "Adjusting embedding from {} to {} dimensions",
            vector.len(),
            dimension
        );
        vector.resize(dimension, 0.0);
    }
    vector
}

/// Run a blocking provider call without stalling the async runtime
#[inline]
pub async fn run_blocking<T, F>(task: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .context("Blocking model task failed to complete")?
}
