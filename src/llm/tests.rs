use super::*;
use std::sync::atomic::{AtomicUsize, Ordering};

struct CountingModel {
    calls: AtomicUsize,
}

impl LanguageModel for CountingModel {
    fn embed(&self, text: &str, _task: EmbeddingTask) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![text.len() as f32])
    }

    fn generate(&self, prompt: &str, _response: ResponseFormat) -> Result<String> {
        Ok(prompt.to_uppercase())
    }

    fn health_check(&self) -> Result<()> {
        Ok(())
    }

    fn model_name(&self) -> &str {
        "counting"
    }
}

#[test]
fn fit_dimension_pads_and_truncates() {
    assert_eq!(fit_dimension(vec![1.0, 2.0], 4), vec![1.0, 2.0, 0.0, 0.0]);
    assert_eq!(fit_dimension(vec![1.0, 2.0, 3.0], 2), vec![1.0, 2.0]);
    assert_eq!(fit_dimension(vec![1.0], 1), vec![1.0]);
}

#[test]
fn task_hints() {
    assert_eq!(
        EmbeddingTask::RetrievalDocument.as_gemini_str(),
        "RETRIEVAL_DOCUMENT"
    );
    assert_eq!(EmbeddingTask::RetrievalQuery.as_gemini_str(), "RETRIEVAL_QUERY");
}

#[test]
fn default_embed_batch_loops_over_embed() {
    let model = CountingModel {
        calls: AtomicUsize::new(0),
    };
    let texts = vec!["a".to_string(), "bb".to_string(), "ccc".to_string()];

    let vectors = model
        .embed_batch(&texts, EmbeddingTask::RetrievalDocument)
        .expect("batch should succeed");

    assert_eq!(vectors, vec![vec![1.0], vec![2.0], vec![3.0]]);
    assert_eq!(model.calls.load(Ordering::SeqCst), 3);
}

#[test]
fn build_model_selects_provider() {
    let ollama = build_model(&LlmConfig::for_provider(LlmProvider::Ollama))
        .expect("ollama needs no key");
    assert_eq!(ollama.model_name(), "llama3.2");

    let gemini = build_model(&LlmConfig::for_provider(LlmProvider::Gemini));
    assert!(gemini.is_err(), "gemini without an API key must fail");

    let gemini = build_model(&LlmConfig {
        api_key: Some("key".to_string()),
        ..LlmConfig::for_provider(LlmProvider::Gemini)
    })
    .expect("gemini with key");
    assert_eq!(gemini.model_name(), "gemini-1.5-pro");
}

#[tokio::test]
async fn run_blocking_returns_task_result() {
    let model: SharedModel = Arc::new(CountingModel {
        calls: AtomicUsize::new(0),
    });

    let reply = run_blocking(move || model.generate("hi", ResponseFormat::Text))
        .await
        .expect("task should succeed");
    assert_eq!(reply, "HI");

    let failed: Result<()> = run_blocking(|| Err(anyhow::anyhow!("boom"))).await;
    assert!(failed.is_err());
}
