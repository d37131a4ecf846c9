// Deterministic in-process model for unit tests

use anyhow::{Result, bail};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use super::{EmbeddingTask, LanguageModel, ResponseFormat};

const IGNORED_WORDS: [&str; 12] = [
    "course",
    "university",
    "country",
    "description",
    "field",
    "study",
    "degree",
    "type",
    "of",
    "the",
    "and",
    "in",
];

/// Bag-of-words embeddings hashed into buckets, canned generation replies
pub(crate) struct FakeModel {
    dimension: usize,
    /// Reply to intent prompts. `None` makes classification fail.
    pub intent: Mutex<Option<String>>,
    /// `(needle, reply)`: extraction prompts containing `needle` get `reply`
    pub extractions: Mutex<Vec<(String, String)>>,
    pub answer: Mutex<String>,
    pub fail_embeddings: AtomicBool,
    pub fail_answers: AtomicBool,
    pub embed_calls: AtomicUsize,
    pub prompts: Mutex<Vec<String>>,
}

impl FakeModel {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            intent: Mutex::new(None),
            extractions: Mutex::new(Vec::new()),
            answer: Mutex::new("fake answer".to_string()),
            fail_embeddings: AtomicBool::new(false),
            fail_answers: AtomicBool::new(false),
            embed_calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn with_intent(self, reply: &str) -> Self {
        *self.intent.lock().expect("lock") = Some(reply.to_string());
        self
    }

    pub fn with_extraction(self, needle: &str, reply: &str) -> Self {
        self.extractions
            .lock()
            .expect("lock")
            .push((needle.to_string(), reply.to_string()));
        self
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().expect("lock").last().cloned()
    }
}

fn bucket(word: &str, dimension: usize) -> usize {
    // FNV-1a
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in word.bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    (hash % dimension as u64) as usize
}

/// Deterministic embedding: texts sharing words end up close together
pub(crate) fn fake_embedding(text: &str, dimension: usize) -> Vec<f32> {
    let mut vector = vec![0.0; dimension];
    vector[dimension - 1] = 0.05;
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .map(str::to_lowercase)
        .filter(|w| !w.is_empty() && !IGNORED_WORDS.contains(&w.as_str()))
    {
        vector[bucket(&word, dimension - 1)] += 1.0;
    }
    vector
}

impl LanguageModel for FakeModel {
    fn embed(&self, text: &str, _task: EmbeddingTask) -> Result<Vec<f32>> {
        self.embed_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_embeddings.load(Ordering::SeqCst) {
            bail!("embedding provider unavailable");
        }
        Ok(fake_embedding(text, self.dimension))
    }

    fn generate(&self, prompt: &str, response: ResponseFormat) -> Result<String> {
        self.prompts.lock().expect("lock").push(prompt.to_string());

        if prompt.starts_with("You extract structured") {
            let extractions = self.extractions.lock().expect("lock");
            return extractions
                .iter()
                .find(|(needle, _)| prompt.contains(needle.as_str()))
                .map(|(_, reply)| reply.clone())
                .ok_or_else(|| anyhow::anyhow!("no canned extraction for prompt"));
        }

        if prompt.starts_with("Classify the user's question") {
            assert_eq!(response, ResponseFormat::Json);
            return self
                .intent
                .lock()
                .expect("lock")
                .clone()
                .ok_or_else(|| anyhow::anyhow!("classifier unavailable"));
        }

        if self.fail_answers.load(Ordering::SeqCst) {
            bail!("generation provider unavailable");
        }
        Ok(self.answer.lock().expect("lock").clone())
    }

    fn health_check(&self) -> Result<()> {
        Ok(())
    }

    fn model_name(&self) -> &str {
        "fake"
    }
}
