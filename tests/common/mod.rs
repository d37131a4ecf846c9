// Shared setup for the integration tests
// A keyword model stands in for the hosted provider so runs are offline and repeatable

#![allow(dead_code, reason = "each test binary uses a different subset")]

use anyhow::{Result, bail};
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use uni_scout::config::Config;
use uni_scout::database::Database;
use uni_scout::database::lancedb::VectorStore;
use uni_scout::llm::{EmbeddingTask, LanguageModel, ResponseFormat, SharedModel};

/// One embedding axis per topic word, plus a constant bias axis
pub const TOPICS: [&str; 10] = [
    "computer", "software", "medicine", "clinical", "law", "estonia", "finland", "design",
    "physics", "business",
];

pub const DIMENSION: usize = TOPICS.len() + 1;

pub const TARTU_PAGE: &str = r#"<html>
<head><title>University of Tartu admissions</title></head>
<body>
  <nav>Home | Apply</nav>
  <h1>University of Tartu</h1>
  <p>Estonia's leading research university offers a Master in Computer Science.</p>
  <script>trackVisit();</script>
</body>
</html>"#;

pub const TARTU_REPLY: &str = r#"{"universities": [
  {"university_name": "University of Tartu", "university_description": "Research university in Estonia",
   "country": "Estonia", "course_name": "Computer Science", "description": "Software engineering and computer systems",
   "degree_type": "Master", "starting_date": "September", "duration": "2 years",
   "fee_structure": "6000 EUR per year", "language_of_study": "English", "field_of_study": "Computer science"},
  {"university_name": "University of Tartu", "country": "Estonia",
   "course_name": "International Law", "description": "Law in a European context",
   "degree_type": "Master", "field_of_study": "Law"}
]}"#;

pub const HELSINKI_PAGE: &str =
    "University of Helsinki, Finland. Degree programme in Medicine with clinical training.";

pub const HELSINKI_REPLY: &str = r#"Here is the data:
```json
{"universities": [
  {"university_name": "University of Helsinki", "university_description": "Largest university in Finland",
   "country": "Finland", "course_name": "Medicine", "description": "Clinical medicine with hospital rotations",
   "degree_type": "Licentiate", "duration": "6 years", "fee_structure": null,
   "language_of_study": "Finnish", "field_of_study": "Medicine"}
]}
```"#;

/// Deterministic stand-in for a hosted model.
///
/// Embeddings count topic words. Extraction replies are canned per page,
/// classification flags greetings as small talk, answers echo the context size.
pub struct KeywordModel {
    extractions: Vec<(&'static str, &'static str)>,
    pub prompts: Mutex<Vec<String>>,
}

impl KeywordModel {
    pub fn new() -> Self {
        Self {
            extractions: vec![
                ("University of Tartu", TARTU_REPLY),
                ("University of Helsinki", HELSINKI_REPLY),
            ],
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompt_count(&self) -> usize {
        self.prompts.lock().expect("lock").len()
    }
}

pub fn topic_vector(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0; DIMENSION];
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .map(str::to_lowercase)
    {
        if let Some(axis) = TOPICS.iter().position(|topic| word.starts_with(topic)) {
            vector[axis] += 1.0;
        }
    }
    vector[DIMENSION - 1] = 0.1;
    vector
}

impl LanguageModel for KeywordModel {
    fn embed(&self, text: &str, _task: EmbeddingTask) -> Result<Vec<f32>> {
        Ok(topic_vector(text))
    }

    fn generate(&self, prompt: &str, _response: ResponseFormat) -> Result<String> {
        self.prompts.lock().expect("lock").push(prompt.to_string());

        if prompt.starts_with("You extract structured") {
            return match self
                .extractions
                .iter()
                .find(|(needle, _)| prompt.contains(needle))
            {
                Some((_, reply)) => Ok((*reply).to_string()),
                None => bail!("no canned extraction for this page"),
            };
        }

        if prompt.starts_with("Classify the user's question") {
            let question = prompt.rsplit("Question:").next().unwrap_or_default();
            let lowered = question.to_lowercase();
            let reply = if lowered.contains("hello") || lowered.contains("thanks") {
                r#"{"requires_lookup": false, "target": "unknown", "reason": "small talk"}"#
            } else if lowered.contains("course") || lowered.contains("study") {
                r#"{"requires_lookup": true, "target": "course", "reason": "asks about courses"}"#
            } else {
                r#"{"requires_lookup": true, "target": "both", "reason": "catalog question"}"#
            };
            return Ok(reply.to_string());
        }

        if prompt.contains("catalog records below") {
            Ok("Answer grounded in catalog records.".to_string())
        } else {
            Ok("Answer without catalog records.".to_string())
        }
    }

    fn health_check(&self) -> Result<()> {
        Ok(())
    }

    fn model_name(&self) -> &str {
        "keyword-model"
    }
}

pub struct TestEnv {
    pub temp_dir: TempDir,
    pub config: Config,
    pub database: Arc<Database>,
    pub vector_store: Arc<VectorStore>,
    pub model: Arc<KeywordModel>,
}

impl TestEnv {
    pub async fn new() -> Self {
        let temp_dir = TempDir::new().expect("should create temp dir");
        let mut config = Config::with_base_dir(temp_dir.path());
        config.llm.embedding_dimension = DIMENSION as u32;
        config.llm.batch_size = 2;
        config.ensure_directories().expect("should create data directories");

        let database = Arc::new(
            Database::initialize(&config)
                .await
                .expect("should open database"),
        );
        let vector_store = Arc::new(
            VectorStore::new(&config)
                .await
                .expect("should open vector store"),
        );

        Self {
            temp_dir,
            config,
            database,
            vector_store,
            model: Arc::new(KeywordModel::new()),
        }
    }

    pub fn shared_model(&self) -> SharedModel {
        Arc::clone(&self.model) as SharedModel
    }

    pub fn write_raw(&self, name: &str, content: &str) -> PathBuf {
        let path = self.config.raw_dir().join(name);
        fs::write(&path, content).expect("should write raw file");
        path
    }
}
