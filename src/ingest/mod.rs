// Structured data generation
// Turns raw university pages into catalog rows through the language model


use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::ScoutError;
use crate::config::Config;
use crate::crawler::{list_raw_files, read_raw_file};
use crate::database::Database;
use crate::database::lancedb::{EntityType, VectorStore};
use crate::database::sqlite::{FileStatus, NewCourse, NewIngestedFile, NewUniversity};
use crate::indexer::{EmbeddingIndexer, EmbeddingJob};
use crate::llm::prompts::{ExtractedCatalog, ExtractedEntry, extraction_prompt, parse_json_reply};
use crate::llm::{ResponseFormat, SharedModel, run_blocking};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub files_seen: usize,
    pub files_processed: usize,
    pub files_skipped: usize,
    pub files_failed: usize,
    pub universities_upserted: usize,
    pub courses_upserted: usize,
    pub embeddings_generated: usize,
}

/// What happened to a single raw file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOutcome {
    /// Same content was already processed
    Skipped,
    Processed {
        universities: usize,
        courses: usize,
        embeddings: usize,
    },
}

pub struct Ingestor {
    database: Arc<Database>,
    indexer: EmbeddingIndexer,
    model: SharedModel,
    extensions: Vec<String>,
    max_content_chars: usize,
    /// Extracted catalogs are kept here as JSON for inspection
    processed_dir: PathBuf,
}

/// Hex SHA-256 of `content`
#[inline]
pub fn content_hash(content: &str) -> String {
    Sha256::digest(content.as_bytes())
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect()
}

/// Keep at most `max_chars` characters, cutting on a char boundary
#[inline]
pub fn truncate_chars(content: &str, max_chars: usize) -> &str {
    content
        .char_indices()
        .nth(max_chars)
        .and_then(|(index, _)| content.get(..index))
        .unwrap_or(content)
}

impl Ingestor {
    #[inline]
    pub fn new(
        database: Arc<Database>,
        vector_store: Arc<VectorStore>,
        model: SharedModel,
        config: &Config,
    ) -> Self {
        let indexer = EmbeddingIndexer::new(
            Arc::clone(&database),
            vector_store,
            Arc::clone(&model),
            config.llm.batch_size as usize,
        );
        Self {
            database,
            indexer,
            model,
            extensions: config.ingest.extensions.clone(),
            max_content_chars: config.ingest.max_content_chars,
            processed_dir: config.processed_dir(),
        }
    }

    /// Process every raw file in `raw_dir`. A failing file is recorded and
    /// counted, the run carries on with the next one.
    #[inline]
    pub async fn process_directory(&self, raw_dir: &Path) -> Result<IngestStats> {
        let files = list_raw_files(raw_dir, &self.extensions)?;
        info!("Processing {} raw files from {}", files.len(), raw_dir.display());

        let mut stats = IngestStats {
            files_seen: files.len(),
            ..IngestStats::default()
        };

        for path in &files {
            match self.process_file(path).await {
                Ok(FileOutcome::Skipped) => stats.files_skipped += 1,
                Ok(FileOutcome::Processed {
                    universities,
                    courses,
                    embeddings,
                }) => {
                    stats.files_processed += 1;
                    stats.universities_upserted += universities;
                    stats.courses_upserted += courses;
                    stats.embeddings_generated += embeddings;
                }
                Err(e) => {
                    error!("Failed to process {}: {:#}", path.display(), e);
                    stats.files_failed += 1;
                }
            }
        }

        info!(
            "Processed {} files ({} skipped, {} failed): {} universities, {} courses, {} embeddings",
            stats.files_processed,
            stats.files_skipped,
            stats.files_failed,
            stats.universities_upserted,
            stats.courses_upserted,
            stats.embeddings_generated
        );
        if stats.embeddings_generated > 0 {
            self.indexer.maintain_vector_store().await;
        }
        Ok(stats)
    }

    /// Process one raw file and record its outcome under its canonical path
    #[inline]
    pub async fn process_file(&self, path: &Path) -> Result<FileOutcome> {
        let path = fs::canonicalize(path)
            .with_context(|| format!("Failed to resolve raw file: {}", path.display()))?;
        let path = path.as_path();
        let key = path.display().to_string();
        let content = read_raw_file(path)?;
        let hash = content_hash(&content);

        if let Some(previous) = self.database.get_ingested_file(&key).await? {
            if previous.is_processed() && previous.content_hash == hash {
                debug!("Skipping unchanged file {}", key);
                return Ok(FileOutcome::Skipped);
            }
        }

        let result = self
            .extract_and_store(path, truncate_chars(&content, self.max_content_chars))
            .await;

        let (status, error_message, universities_found) = match &result {
            Ok(FileOutcome::Processed { universities, .. }) => {
                (FileStatus::Processed, None, *universities as i64)
            }
            Ok(FileOutcome::Skipped) => (FileStatus::Processed, None, 0),
            Err(e) => (FileStatus::Failed, Some(format!("{e:#}")), 0),
        };
        self.database
            .record_ingested_file(NewIngestedFile {
                path: key,
                content_hash: hash,
                status,
                error_message,
                universities_found,
            })
            .await?;

        result
    }

    async fn extract_and_store(&self, path: &Path, content: &str) -> Result<FileOutcome> {
        if content.trim().is_empty() {
            return Err(ScoutError::Ingest("File contains no text".to_string()).into());
        }

        let prompt = extraction_prompt(content);
        let model = Arc::clone(&self.model);
        let raw = run_blocking(move || model.generate(&prompt, ResponseFormat::Json))
            .await
            .context("Extraction request failed")?;
        let catalog: ExtractedCatalog =
            parse_json_reply(&raw).context("Extraction reply was not valid JSON")?;
        debug!("Extracted {} entries", catalog.universities.len());
        self.save_processed(path, &catalog);

        let mut universities = 0;
        let mut courses = 0;
        let mut embeddings = 0;
        // university id -> text its current vector was built from
        let mut embedded_universities: HashMap<i64, String> = HashMap::new();

        for entry in &catalog.universities {
            if entry.university_name.is_empty() {
                warn!("Skipping extracted entry without a university name");
                continue;
            }

            let (mut jobs, course_stored) = self.store_entry(entry).await?;
            universities += 1;
            courses += usize::from(course_stored);

            jobs.retain(|job| {
                job.entity != EntityType::University
                    || embedded_universities.get(&job.record_id) != Some(&job.text)
            });

            match self.indexer.embed_jobs(&jobs).await {
                Ok(count) => {
                    embeddings += count;
                    for job in jobs.iter().filter(|job| job.entity == EntityType::University) {
                        embedded_universities.insert(job.record_id, job.text.clone());
                    }
                }
                Err(e) => warn!(
                    "Could not embed {}, leaving it for the embed pass: {:#}",
                    entry.university_name, e
                ),
            }
        }

        Ok(FileOutcome::Processed {
            universities,
            courses,
            embeddings,
        })
    }

    fn save_processed(&self, source: &Path, catalog: &ExtractedCatalog) {
        let stem = source
            .file_stem()
            .map_or_else(|| "document".into(), |s| s.to_string_lossy());
        let target = self.processed_dir.join(format!("{stem}.json"));

        let written = fs::create_dir_all(&self.processed_dir)
            .map_err(anyhow::Error::from)
            .and_then(|()| Ok(serde_json::to_string_pretty(catalog)?))
            .and_then(|json| Ok(fs::write(&target, json)?));
        if let Err(e) = written {
            warn!("Could not save {}: {:#}", target.display(), e);
        }
    }

    /// Upsert the university and, when named, its course. Returns the
    /// embedding jobs for the stored rows.
    async fn store_entry(&self, entry: &ExtractedEntry) -> Result<(Vec<EmbeddingJob>, bool)> {
        let university = self
            .database
            .upsert_university(NewUniversity {
                name: entry.university_name.clone(),
                country: entry.country.clone(),
                description: entry.university_description.clone(),
            })
            .await?;
        let mut jobs = vec![EmbeddingJob::university(&university)];

        if entry.course_name.is_empty() {
            return Ok((jobs, false));
        }

        let course = self
            .database
            .upsert_course(NewCourse {
                university_id: university.id,
                name: entry.course_name.clone(),
                description: entry.description.clone(),
                degree_type: entry.degree_type.clone(),
                starting_date: entry.starting_date.clone(),
                duration: entry.duration.clone(),
                scholarship: entry.scholarship.clone(),
                fee_structure: entry.fee_structure.clone(),
                language_of_study: entry.language_of_study.clone(),
                field_of_study: entry.field_of_study.clone(),
            })
            .await?;
        let course = self
            .database
            .get_course_by_id(course.id)
            .await?
            .context("Course vanished right after upsert")?;
        jobs.push(EmbeddingJob::course(&course));

        Ok((jobs, true))
    }
}
