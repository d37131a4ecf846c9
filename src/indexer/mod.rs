// Indexer module
// Generates embeddings for catalog rows and keeps SQLite and LanceDB in step


pub mod consistency;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::ScoutError;
use crate::database::Database;
use crate::database::lancedb::{EmbeddingRecord, EntityType, VectorStore, new_vector_id};
use crate::database::sqlite::{CourseWithUniversity, University};
use crate::llm::{EmbeddingTask, SharedModel, fit_dimension, run_blocking};

pub use consistency::{ConsistencyReport, ConsistencyValidator, MissingVector, RepairStats};

/// One catalog row waiting for an embedding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddingJob {
    pub entity: EntityType,
    pub record_id: i64,
    pub label: String,
    pub text: String,
    /// Reused when the row already has a vector, so the new one replaces it
    pub vector_id: Option<String>,
}

impl EmbeddingJob {
    #[inline]
    pub fn university(university: &University) -> Self {
        Self {
            entity: EntityType::University,
            record_id: university.id,
            label: university.name.clone(),
            text: university.embedding_text(),
            vector_id: university.vector_id.clone(),
        }
    }

    #[inline]
    pub fn course(course: &CourseWithUniversity) -> Self {
        Self {
            entity: EntityType::Course,
            record_id: course.course.id,
            label: course.course.name.clone(),
            text: course.embedding_text(),
            vector_id: course.course.vector_id.clone(),
        }
    }
}

/// Statistics about an embedding pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexingStats {
    pub universities_embedded: usize,
    pub courses_embedded: usize,
    pub failed_batches: usize,
    pub failed_rows: usize,
}

impl IndexingStats {
    #[inline]
    pub fn total_embedded(&self) -> usize {
        self.universities_embedded + self.courses_embedded
    }
}

/// Embeds catalog rows through the language model and stores the vectors
#[derive(Clone)]
pub struct EmbeddingIndexer {
    database: Arc<Database>,
    vector_store: Arc<VectorStore>,
    model: SharedModel,
    batch_size: usize,
}

impl EmbeddingIndexer {
    #[inline]
    pub fn new(
        database: Arc<Database>,
        vector_store: Arc<VectorStore>,
        model: SharedModel,
        batch_size: usize,
    ) -> Self {
        Self {
            database,
            vector_store,
            model,
            batch_size: batch_size.max(1),
        }
    }

    /// Embed one batch of rows, write the vectors to LanceDB, then record
    /// their ids in SQLite. Returns the number of rows embedded.
    #[inline]
    pub async fn embed_jobs(&self, jobs: &[EmbeddingJob]) -> Result<usize> {
        if jobs.is_empty() {
            return Ok(0);
        }

        let texts: Vec<String> = jobs.iter().map(|job| job.text.clone()).collect();
        let model = Arc::clone(&self.model);
        let vectors = run_blocking(move || {
            model.embed_batch(&texts, EmbeddingTask::RetrievalDocument)
        })
        .await
        .context("Failed to generate embeddings")?;

        if vectors.len() != jobs.len() {
            return Err(ScoutError::Embedding(format!(
                "Model returned {} embeddings for {} texts",
                vectors.len(),
                jobs.len()
            ))
            .into());
        }

        let dimension = self.vector_store.vector_dimension();
        let mut fresh = Vec::new();
        let mut replacements = Vec::new();
        for (job, vector) in jobs.iter().zip(vectors) {
            let vector = fit_dimension(vector, dimension);
            let (vector_id, target) = match &job.vector_id {
                Some(existing) => (existing.clone(), &mut replacements),
                None => (new_vector_id(), &mut fresh),
            };
            target.push(EmbeddingRecord::new(
                vector_id,
                vector,
                job.entity,
                job.record_id,
                job.label.as_str(),
            ));
        }

        self.vector_store
            .store_embeddings_batch(&fresh)
            .await
            .context("Failed to store embeddings in LanceDB")?;
        for record in &replacements {
            self.vector_store
                .upsert_embedding(record)
                .await
                .context("Failed to replace embedding in LanceDB")?;
        }

        for record in fresh.iter().chain(&replacements) {
            let marked = match record.metadata.entity_type {
                EntityType::University => {
                    self.database
                        .mark_university_embedded(record.metadata.record_id, &record.id)
                        .await?
                }
                EntityType::Course => {
                    self.database
                        .mark_course_embedded(record.metadata.record_id, &record.id)
                        .await?
                }
            };
            if !marked {
                debug!(
                    "{} {} vanished before it could be marked embedded",
                    record.metadata.entity_type, record.metadata.record_id
                );
            }
        }

        Ok(jobs.len())
    }

    /// Embed every university and course that has no vector yet
    #[inline]
    pub async fn generate_missing(&self) -> Result<IndexingStats> {
        detach_if_recreated(&self.database, &self.vector_store).await?;

        let universities = self.database.list_universities_missing_embeddings().await?;
        let courses = self.database.list_courses_missing_embeddings().await?;

        let jobs: Vec<EmbeddingJob> = universities
            .iter()
            .map(EmbeddingJob::university)
            .chain(courses.iter().map(EmbeddingJob::course))
            .collect();

        let mut stats = IndexingStats::default();
        if jobs.is_empty() {
            info!("All catalog rows already have embeddings");
            return Ok(stats);
        }

        info!(
            "Generating embeddings for {} universities and {} courses",
            universities.len(),
            courses.len()
        );

        let progress = progress_bar(jobs.len() as u64)?;
        for batch in jobs.chunks(self.batch_size) {
            match self.embed_jobs(batch).await {
                Ok(_) => {
                    for job in batch {
                        match job.entity {
                            EntityType::University => stats.universities_embedded += 1,
                            EntityType::Course => stats.courses_embedded += 1,
                        }
                    }
                }
                Err(e) => {
                    error!("Failed to embed batch of {} rows: {:#}", batch.len(), e);
                    stats.failed_batches += 1;
                    stats.failed_rows += batch.len();
                }
            }
            progress.inc(batch.len() as u64);
        }
        progress.finish_and_clear();

        info!(
            "Embedded {} rows ({} failed)",
            stats.total_embedded(),
            stats.failed_rows
        );
        if stats.total_embedded() > 0 {
            self.maintain_vector_store().await;
        }
        Ok(stats)
    }

    /// Compact the table and build the vector index once it is large enough.
    /// Failures only cost search speed, so they are logged.
    #[inline]
    pub async fn maintain_vector_store(&self) {
        if let Err(e) = self.vector_store.optimize().await {
            warn!("Vector store optimization failed: {}", e);
        }
        if let Err(e) = self.vector_store.create_vector_index().await {
            warn!("Vector index creation failed: {}", e);
        }
    }

    /// Compare the vector ids recorded in SQLite with those stored in LanceDB
    #[inline]
    pub async fn validate_consistency(&self) -> Result<ConsistencyReport> {
        ConsistencyValidator::new(&self.database, &self.vector_store)
            .validate_consistency()
            .await
    }

    /// Delete orphaned vectors, detach rows whose vector is gone, then embed
    /// everything still missing
    #[inline]
    pub async fn repair(&self) -> Result<RepairStats> {
        let validator = ConsistencyValidator::new(&self.database, &self.vector_store);
        let report = validator.validate_consistency().await?;

        let mut stats = RepairStats::default();
        if report.is_consistent {
            info!("SQLite and LanceDB are consistent");
        } else {
            stats.orphans_deleted = validator
                .cleanup_orphaned_embeddings(&report.orphaned_in_lancedb)
                .await?;
            stats.rows_detached = validator
                .detach_missing_vectors(&report.missing_in_lancedb)
                .await?;
            info!(
                "Deleted {} orphaned embeddings, detached {} rows",
                stats.orphans_deleted, stats.rows_detached
            );
        }

        stats.indexing = self.generate_missing().await?;
        if stats.orphans_deleted > 0 && stats.indexing.total_embedded() == 0 {
            self.maintain_vector_store().await;
        }
        Ok(stats)
    }
}

/// When opening the vector store replaced its table, the vector ids recorded
/// in SQLite point at nothing. Clear them so the rows are embedded again.
/// Returns the number of rows detached.
#[inline]
pub async fn detach_if_recreated(database: &Database, vector_store: &VectorStore) -> Result<u64> {
    if !vector_store.take_recreated() {
        return Ok(0);
    }
    let detached = database
        .clear_all_embeddings()
        .await
        .context("Failed to detach rows from the dropped vector table")?;
    if detached > 0 {
        warn!(
            "Embedding dimension changed, {} catalog rows must be embedded again",
            detached
        );
    }
    Ok(detached)
}

fn progress_bar(len: u64) -> Result<ProgressBar> {
    if !console::user_attended_stderr() {
        return Ok(ProgressBar::hidden());
    }
    Ok(ProgressBar::new(len).with_style(
        ProgressStyle::with_template("{spinner} [{bar:40}] {pos}/{len} embeddings")
            .context("Invalid progress template")?
            .progress_chars("=> "),
    ))
}
