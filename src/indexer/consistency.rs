// Database consistency validation module
// Ensures every vector_id recorded in SQLite has a vector in LanceDB and vice versa


use anyhow::{Context, Result};
use std::collections::HashSet;
use tracing::{debug, info, warn};

use crate::database::Database;
use crate::database::lancedb::{EntityType, VectorStore};

/// A row whose recorded vector is absent from LanceDB
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingVector {
    pub entity: EntityType,
    pub record_id: i64,
    pub vector_id: String,
}

/// Consistency check results between SQLite and LanceDB
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsistencyReport {
    /// Rows in SQLite that record a vector_id
    pub sqlite_vectors: usize,
    /// Embeddings stored in LanceDB
    pub lancedb_embeddings: usize,
    /// Rows with no vector_id yet, left for the embed pass
    pub rows_without_vectors: usize,
    pub missing_in_lancedb: Vec<MissingVector>,
    /// Vector ids in LanceDB that no row refers to
    pub orphaned_in_lancedb: Vec<String>,
    pub is_consistent: bool,
}

impl ConsistencyReport {
    #[inline]
    pub fn total_issues(&self) -> usize {
        self.missing_in_lancedb.len() + self.orphaned_in_lancedb.len()
    }

    #[inline]
    pub fn summary(&self) -> String {
        if self.is_consistent {
            format!(
                "Database is consistent: {} vectors in SQLite, {} embeddings in LanceDB, {} rows awaiting embeddings",
                self.sqlite_vectors, self.lancedb_embeddings, self.rows_without_vectors
            )
        } else {
            format!(
                "{} inconsistencies found: {} rows missing from LanceDB, {} orphaned embeddings",
                self.total_issues(),
                self.missing_in_lancedb.len(),
                self.orphaned_in_lancedb.len()
            )
        }
    }
}

/// Outcome of a repair run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RepairStats {
    pub orphans_deleted: usize,
    pub rows_detached: usize,
    pub indexing: super::IndexingStats,
}

/// Performs consistency validation between SQLite and LanceDB
pub struct ConsistencyValidator<'a> {
    database: &'a Database,
    vector_store: &'a VectorStore,
}

impl<'a> ConsistencyValidator<'a> {
    #[inline]
    pub fn new(database: &'a Database, vector_store: &'a VectorStore) -> Self {
        Self {
            database,
            vector_store,
        }
    }

    /// Perform a full consistency check between SQLite and LanceDB
    #[inline]
    pub async fn validate_consistency(&self) -> Result<ConsistencyReport> {
        info!("Starting cross-database consistency validation");

        let recorded: Vec<MissingVector> = self
            .database
            .list_embedded_universities()
            .await?
            .into_iter()
            .map(|row| MissingVector {
                entity: EntityType::University,
                record_id: row.id,
                vector_id: row.vector_id,
            })
            .chain(
                self.database
                    .list_embedded_courses()
                    .await?
                    .into_iter()
                    .map(|row| MissingVector {
                        entity: EntityType::Course,
                        record_id: row.id,
                        vector_id: row.vector_id,
                    }),
            )
            .collect();
        debug!("Found {} recorded vector ids in SQLite", recorded.len());

        let stored: HashSet<String> = self
            .vector_store
            .list_vector_ids()
            .await
            .context("Failed to list LanceDB vector ids")?
            .into_iter()
            .collect();
        debug!("Found {} embeddings in LanceDB", stored.len());

        let recorded_ids: HashSet<&str> = recorded.iter().map(|r| r.vector_id.as_str()).collect();

        let mut orphaned_in_lancedb: Vec<String> = stored
            .iter()
            .filter(|id| !recorded_ids.contains(id.as_str()))
            .cloned()
            .collect();
        orphaned_in_lancedb.sort();

        let sqlite_vectors = recorded.len();
        let missing_in_lancedb: Vec<MissingVector> = recorded
            .into_iter()
            .filter(|r| !stored.contains(&r.vector_id))
            .collect();

        let counts = self.database.counts().await?;
        let rows_without_vectors = (counts.universities - counts.embedded_universities
            + counts.courses
            - counts.embedded_courses)
            .max(0) as usize;

        let is_consistent = missing_in_lancedb.is_empty() && orphaned_in_lancedb.is_empty();
        if is_consistent {
            info!("Databases are consistent");
        } else {
            warn!(
                "Inconsistencies found: {} rows missing vectors in LanceDB, {} orphaned embeddings",
                missing_in_lancedb.len(),
                orphaned_in_lancedb.len()
            );
        }

        Ok(ConsistencyReport {
            sqlite_vectors,
            lancedb_embeddings: stored.len(),
            rows_without_vectors,
            missing_in_lancedb,
            orphaned_in_lancedb,
            is_consistent,
        })
    }

    /// Delete embeddings no row refers to. Returns how many were removed.
    #[inline]
    pub async fn cleanup_orphaned_embeddings(&self, orphaned_ids: &[String]) -> Result<usize> {
        let mut cleaned = 0;
        for vector_id in orphaned_ids {
            match self.vector_store.delete_embedding(vector_id).await {
                Ok(true) => cleaned += 1,
                Ok(false) => debug!("Orphaned embedding {} already gone", vector_id),
                Err(e) => warn!("Failed to delete orphaned embedding {}: {}", vector_id, e),
            }
        }
        Ok(cleaned)
    }

    /// Clear the vector_id of rows whose vector is gone, so the next embed
    /// pass regenerates it
    #[inline]
    pub async fn detach_missing_vectors(&self, missing: &[MissingVector]) -> Result<usize> {
        let mut detached = 0;
        for row in missing {
            let cleared = match row.entity {
                EntityType::University => {
                    self.database
                        .clear_university_embedding(row.record_id)
                        .await?
                }
                EntityType::Course => self.database.clear_course_embedding(row.record_id).await?,
            };
            if cleared {
                detached += 1;
            }
        }
        Ok(detached)
    }
}
