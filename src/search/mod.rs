// Semantic search service
// Embeds a query, asks LanceDB for the nearest rows, hydrates them from SQLite


use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::SearchConfig;
use crate::database::Database;
use crate::database::lancedb::{EntityType, VectorMatch, VectorStore};
use crate::database::sqlite::{CourseWithUniversity, University};
use crate::llm::{EmbeddingTask, SharedModel, fit_dimension, run_blocking};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchType {
    #[default]
    All,
    Universities,
    Courses,
}

impl SearchType {
    #[inline]
    pub fn includes_universities(self) -> bool {
        matches!(self, SearchType::All | SearchType::Universities)
    }

    #[inline]
    pub fn includes_courses(self) -> bool {
        matches!(self, SearchType::All | SearchType::Courses)
    }
}

impl fmt::Display for SearchType {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            SearchType::All => write!(f, "all"),
            SearchType::Universities => write!(f, "universities"),
            SearchType::Courses => write!(f, "courses"),
        }
    }
}

impl FromStr for SearchType {
    type Err = SearchError;

    #[inline]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "all" => Ok(SearchType::All),
            "universities" | "university" => Ok(SearchType::Universities),
            "courses" | "course" => Ok(SearchType::Courses),
            other => Err(SearchError::InvalidSearchType(other.to_string())),
        }
    }
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("Query must not be empty")]
    EmptyQuery,
    #[error("Invalid search type: {0:?} (expected all, universities or courses)")]
    InvalidSearchType(String),
    #[error("Failed to embed query: {0:#}")]
    Embedding(anyhow::Error),
    #[error("Search failed: {0:#}")]
    Database(anyhow::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UniversityHit {
    pub id: i64,
    pub name: String,
    pub country: String,
    pub description: String,
    pub similarity_score: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseHit {
    pub id: i64,
    pub name: String,
    pub university_name: String,
    pub description: String,
    pub degree_type: String,
    pub field_of_study: String,
    pub starting_date: Option<String>,
    pub duration: Option<String>,
    pub fee_structure: Option<String>,
    pub language_of_study: Option<String>,
    pub similarity_score: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub universities: Vec<UniversityHit>,
    pub courses: Vec<CourseHit>,
}

impl SearchResponse {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.universities.is_empty() && self.courses.is_empty()
    }
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

impl UniversityHit {
    fn from_row(university: University, similarity_score: f32) -> Self {
        Self {
            id: university.id,
            name: university.name,
            country: university.country,
            description: university.description,
            similarity_score,
        }
    }
}

impl CourseHit {
    fn from_row(row: CourseWithUniversity, similarity_score: f32) -> Self {
        let course = row.course;
        Self {
            id: course.id,
            starting_date: non_empty(&course.starting_date),
            duration: non_empty(&course.duration),
            fee_structure: course.fee_structure.as_deref().and_then(non_empty),
            language_of_study: non_empty(&course.language_of_study),
            name: course.name,
            university_name: row.university_name,
            description: course.description,
            degree_type: course.degree_type,
            field_of_study: course.field_of_study,
            similarity_score,
        }
    }
}

/// Semantic search over the catalog. Cheap to clone.
#[derive(Clone)]
pub struct SemanticSearch {
    database: Arc<Database>,
    vector_store: Arc<VectorStore>,
    model: SharedModel,
    config: SearchConfig,
}

impl SemanticSearch {
    #[inline]
    pub fn new(
        database: Arc<Database>,
        vector_store: Arc<VectorStore>,
        model: SharedModel,
        config: SearchConfig,
    ) -> Self {
        Self {
            database,
            vector_store,
            model,
            config,
        }
    }

    #[inline]
    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Search the catalog for `query`.
    ///
    /// `limit` falls back to the configured default and is clamped to
    /// `1..=max_limit`. It applies to each entity type separately.
    #[inline]
    pub async fn search(
        &self,
        query: &str,
        limit: Option<usize>,
        search_type: SearchType,
    ) -> Result<SearchResponse, SearchError> {
        let limit = self.config.clamp_limit(limit);
        debug!(
            "Searching {} with limit {} for {:?}",
            search_type, limit, query
        );

        let vector = self.embed_query(query).await?;

        let mut response = SearchResponse::default();
        if search_type.includes_universities() {
            response.universities = self.search_universities(&vector, limit).await?;
        }
        if search_type.includes_courses() {
            response.courses = self.search_courses(&vector, limit).await?;
        }

        debug!(
            "Search returned {} universities and {} courses",
            response.universities.len(),
            response.courses.len()
        );
        Ok(response)
    }

    /// Embed a user query with the retrieval-query task hint
    #[inline]
    pub async fn embed_query(&self, query: &str) -> Result<Vec<f32>, SearchError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(SearchError::EmptyQuery);
        }

        let model = Arc::clone(&self.model);
        let text = query.to_string();
        let vector = run_blocking(move || model.embed(&text, EmbeddingTask::RetrievalQuery))
            .await
            .map_err(SearchError::Embedding)?;

        Ok(fit_dimension(vector, self.vector_store.vector_dimension()))
    }

    #[inline]
    pub async fn search_universities(
        &self,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<UniversityHit>, SearchError> {
        let matches = self.nearest(vector, EntityType::University, limit).await?;
        let ids: Vec<i64> = matches.iter().map(|m| m.record_id).collect();

        let rows: HashMap<i64, University> = self
            .database
            .get_universities_by_ids(&ids)
            .await
            .map_err(SearchError::Database)?
            .into_iter()
            .map(|row| (row.id, row))
            .collect();

        Ok(hydrate(matches, rows, UniversityHit::from_row))
    }

    #[inline]
    pub async fn search_courses(
        &self,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<CourseHit>, SearchError> {
        let matches = self.nearest(vector, EntityType::Course, limit).await?;
        let ids: Vec<i64> = matches.iter().map(|m| m.record_id).collect();

        let rows: HashMap<i64, CourseWithUniversity> = self
            .database
            .get_courses_by_ids(&ids)
            .await
            .map_err(SearchError::Database)?
            .into_iter()
            .map(|row| (row.course.id, row))
            .collect();

        Ok(hydrate(matches, rows, CourseHit::from_row))
    }

    async fn nearest(
        &self,
        vector: &[f32],
        entity: EntityType,
        limit: usize,
    ) -> Result<Vec<VectorMatch>, SearchError> {
        self.vector_store
            .search_similar(vector, entity, limit)
            .await
            .map_err(|e| SearchError::Database(e.into()))
    }
}

/// Pair vector matches with their rows, keeping vector order and dropping
/// matches whose row no longer exists
fn hydrate<R, H>(
    matches: Vec<VectorMatch>,
    mut rows: HashMap<i64, R>,
    build: impl Fn(R, f32) -> H,
) -> Vec<H> {
    matches
        .into_iter()
        .filter_map(|m| match rows.remove(&m.record_id) {
            Some(row) => Some(build(row, m.similarity_score)),
            None => {
                warn!(
                    "Vector {} points at missing {} {}, skipping",
                    m.vector_id, m.entity_type, m.record_id
                );
                None
            }
        })
        .collect()
}
