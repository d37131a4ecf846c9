// LanceDB vector database module
// Holds one embedding per university or course row, keyed by the row's vector_id


pub mod vector_store;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub use vector_store::{VectorMatch, VectorStore};

/// Which catalog table an embedding belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    University,
    Course,
}

impl EntityType {
    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            EntityType::University => "university",
            EntityType::Course => "course",
        }
    }
}

impl fmt::Display for EntityType {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = String;

    #[inline]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "university" => Ok(EntityType::University),
            "course" => Ok(EntityType::Course),
            other => Err(format!("Unknown entity type: {other}")),
        }
    }
}

/// Embedding record stored in LanceDB
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    /// The `vector_id` stored on the SQLite row
    pub id: String,
    pub vector: Vec<f32>,
    pub metadata: EntityMetadata,
}

/// Metadata stored alongside an embedding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityMetadata {
    pub entity_type: EntityType,
    /// Primary key of the row in its SQLite table
    pub record_id: i64,
    /// University or course name, for debugging and status output
    pub label: String,
    pub created_at: String,
}

impl EmbeddingRecord {
    #[inline]
    pub fn new(
        id: impl Into<String>,
        vector: Vec<f32>,
        entity_type: EntityType,
        record_id: i64,
        label: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            vector,
            metadata: EntityMetadata {
                entity_type,
                record_id,
                label: label.into(),
                created_at: Utc::now().to_rfc3339(),
            },
        }
    }
}

/// Fresh id for a new embedding
#[inline]
pub fn new_vector_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
