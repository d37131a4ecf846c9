
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct University {
    pub id: i64,
    pub name: String,
    pub country: String,
    pub description: String,
    pub vector_id: Option<String>,
    pub embedded_at: Option<NaiveDateTime>,
    pub created_date: NaiveDateTime,
    pub updated_date: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Course {
    pub id: i64,
    pub university_id: i64,
    pub name: String,
    pub description: String,
    pub degree_type: String,
    pub starting_date: String,
    pub duration: String,
    pub scholarship: String,
    pub fee_structure: Option<String>,
    pub language_of_study: String,
    pub field_of_study: String,
    pub vector_id: Option<String>,
    pub embedded_at: Option<NaiveDateTime>,
    pub created_date: NaiveDateTime,
    pub updated_date: NaiveDateTime,
}

/// A course joined with the name of the university offering it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct CourseWithUniversity {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub course: Course,
    pub university_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct NewUniversity {
    pub name: String,
    pub country: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct NewCourse {
    pub university_id: i64,
    pub name: String,
    pub description: String,
    pub degree_type: String,
    pub starting_date: String,
    pub duration: String,
    pub scholarship: String,
    pub fee_structure: Option<String>,
    pub language_of_study: String,
    pub field_of_study: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
pub enum FileStatus {
    Processed,
    Failed,
}

impl std::fmt::Display for FileStatus {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            FileStatus::Processed => write!(f, "Processed"),
            FileStatus::Failed => write!(f, "Failed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct IngestedFile {
    pub id: i64,
    pub path: String,
    pub content_hash: String,
    pub status: FileStatus,
    pub error_message: Option<String>,
    pub universities_found: i64,
    pub processed_date: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewIngestedFile {
    pub path: String,
    pub content_hash: String,
    pub status: FileStatus,
    pub error_message: Option<String>,
    pub universities_found: i64,
}

/// Row id and vector id of an embedded row
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct EmbeddedRow {
    pub id: i64,
    pub vector_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CatalogCounts {
    pub universities: i64,
    pub courses: i64,
    pub embedded_universities: i64,
    pub embedded_courses: i64,
    pub ingested_files: i64,
}

impl University {
    /// Text sent to the embedding model for this university
    #[inline]
    pub fn embedding_text(&self) -> String {
        format!(
            "University: {}\nCountry: {}\nDescription: {}",
            self.name, self.country, self.description
        )
    }

    #[inline]
    pub fn is_embedded(&self) -> bool {
        self.vector_id.is_some()
    }
}

impl CourseWithUniversity {
    /// Text sent to the embedding model for this course
    #[inline]
    pub fn embedding_text(&self) -> String {
        format!(
            "Course: {}\nUniversity: {}\nField of Study: {}\nDegree Type: {}\nDescription: {}",
            self.course.name,
            self.university_name,
            self.course.field_of_study,
            self.course.degree_type,
            self.course.description
        )
    }
}

impl Course {
    #[inline]
    pub fn is_embedded(&self) -> bool {
        self.vector_id.is_some()
    }
}

impl IngestedFile {
    #[inline]
    pub fn is_processed(&self) -> bool {
        self.status == FileStatus::Processed
    }
}
