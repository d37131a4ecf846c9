
use super::models::*;
use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use std::collections::HashMap;
use tracing::debug;

const COURSE_WITH_UNIVERSITY_SELECT: &str = r#"
    SELECT c.id, c.university_id, c.name, c.description, c.degree_type, c.starting_date,
           c.duration, c.scholarship, c.fee_structure, c.language_of_study, c.field_of_study,
           c.vector_id, c.embedded_at, c.created_date, c.updated_date,
           u.name AS university_name
    FROM courses c
    JOIN universities u ON u.id = c.university_id
"#;

/// Reorder `rows` to follow `ids`, dropping ids with no row
fn in_requested_order<T>(ids: &[i64], rows: Vec<T>, id_of: impl Fn(&T) -> i64) -> Vec<T> {
    let mut by_id: HashMap<i64, T> = rows.into_iter().map(|row| (id_of(&row), row)).collect();
    ids.iter().filter_map(|id| by_id.remove(id)).collect()
}

pub struct UniversityQueries;

impl UniversityQueries {
    /// Insert or update by (name, country). The existing `vector_id` is kept.
    #[inline]
    pub async fn upsert(pool: &SqlitePool, new_university: NewUniversity) -> Result<University> {
        let now = Utc::now().naive_utc();
        let university = sqlx::query_as::<_, University>(
            r#"
            INSERT INTO universities (name, country, description, created_date, updated_date)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT (name, country) DO UPDATE SET
                description = CASE WHEN excluded.description <> ''
                                   THEN excluded.description
                                   ELSE universities.description END,
                updated_date = excluded.updated_date
            RETURNING *
            "#,
        )
        .bind(new_university.name.trim())
        .bind(new_university.country.trim())
        .bind(new_university.description.trim())
        .bind(now)
        .bind(now)
        .fetch_one(pool)
        .await
        .context("Failed to upsert university")?;

        debug!("Upserted university {} ({})", university.name, university.id);
        Ok(university)
    }

    #[inline]
    pub async fn get_by_id(pool: &SqlitePool, id: i64) -> Result<Option<University>> {
        sqlx::query_as::<_, University>("SELECT * FROM universities WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await
            .context("Failed to get university by id")
    }

    /// Rows for `ids`, in the order requested
    #[inline]
    pub async fn get_by_ids(pool: &SqlitePool, ids: &[i64]) -> Result<Vec<University>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder: QueryBuilder<'_, Sqlite> =
            QueryBuilder::new("SELECT * FROM universities WHERE id IN (");
        let mut separated = builder.separated(", ");
        for id in ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");

        let rows = builder
            .build_query_as::<University>()
            .fetch_all(pool)
            .await
            .context("Failed to get universities by ids")?;

        Ok(in_requested_order(ids, rows, |u| u.id))
    }

    #[inline]
    pub async fn list_all(pool: &SqlitePool) -> Result<Vec<University>> {
        sqlx::query_as::<_, University>("SELECT * FROM universities ORDER BY name, country")
            .fetch_all(pool)
            .await
            .context("Failed to list universities")
    }

    #[inline]
    pub async fn count(pool: &SqlitePool) -> Result<i64> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM universities")
            .fetch_one(pool)
            .await
            .context("Failed to count universities")
    }

    #[inline]
    pub async fn list_missing_embeddings(pool: &SqlitePool) -> Result<Vec<University>> {
        sqlx::query_as::<_, University>(
            "SELECT * FROM universities WHERE vector_id IS NULL ORDER BY id",
        )
        .fetch_all(pool)
        .await
        .context("Failed to list universities missing embeddings")
    }

    #[inline]
    pub async fn list_embedded(pool: &SqlitePool) -> Result<Vec<EmbeddedRow>> {
        sqlx::query_as::<_, EmbeddedRow>(
            "SELECT id, vector_id FROM universities WHERE vector_id IS NOT NULL ORDER BY id",
        )
        .fetch_all(pool)
        .await
        .context("Failed to list embedded universities")
    }

    #[inline]
    pub async fn mark_embedded(pool: &SqlitePool, id: i64, vector_id: &str) -> Result<bool> {
        let now = Utc::now().naive_utc();
        let result =
            sqlx::query("UPDATE universities SET vector_id = ?, embedded_at = ? WHERE id = ?")
                .bind(vector_id)
                .bind(now)
                .bind(id)
                .execute(pool)
                .await
                .context("Failed to mark university embedded")?;
        Ok(result.rows_affected() > 0)
    }

    #[inline]
    pub async fn clear_embedding(pool: &SqlitePool, id: i64) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE universities SET vector_id = NULL, embedded_at = NULL WHERE id = ?",
        )
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to clear university embedding")?;
        Ok(result.rows_affected() > 0)
    }
}

pub struct CourseQueries;

impl CourseQueries {
    /// Insert or update by (university_id, name). The existing `vector_id` is kept.
    #[inline]
    pub async fn upsert(pool: &SqlitePool, new_course: NewCourse) -> Result<Course> {
        let now = Utc::now().naive_utc();
        let fee_structure = new_course
            .fee_structure
            .as_deref()
            .map(str::trim)
            .filter(|fee| !fee.is_empty());

        let course = sqlx::query_as::<_, Course>(
            r#"
            INSERT INTO courses (
                university_id, name, description, degree_type, starting_date, duration,
                scholarship, fee_structure, language_of_study, field_of_study,
                created_date, updated_date
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (university_id, name) DO UPDATE SET
                description = excluded.description,
                degree_type = excluded.degree_type,
                starting_date = excluded.starting_date,
                duration = excluded.duration,
                scholarship = excluded.scholarship,
                fee_structure = excluded.fee_structure,
                language_of_study = excluded.language_of_study,
                field_of_study = excluded.field_of_study,
                updated_date = excluded.updated_date
            RETURNING *
            "#,
        )
        .bind(new_course.university_id)
        .bind(new_course.name.trim())
        .bind(new_course.description.trim())
        .bind(new_course.degree_type.trim())
        .bind(new_course.starting_date.trim())
        .bind(new_course.duration.trim())
        .bind(new_course.scholarship.trim())
        .bind(fee_structure)
        .bind(new_course.language_of_study.trim())
        .bind(new_course.field_of_study.trim())
        .bind(now)
        .bind(now)
        .fetch_one(pool)
        .await
        .context("Failed to upsert course")?;

        debug!("Upserted course {} ({})", course.name, course.id);
        Ok(course)
    }

    #[inline]
    pub async fn get_by_id(pool: &SqlitePool, id: i64) -> Result<Option<CourseWithUniversity>> {
        sqlx::query_as::<_, CourseWithUniversity>(&format!(
            "{COURSE_WITH_UNIVERSITY_SELECT} WHERE c.id = ?"
        ))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get course by id")
    }

    /// Rows for `ids` joined with their university, in the order requested
    #[inline]
    pub async fn get_by_ids(pool: &SqlitePool, ids: &[i64]) -> Result<Vec<CourseWithUniversity>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder: QueryBuilder<'_, Sqlite> =
            QueryBuilder::new(format!("{COURSE_WITH_UNIVERSITY_SELECT} WHERE c.id IN ("));
        let mut separated = builder.separated(", ");
        for id in ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");

        let rows = builder
            .build_query_as::<CourseWithUniversity>()
            .fetch_all(pool)
            .await
            .context("Failed to get courses by ids")?;

        Ok(in_requested_order(ids, rows, |c| c.course.id))
    }

    #[inline]
    pub async fn list_all(pool: &SqlitePool) -> Result<Vec<CourseWithUniversity>> {
        sqlx::query_as::<_, CourseWithUniversity>(&format!(
            "{COURSE_WITH_UNIVERSITY_SELECT} ORDER BY u.name, c.name"
        ))
        .fetch_all(pool)
        .await
        .context("Failed to list courses")
    }

    #[cfg(test)]
    pub async fn list_by_university(pool: &SqlitePool, university_id: i64) -> Result<Vec<Course>> {
        sqlx::query_as::<_, Course>("SELECT * FROM courses WHERE university_id = ? ORDER BY name")
            .bind(university_id)
            .fetch_all(pool)
            .await
            .context("Failed to list courses for university")
    }

    #[inline]
    pub async fn count(pool: &SqlitePool) -> Result<i64> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM courses")
            .fetch_one(pool)
            .await
            .context("Failed to count courses")
    }

    #[inline]
    pub async fn list_missing_embeddings(pool: &SqlitePool) -> Result<Vec<CourseWithUniversity>> {
        sqlx::query_as::<_, CourseWithUniversity>(&format!(
            "{COURSE_WITH_UNIVERSITY_SELECT} WHERE c.vector_id IS NULL ORDER BY c.id"
        ))
        .fetch_all(pool)
        .await
        .context("Failed to list courses missing embeddings")
    }

    #[inline]
    pub async fn list_embedded(pool: &SqlitePool) -> Result<Vec<EmbeddedRow>> {
        sqlx::query_as::<_, EmbeddedRow>(
            "SELECT id, vector_id FROM courses WHERE vector_id IS NOT NULL ORDER BY id",
        )
        .fetch_all(pool)
        .await
        .context("Failed to list embedded courses")
    }

    #[inline]
    pub async fn mark_embedded(pool: &SqlitePool, id: i64, vector_id: &str) -> Result<bool> {
        let now = Utc::now().naive_utc();
        let result = sqlx::query("UPDATE courses SET vector_id = ?, embedded_at = ? WHERE id = ?")
            .bind(vector_id)
            .bind(now)
            .bind(id)
            .execute(pool)
            .await
            .context("Failed to mark course embedded")?;
        Ok(result.rows_affected() > 0)
    }

    #[inline]
    pub async fn clear_embedding(pool: &SqlitePool, id: i64) -> Result<bool> {
        let result =
            sqlx::query("UPDATE courses SET vector_id = NULL, embedded_at = NULL WHERE id = ?")
                .bind(id)
                .execute(pool)
                .await
                .context("Failed to clear course embedding")?;
        Ok(result.rows_affected() > 0)
    }
}

pub struct IngestedFileQueries;

impl IngestedFileQueries {
    /// Record the outcome for `path`, replacing any earlier record
    #[inline]
    pub async fn record(pool: &SqlitePool, file: NewIngestedFile) -> Result<IngestedFile> {
        let now = Utc::now().naive_utc();
        sqlx::query_as::<_, IngestedFile>(
            r#"
            INSERT INTO ingested_files
                (path, content_hash, status, error_message, universities_found, processed_date)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT (path) DO UPDATE SET
                content_hash = excluded.content_hash,
                status = excluded.status,
                error_message = excluded.error_message,
                universities_found = excluded.universities_found,
                processed_date = excluded.processed_date
            RETURNING *
            "#,
        )
        .bind(&file.path)
        .bind(&file.content_hash)
        .bind(file.status)
        .bind(&file.error_message)
        .bind(file.universities_found)
        .bind(now)
        .fetch_one(pool)
        .await
        .with_context(|| format!("Failed to record ingested file {}", file.path))
    }

    #[inline]
    pub async fn get_by_path(pool: &SqlitePool, path: &str) -> Result<Option<IngestedFile>> {
        sqlx::query_as::<_, IngestedFile>("SELECT * FROM ingested_files WHERE path = ?")
            .bind(path)
            .fetch_optional(pool)
            .await
            .context("Failed to get ingested file")
    }

    #[inline]
    pub async fn count(pool: &SqlitePool) -> Result<i64> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM ingested_files")
            .fetch_one(pool)
            .await
            .context("Failed to count ingested files")
    }
}
