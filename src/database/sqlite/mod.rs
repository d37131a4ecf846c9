use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use tracing::{debug, info};

use crate::config::Config;


pub mod models;
pub mod queries;

pub use models::*;
pub use queries::{CourseQueries, IngestedFileQueries, UniversityQueries};

pub type DbPool = Pool<Sqlite>;

/// Structured catalog storage: universities, courses and ingested files
#[derive(Debug, Clone)]
pub struct Database {
    pool: DbPool,
}

impl Database {
    pub async fn new<P: AsRef<Path>>(database_path: P) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(database_path)
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect_with(options)
            .await
            .context("Failed to create database connection pool")?;

        let database = Self { pool };
        database.run_migrations().await?;

        Ok(database)
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("src/database/sqlite/migrations")
            .run(&self.pool)
            .await
            .context("Failed to run schema migration")?;

        debug!("Database migrations completed successfully");
        Ok(())
    }

    /// Open `catalog.db` in the configured data directory, creating it if needed
    pub async fn initialize(config: &Config) -> Result<Self> {
        let config_dir = config.get_base_dir();
        std::fs::create_dir_all(config_dir).with_context(|| {
            format!(
                "Failed to create data directory: {}",
                config_dir.display()
            )
        })?;

        Self::new(config.database_path()).await
    }

    // University operations
    pub async fn upsert_university(&self, university: NewUniversity) -> Result<University> {
        UniversityQueries::upsert(&self.pool, university).await
    }

    pub async fn get_university_by_id(&self, id: i64) -> Result<Option<University>> {
        UniversityQueries::get_by_id(&self.pool, id).await
    }

    pub async fn get_universities_by_ids(&self, ids: &[i64]) -> Result<Vec<University>> {
        UniversityQueries::get_by_ids(&self.pool, ids).await
    }

    pub async fn list_universities(&self) -> Result<Vec<University>> {
        UniversityQueries::list_all(&self.pool).await
    }

    pub async fn count_universities(&self) -> Result<i64> {
        UniversityQueries::count(&self.pool).await
    }

    pub async fn list_universities_missing_embeddings(&self) -> Result<Vec<University>> {
        UniversityQueries::list_missing_embeddings(&self.pool).await
    }

    pub async fn list_embedded_universities(&self) -> Result<Vec<EmbeddedRow>> {
        UniversityQueries::list_embedded(&self.pool).await
    }

    pub async fn mark_university_embedded(&self, id: i64, vector_id: &str) -> Result<bool> {
        UniversityQueries::mark_embedded(&self.pool, id, vector_id).await
    }

    pub async fn clear_university_embedding(&self, id: i64) -> Result<bool> {
        UniversityQueries::clear_embedding(&self.pool, id).await
    }

    // Course operations
    pub async fn upsert_course(&self, course: NewCourse) -> Result<Course> {
        CourseQueries::upsert(&self.pool, course).await
    }

    pub async fn get_course_by_id(&self, id: i64) -> Result<Option<CourseWithUniversity>> {
        CourseQueries::get_by_id(&self.pool, id).await
    }

    pub async fn get_courses_by_ids(&self, ids: &[i64]) -> Result<Vec<CourseWithUniversity>> {
        CourseQueries::get_by_ids(&self.pool, ids).await
    }

    pub async fn list_courses(&self) -> Result<Vec<CourseWithUniversity>> {
        CourseQueries::list_all(&self.pool).await
    }

    pub async fn count_courses(&self) -> Result<i64> {
        CourseQueries::count(&self.pool).await
    }

    pub async fn list_courses_missing_embeddings(&self) -> Result<Vec<CourseWithUniversity>> {
        CourseQueries::list_missing_embeddings(&self.pool).await
    }

    pub async fn list_embedded_courses(&self) -> Result<Vec<EmbeddedRow>> {
        CourseQueries::list_embedded(&self.pool).await
    }

    pub async fn mark_course_embedded(&self, id: i64, vector_id: &str) -> Result<bool> {
        CourseQueries::mark_embedded(&self.pool, id, vector_id).await
    }

    pub async fn clear_course_embedding(&self, id: i64) -> Result<bool> {
        CourseQueries::clear_embedding(&self.pool, id).await
    }

    // Ingested file operations
    pub async fn record_ingested_file(&self, file: NewIngestedFile) -> Result<IngestedFile> {
        IngestedFileQueries::record(&self.pool, file).await
    }

    pub async fn get_ingested_file(&self, path: &str) -> Result<Option<IngestedFile>> {
        IngestedFileQueries::get_by_path(&self.pool, path).await
    }

    /// Row counts for status reporting
    pub async fn counts(&self) -> Result<CatalogCounts> {
        let embedded_universities = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM universities WHERE vector_id IS NOT NULL",
        )
        .fetch_one(&self.pool)
        .await
        .context("Failed to count embedded universities")?;
        let embedded_courses =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM courses WHERE vector_id IS NOT NULL")
                .fetch_one(&self.pool)
                .await
                .context("Failed to count embedded courses")?;

        Ok(CatalogCounts {
            universities: self.count_universities().await?,
            courses: self.count_courses().await?,
            embedded_universities,
            embedded_courses,
            ingested_files: IngestedFileQueries::count(&self.pool).await?,
        })
    }

    /// Forget every recorded vector id. Returns the number of rows detached.
    pub async fn clear_all_embeddings(&self) -> Result<u64> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction")?;
        let mut detached = 0;
        for table in ["universities", "courses"] {
            detached += sqlx::query(&format!(
                "UPDATE {table} SET vector_id = NULL, embedded_at = NULL WHERE vector_id IS NOT NULL"
            ))
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to clear {table} embeddings"))?
            .rows_affected();
        }
        tx.commit()
            .await
            .context("Failed to commit embedding reset")?;

        info!("Detached {} catalog rows from their vectors", detached);
        Ok(detached)
    }

    /// Delete every row. The schema stays in place.
    pub async fn reset(&self) -> Result<()> {
        info!("Deleting all catalog rows");

        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin reset transaction")?;
        for table in ["courses", "universities", "ingested_files"] {
            sqlx::query(&format!("DELETE FROM {table}"))
                .execute(&mut *tx)
                .await
                .with_context(|| format!("Failed to clear {table}"))?;
        }
        tx.commit()
            .await
            .context("Failed to commit reset transaction")?;

        debug!("Catalog reset completed");
        Ok(())
    }
}
