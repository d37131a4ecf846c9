
use super::{EmbeddingRecord, EntityType};
use crate::{ScoutError, config::Config};
use arrow::array::{
    Array, FixedSizeListArray, Float32Array, Int64Array, RecordBatchIterator, StringArray,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use futures::TryStreamExt;
use lancedb::{
    Connection, DistanceType, Table,
    index::{Index, vector::IvfPqIndexBuilder},
    query::{ExecutableQuery, QueryBase, Select},
    table::OptimizeAction,
};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, error, info, warn};

const TABLE_NAME: &str = "embeddings";

/// LanceDB needs this many rows to train the IVF_PQ codebooks
pub const MIN_ROWS_FOR_INDEX: u64 = 256;

/// Vector database store using LanceDB for similarity search
pub struct VectorStore {
    connection: Connection,
    table_name: String,
    vector_dimension: usize,
    /// Set when opening dropped a table built for another dimension
    recreated: AtomicBool,
}

/// One nearest-neighbour hit
#[derive(Debug, Clone, PartialEq)]
pub struct VectorMatch {
    pub vector_id: String,
    pub entity_type: EntityType,
    pub record_id: i64,
    pub label: String,
    /// Cosine distance in `[0, 2]`
    pub distance: f32,
    /// `1 - min(distance / 2, 1)`, higher is closer
    pub similarity_score: f32,
}

fn db_error(context: &str, error: impl std::fmt::Display) -> ScoutError {
    ScoutError::Database(format!("{context}: {error}"))
}

/// Quote a string for use inside a LanceDB filter expression
fn sql_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Convert a cosine distance into a similarity score in `[0, 1]`
#[inline]
pub fn similarity_from_distance(distance: f32) -> f32 {
    1.0 - (distance / 2.0).clamp(0.0, 1.0)
}

impl VectorStore {
    /// Open (or create) the vector database under the configured data directory.
    ///
    /// The table's vector width follows `llm.embedding_dimension`. A table
    /// created with another width is dropped and recreated empty.
    #[inline]
    pub async fn new(config: &Config) -> Result<Self, ScoutError> {
        let db_path = config.vector_database_path();
        debug!("Initializing LanceDB at path: {:?}", db_path);

        std::fs::create_dir_all(&db_path).map_err(|e| {
            ScoutError::Database(format!("Failed to create vector database directory: {}", e))
        })?;

        let uri = db_path.display().to_string();

        let connection = match lancedb::connect(&uri).execute().await {
            Ok(conn) => conn,
            Err(e) => {
                error!("Failed to connect to LanceDB: {}", e);

                let error_msg = e.to_string().to_lowercase();
                if error_msg.contains("corrupt") || error_msg.contains("malformed") {
                    warn!("Database corruption detected, attempting recovery");
                    Self::attempt_corruption_recovery(&db_path)?;

                    lancedb::connect(&uri)
                        .execute()
                        .await
                        .map_err(|e| db_error("Failed to connect to LanceDB after recovery", e))?
                } else {
                    return Err(db_error("Failed to connect to LanceDB", e));
                }
            }
        };

        let store = Self {
            connection,
            table_name: TABLE_NAME.to_string(),
            vector_dimension: config.llm.embedding_dimension as usize,
            recreated: AtomicBool::new(false),
        };

        if store.initialize_table().await? {
            store.recreated.store(true, Ordering::SeqCst);
        }

        info!(
            "Vector store initialized with {} dimensions",
            store.vector_dimension
        );
        Ok(store)
    }

    #[inline]
    pub fn vector_dimension(&self) -> usize {
        self.vector_dimension
    }

    /// Whether opening this store replaced an existing table, and therefore
    /// every vector the catalog still refers to. Reported once.
    #[inline]
    pub fn take_recreated(&self) -> bool {
        self.recreated.swap(false, Ordering::SeqCst)
    }

    /// Create the table if needed. Returns `true` when an existing table
    /// was dropped first.
    async fn initialize_table(&self) -> Result<bool, ScoutError> {
        let table_names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| db_error("Failed to list tables", e))?;

        if table_names.contains(&self.table_name) {
            match self.detect_existing_vector_dimension().await {
                Ok(dim) if dim == self.vector_dimension => {
                    debug!("Embeddings table already exists with {} dimensions", dim);
                    return Ok(false);
                }
                Ok(dim) => {
                    warn!(
                        "Embeddings table has {} dimensions but {} are configured, recreating it",
                        dim, self.vector_dimension
                    );
                }
                Err(e) => {
                    warn!("Could not detect vector dimension, recreating table: {}", e);
                }
            }
            self.drop_table_if_exists().await?;
            self.create_table().await?;
            return Ok(true);
        }

        self.create_table().await?;
        Ok(false)
    }

    async fn create_table(&self) -> Result<(), ScoutError> {
        self.connection
            .create_empty_table(&self.table_name, self.create_schema())
            .execute()
            .await
            .map_err(|e| db_error("Failed to create table", e))?;

        info!(
            "Embeddings table created with {} dimensions",
            self.vector_dimension
        );
        Ok(())
    }

    async fn detect_existing_vector_dimension(&self) -> Result<usize, ScoutError> {
        let schema = self
            .open_table()
            .await?
            .schema()
            .await
            .map_err(|e| db_error("Failed to get table schema", e))?;

        for field in schema.fields() {
            if field.name() == "vector" {
                if let DataType::FixedSizeList(_, size) = field.data_type() {
                    return usize::try_from(*size)
                        .map_err(|_| ScoutError::Database(format!("Invalid vector size {size}")));
                }
            }
        }

        Err(ScoutError::Database(
            "Could not find vector column or determine dimension".to_string(),
        ))
    }

    fn create_schema(&self) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    self.vector_dimension as i32,
                ),
                false,
            ),
            Field::new("entity_type", DataType::Utf8, false),
            Field::new("record_id", DataType::Int64, false),
            Field::new("label", DataType::Utf8, false),
            Field::new("created_at", DataType::Utf8, false),
        ]))
    }

    async fn open_table(&self) -> Result<Table, ScoutError> {
        self.connection
            .open_table(&self.table_name)
            .execute()
            .await
            .map_err(|e| db_error("Failed to open table", e))
    }

    /// Store multiple embeddings in a batch
    #[inline]
    pub async fn store_embeddings_batch(
        &self,
        records: &[EmbeddingRecord],
    ) -> Result<(), ScoutError> {
        if records.is_empty() {
            debug!("No embeddings to store");
            return Ok(());
        }

        debug!("Storing batch of {} embeddings", records.len());

        let record_batch = self.create_record_batch(records)?;
        let schema = record_batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(record_batch)), schema);

        self.open_table()
            .await?
            .add(reader)
            .execute()
            .await
            .map_err(|e| db_error("Failed to insert embeddings", e))?;

        info!("Stored {} embeddings", records.len());
        Ok(())
    }

    /// Replace the embedding stored under `record.id`
    #[inline]
    pub async fn upsert_embedding(&self, record: &EmbeddingRecord) -> Result<(), ScoutError> {
        self.open_table()
            .await?
            .delete(&format!("id = {}", sql_literal(&record.id)))
            .await
            .map_err(|e| db_error("Failed to delete previous embedding", e))?;

        self.store_embeddings_batch(std::slice::from_ref(record))
            .await
    }

    fn create_record_batch(&self, records: &[EmbeddingRecord]) -> Result<RecordBatch, ScoutError> {
        let len = records.len();
        let vector_dim = self.vector_dimension;

        let mut ids = Vec::with_capacity(len);
        let mut flat_values = Vec::with_capacity(len * vector_dim);
        let mut entity_types = Vec::with_capacity(len);
        let mut record_ids = Vec::with_capacity(len);
        let mut labels = Vec::with_capacity(len);
        let mut created_ats = Vec::with_capacity(len);

        for record in records {
            if record.vector.len() != vector_dim {
                return Err(ScoutError::Database(format!(
                    "Embedding {} has {} dimensions, expected {}",
                    record.id,
                    record.vector.len(),
                    vector_dim
                )));
            }
            ids.push(record.id.as_str());
            flat_values.extend_from_slice(&record.vector);
            entity_types.push(record.metadata.entity_type.as_str());
            record_ids.push(record.metadata.record_id);
            labels.push(record.metadata.label.as_str());
            created_ats.push(record.metadata.created_at.as_str());
        }

        let field = Arc::new(Field::new("item", DataType::Float32, true));
        let vector_array = FixedSizeListArray::try_new(
            field,
            vector_dim as i32,
            Arc::new(Float32Array::from(flat_values)),
            None,
        )
        .map_err(|e| db_error("Failed to create vector array", e))?;

        let arrays: Vec<Arc<dyn Array>> = vec![
            Arc::new(StringArray::from(ids)),
            Arc::new(vector_array),
            Arc::new(StringArray::from(entity_types)),
            Arc::new(Int64Array::from(record_ids)),
            Arc::new(StringArray::from(labels)),
            Arc::new(StringArray::from(created_ats)),
        ];

        RecordBatch::try_new(self.create_schema(), arrays)
            .map_err(|e| db_error("Failed to create record batch", e))
    }

    /// Nearest neighbours of `query_vector` among rows of `entity`, using
    /// LanceDB's native cosine distance
    #[inline]
    pub async fn search_similar(
        &self,
        query_vector: &[f32],
        entity: EntityType,
        limit: usize,
    ) -> Result<Vec<VectorMatch>, ScoutError> {
        if query_vector.len() != self.vector_dimension {
            return Err(ScoutError::Database(format!(
                "Query vector has {} dimensions, expected {}",
                query_vector.len(),
                self.vector_dimension
            )));
        }

        debug!("Searching {} vectors with limit: {}", entity, limit);

        let mut results = self
            .open_table()
            .await?
            .vector_search(query_vector)
            .map_err(|e| db_error("Failed to create vector search", e))?
            .column("vector")
            .distance_type(DistanceType::Cosine)
            .only_if(format!("entity_type = {}", sql_literal(entity.as_str())))
            .limit(limit)
            .execute()
            .await
            .map_err(|e| db_error("Failed to execute search", e))?;

        let mut matches = Vec::new();
        while let Some(batch) = results
            .try_next()
            .await
            .map_err(|e| db_error("Failed to read result stream", e))?
        {
            matches.extend(Self::parse_search_batch(&batch)?);
        }

        debug!("Found {} {} matches", matches.len(), entity);
        Ok(matches)
    }

    fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray, ScoutError> {
        batch
            .column_by_name(name)
            .ok_or_else(|| ScoutError::Database(format!("Missing {name} column")))?
            .as_any()
            .downcast_ref::<StringArray>()
            .ok_or_else(|| ScoutError::Database(format!("Invalid {name} column type")))
    }

    fn parse_search_batch(batch: &RecordBatch) -> Result<Vec<VectorMatch>, ScoutError> {
        let ids = Self::string_column(batch, "id")?;
        let entity_types = Self::string_column(batch, "entity_type")?;
        let labels = Self::string_column(batch, "label")?;
        let record_ids = batch
            .column_by_name("record_id")
            .ok_or_else(|| ScoutError::Database("Missing record_id column".to_string()))?
            .as_any()
            .downcast_ref::<Int64Array>()
            .ok_or_else(|| ScoutError::Database("Invalid record_id column type".to_string()))?;
        let distances = batch
            .column_by_name("_distance")
            .and_then(|col| col.as_any().downcast_ref::<Float32Array>());

        let mut matches = Vec::with_capacity(batch.num_rows());
        for row in 0..batch.num_rows() {
            let entity_type = entity_types
                .value(row)
                .parse::<EntityType>()
                .map_err(ScoutError::Database)?;
            let distance =
                distances.map_or(0.0, |d| if d.is_null(row) { 0.0 } else { d.value(row) });

            matches.push(VectorMatch {
                vector_id: ids.value(row).to_string(),
                entity_type,
                record_id: record_ids.value(row),
                label: labels.value(row).to_string(),
                distance,
                similarity_score: similarity_from_distance(distance),
            });
        }

        Ok(matches)
    }

    /// Delete a single embedding. Returns whether it existed.
    #[inline]
    pub async fn delete_embedding(&self, vector_id: &str) -> Result<bool, ScoutError> {
        debug!("Deleting embedding with vector_id: {}", vector_id);

        let table = self.open_table().await?;
        let predicate = format!("id = {}", sql_literal(vector_id));

        let existing = table
            .count_rows(Some(predicate.clone()))
            .await
            .map_err(|e| db_error("Failed to count embedding", e))?;
        if existing == 0 {
            return Ok(false);
        }

        table
            .delete(&predicate)
            .await
            .map_err(|e| db_error("Failed to delete embedding", e))?;
        Ok(true)
    }

    /// Number of stored embeddings, optionally restricted to one entity type
    #[inline]
    pub async fn count_embeddings(&self, entity: Option<EntityType>) -> Result<u64, ScoutError> {
        let filter = entity.map(|e| format!("entity_type = {}", sql_literal(e.as_str())));

        let count = self
            .open_table()
            .await?
            .count_rows(filter)
            .await
            .map_err(|e| db_error("Failed to count rows", e))?;

        Ok(count as u64)
    }

    /// Every vector id currently stored
    #[inline]
    pub async fn list_vector_ids(&self) -> Result<Vec<String>, ScoutError> {
        let table = self.open_table().await?;
        let total = table
            .count_rows(None)
            .await
            .map_err(|e| db_error("Failed to count rows", e))?;
        if total == 0 {
            return Ok(Vec::new());
        }

        let mut results = table
            .query()
            .select(Select::columns(&["id"]))
            .limit(total)
            .execute()
            .await
            .map_err(|e| db_error("Failed to query vector ids", e))?;

        let mut ids = Vec::with_capacity(total);
        while let Some(batch) = results
            .try_next()
            .await
            .map_err(|e| db_error("Failed to read result stream", e))?
        {
            let column = Self::string_column(&batch, "id")?;
            ids.extend((0..batch.num_rows()).map(|row| column.value(row).to_string()));
        }

        debug!("Listed {} vector ids", ids.len());
        Ok(ids)
    }

    /// Drop every embedding and recreate the empty table
    #[inline]
    pub async fn reset(&self) -> Result<(), ScoutError> {
        info!("Resetting vector store");
        self.drop_table_if_exists().await?;
        self.create_table().await
    }

    /// Compact the fragments left behind by deletes and small appends, and
    /// fold new rows into the vector index
    #[inline]
    pub async fn optimize(&self) -> Result<(), ScoutError> {
        debug!("Optimizing vector database");

        self.open_table()
            .await?
            .optimize(OptimizeAction::All)
            .await
            .map_err(|e| db_error("Failed to optimize table", e))?;

        info!("Vector database optimization completed");
        Ok(())
    }

    /// Build a cosine IVF_PQ index on the vector column. Skipped while the
    /// table is too small to train one or when an index already exists.
    /// Returns whether an index was built.
    #[inline]
    pub async fn create_vector_index(&self) -> Result<bool, ScoutError> {
        let table = self.open_table().await?;

        let rows = table
            .count_rows(None)
            .await
            .map_err(|e| db_error("Failed to count rows", e))? as u64;
        if rows < MIN_ROWS_FOR_INDEX {
            debug!(
                "Only {} embeddings, need {} before indexing",
                rows, MIN_ROWS_FOR_INDEX
            );
            return Ok(false);
        }

        let indices = table
            .list_indices()
            .await
            .map_err(|e| db_error("Failed to list indices", e))?;
        if indices
            .iter()
            .any(|index| index.columns.iter().any(|column| column == "vector"))
        {
            debug!("Vector index already exists");
            return Ok(false);
        }

        debug!("Creating vector index over {} embeddings", rows);
        table
            .create_index(
                &["vector"],
                Index::IvfPq(IvfPqIndexBuilder::default().distance_type(DistanceType::Cosine)),
            )
            .execute()
            .await
            .map_err(|e| db_error("Failed to create vector index", e))?;

        info!("Vector index created successfully");
        Ok(true)
    }

    fn attempt_corruption_recovery(db_path: &Path) -> Result<(), ScoutError> {
        warn!("Attempting database corruption recovery at {:?}", db_path);

        if db_path.exists() {
            let backup_path = db_path.with_extension("corrupted_backup");
            if let Err(e) = std::fs::rename(db_path, &backup_path) {
                error!("Failed to backup corrupted database: {}", e);
                std::fs::remove_dir_all(db_path)
                    .map_err(|e| db_error("Failed to remove corrupted database", e))?;
            } else {
                info!("Corrupted database backed up to {:?}", backup_path);
            }
        }

        Ok(())
    }

    async fn drop_table_if_exists(&self) -> Result<(), ScoutError> {
        let table_names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| db_error("Failed to list tables for drop", e))?;

        if table_names.contains(&self.table_name) {
            info!("Dropping existing embeddings table");
            self.connection
                .drop_table(&self.table_name)
                .await
                .map_err(|e| db_error("Failed to drop table", e))?;
        }

        Ok(())
    }
}
