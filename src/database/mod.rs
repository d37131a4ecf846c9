// Database module
// SQLite holds the catalog rows, LanceDB holds their embeddings

pub mod lancedb;
pub mod sqlite;

pub use sqlite::*;
