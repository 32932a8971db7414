//! Ingestion Module
//!
//! Turns a delimited text blob into a relational table:
//! - Schema inference from the header (every column stored as text)
//! - Destructive table (re)creation
//! - Single-transaction bulk insert

pub mod loader;
pub mod schema;

pub use loader::{open_read_write, TableLoader};
pub use schema::{sanitize_column_name, ColumnDef, ColumnType, SchemaInferer, TableSchema};

use crate::error::Result;
use crate::reader::RecordReader;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Outcome of loading one file into one table
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IngestionSummary {
    pub table_name: String,
    pub columns: usize,
    pub rows_inserted: u64,
}

/// Parse `blob`, recreate `table_name` from its header and load every row
pub fn load_blob(
    conn: &mut Connection,
    reader: &RecordReader,
    table_name: &str,
    blob: &[u8],
    progress_interval: u64,
) -> Result<IngestionSummary> {
    let (header, records) = reader.parse(blob)?;
    info!("CSV headers: {}", header.columns().join(","));
    info!("Number of columns: {}", header.len());

    let mut loader = TableLoader::new(conn).with_progress_interval(progress_interval);
    let schema = loader.create_table(table_name, &header)?;
    let rows_inserted = loader.load_rows(&schema, records)?;

    Ok(IngestionSummary {
        table_name: table_name.to_string(),
        columns: schema.width(),
        rows_inserted,
    })
}
