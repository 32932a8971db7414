//! Table Loader - (Re)creates a table and bulk-inserts row records into it

use crate::error::{PipelineError, Result};
use crate::ingestion::schema::{SchemaInferer, TableSchema};
use crate::reader::{Header, RowRecord};
use rusqlite::{params_from_iter, Connection, OpenFlags};
use std::path::Path;
use tracing::{debug, info};

/// Open (or create) the store at `path` for writing
pub fn open_read_write(path: &Path) -> Result<Connection> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_NO_MUTEX;
    Connection::open_with_flags(path, flags).map_err(|e| {
        PipelineError::Load(format!("Failed to open database {}: {}", path.display(), e))
    })
}

pub struct TableLoader<'c> {
    conn: &'c mut Connection,
    inferer: SchemaInferer,
    progress_interval: u64,
}

impl<'c> TableLoader<'c> {
    pub fn new(conn: &'c mut Connection) -> Self {
        Self {
            conn,
            inferer: SchemaInferer::new(),
            progress_interval: 10_000,
        }
    }

    pub fn with_progress_interval(mut self, rows: u64) -> Self {
        self.progress_interval = rows.max(1);
        self
    }

    /// Drop any existing table called `table_name` and create it from `header`
    pub fn create_table(&mut self, table_name: &str, header: &Header) -> Result<TableSchema> {
        let schema = self.inferer.infer(table_name, header)?;
        let drop_sql = schema
            .drop_statement()
            .map_err(|e| PipelineError::Load(e.to_string()))?;
        let create_sql = schema
            .create_statement()
            .map_err(|e| PipelineError::Load(e.to_string()))?;

        self.conn
            .execute(&drop_sql, [])
            .map_err(|e| PipelineError::Load(format!("Failed to drop table {}: {}", table_name, e)))?;
        debug!("Dropped existing table: {}", table_name);

        self.conn.execute(&create_sql, []).map_err(|e| {
            PipelineError::Load(format!("Failed to create table {}: {}", table_name, e))
        })?;
        info!("Created table {} with {} columns", table_name, schema.width());

        Ok(schema)
    }

    /// Insert every row in one transaction and return the number of rows inserted.
    ///
    /// Field `i` binds to column `i`; fields past the schema width are ignored
    /// and missing trailing fields bind NULL. Nothing is visible unless the
    /// single commit at the end succeeds.
    pub fn load_rows<I>(&mut self, schema: &TableSchema, rows: I) -> Result<u64>
    where
        I: IntoIterator<Item = Result<RowRecord>>,
    {
        let insert_sql = schema
            .insert_statement()
            .map_err(|e| PipelineError::Load(e.to_string()))?;
        let width = schema.width();

        let tx = self
            .conn
            .transaction()
            .map_err(|e| PipelineError::Load(format!("Failed to start transaction: {}", e)))?;

        let mut row_count: u64 = 0;
        {
            let mut stmt = tx.prepare_cached(&insert_sql).map_err(|e| {
                PipelineError::Load(format!("Failed to prepare insert: {}", e))
            })?;

            for row in rows {
                let row = row?;
                let values = (0..width).map(|i| row.get(i).map(str::trim));
                stmt.execute(params_from_iter(values)).map_err(|e| {
                    PipelineError::Load(format!("Failed to insert row {}: {}", row_count + 1, e))
                })?;

                row_count += 1;
                if row_count % self.progress_interval == 0 {
                    info!("Processed {} rows", row_count);
                }
            }
        }

        tx.commit()
            .map_err(|e| PipelineError::Load(format!("Failed to commit transaction: {}", e)))?;
        info!("Total rows inserted into {}: {}", schema.table_name, row_count);

        Ok(row_count)
    }
}
