//! Schema Inference - Flat text-typed table schema derived from a header

use crate::error::{PipelineError, Result};
use crate::query::ident::{quote_column_name, quote_ident};
use crate::reader::Header;
use itertools::Itertools;
use serde::{Deserialize, Serialize};

/// Declared column type. Every column is stored as text; no numeric or date
/// inference is attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnType {
    Text,
}

impl ColumnType {
    pub fn as_sql(&self) -> &'static str {
        match self {
            ColumnType::Text => "TEXT",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    /// Sanitized (unquoted) column name
    pub name: String,
    pub data_type: ColumnType,
}

/// Table schema; column count and order always match the source header
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub table_name: String,
    pub columns: Vec<ColumnDef>,
}

impl TableSchema {
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn drop_statement(&self) -> Result<String> {
        Ok(format!("DROP TABLE IF EXISTS {}", quote_ident(&self.table_name)?))
    }

    pub fn create_statement(&self) -> Result<String> {
        let columns = self
            .columns
            .iter()
            .map(|c| Ok(format!("{} {}", quote_column_name(&c.name)?, c.data_type.as_sql())))
            .collect::<Result<Vec<_>>>()?;

        Ok(format!(
            "CREATE TABLE {} ({})",
            quote_ident(&self.table_name)?,
            columns.join(", ")
        ))
    }

    /// Positional insert with one `?N` placeholder per column
    pub fn insert_statement(&self) -> Result<String> {
        let columns = self
            .column_names()
            .map(quote_column_name)
            .collect::<Result<Vec<_>>>()?;
        let placeholders = (1..=self.width()).map(|i| format!("?{}", i)).join(", ");

        Ok(format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(&self.table_name)?,
            columns.join(", "),
            placeholders
        ))
    }
}

/// Derives a [`TableSchema`] from a [`Header`]
#[derive(Debug, Clone, Default)]
pub struct SchemaInferer;

impl SchemaInferer {
    pub fn new() -> Self {
        Self
    }

    /// Build the schema for `table_name`.
    ///
    /// Duplicate or blank header names are passed through uncorrected. A single
    /// blank name is a valid column; duplicates are reported by the engine when
    /// the table is created.
    pub fn infer(&self, table_name: &str, header: &Header) -> Result<TableSchema> {
        if header.is_empty() {
            return Err(PipelineError::EmptyInput(format!(
                "header for table {} has no columns",
                table_name
            )));
        }

        let columns = header
            .columns()
            .iter()
            .map(|raw| ColumnDef {
                name: sanitize_column_name(raw),
                data_type: ColumnType::Text,
            })
            .collect();

        Ok(TableSchema {
            table_name: table_name.to_string(),
            columns,
        })
    }
}

/// Trim and replace spaces with underscores: `" Order ID "` becomes `Order_ID`
pub fn sanitize_column_name(raw: &str) -> String {
    raw.trim().replace(' ', "_")
}
