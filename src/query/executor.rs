//! Query Executor - runs a plan against a read-only store

use crate::error::{PipelineError, Result};
use crate::query::ident::quote_ident;
use crate::query::plan::QueryPlan;
use rusqlite::types::ValueRef;
use rusqlite::{params_from_iter, Connection, OpenFlags};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::path::Path;
use tracing::{debug, info};

/// Result row: column name to value, in result-set column order
pub type ResultRow = Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryOutput {
    pub columns: Vec<String>,
    pub rows: Vec<ResultRow>,
}

/// Open the store at `path` read-only; concurrent readers are fine
pub fn open_read_only(path: &Path) -> Result<Connection> {
    let flags = OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX;
    Connection::open_with_flags(path, flags).map_err(|e| {
        PipelineError::Query(format!("Failed to open database {}: {}", path.display(), e))
    })
}

/// Run `plan` against `table` in the database file at `path`
pub fn execute(path: &Path, table: &str, plan: &QueryPlan) -> Result<QueryOutput> {
    let conn = open_read_only(path)?;
    info!("Connected to database in READ-ONLY mode");
    execute_on(&conn, table, plan)
}

/// Run `plan` on an open connection. Never writes.
pub fn execute_on(conn: &Connection, table: &str, plan: &QueryPlan) -> Result<QueryOutput> {
    let known = table_columns(conn, table)?;
    for column in plan.referenced_columns() {
        if !known.iter().any(|k| k.eq_ignore_ascii_case(column)) {
            return Err(PipelineError::Query(format!(
                "no such column: {} in table {}",
                column, table
            )));
        }
    }

    let statement = plan.to_statement(table)?;
    info!("Executing SQL: {}", statement.sql);

    let mut stmt = conn
        .prepare(&statement.sql)
        .map_err(|e| PipelineError::Query(format!("Failed to prepare query: {}", e)))?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(str::to_string).collect();

    let mut rows = stmt
        .query(params_from_iter(statement.params.iter()))
        .map_err(|e| PipelineError::Query(format!("Failed to execute query: {}", e)))?;

    let mut results = Vec::new();
    while let Some(row) = rows
        .next()
        .map_err(|e| PipelineError::Query(format!("Failed to read row: {}", e)))?
    {
        let mut out = ResultRow::new();
        for (index, name) in columns.iter().enumerate() {
            let value = row
                .get_ref(index)
                .map_err(|e| PipelineError::Query(format!("Failed to read column {}: {}", name, e)))?;
            out.insert(name.clone(), to_json(value));
        }
        results.push(out);
    }

    info!("Query returned {} rows", results.len());
    Ok(QueryOutput {
        columns,
        rows: results,
    })
}

/// Column names of `table` as the engine reports them
pub fn table_columns(conn: &Connection, table: &str) -> Result<Vec<String>> {
    let sql = format!("SELECT * FROM {} LIMIT 0", quote_ident(table)?);
    let stmt = conn
        .prepare(&sql)
        .map_err(|e| PipelineError::Query(format!("Failed to inspect table {}: {}", table, e)))?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(str::to_string).collect();
    debug!("Table {} has {} columns", table, columns.len());
    Ok(columns)
}

fn to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Number(i.into()),
        ValueRef::Real(f) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            Value::String(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::plan::{AggregateFunction, QueryKind, QueryPlanner};
    use serde_json::json;

    fn sales_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE sales_records ("Region" TEXT, "Order_Priority" TEXT, "Total_Revenue" TEXT);
            INSERT INTO sales_records VALUES ('Asia', 'H', '300.5');
            INSERT INTO sales_records VALUES ('Europe', 'L', '100');
            INSERT INTO sales_records VALUES ('Asia', 'C', '200');
            INSERT INTO sales_records VALUES ('Africa', 'H', '400');
            "#,
        )
        .unwrap();
        conn
    }

    #[test]
    fn test_count() {
        let conn = sales_db();
        let output = execute_on(&conn, "sales_records", &QueryPlan::Count).unwrap();
        assert_eq!(output.columns, vec!["total"]);
        assert_eq!(output.rows[0]["total"], json!(4));
    }

    #[test]
    fn test_aggregate_orders_descending() {
        let conn = sales_db();
        let plan = QueryPlan::Aggregate {
            group_by: "Region".to_string(),
            function: AggregateFunction::Sum,
            column: "Total_Revenue".to_string(),
        };
        let output = execute_on(&conn, "sales_records", &plan).unwrap();

        assert_eq!(output.columns, vec!["Region", "aggregate_value"]);
        let regions: Vec<_> = output.rows.iter().map(|r| r["Region"].clone()).collect();
        assert_eq!(regions, vec![json!("Asia"), json!("Africa"), json!("Europe")]);
        assert_eq!(output.rows[0]["aggregate_value"], json!(500.5));
    }

    #[test]
    fn test_row_keys_follow_column_order() {
        let conn = sales_db();
        let plan = QueryPlanner::default()
            .build_plan(QueryKind::Filter, &Map::new())
            .unwrap();
        let output = execute_on(&conn, "sales_records", &plan).unwrap();

        assert_eq!(output.rows.len(), 2);
        let keys: Vec<_> = output.rows[0].keys().cloned().collect();
        assert_eq!(keys, vec!["Region", "Order_Priority", "Total_Revenue"]);
    }

    #[test]
    fn test_top_respects_limit() {
        let conn = sales_db();
        let plan = QueryPlan::Top {
            order_by: "Total_Revenue".to_string(),
            limit: 3,
        };
        let output = execute_on(&conn, "sales_records", &plan).unwrap();
        let revenue: Vec<_> = output.rows.iter().map(|r| r["Total_Revenue"].clone()).collect();
        assert_eq!(revenue, vec![json!("400"), json!("300.5"), json!("200")]);
    }

    #[test]
    fn test_unknown_table_and_column_are_query_errors() {
        let conn = sales_db();
        let err = execute_on(&conn, "missing", &QueryPlan::Count).unwrap_err();
        assert!(matches!(err, PipelineError::Query(_)));

        let plan = QueryPlan::Top {
            order_by: "Units_Sold".to_string(),
            limit: 3,
        };
        let err = execute_on(&conn, "sales_records", &plan).unwrap_err();
        assert!(matches!(err, PipelineError::Query(_)));
    }

    #[test]
    fn test_value_mapping() {
        let conn = Connection::open_in_memory().unwrap();
        let row = conn
            .query_row("SELECT NULL, 7, 2.5, 'txt', x'6869'", [], |row| {
                Ok((0..5).map(|i| to_json(row.get_ref(i).unwrap())).collect::<Vec<_>>())
            })
            .unwrap();
        assert_eq!(row, vec![Value::Null, json!(7), json!(2.5), json!("txt"), json!("hi")]);
    }

    #[test]
    fn test_column_names_match_case_insensitively() {
        let conn = sales_db();
        let plan = QueryPlan::Filter {
            column: "order_priority".to_string(),
            value: "H".to_string(),
            limit: 100,
        };
        let output = execute_on(&conn, "sales_records", &plan).unwrap();
        assert_eq!(output.rows.len(), 2);
    }
}
