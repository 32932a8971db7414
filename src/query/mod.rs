//! Query Module
//!
//! Builds bounded, parameterized queries over one materialized table and runs
//! them on a read-only connection.

pub mod executor;
pub mod ident;
pub mod plan;

pub use executor::{execute, execute_on, open_read_only, table_columns, QueryOutput, ResultRow};
pub use ident::quote_ident;
pub use plan::{AggregateFunction, QueryKind, QueryLimits, QueryPlan, QueryPlanner, Statement};
