//! Query Plan - parameterized query shapes over a single table

use crate::error::{PipelineError, Result};
use crate::query::ident::quote_ident;
use rusqlite::types::Value as SqlValue;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use tracing::warn;

pub const DEFAULT_GROUP_BY: &str = "Region";
pub const DEFAULT_FUNCTION: &str = "SUM";
pub const DEFAULT_AGGREGATE_COLUMN: &str = "Total_Revenue";
pub const DEFAULT_FILTER_COLUMN: &str = "Order_Priority";
pub const DEFAULT_FILTER_VALUE: &str = "H";
pub const DEFAULT_ORDER_BY: &str = "Total_Revenue";
pub const DEFAULT_TOP_LIMIT: u32 = 10;

/// Row caps applied while building plans
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryLimits {
    /// Cap for `select` and `filter`
    pub default_limit: u32,
    /// Upper bound for a caller-supplied `top` limit
    pub max_top_limit: u32,
}

impl Default for QueryLimits {
    fn default() -> Self {
        Self {
            default_limit: 100,
            max_top_limit: 10_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryKind {
    Select,
    Count,
    Aggregate,
    Filter,
    Top,
}

impl QueryKind {
    /// Case-insensitive; unknown kinds fall back to `Select`
    pub fn parse(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "count" => QueryKind::Count,
            "aggregate" => QueryKind::Aggregate,
            "filter" => QueryKind::Filter,
            "top" => QueryKind::Top,
            _ => QueryKind::Select,
        }
    }
}

/// Aggregate functions accepted by the `aggregate` query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggregateFunction {
    Sum,
    Avg,
    Min,
    Max,
    Count,
}

impl AggregateFunction {
    pub fn from_name(name: &str) -> Result<Self> {
        match name.trim().to_ascii_uppercase().as_str() {
            "SUM" => Ok(AggregateFunction::Sum),
            "AVG" => Ok(AggregateFunction::Avg),
            "MIN" => Ok(AggregateFunction::Min),
            "MAX" => Ok(AggregateFunction::Max),
            "COUNT" => Ok(AggregateFunction::Count),
            other => Err(PipelineError::InvalidParameter(format!(
                "unsupported aggregate function: {}",
                other
            ))),
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            AggregateFunction::Sum => "SUM",
            AggregateFunction::Avg => "AVG",
            AggregateFunction::Min => "MIN",
            AggregateFunction::Max => "MAX",
            AggregateFunction::Count => "COUNT",
        }
    }
}

impl fmt::Display for AggregateFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// Resolved, parameter-bound query shape
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryPlan {
    Select {
        limit: u32,
    },
    Count,
    Aggregate {
        group_by: String,
        function: AggregateFunction,
        column: String,
    },
    Filter {
        column: String,
        value: String,
        limit: u32,
    },
    Top {
        order_by: String,
        limit: u32,
    },
}

/// SQL text plus its positional parameters
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

impl QueryPlan {
    pub fn kind(&self) -> QueryKind {
        match self {
            QueryPlan::Select { .. } => QueryKind::Select,
            QueryPlan::Count => QueryKind::Count,
            QueryPlan::Aggregate { .. } => QueryKind::Aggregate,
            QueryPlan::Filter { .. } => QueryKind::Filter,
            QueryPlan::Top { .. } => QueryKind::Top,
        }
    }

    /// Columns the plan names explicitly
    pub fn referenced_columns(&self) -> Vec<&str> {
        match self {
            QueryPlan::Select { .. } | QueryPlan::Count => Vec::new(),
            QueryPlan::Aggregate { group_by, column, .. } => vec![group_by, column],
            QueryPlan::Filter { column, .. } => vec![column],
            QueryPlan::Top { order_by, .. } => vec![order_by],
        }
    }

    pub fn to_statement(&self, table: &str) -> Result<Statement> {
        let table = quote_ident(table)?;

        let statement = match self {
            QueryPlan::Count => Statement {
                sql: format!("SELECT COUNT(*) AS total FROM {}", table),
                params: Vec::new(),
            },
            QueryPlan::Aggregate {
                group_by,
                function,
                column,
            } => {
                let group_by = quote_ident(group_by)?;
                Statement {
                    sql: format!(
                        "SELECT {g}, {f}({c}) AS aggregate_value FROM {t} GROUP BY {g} ORDER BY aggregate_value DESC",
                        g = group_by,
                        f = function.as_sql(),
                        c = quote_ident(column)?,
                        t = table
                    ),
                    params: Vec::new(),
                }
            }
            QueryPlan::Filter {
                column,
                value,
                limit,
            } => Statement {
                sql: format!("SELECT * FROM {} WHERE {} = ?1 LIMIT ?2", table, quote_ident(column)?),
                params: vec![SqlValue::Text(value.clone()), SqlValue::Integer(i64::from(*limit))],
            },
            QueryPlan::Top { order_by, limit } => Statement {
                sql: format!("SELECT * FROM {} ORDER BY {} DESC LIMIT ?1", table, quote_ident(order_by)?),
                params: vec![SqlValue::Integer(i64::from(*limit))],
            },
            QueryPlan::Select { limit } => Statement {
                sql: format!("SELECT * FROM {} LIMIT ?1", table),
                params: vec![SqlValue::Integer(i64::from(*limit))],
            },
        };

        Ok(statement)
    }
}

/// Builds [`QueryPlan`]s from a query kind and loosely typed JSON parameters
#[derive(Debug, Clone, Default)]
pub struct QueryPlanner {
    limits: QueryLimits,
}

impl QueryPlanner {
    pub fn new(limits: QueryLimits) -> Self {
        Self { limits }
    }

    /// Missing or null parameters take their defaults
    pub fn build_plan(&self, kind: QueryKind, params: &Map<String, Value>) -> Result<QueryPlan> {
        let plan = match kind {
            QueryKind::Count => QueryPlan::Count,
            QueryKind::Aggregate => QueryPlan::Aggregate {
                group_by: string_param(params, "groupBy", DEFAULT_GROUP_BY)?,
                function: AggregateFunction::from_name(&string_param(params, "function", DEFAULT_FUNCTION)?)?,
                column: string_param(params, "column", DEFAULT_AGGREGATE_COLUMN)?,
            },
            QueryKind::Filter => QueryPlan::Filter {
                column: string_param(params, "column", DEFAULT_FILTER_COLUMN)?,
                value: string_param(params, "value", DEFAULT_FILTER_VALUE)?,
                limit: self.limits.default_limit,
            },
            QueryKind::Top => {
                let requested = limit_param(params, "limit", DEFAULT_TOP_LIMIT)?;
                let limit = if requested > self.limits.max_top_limit {
                    warn!(
                        "Requested limit {} exceeds maximum {}, clamping",
                        requested, self.limits.max_top_limit
                    );
                    self.limits.max_top_limit
                } else {
                    requested
                };
                QueryPlan::Top {
                    order_by: string_param(params, "orderBy", DEFAULT_ORDER_BY)?,
                    limit,
                }
            }
            QueryKind::Select => QueryPlan::Select {
                limit: self.limits.default_limit,
            },
        };

        Ok(plan)
    }
}

fn string_param(params: &Map<String, Value>, name: &str, default: &str) -> Result<String> {
    match params.get(name) {
        None | Some(Value::Null) => Ok(default.to_string()),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        Some(Value::Bool(b)) => Ok(b.to_string()),
        Some(other) => Err(PipelineError::InvalidParameter(format!(
            "{} must be a string, got {}",
            name, other
        ))),
    }
}

fn limit_param(params: &Map<String, Value>, name: &str, default: u32) -> Result<u32> {
    let invalid = |v: &Value| {
        PipelineError::InvalidParameter(format!("{} must be a non-negative integer, got {}", name, v))
    };

    let value = match params.get(name) {
        None | Some(Value::Null) => return Ok(default),
        Some(value) => value,
    };

    let parsed = match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    parsed
        .map(|n| u32::try_from(n).unwrap_or(u32::MAX))
        .ok_or_else(|| invalid(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_unknown_kind_falls_back_to_select() {
        assert_eq!(QueryKind::parse("COUNT"), QueryKind::Count);
        assert_eq!(QueryKind::parse("histogram"), QueryKind::Select);
        assert_eq!(QueryKind::parse(""), QueryKind::Select);
    }

    #[test]
    fn test_aggregate_defaults() {
        let plan = QueryPlanner::default()
            .build_plan(QueryKind::Aggregate, &Map::new())
            .unwrap();
        assert_eq!(
            plan,
            QueryPlan::Aggregate {
                group_by: "Region".to_string(),
                function: AggregateFunction::Sum,
                column: "Total_Revenue".to_string(),
            }
        );

        let statement = plan.to_statement("sales_records").unwrap();
        assert_eq!(
            statement.sql,
            "SELECT \"Region\", SUM(\"Total_Revenue\") AS aggregate_value FROM \"sales_records\" \
             GROUP BY \"Region\" ORDER BY aggregate_value DESC"
        );
        assert!(statement.params.is_empty());
    }

    #[test]
    fn test_filter_value_is_bound_not_interpolated() {
        let plan = QueryPlanner::default()
            .build_plan(QueryKind::Filter, &params(json!({"value": "H' OR '1'='1"})))
            .unwrap();
        let statement = plan.to_statement("sales_records").unwrap();

        assert_eq!(
            statement.sql,
            "SELECT * FROM \"sales_records\" WHERE \"Order_Priority\" = ?1 LIMIT ?2"
        );
        assert_eq!(
            statement.params,
            vec![SqlValue::Text("H' OR '1'='1".to_string()), SqlValue::Integer(100)]
        );
    }

    #[test]
    fn test_top_limit_parsing_and_clamp() {
        let planner = QueryPlanner::new(QueryLimits {
            default_limit: 100,
            max_top_limit: 50,
        });

        let plan = planner.build_plan(QueryKind::Top, &params(json!({"limit": 3}))).unwrap();
        assert_eq!(plan, QueryPlan::Top { order_by: "Total_Revenue".to_string(), limit: 3 });

        let plan = planner.build_plan(QueryKind::Top, &params(json!({"limit": "7"}))).unwrap();
        assert_eq!(plan, QueryPlan::Top { order_by: "Total_Revenue".to_string(), limit: 7 });

        let plan = planner.build_plan(QueryKind::Top, &params(json!({"limit": 5000}))).unwrap();
        assert_eq!(plan, QueryPlan::Top { order_by: "Total_Revenue".to_string(), limit: 50 });

        let plan = planner.build_plan(QueryKind::Top, &Map::new()).unwrap();
        assert_eq!(plan, QueryPlan::Top { order_by: "Total_Revenue".to_string(), limit: 10 });
    }

    #[test]
    fn test_bad_parameters_are_rejected() {
        let planner = QueryPlanner::default();
        for bad in [json!({"limit": -1}), json!({"limit": 2.5}), json!({"limit": "ten"}), json!({"limit": [1]})] {
            let err = planner.build_plan(QueryKind::Top, &params(bad)).unwrap_err();
            assert!(matches!(err, PipelineError::InvalidParameter(_)));
        }

        let err = planner
            .build_plan(QueryKind::Aggregate, &params(json!({"function": "SUM(1)); DROP TABLE x; --"})))
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidParameter(_)));

        let err = planner
            .build_plan(QueryKind::Filter, &params(json!({"column": {"nested": true}})))
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidParameter(_)));
    }

    #[test]
    fn test_hostile_identifiers_stay_quoted() {
        let plan = QueryPlan::Top {
            order_by: "x\" DESC; DROP TABLE t; --".to_string(),
            limit: 1,
        };
        let statement = plan.to_statement("t").unwrap();
        assert_eq!(
            statement.sql,
            "SELECT * FROM \"t\" ORDER BY \"x\"\" DESC; DROP TABLE t; --\" DESC LIMIT ?1"
        );
    }

    #[test]
    fn test_count_and_select_shapes() {
        let planner = QueryPlanner::default();
        let count = planner.build_plan(QueryKind::Count, &Map::new()).unwrap();
        assert_eq!(
            count.to_statement("t").unwrap().sql,
            "SELECT COUNT(*) AS total FROM \"t\""
        );

        let select = planner.build_plan(QueryKind::Select, &Map::new()).unwrap();
        let statement = select.to_statement("t").unwrap();
        assert_eq!(statement.sql, "SELECT * FROM \"t\" LIMIT ?1");
        assert_eq!(statement.params, vec![SqlValue::Integer(100)]);
    }
}
