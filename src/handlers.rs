//! Invocation handlers - ingest, query and transform entry points
//!
//! Each handler takes a request, runs to completion on the calling thread and
//! returns a response. Any failure is caught here, logged once and reported as
//! `{"status": "error", "message": ...}`; nothing is retried.

use crate::cache::{CacheState, MaterializationCache};
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::ingestion::{load_blob, open_read_write};
use crate::query::{execute, QueryKind, QueryPlanner, ResultRow};
use crate::reader::RecordReader;
use crate::storage::{LocalObjectStore, Location, ObjectStore};
use crate::transform::{TransformOptions, TransformStats, Transformer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, info_span};
use uuid::Uuid;

pub const DEFAULT_DB_NAME: &str = "tlq.db";
pub const DEFAULT_TABLE_NAME: &str = "sales_records";
pub const DATABASE_PREFIX: &str = "databases/";
pub const TRANSFORMED_PREFIX: &str = "transformed-";

fn default_db_name() -> String {
    DEFAULT_DB_NAME.to_string()
}

fn default_table_name() -> String {
    DEFAULT_TABLE_NAME.to_string()
}

fn default_query_type() -> String {
    "select".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestRequest {
    pub bucket: String,
    pub key: String,
    #[serde(default = "default_db_name")]
    pub db_name: String,
    #[serde(default = "default_table_name")]
    pub table_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    pub bucket: String,
    pub db_key: String,
    pub table_name: String,
    #[serde(default = "default_query_type")]
    pub query_type: String,
    #[serde(default)]
    pub query_params: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformRequest {
    pub source_bucket: String,
    pub source_key: String,
    pub dest_bucket: String,
    #[serde(default)]
    pub dest_key: Option<String>,
    /// Overrides for the key, priority and date column names
    #[serde(default)]
    pub columns: TransformOptions,
}

/// Uniform invocation response, tagged by `status`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Response<T> {
    Success(T),
    Error { message: String },
}

impl<T> Response<T> {
    fn from_result(result: Result<T>) -> Self {
        match result {
            Ok(report) => Response::Success(report),
            Err(e) => {
                error!("ERROR: {}", e);
                Response::Error {
                    message: e.to_string(),
                }
            }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Response::Success(_))
    }

    pub fn success(self) -> Option<T> {
        match self {
            Response::Success(report) => Some(report),
            Response::Error { .. } => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            Response::Success(_) => None,
            Response::Error { message } => Some(message),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestReport {
    pub db_path: String,
    pub db_s3_location: String,
    pub message: String,
    pub file_size_bytes: u64,
    pub table_name: String,
    pub rows_inserted: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryReport {
    pub row_count: usize,
    pub results: Vec<ResultRow>,
    pub message: String,
    pub cache: CacheState,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformReport {
    pub source_location: String,
    pub dest_location: String,
    pub message: String,
    pub stats: TransformStats,
}

/// The three entry points sharing one storage backend and one materialization cache
pub struct Pipeline {
    config: PipelineConfig,
    store: Arc<dyn ObjectStore>,
    cache: MaterializationCache,
    reader: RecordReader,
    planner: QueryPlanner,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, store: Arc<dyn ObjectStore>) -> Self {
        let cache = MaterializationCache::new(store.clone(), config.scratch_dir.clone());
        Self {
            reader: RecordReader::new(config.reader),
            planner: QueryPlanner::new(config.limits),
            config,
            store,
            cache,
        }
    }

    /// Pipeline over the filesystem object store rooted at `config.storage_root`
    pub fn from_config(config: PipelineConfig) -> Self {
        let store = Arc::new(LocalObjectStore::new(config.storage_root.clone()));
        Self::new(config, store)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn cache(&self) -> &MaterializationCache {
        &self.cache
    }

    pub fn ingest(&self, request: &IngestRequest) -> Response<IngestReport> {
        let span = info_span!("ingest", invocation_id = %Uuid::new_v4());
        let _guard = span.enter();
        Response::from_result(self.try_ingest(request))
    }

    pub fn query(&self, request: &QueryRequest) -> Response<QueryReport> {
        let span = info_span!("query", invocation_id = %Uuid::new_v4());
        let _guard = span.enter();
        Response::from_result(self.try_query(request))
    }

    pub fn transform(&self, request: &TransformRequest) -> Response<TransformReport> {
        let span = info_span!("transform", invocation_id = %Uuid::new_v4());
        let _guard = span.enter();
        Response::from_result(self.try_transform(request))
    }

    fn try_ingest(&self, request: &IngestRequest) -> Result<IngestReport> {
        let source = Location::new(&request.bucket, &request.key);
        info!("Downloading file from {}", source);
        let blob = self.store.get_bytes(&source)?;
        let file_size_bytes = blob.len() as u64;
        info!("Downloaded file size: {} bytes", file_size_bytes);

        let db_path = self.local_db_path(&request.db_name)?;
        info!("Creating SQLite database at: {}", db_path.display());
        let mut conn = open_read_write(&db_path)?;
        let summary = load_blob(
            &mut conn,
            &self.reader,
            &request.table_name,
            &blob,
            self.config.progress_interval,
        )?;
        conn.close()
            .map_err(|(_, e)| PipelineError::Load(format!("Failed to close database: {}", e)))?;
        info!("Database creation completed successfully");

        let db_location = Location::new(&request.bucket, format!("{}{}", DATABASE_PREFIX, request.db_name));
        info!("Uploading database to {}", db_location);
        self.store.put_file(&db_location, &db_path)?;

        let db_path = fs::canonicalize(&db_path).unwrap_or(db_path);
        Ok(IngestReport {
            db_path: db_path.display().to_string(),
            db_s3_location: db_location.to_string(),
            message: "SQLite database created and uploaded successfully.".to_string(),
            file_size_bytes,
            table_name: summary.table_name,
            rows_inserted: summary.rows_inserted,
        })
    }

    fn try_query(&self, request: &QueryRequest) -> Result<QueryReport> {
        let location = Location::new(&request.bucket, &request.db_key);
        info!("Starting query execution against {}", location);

        let handle = self.cache.materialize(&location)?;
        let kind = QueryKind::parse(&request.query_type);
        let params = request.query_params.clone().unwrap_or_default();
        let plan = self.planner.build_plan(kind, &params)?;
        let output = execute(&handle.path, &request.table_name, &plan)?;

        Ok(QueryReport {
            row_count: output.rows.len(),
            results: output.rows,
            message: "Query executed successfully.".to_string(),
            cache: handle.state,
        })
    }

    fn try_transform(&self, request: &TransformRequest) -> Result<TransformReport> {
        let source = Location::new(&request.source_bucket, &request.source_key);
        let dest_key = request
            .dest_key
            .clone()
            .unwrap_or_else(|| format!("{}{}", TRANSFORMED_PREFIX, request.source_key));
        let dest = Location::new(&request.dest_bucket, dest_key);
        info!("Starting CSV transformation of {}", source);

        let blob = self.store.get_bytes(&source)?;
        info!("Downloaded {} bytes", blob.len());

        let transformer = Transformer::new(request.columns.clone());
        let (output, stats) = transformer.transform_blob(&self.reader, &blob)?;

        info!("Uploading transformed CSV to {}", dest);
        self.store.put(&dest, &output)?;

        Ok(TransformReport {
            source_location: source.to_string(),
            dest_location: dest.to_string(),
            message: "CSV transformed successfully.".to_string(),
            stats,
        })
    }

    fn local_db_path(&self, db_name: &str) -> Result<PathBuf> {
        let mut components = Path::new(db_name).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => {}
            _ => {
                return Err(PipelineError::InvalidParameter(format!(
                    "dbName must be a plain file name, got {:?}",
                    db_name
                )))
            }
        }

        fs::create_dir_all(&self.config.scratch_dir).map_err(|e| {
            PipelineError::Load(format!(
                "Failed to create scratch directory {}: {}",
                self.config.scratch_dir.display(),
                e
            ))
        })?;
        Ok(self.config.scratch_dir.join(db_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_defaults() {
        let ingest: IngestRequest =
            serde_json::from_value(json!({"bucket": "b", "key": "sales.csv"})).unwrap();
        assert_eq!(ingest.db_name, "tlq.db");
        assert_eq!(ingest.table_name, "sales_records");

        let query: QueryRequest = serde_json::from_value(json!({
            "bucket": "b", "dbKey": "databases/tlq.db", "tableName": "sales_records"
        }))
        .unwrap();
        assert_eq!(query.query_type, "select");
        assert!(query.query_params.is_none());

        let transform: TransformRequest = serde_json::from_value(json!({
            "sourceBucket": "in", "sourceKey": "a.csv", "destBucket": "out",
            "columns": {"keyColumn": "Id"}
        }))
        .unwrap();
        assert_eq!(transform.columns.key_column, "Id");
        assert_eq!(transform.columns.priority_column, "Order Priority");
    }

    #[test]
    fn test_response_shape() {
        let ok: Response<TransformReport> = Response::Success(TransformReport {
            source_location: "s3://in/a.csv".to_string(),
            dest_location: "s3://out/transformed-a.csv".to_string(),
            message: "done".to_string(),
            stats: TransformStats::default(),
        });
        let value = serde_json::to_value(&ok).unwrap();
        assert_eq!(value["status"], "success");
        assert_eq!(value["destLocation"], "s3://out/transformed-a.csv");

        let err: Response<TransformReport> =
            Response::from_result(Err(PipelineError::Transfer("boom".to_string())));
        let value = serde_json::to_value(&err).unwrap();
        assert_eq!(value, json!({"status": "error", "message": "Transfer error: boom"}));
    }
}
