pub mod cache;
pub mod config;
pub mod error;
pub mod handlers;
pub mod ingestion;
pub mod query;
pub mod reader;
pub mod storage;
pub mod transform;

pub use error::{PipelineError, Result};
pub use handlers::{IngestRequest, Pipeline, QueryRequest, Response, TransformRequest};
