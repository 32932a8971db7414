use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::io::Read;
use std::path::{Path, PathBuf};
use tlq_pipeline::config::PipelineConfig;
use tlq_pipeline::handlers::{DEFAULT_DB_NAME, DEFAULT_TABLE_NAME};
use tlq_pipeline::{IngestRequest, Pipeline, QueryRequest, Response, TransformRequest};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tlq")]
#[command(about = "Ingest, transform and query delimited sales data through SQLite")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load a delimited file into a SQLite table and upload the database
    Ingest {
        /// JSON request file (`-` for stdin); replaces the flags below
        #[arg(long)]
        request: Option<PathBuf>,
        #[arg(long)]
        bucket: Option<String>,
        #[arg(long)]
        key: Option<String>,
        #[arg(long, default_value = DEFAULT_DB_NAME)]
        db_name: String,
        #[arg(long, default_value = DEFAULT_TABLE_NAME)]
        table_name: String,
    },

    /// Run a canned query against a (cached) database
    Query {
        /// JSON request file (`-` for stdin); replaces the flags below
        #[arg(long)]
        request: Option<PathBuf>,
        #[arg(long)]
        bucket: Option<String>,
        #[arg(long)]
        db_key: Option<String>,
        #[arg(long)]
        table_name: Option<String>,
        /// select, count, aggregate, filter or top
        #[arg(long, default_value = "select")]
        query_type: String,
        /// Query parameters as a JSON object, e.g. '{"limit": 3}'
        #[arg(long)]
        params: Option<String>,
    },

    /// Deduplicate, sort and enrich a delimited file
    Transform {
        /// JSON request file (`-` for stdin); replaces the flags below
        #[arg(long)]
        request: Option<PathBuf>,
        #[arg(long)]
        source_bucket: Option<String>,
        #[arg(long)]
        source_key: Option<String>,
        #[arg(long)]
        dest_bucket: Option<String>,
        #[arg(long)]
        dest_key: Option<String>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = PipelineConfig::from_env().context("Failed to load configuration")?;
    info!("Scratch directory: {}", config.scratch_dir.display());
    let pipeline = Pipeline::from_config(config);

    let (output, success) = match args.command {
        Command::Ingest {
            request,
            bucket,
            key,
            db_name,
            table_name,
        } => {
            let flags = json!({
                "bucket": bucket,
                "key": key,
                "dbName": db_name,
                "tableName": table_name,
            });
            respond(request.as_deref(), flags, |r: &IngestRequest| pipeline.ingest(r))?
        }
        Command::Query {
            request,
            bucket,
            db_key,
            table_name,
            query_type,
            params,
        } => {
            let params = params
                .map(|p| serde_json::from_str::<Value>(&p))
                .transpose()
                .context("--params must be a JSON object")?;
            let flags = json!({
                "bucket": bucket,
                "dbKey": db_key,
                "tableName": table_name,
                "queryType": query_type,
                "queryParams": params,
            });
            respond(request.as_deref(), flags, |r: &QueryRequest| pipeline.query(r))?
        }
        Command::Transform {
            request,
            source_bucket,
            source_key,
            dest_bucket,
            dest_key,
        } => {
            let flags = json!({
                "sourceBucket": source_bucket,
                "sourceKey": source_key,
                "destBucket": dest_bucket,
                "destKey": dest_key,
            });
            respond(request.as_deref(), flags, |r: &TransformRequest| pipeline.transform(r))?
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    if !success {
        std::process::exit(1);
    }
    Ok(())
}

/// Build the request, run the handler and return the serialized response
fn respond<Req, Rep, F>(request: Option<&Path>, flags: Value, handler: F) -> Result<(Value, bool)>
where
    Req: DeserializeOwned,
    Rep: Serialize,
    F: FnOnce(&Req) -> Response<Rep>,
{
    let response = match build_request::<Req>(request, flags) {
        Ok(request) => handler(&request),
        Err(e) => Response::Error {
            message: format!("Invalid request: {:#}", e),
        },
    };
    let success = response.is_success();
    Ok((serde_json::to_value(&response)?, success))
}

fn build_request<T: DeserializeOwned>(request: Option<&Path>, flags: Value) -> Result<T> {
    let value = match request {
        Some(path) => {
            let text = if path == Path::new("-") {
                let mut text = String::new();
                std::io::stdin()
                    .read_to_string(&mut text)
                    .context("Failed to read request from stdin")?;
                text
            } else {
                std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read request file {}", path.display()))?
            };
            serde_json::from_str(&text).context("Request is not valid JSON")?
        }
        None => without_nulls(flags),
    };
    Ok(serde_json::from_value(value)?)
}

fn without_nulls(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(_, v)| !v.is_null())
                .collect::<Map<String, Value>>(),
        ),
        other => other,
    }
}
