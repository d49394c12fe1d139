use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{json, Map, Value};
use songodb_core::{
    Database, EngineConfig, FileObjectStore, FindOptions, Instance, ListOptions, ScanOptions,
    SongoError, UpdateOptions,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "songodb")]
#[command(about = "SongoDB CLI - MongoDB-style collections on a local object store")]
#[command(version)]
struct Cli {
    /// Root directory of the object store
    #[arg(long, global = true, default_value = "./songodb-data")]
    data_dir: PathBuf,
    /// Instance (top-level key segment)
    #[arg(long, global = true, default_value = "default")]
    instance: String,
    /// Engine config file (overrides SONGODB_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Find one page of documents
    Find {
        db: String,
        collection: String,
        #[arg(long, default_value = "{}")]
        filter: String,
        /// {"sort": [["f", 1]], "skip": n, "limit": n, "pageSize": n, "continuationToken": t}
        #[arg(long)]
        options: Option<String>,
    },
    /// Insert a document or an array of documents
    Insert {
        db: String,
        collection: String,
        docs: String,
    },
    /// Apply update operators to the matches of one page
    Update {
        db: String,
        collection: String,
        filter: String,
        update: String,
        /// {"upsert": true, "pageSize": n, "continuationToken": t}
        #[arg(long)]
        options: Option<String>,
    },
    /// Replace the first match of one page
    Replace {
        db: String,
        collection: String,
        filter: String,
        doc: String,
        #[arg(long)]
        options: Option<String>,
    },
    /// Delete by filter; no filter drops the whole collection
    Delete {
        db: String,
        collection: String,
        #[arg(long)]
        filter: Option<String>,
        #[arg(long)]
        options: Option<String>,
    },
    /// List databases of the instance
    Dbs {
        #[arg(long)]
        filter: Option<String>,
        /// {"nameOnly": true, "pageSize": n, "continuationToken": t}
        #[arg(long)]
        options: Option<String>,
    },
    /// List collections of a database
    Collections {
        db: String,
        #[arg(long)]
        filter: Option<String>,
        #[arg(long)]
        options: Option<String>,
    },
    /// Drop a database and every collection in it
    DropDb { db: String },
    /// Import data from JSON file: { "collection": [documents...], ... }
    Import { file: PathBuf, db: String },
    /// Export every collection of a database to a JSON file
    Export { file: PathBuf, db: String },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => return report(&err),
    };
    init_tracing(&config);

    match run(cli, &config).await {
        Ok(output) => {
            println!("{}", serde_json::to_string_pretty(&output).unwrap_or_default());
            ExitCode::SUCCESS
        }
        Err(err) => report(&err),
    }
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    let config = match path {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::from_env()?,
    };
    Ok(config)
}

/// Logs go to stderr so stdout stays pure JSON
fn init_tracing(config: &EngineConfig) {
    let fallback = config.level().unwrap_or_default();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback.as_str())),
        )
        .with_writer(std::io::stderr)
        .init();
}

/// Print `{ errorMessage, code, status }` and pick the exit code
fn report(err: &anyhow::Error) -> ExitCode {
    let (status, code) = match err.downcast_ref::<SongoError>() {
        Some(e) if e.is_client_error() => (400, e.code()),
        Some(e) => (500, e.code()),
        None => (500, "InternalError"),
    };
    let body = json!({
        "errorMessage": format!("{:#}", err),
        "code": code,
        "status": status,
    });
    eprintln!("{}", body);
    ExitCode::FAILURE
}

async fn run(cli: Cli, config: &EngineConfig) -> Result<Value> {
    let store = FileObjectStore::open(&cli.data_dir)
        .await
        .with_context(|| format!("Failed to open data directory: {}", cli.data_dir.display()))?
        .with_concurrency(config.write_concurrency);
    let instance = Instance::new(cli.instance, Arc::new(store))?;

    let output = match cli.command {
        Commands::Find {
            db,
            collection,
            filter,
            options,
        } => {
            let coll = instance.db(&db)?.collection(&collection)?;
            let options = FindOptions::from_json(&options_json(options.as_deref(), config.page_size)?)?;
            serde_json::to_value(coll.find(&parse_json("filter", &filter)?, &options).await?)?
        }
        Commands::Insert { db, collection, docs } => {
            let coll = instance.db(&db)?.collection(&collection)?;
            match parse_json("docs", &docs)? {
                Value::Array(docs) => serde_json::to_value(coll.insert_many(docs).await?)?,
                doc => serde_json::to_value(coll.insert_one(doc).await?)?,
            }
        }
        Commands::Update {
            db,
            collection,
            filter,
            update,
            options,
        } => {
            let coll = instance.db(&db)?.collection(&collection)?;
            let options = UpdateOptions::from_json(&options_json(options.as_deref(), config.page_size)?)?;
            let result = coll
                .update_many(&parse_json("filter", &filter)?, &parse_json("update", &update)?, &options)
                .await?;
            serde_json::to_value(result)?
        }
        Commands::Replace {
            db,
            collection,
            filter,
            doc,
            options,
        } => {
            let coll = instance.db(&db)?.collection(&collection)?;
            let options = UpdateOptions::from_json(&options_json(options.as_deref(), config.page_size)?)?;
            let result = coll
                .replace_one(&parse_json("filter", &filter)?, &parse_json("doc", &doc)?, &options)
                .await?;
            serde_json::to_value(result)?
        }
        Commands::Delete {
            db,
            collection,
            filter,
            options,
        } => {
            let coll = instance.db(&db)?.collection(&collection)?;
            let filter = optional_json("filter", filter.as_deref())?;
            let options = ScanOptions::from_json(&options_json(options.as_deref(), config.page_size)?)?;
            serde_json::to_value(coll.delete(&filter, &options).await?)?
        }
        Commands::Dbs { filter, options } => {
            let filter = optional_json("filter", filter.as_deref())?;
            let options = ListOptions::from_json(&options_json(options.as_deref(), config.list_page_size)?)?;
            serde_json::to_value(instance.list_databases(&filter, &options).await?)?
        }
        Commands::Collections { db, filter, options } => {
            let filter = optional_json("filter", filter.as_deref())?;
            let options = ListOptions::from_json(&options_json(options.as_deref(), config.list_page_size)?)?;
            serde_json::to_value(instance.db(&db)?.list_collections(&filter, &options).await?)?
        }
        Commands::DropDb { db } => serde_json::to_value(instance.db(&db)?.drop_database().await?)?,
        Commands::Import { file, db } => import_data(&file, &instance.db(&db)?).await?,
        Commands::Export { file, db } => export_data(&file, &instance.db(&db)?, config).await?,
    };
    Ok(output)
}

fn parse_json(name: &str, text: &str) -> std::result::Result<Value, SongoError> {
    serde_json::from_str(text)
        .map_err(|e| SongoError::InvalidArgument(format!("Invalid JSON in {}: {}", name, e)))
}

fn optional_json(name: &str, text: Option<&str>) -> std::result::Result<Value, SongoError> {
    text.map_or(Ok(Value::Null), |t| parse_json(name, t))
}

/// Parse `--options`, filling in the configured page size when none is given
fn options_json(text: Option<&str>, page_size: usize) -> std::result::Result<Value, SongoError> {
    let mut options = match optional_json("options", text)? {
        Value::Null => Map::new(),
        Value::Object(map) => map,
        other => {
            return Err(SongoError::InvalidArgument(format!(
                "options must be an object, got {}",
                other
            )))
        }
    };
    if !options.contains_key("pageSize") && !options.contains_key("MaxKeys") {
        options.insert("pageSize".to_string(), json!(page_size));
    }
    Ok(Value::Object(options))
}

/// Import data from JSON file
/// Format: { "collection_name": [documents...], ... }
async fn import_data(file: &Path, db: &Database<FileObjectStore>) -> Result<Value> {
    let content = fs::read_to_string(file)
        .with_context(|| format!("Failed to read file: {}", file.display()))?;

    let data: Map<String, Value> = serde_json::from_str(&content)
        .map_err(|e| SongoError::InvalidArgument(format!("Invalid JSON in file {}: {}", file.display(), e)))?;

    let mut summary = Map::new();
    for (collection_name, documents) in data {
        let Value::Array(docs) = documents else {
            return Err(SongoError::InvalidArgument(format!(
                "Collection '{}' must be an array",
                collection_name
            ))
            .into());
        };
        let result = db
            .collection(&collection_name)?
            .insert_many(docs)
            .await
            .with_context(|| format!("Failed to insert documents into {}", collection_name))?;
        info!(collection = %collection_name, inserted = result.inserted_count, "imported");
        summary.insert(
            collection_name,
            json!({ "insertedCount": result.inserted_count, "errors": result.errors }),
        );
    }
    Ok(Value::Object(summary))
}

/// Export every collection of a database, following continuation tokens
/// until each listing is exhausted
async fn export_data(file: &Path, db: &Database<FileObjectStore>, config: &EngineConfig) -> Result<Value> {
    let mut names = Vec::new();
    let mut list_options = config.list_options().names_only();
    loop {
        let page = db.list_collections(&Value::Null, &list_options).await?;
        names.extend(page.docs.into_iter().filter_map(|v| v.as_str().map(str::to_string)));
        match page.explain.next_continuation_token() {
            Some(token) if page.explain.is_truncated() => list_options.continuation_token = Some(token.to_string()),
            _ => break,
        }
    }

    let mut output = Map::new();
    let mut total_docs = 0;
    for name in names {
        let coll = db.collection(&name)?;
        let mut options = FindOptions::new().with_scan(config.scan_options());
        let mut docs = Vec::new();
        loop {
            let page = coll
                .find(&Value::Null, &options)
                .await
                .with_context(|| format!("Failed to query collection: {}", name))?;
            docs.extend(page.docs);
            match page.explain.next_continuation_token() {
                Some(token) if page.explain.is_truncated() => {
                    options.scan.continuation_token = Some(token.to_string())
                }
                _ => break,
            }
        }
        info!(collection = %name, exported = docs.len(), "exported");
        total_docs += docs.len();
        output.insert(name, Value::Array(docs));
    }

    let json = serde_json::to_string_pretty(&output).with_context(|| "Failed to serialize to JSON")?;
    fs::write(file, json).with_context(|| format!("Failed to write to file: {}", file.display()))?;

    Ok(json!({ "exportedCount": total_docs, "collections": output.len(), "file": file.display().to_string() }))
}
