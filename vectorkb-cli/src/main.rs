//! vectorkb-cli — exercise the knowledge base HTTP API from the shell
//!
//! # Subcommands
//! - `search <query>` — run any of the four search types against POST /search
//! - `sync`           — list an S3 prefix and queue documents via POST /sync
//! - `status`         — show server health

use clap::{Parser, Subcommand, ValueEnum};
use serde::Deserialize;

const DEFAULT_SERVER: &str = "http://127.0.0.1:8750";
const DEFAULT_K: u32 = 3;

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Debug, Parser)]
#[command(
    name = "vectorkb-cli",
    version,
    about = "Multi-vector knowledge base search and sync CLI"
)]
struct Cli {
    /// Server URL (overrides VECTORKB_HTTP_URL env var)
    #[arg(long, env = "VECTORKB_HTTP_URL", default_value = DEFAULT_SERVER)]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SearchTypeArg {
    ContentSimilarity,
    MetadataSimilarity,
    HybridSimilarity,
    FilterAndSearch,
}

impl SearchTypeArg {
    fn as_str(&self) -> &'static str {
        match self {
            SearchTypeArg::ContentSimilarity => "content_similarity",
            SearchTypeArg::MetadataSimilarity => "metadata_similarity",
            SearchTypeArg::HybridSimilarity => "hybrid_similarity",
            SearchTypeArg::FilterAndSearch => "filter_and_search",
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FilterTypeArg {
    Provider,
    Category,
    Type,
}

impl FilterTypeArg {
    fn as_str(&self) -> &'static str {
        match self {
            FilterTypeArg::Provider => "provider",
            FilterTypeArg::Category => "category",
            FilterTypeArg::Type => "type",
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Search the knowledge base
    Search {
        /// Query text (used as metadata_query for metadata_similarity)
        query: String,

        /// Search type to dispatch
        #[arg(long, value_enum, default_value = "content-similarity")]
        search_type: SearchTypeArg,

        /// Number of results to return (1-100)
        #[arg(short, long, default_value_t = DEFAULT_K)]
        k: u32,

        /// Metadata query for hybrid_similarity
        #[arg(long)]
        metadata_query: Option<String>,

        /// Content weight for hybrid_similarity (must sum to 1.0 with metadata weight)
        #[arg(long)]
        content_weight: Option<f64>,

        /// Metadata weight for hybrid_similarity
        #[arg(long)]
        metadata_weight: Option<f64>,

        /// Filter field for filter_and_search
        #[arg(long, value_enum)]
        filter_type: Option<FilterTypeArg>,

        /// Filter value for filter_and_search
        #[arg(long)]
        filter_value: Option<String>,

        /// Print the raw response envelope as JSON
        #[arg(long)]
        json: bool,
    },

    /// Queue an S3 prefix for ingestion
    Sync {
        /// Bucket to list (falls back to the server's configured default)
        #[arg(long)]
        bucket: Option<String>,

        /// Key prefix to list under
        #[arg(long, default_value = "")]
        prefix: String,

        /// JWT to attach to the request and queued messages
        #[arg(long, env = "VECTORKB_JWT", hide_env_values = true)]
        token: Option<String>,
    },

    /// Show server status
    Status,
}

// ============================================================================
// API Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct SearchHit {
    document: String,
    source_s3_uri: String,
    similarity_score: f64,
    content_score: Option<f64>,
    metadata_score: Option<f64>,
    filter_score: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct SearchEnvelope {
    search_type: String,
    total_results: usize,
    execution_time_ms: u64,
    results: Vec<SearchHit>,
}

// ============================================================================
// Request Body Construction
// ============================================================================

struct SearchArgs {
    query: String,
    search_type: SearchTypeArg,
    k: u32,
    metadata_query: Option<String>,
    content_weight: Option<f64>,
    metadata_weight: Option<f64>,
    filter_type: Option<FilterTypeArg>,
    filter_value: Option<String>,
}

/// Build the POST /search body. The positional query maps to whichever
/// field the selected search type expects.
fn build_search_body(args: &SearchArgs) -> serde_json::Value {
    let mut obj = serde_json::Map::new();
    obj.insert(
        "search_type".to_string(),
        args.search_type.as_str().into(),
    );
    obj.insert("k".to_string(), args.k.into());

    match args.search_type {
        SearchTypeArg::MetadataSimilarity => {
            obj.insert("metadata_query".to_string(), args.query.clone().into());
        }
        _ => {
            obj.insert("query".to_string(), args.query.clone().into());
        }
    }

    if let Some(mq) = &args.metadata_query {
        obj.insert("metadata_query".to_string(), mq.clone().into());
    }
    if let Some(w) = args.content_weight {
        obj.insert("content_weight".to_string(), w.into());
    }
    if let Some(w) = args.metadata_weight {
        obj.insert("metadata_weight".to_string(), w.into());
    }
    if let Some(ft) = args.filter_type {
        obj.insert("filter_type".to_string(), ft.as_str().into());
    }
    if let Some(fv) = &args.filter_value {
        obj.insert("filter_value".to_string(), fv.clone().into());
    }

    serde_json::Value::Object(obj)
}

// ============================================================================
// HTTP Client Calls
// ============================================================================

fn do_search(server: &str, args: SearchArgs, json_output: bool) -> anyhow::Result<()> {
    let client = reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(60))
        .build()?;

    let url = format!("{}/search", server);
    let body = build_search_body(&args);

    let resp = match client.post(&url).json(&body).send() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("vectorkb-cli: connection failed to {}: {}", url, e);
            std::process::exit(1);
        }
    };

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().unwrap_or_default();
        eprintln!("vectorkb-cli: server returned {}: {}", status, body);
        std::process::exit(1);
    }

    if json_output {
        let envelope: serde_json::Value = resp.json()?;
        println!("{}", serde_json::to_string_pretty(&envelope)?);
        return Ok(());
    }

    let envelope: SearchEnvelope = match resp.json() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("vectorkb-cli: failed to parse search response: {}", e);
            std::process::exit(1);
        }
    };

    if envelope.results.is_empty() {
        eprintln!("No results found for: {}", args.query);
        return Ok(());
    }

    println!(
        "{} results ({}, {}ms)\n",
        envelope.total_results, envelope.search_type, envelope.execution_time_ms
    );
    for (rank, hit) in envelope.results.iter().enumerate() {
        println!("{}. {}  [{:.3}]", rank + 1, hit.source_s3_uri, hit.similarity_score);
        let mut components = Vec::new();
        if let Some(s) = hit.content_score {
            components.push(format!("content {:.3}", s));
        }
        if let Some(s) = hit.metadata_score {
            components.push(format!("metadata {:.3}", s));
        }
        if let Some(s) = hit.filter_score {
            components.push(format!("filter {:.3}", s));
        }
        if !components.is_empty() {
            println!("   scores: {}", components.join(", "));
        }
        let preview: String = hit.document.chars().take(200).collect();
        println!("   {}\n", preview.replace('\n', " "));
    }

    Ok(())
}

fn do_sync(
    server: &str,
    bucket: Option<String>,
    prefix: String,
    token: Option<String>,
) -> anyhow::Result<()> {
    let client = reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(120))
        .build()?;

    let url = format!("{}/sync", server);
    let mut body = serde_json::json!({ "s3_prefix": prefix });
    if let Some(bucket) = bucket {
        body["s3_bucket"] = bucket.into();
    }
    if let Some(token) = token {
        body["jwt_token"] = token.into();
    }

    let resp = match client.post(&url).json(&body).send() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("vectorkb-cli: connection failed to {}: {}", url, e);
            std::process::exit(1);
        }
    };

    let status = resp.status();
    let envelope: serde_json::Value = resp.json().unwrap_or_default();

    if !status.is_success() {
        eprintln!(
            "vectorkb-cli: sync failed (HTTP {}): {}",
            status,
            envelope["message"].as_str().unwrap_or("unknown error")
        );
        std::process::exit(1);
    }

    println!(
        "{} ({} files queued)",
        envelope["message"].as_str().unwrap_or("sync complete"),
        envelope["files_queued"].as_u64().unwrap_or(0)
    );
    if let Some(location) = envelope["s3_location"].as_str() {
        println!("Location: {}", location);
    }

    Ok(())
}

/// Show the server status by calling GET /health.
fn do_status(server: &str) -> anyhow::Result<()> {
    let client = reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(10))
        .build()?;

    let url = format!("{}/health", server);
    let resp = client.get(&url).send();

    match resp {
        Ok(r) if r.status().is_success() => {
            let body: serde_json::Value = r.json().unwrap_or_default();
            println!("Server:     {}", body["status"].as_str().unwrap_or("unknown"));
            println!("Version:    {}", body["version"].as_str().unwrap_or("?"));
            println!("PostgreSQL: {}", body["postgresql"].as_str().unwrap_or("?"));
            println!("pgvector:   {}", body["pgvector"].as_str().unwrap_or("?"));
        }
        Ok(r) => {
            let status = r.status();
            eprintln!("vectorkb-cli: server unhealthy (HTTP {})", status);
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("vectorkb-cli: cannot reach {} — {}", url, e);
            std::process::exit(1);
        }
    }

    Ok(())
}

// ============================================================================
// Main
// ============================================================================

fn main() {
    let cli = Cli::parse();
    let server = cli.server.trim_end_matches('/').to_string();

    let result = match cli.command {
        Commands::Search {
            query,
            search_type,
            k,
            metadata_query,
            content_weight,
            metadata_weight,
            filter_type,
            filter_value,
            json,
        } => do_search(
            &server,
            SearchArgs {
                query,
                search_type,
                k,
                metadata_query,
                content_weight,
                metadata_weight,
                filter_type,
                filter_value,
            },
            json,
        ),
        Commands::Sync {
            bucket,
            prefix,
            token,
        } => do_sync(&server, bucket, prefix, token),
        Commands::Status => do_status(&server),
    };

    if let Err(e) = result {
        eprintln!("vectorkb-cli: {}", e);
        std::process::exit(1);
    }
}

// ============================================================================
// Tests
// ============================================================================
