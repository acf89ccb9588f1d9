use std::sync::Arc;

use clap::Parser;
use tokio::sync::broadcast;
use tracing_subscriber::{fmt, EnvFilter};
use vectorkb_core::embeddings::{EmbeddingBackend, EmbeddingSettings, TitanEmbeddingClient};
use vectorkb_core::{Chunker, KbConfig};

use vectorkb_server::aws::AwsClients;
use vectorkb_server::http::{start_http_server, HttpState};
use vectorkb_server::subsystems::ingest::{run_ingest_worker, IngestContext};
use vectorkb_server::subsystems::sync::SyncContext;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "vectorkb.toml")]
    config: String,

    #[arg(long)]
    health: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (dev convenience — production uses real env vars)
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Init logging
    fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    // Load config
    let config = match KbConfig::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", args.config, e);
            std::process::exit(1);
        }
    };

    // Connect to DB
    let pool = match vectorkb_core::db::create_pool(&config.database).await {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Failed to connect to database: {}", e);
            std::process::exit(1);
        }
    };

    if args.health {
        match vectorkb_core::db::health_check(&pool).await {
            Ok(v) => println!("✅ PostgreSQL connected: {}", v),
            Err(e) => {
                println!("❌ PostgreSQL connection failed: {}", e);
                std::process::exit(1);
            }
        }

        match vectorkb_core::db::check_pgvector(&pool).await {
            Ok(v) => println!("✅ pgvector version: {}", v),
            Err(e) => {
                println!("❌ pgvector check failed: {}", e);
                std::process::exit(1);
            }
        }

        println!("✅ Knowledge base DB health check passed");
        return Ok(());
    }

    // Schema setup is idempotent
    vectorkb_core::db::init_schema(&pool).await?;

    let (tx, _rx) = broadcast::channel(1);
    let shutdown_tx = tx.clone();

    tokio::spawn(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to listen for Ctrl+C");
        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(());
    });

    let aws = AwsClients::from_config(&config.aws).await;

    let backend: Arc<dyn EmbeddingBackend> = Arc::new(TitanEmbeddingClient::new(
        aws.bedrock.clone(),
        EmbeddingSettings::from(&config.embedding),
    ));

    // Spawn the ingestion worker when a queue is configured
    let sync_ctx = if let Some(queue) = config.queue.clone() {
        let chunker = Chunker::new(&config.chunking)
            .map_err(|e| anyhow::anyhow!("Failed to build chunker: {}", e))?;
        let ctx = IngestContext {
            pool: pool.clone(),
            s3: aws.s3.clone(),
            backend: backend.clone(),
            chunker,
            cognito: config.cognito.clone(),
        };
        tokio::spawn(run_ingest_worker(
            ctx,
            aws.sqs.clone(),
            queue.clone(),
            tx.subscribe(),
        ));

        Some(Arc::new(SyncContext {
            s3: aws.s3.clone(),
            sqs: aws.sqs.clone(),
            queue_url: queue.queue_url,
            default_bucket: config.storage.default_bucket.clone(),
            cognito: config.cognito.clone(),
        }))
    } else {
        tracing::warn!("No queue configured; ingestion worker and /sync disabled");
        None
    };

    if config.http.enabled {
        let state = Arc::new(HttpState {
            pool,
            backend,
            sync: sync_ctx,
        });
        start_http_server(state, &config.http, tx.subscribe()).await?;
    } else {
        // Headless mode: only the ingest worker runs
        let mut shutdown = tx.subscribe();
        let _ = shutdown.recv().await;
    }

    Ok(())
}
