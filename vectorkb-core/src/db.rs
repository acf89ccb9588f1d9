//! Database pool and schema management for the vector knowledge base.
//!
//! The `vector_store` table holds one row per document chunk with five
//! embedding columns at three granularities (1024/512/256 dims), each with
//! its own HNSW cosine index. Schema creation is idempotent.

use crate::config::DatabaseConfig;
use sqlx::{postgres::PgPoolOptions, PgPool};

const CREATE_VECTOR_STORE: &str = r#"
CREATE TABLE IF NOT EXISTS vector_store (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    document TEXT NOT NULL,
    embedding_document VECTOR(1024) NOT NULL,
    metadata JSONB NOT NULL,
    embedding_metadata VECTOR(512) NOT NULL,
    provider TEXT NOT NULL,
    embedding_provider VECTOR(256) NOT NULL,
    category TEXT NOT NULL,
    embedding_category VECTOR(256) NOT NULL,
    doc_type TEXT NOT NULL,
    embedding_doc_type VECTOR(256) NOT NULL,
    source_s3_uri TEXT NOT NULL,
    created_at TIMESTAMP WITH TIME ZONE DEFAULT NOW(),
    updated_at TIMESTAMP WITH TIME ZONE DEFAULT NOW()
)
"#;

const VECTOR_INDEXES: &[(&str, &str)] = &[
    ("idx_vector_store_embedding_document", "embedding_document"),
    ("idx_vector_store_embedding_metadata", "embedding_metadata"),
    ("idx_vector_store_embedding_provider", "embedding_provider"),
    ("idx_vector_store_embedding_category", "embedding_category"),
    ("idx_vector_store_embedding_doc_type", "embedding_doc_type"),
];

pub async fn create_pool(config: &DatabaseConfig) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.url)
        .await
}

pub async fn health_check(pool: &PgPool) -> Result<String, sqlx::Error> {
    let row: (String,) = sqlx::query_as("SELECT version()").fetch_one(pool).await?;
    Ok(row.0)
}

pub async fn check_pgvector(pool: &PgPool) -> Result<String, sqlx::Error> {
    let row: (String,) =
        sqlx::query_as("SELECT extversion FROM pg_extension WHERE extname = 'vector'")
            .fetch_one(pool)
            .await?;
    Ok(row.0)
}

/// Create the pgvector extension, the `vector_store` table, and the HNSW
/// similarity indexes. Safe to run on every startup.
pub async fn init_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query("CREATE EXTENSION IF NOT EXISTS vector")
        .execute(pool)
        .await?;

    sqlx::query(CREATE_VECTOR_STORE).execute(pool).await?;

    for (name, column) in VECTOR_INDEXES {
        let stmt = format!(
            "CREATE INDEX IF NOT EXISTS {name} ON vector_store USING hnsw ({column} vector_cosine_ops)"
        );
        sqlx::query(&stmt).execute(pool).await?;
        tracing::debug!(index = name, "Ensured HNSW index");
    }

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_vector_store_source_s3_uri ON vector_store (source_s3_uri)",
    )
    .execute(pool)
    .await?;

    tracing::info!("vector_store schema initialized");
    Ok(())
}
