//! Transactional writes to the vector_store table.
//!
//! Re-ingesting a document replaces every row carrying its source URI in a
//! single transaction, so concurrent searches observe either the old chunk
//! set or the new one, never a mix.

use pgvector::Vector;
use sqlx::PgPool;
use uuid::Uuid;
use vectorkb_core::KbError;

/// One fully-embedded chunk ready for insertion.
#[derive(Debug, Clone)]
pub struct ChunkRow {
    pub document: String,
    pub embedding_document: Vector,
    pub metadata: serde_json::Value,
    pub embedding_metadata: Vector,
    pub provider: String,
    pub embedding_provider: Vector,
    pub category: String,
    pub embedding_category: Vector,
    pub doc_type: String,
    pub embedding_doc_type: Vector,
}

#[derive(Debug, Clone, Copy)]
pub struct ReplaceOutcome {
    pub deleted: u64,
    pub inserted: usize,
}

const INSERT_CHUNK: &str = "
    INSERT INTO vector_store (
        id, document, embedding_document, metadata, embedding_metadata,
        provider, embedding_provider, category, embedding_category,
        doc_type, embedding_doc_type, source_s3_uri
    )
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
";

/// Delete all rows for `source_s3_uri`, then insert the new chunk set.
/// Both steps share one transaction; any failure rolls the whole thing back.
pub async fn replace_document_chunks(
    pool: &PgPool,
    source_s3_uri: &str,
    chunks: &[ChunkRow],
) -> Result<ReplaceOutcome, KbError> {
    let mut tx = pool.begin().await?;

    let deleted = sqlx::query("DELETE FROM vector_store WHERE source_s3_uri = $1")
        .bind(source_s3_uri)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    for chunk in chunks {
        sqlx::query(INSERT_CHUNK)
            .bind(Uuid::new_v4())
            .bind(&chunk.document)
            .bind(&chunk.embedding_document)
            .bind(&chunk.metadata)
            .bind(&chunk.embedding_metadata)
            .bind(&chunk.provider)
            .bind(&chunk.embedding_provider)
            .bind(&chunk.category)
            .bind(&chunk.embedding_category)
            .bind(&chunk.doc_type)
            .bind(&chunk.embedding_doc_type)
            .bind(source_s3_uri)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;

    tracing::info!(
        source = source_s3_uri,
        deleted,
        inserted = chunks.len(),
        "Replaced document chunks"
    );

    Ok(ReplaceOutcome {
        deleted,
        inserted: chunks.len(),
    })
}
