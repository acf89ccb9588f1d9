//! Ingestion worker — drains the document queue and runs the pipeline.
//!
//! Each queue message names one S3 object. Processing downloads the object
//! and its companion `.metadata.json`, chunks the text, generates the full
//! embedding set (document 1024, consolidated metadata 512, provider /
//! category / doc_type fields 256 each), and replaces the document's rows in
//! one transaction.
//!
//! Message isolation: a failed message never blocks the rest of the batch.
//! Validation failures are poison (the message is deleted so it cannot loop
//! forever); transient AWS or database failures leave the message for SQS
//! redelivery.

use std::sync::Arc;
use std::time::Duration;

use aws_sdk_s3::error::ProvideErrorMetadata;
use pgvector::Vector;
use sqlx::PgPool;
use tokio::sync::broadcast;
use vectorkb_core::auth::{self, CognitoConfig};
use vectorkb_core::config::QueueConfig;
use vectorkb_core::embeddings::EmbeddingBackend;
use vectorkb_core::metadata::METADATA_SUFFIX;
use vectorkb_core::models::IngestMessage;
use vectorkb_core::{
    parse_s3_uri, Chunker, DocumentMetadata, KbError, DOCUMENT_DIMENSIONS, FIELD_DIMENSIONS,
    METADATA_DIMENSIONS,
};

use crate::subsystems::store::{replace_document_chunks, ChunkRow, ReplaceOutcome};

/// Pause after a failed receive before polling again
const RECEIVE_ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// Everything the worker needs to process one document.
pub struct IngestContext {
    pub pool: PgPool,
    pub s3: aws_sdk_s3::Client,
    pub backend: Arc<dyn EmbeddingBackend>,
    pub chunker: Chunker,
    pub cognito: Option<CognitoConfig>,
}

/// Long-poll the queue until shutdown fires.
pub async fn run_ingest_worker(
    ctx: IngestContext,
    sqs: aws_sdk_sqs::Client,
    queue: QueueConfig,
    mut shutdown: broadcast::Receiver<()>,
) {
    tracing::info!(queue_url = %queue.queue_url, "Ingest worker started");

    loop {
        let receive = sqs
            .receive_message()
            .queue_url(&queue.queue_url)
            .wait_time_seconds(queue.wait_time_seconds)
            .max_number_of_messages(queue.max_messages)
            .send();

        tokio::select! {
            _ = shutdown.recv() => {
                tracing::info!("Ingest worker shutting down");
                break;
            }
            received = receive => {
                match received {
                    Ok(output) => {
                        for message in output.messages.unwrap_or_default() {
                            handle_message(&ctx, &sqs, &queue.queue_url, message).await;
                        }
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to receive queue messages");
                        tokio::time::sleep(RECEIVE_ERROR_BACKOFF).await;
                    }
                }
            }
        }
    }
}

async fn handle_message(
    ctx: &IngestContext,
    sqs: &aws_sdk_sqs::Client,
    queue_url: &str,
    message: aws_sdk_sqs::types::Message,
) {
    let receipt = message.receipt_handle.clone();
    let body = message.body.unwrap_or_default();

    let outcome = process_message(ctx, &body).await;

    let delete = match outcome {
        Ok(report) => {
            tracing::info!(
                deleted = report.deleted,
                inserted = report.inserted,
                "Document processed"
            );
            true
        }
        Err(e) if is_poison(&e) => {
            tracing::error!(error = %e, "Dropping unprocessable message");
            true
        }
        Err(e) => {
            tracing::error!(error = %e, "Document processing failed, leaving for retry");
            false
        }
    };

    if delete {
        if let Some(receipt) = receipt {
            if let Err(e) = sqs
                .delete_message()
                .queue_url(queue_url)
                .receipt_handle(receipt)
                .send()
                .await
            {
                tracing::error!(error = %e, "Failed to delete queue message");
            }
        }
    }
}

/// Validation failures are poison: redelivery would fail identically, so
/// the message is deleted rather than cycling through to the dead-letter
/// queue. Everything else is treated as transient and left for redelivery.
fn is_poison(error: &KbError) -> bool {
    matches!(error, KbError::Validation(_))
}

async fn process_message(ctx: &IngestContext, body: &str) -> Result<ReplaceOutcome, KbError> {
    let message: IngestMessage = serde_json::from_str(body)
        .map_err(|e| KbError::validation(format!("Invalid queue message body: {}", e)))?;

    if message.s3_uri.trim().is_empty() {
        return Err(KbError::validation("s3_uri parameter is required"));
    }

    // Claims feed the audit trail only; a bad token does not block ingestion
    if let (Some(cognito), Some(token)) = (&ctx.cognito, &message.jwt_token) {
        match auth::validate_token(token, cognito) {
            Ok(claims) => {
                tracing::info!(user = ?claims.sub, s3_uri = %message.s3_uri, "Processing document")
            }
            Err(e) => {
                tracing::warn!(error = %e, s3_uri = %message.s3_uri, "Ignoring invalid token claims")
            }
        }
    } else {
        tracing::info!(s3_uri = %message.s3_uri, "Processing document");
    }

    process_document(ctx, &message.s3_uri).await
}

/// Run the full pipeline for one S3 object.
pub async fn process_document(
    ctx: &IngestContext,
    s3_uri: &str,
) -> Result<ReplaceOutcome, KbError> {
    if s3_uri.ends_with(METADATA_SUFFIX) {
        return Err(KbError::validation(format!(
            "Companion metadata files are not ingested directly: {}",
            s3_uri
        )));
    }

    let (bucket, key) = parse_s3_uri(s3_uri)?;

    let content = download_document(&ctx.s3, &bucket, &key).await?;
    let metadata = fetch_metadata(&ctx.s3, &bucket, &key).await?;

    let chunks = ctx
        .chunker
        .chunk_document(&content)
        .map_err(|e| KbError::Internal(e.to_string()))?;
    tracing::info!(chunks = chunks.len(), s3_uri, "Document chunked");

    // Shared embeddings: consolidated metadata plus the three filter fields.
    // They are computed before file_size lands in the stored JSON, so the
    // metadata embedding stays stable across re-ingests of identical content.
    let embedding_metadata =
        Vector::from(embed(ctx, &metadata.consolidated_text(), METADATA_DIMENSIONS).await?);
    let embedding_provider =
        Vector::from(embed(ctx, &metadata.provider, FIELD_DIMENSIONS).await?);
    let embedding_category =
        Vector::from(embed(ctx, &metadata.category_text(), FIELD_DIMENSIONS).await?);
    let embedding_doc_type =
        Vector::from(embed(ctx, &metadata.doc_type, FIELD_DIMENSIONS).await?);

    let file_size: usize = chunks.iter().map(|c| c.len()).sum();
    let mut stored_metadata = metadata.consolidated_json();
    if let Some(obj) = stored_metadata.as_object_mut() {
        obj.insert("file_size".to_string(), serde_json::json!(file_size));
    }

    let mut rows = Vec::with_capacity(chunks.len());
    for chunk in chunks {
        let embedding_document = Vector::from(embed(ctx, &chunk, DOCUMENT_DIMENSIONS).await?);
        rows.push(ChunkRow {
            document: chunk,
            embedding_document,
            metadata: stored_metadata.clone(),
            embedding_metadata: embedding_metadata.clone(),
            provider: metadata.provider.clone(),
            embedding_provider: embedding_provider.clone(),
            category: metadata.category_text(),
            embedding_category: embedding_category.clone(),
            doc_type: metadata.doc_type.clone(),
            embedding_doc_type: embedding_doc_type.clone(),
        });
    }

    replace_document_chunks(&ctx.pool, s3_uri, &rows).await
}

async fn embed(ctx: &IngestContext, text: &str, dimensions: usize) -> Result<Vec<f32>, KbError> {
    Ok(ctx.backend.embed(text, dimensions).await?)
}

/// Download an S3 object and decode it as text.
async fn download_document(
    s3: &aws_sdk_s3::Client,
    bucket: &str,
    key: &str,
) -> Result<String, KbError> {
    let response = s3
        .get_object()
        .bucket(bucket)
        .key(key)
        .send()
        .await
        .map_err(|e| map_get_object_error(e, bucket, key))?;

    let bytes = response
        .body
        .collect()
        .await
        .map_err(|e| KbError::Internal(format!("Failed to read S3 body: {}", e)))?
        .into_bytes();

    decode_text(&bytes, key)
}

/// Fetch and parse the companion `.metadata.json` for a document key.
async fn fetch_metadata(
    s3: &aws_sdk_s3::Client,
    bucket: &str,
    key: &str,
) -> Result<DocumentMetadata, KbError> {
    let metadata_key = format!("{}{}", key, METADATA_SUFFIX);

    let response = match s3
        .get_object()
        .bucket(bucket)
        .key(&metadata_key)
        .send()
        .await
    {
        Ok(r) => r,
        Err(e) => {
            if e.as_service_error().map(|se| se.is_no_such_key()) == Some(true) {
                return Err(KbError::validation(format!(
                    "Metadata file not found: s3://{}/{}. Each document must have a \
                     companion .metadata.json file.",
                    bucket, metadata_key
                )));
            }
            return Err(map_get_object_error(e, bucket, &metadata_key));
        }
    };

    let bytes = response
        .body
        .collect()
        .await
        .map_err(|e| KbError::Internal(format!("Failed to read S3 body: {}", e)))?
        .into_bytes();

    let raw = std::str::from_utf8(&bytes)
        .map_err(|e| KbError::validation(format!("Metadata file is not UTF-8: {}", e)))?;

    DocumentMetadata::from_companion_json(raw, key)
}

fn map_get_object_error(
    e: aws_sdk_s3::error::SdkError<aws_sdk_s3::operation::get_object::GetObjectError>,
    bucket: &str,
    key: &str,
) -> KbError {
    if let Some(service_err) = e.as_service_error() {
        if service_err.is_no_such_key() {
            return KbError::validation(format!("S3 object does not exist: s3://{}/{}", bucket, key));
        }
    }
    match e.code() {
        Some("AccessDenied") => {
            KbError::validation(format!("Access denied to S3 object: s3://{}/{}", bucket, key))
        }
        code => KbError::AwsService {
            code: code.unwrap_or("Unknown").to_string(),
            message: e.to_string(),
        },
    }
}

/// Decode object bytes as UTF-8, falling back to Latin-1.
///
/// S3 frequently reports text uploads as octet-stream, so decoding is
/// attempted regardless of content type. Latin-1 maps every byte to a
/// character, which makes it the terminal fallback for single-byte text.
fn decode_text(bytes: &[u8], key: &str) -> Result<String, KbError> {
    match std::str::from_utf8(bytes) {
        Ok(s) => Ok(s.to_string()),
        Err(_) => {
            if bytes.iter().any(|&b| b == 0) {
                return Err(KbError::validation(format!(
                    "Unable to decode document as text. Only text-based documents \
                     are supported. File: {}",
                    key
                )));
            }
            tracing::info!(key, "Decoded document using latin-1 fallback");
            Ok(bytes.iter().map(|&b| b as char).collect())
        }
    }
}
