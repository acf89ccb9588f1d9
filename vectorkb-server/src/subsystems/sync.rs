//! Sync subsystem — lists a bucket prefix and queues documents for ingestion.
//!
//! Listing paginates through list_objects_v2 and skips directory markers and
//! companion `.metadata.json` objects. Matching keys are queued as
//! `IngestMessage` bodies in SQS batches of 10, carrying the caller's JWT
//! through to the worker for its audit trail.

use aws_sdk_sqs::error::ProvideErrorMetadata;
use aws_sdk_sqs::types::{MessageAttributeValue, SendMessageBatchRequestEntry};
use serde::Deserialize;
use vectorkb_core::auth::{self, CognitoConfig};
use vectorkb_core::metadata::METADATA_SUFFIX;
use vectorkb_core::models::IngestMessage;
use vectorkb_core::KbError;

/// SQS batch limit
const BATCH_SIZE: usize = 10;

#[derive(Debug, Deserialize, Default)]
pub struct SyncRequest {
    pub s3_bucket: Option<String>,
    #[serde(default)]
    pub s3_prefix: String,
    pub jwt_token: Option<String>,
}

pub struct SyncContext {
    pub s3: aws_sdk_s3::Client,
    pub sqs: aws_sdk_sqs::Client,
    pub queue_url: String,
    pub default_bucket: Option<String>,
    pub cognito: Option<CognitoConfig>,
}

/// Run a sync end to end and build the response envelope.
pub async fn dispatch_sync(ctx: &SyncContext, req: SyncRequest) -> serde_json::Value {
    // Token validation happens before any S3 access
    let mut user_id: Option<String> = None;
    if let Some(token) = &req.jwt_token {
        if let Some(cognito) = &ctx.cognito {
            match auth::validate_token(token, cognito) {
                Ok(claims) => {
                    tracing::info!(user = ?claims.sub, "JWT validation successful");
                    user_id = claims.sub;
                }
                Err(e) => {
                    tracing::error!(error = %e, "JWT validation failed");
                    return serde_json::json!({
                        "status": "error",
                        "files_queued": 0,
                        "message": "Invalid or expired JWT token",
                    });
                }
            }
        }
    }

    let bucket = match resolve_bucket(&req, ctx.default_bucket.as_deref()) {
        Ok(b) => b,
        Err(e) => return error_envelope(&e),
    };

    match sync_prefix(ctx, &bucket, &req.s3_prefix, req.jwt_token.as_deref()).await {
        Ok(queued) => serde_json::json!({
            "status": "success",
            "files_queued": queued,
            "message": format!("Successfully queued {} files for ingestion", queued),
            "s3_location": format!("s3://{}/{}", bucket, req.s3_prefix),
            "user_id": user_id,
        }),
        Err(e) => {
            tracing::error!(error = %e, bucket, "Sync failed");
            error_envelope(&e)
        }
    }
}

fn error_envelope(error: &KbError) -> serde_json::Value {
    let message = match error {
        KbError::Validation(msg) => format!("Validation error: {}", msg),
        KbError::AwsService { code, .. } => format!("AWS service error: {}", code),
        other => format!("Internal server error: {}", other),
    };
    serde_json::json!({
        "status": "error",
        "files_queued": 0,
        "message": message,
    })
}

fn resolve_bucket(req: &SyncRequest, default_bucket: Option<&str>) -> Result<String, KbError> {
    req.s3_bucket
        .as_deref()
        .filter(|b| !b.trim().is_empty())
        .or(default_bucket)
        .map(str::to_string)
        .ok_or_else(|| {
            KbError::validation(
                "s3_bucket parameter is required (either in the request or as the \
                 configured default bucket)",
            )
        })
}

/// True for keys that name ingestable documents.
fn should_ingest(key: &str) -> bool {
    !key.ends_with('/') && !key.ends_with(METADATA_SUFFIX)
}

async fn sync_prefix(
    ctx: &SyncContext,
    bucket: &str,
    prefix: &str,
    jwt_token: Option<&str>,
) -> Result<usize, KbError> {
    let files = list_documents(&ctx.s3, bucket, prefix).await?;
    tracing::info!(count = files.len(), bucket, prefix, "Listed documents");

    queue_for_ingestion(ctx, &files, jwt_token).await
}

/// List every document under the prefix, following pagination.
async fn list_documents(
    s3: &aws_sdk_s3::Client,
    bucket: &str,
    prefix: &str,
) -> Result<Vec<String>, KbError> {
    let mut files = Vec::new();
    let mut continuation_token: Option<String> = None;

    loop {
        let response = s3
            .list_objects_v2()
            .bucket(bucket)
            .prefix(prefix)
            .set_continuation_token(continuation_token.take())
            .send()
            .await
            .map_err(|e| map_list_error(e.code(), e.to_string(), bucket))?;

        for object in response.contents() {
            if let Some(key) = object.key() {
                if should_ingest(key) {
                    files.push(format!("s3://{}/{}", bucket, key));
                }
            }
        }

        match response.next_continuation_token() {
            Some(token) if response.is_truncated() == Some(true) => {
                continuation_token = Some(token.to_string());
            }
            _ => break,
        }
    }

    Ok(files)
}

/// A missing or inaccessible bucket is a caller mistake, not a service fault.
fn map_list_error(code: Option<&str>, message: String, bucket: &str) -> KbError {
    match code {
        Some("NoSuchBucket") => {
            KbError::validation(format!("S3 bucket does not exist: {}", bucket))
        }
        Some("AccessDenied") => {
            KbError::validation(format!("Access denied to S3 bucket: {}", bucket))
        }
        code => KbError::AwsService {
            code: code.unwrap_or("Unknown").to_string(),
            message,
        },
    }
}

/// Send the file list to the ingestion queue in SQS batches.
async fn queue_for_ingestion(
    ctx: &SyncContext,
    files: &[String],
    jwt_token: Option<&str>,
) -> Result<usize, KbError> {
    if files.is_empty() {
        tracing::info!("No files to queue for ingestion");
        return Ok(0);
    }

    let mut queued = 0usize;

    for (batch_index, batch) in files.chunks(BATCH_SIZE).enumerate() {
        let mut entries = Vec::with_capacity(batch.len());
        for (offset, s3_uri) in batch.iter().enumerate() {
            let message = IngestMessage {
                s3_uri: s3_uri.clone(),
                jwt_token: jwt_token.map(str::to_string),
            };
            let body = serde_json::to_string(&message)
                .map_err(|e| KbError::Internal(e.to_string()))?;

            let entry = SendMessageBatchRequestEntry::builder()
                .id((batch_index * BATCH_SIZE + offset).to_string())
                .message_body(body)
                .message_attributes(
                    "source",
                    MessageAttributeValue::builder()
                        .data_type("String")
                        .string_value("sync")
                        .build()
                        .map_err(|e| KbError::Internal(e.to_string()))?,
                )
                .message_attributes(
                    "s3_uri",
                    MessageAttributeValue::builder()
                        .data_type("String")
                        .string_value(s3_uri)
                        .build()
                        .map_err(|e| KbError::Internal(e.to_string()))?,
                )
                .build()
                .map_err(|e| KbError::Internal(e.to_string()))?;
            entries.push(entry);
        }

        let response = ctx
            .sqs
            .send_message_batch()
            .queue_url(&ctx.queue_url)
            .set_entries(Some(entries))
            .send()
            .await
            .map_err(|e| KbError::AwsService {
                code: e.code().unwrap_or("Unknown").to_string(),
                message: e.to_string(),
            })?;

        queued += response.successful().len();
        for failure in response.failed() {
            tracing::warn!(
                id = failure.id(),
                message = ?failure.message(),
                "Failed to queue message"
            );
        }
    }

    tracing::info!(queued, total = files.len(), "Queued files for ingestion");
    Ok(queued)
}
