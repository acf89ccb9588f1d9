use chrono::{DateTime, Utc};
use pgvector::Vector;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One chunk row from the vector_store table.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct VectorRecord {
    pub id: Uuid,
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
    pub source_s3_uri: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
