//! Retrieval dispatcher — four search modes over the vector_store table.
//!
//! - `content_similarity`: cosine search against the 1024-dim document embedding
//! - `metadata_similarity`: cosine search against the 512-dim metadata embedding
//! - `hybrid_similarity`: weighted combination of both, ordered by combined score
//! - `filter_and_search`: 256-dim field-embedding prefilter (k*5 candidates),
//!   then content ranking within the filtered pool
//!
//! Requests arrive as loose JSON and are validated into typed parameters
//! before any embedding call. Responses use a uniform envelope carrying
//! `status`, `search_type`, `total_results`, `execution_time_ms`, and the
//! result rows; failures carry `error_type` and `message` instead.

use std::time::Instant;

use pgvector::Vector;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;
use vectorkb_core::embeddings::EmbeddingBackend;
use vectorkb_core::{KbError, DOCUMENT_DIMENSIONS, FIELD_DIMENSIONS, METADATA_DIMENSIONS};

/// Default result count when `k` is omitted
const DEFAULT_K: i64 = 3;

/// Maximum allowed `k`
const MAX_K: i64 = 100;

const DEFAULT_CONTENT_WEIGHT: f64 = 0.7;
const DEFAULT_METADATA_WEIGHT: f64 = 0.3;

/// Weights must sum to 1.0 within this tolerance
const WEIGHT_TOLERANCE: f64 = 0.001;

/// Prefilter pool size multiplier for filter_and_search
const FILTER_POOL_FACTOR: i64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchType {
    ContentSimilarity,
    MetadataSimilarity,
    HybridSimilarity,
    FilterAndSearch,
}

impl SearchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchType::ContentSimilarity => "content_similarity",
            SearchType::MetadataSimilarity => "metadata_similarity",
            SearchType::HybridSimilarity => "hybrid_similarity",
            SearchType::FilterAndSearch => "filter_and_search",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "content_similarity" => Some(SearchType::ContentSimilarity),
            "metadata_similarity" => Some(SearchType::MetadataSimilarity),
            "hybrid_similarity" => Some(SearchType::HybridSimilarity),
            "filter_and_search" => Some(SearchType::FilterAndSearch),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterType {
    Provider,
    Category,
    Type,
}

impl FilterType {
    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "provider" => Some(FilterType::Provider),
            "category" => Some(FilterType::Category),
            "type" => Some(FilterType::Type),
            _ => None,
        }
    }

    /// Whitelisted column name interpolated into the prefilter CTE.
    /// Only these three values ever reach the SQL string.
    pub fn embedding_column(&self) -> &'static str {
        match self {
            FilterType::Provider => "embedding_provider",
            FilterType::Category => "embedding_category",
            FilterType::Type => "embedding_doc_type",
        }
    }
}

/// Validated search parameters, one variant per search type.
#[derive(Debug, Clone)]
pub enum SearchParams {
    Content {
        query: String,
        k: i64,
    },
    Metadata {
        metadata_query: String,
        k: i64,
    },
    Hybrid {
        query: String,
        metadata_query: String,
        content_weight: f64,
        metadata_weight: f64,
        k: i64,
    },
    Filter {
        query: String,
        filter_type: FilterType,
        filter_value: String,
        k: i64,
    },
}

impl SearchParams {
    pub fn search_type(&self) -> SearchType {
        match self {
            SearchParams::Content { .. } => SearchType::ContentSimilarity,
            SearchParams::Metadata { .. } => SearchType::MetadataSimilarity,
            SearchParams::Hybrid { .. } => SearchType::HybridSimilarity,
            SearchParams::Filter { .. } => SearchType::FilterAndSearch,
        }
    }
}

/// One result row. Score fields beyond `similarity_score` are populated
/// only by the search types that compute them.
#[derive(Debug, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: Uuid,
    pub document: String,
    pub metadata: serde_json::Value,
    pub source_s3_uri: String,
    pub similarity_score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter_score: Option<f64>,
}

/// Validate a raw request body into typed parameters.
pub fn parse_params(body: &serde_json::Value) -> Result<SearchParams, KbError> {
    let search_type = match body.get("search_type").and_then(|v| v.as_str()) {
        Some(raw) => SearchType::parse(raw).ok_or_else(|| {
            KbError::validation(
                "Invalid search_type. Must be one of: content_similarity, \
                 metadata_similarity, hybrid_similarity, filter_and_search",
            )
        })?,
        None => return Err(KbError::validation("search_type parameter is required")),
    };

    let k = match body.get("k") {
        None => DEFAULT_K,
        Some(v) => match v.as_i64() {
            Some(k) if (1..=MAX_K).contains(&k) => k,
            _ => {
                return Err(KbError::validation(
                    "k parameter must be an integer between 1 and 100",
                ))
            }
        },
    };

    match search_type {
        SearchType::ContentSimilarity => Ok(SearchParams::Content {
            query: required_string(body, "query", "content_similarity search")?,
            k,
        }),
        SearchType::MetadataSimilarity => Ok(SearchParams::Metadata {
            metadata_query: required_string(body, "metadata_query", "metadata_similarity search")?,
            k,
        }),
        SearchType::HybridSimilarity => {
            let query = required_string(body, "query", "hybrid_similarity search")?;
            let metadata_query =
                required_string(body, "metadata_query", "hybrid_similarity search")?;

            let content_weight = optional_weight(body, "content_weight", DEFAULT_CONTENT_WEIGHT)?;
            let metadata_weight =
                optional_weight(body, "metadata_weight", DEFAULT_METADATA_WEIGHT)?;

            if (content_weight + metadata_weight - 1.0).abs() > WEIGHT_TOLERANCE {
                return Err(KbError::validation(
                    "content_weight + metadata_weight must equal 1.0",
                ));
            }

            Ok(SearchParams::Hybrid {
                query,
                metadata_query,
                content_weight,
                metadata_weight,
                k,
            })
        }
        SearchType::FilterAndSearch => {
            let query = required_string(body, "query", "filter_and_search")?;

            let filter_type = match body.get("filter_type").and_then(|v| v.as_str()) {
                Some(raw) => FilterType::parse(raw).ok_or_else(|| {
                    KbError::validation("filter_type must be one of: provider, category, type")
                })?,
                None => {
                    return Err(KbError::validation(
                        "filter_type must be one of: provider, category, type",
                    ))
                }
            };

            let filter_value = required_string(body, "filter_value", "filter_and_search")?;

            Ok(SearchParams::Filter {
                query,
                filter_type,
                filter_value,
                k,
            })
        }
    }
}

fn required_string(
    body: &serde_json::Value,
    field: &str,
    context: &str,
) -> Result<String, KbError> {
    match body.get(field).and_then(|v| v.as_str()) {
        Some(s) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        _ => Err(KbError::validation(format!(
            "{} parameter is required for {}",
            field, context
        ))),
    }
}

fn optional_weight(body: &serde_json::Value, field: &str, default: f64) -> Result<f64, KbError> {
    match body.get(field) {
        None => Ok(default),
        Some(v) => v.as_f64().ok_or_else(|| {
            KbError::validation("content_weight and metadata_weight must be numeric")
        }),
    }
}

/// Run a search end to end and build the response envelope.
///
/// Always returns a JSON value: success envelopes on the happy path, typed
/// error envelopes (`validation_error` / `aws_service_error` /
/// `internal_error`) otherwise.
pub async fn dispatch_search(
    pool: &PgPool,
    backend: &dyn EmbeddingBackend,
    body: &serde_json::Value,
) -> serde_json::Value {
    let start = Instant::now();

    let params = match parse_params(body) {
        Ok(p) => p,
        Err(e) => return error_envelope(&e, start),
    };
    let search_type = params.search_type();

    match execute_search(pool, backend, &params).await {
        Ok(hits) => {
            let elapsed = start.elapsed().as_millis() as u64;
            tracing::info!(
                search_type = search_type.as_str(),
                total_results = hits.len(),
                execution_time_ms = elapsed,
                "Search completed"
            );
            serde_json::json!({
                "status": "success",
                "search_type": search_type.as_str(),
                "total_results": hits.len(),
                "execution_time_ms": elapsed,
                "results": hits,
            })
        }
        Err(e) => {
            tracing::error!(
                search_type = search_type.as_str(),
                error = %e,
                "Search failed"
            );
            error_envelope(&e, start)
        }
    }
}

fn error_envelope(error: &KbError, start: Instant) -> serde_json::Value {
    serde_json::json!({
        "status": "error",
        "error_type": error.error_type(),
        "message": error.to_string(),
        "execution_time_ms": start.elapsed().as_millis() as u64,
    })
}

/// Execute the search described by validated parameters.
pub async fn execute_search(
    pool: &PgPool,
    backend: &dyn EmbeddingBackend,
    params: &SearchParams,
) -> Result<Vec<SearchHit>, KbError> {
    match params {
        SearchParams::Content { query, k } => {
            let embedding = backend.embed(query, DOCUMENT_DIMENSIONS).await?;
            similarity_search(pool, "embedding_document", Vector::from(embedding), *k).await
        }
        SearchParams::Metadata { metadata_query, k } => {
            let embedding = backend.embed(metadata_query, METADATA_DIMENSIONS).await?;
            similarity_search(pool, "embedding_metadata", Vector::from(embedding), *k).await
        }
        SearchParams::Hybrid {
            query,
            metadata_query,
            content_weight,
            metadata_weight,
            k,
        } => {
            let content = backend.embed(query, DOCUMENT_DIMENSIONS).await?;
            let metadata = backend.embed(metadata_query, METADATA_DIMENSIONS).await?;
            hybrid_search(
                pool,
                Vector::from(content),
                Vector::from(metadata),
                *content_weight,
                *metadata_weight,
                *k,
            )
            .await
        }
        SearchParams::Filter {
            query,
            filter_type,
            filter_value,
            k,
        } => {
            let filter = backend.embed(filter_value, FIELD_DIMENSIONS).await?;
            let content = backend.embed(query, DOCUMENT_DIMENSIONS).await?;
            filter_and_search(
                pool,
                *filter_type,
                Vector::from(filter),
                Vector::from(content),
                *k,
            )
            .await
        }
    }
}

/// Plain cosine search against one embedding column.
async fn similarity_search(
    pool: &PgPool,
    column: &str,
    query_vector: Vector,
    k: i64,
) -> Result<Vec<SearchHit>, KbError> {
    let sql = format!(
        "SELECT id, document, metadata, source_s3_uri, \
                1 - ({col} <=> $1::vector) AS similarity_score \
         FROM vector_store \
         ORDER BY {col} <=> $1::vector \
         LIMIT $2",
        col = column
    );

    let rows = sqlx::query_as::<_, (Uuid, String, serde_json::Value, String, f64)>(&sql)
        .bind(&query_vector)
        .bind(k)
        .fetch_all(pool)
        .await?;

    Ok(rows
        .into_iter()
        .map(
            |(id, document, metadata, source_s3_uri, similarity_score)| SearchHit {
                id,
                document,
                metadata,
                source_s3_uri,
                similarity_score,
                content_score: None,
                metadata_score: None,
                filter_score: None,
            },
        )
        .collect())
}

/// Weighted combination of content and metadata similarity.
async fn hybrid_search(
    pool: &PgPool,
    content_vector: Vector,
    metadata_vector: Vector,
    content_weight: f64,
    metadata_weight: f64,
    k: i64,
) -> Result<Vec<SearchHit>, KbError> {
    let rows = sqlx::query_as::<_, (Uuid, String, serde_json::Value, String, f64, f64, f64)>(
        r#"
        SELECT id, document, metadata, source_s3_uri,
               ($3 * (1 - (embedding_document <=> $1::vector))) +
               ($4 * (1 - (embedding_metadata <=> $2::vector))) AS combined_score,
               1 - (embedding_document <=> $1::vector) AS content_score,
               1 - (embedding_metadata <=> $2::vector) AS metadata_score
        FROM vector_store
        ORDER BY combined_score DESC
        LIMIT $5
        "#,
    )
    .bind(&content_vector)
    .bind(&metadata_vector)
    .bind(content_weight)
    .bind(metadata_weight)
    .bind(k)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(
            |(id, document, metadata, source_s3_uri, combined, content, meta)| SearchHit {
                id,
                document,
                metadata,
                source_s3_uri,
                similarity_score: combined,
                content_score: Some(content),
                metadata_score: Some(meta),
                filter_score: None,
            },
        )
        .collect())
}

/// Field-embedding prefilter (k*5 candidates) followed by content ranking.
async fn filter_and_search(
    pool: &PgPool,
    filter_type: FilterType,
    filter_vector: Vector,
    content_vector: Vector,
    k: i64,
) -> Result<Vec<SearchHit>, KbError> {
    let sql = format!(
        "WITH filtered_docs AS ( \
            SELECT id, document, metadata, source_s3_uri, embedding_document, \
                   1 - ({col} <=> $1::vector) AS filter_score \
            FROM vector_store \
            ORDER BY {col} <=> $1::vector \
            LIMIT $2 \
         ) \
         SELECT id, document, metadata, source_s3_uri, \
                1 - (embedding_document <=> $3::vector) AS content_score, \
                filter_score \
         FROM filtered_docs \
         ORDER BY embedding_document <=> $3::vector \
         LIMIT $4",
        col = filter_type.embedding_column()
    );

    let rows = sqlx::query_as::<_, (Uuid, String, serde_json::Value, String, f64, f64)>(&sql)
        .bind(&filter_vector)
        .bind(k * FILTER_POOL_FACTOR)
        .bind(&content_vector)
        .bind(k)
        .fetch_all(pool)
        .await?;

    Ok(rows
        .into_iter()
        .map(
            |(id, document, metadata, source_s3_uri, content, filter)| SearchHit {
                id,
                document,
                metadata,
                source_s3_uri,
                similarity_score: content,
                content_score: Some(content),
                metadata_score: None,
                filter_score: Some(filter),
            },
        )
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_content_similarity() {
        let body = serde_json::json!({
            "search_type": "content_similarity",
            "query": "  database tuning  ",
            "k": 7
        });
        match parse_params(&body).unwrap() {
            SearchParams::Content { query, k } => {
                assert_eq!(query, "database tuning");
                assert_eq!(k, 7);
            }
            other => panic!("wrong variant: {:?}", other),
        }
    }

    #[test]
    fn test_parse_defaults_k_to_three() {
        let body = serde_json::json!({
            "search_type": "content_similarity",
            "query": "anything"
        });
        match parse_params(&body).unwrap() {
            SearchParams::Content { k, .. } => assert_eq!(k, DEFAULT_K),
            other => panic!("wrong variant: {:?}", other),
        }
    }

    #[test]
    fn test_missing_search_type_rejected() {
        let body = serde_json::json!({ "query": "anything" });
        let err = parse_params(&body).unwrap_err();
        assert_eq!(err.error_type(), "validation_error");
        assert!(err.to_string().contains("search_type"));
    }

    #[test]
    fn test_unknown_search_type_rejected() {
        let body = serde_json::json!({ "search_type": "fuzzy", "query": "x" });
        let err = parse_params(&body).unwrap_err();
        assert!(err.to_string().contains("Invalid search_type"));
    }

    #[test]
    fn test_k_bounds_enforced() {
        for bad_k in [serde_json::json!(0), serde_json::json!(101), serde_json::json!(2.5)] {
            let body = serde_json::json!({
                "search_type": "content_similarity",
                "query": "x",
                "k": bad_k
            });
            let err = parse_params(&body).unwrap_err();
            assert!(err.to_string().contains("between 1 and 100"), "k={bad_k}");
        }

        for good_k in [1, 100] {
            let body = serde_json::json!({
                "search_type": "content_similarity",
                "query": "x",
                "k": good_k
            });
            assert!(parse_params(&body).is_ok(), "k={good_k}");
        }
    }

    #[test]
    fn test_metadata_similarity_requires_metadata_query() {
        let body = serde_json::json!({
            "search_type": "metadata_similarity",
            "query": "wrong field"
        });
        let err = parse_params(&body).unwrap_err();
        assert!(err.to_string().contains("metadata_query"));
    }

    #[test]
    fn test_hybrid_default_weights() {
        let body = serde_json::json!({
            "search_type": "hybrid_similarity",
            "query": "content text",
            "metadata_query": "metadata text"
        });
        match parse_params(&body).unwrap() {
            SearchParams::Hybrid {
                content_weight,
                metadata_weight,
                ..
            } => {
                assert_eq!(content_weight, DEFAULT_CONTENT_WEIGHT);
                assert_eq!(metadata_weight, DEFAULT_METADATA_WEIGHT);
            }
            other => panic!("wrong variant: {:?}", other),
        }
    }

    #[test]
    fn test_hybrid_weights_must_sum_to_one() {
        let body = serde_json::json!({
            "search_type": "hybrid_similarity",
            "query": "a",
            "metadata_query": "b",
            "content_weight": 0.8,
            "metadata_weight": 0.3
        });
        let err = parse_params(&body).unwrap_err();
        assert!(err.to_string().contains("must equal 1.0"));

        // Within tolerance passes
        let body = serde_json::json!({
            "search_type": "hybrid_similarity",
            "query": "a",
            "metadata_query": "b",
            "content_weight": 0.6004,
            "metadata_weight": 0.4
        });
        assert!(parse_params(&body).is_ok());
    }

    #[test]
    fn test_hybrid_weights_must_be_numeric() {
        let body = serde_json::json!({
            "search_type": "hybrid_similarity",
            "query": "a",
            "metadata_query": "b",
            "content_weight": "0.7",
            "metadata_weight": 0.3
        });
        let err = parse_params(&body).unwrap_err();
        assert!(err.to_string().contains("must be numeric"));
    }

    #[test]
    fn test_filter_and_search_params() {
        let body = serde_json::json!({
            "search_type": "filter_and_search",
            "query": "rate limits",
            "filter_type": "provider",
            "filter_value": "aws"
        });
        match parse_params(&body).unwrap() {
            SearchParams::Filter {
                filter_type,
                filter_value,
                ..
            } => {
                assert_eq!(filter_type, FilterType::Provider);
                assert_eq!(filter_value, "aws");
            }
            other => panic!("wrong variant: {:?}", other),
        }
    }

    #[test]
    fn test_filter_type_whitelist() {
        let body = serde_json::json!({
            "search_type": "filter_and_search",
            "query": "x",
            "filter_type": "embedding_document; DROP TABLE vector_store",
            "filter_value": "y"
        });
        let err = parse_params(&body).unwrap_err();
        assert!(err.to_string().contains("filter_type must be one of"));
    }

    #[test]
    fn test_filter_columns_match_schema() {
        assert_eq!(FilterType::Provider.embedding_column(), "embedding_provider");
        assert_eq!(FilterType::Category.embedding_column(), "embedding_category");
        assert_eq!(FilterType::Type.embedding_column(), "embedding_doc_type");
    }

    #[test]
    fn test_search_type_round_trip() {
        for raw in [
            "content_similarity",
            "metadata_similarity",
            "hybrid_similarity",
            "filter_and_search",
        ] {
            assert_eq!(SearchType::parse(raw).unwrap().as_str(), raw);
        }
        assert!(SearchType::parse("").is_none());
    }
}
