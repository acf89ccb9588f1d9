pub mod auth;
pub mod chunker;
pub mod config;
pub mod db;
pub mod embeddings;
pub mod error;
pub mod metadata;
pub mod models;
pub mod s3_uri;

pub use chunker::Chunker;
pub use config::KbConfig;
pub use embeddings::{
    EmbeddingBackend, EmbeddingError, EmbeddingSettings, TitanEmbeddingClient,
    DOCUMENT_DIMENSIONS, FIELD_DIMENSIONS, METADATA_DIMENSIONS, TITAN_MODEL_ID,
};
pub use error::KbError;
pub use metadata::DocumentMetadata;
pub use s3_uri::parse_s3_uri;
