use config::{Config, ConfigError, File};
use serde::Deserialize;

use crate::auth::CognitoConfig;

#[derive(Debug, Deserialize, Clone)]
pub struct KbConfig {
    pub service: ServiceConfig,
    pub database: DatabaseConfig,
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub aws: AwsConfig,
    pub queue: Option<QueueConfig>,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub http: HttpConfig,
    pub cognito: Option<CognitoConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    pub log_level: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    pub model_id: String,
    pub max_retries: usize,
    pub retry_delay_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub overlap_percent: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            overlap_percent: 10,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AwsConfig {
    pub region: Option<String>,
    /// Endpoint override for local stacks (LocalStack etc.)
    pub endpoint_url: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct QueueConfig {
    pub queue_url: String,
    #[serde(default = "default_wait_time")]
    pub wait_time_seconds: i32,
    #[serde(default = "default_max_messages")]
    pub max_messages: i32,
}

fn default_wait_time() -> i32 {
    20
}

fn default_max_messages() -> i32 {
    10
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct StorageConfig {
    pub default_bucket: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "127.0.0.1".to_string(),
            port: 8750,
        }
    }
}

impl KbConfig {
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name(path))
            .build()?;
        s.try_deserialize()
    }
}
