//! AWS SDK client construction.
//!
//! Builds the S3, SQS, and Bedrock runtime clients from one shared config.
//! An `endpoint_url` override routes every service at a local stack for
//! integration testing; in that mode S3 switches to path-style addressing
//! because virtual-host bucket DNS does not resolve locally.

use aws_config::retry::RetryConfig;
use aws_config::{BehaviorVersion, Region};
use vectorkb_core::config::AwsConfig;

/// Service clients shared by the ingest worker and HTTP handlers.
#[derive(Clone)]
pub struct AwsClients {
    pub s3: aws_sdk_s3::Client,
    pub sqs: aws_sdk_sqs::Client,
    pub bedrock: aws_sdk_bedrockruntime::Client,
}

impl AwsClients {
    pub async fn from_config(config: &AwsConfig) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = &config.region {
            loader = loader.region(Region::new(region.clone()));
        }
        if let Some(endpoint) = &config.endpoint_url {
            loader = loader.endpoint_url(endpoint);
        }
        let shared = loader.load().await;

        let mut s3_builder = aws_sdk_s3::config::Builder::from(&shared);
        if config.endpoint_url.is_some() {
            s3_builder = s3_builder.force_path_style(true);
        }

        // The embedding client runs its own backoff loop, so SDK-level
        // retries on Bedrock would multiply the attempt count.
        let bedrock_config = aws_sdk_bedrockruntime::config::Builder::from(&shared)
            .retry_config(RetryConfig::disabled())
            .build();

        Self {
            s3: aws_sdk_s3::Client::from_conf(s3_builder.build()),
            sqs: aws_sdk_sqs::Client::new(&shared),
            bedrock: aws_sdk_bedrockruntime::Client::from_conf(bedrock_config),
        }
    }
}
