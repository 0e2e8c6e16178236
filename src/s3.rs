use std::time::Duration;

use anyhow::Result;
use aws_config::meta::region::RegionProviderChain;
use aws_config::timeout::TimeoutConfig;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::{
    config::{Builder as S3ConfigBuilder, Region},
    Client as S3Client,
};

use crate::config::AppConfig;

pub async fn build_client(config: &AppConfig) -> Result<S3Client> {
    let region = Region::new(config.aws_region.clone());
    let region_provider = RegionProviderChain::first_try(Some(region))
        .or_default_provider()
        .or_else("eu-west-1");

    let timeouts = TimeoutConfig::builder()
        .operation_timeout(Duration::from_secs(config.upstream_timeout_seconds))
        .build();

    let mut loader = aws_config::defaults(BehaviorVersion::latest())
        .region(region_provider)
        .timeout_config(timeouts);

    if let Some(endpoint) = &config.aws_endpoint_url {
        loader = loader.endpoint_url(endpoint);
    }

    if let (Some(access_key), Some(secret_key)) = (
        config.aws_access_key_id.clone(),
        config.aws_secret_access_key.clone(),
    ) {
        let credentials = Credentials::new(access_key, secret_key, None, None, "static");
        loader = loader.credentials_provider(credentials);
    }

    let base_config = loader.load().await;
    // Local S3 emulators only resolve path-style addressing.
    let s3_config = S3ConfigBuilder::from(&base_config)
        .force_path_style(config.aws_endpoint_url.is_some())
        .build();

    Ok(S3Client::from_conf(s3_config))
}
