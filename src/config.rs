use std::env;

use anyhow::{Context, Result};
use url::Url;

use crate::db::DEFAULT_MAX_POOL_SIZE;

pub const DEFAULT_CAPTCHA_VERIFY_URL: &str = "https://www.google.com/recaptcha/api/siteverify";
pub const DEFAULT_BOOSTS_CONFIG_KEY: &str = "config/money-boosts.json";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub database_max_pool_size: u32,
    pub server_host: String,
    pub server_port: u16,
    pub jwt_secret: String,
    pub jwt_issuer: String,
    pub jwt_audience: String,
    pub jwt_expiry_minutes: i64,
    pub cors_allowed_origin: Option<String>,
    pub aws_endpoint_url: Option<String>,
    pub aws_access_key_id: Option<String>,
    pub aws_secret_access_key: Option<String>,
    pub aws_region: String,
    pub media_bucket: String,
    pub public_bucket: String,
    pub public_base_url: Option<String>,
    pub render_endpoint: String,
    pub captcha_secret_keys: Vec<String>,
    pub captcha_verify_url: String,
    pub payment_config_path: Option<String>,
    pub boosts_config_key: String,
    pub upstream_timeout_seconds: u64,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let database_max_pool_size = env::var("DATABASE_MAX_POOL_SIZE")
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or(DEFAULT_MAX_POOL_SIZE);
        let server_host = env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let server_port = env::var("SERVER_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .context("SERVER_PORT must be a valid u16")?;
        let jwt_secret = env::var("JWT_SECRET").context("JWT_SECRET must be set")?;
        let jwt_issuer = env::var("JWT_ISSUER").unwrap_or_else(|_| "docshare".to_string());
        let jwt_audience =
            env::var("JWT_AUDIENCE").unwrap_or_else(|_| "docshare-clients".to_string());
        let jwt_expiry_minutes = env::var("JWT_EXPIRY_MINUTES")
            .unwrap_or_else(|_| "60".to_string())
            .parse()
            .context("JWT_EXPIRY_MINUTES must be an integer")?;
        let cors_allowed_origin = env::var("CORS_ALLOWED_ORIGIN").ok();
        let aws_endpoint_url = env::var("AWS_ENDPOINT_URL").ok();
        let aws_access_key_id = env::var("AWS_ACCESS_KEY_ID").ok();
        let aws_secret_access_key = env::var("AWS_SECRET_ACCESS_KEY").ok();
        let aws_region = env::var("AWS_REGION").unwrap_or_else(|_| "eu-west-1".to_string());
        let media_bucket = env::var("S3_BUCKET_MEDIA").context("S3_BUCKET_MEDIA must be set")?;
        let public_bucket =
            env::var("S3_BUCKET_PUBLIC").context("S3_BUCKET_PUBLIC must be set")?;
        let public_base_url = env::var("PUBLIC_BASE_URL").ok();
        let render_endpoint = env::var("RENDER_ENDPOINT").context("RENDER_ENDPOINT must be set")?;
        let captcha_secret_keys = collect_secrets([
            env::var("CAPTCHA_SECRET_KEY").ok(),
            env::var("CAPTCHA_SECRET_KEY_MOBILE").ok(),
        ]);
        let captcha_verify_url = env::var("CAPTCHA_VERIFY_URL")
            .unwrap_or_else(|_| DEFAULT_CAPTCHA_VERIFY_URL.to_string());
        let payment_config_path = env::var("PAYMENT_CONFIG_PATH").ok();
        let boosts_config_key = env::var("BOOSTS_CONFIG_KEY")
            .unwrap_or_else(|_| DEFAULT_BOOSTS_CONFIG_KEY.to_string());
        let upstream_timeout_seconds = env::var("UPSTREAM_TIMEOUT_SECONDS")
            .unwrap_or_else(|_| "15".to_string())
            .parse()
            .context("UPSTREAM_TIMEOUT_SECONDS must be an integer")?;

        Ok(Self {
            database_url,
            database_max_pool_size,
            server_host,
            server_port,
            jwt_secret,
            jwt_issuer,
            jwt_audience,
            jwt_expiry_minutes,
            cors_allowed_origin,
            aws_endpoint_url,
            aws_access_key_id,
            aws_secret_access_key,
            aws_region,
            media_bucket,
            public_bucket,
            public_base_url,
            render_endpoint,
            captcha_secret_keys,
            captcha_verify_url,
            payment_config_path,
            boosts_config_key,
            upstream_timeout_seconds,
        })
    }

    pub fn redacted_database_url(&self) -> String {
        redact_database_url(&self.database_url)
    }
}

fn collect_secrets<const N: usize>(candidates: [Option<String>; N]) -> Vec<String> {
    candidates
        .into_iter()
        .flatten()
        .map(|secret| secret.trim().to_string())
        .filter(|secret| !secret.is_empty())
        .collect()
}

fn redact_database_url(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(mut parsed) => {
            let _ = parsed.set_password(Some("*****"));
            parsed.to_string()
        }
        Err(_) => "***".to_string(),
    }
}
