use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

/// External human-verification check keyed by (secret, token, client ip).
#[async_trait]
pub trait CaptchaVerifier: Send + Sync + 'static {
    async fn verify(&self, secret: &str, token: &str, client_ip: Option<&str>) -> Result<bool>;
}

pub struct RecaptchaVerifier {
    client: Client,
    verify_url: String,
}

#[derive(Deserialize)]
struct SiteVerifyResponse {
    #[serde(default)]
    success: bool,
}

impl RecaptchaVerifier {
    pub fn new(verify_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build captcha client")?;
        Ok(Self {
            client,
            verify_url: verify_url.into(),
        })
    }
}

#[async_trait]
impl CaptchaVerifier for RecaptchaVerifier {
    async fn verify(&self, secret: &str, token: &str, client_ip: Option<&str>) -> Result<bool> {
        let mut params = vec![("secret", secret), ("response", token)];
        if let Some(ip) = client_ip {
            params.push(("remoteip", ip));
        }

        let response = self
            .client
            .get(&self.verify_url)
            .query(&params)
            .send()
            .await
            .context("captcha verification request failed")?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "captcha verification failed with status {}",
                response.status()
            ));
        }

        let body: SiteVerifyResponse = response
            .json()
            .await
            .context("captcha verification returned an unreadable response")?;
        Ok(body.success)
    }
}
