use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, error};
use uuid::Uuid;

use crate::access::{AccessMode, ServableReference};

/// Remote renderer producing servable copies of PDF documents.
#[async_trait]
pub trait RenderService: Send + Sync + 'static {
    async fn render(
        &self,
        document_id: Uuid,
        mode: AccessMode,
        premium: bool,
    ) -> Result<ServableReference>;

    async fn thumbnail(&self, document_id: Uuid) -> Result<ServableReference>;
}

pub struct HttpRenderService {
    client: Client,
    endpoint: String,
}

impl HttpRenderService {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build render service client")?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }

    fn render_url(&self, document_id: Uuid, mode: AccessMode, premium: bool) -> String {
        match mode {
            AccessMode::View | AccessMode::Download => format!(
                "{}/v3/pdf/{}/{document_id}/{}",
                self.endpoint,
                mode.render_action(),
                u8::from(premium)
            ),
            AccessMode::Print | AccessMode::Preview => {
                format!("{}/v3/pdf/{}/{document_id}", self.endpoint, mode.render_action())
            }
        }
    }

    async fn fetch(&self, request: reqwest::RequestBuilder) -> Result<ServableReference> {
        let response = request.send().await.context("render request failed")?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!(%status, body = %body, "render service request failed");
            return Err(anyhow!("render service failed with status {status}"));
        }

        response
            .json::<ServableReference>()
            .await
            .context("render service returned an unreadable response")
    }
}

#[async_trait]
impl RenderService for HttpRenderService {
    async fn render(
        &self,
        document_id: Uuid,
        mode: AccessMode,
        premium: bool,
    ) -> Result<ServableReference> {
        let url = self.render_url(document_id, mode, premium);
        debug!(%url, %document_id, ?mode, "requesting rendered document");
        self.fetch(self.client.post(url)).await
    }

    async fn thumbnail(&self, document_id: Uuid) -> Result<ServableReference> {
        let url = format!("{}/v3/pdf/thumbnail/{document_id}", self.endpoint);
        debug!(%url, %document_id, "requesting document thumbnail");
        self.fetch(self.client.get(url)).await
    }
}
