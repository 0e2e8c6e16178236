use std::fmt;

use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_s3::types::MetadataDirective;
use aws_sdk_s3::Client as S3Client;
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};

/// Characters escaped in a copy source; `/` stays literal between bucket and key segments.
const COPY_SOURCE: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'+')
    .add(b'?')
    .add(b'&')
    .add(b'=');

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlobLocation {
    pub bucket: String,
    pub key: String,
}

impl BlobLocation {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }
}

impl fmt::Display for BlobLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.bucket, self.key)
    }
}

/// Blob store seen by the access pipeline. It knows nothing about the ledger
/// and offers no rollback: a completed copy stays in place.
#[async_trait]
pub trait ObjectStorage: Send + Sync + 'static {
    async fn exists(&self, location: &BlobLocation) -> Result<bool>;

    async fn copy_object(
        &self,
        source: &BlobLocation,
        destination: &BlobLocation,
        content_type: &str,
    ) -> Result<()>;

    async fn get_object(&self, location: &BlobLocation) -> Result<Vec<u8>>;

    /// Direct, publicly fetchable reference to a blob.
    fn public_url(&self, location: &BlobLocation) -> String;
}

pub struct S3Storage {
    client: S3Client,
    public_base_url: Option<String>,
}

impl S3Storage {
    pub fn new(client: S3Client, public_base_url: Option<String>) -> Self {
        Self {
            client,
            public_base_url: public_base_url.map(|url| url.trim_end_matches('/').to_string()),
        }
    }
}

#[async_trait]
impl ObjectStorage for S3Storage {
    async fn exists(&self, location: &BlobLocation) -> Result<bool> {
        let result = self
            .client
            .head_object()
            .bucket(&location.bucket)
            .key(&location.key)
            .send()
            .await;

        match result {
            Ok(_) => Ok(true),
            Err(err) => {
                let service_error = err.into_service_error();
                if service_error.is_not_found() {
                    Ok(false)
                } else {
                    Err(anyhow::Error::new(service_error)
                        .context(format!("failed to inspect object {location}")))
                }
            }
        }
    }

    async fn copy_object(
        &self,
        source: &BlobLocation,
        destination: &BlobLocation,
        content_type: &str,
    ) -> Result<()> {
        let copy_source = utf8_percent_encode(&source.to_string(), COPY_SOURCE).to_string();

        self.client
            .copy_object()
            .copy_source(copy_source)
            .bucket(&destination.bucket)
            .key(&destination.key)
            .content_type(content_type)
            .metadata_directive(MetadataDirective::Replace)
            .send()
            .await
            .with_context(|| format!("failed to copy {source} to {destination}"))?;

        Ok(())
    }

    async fn get_object(&self, location: &BlobLocation) -> Result<Vec<u8>> {
        let response = self
            .client
            .get_object()
            .bucket(&location.bucket)
            .key(&location.key)
            .send()
            .await
            .with_context(|| format!("failed to download object {location}"))?;

        let bytes = response
            .body
            .collect()
            .await
            .context("failed to read object stream")?
            .into_bytes()
            .to_vec();

        Ok(bytes)
    }

    fn public_url(&self, location: &BlobLocation) -> String {
        match &self.public_base_url {
            Some(base) => format!("{base}/{}/{}", location.bucket, location.key),
            None => format!("https://{}.s3.amazonaws.com/{}", location.bucket, location.key),
        }
    }
}
