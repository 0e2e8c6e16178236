use diesel::prelude::*;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::access::{AccessError, AccessMode, ServableReference};
use crate::models::{Center, Document, LocatedDocument};
use crate::render::RenderService;
use crate::schema::{centers, documents};
use crate::storage::{BlobLocation, ObjectStorage};

/// Documents flagged corrupt this many times skip rendering and are served
/// as a raw copy of the original.
pub const CORRUPTION_THRESHOLD: i32 = 10;

/// Where originals and servable copies live.
#[derive(Debug, Clone)]
pub struct StorageLayout {
    pub media_bucket: String,
    pub public_bucket: String,
}

impl StorageLayout {
    pub fn new(media_bucket: impl Into<String>, public_bucket: impl Into<String>) -> Self {
        Self {
            media_bucket: media_bucket.into(),
            public_bucket: public_bucket.into(),
        }
    }

    pub fn original(&self, document: &Document) -> BlobLocation {
        BlobLocation::new(
            &self.media_bucket,
            format!("media/docs/{}/{}", document.directory, document.filename),
        )
    }

    pub fn premium_copy(&self, document: &Document) -> BlobLocation {
        BlobLocation::new(
            &self.public_bucket,
            format!("public/media/premium/{}", document.filename),
        )
    }

    pub fn preview_copy(&self, document: &Document) -> BlobLocation {
        BlobLocation::new(
            &self.public_bucket,
            format!("public/media/previews/{}", document.id),
        )
    }

    pub fn public_object(&self, key: &str) -> BlobLocation {
        BlobLocation::new(&self.public_bucket, key)
    }
}

/// Loads a live, stored document and the center it belongs to.
pub fn load_servable_document(
    conn: &mut PgConnection,
    document_id: Uuid,
) -> Result<LocatedDocument, AccessError> {
    documents::table
        .inner_join(centers::table)
        .filter(documents::id.eq(document_id))
        .filter(documents::deleted.eq(false))
        .filter(documents::stored.eq(true))
        .select((documents::all_columns, centers::all_columns))
        .first::<(Document, Center)>(conn)
        .optional()?
        .map(|(document, center)| LocatedDocument { document, center })
        .ok_or(AccessError::NotFound)
}

pub struct AccessResolver<'a> {
    storage: &'a dyn ObjectStorage,
    renderer: &'a dyn RenderService,
    layout: &'a StorageLayout,
}

impl<'a> AccessResolver<'a> {
    pub fn new(
        storage: &'a dyn ObjectStorage,
        renderer: &'a dyn RenderService,
        layout: &'a StorageLayout,
    ) -> Self {
        Self {
            storage,
            renderer,
            layout,
        }
    }

    /// Produces a servable reference for `document`. Copies made along the way
    /// are not undone if a later step fails.
    pub async fn resolve(
        &self,
        document: &Document,
        mode: AccessMode,
        premium: bool,
    ) -> Result<ServableReference, AccessError> {
        if document.corrupt >= CORRUPTION_THRESHOLD {
            info!(
                document_id = %document.id,
                corrupt = document.corrupt,
                "serving raw copy of corrupt document"
            );
            let destination = self.layout.premium_copy(document);
            return self.copy_original(document, &destination).await;
        }

        if mode == AccessMode::Preview {
            let cached = self.layout.preview_copy(document);
            if self.exists(&cached).await? {
                debug!(document_id = %document.id, "serving cached preview");
                return Ok(ServableReference::new(self.storage.public_url(&cached)));
            }
        }

        let original = self.layout.original(document);
        if !self.exists(&original).await? {
            warn!(document_id = %document.id, location = %original, "document source missing");
            return Err(AccessError::SourceMissing);
        }

        if document.is_renderable() {
            return self
                .renderer
                .render(document.id, mode, premium)
                .await
                .map_err(AccessError::Upstream);
        }

        let destination = match mode {
            AccessMode::Preview => self.layout.preview_copy(document),
            _ => self.layout.premium_copy(document),
        };
        self.copy_original(document, &destination).await
    }

    async fn exists(&self, location: &BlobLocation) -> Result<bool, AccessError> {
        self.storage
            .exists(location)
            .await
            .map_err(AccessError::Upstream)
    }

    async fn copy_original(
        &self,
        document: &Document,
        destination: &BlobLocation,
    ) -> Result<ServableReference, AccessError> {
        let source = self.layout.original(document);
        self.storage
            .copy_object(&source, destination, &document.content_type)
            .await
            .map_err(AccessError::Upstream)?;
        Ok(ServableReference::new(self.storage.public_url(destination)))
    }
}
