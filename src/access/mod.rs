//! Serving documents to readers and settling what their owners earn for it.
//!
//! One access runs as a single ledger transaction: the requester's row is
//! locked, the anti-fraud gate decides, the resolver produces a servable
//! reference, then usage, popularity and payout are written. Blob copies
//! and renders made before a failure are not undone.

pub mod boost;
mod error;
pub mod gate;
pub mod payout;
pub mod resolver;
pub mod usage;

use chrono::Utc;
use diesel::pg::PgConnection;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};
use uuid::Uuid;

pub use error::AccessError;

use crate::db;
use crate::models::LocatedDocument;
use crate::popularity;
use crate::state::AppState;

use self::gate::{AntiFraudGate, Requester};
use self::payout::PayoutContext;
use self::resolver::AccessResolver;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessMode {
    View,
    Download,
    Print,
    Preview,
}

impl AccessMode {
    /// Path segment understood by the render service.
    pub fn render_action(self) -> &'static str {
        match self {
            Self::View => "view",
            Self::Download => "download",
            Self::Print => "print",
            Self::Preview => "preview",
        }
    }

    /// Tag of the append-only audit row.
    pub fn event_kind(self, premium: bool) -> &'static str {
        match (self, premium) {
            (Self::View, _) => "VIEW",
            (Self::Download, false) => "DOC",
            (Self::Download, true) => "DOC_PREM",
            (Self::Print, _) => "DOC_PRINT",
            (Self::Preview, _) => "PREV",
        }
    }

    /// Tag of the payout ledger row.
    pub fn payout_kind(self, premium: bool) -> &'static str {
        match (self, premium) {
            (Self::View, _) => "VIEW",
            (Self::Download, false) => "DOC",
            (Self::Download, true) => "DOC_P",
            (Self::Print, _) => "PRINT",
            (Self::Preview, _) => "PREV",
        }
    }

    pub fn popularity_kind(self) -> &'static str {
        match self {
            Self::View => popularity::VIEW_FILE,
            Self::Download => popularity::DOWNLOAD_FILE,
            Self::Print => popularity::PRINT_FILE,
            Self::Preview => popularity::PREVIEW_FILE,
        }
    }

    fn awards_popularity(self) -> bool {
        matches!(self, Self::View | Self::Download | Self::Preview)
    }

    fn is_payable(self) -> bool {
        matches!(self, Self::View | Self::Download | Self::Print)
    }
}

/// Directly fetchable reference to a servable copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServableReference {
    pub url: String,
}

impl ServableReference {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[derive(Debug, Clone)]
pub struct AccessRequest {
    pub document_id: Uuid,
    pub mode: AccessMode,
    /// Ignored for every mode but download.
    pub premium: bool,
    pub captcha_token: Option<String>,
    pub client_ip: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServedDocument {
    pub url: String,
    pub extension: String,
    pub document_id: Uuid,
    pub upload_id: Uuid,
}

/// Serves one access to a document for `requester_id` (anonymous when
/// `None`) and records everything it implies.
pub async fn resolve_and_serve(
    state: &AppState,
    conn: &mut PgConnection,
    requester_id: Option<Uuid>,
    request: AccessRequest,
) -> Result<ServedDocument, AccessError> {
    let premium = request.premium && request.mode == AccessMode::Download;
    let located = resolver::load_servable_document(conn, request.document_id)?;

    db::begin(conn)?;
    match serve(state, conn, requester_id, &located, &request, premium).await {
        Ok(served) => {
            db::commit(conn)?;
            Ok(served)
        }
        Err(err) => {
            if let Err(rollback_err) = db::rollback(conn) {
                error!(error = %rollback_err, "failed to roll back access transaction");
            }
            if matches!(err, AccessError::SourceMissing) && located.document.is_renderable() {
                if let Err(purge_err) = usage::mark_source_missing(conn, &located.document) {
                    error!(
                        document_id = %located.document.id,
                        error = %purge_err,
                        "failed to retire document with missing source"
                    );
                }
            }
            debug!(
                document_id = %request.document_id,
                mode = ?request.mode,
                error = %err,
                "access denied"
            );
            Err(err)
        }
    }
}

async fn serve(
    state: &AppState,
    conn: &mut PgConnection,
    requester_id: Option<Uuid>,
    located: &LocatedDocument,
    request: &AccessRequest,
    premium: bool,
) -> Result<ServedDocument, AccessError> {
    let document = &located.document;
    let mode = request.mode;

    let requester = gate::load_requester_for_update(conn, requester_id)?;
    let decision = AntiFraudGate::new(state.captcha.as_ref(), &state.config.captcha_secret_keys)
        .authorize(
            &requester,
            mode,
            premium,
            request.captcha_token.as_deref(),
            request.client_ip.as_deref(),
        )
        .await?;
    if let Some(account) = requester.account() {
        gate::apply_decision(conn, account.user.id, decision)?;
    }

    let resolver =
        AccessResolver::new(state.storage.as_ref(), state.renderer.as_ref(), &state.layout);
    let reference = resolver.resolve(document, mode, premium).await?;

    let records_usage = match &requester {
        Requester::Known(account) => account.records_usage(),
        Requester::Anonymous | Requester::Unregistered(_) => true,
    };
    if records_usage {
        let account = requester.account();
        let record =
            usage::record_access(conn, account.map(|a| a.user.id), document, mode, premium)?;

        if let (Some(account), Some(owner_id)) = (account, document.owner_id) {
            let accessor_id = account.user.id;
            if mode.awards_popularity() {
                popularity::adjust(
                    conn,
                    Some(accessor_id),
                    owner_id,
                    mode.popularity_kind(),
                    document.id,
                    1,
                )?;
            }

            if mode.is_payable()
                && document.is_renderable()
                && document.monetizable
                && owner_id != accessor_id
            {
                let boosts_location = state.layout.public_object(&state.config.boosts_config_key);
                let boosts = boost::load_boosts(state.storage.as_ref(), &boosts_location).await;
                let context = PayoutContext {
                    schedule: &state.payments,
                    boosts: &boosts,
                    now: Utc::now(),
                };
                payout::compute_payout(
                    conn,
                    &context,
                    accessor_id,
                    located,
                    record.as_ref(),
                    mode,
                    premium,
                )?;
            }
        }
    }

    Ok(ServedDocument {
        url: reference.url,
        extension: document.extension.clone(),
        document_id: document.id,
        upload_id: document.upload_id,
    })
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;

    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use uuid::Uuid;

    use super::{AccessMode, ServableReference};
    use crate::captcha::CaptchaVerifier;
    use crate::models::{
        Account, Center, Document, LocatedDocument, User, RENDERABLE_CONTENT_TYPE,
    };
    use crate::render::RenderService;
    use crate::storage::{BlobLocation, ObjectStorage};

    #[derive(Default)]
    pub struct FakeStorage {
        objects: Mutex<HashMap<BlobLocation, Vec<u8>>>,
        copies: Mutex<Vec<(BlobLocation, BlobLocation)>>,
    }

    impl FakeStorage {
        pub fn put(&self, location: BlobLocation) {
            self.put_bytes(location, Vec::new());
        }

        pub fn put_bytes(&self, location: BlobLocation, bytes: Vec<u8>) {
            self.objects.lock().unwrap().insert(location, bytes);
        }

        pub fn copies(&self) -> Vec<(BlobLocation, BlobLocation)> {
            self.copies.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ObjectStorage for FakeStorage {
        async fn exists(&self, location: &BlobLocation) -> Result<bool> {
            Ok(self.objects.lock().unwrap().contains_key(location))
        }

        async fn copy_object(
            &self,
            source: &BlobLocation,
            destination: &BlobLocation,
            _content_type: &str,
        ) -> Result<()> {
            let bytes = self
                .objects
                .lock()
                .unwrap()
                .get(source)
                .cloned()
                .unwrap_or_default();
            self.put_bytes(destination.clone(), bytes);
            self.copies
                .lock()
                .unwrap()
                .push((source.clone(), destination.clone()));
            Ok(())
        }

        async fn get_object(&self, location: &BlobLocation) -> Result<Vec<u8>> {
            self.objects
                .lock()
                .unwrap()
                .get(location)
                .cloned()
                .ok_or_else(|| anyhow!("object {location} not found"))
        }

        fn public_url(&self, location: &BlobLocation) -> String {
            format!("memory://{}/{}", location.bucket, location.key)
        }
    }

    #[derive(Default)]
    pub struct FakeRender {
        failing: bool,
        calls: Mutex<Vec<(Uuid, AccessMode, bool)>>,
    }

    impl FakeRender {
        pub fn failing() -> Self {
            Self {
                failing: true,
                ..Self::default()
            }
        }

        pub fn calls(&self) -> Vec<(Uuid, AccessMode, bool)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RenderService for FakeRender {
        async fn render(
            &self,
            document_id: Uuid,
            mode: AccessMode,
            premium: bool,
        ) -> Result<ServableReference> {
            self.calls.lock().unwrap().push((document_id, mode, premium));
            if self.failing {
                return Err(anyhow!("render service unavailable"));
            }
            Ok(ServableReference::new(format!(
                "render://{}/{document_id}",
                mode.render_action()
            )))
        }

        async fn thumbnail(&self, document_id: Uuid) -> Result<ServableReference> {
            Ok(ServableReference::new(format!("render://thumbnail/{document_id}")))
        }
    }

    /// Rejects every token unless told otherwise per secret.
    #[derive(Default)]
    pub struct FakeVerifier {
        accepted: Mutex<HashSet<String>>,
        broken: Mutex<HashSet<String>>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeVerifier {
        pub fn accept(&self, secret: &str) {
            self.accepted.lock().unwrap().insert(secret.to_string());
        }

        pub fn fail_transport(&self, secret: &str) {
            self.broken.lock().unwrap().insert(secret.to_string());
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CaptchaVerifier for FakeVerifier {
        async fn verify(
            &self,
            secret: &str,
            _token: &str,
            _client_ip: Option<&str>,
        ) -> Result<bool> {
            self.calls.lock().unwrap().push(secret.to_string());
            if self.broken.lock().unwrap().contains(secret) {
                return Err(anyhow!("connection reset"));
            }
            Ok(self.accepted.lock().unwrap().contains(secret))
        }
    }

    pub fn sample_document() -> Document {
        let now = Utc::now().naive_utc();
        Document {
            id: Uuid::new_v4(),
            owner_id: Some(Uuid::new_v4()),
            upload_id: Uuid::new_v4(),
            center_id: 1,
            name: "Constitutional law notes".to_string(),
            directory: "2024/03".to_string(),
            filename: "constitutional-law.pdf".to_string(),
            extension: "pdf".to_string(),
            content_type: RENDERABLE_CONTENT_TYPE.to_string(),
            pages: 30,
            monetizable: true,
            corrupt: 0,
            stored: true,
            deleted: false,
            deleted_reason: None,
            deleted_comments: None,
            deleted_at: None,
            views: 0,
            downloads: 5,
            premium_downloads: 0,
            previews: 0,
            likes: 0,
            dislikes: 0,
            shares: 0,
            money: Decimal::ZERO,
            paid_downloads: 0,
            uploaded_at: now,
            updated_at: now,
        }
    }

    pub fn sample_located_document() -> LocatedDocument {
        LocatedDocument {
            document: sample_document(),
            center: Center {
                id: 1,
                name: "Faculty of Law".to_string(),
                country_id: 1,
                city_id: Some(10),
                university_id: Some(100),
            },
        }
    }

    pub fn sample_account(captcha_counter: i32) -> Account {
        let now = Utc::now().naive_utc();
        Account {
            user: User {
                id: Uuid::new_v4(),
                nickname: "reader".to_string(),
                role: "user".to_string(),
                country_id: Some(1),
                money: Decimal::ZERO,
                accumulated: Decimal::ZERO,
                premium_downloads: 3,
                captcha_counter,
                popularity: 0,
                created_at: now,
                updated_at: now,
            },
            ban: None,
        }
    }
}
