use axum::http::StatusCode;
use chrono::{NaiveDateTime, Utc};
use diesel::dsl::exists;
use diesel::{prelude::*, select};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use uuid::Uuid;

use crate::access::ServableReference;
use crate::db::functions::greatest_numeric;
use crate::error::{AppError, AppResult, CODE_UNEXPECTED};
use crate::models::{Account, Document, NewShare, User, UserBan};
use crate::popularity;
use crate::render::RenderService;
use crate::schema::{discussions, documents, share_blocks, shares, uploads, user_bans, users};
use crate::utils::json::deserialize_flag;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletionReason {
    SelfDeleted,
    Copyright,
    SourceMissing,
    Moderation,
}

impl DeletionReason {
    pub fn code(self) -> i16 {
        match self {
            Self::SelfDeleted => 1,
            Self::Copyright => 2,
            Self::SourceMissing => 3,
            Self::Moderation => 5,
        }
    }
}

/// Marks `document` deleted. When no live document remains in its upload
/// group, the group and its discussion thread go with it.
pub fn soft_delete(
    conn: &mut PgConnection,
    document: &Document,
    reason: DeletionReason,
    comments: Option<&str>,
) -> QueryResult<()> {
    let now = Utc::now().naive_utc();
    diesel::update(documents::table.find(document.id))
        .set((
            documents::deleted.eq(true),
            documents::deleted_reason.eq(Some(reason.code())),
            documents::deleted_comments.eq(comments),
            documents::deleted_at.eq(Some(now)),
            documents::updated_at.eq(now),
        ))
        .execute(conn)?;

    let group_alive: bool = select(exists(
        documents::table
            .filter(documents::upload_id.eq(document.upload_id))
            .filter(documents::deleted.eq(false)),
    ))
    .get_result(conn)?;
    if group_alive {
        return Ok(());
    }

    diesel::update(uploads::table.find(document.upload_id))
        .set((
            uploads::deleted.eq(true),
            uploads::deleted_reason.eq(Some(reason.code())),
            uploads::deleted_comments.eq(comments),
            uploads::deleted_at.eq(Some(now)),
            uploads::updated_at.eq(now),
        ))
        .execute(conn)?;
    diesel::update(discussions::table.filter(discussions::upload_id.eq(document.upload_id)))
        .set(discussions::deleted.eq(true))
        .execute(conn)?;
    Ok(())
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentSummary {
    pub id: Uuid,
    pub upload_id: Uuid,
    pub name: String,
    pub extension: String,
    pub deleted: bool,
    pub deleted_reason: Option<i16>,
    pub deleted_at: Option<NaiveDateTime>,
    pub views: i32,
    pub downloads: i32,
    pub likes: i32,
    pub dislikes: i32,
    pub shares: i32,
}

impl From<Document> for DocumentSummary {
    fn from(document: Document) -> Self {
        Self {
            id: document.id,
            upload_id: document.upload_id,
            name: document.name,
            extension: document.extension,
            deleted: document.deleted,
            deleted_reason: document.deleted_reason,
            deleted_at: document.deleted_at,
            views: document.views,
            downloads: document.downloads,
            likes: document.likes,
            dislikes: document.dislikes,
            shares: document.shares,
        }
    }
}

fn find_account(conn: &mut PgConnection, user_id: Uuid) -> QueryResult<Option<Account>> {
    let Some(user) = users::table.find(user_id).first::<User>(conn).optional()? else {
        return Ok(None);
    };
    let ban = user_bans::table
        .find(user_id)
        .first::<UserBan>(conn)
        .optional()?;
    Ok(Some(Account { user, ban }))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteOptions {
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub copyright: bool,
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub remove_money: bool,
    /// Owner reports the stored bytes are gone.
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub source_missing: bool,
    #[serde(default)]
    pub comments: Option<String>,
}

pub fn delete_document(
    conn: &mut PgConnection,
    document_id: Uuid,
    requester_id: Uuid,
    options: &DeleteOptions,
) -> AppResult<DocumentSummary> {
    let document: Document = documents::table.find(document_id).first(conn)?;
    let is_admin = find_account(conn, requester_id)?.is_some_and(|account| account.user.is_admin());

    if !document.is_owned_by(requester_id) && !is_admin {
        return Err(AppError::forbidden("FI016", "only the owner can delete this document"));
    }
    if document.deleted {
        return Err(AppError::conflict("FI017", "document already deleted"));
    }

    let reason = match (is_admin, options.copyright) {
        (true, true) => DeletionReason::Copyright,
        (true, false) => DeletionReason::Moderation,
        (false, _) if options.source_missing => DeletionReason::SourceMissing,
        (false, _) => DeletionReason::SelfDeleted,
    };
    let penalty = if reason == DeletionReason::Copyright {
        -(document.downloads + document.views + 1)
    } else {
        -1
    };

    conn.transaction(|conn| {
        if reason == DeletionReason::SourceMissing {
            diesel::update(documents::table.find(document.id))
                .set(documents::stored.eq(false))
                .execute(conn)?;
        }
        soft_delete(conn, &document, reason, options.comments.as_deref())?;

        if let Some(owner_id) = document.owner_id {
            popularity::adjust(
                conn,
                Some(requester_id),
                owner_id,
                popularity::DELETE_FILE,
                document.id,
                penalty,
            )?;

            if is_admin && options.remove_money {
                diesel::update(documents::table.find(document.id))
                    .set(documents::money.eq(rust_decimal::Decimal::ZERO))
                    .execute(conn)?;
                diesel::update(users::table.find(owner_id))
                    .set(users::money.eq(greatest_numeric(
                        users::money - document.money,
                        rust_decimal::Decimal::ZERO,
                    )))
                    .execute(conn)?;
            }
        }
        Ok::<_, diesel::result::Error>(())
    })?;

    info!(%document_id, %requester_id, ?reason, "document deleted");
    let document: Document = documents::table.find(document_id).first(conn)?;
    Ok(document.into())
}

pub fn recover_document(
    conn: &mut PgConnection,
    document_id: Uuid,
    requester_id: Option<Uuid>,
) -> AppResult<DocumentSummary> {
    let Some(requester_id) = requester_id else {
        return Err(AppError::forbidden("FI022", "authentication required"));
    };
    let document = documents::table
        .find(document_id)
        .first::<Document>(conn)
        .optional()?
        .ok_or_else(|| AppError::not_found("FI023"))?;

    if !document.deleted {
        return Err(AppError::bad_request("FI025", "document is not deleted"));
    }
    if document.deleted_reason != Some(DeletionReason::SelfDeleted.code()) {
        return Err(AppError::forbidden(
            "FI024",
            "only documents deleted by their owner can be recovered",
        ));
    }
    let banned = find_account(conn, requester_id)?
        .map_or(true, |account| account.is_globally_banned());
    if banned || !document.is_owned_by(requester_id) {
        return Err(AppError::forbidden("FI026", "only the owner can recover this document"));
    }

    conn.transaction(|conn| {
        diesel::update(documents::table.find(document.id))
            .set((
                documents::deleted.eq(false),
                documents::deleted_reason.eq(None::<i16>),
                documents::deleted_comments.eq(None::<String>),
                documents::deleted_at.eq(None::<NaiveDateTime>),
                documents::updated_at.eq(Utc::now().naive_utc()),
            ))
            .execute(conn)?;

        diesel::update(
            uploads::table
                .find(document.upload_id)
                .filter(uploads::deleted.eq(true)),
        )
        .set((
            uploads::deleted.eq(false),
            uploads::deleted_reason.eq(None::<i16>),
            uploads::deleted_comments.eq(None::<String>),
            uploads::deleted_at.eq(None::<NaiveDateTime>),
            uploads::updated_at.eq(Utc::now().naive_utc()),
        ))
        .execute(conn)?;
        Ok::<_, diesel::result::Error>(())
    })?;

    info!(%document_id, %requester_id, "document recovered");
    let document: Document = documents::table.find(document_id).first(conn)?;
    Ok(document.into())
}

#[derive(Debug, Deserialize)]
pub struct ShareRequest {
    pub via: Option<String>,
    pub recipient: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ShareReceipt {
    pub share_id: i64,
    pub user_id: Uuid,
    pub document: DocumentSummary,
}

pub fn share_document(
    conn: &mut PgConnection,
    document_id: Uuid,
    requester_id: Uuid,
    request: &ShareRequest,
) -> AppResult<ShareReceipt> {
    let via = request
        .via
        .as_deref()
        .map(str::trim)
        .filter(|via| !via.is_empty())
        .ok_or_else(|| AppError::bad_request("FI029", "share channel is required"))?;
    let recipient = request
        .recipient
        .as_deref()
        .map(str::trim)
        .filter(|recipient| !recipient.is_empty());

    let blocked: bool = select(exists(
        share_blocks::table
            .filter(share_blocks::user_id.eq(requester_id))
            .filter(
                share_blocks::block_all
                    .eq(true)
                    .or(share_blocks::blocked.eq(recipient)),
            ),
    ))
    .get_result(conn)?;
    if blocked {
        return Err(AppError::forbidden("FI030", "sharing with this recipient is blocked"));
    }

    if via == "email" && !recipient.is_some_and(is_valid_email) {
        return Err(AppError::bad_request("FI032", "recipient is not a valid e-mail address"));
    }

    documents::table
        .find(document_id)
        .filter(documents::deleted.eq(false))
        .select(documents::id)
        .first::<Uuid>(conn)?;

    let share_id = conn.transaction(|conn| {
        diesel::update(documents::table.find(document_id))
            .set(documents::shares.eq(documents::shares + 1))
            .execute(conn)?;
        diesel::insert_into(shares::table)
            .values(&NewShare {
                user_id: requester_id,
                document_id,
                via: via.to_string(),
                recipient: recipient.map(str::to_string),
            })
            .returning(shares::id)
            .get_result::<i64>(conn)
    })?;

    info!(%document_id, %requester_id, via, share_id, "document shared");
    let document: Document = documents::table.find(document_id).first(conn)?;
    Ok(ShareReceipt {
        share_id,
        user_id: requester_id,
        document: document.into(),
    })
}

static EMAIL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"^(([^<>()\[\]\\.,;:\s@"]+(\.[^<>()\[\]\\.,;:\s@"]+)*)|(".+"))@((\[[0-9]{1,3}\.[0-9]{1,3}\.[0-9]{1,3}\.[0-9]{1,3}\])|(([a-zA-Z\-0-9]+\.)+[a-zA-Z]{2,}))$"#,
    )
    .expect("e-mail pattern compiles")
});

/// Matched case-insensitively. Accepts quoted local parts and IPv4 literal domains.
pub fn is_valid_email(candidate: &str) -> bool {
    EMAIL_PATTERN.is_match(&candidate.to_lowercase())
}

pub async fn thumbnail(
    conn: &mut PgConnection,
    renderer: &dyn RenderService,
    document_id: Uuid,
) -> AppResult<ServableReference> {
    let extension = documents::table
        .find(document_id)
        .filter(documents::deleted.eq(false))
        .filter(documents::stored.eq(true))
        .select(documents::extension)
        .first::<String>(conn)
        .optional()?
        .ok_or_else(|| AppError::not_found("FI011"))?;

    if !extension.eq_ignore_ascii_case("pdf") {
        return Err(AppError::bad_request(
            "FI012",
            "thumbnails are only available for PDF documents",
        ));
    }

    renderer.thumbnail(document_id).await.map_err(|err| {
        error!(%document_id, error = ?err, "thumbnail request failed");
        AppError::new(StatusCode::BAD_GATEWAY, CODE_UNEXPECTED, "upstream service unavailable")
    })
}
