use axum::extract::{Json, Path, State};
use uuid::Uuid;

use crate::auth::{AuthenticatedUser, MaybeAuthenticated};
use crate::documents::{self, DeleteOptions, DocumentSummary, ShareReceipt, ShareRequest};
use crate::error::{AppError, AppResult};
use crate::state::AppState;

pub async fn delete_document(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
    user: AuthenticatedUser,
    body: Option<Json<DeleteOptions>>,
) -> AppResult<Json<DocumentSummary>> {
    let options = body.map(|Json(options)| options).unwrap_or_default();
    let mut conn = state.db()?;
    let summary = documents::delete_document(&mut conn, document_id, user.user_id, &options)?;
    Ok(Json(summary))
}

pub async fn recover_document(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
    user: MaybeAuthenticated,
) -> AppResult<Json<DocumentSummary>> {
    let mut conn = state.db()?;
    let summary = documents::recover_document(&mut conn, document_id, user.user_id())?;
    Ok(Json(summary))
}

pub async fn share_document(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
    user: AuthenticatedUser,
    body: Option<Json<ShareRequest>>,
) -> AppResult<Json<ShareReceipt>> {
    let Some(Json(request)) = body else {
        return Err(AppError::bad_request("FI029", "share channel is required"));
    };
    let mut conn = state.db()?;
    let receipt = documents::share_document(&mut conn, document_id, user.user_id, &request)?;
    Ok(Json(receipt))
}
