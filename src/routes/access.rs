use axum::extract::{Json, Path, State};
use axum::http::HeaderMap;
use serde::Deserialize;
use uuid::Uuid;

use crate::access::{self, AccessMode, AccessRequest, ServableReference, ServedDocument};
use crate::auth::MaybeAuthenticated;
use crate::documents;
use crate::error::AppResult;
use crate::state::AppState;
use crate::utils::json::deserialize_flag;

#[derive(Debug, Default, Deserialize)]
pub struct AccessBody {
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub premium: bool,
    #[serde(default)]
    pub captcha: Option<String>,
}

/// First hop of `x-forwarded-for`, else `x-real-ip`.
fn client_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|value| value.to_str().ok())
        })
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(str::to_string)
}

async fn serve(
    state: AppState,
    document_id: Uuid,
    mode: AccessMode,
    user: MaybeAuthenticated,
    headers: HeaderMap,
    body: Option<Json<AccessBody>>,
) -> AppResult<Json<ServedDocument>> {
    let body = body.map(|Json(body)| body).unwrap_or_default();
    let request = AccessRequest {
        document_id,
        mode,
        premium: body.premium,
        captcha_token: body.captcha,
        client_ip: client_ip(&headers),
    };

    let mut conn = state.db()?;
    let served = access::resolve_and_serve(&state, &mut conn, user.user_id(), request)
        .await
        .map_err(|err| err.into_app_error(mode))?;
    Ok(Json(served))
}

pub async fn view_document(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
    user: MaybeAuthenticated,
    headers: HeaderMap,
    body: Option<Json<AccessBody>>,
) -> AppResult<Json<ServedDocument>> {
    serve(state, document_id, AccessMode::View, user, headers, body).await
}

pub async fn download_document(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
    user: MaybeAuthenticated,
    headers: HeaderMap,
    body: Option<Json<AccessBody>>,
) -> AppResult<Json<ServedDocument>> {
    serve(state, document_id, AccessMode::Download, user, headers, body).await
}

pub async fn print_document(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
    user: MaybeAuthenticated,
    headers: HeaderMap,
    body: Option<Json<AccessBody>>,
) -> AppResult<Json<ServedDocument>> {
    serve(state, document_id, AccessMode::Print, user, headers, body).await
}

pub async fn preview_document(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
    user: MaybeAuthenticated,
    headers: HeaderMap,
) -> AppResult<Json<ServedDocument>> {
    serve(state, document_id, AccessMode::Preview, user, headers, None).await
}

pub async fn document_thumbnail(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
) -> AppResult<Json<ServableReference>> {
    let mut conn = state.db()?;
    let reference = documents::thumbnail(&mut conn, state.renderer.as_ref(), document_id).await?;
    Ok(Json(reference))
}
