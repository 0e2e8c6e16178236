use axum::extract::{Json, Path, State};
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::error::AppResult;
use crate::reactions::{self, ReactionError, ReactionTotals, ReactionView, Vote};
use crate::state::AppState;
use crate::utils::json::as_integer;

#[derive(Debug, Deserialize)]
pub struct ReactionRequest {
    #[serde(default)]
    pub value: Option<Value>,
}

pub async fn toggle_reaction(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
    user: AuthenticatedUser,
    body: Option<Json<ReactionRequest>>,
) -> AppResult<Json<ReactionTotals>> {
    let value = body.and_then(|Json(request)| request.value);
    let vote = as_integer(value.as_ref())
        .ok_or(ReactionError::InvalidVote)
        .and_then(Vote::from_value)?;

    let mut conn = state.db()?;
    let totals = reactions::toggle_reaction(&mut conn, document_id, user.user_id, vote)?;
    Ok(Json(totals))
}

pub async fn list_reactions(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
) -> AppResult<Json<Vec<ReactionView>>> {
    let mut conn = state.db()?;
    Ok(Json(reactions::list_reactions(&mut conn, document_id)?))
}
