use axum::http::HeaderValue;
use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
    Router,
};
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::state::AppState;

pub mod access;
pub mod documents;
pub mod health;
pub mod reactions;

const MAX_BODY_BYTES: usize = 64 * 1024;

pub fn create_router(state: AppState) -> Router<()> {
    let cors = if let Some(origins) = state.config.cors_allowed_origin.as_ref() {
        let headers: Vec<HeaderValue> = origins
            .split(',')
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .filter_map(|value| match value.parse::<HeaderValue>() {
                Ok(header) => Some(header),
                Err(_) => {
                    warn!(origin = value, "ignoring invalid CORS allowed origin");
                    None
                }
            })
            .collect();

        CorsLayer::new()
            .allow_origin(AllowOrigin::list(headers))
            .allow_methods(AllowMethods::mirror_request())
            .allow_headers(AllowHeaders::mirror_request())
            .allow_credentials(true)
    } else {
        CorsLayer::new()
            .allow_origin(AllowOrigin::mirror_request())
            .allow_methods(AllowMethods::mirror_request())
            .allow_headers(AllowHeaders::mirror_request())
            .allow_credentials(true)
    };

    let documents_routes = Router::new()
        .route("/:id", delete(documents::delete_document))
        .route("/:id/view", post(access::view_document))
        .route("/:id/download", post(access::download_document))
        .route("/:id/print", post(access::print_document))
        .route(
            "/:id/preview",
            get(access::preview_document).post(access::preview_document),
        )
        .route("/:id/thumbnail", get(access::document_thumbnail))
        .route("/:id/like", post(reactions::toggle_reaction))
        .route("/:id/likes", get(reactions::list_reactions))
        .route("/:id/share", post(documents::share_document))
        .route("/:id/recover", post(documents::recover_document));

    Router::new()
        .nest("/api/documents", documents_routes)
        .route("/api/health", get(health::health_check))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
}
