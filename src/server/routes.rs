//! Router definition

use axum::{extract::DefaultBodyLimit, middleware, routing::*, Router};

use crate::server::{auth, handlers, limit, state::AppState};

/// `/api/*` is rate limited first, then token checked. `/health` is open.
pub fn create_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/upload", post(handlers::upload))
        .route("/upload/direct", post(handlers::upload_direct))
        .route("/download", get(handlers::download))
        .route("/list", get(handlers::list))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_api_token,
        ))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            limit::rate_limit,
        ));

    let body_limit = state.config.server.max_body_bytes;

    Router::new()
        .route("/health", get(|| async { "OK" }))
        .nest("/api", api)
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}
