//! Router assembly.

pub mod common;

use crate::handlers::dispatch;
use crate::state::AppState;
use axum::Router;
use tower_http::limit::RequestBodyLimitLayer;

pub use common::common_routes;

/// Common routes plus the dispatch fallback, with a request body size limit.
pub fn app_router(state: AppState) -> Router {
    let limit = state.kernel.settings().body_limit_bytes;
    common_routes()
        .fallback(dispatch)
        .layer(RequestBodyLimitLayer::new(limit))
        .with_state(state)
}
