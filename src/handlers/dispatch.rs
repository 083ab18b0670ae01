//! Fallback handler: every request not served by a fixed route goes through the kernel.

use crate::error::AppError;
use crate::http::Request;
use crate::response::HttpResponse;
use crate::state::AppState;
use axum::extract::State;
use std::sync::Arc;

/// Runs the synchronous dispatch core on the blocking pool.
pub async fn dispatch(State(state): State<AppState>, request: Request) -> Result<HttpResponse, AppError> {
    let kernel = Arc::clone(&state.kernel);
    tokio::task::spawn_blocking(move || kernel.handle(request))
        .await
        .map_err(|e| AppError::Internal(format!("dispatch task failed: {}", e)))
}
