//! Common routes: health, readiness, version and a summary of the dispatch table.

use crate::state::AppState;
use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::Serialize;

#[derive(Serialize)]
struct HealthBody {
    status: &'static str,
}

#[derive(Serialize)]
struct ReadyBody {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    database: Option<&'static str>,
    routes: usize,
}

async fn health() -> Json<HealthBody> {
    Json(HealthBody { status: "ok" })
}

async fn ready(State(state): State<AppState>) -> Result<Json<ReadyBody>, (StatusCode, Json<ReadyBody>)> {
    let routes = state.kernel.routes().len();
    let Some(pool) = &state.pool else {
        return Ok(Json(ReadyBody {
            status: "ok",
            database: None,
            routes,
        }));
    };
    if sqlx::query("SELECT 1").fetch_optional(pool).await.is_err() {
        return Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadyBody {
                status: "degraded",
                database: Some("unavailable"),
                routes,
            }),
        ));
    }
    Ok(Json(ReadyBody {
        status: "ok",
        database: Some("ok"),
        routes,
    }))
}

async fn version() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION")
    }))
}

#[derive(Serialize)]
struct InfoBody {
    name: &'static str,
    version: &'static str,
    mode: &'static str,
    routes: Vec<RouteSummary>,
}

#[derive(Serialize)]
struct RouteSummary {
    methods: Vec<String>,
    path: String,
    handler: String,
}

async fn info(State(state): State<AppState>) -> Json<InfoBody> {
    let mode = if state.kernel.settings().mode.is_production() {
        "production"
    } else {
        "development"
    };
    let routes = state
        .kernel
        .routes()
        .entries()
        .iter()
        .map(|e| RouteSummary {
            methods: e.record.methods.clone(),
            path: e.record.path.clone(),
            handler: format!("{}::{}", e.record.controller, e.record.action),
        })
        .collect();
    Json(InfoBody {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        mode,
        routes,
    })
}

/// GET /health, /ready, /version and /info.
pub fn common_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/version", get(version))
        .route("/info", get(info))
}
