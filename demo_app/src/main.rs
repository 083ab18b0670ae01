//! Demo application: users, posts and tags served through dispatch-kit.
//!
//! Run from repo root: `cargo run -p demo-app`
//! Without `DATABASE_URL` the in-memory engine is used and seeded with a few rows.

mod controllers;
mod models;

use dispatch_kit::events::{Event, EventBus, AFTER_EXECUTE};
use dispatch_kit::{app_router, AppState, Kernel, MemoryStore, PersistenceEngine, PgEngine, Settings, Subscriber};
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Logs every controller outcome.
struct AuditSubscriber;

impl Subscriber for AuditSubscriber {
    fn subscribe(self: Arc<Self>, bus: &mut EventBus) {
        bus.on(AFTER_EXECUTE, |event| {
            if let Event::AfterExecute {
                controller,
                action,
                result,
            } = event
            {
                tracing::info!(controller = %controller, action = %action, ok = result.is_ok(), "action finished");
            }
        });
    }
}

fn seeded_store() -> MemoryStore {
    let store = MemoryStore::new();
    store.seed("users", json!({"id": 1, "name": "ada", "email": "ada@example.com", "password": "x"}));
    store.seed("users", json!({"id": 2, "name": "grace", "email": "grace@example.com", "password": "y"}));
    store.seed("posts", json!({"id": 1, "user_id": 1, "title": "Notes on the engine", "published": 1}));
    store.seed("posts", json!({"id": 2, "user_id": 1, "title": "Draft", "published": 0}));
    store.seed("tags", json!({"id": 1, "label": "math"}));
    store.seed("post_tag", json!({"post_id": 1, "tag_id": 1}));
    store
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let settings = Settings::from_env()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("dispatch_kit=info,demo_app=info")),
        )
        .init();

    let mut pool = None;
    let engine: Arc<dyn PersistenceEngine> = match &settings.database_url {
        Some(url) => {
            let engine = PgEngine::connect(url).await?;
            pool = Some(engine.pool().clone());
            Arc::new(engine)
        }
        None => Arc::new(seeded_store()),
    };

    let bind_addr = settings.bind_addr.clone();
    let builder = models::register(Kernel::builder(settings))
        .alias("auth", dispatch_kit::http::BEARER_AUTH)
        .alias("log", dispatch_kit::http::REQUEST_LOG)
        .global("log")
        .subscriber("audit", Arc::new(AuditSubscriber))
        .engine(engine);
    let kernel = controllers::register(builder).build()?;

    let mut state = AppState::new(kernel);
    if let Some(pool) = pool {
        state = state.with_pool(pool);
    }
    let app = app_router(state);
    let listener = TcpListener::bind(&bind_addr).await?;
    tracing::info!("demo app listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
