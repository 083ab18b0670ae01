//! Shared application state for the axum layer.

use crate::kernel::Kernel;
use sqlx::PgPool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub kernel: Arc<Kernel>,
    /// Present when a database is configured; `/ready` checks it.
    pub pool: Option<PgPool>,
}

impl AppState {
    pub fn new(kernel: Kernel) -> Self {
        AppState {
            kernel: Arc::new(kernel),
            pool: None,
        }
    }

    pub fn with_pool(mut self, pool: PgPool) -> Self {
        self.pool = Some(pool);
        self
    }
}
