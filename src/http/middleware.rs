//! Middleware registry (global list, aliases, constructors) and built-in middleware.

use crate::error::AppError;
use crate::http::pipeline::{Middleware, Next};
use crate::http::Request;
use crate::response::Reply;
use axum::http::StatusCode;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

pub const REQUEST_LOG: &str = "request_log";
pub const BEARER_AUTH: &str = "bearer_auth";

type Factory = Box<dyn Fn() -> Result<Arc<dyn Middleware>, String> + Send + Sync>;

enum Slot {
    Shared(Arc<dyn Middleware>),
    Factory(Factory),
}

/// Process-wide middleware table, built at startup and passed down explicitly.
#[derive(Default)]
pub struct MiddlewareRegistry {
    global: Vec<String>,
    aliases: HashMap<String, String>,
    slots: HashMap<String, Slot>,
}

impl MiddlewareRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a shared instance under a canonical identifier.
    pub fn register(&mut self, id: impl Into<String>, middleware: Arc<dyn Middleware>) -> &mut Self {
        self.slots.insert(id.into(), Slot::Shared(middleware));
        self
    }

    /// Register a constructor invoked for every request that runs this middleware.
    pub fn register_factory<F>(&mut self, id: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn() -> Result<Arc<dyn Middleware>, String> + Send + Sync + 'static,
    {
        self.slots.insert(id.into(), Slot::Factory(Box::new(factory)));
        self
    }

    pub fn alias(&mut self, alias: impl Into<String>, id: impl Into<String>) -> &mut Self {
        self.aliases.insert(alias.into(), id.into());
        self
    }

    /// Append to the global list, applied to every request before route middleware.
    pub fn push_global(&mut self, id: impl Into<String>) -> &mut Self {
        let id = self.canonical(&id.into());
        if !self.global.contains(&id) {
            self.global.push(id);
        }
        self
    }

    /// Move (or insert) an identifier to the front of the global list.
    pub fn prepend_global(&mut self, id: impl Into<String>) -> &mut Self {
        let id = self.canonical(&id.into());
        self.global.retain(|g| *g != id);
        self.global.insert(0, id);
        self
    }

    pub fn global(&self) -> &[String] {
        &self.global
    }

    pub fn contains(&self, id: &str) -> bool {
        self.slots.contains_key(&self.canonical(id))
    }

    /// Alias lookup; identifiers that are not aliases are returned unchanged.
    pub fn canonical(&self, id: &str) -> String {
        self.aliases.get(id).cloned().unwrap_or_else(|| id.to_string())
    }

    pub fn resolve(&self, id: &str) -> Result<Arc<dyn Middleware>, AppError> {
        let id = self.canonical(id);
        match self.slots.get(&id) {
            Some(Slot::Shared(m)) => Ok(Arc::clone(m)),
            Some(Slot::Factory(f)) => f().map_err(|e| {
                AppError::MiddlewareConfiguration(format!("middleware '{}' could not be constructed: {}", id, e))
            }),
            None => Err(AppError::MiddlewareConfiguration(format!(
                "middleware '{}' is not registered",
                id
            ))),
        }
    }

    pub fn resolve_all(&self, ids: &[String]) -> Result<Vec<Arc<dyn Middleware>>, AppError> {
        ids.iter().map(|id| self.resolve(id)).collect()
    }
}

/// One `info!` line per request with method, path, status and elapsed milliseconds.
pub struct RequestLog;

impl Middleware for RequestLog {
    fn handle(&self, request: Request, next: Next<'_>) -> Result<Reply, AppError> {
        let method = request.method().clone();
        let path = request.path().to_string();
        let started = Instant::now();
        let result = next(request);
        let status = match &result {
            Ok(reply) => reply.status(),
            Err(e) => e.status(),
        };
        tracing::info!(
            method = %method,
            path = %path,
            status = status.as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "request"
        );
        result
    }
}

/// Rejects requests whose `Authorization` header is not `Bearer <token>`.
pub struct BearerAuth {
    expected: String,
}

impl BearerAuth {
    pub fn new(token: impl AsRef<str>) -> Self {
        BearerAuth {
            expected: format!("Bearer {}", token.as_ref()),
        }
    }
}

impl Middleware for BearerAuth {
    fn handle(&self, request: Request, next: Next<'_>) -> Result<Reply, AppError> {
        match request.header("authorization") {
            Some(value) if value == self.expected => next(request),
            _ => Err(AppError::http(StatusCode::UNAUTHORIZED, "Unauthorized").with_header("WWW-Authenticate", "Bearer")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::pipeline::Pipeline;
    use serde_json::json;

    #[test]
    fn aliases_resolve_to_registered_middleware() {
        let mut registry = MiddlewareRegistry::new();
        registry.register(BEARER_AUTH, Arc::new(BearerAuth::new("secret"))).alias("auth", BEARER_AUTH);
        assert_eq!(registry.canonical("auth"), BEARER_AUTH);
        assert!(registry.resolve("auth").is_ok());
    }

    #[test]
    fn unknown_middleware_is_a_configuration_error() {
        let registry = MiddlewareRegistry::new();
        let err = match registry.resolve("ghost") {
            Err(e) => e,
            Ok(_) => panic!("expected failure"),
        };
        assert!(matches!(err, AppError::MiddlewareConfiguration(_)));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn failing_factory_is_a_configuration_error() {
        let mut registry = MiddlewareRegistry::new();
        registry.register_factory("broken", || Err("missing key".to_string()));
        assert!(matches!(registry.resolve("broken"), Err(AppError::MiddlewareConfiguration(_))));
    }

    #[test]
    fn global_list_is_canonical_and_unique() {
        let mut registry = MiddlewareRegistry::new();
        registry.alias("log", REQUEST_LOG).push_global("log").push_global(REQUEST_LOG);
        assert_eq!(registry.global(), &[REQUEST_LOG.to_string()]);
        registry.push_global("cors").prepend_global("cors");
        assert_eq!(registry.global(), &["cors".to_string(), REQUEST_LOG.to_string()]);
    }

    #[test]
    fn bearer_auth_rejects_wrong_token() {
        let layers: Vec<Arc<dyn Middleware>> = vec![Arc::new(BearerAuth::new("secret"))];
        let err = Pipeline::run(
            Request::get("/").with_header("Authorization", "Bearer nope"),
            &layers,
            |_| Ok(Reply::Value(json!("ok"))),
        )
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(err.headers(), &[("WWW-Authenticate".to_string(), "Bearer".to_string())]);

        let ok = Pipeline::run(
            Request::get("/").with_header("Authorization", "Bearer secret"),
            &layers,
            |_| Ok(Reply::Value(json!("ok"))),
        );
        assert!(ok.is_ok());
    }
}
