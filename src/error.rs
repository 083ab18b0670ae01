//! Typed errors and HTTP mapping.

use crate::response::{HttpResponse, JsonResponse};
use axum::{
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid {key}: '{value}' ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Raised while compiling the route table. Fatal: startup must abort.
#[derive(Error, Debug)]
pub enum RouteError {
    #[error(
        "route conflict: [{method} {path}] is declared by both {first_controller}::{first_action} and {second_controller}::{second_action}"
    )]
    Conflict {
        method: String,
        path: String,
        first_controller: String,
        first_action: String,
        second_controller: String,
        second_action: String,
    },
    #[error("invalid route template '{template}': {reason}")]
    InvalidTemplate { template: String, reason: String },
}

/// Failures reported by a persistence engine.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
    #[error("store: {0}")]
    Other(String),
}

#[derive(Error, Debug)]
pub enum OrmError {
    #[error("unknown model: {0}")]
    UnknownModel(String),
    #[error("unknown property '{property}' on {model}")]
    UnknownProperty { model: String, property: String },
    #[error("mass assignment: property '{property}' of {model} is not fillable")]
    MassAssignment { model: String, property: String },
    #[error("relation '{relation}' of {model} cannot be assigned")]
    RelationAssignment { model: String, relation: String },
    #[error("{model} has no primary key value")]
    MissingKey { model: String },
    #[error("{model}: column '{column}' is mapped by both '{first}' and '{second}'")]
    DuplicateColumn {
        model: String,
        column: String,
        first: String,
        second: String,
    },
    #[error("unknown cast: {0}")]
    UnknownCast(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Request-time error taxonomy. Propagates unmodified through the pipeline and the dispatcher;
/// the boundary turns it into an error envelope.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    MissingParameter(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("unsupported parameter binding: {0}")]
    UnsupportedBinding(String),
    #[error("middleware configuration: {0}")]
    MiddlewareConfiguration(String),
    #[error("{message}")]
    Http {
        status: StatusCode,
        message: String,
        headers: Vec<(String, String)>,
    },
    #[error(transparent)]
    Orm(#[from] OrmError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("{0}")]
    Internal(String),
}

impl AppError {
    /// Typed error with a status code and no extra headers.
    pub fn http(status: StatusCode, message: impl Into<String>) -> Self {
        AppError::Http {
            status,
            message: message.into(),
            headers: Vec::new(),
        }
    }

    pub fn with_header(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        match self {
            AppError::Http {
                status,
                message,
                mut headers,
            } => {
                headers.push((name.into(), value.into()));
                AppError::Http {
                    status,
                    message,
                    headers,
                }
            }
            other => other,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::MissingParameter(_) | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Http { status, .. } => *status,
            AppError::Orm(OrmError::MassAssignment { .. }) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Orm(OrmError::UnknownProperty { .. }) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::UnsupportedBinding(_)
            | AppError::MiddlewareConfiguration(_)
            | AppError::Orm(_)
            | AppError::Store(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Headers the error asks to be sent with its response.
    pub fn headers(&self) -> &[(String, String)] {
        match self {
            AppError::Http { headers, .. } => headers,
            _ => &[],
        }
    }

    /// Boundary conversion: status from the error, declared headers applied before the body.
    pub fn into_http_response(self) -> HttpResponse {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, status = status.as_u16(), "unhandled error");
        }
        let mut headers = HeaderMap::new();
        for (name, value) in self.headers() {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(n), Ok(v)) => {
                    headers.append(n, v);
                }
                _ => tracing::warn!(header = %name, "dropping invalid error header"),
            }
        }
        let mut response = JsonResponse::error(self.to_string(), status.as_u16()).into_http();
        response.status = status;
        for (name, value) in headers.iter() {
            response.headers.append(name.clone(), value.clone());
        }
        response
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        self.into_http_response().into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_error_carries_status_and_headers() {
        let err = AppError::http(StatusCode::UNAUTHORIZED, "Unauthorized")
            .with_header("WWW-Authenticate", "Bearer");
        let response = err.into_http_response();
        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers.get("www-authenticate").unwrap(), "Bearer");
        let body: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
        assert_eq!(body["code"], 401);
        assert_eq!(body["message"], "Unauthorized");
        assert!(body["data"].is_null());
    }

    #[test]
    fn untyped_errors_default_to_500() {
        let response = AppError::Internal("boom".into()).into_http_response();
        assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
        let body: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
        assert_eq!(body["code"], 500);
        assert_eq!(body["message"], "boom");
    }

    #[test]
    fn missing_parameter_is_400_with_message() {
        let err = AppError::MissingParameter("user id not provided".into());
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.to_string(), "user id not provided");
    }
}
