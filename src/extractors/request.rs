//! Buffer an axum request into a [`Request`] the dispatcher can own.

use crate::error::AppError;
use crate::http::Request;
use async_trait::async_trait;
use axum::{
    body::Bytes,
    extract::{FromRequest, Request as AxumRequest},
};

#[async_trait]
impl<S> FromRequest<S> for Request
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: AxumRequest, state: &S) -> Result<Self, Self::Rejection> {
        let method = req.method().clone();
        let headers = req.headers().clone();
        let uri = req
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| req.uri().path().to_string());
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|rej| AppError::http(rej.status(), rej.body_text()))?;
        Ok(Request::new(method, uri, headers, bytes))
    }
}
