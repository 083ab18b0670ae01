//! Response envelope and typed responses.
//!
//! A controller returns a [`Reply`]. Plain values are wrapped in the success envelope
//! `{ "code": 200, "message": "success", "data": ... }`; typed responses ([`HttpResponse`],
//! built from [`JsonResponse`] or [`FileResponse`]) are sent as-is.

use crate::error::AppError;
use axum::{
    body::{Body, Bytes},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};

/// A fully materialized response. Its send contract is axum's [`IntoResponse`].
#[derive(Clone, Debug)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn new(status: StatusCode, content_type: &'static str, body: impl Into<Bytes>) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
        HttpResponse {
            status,
            headers,
            body: body.into(),
        }
    }

    pub fn empty(status: StatusCode) -> Self {
        HttpResponse {
            status,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// Decode the body as JSON. Mostly useful in tests.
    pub fn json(&self) -> Result<Value, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

impl IntoResponse for HttpResponse {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

/// Standard `{code, message, data}` envelope.
#[derive(Clone, Debug, Serialize)]
pub struct JsonResponse {
    pub code: u16,
    pub message: String,
    pub data: Value,
}

impl JsonResponse {
    pub fn success(data: Value) -> Self {
        JsonResponse {
            code: 200,
            message: "success".into(),
            data,
        }
    }

    pub fn error(message: impl Into<String>, code: u16) -> Self {
        JsonResponse {
            code,
            message: message.into(),
            data: Value::Null,
        }
    }

    /// The HTTP status follows the envelope code when it is a valid status.
    pub fn into_http(self) -> HttpResponse {
        let status = StatusCode::from_u16(self.code).unwrap_or(StatusCode::OK);
        match serde_json::to_vec(&self) {
            Ok(body) => HttpResponse::new(status, "application/json; charset=utf-8", body),
            Err(e) => {
                tracing::error!(error = %e, "failed to encode response envelope");
                HttpResponse::empty(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }
}

/// Binary download of a file on disk.
#[derive(Clone, Debug)]
pub struct FileResponse {
    path: PathBuf,
    download_name: Option<String>,
}

impl FileResponse {
    /// Fails with 404 when the path is not a readable file.
    pub fn new(path: impl AsRef<Path>, download_name: Option<String>) -> Result<Self, AppError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(AppError::http(StatusCode::NOT_FOUND, "File not found."));
        }
        Ok(FileResponse {
            path: path.to_path_buf(),
            download_name,
        })
    }

    pub fn into_http(self) -> Result<HttpResponse, AppError> {
        let bytes = std::fs::read(&self.path)
            .map_err(|_| AppError::http(StatusCode::NOT_FOUND, "File not found."))?;
        let name = self.download_name.unwrap_or_else(|| {
            self.path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "download".into())
        });
        let encoded = urlencoding::encode(&name);
        let mut response = HttpResponse::new(StatusCode::OK, "application/octet-stream", bytes);
        let disposition = format!(
            "attachment; filename=\"{}\"; filename*=UTF-8''{}",
            encoded, encoded
        );
        let headers = &mut response.headers;
        if let Ok(v) = HeaderValue::from_str(&disposition) {
            headers.insert(header::CONTENT_DISPOSITION, v);
        }
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("must-revalidate"));
        headers.insert(header::EXPIRES, HeaderValue::from_static("0"));
        Ok(response)
    }
}

/// What a controller action (or a middleware) hands back.
#[derive(Clone, Debug)]
pub enum Reply {
    /// Wrapped in the success envelope when sent.
    Value(Value),
    /// Already typed; bypasses the envelope.
    Response(HttpResponse),
}

impl Reply {
    /// Serialize any value into a plain reply.
    pub fn json<T: Serialize>(value: &T) -> Result<Reply, AppError> {
        serde_json::to_value(value)
            .map(Reply::Value)
            .map_err(|e| AppError::Internal(format!("serialize reply: {}", e)))
    }

    pub fn into_http(self) -> HttpResponse {
        match self {
            Reply::Value(v) => JsonResponse::success(v).into_http(),
            Reply::Response(r) => r,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Reply::Value(_) => StatusCode::OK,
            Reply::Response(r) => r.status,
        }
    }
}

impl From<Value> for Reply {
    fn from(v: Value) -> Self {
        Reply::Value(v)
    }
}

impl From<&str> for Reply {
    fn from(s: &str) -> Self {
        Reply::Value(Value::String(s.to_string()))
    }
}

impl From<String> for Reply {
    fn from(s: String) -> Self {
        Reply::Value(Value::String(s))
    }
}

impl From<HttpResponse> for Reply {
    fn from(r: HttpResponse) -> Self {
        Reply::Response(r)
    }
}

impl From<JsonResponse> for Reply {
    fn from(r: JsonResponse) -> Self {
        Reply::Response(r.into_http())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn plain_values_get_the_success_envelope() {
        let response = Reply::from(json!({"id": 42})).into_http();
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(
            response.json().unwrap(),
            json!({"code": 200, "message": "success", "data": {"id": 42}})
        );
    }

    #[test]
    fn typed_responses_bypass_the_envelope() {
        let typed = HttpResponse::new(StatusCode::ACCEPTED, "text/plain", "raw");
        let response = Reply::from(typed).into_http();
        assert_eq!(response.status, StatusCode::ACCEPTED);
        assert_eq!(&response.body[..], b"raw");
    }

    #[test]
    fn explicit_error_envelope_sets_status() {
        let response = Reply::from(JsonResponse::error("User not found", 404)).into_http();
        assert_eq!(response.status, StatusCode::NOT_FOUND);
        assert_eq!(response.json().unwrap()["message"], "User not found");
    }

    #[test]
    fn file_response_sends_attachment() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"report").unwrap();
        let response = FileResponse::new(file.path(), Some("q1 report.txt".into()))
            .unwrap()
            .into_http()
            .unwrap();
        assert_eq!(&response.body[..], b"report");
        let disposition = response.headers.get(header::CONTENT_DISPOSITION).unwrap();
        assert!(disposition.to_str().unwrap().contains("q1%20report.txt"));
    }

    #[test]
    fn missing_file_is_404() {
        let err = FileResponse::new("/definitely/not/here.bin", None).unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }
}
