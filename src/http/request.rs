//! Normalized view of an inbound HTTP request.

use crate::error::AppError;
use axum::{
    body::Bytes,
    extract::Query,
    http::{header, HeaderMap, HeaderName, HeaderValue, Method, Uri},
};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::OnceLock;

/// Method, raw URI, headers, query (GET) and form (POST) maps, raw body, and a lazily decoded
/// JSON body.
#[derive(Clone, Debug)]
pub struct Request {
    method: Method,
    uri: String,
    headers: HeaderMap,
    query: HashMap<String, String>,
    form: HashMap<String, String>,
    body: Bytes,
    json: OnceLock<Value>,
}

impl Request {
    pub fn new(method: Method, uri: impl Into<String>, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        let uri = uri.into();
        let body = body.into();
        let query = parse_query(&uri);
        let form = if content_type_contains(&headers, "application/x-www-form-urlencoded") {
            parse_form(&body)
        } else {
            HashMap::new()
        };
        Request {
            method,
            uri,
            headers,
            query,
            form,
            body,
            json: OnceLock::new(),
        }
    }

    pub fn get(uri: impl Into<String>) -> Self {
        Self::new(Method::GET, uri, HeaderMap::new(), Bytes::new())
    }

    /// POST with an `application/json` body.
    pub fn post_json(uri: impl Into<String>, body: &Value) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Self::new(Method::POST, uri, headers, body.to_string())
    }

    /// Adds a header; invalid names or values are ignored.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(n), Ok(v)) = (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
            self.headers.append(n, v);
        }
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Raw URI as received (path plus query).
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Path part of the URI, not normalized.
    pub fn path(&self) -> &str {
        self.uri.split(['?', '#']).next().unwrap_or("")
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn query(&self, key: &str) -> Option<&str> {
        self.query.get(key).map(String::as_str)
    }

    pub fn post(&self, key: &str) -> Option<&str> {
        self.form.get(key).map(String::as_str)
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Decoded JSON body. Empty object unless Content-Type says JSON; malformed JSON is an error.
    pub fn json(&self) -> Result<&Value, AppError> {
        if let Some(v) = self.json.get() {
            return Ok(v);
        }
        let decoded = self.decode_json()?;
        Ok(self.json.get_or_init(|| decoded))
    }

    fn decode_json(&self) -> Result<Value, AppError> {
        if !content_type_contains(&self.headers, "application/json") || self.body.is_empty() {
            return Ok(Value::Object(Map::new()));
        }
        serde_json::from_slice(&self.body).map_err(|e| AppError::BadRequest(format!("malformed JSON body: {}", e)))
    }

    /// Lookup with precedence JSON body > form body > query string.
    pub fn input(&self, key: &str) -> Result<Option<Value>, AppError> {
        if let Some(v) = self.json()?.get(key) {
            return Ok(Some(v.clone()));
        }
        Ok(self
            .post(key)
            .or_else(|| self.query(key))
            .map(|s| Value::String(s.to_string())))
    }
}

fn content_type_contains(headers: &HeaderMap, needle: &str) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_ascii_lowercase().contains(needle))
        .unwrap_or(false)
}

fn parse_query(uri: &str) -> HashMap<String, String> {
    uri.parse::<Uri>()
        .ok()
        .and_then(|u| Query::<HashMap<String, String>>::try_from_uri(&u).ok())
        .map(|Query(q)| q)
        .unwrap_or_default()
}

fn parse_form(body: &[u8]) -> HashMap<String, String> {
    let text = String::from_utf8_lossy(body);
    text.split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
            (form_decode(k), form_decode(v))
        })
        .collect()
}

/// `application/x-www-form-urlencoded` decoding: `+` is a space, then percent-decoding.
pub fn form_decode(s: &str) -> String {
    let spaced = s.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => spaced,
    }
}
