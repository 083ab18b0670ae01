//! Extractors that adapt axum requests to the dispatch layer.

mod request;
