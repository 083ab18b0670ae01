//! Request view, middleware contract and the onion pipeline.

pub mod middleware;
pub mod pipeline;
pub mod request;

pub use middleware::{BearerAuth, MiddlewareRegistry, RequestLog, BEARER_AUTH, REQUEST_LOG};
pub use pipeline::{from_fn, merge_unique, Middleware, Next, Pipeline};
pub use request::{form_decode, Request};
