//! Onion-style middleware pipeline.
//!
//! Layers are folded from last to first; each one receives the next as its continuation and the
//! terminal thunk sits in the middle. A layer may call `next` and transform what comes back,
//! return without calling it (short-circuit), or fail, which unwinds every outer layer.

use crate::error::AppError;
use crate::http::Request;
use crate::response::Reply;
use std::sync::Arc;

/// Continuation handed to a middleware. Callable at most once.
pub type Next<'a> = Box<dyn FnOnce(Request) -> Result<Reply, AppError> + 'a>;

pub trait Middleware: Send + Sync {
    fn handle(&self, request: Request, next: Next<'_>) -> Result<Reply, AppError>;
}

impl<F> Middleware for F
where
    F: for<'a> Fn(Request, Next<'a>) -> Result<Reply, AppError> + Send + Sync,
{
    fn handle(&self, request: Request, next: Next<'_>) -> Result<Reply, AppError> {
        self(request, next)
    }
}

/// Wrap a closure as a shareable middleware.
pub fn from_fn<F>(f: F) -> Arc<dyn Middleware>
where
    F: for<'a> Fn(Request, Next<'a>) -> Result<Reply, AppError> + Send + Sync + 'static,
{
    Arc::new(f)
}

pub struct Pipeline;

impl Pipeline {
    pub fn run<'a, T>(input: Request, layers: &'a [Arc<dyn Middleware>], terminal: T) -> Result<Reply, AppError>
    where
        T: FnOnce(Request) -> Result<Reply, AppError> + 'a,
    {
        let chain = layers
            .iter()
            .rev()
            .fold(Box::new(terminal) as Next<'a>, |next, layer| {
                Box::new(move |request| layer.handle(request, next))
            });
        chain(input)
    }
}

/// Concatenate lists, keeping only the first occurrence of each identifier.
pub fn merge_unique<'a, I>(lists: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a [String]>,
{
    let mut out: Vec<String> = Vec::new();
    for list in lists {
        for id in list {
            if !out.contains(id) {
                out.push(id.clone());
            }
        }
    }
    out
}
