//! Route declarations, compilation into a route table, and request dispatch.

mod cache;
mod compiler;
mod declare;
mod dispatcher;
pub mod path;

pub use cache::DiscoveryCache;
pub use compiler::{RouteCompiler, RouteEntry, RouteRecord, RouteTable};
pub use declare::{ActionDecl, BodyTarget, ControllerDecl, ParamKind, ParamSpec, PathParam, RouteDecl, ScalarType};
pub use dispatcher::Dispatcher;
