//! Dispatch Kit: declaration-driven HTTP dispatch with a declarative entity mapping layer.

pub mod case;
pub mod config;
pub mod container;
pub mod error;
pub mod events;
pub mod extractors;
pub mod handlers;
pub mod http;
pub mod kernel;
pub mod orm;
pub mod response;
pub mod routes;
pub mod routing;
pub mod sql;
pub mod state;
pub mod store;

pub use config::{AppMode, Settings};
pub use container::{Arg, Args, Container, Controller};
pub use error::{AppError, ConfigError, OrmError, RouteError, StoreError};
pub use events::{Event, EventBus, Subscriber, SubscriberRegistry};
pub use http::{from_fn, Middleware, MiddlewareRegistry, Next, Request};
pub use kernel::{Kernel, KernelBuilder};
pub use orm::{Entity, Model, ModelDecl, Orm};
pub use response::{FileResponse, HttpResponse, JsonResponse, Reply};
pub use routes::{app_router, common_routes};
pub use routing::{ActionDecl, ControllerDecl, ParamSpec, ScalarType};
pub use state::AppState;
pub use store::{MemoryStore, PersistenceEngine, PgEngine};
