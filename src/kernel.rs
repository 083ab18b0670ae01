//! Application assembly: everything the dispatcher needs is built once here and passed down
//! explicitly.

use crate::config::Settings;
use crate::container::{Container, Controller};
use crate::error::{AppError, RouteError};
use crate::events::{Event, EventBus, Subscriber, SubscriberRegistry};
use crate::http::{BearerAuth, Middleware, MiddlewareRegistry, Request, RequestLog, BEARER_AUTH, REQUEST_LOG};
use crate::orm::{MetadataResolver, Model, Orm};
use crate::response::HttpResponse;
use crate::routing::{DiscoveryCache, Dispatcher, RouteCompiler, RouteTable};
use crate::store::{MemoryStore, PersistenceEngine};
use std::sync::Arc;

pub struct KernelBuilder {
    settings: Settings,
    middleware: MiddlewareRegistry,
    container: Container,
    models: MetadataResolver,
    events: EventBus,
    subscribers: SubscriberRegistry,
    engine: Option<Arc<dyn PersistenceEngine>>,
}

impl KernelBuilder {
    pub fn new(settings: Settings) -> Self {
        KernelBuilder {
            settings,
            middleware: MiddlewareRegistry::new(),
            container: Container::new(),
            models: MetadataResolver::new(),
            events: EventBus::new(),
            subscribers: SubscriberRegistry::new(),
            engine: None,
        }
    }

    pub fn model<M: Model>(mut self) -> Self {
        self.models.register::<M>();
        self
    }

    pub fn controller<C, F>(mut self, factory: F) -> Self
    where
        C: Controller + 'static,
        F: Fn(&Container) -> Result<C, AppError> + Send + Sync + 'static,
    {
        self.container.register(factory);
        self
    }

    /// Shared service for controller factories.
    pub fn provide<T: std::any::Any + Send + Sync>(mut self, service: T) -> Self {
        self.container.provide(service);
        self
    }

    pub fn middleware(mut self, id: impl Into<String>, middleware: Arc<dyn Middleware>) -> Self {
        self.middleware.register(id, middleware);
        self
    }

    pub fn middleware_factory<F>(mut self, id: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Result<Arc<dyn Middleware>, String> + Send + Sync + 'static,
    {
        self.middleware.register_factory(id, factory);
        self
    }

    pub fn alias(mut self, alias: impl Into<String>, id: impl Into<String>) -> Self {
        self.middleware.alias(alias, id);
        self
    }

    pub fn global(mut self, id: impl Into<String>) -> Self {
        self.middleware.push_global(id);
        self
    }

    pub fn listen<F>(mut self, event: impl Into<String>, listener: F) -> Self
    where
        F: Fn(&Event<'_>) + Send + Sync + 'static,
    {
        self.events.on(event, listener);
        self
    }

    pub fn subscriber(mut self, name: impl Into<String>, subscriber: Arc<dyn Subscriber>) -> Self {
        self.subscribers.register(name, subscriber);
        self
    }

    pub fn engine(mut self, engine: Arc<dyn PersistenceEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Register built-in middleware, compile (or load) the route table and install subscribers.
    /// A route conflict aborts the build.
    pub fn build(self) -> Result<Kernel, RouteError> {
        let KernelBuilder {
            settings,
            mut middleware,
            mut container,
            models,
            mut events,
            subscribers,
            engine,
        } = self;

        if !middleware.contains(REQUEST_LOG) {
            middleware.register(REQUEST_LOG, Arc::new(RequestLog));
        }
        if !middleware.contains(BEARER_AUTH) {
            let token = settings.auth_token.clone();
            middleware.register_factory(BEARER_AUTH, move || match &token {
                Some(t) => Ok(Arc::new(BearerAuth::new(t)) as Arc<dyn Middleware>),
                None => Err("AUTH_TOKEN is not set".to_string()),
            });
        }
        middleware.prepend_global(REQUEST_LOG);

        let engine = engine.unwrap_or_else(|| Arc::new(MemoryStore::new()));
        let orm = Orm::new(models, engine);
        container.provide(orm.clone());

        let route_cache = DiscoveryCache::new(&settings.route_cache_path, settings.mode);
        let records = route_cache.load_or_build(|| RouteCompiler::compile_records(container.declarations(), &middleware))?;
        let routes = RouteTable::from_records(records)?;
        tracing::info!(routes = routes.len(), mode = ?settings.mode, "route table ready");

        let subscriber_cache = DiscoveryCache::new(&settings.subscriber_cache_path, settings.mode);
        let installed = subscribers.install(&mut events, &subscriber_cache);
        tracing::info!(subscribers = installed, "subscribers installed");

        let dispatcher = Dispatcher::new(
            routes,
            Arc::new(middleware),
            Arc::new(container),
            Arc::new(events),
            orm.clone(),
        );
        Ok(Kernel {
            settings,
            dispatcher,
            orm,
        })
    }
}

/// The request-handling boundary: every outcome becomes an [`HttpResponse`].
pub struct Kernel {
    settings: Settings,
    dispatcher: Dispatcher,
    orm: Orm,
}

impl Kernel {
    pub fn builder(settings: Settings) -> KernelBuilder {
        KernelBuilder::new(settings)
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn orm(&self) -> &Orm {
        &self.orm
    }

    pub fn routes(&self) -> &RouteTable {
        self.dispatcher.routes()
    }

    /// Blocking; runs on a worker thread when driven from axum.
    pub fn handle(&self, request: Request) -> HttpResponse {
        match self.dispatcher.dispatch(request) {
            Ok(reply) => reply.into_http(),
            Err(e) => e.into_http_response(),
        }
    }
}
