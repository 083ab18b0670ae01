//! Event bus for dispatch lifecycle notifications, and subscriber discovery.

use crate::container::Args;
use crate::error::AppError;
use crate::response::Reply;
use crate::routing::DiscoveryCache;
use axum::http::Method;
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;

pub const BEFORE_DISPATCH: &str = "router.before_dispatch";
pub const BEFORE_EXECUTE: &str = "controller.before_execute";
pub const AFTER_EXECUTE: &str = "controller.after_execute";

#[derive(Debug)]
pub enum Event<'a> {
    /// Raw method and URI, before route matching.
    BeforeDispatch { method: &'a Method, uri: &'a str },
    /// Arguments are bound; middleware has not run yet.
    BeforeExecute {
        controller: &'a str,
        action: &'a str,
        args: &'a Args,
    },
    AfterExecute {
        controller: &'a str,
        action: &'a str,
        result: &'a Result<Reply, AppError>,
    },
}

impl Event<'_> {
    pub fn name(&self) -> &'static str {
        match self {
            Event::BeforeDispatch { .. } => BEFORE_DISPATCH,
            Event::BeforeExecute { .. } => BEFORE_EXECUTE,
            Event::AfterExecute { .. } => AFTER_EXECUTE,
        }
    }
}

pub type Listener = Arc<dyn Fn(&Event<'_>) + Send + Sync>;

/// Listeners by event name, called in registration order. Built at startup, read-only after.
#[derive(Default)]
pub struct EventBus {
    listeners: HashMap<String, Vec<Listener>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on<F>(&mut self, event: impl Into<String>, listener: F) -> &mut Self
    where
        F: Fn(&Event<'_>) + Send + Sync + 'static,
    {
        self.listeners.entry(event.into()).or_default().push(Arc::new(listener));
        self
    }

    pub fn dispatch(&self, event: &Event<'_>) {
        if let Some(listeners) = self.listeners.get(event.name()) {
            for listener in listeners {
                listener(event);
            }
        }
    }

    pub fn listener_count(&self, event: &str) -> usize {
        self.listeners.get(event).map(Vec::len).unwrap_or(0)
    }
}

/// A pluggable observer that registers its own listeners.
pub trait Subscriber: Send + Sync {
    fn before_subscribe(&self) {}

    fn subscribe(self: Arc<Self>, bus: &mut EventBus);

    fn after_subscribe(&self) {}
}

/// Known subscribers by name. The list of names to install goes through the discovery cache.
#[derive(Default)]
pub struct SubscriberRegistry {
    entries: Vec<(String, Arc<dyn Subscriber>)>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, subscriber: Arc<dyn Subscriber>) -> &mut Self {
        self.entries.push((name.into(), subscriber));
        self
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|(n, _)| n.clone()).collect()
    }

    /// Install the discovered subscribers onto `bus`. Cached names with no registered
    /// subscriber are skipped with a warning. Returns how many were installed.
    pub fn install(&self, bus: &mut EventBus, cache: &DiscoveryCache) -> usize {
        let names: Vec<String> = match cache.load_or_build(|| Ok::<_, Infallible>(self.names())) {
            Ok(names) => names,
            Err(never) => match never {},
        };
        let mut installed = 0;
        for name in names {
            let Some((_, subscriber)) = self.entries.iter().find(|(n, _)| *n == name) else {
                tracing::warn!(subscriber = %name, "cached subscriber is not registered; skipping");
                continue;
            };
            subscriber.before_subscribe();
            Arc::clone(subscriber).subscribe(bus);
            subscriber.after_subscribe();
            tracing::debug!(subscriber = %name, "subscriber installed");
            installed += 1;
        }
        installed
    }
}
