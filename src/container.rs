//! Construction service: builds controllers by name and invokes bound actions with named
//! arguments. Also holds shared services controllers ask for while being constructed.

use crate::error::AppError;
use crate::http::Request;
use crate::orm::Entity;
use crate::response::Reply;
use crate::routing::ControllerDecl;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

/// A bound argument.
#[derive(Clone, Debug)]
pub enum Arg {
    Value(Value),
    Entity(Box<Entity>),
    Request(Box<Request>),
}

/// Arguments for one action call, in declared parameter order.
#[derive(Clone, Debug, Default)]
pub struct Args {
    items: Vec<(String, Arg)>,
}

impl Args {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, arg: Arg) {
        self.items.push((name.into(), arg));
    }

    pub fn with(mut self, name: impl Into<String>, arg: Arg) -> Self {
        self.push(name, arg);
        self
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(|(n, _)| n.as_str())
    }

    pub fn get(&self, name: &str) -> Option<&Arg> {
        self.items.iter().find(|(n, _)| n == name).map(|(_, a)| a)
    }

    fn require(&self, name: &str) -> Result<&Arg, AppError> {
        self.get(name)
            .ok_or_else(|| AppError::Internal(format!("argument '{}' is not bound", name)))
    }

    fn mismatch(name: &str, expected: &str) -> AppError {
        AppError::Internal(format!("argument '{}' is not {}", name, expected))
    }

    pub fn value(&self, name: &str) -> Result<&Value, AppError> {
        match self.require(name)? {
            Arg::Value(v) => Ok(v),
            _ => Err(Self::mismatch(name, "a plain value")),
        }
    }

    pub fn str(&self, name: &str) -> Result<&str, AppError> {
        self.value(name)?
            .as_str()
            .ok_or_else(|| Self::mismatch(name, "a string"))
    }

    pub fn i64(&self, name: &str) -> Result<i64, AppError> {
        self.value(name)?
            .as_i64()
            .ok_or_else(|| Self::mismatch(name, "an integer"))
    }

    pub fn f64(&self, name: &str) -> Result<f64, AppError> {
        self.value(name)?
            .as_f64()
            .ok_or_else(|| Self::mismatch(name, "a number"))
    }

    pub fn bool(&self, name: &str) -> Result<bool, AppError> {
        self.value(name)?
            .as_bool()
            .ok_or_else(|| Self::mismatch(name, "a boolean"))
    }

    /// Deserialize a body-bound value. Fields the target type does not declare are ignored.
    pub fn body<T: DeserializeOwned>(&self, name: &str) -> Result<T, AppError> {
        serde_json::from_value(self.value(name)?.clone())
            .map_err(|e| AppError::BadRequest(format!("invalid body for '{}': {}", name, e)))
    }

    pub fn entity(&self, name: &str) -> Result<&Entity, AppError> {
        match self.require(name)? {
            Arg::Entity(e) => Ok(e),
            _ => Err(Self::mismatch(name, "an entity")),
        }
    }

    pub fn take_entity(&mut self, name: &str) -> Result<Entity, AppError> {
        let pos = self
            .items
            .iter()
            .position(|(n, a)| n == name && matches!(a, Arg::Entity(_)))
            .ok_or_else(|| Self::mismatch(name, "an entity"))?;
        match self.items.remove(pos).1 {
            Arg::Entity(e) => Ok(*e),
            _ => Err(Self::mismatch(name, "an entity")),
        }
    }

    pub fn request(&self, name: &str) -> Result<&Request, AppError> {
        match self.require(name)? {
            Arg::Request(r) => Ok(r),
            _ => Err(Self::mismatch(name, "the request")),
        }
    }
}

/// A controller: a declaration plus a dispatch table from action name to code.
pub trait Controller: Send + Sync {
    fn declare() -> ControllerDecl
    where
        Self: Sized;

    fn call(&self, action: &str, args: Args) -> Result<Reply, AppError>;
}

type ControllerFactory = Box<dyn Fn(&Container) -> Result<Arc<dyn Controller>, AppError> + Send + Sync>;

#[derive(Default)]
pub struct Container {
    services: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
    factories: HashMap<String, ControllerFactory>,
    declarations: Vec<ControllerDecl>,
}

impl Container {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make a shared service available to controller factories.
    pub fn provide<T: Any + Send + Sync>(&mut self, service: T) -> &mut Self {
        self.services.insert(TypeId::of::<T>(), Arc::new(service));
        self
    }

    pub fn service<T: Any + Send + Sync>(&self) -> Result<Arc<T>, AppError> {
        self.services
            .get(&TypeId::of::<T>())
            .cloned()
            .and_then(|s| s.downcast::<T>().ok())
            .ok_or_else(|| {
                AppError::Internal(format!("service {} is not provided", std::any::type_name::<T>()))
            })
    }

    /// Register a controller type with its factory. Its declaration joins route discovery in
    /// registration order.
    pub fn register<C, F>(&mut self, factory: F) -> &mut Self
    where
        C: Controller + 'static,
        F: Fn(&Container) -> Result<C, AppError> + Send + Sync + 'static,
    {
        let decl = C::declare();
        let name = decl.name.clone();
        self.factories.insert(
            name,
            Box::new(move |c| factory(c).map(|ctl| Arc::new(ctl) as Arc<dyn Controller>)),
        );
        self.declarations.push(decl);
        self
    }

    pub fn declarations(&self) -> &[ControllerDecl] {
        &self.declarations
    }

    pub fn construct(&self, controller: &str) -> Result<Arc<dyn Controller>, AppError> {
        let factory = self
            .factories
            .get(controller)
            .ok_or_else(|| AppError::Internal(format!("controller '{}' is not registered", controller)))?;
        factory(self)
    }

    pub fn invoke(&self, controller: &dyn Controller, action: &str, args: Args) -> Result<Reply, AppError> {
        controller.call(action, args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::ActionDecl;
    use serde::Deserialize;
    use serde_json::json;

    struct Greeter {
        greeting: Arc<String>,
    }

    impl Controller for Greeter {
        fn declare() -> ControllerDecl {
            ControllerDecl::new("Greeter").action(ActionDecl::new("hello").get("/hello/{name}"))
        }

        fn call(&self, action: &str, args: Args) -> Result<Reply, AppError> {
            match action {
                "hello" => Ok(Reply::from(format!("{} {}", self.greeting, args.str("name")?))),
                other => Err(AppError::NotFound(other.to_string())),
            }
        }
    }

    fn container() -> Container {
        let mut c = Container::new();
        c.provide(String::from("hi")).register(|c: &Container| {
            Ok(Greeter {
                greeting: c.service::<String>()?,
            })
        });
        c
    }

    #[test]
    fn constructs_and_invokes_with_services() {
        let c = container();
        let ctl = c.construct("Greeter").unwrap();
        let args = Args::new().with("name", Arg::Value(json!("ada")));
        match c.invoke(ctl.as_ref(), "hello", args).unwrap() {
            Reply::Value(v) => assert_eq!(v, json!("hi ada")),
            other => panic!("unexpected reply {other:?}"),
        }
        assert_eq!(c.declarations()[0].name, "Greeter");
    }

    #[test]
    fn missing_controller_or_service_is_internal() {
        let c = Container::new();
        assert!(matches!(c.construct("Nope"), Err(AppError::Internal(_))));
        assert!(matches!(c.service::<u32>(), Err(AppError::Internal(_))));
    }

    #[test]
    fn typed_accessors_check_shapes() {
        #[derive(Deserialize)]
        struct Payload {
            title: String,
        }
        let args = Args::new()
            .with("n", Arg::Value(json!(3)))
            .with("body", Arg::Value(json!({"title": "x", "ignored": true})));
        assert_eq!(args.i64("n").unwrap(), 3);
        assert!(args.str("n").is_err());
        assert!(args.request("n").is_err());
        assert_eq!(args.body::<Payload>("body").unwrap().title, "x");
        assert!(matches!(args.value("missing"), Err(AppError::Internal(_))));
    }
}
