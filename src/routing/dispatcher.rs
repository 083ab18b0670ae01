//! Request dispatch: route matching, parameter binding, lifecycle events, and the middleware
//! pipeline around the controller call.

use crate::container::{Arg, Args, Container};
use crate::error::AppError;
use crate::events::{Event, EventBus};
use crate::http::{form_decode, merge_unique, MiddlewareRegistry, Pipeline, Request};
use crate::orm::{truthy, Orm};
use crate::response::Reply;
use crate::routing::compiler::{RouteRecord, RouteTable};
use crate::routing::declare::{BodyTarget, ParamKind, ParamSpec, PathParam, ScalarType};
use crate::routing::path::normalize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

pub struct Dispatcher {
    routes: RouteTable,
    middleware: Arc<MiddlewareRegistry>,
    container: Arc<Container>,
    events: Arc<EventBus>,
    orm: Orm,
}

impl Dispatcher {
    pub fn new(
        routes: RouteTable,
        middleware: Arc<MiddlewareRegistry>,
        container: Arc<Container>,
        events: Arc<EventBus>,
        orm: Orm,
    ) -> Self {
        Dispatcher {
            routes,
            middleware,
            container,
            events,
            orm,
        }
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    /// Match, bind and run one request. Errors propagate unchanged; the caller turns them into
    /// responses.
    pub fn dispatch(&self, request: Request) -> Result<Reply, AppError> {
        self.events.dispatch(&Event::BeforeDispatch {
            method: request.method(),
            uri: request.uri(),
        });
        let path = normalize(request.path());
        let (entry, captures) = self
            .routes
            .find(request.method().as_str(), &path)
            .ok_or_else(|| AppError::NotFound("404 Not Found".into()))?;
        let record = &entry.record;
        tracing::debug!(
            method = %request.method(),
            path = %path,
            controller = %record.controller,
            action = %record.action,
            "route matched"
        );

        let controller = self.container.construct(&record.controller)?;
        let args = self.bind(record, &captures, &request)?;
        self.events.dispatch(&Event::BeforeExecute {
            controller: &record.controller,
            action: &record.action,
            args: &args,
        });

        let ids = merge_unique([self.middleware.global(), record.middleware.as_slice()]);
        let layers = self.middleware.resolve_all(&ids)?;
        let container = &self.container;
        let result = Pipeline::run(request, &layers, move |_request| {
            container.invoke(controller.as_ref(), &record.action, args)
        });

        self.events.dispatch(&Event::AfterExecute {
            controller: &record.controller,
            action: &record.action,
            result: &result,
        });
        result
    }

    /// Resolve every declared parameter, in order.
    fn bind(
        &self,
        record: &RouteRecord,
        captures: &HashMap<String, String>,
        request: &Request,
    ) -> Result<Args, AppError> {
        let mut args = Args::new();
        for param in &record.params {
            let arg = match &param.kind {
                ParamKind::Body { target } => self.bind_body(param, target, request)?,
                ParamKind::Request => Arg::Request(Box::new(request.clone())),
                ParamKind::Path(spec) => bind_path(param, spec, captures)?,
            };
            args.push(param.name.clone(), arg);
        }
        Ok(args)
    }

    fn bind_body(&self, param: &ParamSpec, target: &BodyTarget, request: &Request) -> Result<Arg, AppError> {
        match target {
            BodyTarget::Entity(model) => {
                let Value::Object(payload) = request.json()? else {
                    return Err(AppError::BadRequest("request body must be a JSON object".into()));
                };
                let mut entity = self.orm.make(model)?;
                entity.fill(payload)?;
                Ok(Arg::Entity(Box::new(entity)))
            }
            BodyTarget::Value => Ok(Arg::Value(request.json()?.clone())),
            BodyTarget::Builtin(_) => Err(AppError::UnsupportedBinding(format!(
                "body-bound parameter '{}' must be an entity or a value type",
                param.name
            ))),
        }
    }
}

fn bind_path(param: &ParamSpec, spec: &PathParam, captures: &HashMap<String, String>) -> Result<Arg, AppError> {
    let raw = captures.get(&spec.var).filter(|v| !v.is_empty());
    let Some(raw) = raw else {
        if let Some(default) = &spec.default {
            return Ok(Arg::Value(default.clone()));
        }
        let message = spec
            .missing_message
            .clone()
            .unwrap_or_else(|| format!("missing parameter: {}", param.name));
        return Err(AppError::MissingParameter(message));
    };
    let decoded = form_decode(raw);
    let value = match spec.ty {
        ScalarType::Str => Value::String(decoded),
        ScalarType::Int => decoded
            .trim()
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| AppError::BadRequest(format!("parameter '{}' must be an integer", param.name)))?,
        ScalarType::Float => decoded
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| AppError::BadRequest(format!("parameter '{}' must be a number", param.name)))?,
        ScalarType::Bool => Value::Bool(truthy(&Value::String(decoded))),
    };
    Ok(Arg::Value(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn value(arg: Arg) -> Value {
        match arg {
            Arg::Value(v) => v,
            other => panic!("expected a value, got {other:?}"),
        }
    }

    fn path_spec(param: &ParamSpec) -> &PathParam {
        match &param.kind {
            ParamKind::Path(p) => p,
            _ => unreachable!(),
        }
    }

    #[test]
    fn path_values_are_decoded_and_coerced() {
        let p = ParamSpec::path("q");
        assert_eq!(
            value(bind_path(&p, path_spec(&p), &caps(&[("q", "a%20b+c")])).unwrap()),
            Value::String("a b c".into())
        );
        let p = ParamSpec::path("n").typed(ScalarType::Int);
        assert_eq!(value(bind_path(&p, path_spec(&p), &caps(&[("n", "42")])).unwrap()), Value::from(42));
        let p = ParamSpec::path("b").typed(ScalarType::Bool);
        assert_eq!(value(bind_path(&p, path_spec(&p), &caps(&[("b", "yes")])).unwrap()), Value::Bool(true));
        let p = ParamSpec::path("f").typed(ScalarType::Float);
        assert_eq!(value(bind_path(&p, path_spec(&p), &caps(&[("f", "1.5")])).unwrap()), Value::from(1.5));
    }

    #[test]
    fn empty_capture_counts_as_missing() {
        let p = ParamSpec::path("id");
        let err = bind_path(&p, path_spec(&p), &caps(&[("id", "")])).unwrap_err();
        assert_eq!(err.to_string(), "missing parameter: id");

        let p = ParamSpec::path("id").missing_message("user id required");
        let err = bind_path(&p, path_spec(&p), &caps(&[])).unwrap_err();
        assert_eq!(err.to_string(), "user id required");
    }

    #[test]
    fn defaults_fill_missing_values() {
        let p = ParamSpec::path("page").typed(ScalarType::Int).default_value(Value::from(1));
        assert_eq!(value(bind_path(&p, path_spec(&p), &caps(&[])).unwrap()), Value::from(1));
    }

    #[test]
    fn renamed_variables_use_the_capture_name() {
        let p = ParamSpec::path("user").var("uid");
        assert_eq!(
            value(bind_path(&p, path_spec(&p), &caps(&[("uid", "7")])).unwrap()),
            Value::String("7".into())
        );
    }

    #[test]
    fn non_numeric_int_is_bad_request() {
        let p = ParamSpec::path("n").typed(ScalarType::Int);
        let err = bind_path(&p, path_spec(&p), &caps(&[("n", "abc")])).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }
}
