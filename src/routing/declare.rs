//! Route declaration surface: controllers with a path prefix and middleware, actions with one
//! or more path/verb pairs, and the binding of each action parameter.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Static type of a bound scalar.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarType {
    Str,
    Int,
    Float,
    Bool,
}

/// What a body-bound parameter is materialized into.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "target", rename_all = "snake_case")]
pub enum BodyTarget {
    /// A mapped entity, filled through its fillable whitelist.
    Entity(String),
    /// The decoded JSON object, for deserialization into a plain value type.
    Value,
    /// Never valid; rejected when the action is dispatched.
    Builtin(ScalarType),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PathParam {
    /// Capture name; defaults to the parameter name.
    pub var: String,
    pub missing_message: Option<String>,
    pub default: Option<Value>,
    pub ty: ScalarType,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "bind", rename_all = "snake_case")]
pub enum ParamKind {
    Body { target: BodyTarget },
    Request,
    Path(PathParam),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    pub kind: ParamKind,
}

impl ParamSpec {
    /// Path variable captured under the parameter's own name, typed as a string.
    pub fn path(name: impl Into<String>) -> Self {
        let name = name.into();
        ParamSpec {
            kind: ParamKind::Path(PathParam {
                var: name.clone(),
                missing_message: None,
                default: None,
                ty: ScalarType::Str,
            }),
            name,
        }
    }

    pub fn request(name: impl Into<String>) -> Self {
        ParamSpec {
            name: name.into(),
            kind: ParamKind::Request,
        }
    }

    /// Body bound into a new entity of `model`.
    pub fn body_entity(name: impl Into<String>, model: impl Into<String>) -> Self {
        ParamSpec {
            name: name.into(),
            kind: ParamKind::Body {
                target: BodyTarget::Entity(model.into()),
            },
        }
    }

    pub fn body(name: impl Into<String>) -> Self {
        ParamSpec {
            name: name.into(),
            kind: ParamKind::Body {
                target: BodyTarget::Value,
            },
        }
    }

    pub fn body_scalar(name: impl Into<String>, ty: ScalarType) -> Self {
        ParamSpec {
            name: name.into(),
            kind: ParamKind::Body {
                target: BodyTarget::Builtin(ty),
            },
        }
    }

    /// Capture name differing from the parameter name.
    pub fn var(mut self, var: impl Into<String>) -> Self {
        if let ParamKind::Path(p) = &mut self.kind {
            p.var = var.into();
        }
        self
    }

    pub fn missing_message(mut self, message: impl Into<String>) -> Self {
        if let ParamKind::Path(p) = &mut self.kind {
            p.missing_message = Some(message.into());
        }
        self
    }

    pub fn default_value(mut self, value: Value) -> Self {
        if let ParamKind::Path(p) = &mut self.kind {
            p.default = Some(value);
        }
        self
    }

    pub fn typed(mut self, ty: ScalarType) -> Self {
        if let ParamKind::Path(p) = &mut self.kind {
            p.ty = ty;
        }
        self
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct RouteDecl {
    pub path: String,
    pub methods: Vec<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ActionDecl {
    pub name: String,
    pub routes: Vec<RouteDecl>,
    pub middleware: Vec<String>,
    pub params: Vec<ParamSpec>,
}

impl ActionDecl {
    pub fn new(name: impl Into<String>) -> Self {
        ActionDecl {
            name: name.into(),
            routes: Vec::new(),
            middleware: Vec::new(),
            params: Vec::new(),
        }
    }

    pub fn route<I, S>(mut self, path: impl Into<String>, methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.routes.push(RouteDecl {
            path: path.into(),
            methods: methods.into_iter().map(|m| m.as_ref().to_uppercase()).collect(),
        });
        self
    }

    pub fn get(self, path: impl Into<String>) -> Self {
        self.route(path, ["GET"])
    }

    pub fn post(self, path: impl Into<String>) -> Self {
        self.route(path, ["POST"])
    }

    pub fn put(self, path: impl Into<String>) -> Self {
        self.route(path, ["PUT"])
    }

    pub fn patch(self, path: impl Into<String>) -> Self {
        self.route(path, ["PATCH"])
    }

    pub fn delete(self, path: impl Into<String>) -> Self {
        self.route(path, ["DELETE"])
    }

    pub fn middleware(mut self, id: impl Into<String>) -> Self {
        self.middleware.push(id.into());
        self
    }

    pub fn param(mut self, param: ParamSpec) -> Self {
        self.params.push(param);
        self
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ControllerDecl {
    pub name: String,
    pub prefix: String,
    pub middleware: Vec<String>,
    pub actions: Vec<ActionDecl>,
}

impl ControllerDecl {
    pub fn new(name: impl Into<String>) -> Self {
        ControllerDecl {
            name: name.into(),
            prefix: String::new(),
            middleware: Vec::new(),
            actions: Vec::new(),
        }
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn middleware(mut self, id: impl Into<String>) -> Self {
        self.middleware.push(id.into());
        self
    }

    pub fn action(mut self, action: ActionDecl) -> Self {
        self.actions.push(action);
        self
    }
}
