#![allow(dead_code)]

use dispatch_kit::orm::{Cast, Field, Model, ModelDecl, Relation};
use dispatch_kit::{
    ActionDecl, AppError, AppMode, Args, Container, Controller, ControllerDecl, KernelBuilder, Orm, ParamSpec, Reply,
    Settings,
};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub fn settings(dir: &Path, mode: AppMode) -> Settings {
    Settings {
        mode,
        route_cache_path: dir.join("routes.json"),
        subscriber_cache_path: dir.join("subscribers.json"),
        auth_token: Some("secret".into()),
        ..Settings::default()
    }
}

pub struct User;

impl Model for User {
    const NAME: &'static str = "User";

    fn declare() -> ModelDecl {
        ModelDecl::new(Self::NAME, "users")
            .field(Field::new("id").primary_key().guarded().cast(Cast::Int))
            .field(Field::new("userName").column("name"))
            .field(Field::new("password").guarded().hidden())
            .field(Field::new("displayName").appended())
            .relation(Relation::has_many("posts", "Post"))
            .accessor("getDisplayNameAttribute", |_raw, row| {
                let name = row.get("name").and_then(Value::as_str).unwrap_or("");
                Value::String(format!("@{}", name))
            })
    }
}

pub struct Post;

impl Model for Post {
    const NAME: &'static str = "Post";

    fn declare() -> ModelDecl {
        ModelDecl::new(Self::NAME, "posts")
            .field(Field::new("id").primary_key().guarded().cast(Cast::Int))
            .field(Field::new("userId").column("user_id").cast(Cast::Int))
            .field(Field::new("title"))
            .relation(Relation::belongs_to("user", "User"))
            .relation(Relation::belongs_to_many("tags", "Tag"))
    }
}

pub struct Tag;

impl Model for Tag {
    const NAME: &'static str = "Tag";

    fn declare() -> ModelDecl {
        ModelDecl::new(Self::NAME, "tags")
            .field(Field::new("id").primary_key().guarded().cast(Cast::Int))
            .field(Field::new("label"))
    }
}

/// Counts controller invocations so tests can tell whether the action ran.
#[derive(Default)]
pub struct Calls(pub AtomicUsize);

impl Calls {
    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct IndexController {
    calls: Arc<Calls>,
}

impl Controller for IndexController {
    fn declare() -> ControllerDecl {
        ControllerDecl::new("IndexController")
            .action(
                ActionDecl::new("user")
                    .get("/user/{id}")
                    .param(ParamSpec::path("id").missing_message("user id required")),
            )
            .action(ActionDecl::new("secret").get("/secret").middleware("auth"))
            .action(ActionDecl::new("echo").post("/echo").param(ParamSpec::body("payload")))
            .action(ActionDecl::new("teapot").get("/teapot"))
    }

    fn call(&self, action: &str, args: Args) -> Result<Reply, AppError> {
        self.calls.0.fetch_add(1, Ordering::SeqCst);
        match action {
            "user" => Ok(Reply::from(json!({ "id": args.str("id")? }))),
            "secret" => Ok(Reply::from("classified")),
            "echo" => Ok(Reply::Value(args.value("payload")?.clone())),
            "teapot" => Err(AppError::http(axum::http::StatusCode::IM_A_TEAPOT, "short and stout")
                .with_header("X-Pot", "tea")),
            other => Err(AppError::NotFound(other.to_string())),
        }
    }
}

pub struct UserController {
    orm: Arc<Orm>,
}

impl Controller for UserController {
    fn declare() -> ControllerDecl {
        ControllerDecl::new("UserController")
            .prefix("/users")
            .action(
                ActionDecl::new("show")
                    .get("/{id}")
                    .param(ParamSpec::path("id").typed(dispatch_kit::ScalarType::Int)),
            )
            .action(ActionDecl::new("create").post("").param(ParamSpec::body_entity("user", "User")))
    }

    fn call(&self, action: &str, mut args: Args) -> Result<Reply, AppError> {
        match action {
            "show" => {
                let user = self
                    .orm
                    .find("User", args.value("id")?)?
                    .ok_or_else(|| AppError::NotFound("no such user".into()))?;
                user.relation("posts", &self.orm)?;
                Ok(Reply::Value(user.to_array()))
            }
            "create" => {
                let mut user = args.take_entity("user")?;
                user.save(&self.orm)?;
                Ok(Reply::Value(user.to_array()))
            }
            other => Err(AppError::NotFound(other.to_string())),
        }
    }
}

/// Models, both controllers, the `auth` alias and a shared call counter.
pub fn builder(settings: Settings, calls: Arc<Calls>) -> KernelBuilder {
    dispatch_kit::Kernel::builder(settings)
        .model::<User>()
        .model::<Post>()
        .model::<Tag>()
        .alias("auth", dispatch_kit::http::BEARER_AUTH)
        .controller(move |_: &Container| Ok(IndexController { calls: Arc::clone(&calls) }))
        .controller(|c: &Container| Ok(UserController { orm: c.service::<Orm>()? }))
}
