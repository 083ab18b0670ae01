use dispatch_kit::orm::{Orm, Related};
use dispatch_kit::routing::ScalarType;
use dispatch_kit::{ActionDecl, AppError, Args, Container, Controller, ControllerDecl, KernelBuilder, ParamSpec, Reply};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

pub struct IndexController;

impl Controller for IndexController {
    fn declare() -> ControllerDecl {
        ControllerDecl::new("IndexController")
            .action(ActionDecl::new("index").get("/"))
            .action(
                ActionDecl::new("user")
                    .get("/user/{id}")
                    .param(ParamSpec::path("id").missing_message("user id required")),
            )
            .action(ActionDecl::new("echo").post("/echo").param(ParamSpec::body("payload")))
    }

    fn call(&self, action: &str, args: Args) -> Result<Reply, AppError> {
        match action {
            "index" => Ok(Reply::from("dispatch-kit demo")),
            "user" => Ok(Reply::from(json!({ "id": args.str("id")? }))),
            "echo" => Ok(Reply::Value(args.value("payload")?.clone())),
            other => Err(AppError::NotFound(format!("unknown action {}", other))),
        }
    }
}

/// Fields a client may patch on a user.
#[derive(Deserialize)]
struct UserPatch {
    #[serde(rename = "userName")]
    user_name: Option<String>,
    email: Option<String>,
}

pub struct UserController {
    orm: Arc<Orm>,
}

impl UserController {
    fn find(&self, id: &Value) -> Result<dispatch_kit::Entity, AppError> {
        self.orm
            .find("User", id)?
            .ok_or_else(|| AppError::NotFound(format!("user {} not found", id)))
    }
}

impl Controller for UserController {
    fn declare() -> ControllerDecl {
        ControllerDecl::new("UserController")
            .prefix("/users")
            .middleware("log")
            .action(ActionDecl::new("list").get(""))
            .action(
                ActionDecl::new("show")
                    .get("/{id}")
                    .param(ParamSpec::path("id").typed(ScalarType::Int)),
            )
            .action(
                ActionDecl::new("posts")
                    .get("/{id}/posts")
                    .param(ParamSpec::path("id").typed(ScalarType::Int)),
            )
            .action(
                ActionDecl::new("create")
                    .post("")
                    .middleware("auth")
                    .param(ParamSpec::body_entity("user", "User")),
            )
            .action(
                ActionDecl::new("update")
                    .patch("/{id}")
                    .middleware("auth")
                    .param(ParamSpec::path("id").typed(ScalarType::Int))
                    .param(ParamSpec::body("patch")),
            )
            .action(
                ActionDecl::new("delete")
                    .delete("/{id}")
                    .middleware("auth")
                    .param(ParamSpec::path("id").typed(ScalarType::Int)),
            )
    }

    fn call(&self, action: &str, mut args: Args) -> Result<Reply, AppError> {
        match action {
            "list" => {
                let users: Vec<Value> = self.orm.all("User")?.iter().map(|u| u.to_array()).collect();
                Ok(Reply::Value(Value::Array(users)))
            }
            "show" => {
                let user = self.find(args.value("id")?)?;
                user.relation("posts", &self.orm)?;
                Ok(Reply::Value(user.to_array()))
            }
            "posts" => {
                let user = self.find(args.value("id")?)?;
                let posts = match user.relation("posts", &self.orm)? {
                    Related::Many(posts) => posts.iter().map(|p| p.to_array()).collect(),
                    Related::One(_) => Vec::new(),
                };
                Ok(Reply::Value(Value::Array(posts)))
            }
            "create" => {
                let mut user = args.take_entity("user")?;
                user.save(&self.orm)?;
                Ok(Reply::Value(user.to_array()))
            }
            "update" => {
                let patch: UserPatch = args.body("patch")?;
                let mut user = self.find(args.value("id")?)?;
                if let Some(name) = patch.user_name {
                    user.set_property("userName", Value::String(name))?;
                }
                if let Some(email) = patch.email {
                    user.set_property("email", Value::String(email))?;
                }
                user.save(&self.orm)?;
                Ok(Reply::Value(user.to_array()))
            }
            "delete" => {
                let deleted = self.orm.delete_by_id("User", args.value("id")?)?;
                Ok(Reply::Value(json!({ "deleted": deleted })))
            }
            other => Err(AppError::NotFound(format!("unknown action {}", other))),
        }
    }
}

pub fn register(builder: KernelBuilder) -> KernelBuilder {
    builder
        .controller(|_: &Container| Ok(IndexController))
        .controller(|c: &Container| Ok(UserController { orm: c.service::<Orm>()? }))
}
