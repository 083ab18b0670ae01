use dispatch_kit::orm::{Cast, Field, Model, ModelDecl, Relation};
use dispatch_kit::KernelBuilder;
use serde_json::{json, Value};

pub struct User;

impl Model for User {
    const NAME: &'static str = "User";

    fn declare() -> ModelDecl {
        ModelDecl::new(Self::NAME, "users")
            .field(Field::new("id").primary_key().guarded().cast(Cast::Int))
            .field(Field::new("userName").column("name"))
            .field(Field::new("email"))
            .field(Field::new("password").guarded().hidden())
            .field(Field::new("profileUrl").appended())
            .relation(Relation::has_many("posts", "Post"))
            .accessor("getProfileUrlAttribute", |_raw, row| {
                Value::String(format!("/users/{}", row.get("id").cloned().unwrap_or(Value::Null)))
            })
            .mutator("setEmailAttribute", |v| {
                Value::String(v.as_str().unwrap_or_default().trim().to_lowercase())
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
            .field(Field::new("published").cast(Cast::Bool))
            .relation(Relation::belongs_to("author", "User").foreign_key("user_id"))
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
            .mutator_in_place("setLabelAttribute", |attrs, v| {
                let label = v.as_str().unwrap_or_default().trim().to_lowercase();
                attrs.insert("label".into(), json!(label));
            })
    }
}

pub fn register(builder: KernelBuilder) -> KernelBuilder {
    builder.model::<User>().model::<Post>().model::<Tag>()
}
