mod common;

use common::{Post, Tag, User};
use dispatch_kit::orm::{MetadataResolver, Property};
use dispatch_kit::OrmError;
use dispatch_kit::{MemoryStore, Orm};
use serde_json::{json, Map, Value};
use std::sync::Arc;

fn orm() -> (Orm, Arc<MemoryStore>) {
    let mut models = MetadataResolver::new();
    models.register::<User>().register::<Post>().register::<Tag>();
    let store = Arc::new(MemoryStore::new());
    store.seed("users", json!({"id": 1, "name": "ada", "password": "x"}));
    store.seed("posts", json!({"id": 10, "user_id": 1, "title": "one"}));
    store.seed("posts", json!({"id": 11, "user_id": 1, "title": "two"}));
    store.seed("posts", json!({"id": 12, "user_id": 9, "title": "orphan"}));
    store.seed("tags", json!({"id": 1, "label": "math"}));
    store.seed("tags", json!({"id": 2, "label": "poetry"}));
    store.seed("post_tag", json!({"post_id": 10, "tag_id": 2}));
    (Orm::new(models, store.clone()), store)
}

fn payload(v: Value) -> Map<String, Value> {
    match v {
        Value::Object(m) => m,
        _ => unreachable!(),
    }
}

#[test]
fn relation_is_fetched_once_per_entity() {
    let (orm, store) = orm();
    let user = orm.find("User", &json!(1)).unwrap().unwrap();
    let before = store.fetch_count();

    assert_eq!(user.relation("posts", &orm).unwrap().many().len(), 2);
    assert_eq!(user.relation("posts", &orm).unwrap().many().len(), 2);
    assert!(matches!(user.get_property("posts", &orm).unwrap(), Property::Relation(_)));
    assert_eq!(store.fetch_count(), before + 1);
}

#[test]
fn belongs_to_and_pivot_relations_follow_key_conventions() {
    let (orm, _) = orm();
    let post = orm.find("Post", &json!(10)).unwrap().unwrap();
    let author = post.relation("user", &orm).unwrap().one().unwrap();
    assert_eq!(author.attribute("userName"), json!("ada"));

    let tags = post.relation("tags", &orm).unwrap().many();
    assert_eq!(tags.len(), 1);
    assert_eq!(tags[0].attribute("label"), json!("poetry"));

    let orphan = orm.find("Post", &json!(12)).unwrap().unwrap();
    assert!(orphan.relation("user", &orm).unwrap().one().is_none());
    let out = orphan.to_array();
    assert!(out.get("user").is_none());
}

#[test]
fn serialization_hides_appends_and_never_fetches() {
    let (orm, store) = orm();
    let user = orm.find("User", &json!(1)).unwrap().unwrap();
    let before = store.fetch_count();
    let out = user.to_array();
    assert_eq!(store.fetch_count(), before);
    assert_eq!(out, json!({"id": 1, "userName": "ada", "displayName": "@ada"}));
}

#[test]
fn properties_are_reachable_by_column_name_too() {
    let (orm, _) = orm();
    let mut user = orm.find("User", &json!(1)).unwrap().unwrap();
    user.set_property("name", json!("grace")).unwrap();
    assert_eq!(user.attribute("userName"), json!("grace"));
    assert_eq!(user.get_property("name", &orm).unwrap().into_value(), json!("grace"));
    assert!(matches!(
        user.set_property("posts", json!([])),
        Err(OrmError::RelationAssignment { .. })
    ));
    assert!(matches!(
        user.get_property("nickname", &orm),
        Err(OrmError::UnknownProperty { .. })
    ));
}

#[test]
fn crud_helpers_round_through_the_engine() {
    let (orm, store) = orm();
    let created = orm.create("Tag", &payload(json!({"label": "prose"}))).unwrap();
    assert_eq!(created.key(), Some(&json!(3)));

    let updated = orm
        .update_by_id("Tag", &json!(3), &payload(json!({"label": "verse"})))
        .unwrap()
        .unwrap();
    assert_eq!(updated.attribute("label"), json!("verse"));
    assert!(orm
        .update_by_id("Tag", &json!(99), &payload(json!({"label": "x"})))
        .unwrap()
        .is_none());

    assert_eq!(orm.all("Tag").unwrap().len(), 3);
    assert!(orm.delete_by_id("Tag", &json!(3)).unwrap());
    assert!(!orm.delete_by_id("Tag", &json!(3)).unwrap());
    assert_eq!(store.rows("tags").len(), 2);
}

#[test]
fn guarded_key_rejects_the_whole_payload() {
    let (orm, store) = orm();
    let err = orm
        .create("User", &payload(json!({"userName": "eve", "id": 5})))
        .unwrap_err();
    assert!(matches!(err, OrmError::MassAssignment { ref property, .. } if property == "id"));
    assert_eq!(store.rows("users").len(), 1);
}

#[test]
fn metadata_is_built_once_per_model() {
    let (orm, _) = orm();
    orm.find("User", &json!(1)).unwrap();
    orm.find("User", &json!(1)).unwrap();
    orm.all("User").unwrap();
    assert_eq!(orm.models().build_count(), 1);
    assert!(matches!(orm.make("Ghost"), Err(OrmError::UnknownModel(_))));
}
