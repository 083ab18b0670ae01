//! Declarative mapping layer: model declarations, cached metadata, entities with intercepted
//! attribute access, and lazily resolved relations.

mod declare;
mod entity;
mod metadata;
mod relation;

pub use declare::{AccessorFn, Field, Method, MethodTag, Model, ModelDecl, MutatorFn, Relation};
pub use entity::{Entity, Property};
pub use metadata::{
    truthy, Cast, EntityMetadata, FieldDescriptor, MetadataResolver, RelationDescriptor, RelationKind,
};
pub use relation::{PivotKeys, Related, RelationResolver, ResolvedKeys};

use crate::error::OrmError;
use crate::store::{FetchSpec, PersistenceEngine};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Mapping context: the metadata cache plus the engine entities load from and save to.
/// Cheap to clone; created once at startup.
#[derive(Clone)]
pub struct Orm {
    models: Arc<MetadataResolver>,
    engine: Arc<dyn PersistenceEngine>,
}

impl Orm {
    pub fn new(models: MetadataResolver, engine: Arc<dyn PersistenceEngine>) -> Self {
        Orm {
            models: Arc::new(models),
            engine,
        }
    }

    pub fn models(&self) -> &MetadataResolver {
        &self.models
    }

    pub fn engine(&self) -> &dyn PersistenceEngine {
        self.engine.as_ref()
    }

    pub fn metadata(&self, model: &str) -> Result<Arc<EntityMetadata>, OrmError> {
        self.models.resolve(model)
    }

    /// New, unsaved entity.
    pub fn make(&self, model: &str) -> Result<Entity, OrmError> {
        Ok(Entity::new(self.metadata(model)?))
    }

    pub fn find(&self, model: &str, key: &Value) -> Result<Option<Entity>, OrmError> {
        let meta = self.metadata(model)?;
        let spec = FetchSpec::eq(meta.table(), meta.primary_key_column(), meta.key_value(key));
        Ok(self
            .engine
            .fetch_one(&spec)?
            .map(|row| Entity::from_row(meta, row)))
    }

    pub fn all(&self, model: &str) -> Result<Vec<Entity>, OrmError> {
        let meta = self.metadata(model)?;
        let rows = self.engine.fetch_many(&FetchSpec::all(meta.table()))?;
        Ok(rows
            .into_iter()
            .map(|row| Entity::from_row(Arc::clone(&meta), row))
            .collect())
    }

    /// Fill (fillable enforced) and save.
    pub fn create(&self, model: &str, payload: &Map<String, Value>) -> Result<Entity, OrmError> {
        let mut entity = self.make(model)?;
        entity.fill(payload)?.save(self)?;
        Ok(entity)
    }

    /// `None` when no row has the key.
    pub fn update_by_id(
        &self,
        model: &str,
        key: &Value,
        payload: &Map<String, Value>,
    ) -> Result<Option<Entity>, OrmError> {
        let Some(mut entity) = self.find(model, key)? else {
            return Ok(None);
        };
        entity.fill(payload)?.save(self)?;
        Ok(Some(entity))
    }

    pub fn delete_by_id(&self, model: &str, key: &Value) -> Result<bool, OrmError> {
        let meta = self.metadata(model)?;
        let key = meta.key_value(key);
        Ok(self.engine.delete(meta.table(), meta.primary_key_column(), &key)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;

    fn tag_decl() -> ModelDecl {
        ModelDecl::new("Tag", "tags")
            .field(Field::new("id").primary_key().guarded())
            .field(Field::new("name"))
    }

    fn orm() -> Orm {
        let mut models = MetadataResolver::new();
        models.register_decl("Tag", tag_decl);
        Orm::new(models, Arc::new(MemoryStore::new()))
    }

    fn payload(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn crud_round_trip() {
        let orm = orm();
        let created = orm.create("Tag", &payload(json!({"name": "rust"}))).unwrap();
        assert_eq!(created.key(), Some(&json!(1)));

        let updated = orm
            .update_by_id("Tag", &json!(1), &payload(json!({"name": "tokio"})))
            .unwrap()
            .unwrap();
        assert_eq!(updated.attribute("name"), json!("tokio"));
        assert_eq!(orm.all("Tag").unwrap().len(), 1);

        assert!(orm.delete_by_id("Tag", &json!(1)).unwrap());
        assert!(orm.find("Tag", &json!(1)).unwrap().is_none());
        assert!(orm
            .update_by_id("Tag", &json!(1), &payload(json!({"name": "x"})))
            .unwrap()
            .is_none());
    }

    #[test]
    fn string_keys_take_the_key_shape() {
        let orm = orm();
        orm.create("Tag", &payload(json!({"name": "rust"}))).unwrap();
        let by_text = orm.find("Tag", &json!("1")).unwrap().unwrap();
        let by_int = orm.find("Tag", &json!(1)).unwrap().unwrap();
        assert_eq!(by_text.to_array(), by_int.to_array());
        assert_eq!(by_text.meta().key_value(&json!(" 1 ")), json!(1));
        assert_eq!(by_text.meta().key_value(&json!("slug")), json!("slug"));

        orm.update_by_id("Tag", &json!("1"), &payload(json!({"name": "tokio"})))
            .unwrap()
            .unwrap();
        assert_eq!(orm.all("Tag").unwrap()[0].attributes()["id"], json!(1));
        assert!(orm.delete_by_id("Tag", &json!("1")).unwrap());
    }

    #[test]
    fn create_enforces_fillable() {
        let orm = orm();
        let err = orm.create("Tag", &payload(json!({"id": 5, "name": "x"}))).unwrap_err();
        assert!(matches!(err, OrmError::MassAssignment { .. }));
        assert!(orm.all("Tag").unwrap().is_empty());
    }
}
