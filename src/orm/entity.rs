//! Entity instances and attribute interception.
//!
//! Every read and write goes through [`Entity::get_property`] / [`Entity::set_property`], which
//! consult the model's metadata: relations resolve lazily (once per instance), accessors compute
//! displayed values from raw stored values, mutators transform incoming values, and everything
//! else maps between property names and column names.

use crate::error::OrmError;
use crate::orm::declare::MutatorFn;
use crate::orm::metadata::EntityMetadata;
use crate::orm::relation::{Related, RelationResolver};
use crate::orm::Orm;
use crate::store::Row;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

/// Result of a property read.
#[derive(Debug)]
pub enum Property<'a> {
    Value(Value),
    Relation(&'a Related),
}

impl Property<'_> {
    /// Scalar value, or the serialized relation.
    pub fn into_value(self) -> Value {
        match self {
            Property::Value(v) => v,
            Property::Relation(r) => r.to_value().unwrap_or(Value::Null),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Entity {
    meta: Arc<EntityMetadata>,
    attributes: Row,
    relations: HashMap<String, OnceLock<Related>>,
}

impl Entity {
    pub fn new(meta: Arc<EntityMetadata>) -> Self {
        Self::from_row(meta, Row::new())
    }

    pub fn from_row(meta: Arc<EntityMetadata>, attributes: Row) -> Self {
        let relations = meta
            .relations()
            .map(|r| (r.name.clone(), OnceLock::new()))
            .collect();
        Entity {
            meta,
            attributes,
            relations,
        }
    }

    pub fn meta(&self) -> &EntityMetadata {
        &self.meta
    }

    /// Raw column-keyed values.
    pub fn attributes(&self) -> &Row {
        &self.attributes
    }

    /// Primary key value, if set.
    pub fn key(&self) -> Option<&Value> {
        self.attributes
            .get(self.meta.primary_key_column())
            .filter(|v| !v.is_null())
    }

    /// Raw stored value for a property or column name, before accessors and casts.
    pub fn raw(&self, key: &str) -> Option<&Value> {
        let property = self.meta.property_for(key);
        self.attributes.get(self.meta.column_for(property))
    }

    /// Read a non-relation property: accessor if declared, otherwise the cast stored value.
    /// Unknown keys read as null.
    pub fn attribute(&self, key: &str) -> Value {
        let property = self.meta.property_for(key);
        self.read_attribute(property, None)
    }

    fn read_attribute(&self, property: &str, snapshot: Option<&Map<String, Value>>) -> Value {
        let column = self.meta.column_for(property);
        let raw = self.attributes.get(column).cloned().unwrap_or(Value::Null);
        if let Some(accessor) = self.meta.accessor(property) {
            return match snapshot {
                Some(row) => accessor(&raw, row),
                None => accessor(&raw, &self.meta.snapshot(&self.attributes)),
            };
        }
        match self.meta.cast_for(column) {
            Some(cast) => cast.apply(&raw),
            None => raw,
        }
    }

    /// Intercepted read by property or column name.
    pub fn get_property(&self, key: &str, orm: &Orm) -> Result<Property<'_>, OrmError> {
        let property = self.meta.property_for(key);
        if self.meta.relation(property).is_some() {
            return self.relation(property, orm).map(Property::Relation);
        }
        if self.meta.declares(property) || self.attributes.contains_key(self.meta.column_for(property)) {
            return Ok(Property::Value(self.read_attribute(property, None)));
        }
        Err(self.unknown(property))
    }

    /// Resolve a relation on first access; later calls return the cached result.
    pub fn relation(&self, name: &str, orm: &Orm) -> Result<&Related, OrmError> {
        let (desc, slot) = match (self.meta.relation(name), self.relations.get(name)) {
            (Some(desc), Some(slot)) => (desc, slot),
            _ => return Err(self.unknown(name)),
        };
        if let Some(resolved) = slot.get() {
            return Ok(resolved);
        }
        let fetched = RelationResolver::new(orm).resolve(self, desc)?;
        Ok(slot.get_or_init(|| fetched))
    }

    pub fn relation_loaded(&self, name: &str) -> bool {
        self.relations.get(name).map(|s| s.get().is_some()).unwrap_or(false)
    }

    /// Intercepted write by property or column name.
    pub fn set_property(&mut self, key: &str, value: Value) -> Result<&mut Self, OrmError> {
        let property = self.meta.property_for(key).to_string();
        if self.meta.relation(&property).is_some() {
            return Err(OrmError::RelationAssignment {
                model: self.meta.name().to_string(),
                relation: property,
            });
        }
        if let Some(mutator) = self.meta.mutator(&property).cloned() {
            match mutator {
                MutatorFn::Returning(f) => {
                    let stored = f(&value);
                    let column = self.meta.column_for(&property).to_string();
                    self.attributes.insert(column, stored);
                }
                MutatorFn::InPlace(f) => f(&mut self.attributes, value),
            }
            return Ok(self);
        }
        let column = self.meta.column_for(&property).to_string();
        if !self.meta.declares(&property) && !self.attributes.contains_key(&column) {
            return Err(self.unknown(&property));
        }
        self.attributes.insert(column, value);
        Ok(self)
    }

    /// Bulk assignment from an external payload. Every key is checked against the fillable set
    /// before anything is written.
    pub fn fill(&mut self, payload: &Map<String, Value>) -> Result<&mut Self, OrmError> {
        let mut assignments = Vec::with_capacity(payload.len());
        for (key, value) in payload {
            let property = self.meta.property_for(key);
            if !self.meta.is_fillable(property) {
                return Err(OrmError::MassAssignment {
                    model: self.meta.name().to_string(),
                    property: property.to_string(),
                });
            }
            assignments.push((property.to_string(), value.clone()));
        }
        for (property, value) in assignments {
            self.set_property(&property, value)?;
        }
        Ok(self)
    }

    /// Serialize for output: property-keyed, accessors applied, hidden properties removed,
    /// appended properties added, resolved relations nested. Never fetches.
    pub fn to_array(&self) -> Value {
        let snapshot = self.meta.snapshot(&self.attributes);
        let mut out = Map::new();
        for column in self.attributes.keys() {
            let property = self.meta.property_of_column(column);
            if self.meta.is_hidden(property) || self.meta.relation(property).is_some() {
                continue;
            }
            out.insert(property.to_string(), self.read_attribute(property, Some(&snapshot)));
        }
        for property in self.meta.appended() {
            if self.meta.is_hidden(property) || out.contains_key(property) {
                continue;
            }
            out.insert(property.clone(), self.read_attribute(property, Some(&snapshot)));
        }
        let mut loaded: Vec<(&String, &Related)> = self
            .relations
            .iter()
            .filter_map(|(name, slot)| slot.get().map(|r| (name, r)))
            .collect();
        loaded.sort_by(|a, b| a.0.cmp(b.0));
        for (name, related) in loaded {
            if self.meta.is_hidden(name) {
                continue;
            }
            if let Some(value) = related.to_value() {
                out.insert(name.clone(), value);
            }
        }
        Value::Object(out)
    }

    /// Persist through the engine and take back the stored row (including a generated key).
    pub fn save(&mut self, orm: &Orm) -> Result<&mut Self, OrmError> {
        let stored = orm
            .engine()
            .save(self.meta.table(), self.meta.primary_key_column(), &self.attributes)?;
        self.attributes = stored;
        Ok(self)
    }

    fn unknown(&self, property: &str) -> OrmError {
        OrmError::UnknownProperty {
            model: self.meta.name().to_string(),
            property: property.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orm::declare::{Field, ModelDecl, Relation};
    use crate::orm::metadata::{Cast, MetadataResolver};
    use crate::store::MemoryStore;
    use serde_json::json;
    use std::cell::Cell;

    thread_local! {
        static FULL_NAME_CALLS: Cell<usize> = const { Cell::new(0) };
    }

    fn user_decl() -> ModelDecl {
        ModelDecl::new("User", "users")
            .field(Field::new("id").primary_key().guarded().cast(Cast::Int))
            .field(Field::new("firstName").column("first_name"))
            .field(Field::new("lastName").column("last_name"))
            .field(Field::new("password").hidden())
            .field(Field::new("fullName").guarded().appended())
            .field(Field::new("active").cast(Cast::Bool))
            .relation(Relation::has_many("posts", "Post"))
            .accessor("getFullNameAttribute", |_raw, row| {
                FULL_NAME_CALLS.with(|c| c.set(c.get() + 1));
                json!(format!(
                    "{} {}",
                    row["firstName"].as_str().unwrap_or(""),
                    row["last_name"].as_str().unwrap_or("")
                ))
            })
            .mutator("setPasswordAttribute", |v| json!(format!("hashed:{}", v.as_str().unwrap_or(""))))
            .mutator_in_place("setNameAttribute", |attrs, v| {
                let text = v.as_str().unwrap_or("");
                let (first, last) = text.split_once(' ').unwrap_or((text, ""));
                attrs.insert("first_name".into(), json!(first));
                attrs.insert("last_name".into(), json!(last));
            })
    }

    fn post_decl() -> ModelDecl {
        ModelDecl::new("Post", "posts")
            .field(Field::new("id").primary_key())
            .field(Field::new("title"))
            .field(Field::new("userId").column("user_id"))
    }

    /// `name` is stored in `display_name`, while the `name` column backs `login`.
    fn account_decl() -> ModelDecl {
        ModelDecl::new("Account", "accounts")
            .field(Field::new("id").primary_key().guarded().cast(Cast::Int))
            .field(Field::new("name").column("display_name"))
            .field(Field::new("login").column("name"))
            .field(Field::new("badge").appended())
            .accessor("getBadgeAttribute", |_raw, row| {
                json!(format!("{} ({})", row["name"].as_str().unwrap_or(""), row["login"].as_str().unwrap_or("")))
            })
    }

    fn orm() -> (Orm, Arc<MemoryStore>) {
        let mut models = MetadataResolver::new();
        models
            .register_decl("User", user_decl)
            .register_decl("Post", post_decl)
            .register_decl("Account", account_decl);
        let store = Arc::new(MemoryStore::new());
        (Orm::new(models, store.clone()), store)
    }

    fn user(orm: &Orm, row: Value) -> Entity {
        let meta = orm.metadata("User").unwrap();
        Entity::from_row(meta, row.as_object().cloned().unwrap())
    }

    #[test]
    fn to_array_hides_appends_and_renames() {
        let (orm, _) = orm();
        let u = user(
            &orm,
            json!({"id": "1", "first_name": "Ada", "last_name": "Lovelace", "password": "x", "active": 1}),
        );
        let before = FULL_NAME_CALLS.with(Cell::get);
        let out = u.to_array();
        assert_eq!(FULL_NAME_CALLS.with(Cell::get) - before, 1);
        assert_eq!(
            out,
            json!({"id": 1, "firstName": "Ada", "lastName": "Lovelace", "fullName": "Ada Lovelace", "active": true})
        );
    }

    #[test]
    fn returning_mutator_writes_through() {
        let (orm, _) = orm();
        let mut u = orm.make("User").unwrap();
        u.set_property("password", json!("pw")).unwrap();
        assert_eq!(u.attributes()["password"], "hashed:pw");
    }

    #[test]
    fn in_place_mutator_performs_its_own_write() {
        let (orm, _) = orm();
        let mut u = orm.make("User").unwrap();
        u.set_property("name", json!("Grace Hopper")).unwrap();
        assert_eq!(u.attributes()["first_name"], "Grace");
        assert_eq!(u.attribute("lastName"), json!("Hopper"));
        assert!(u.attributes().get("name").is_none());
    }

    #[test]
    fn column_and_property_names_are_interchangeable() {
        let (orm, _) = orm();
        let mut u = orm.make("User").unwrap();
        u.set_property("first_name", json!("Ada")).unwrap();
        assert_eq!(u.attribute("firstName"), json!("Ada"));
        assert_eq!(u.raw("first_name"), Some(&json!("Ada")));
        assert!(matches!(
            u.set_property("nickname", json!("x")),
            Err(OrmError::UnknownProperty { .. })
        ));
    }

    #[test]
    fn fill_rejects_non_fillable_without_partial_writes() {
        let (orm, _) = orm();
        let mut u = orm.make("User").unwrap();
        let payload = json!({"first_name": "Ada", "id": 9}).as_object().cloned().unwrap();
        let err = u.fill(&payload).unwrap_err();
        assert!(matches!(err, OrmError::MassAssignment { ref property, .. } if property == "id"));
        assert!(u.attributes().is_empty());
    }

    #[test]
    fn to_array_keys_columns_by_their_own_property() {
        let (orm, _) = orm();
        let meta = orm.metadata("Account").unwrap();
        let row = json!({"id": 1, "display_name": "Ada L", "name": "ada"});
        let account = Entity::from_row(meta, row.as_object().cloned().unwrap());
        assert_eq!(account.attribute("login"), json!("ada"));
        assert_eq!(account.attribute("name"), json!("Ada L"));
        assert_eq!(
            account.to_array(),
            json!({"id": 1, "name": "Ada L", "login": "ada", "badge": "Ada L (ada)"})
        );
    }

    #[test]
    fn appended_properties_are_not_fillable() {
        let (orm, store) = orm();
        let payload = json!({"login": "ada", "badge": "forged"}).as_object().cloned().unwrap();
        let err = orm.create("Account", &payload).unwrap_err();
        assert!(matches!(err, OrmError::MassAssignment { ref property, .. } if property == "badge"));
        assert!(store.rows("accounts").is_empty());

        let mut account = orm.make("Account").unwrap();
        account.fill(&json!({"name": "Ada L"}).as_object().cloned().unwrap()).unwrap();
        assert_eq!(account.attributes().get("display_name"), Some(&json!("Ada L")));
        assert!(account.attributes().get("name").is_none());
    }

    #[test]
    fn relation_is_fetched_once_per_instance() {
        let (orm, store) = orm();
        store.seed("posts", json!({"id": 1, "title": "a", "user_id": 1}));
        store.seed("posts", json!({"id": 2, "title": "b", "user_id": 1}));
        store.seed("posts", json!({"id": 3, "title": "c", "user_id": 2}));
        let u = user(&orm, json!({"id": 1, "first_name": "Ada"}));
        assert!(!u.relation_loaded("posts"));
        assert!(u.to_array().get("posts").is_none());

        let first = u.relation("posts", &orm).unwrap().many().len();
        let second = match u.get_property("posts", &orm).unwrap() {
            Property::Relation(r) => r.many().len(),
            Property::Value(_) => unreachable!(),
        };
        assert_eq!((first, second), (2, 2));
        assert_eq!(store.fetch_count(), 1);
        assert_eq!(u.to_array()["posts"][1]["title"], "b");
    }

    #[test]
    fn relations_cannot_be_assigned() {
        let (orm, _) = orm();
        let mut u = orm.make("User").unwrap();
        assert!(matches!(
            u.set_property("posts", json!([])),
            Err(OrmError::RelationAssignment { .. })
        ));
    }
}
