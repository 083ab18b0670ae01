//! Model declaration surface: fields, relations, and tagged accessor/mutator methods.
//!
//! A declaration is plain data handed to the metadata resolver once per model:
//!
//! ```
//! use dispatch_kit::orm::{Cast, Field, Model, ModelDecl, Relation};
//! use serde_json::Value;
//!
//! struct User;
//!
//! impl Model for User {
//!     const NAME: &'static str = "User";
//!
//!     fn declare() -> ModelDecl {
//!         ModelDecl::new(Self::NAME, "users")
//!             .field(Field::new("id").primary_key().guarded().cast(Cast::Int))
//!             .field(Field::new("userName").column("name"))
//!             .field(Field::new("password").guarded().hidden())
//!             .relation(Relation::has_many("posts", "Post"))
//!             .accessor("getUserNameAttribute", |raw, _row| {
//!                 Value::String(raw.as_str().unwrap_or("").to_uppercase())
//!             })
//!     }
//! }
//! ```

use crate::orm::metadata::{Cast, RelationKind};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Computes the displayed value from the raw stored value and a snapshot of the whole row.
pub type AccessorFn = Arc<dyn Fn(&Value, &Map<String, Value>) -> Value + Send + Sync>;

/// Transforms an incoming value before storage.
#[derive(Clone)]
pub enum MutatorFn {
    /// The returned value is stored under the property's column.
    Returning(Arc<dyn Fn(&Value) -> Value + Send + Sync>),
    /// The mutator writes the column-keyed attributes itself.
    InPlace(Arc<dyn Fn(&mut Map<String, Value>, Value) + Send + Sync>),
}

/// A type whose instances are stored entities.
pub trait Model: 'static {
    const NAME: &'static str;

    fn declare() -> ModelDecl;
}

#[derive(Clone, Debug)]
pub struct Field {
    pub(crate) property: String,
    pub(crate) column: Option<String>,
    pub(crate) primary_key: bool,
    pub(crate) fillable: bool,
    pub(crate) cast: Option<Cast>,
    pub(crate) hidden: bool,
    pub(crate) appended: bool,
}

impl Field {
    /// Fillable by default; the column defaults to the property name.
    pub fn new(property: impl Into<String>) -> Self {
        Field {
            property: property.into(),
            column: None,
            primary_key: false,
            fillable: true,
            cast: None,
            hidden: false,
            appended: false,
        }
    }

    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    /// Excluded from bulk assignment.
    pub fn guarded(mut self) -> Self {
        self.fillable = false;
        self
    }

    pub fn cast(mut self, cast: Cast) -> Self {
        self.cast = Some(cast);
        self
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    /// Computed property included in serialization although no column backs it. Never
    /// fillable.
    pub fn appended(mut self) -> Self {
        self.appended = true;
        self.fillable = false;
        self
    }
}

#[derive(Clone, Debug)]
pub struct Relation {
    pub(crate) property: String,
    pub(crate) kind: RelationKind,
    pub(crate) related: String,
    pub(crate) foreign_key: Option<String>,
    pub(crate) local_or_owner_key: Option<String>,
    pub(crate) pivot_table: Option<String>,
    pub(crate) foreign_pivot_key: Option<String>,
    pub(crate) related_pivot_key: Option<String>,
}

impl Relation {
    fn new(property: impl Into<String>, kind: RelationKind, related: impl Into<String>) -> Self {
        Relation {
            property: property.into(),
            kind,
            related: related.into(),
            foreign_key: None,
            local_or_owner_key: None,
            pivot_table: None,
            foreign_pivot_key: None,
            related_pivot_key: None,
        }
    }

    pub fn belongs_to(property: impl Into<String>, related: impl Into<String>) -> Self {
        Self::new(property, RelationKind::BelongsTo, related)
    }

    pub fn has_one(property: impl Into<String>, related: impl Into<String>) -> Self {
        Self::new(property, RelationKind::HasOne, related)
    }

    pub fn has_many(property: impl Into<String>, related: impl Into<String>) -> Self {
        Self::new(property, RelationKind::HasMany, related)
    }

    pub fn belongs_to_many(property: impl Into<String>, related: impl Into<String>) -> Self {
        Self::new(property, RelationKind::BelongsToMany, related)
    }

    pub fn foreign_key(mut self, column: impl Into<String>) -> Self {
        self.foreign_key = Some(column.into());
        self
    }

    /// Local key for has-one/has-many, owner key for belongs-to.
    pub fn local_key(mut self, column: impl Into<String>) -> Self {
        self.local_or_owner_key = Some(column.into());
        self
    }

    pub fn owner_key(self, column: impl Into<String>) -> Self {
        self.local_key(column)
    }

    pub fn pivot(
        mut self,
        table: impl Into<String>,
        foreign_pivot_key: impl Into<String>,
        related_pivot_key: impl Into<String>,
    ) -> Self {
        self.pivot_table = Some(table.into());
        self.foreign_pivot_key = Some(foreign_pivot_key.into());
        self.related_pivot_key = Some(related_pivot_key.into());
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MethodTag {
    Accessor,
    Mutator,
}

#[derive(Clone)]
pub(crate) enum MethodBody {
    Accessor(AccessorFn),
    Mutator(MutatorFn),
}

/// A tagged method. Its name must follow `get<Property>` / `set<Property>` (optionally ending in
/// `Attribute`) to be bound to a property.
#[derive(Clone)]
pub struct Method {
    pub(crate) name: String,
    pub(crate) body: MethodBody,
}

impl Method {
    pub fn tag(&self) -> MethodTag {
        match self.body {
            MethodBody::Accessor(_) => MethodTag::Accessor,
            MethodBody::Mutator(_) => MethodTag::Mutator,
        }
    }
}

#[derive(Clone)]
pub struct ModelDecl {
    pub(crate) name: String,
    pub(crate) table: String,
    pub(crate) fields: Vec<Field>,
    pub(crate) relations: Vec<Relation>,
    pub(crate) methods: Vec<Method>,
}

impl ModelDecl {
    pub fn new(name: impl Into<String>, table: impl Into<String>) -> Self {
        ModelDecl {
            name: name.into(),
            table: table.into(),
            fields: Vec::new(),
            relations: Vec::new(),
            methods: Vec::new(),
        }
    }

    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    pub fn relation(mut self, relation: Relation) -> Self {
        self.relations.push(relation);
        self
    }

    /// Accessor named `get<Property>Attribute` (or `get_<property>_attribute`). Methods not
    /// following the convention are kept but never bound to a property.
    pub fn accessor<F>(mut self, method: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Value, &Map<String, Value>) -> Value + Send + Sync + 'static,
    {
        self.methods.push(Method {
            name: method.into(),
            body: MethodBody::Accessor(Arc::new(f)),
        });
        self
    }

    /// Mutator whose return value is written through as the stored column value.
    pub fn mutator<F>(mut self, method: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Value) -> Value + Send + Sync + 'static,
    {
        self.methods.push(Method {
            name: method.into(),
            body: MethodBody::Mutator(MutatorFn::Returning(Arc::new(f))),
        });
        self
    }

    /// Mutator that performs the write itself.
    pub fn mutator_in_place<F>(mut self, method: impl Into<String>, f: F) -> Self
    where
        F: Fn(&mut Map<String, Value>, Value) + Send + Sync + 'static,
    {
        self.methods.push(Method {
            name: method.into(),
            body: MethodBody::Mutator(MutatorFn::InPlace(Arc::new(f))),
        });
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}
