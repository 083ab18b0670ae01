//! Entity metadata: built once per model from its declaration, cached for the process lifetime.

use crate::case::lcfirst;
use crate::error::OrmError;
use crate::orm::declare::{AccessorFn, MethodBody, Model, ModelDecl, MutatorFn};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

/// Type tag applied when an attribute is read.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cast {
    Int,
    Float,
    Bool,
    String,
    Json,
    Datetime,
}

impl std::str::FromStr for Cast {
    type Err = OrmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "int" | "integer" => Ok(Cast::Int),
            "float" | "double" | "real" => Ok(Cast::Float),
            "bool" | "boolean" => Ok(Cast::Bool),
            "string" => Ok(Cast::String),
            "json" | "array" => Ok(Cast::Json),
            "datetime" => Ok(Cast::Datetime),
            other => Err(OrmError::UnknownCast(other.to_string())),
        }
    }
}

impl Cast {
    pub fn apply(&self, value: &Value) -> Value {
        if value.is_null() {
            return Value::Null;
        }
        match self {
            Cast::Int => match value {
                Value::Number(n) => n
                    .as_i64()
                    .or_else(|| n.as_f64().map(|f| f as i64))
                    .map(Value::from)
                    .unwrap_or(Value::Null),
                Value::String(s) => s.trim().parse::<i64>().map(Value::from).unwrap_or(Value::from(0)),
                Value::Bool(b) => Value::from(*b as i64),
                _ => Value::Null,
            },
            Cast::Float => match value {
                Value::Number(n) => n.as_f64().map(Value::from).unwrap_or(Value::Null),
                Value::String(s) => s.trim().parse::<f64>().map(Value::from).unwrap_or(Value::from(0.0)),
                Value::Bool(b) => Value::from(if *b { 1.0 } else { 0.0 }),
                _ => Value::Null,
            },
            Cast::Bool => Value::Bool(truthy(value)),
            Cast::String => match value {
                Value::String(_) => value.clone(),
                other => Value::String(other.to_string()),
            },
            Cast::Json => match value {
                Value::String(s) => serde_json::from_str(s).unwrap_or_else(|_| value.clone()),
                other => other.clone(),
            },
            Cast::Datetime => match value {
                Value::String(s) => Value::String(format_datetime(s).unwrap_or_else(|| s.clone())),
                other => other.clone(),
            },
        }
    }
}

/// Loose truthiness for bool casts and path-variable coercion.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => matches!(s.trim().to_lowercase().as_str(), "1" | "true" | "on" | "yes"),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn format_datetime(s: &str) -> Option<String> {
    const OUT: &str = "%Y-%m-%d %H:%M:%S";
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
        return Some(dt.format(OUT).to_string());
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.format(OUT).to_string());
        }
    }
    chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.format(OUT).to_string())
}

#[derive(Clone, Debug, PartialEq)]
pub struct FieldDescriptor {
    pub property: String,
    pub column: String,
    pub is_primary_key: bool,
    pub is_fillable: bool,
    pub cast: Option<Cast>,
    pub is_hidden: bool,
    pub is_appended: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelationKind {
    BelongsTo,
    HasOne,
    HasMany,
    BelongsToMany,
}

impl RelationKind {
    /// BelongsTo and HasOne resolve to at most one instance.
    pub fn is_to_one(&self) -> bool {
        matches!(self, RelationKind::BelongsTo | RelationKind::HasOne)
    }
}

/// Keys left as `None` are filled in by convention when the relation is resolved.
#[derive(Clone, Debug, PartialEq)]
pub struct RelationDescriptor {
    pub name: String,
    pub kind: RelationKind,
    pub related: String,
    pub foreign_key: Option<String>,
    pub local_or_owner_key: Option<String>,
    pub pivot_table: Option<String>,
    pub foreign_pivot_key: Option<String>,
    pub related_pivot_key: Option<String>,
}

/// Read-only after construction.
pub struct EntityMetadata {
    name: String,
    table: String,
    primary_key: String,
    fields: Vec<FieldDescriptor>,
    property_to_column: HashMap<String, String>,
    column_to_property: HashMap<String, String>,
    casts: HashMap<String, Cast>,
    relations: HashMap<String, RelationDescriptor>,
    accessors: HashMap<String, AccessorFn>,
    mutators: HashMap<String, MutatorFn>,
    fillable: HashSet<String>,
    hidden: HashSet<String>,
    appended: Vec<String>,
}

impl fmt::Debug for EntityMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityMetadata")
            .field("name", &self.name)
            .field("table", &self.table)
            .field("primary_key", &self.primary_key)
            .field("fields", &self.fields)
            .field("relations", &self.relations.keys().collect::<Vec<_>>())
            .field("accessors", &self.accessors.keys().collect::<Vec<_>>())
            .field("mutators", &self.mutators.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl EntityMetadata {
    /// Enumerate fields, relations and tagged methods of one declaration.
    ///
    /// Two fields mapping to the same column are rejected: the property/column mapping must stay
    /// a bijection. Tagged methods whose names do not follow the `get`/`set` convention are
    /// ignored.
    pub fn build(decl: ModelDecl) -> Result<Self, OrmError> {
        let mut meta = EntityMetadata {
            name: decl.name,
            table: decl.table,
            primary_key: "id".into(),
            fields: Vec::with_capacity(decl.fields.len()),
            property_to_column: HashMap::new(),
            column_to_property: HashMap::new(),
            casts: HashMap::new(),
            relations: HashMap::new(),
            accessors: HashMap::new(),
            mutators: HashMap::new(),
            fillable: HashSet::new(),
            hidden: HashSet::new(),
            appended: Vec::new(),
        };

        for field in decl.fields {
            let column = field.column.unwrap_or_else(|| field.property.clone());
            if let Some(existing) = meta.column_to_property.get(&column) {
                return Err(OrmError::DuplicateColumn {
                    model: meta.name.clone(),
                    column,
                    first: existing.clone(),
                    second: field.property,
                });
            }
            meta.property_to_column.insert(field.property.clone(), column.clone());
            meta.column_to_property.insert(column.clone(), field.property.clone());
            if field.primary_key {
                meta.primary_key = field.property.clone();
            }
            if field.fillable {
                meta.fillable.insert(field.property.clone());
            }
            if let Some(cast) = field.cast {
                meta.casts.insert(column.clone(), cast);
            }
            if field.hidden {
                meta.hidden.insert(field.property.clone());
            }
            if field.appended && !meta.appended.contains(&field.property) {
                meta.appended.push(field.property.clone());
            }
            meta.fields.push(FieldDescriptor {
                property: field.property,
                column,
                is_primary_key: field.primary_key,
                is_fillable: field.fillable,
                cast: field.cast,
                is_hidden: field.hidden,
                is_appended: field.appended,
            });
        }

        for rel in decl.relations {
            meta.relations.insert(
                rel.property.clone(),
                RelationDescriptor {
                    name: rel.property,
                    kind: rel.kind,
                    related: rel.related,
                    foreign_key: rel.foreign_key,
                    local_or_owner_key: rel.local_or_owner_key,
                    pivot_table: rel.pivot_table,
                    foreign_pivot_key: rel.foreign_pivot_key,
                    related_pivot_key: rel.related_pivot_key,
                },
            );
        }

        for method in decl.methods {
            match method.body {
                MethodBody::Accessor(f) => {
                    if let Some(property) = property_from_method(&method.name, "get") {
                        meta.accessors.insert(property, f);
                    }
                }
                MethodBody::Mutator(f) => {
                    if let Some(property) = property_from_method(&method.name, "set") {
                        meta.mutators.insert(property, f);
                    }
                }
            }
        }

        Ok(meta)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Property name of the primary key.
    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    pub fn primary_key_column(&self) -> &str {
        self.column_for(&self.primary_key)
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn field(&self, property: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.property == property)
    }

    /// Column for a property; undeclared properties map to themselves.
    pub fn column_for<'a>(&'a self, property: &'a str) -> &'a str {
        self.property_to_column.get(property).map(String::as_str).unwrap_or(property)
    }

    /// Normalize a caller-supplied property-or-column key to its property name. A declared
    /// property name wins over a column of the same name.
    pub fn property_for<'a>(&'a self, key: &'a str) -> &'a str {
        if self.property_to_column.contains_key(key) || self.relations.contains_key(key) {
            return key;
        }
        self.column_to_property.get(key).map(String::as_str).unwrap_or(key)
    }

    /// Property backed by a stored column; unmapped columns keep their name.
    pub fn property_of_column<'a>(&'a self, column: &'a str) -> &'a str {
        self.column_to_property.get(column).map(String::as_str).unwrap_or(column)
    }

    /// Primary key value in the shape of its declared cast. Without one, integer-looking
    /// strings become integers.
    pub fn key_value(&self, key: &Value) -> Value {
        match (self.cast_for(self.primary_key_column()), key) {
            (Some(cast), _) => cast.apply(key),
            (None, Value::String(s)) => s.trim().parse::<i64>().map(Value::from).unwrap_or_else(|_| key.clone()),
            (None, other) => other.clone(),
        }
    }

    pub fn cast_for(&self, column: &str) -> Option<Cast> {
        self.casts.get(column).copied()
    }

    pub fn relation(&self, name: &str) -> Option<&RelationDescriptor> {
        self.relations.get(name)
    }

    pub fn relations(&self) -> impl Iterator<Item = &RelationDescriptor> {
        self.relations.values()
    }

    pub fn accessor(&self, property: &str) -> Option<&AccessorFn> {
        self.accessors.get(property)
    }

    pub fn mutator(&self, property: &str) -> Option<&MutatorFn> {
        self.mutators.get(property)
    }

    pub fn is_fillable(&self, property: &str) -> bool {
        self.fillable.contains(property)
    }

    pub fn is_hidden(&self, property: &str) -> bool {
        self.hidden.contains(property)
    }

    pub fn appended(&self) -> &[String] {
        &self.appended
    }

    /// Whether a key names anything declared on the model.
    pub fn declares(&self, property: &str) -> bool {
        self.property_to_column.contains_key(property)
            || self.relations.contains_key(property)
            || self.accessors.contains_key(property)
            || self.mutators.contains_key(property)
    }

    /// Snapshot passed to accessors: raw values under their column and, when mapped, their
    /// property name. A property name shadows a column of the same name.
    pub fn snapshot(&self, attributes: &Map<String, Value>) -> Map<String, Value> {
        let mut out = attributes.clone();
        for (column, value) in attributes {
            if let Some(property) = self.column_to_property.get(column) {
                out.insert(property.clone(), value.clone());
            }
        }
        out
    }
}

/// `getFullNameAttribute` -> `fullName`; `get_full_name_attribute` -> `full_name`.
fn property_from_method(method: &str, prefix: &str) -> Option<String> {
    let rest = method.strip_prefix(prefix)?;
    if let Some(snake) = rest.strip_prefix('_').and_then(|r| r.strip_suffix("_attribute")) {
        return (!snake.is_empty()).then(|| snake.to_string());
    }
    let camel = rest.strip_suffix("Attribute")?;
    if camel.chars().next().map(char::is_uppercase).unwrap_or(false) {
        Some(lcfirst(camel))
    } else {
        None
    }
}

type DeclareFn = fn() -> ModelDecl;

/// Memoizing metadata cache keyed by model name. A context object, not a global.
///
/// Concurrent first builds for one model may both run; the first insert wins and the other
/// result is dropped, so a partially built entry is never observable.
#[derive(Default)]
pub struct MetadataResolver {
    declarations: HashMap<String, DeclareFn>,
    cache: RwLock<HashMap<String, Arc<EntityMetadata>>>,
    builds: AtomicUsize,
}

impl MetadataResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<M: Model>(&mut self) -> &mut Self {
        self.declarations.insert(M::NAME.to_string(), M::declare);
        self
    }

    pub fn register_decl(&mut self, name: impl Into<String>, declare: DeclareFn) -> &mut Self {
        self.declarations.insert(name.into(), declare);
        self
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.declarations.contains_key(name)
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<EntityMetadata>, OrmError> {
        if let Some(meta) = self.cache.read().unwrap_or_else(|e| e.into_inner()).get(name) {
            return Ok(Arc::clone(meta));
        }
        let declare = self
            .declarations
            .get(name)
            .ok_or_else(|| OrmError::UnknownModel(name.to_string()))?;
        let built = Arc::new(EntityMetadata::build(declare())?);
        self.builds.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(model = %name, "entity metadata built");
        let mut cache = self.cache.write().unwrap_or_else(|e| e.into_inner());
        Ok(Arc::clone(cache.entry(name.to_string()).or_insert(built)))
    }

    pub fn resolve_model<M: Model>(&self) -> Result<Arc<EntityMetadata>, OrmError> {
        self.resolve(M::NAME)
    }

    /// Number of metadata builds performed, including builds that lost a race.
    pub fn build_count(&self) -> usize {
        self.builds.load(Ordering::Relaxed)
    }
}
