//! Relation fetch strategies and key conventions.

use crate::case::to_snake_case;
use crate::error::OrmError;
use crate::orm::entity::Entity;
use crate::orm::metadata::{EntityMetadata, RelationDescriptor, RelationKind};
use crate::orm::Orm;
use crate::store::{Condition, FetchSpec};
use serde_json::Value;

/// A resolved relation slot.
#[derive(Clone, Debug)]
pub enum Related {
    One(Option<Box<Entity>>),
    Many(Vec<Entity>),
}

impl Related {
    pub fn one(&self) -> Option<&Entity> {
        match self {
            Related::One(e) => e.as_deref(),
            Related::Many(_) => None,
        }
    }

    pub fn many(&self) -> &[Entity] {
        match self {
            Related::One(_) => &[],
            Related::Many(list) => list,
        }
    }

    /// `None` for an empty to-one slot.
    pub(crate) fn to_value(&self) -> Option<Value> {
        match self {
            Related::One(e) => e.as_ref().map(|e| e.to_array()),
            Related::Many(list) => Some(Value::Array(list.iter().map(Entity::to_array).collect())),
        }
    }
}

/// Fully keyed relation: every key the descriptor left out is filled in by convention.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedKeys {
    pub kind: RelationKind,
    /// Column on the owner whose value selects related rows.
    pub owner_column: String,
    /// Column on the related table compared against the owner value. Unused for pivots.
    pub related_column: String,
    pub pivot: Option<PivotKeys>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PivotKeys {
    pub table: String,
    pub parent_key: String,
    pub related_key: String,
}

pub struct RelationResolver<'a> {
    orm: &'a Orm,
}

impl<'a> RelationResolver<'a> {
    pub fn new(orm: &'a Orm) -> Self {
        RelationResolver { orm }
    }

    pub fn keys(owner: &EntityMetadata, related: &EntityMetadata, desc: &RelationDescriptor) -> ResolvedKeys {
        match desc.kind {
            RelationKind::BelongsTo => ResolvedKeys {
                kind: desc.kind,
                owner_column: desc
                    .foreign_key
                    .clone()
                    .unwrap_or_else(|| format!("{}_id", to_snake_case(&desc.name))),
                related_column: desc
                    .local_or_owner_key
                    .clone()
                    .unwrap_or_else(|| related.primary_key_column().to_string()),
                pivot: None,
            },
            RelationKind::HasOne | RelationKind::HasMany => ResolvedKeys {
                kind: desc.kind,
                owner_column: desc
                    .local_or_owner_key
                    .clone()
                    .unwrap_or_else(|| owner.primary_key_column().to_string()),
                related_column: desc
                    .foreign_key
                    .clone()
                    .unwrap_or_else(|| format!("{}_id", to_snake_case(owner.name()))),
                pivot: None,
            },
            RelationKind::BelongsToMany => {
                let owner_snake = to_snake_case(owner.name());
                let related_snake = to_snake_case(related.name());
                let table = desc.pivot_table.clone().unwrap_or_else(|| {
                    let mut names = [owner_snake.clone(), related_snake.clone()];
                    names.sort();
                    names.join("_")
                });
                ResolvedKeys {
                    kind: desc.kind,
                    owner_column: desc
                        .local_or_owner_key
                        .clone()
                        .unwrap_or_else(|| owner.primary_key_column().to_string()),
                    related_column: related.primary_key_column().to_string(),
                    pivot: Some(PivotKeys {
                        table,
                        parent_key: desc
                            .foreign_pivot_key
                            .clone()
                            .unwrap_or_else(|| format!("{}_id", owner_snake)),
                        related_key: desc
                            .related_pivot_key
                            .clone()
                            .unwrap_or_else(|| format!("{}_id", related_snake)),
                    }),
                }
            }
        }
    }

    /// Fetch the related entities for one owner. An owner without a key value yields an empty
    /// result without touching the engine.
    pub fn resolve(&self, owner: &Entity, desc: &RelationDescriptor) -> Result<Related, OrmError> {
        let related_meta = self.orm.metadata(&desc.related)?;
        let keys = Self::keys(owner.meta(), &related_meta, desc);
        let empty = if desc.kind.is_to_one() {
            Related::One(None)
        } else {
            Related::Many(Vec::new())
        };
        let owner_value = match owner.attributes().get(&keys.owner_column) {
            Some(v) if !v.is_null() => v.clone(),
            _ => return Ok(empty),
        };
        let condition = match keys.pivot {
            Some(pivot) => Condition::ViaPivot {
                pivot_table: pivot.table,
                pivot_parent_key: pivot.parent_key,
                pivot_related_key: pivot.related_key,
                related_key: keys.related_column,
                parent_value: owner_value,
            },
            None => Condition::Eq {
                column: keys.related_column,
                value: owner_value,
            },
        };
        let spec = FetchSpec {
            table: related_meta.table().to_string(),
            condition,
        };
        tracing::debug!(
            model = %owner.meta().name(),
            relation = %desc.name,
            table = %spec.table,
            "resolving relation"
        );
        let engine = self.orm.engine();
        if desc.kind.is_to_one() {
            let row = engine.fetch_one(&spec)?;
            Ok(Related::One(
                row.map(|r| Box::new(Entity::from_row(related_meta.clone(), r))),
            ))
        } else {
            let rows = engine.fetch_many(&spec)?;
            Ok(Related::Many(
                rows.into_iter()
                    .map(|r| Entity::from_row(related_meta.clone(), r))
                    .collect(),
            ))
        }
    }
}
