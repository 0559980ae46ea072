//! View descriptors and view groups.

use common::EntityId;
use store::{ClusteringKey, ClusteringOrder, ViewKey};

use crate::{CatalogError, Entity, EntityKind, Result};

/// Attribute a view is partitioned by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyAttribute {
    /// The entity's own id; a view keyed this way locates the entity.
    Id,
    /// A named, immutable entity attribute.
    Attribute(&'static str),
}

/// One denormalized projection of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewDescriptor {
    pub name: &'static str,
    pub key: KeyAttribute,
    pub order: ClusteringOrder,
}

impl ViewDescriptor {
    /// A view keyed by the entity id.
    pub const fn by_id(name: &'static str) -> Self {
        Self {
            name,
            key: KeyAttribute::Id,
            order: ClusteringOrder::NewestFirst,
        }
    }

    /// A view keyed by a named attribute, newest rows first.
    pub const fn by_attribute(name: &'static str, attribute: &'static str) -> Self {
        Self {
            name,
            key: KeyAttribute::Attribute(attribute),
            order: ClusteringOrder::NewestFirst,
        }
    }

    pub fn is_locator(&self) -> bool {
        self.key == KeyAttribute::Id
    }

    /// Partition holding `entity` in this view.
    pub fn view_key(&self, entity: &Entity) -> Result<ViewKey> {
        let partition = match self.key {
            KeyAttribute::Id => entity.id.to_string(),
            KeyAttribute::Attribute(attribute) => entity
                .attribute(attribute)
                .ok_or(CatalogError::MissingAttribute {
                    entity_id: entity.id,
                    view: self.name,
                    attribute,
                })?
                .to_string(),
        };
        Ok(ViewKey::new(self.name, partition))
    }

    /// Partition for an arbitrary key value in this view.
    pub fn key_for(&self, value: impl ToString) -> ViewKey {
        ViewKey::new(self.name, value.to_string())
    }

    /// Position of `entity` inside its partition.
    pub fn clustering_key(&self, entity: &Entity) -> ClusteringKey {
        ClusteringKey::new(entity.created_at, entity.id)
    }
}

/// The views that must all reflect a mutation of one entity kind.
///
/// The first view is always the locator view, keyed by entity id.
#[derive(Debug, Clone)]
pub struct ViewGroup {
    pub kind: EntityKind,
    pub views: Vec<ViewDescriptor>,
}

impl ViewGroup {
    pub fn new(kind: EntityKind, views: Vec<ViewDescriptor>) -> Self {
        Self { kind, views }
    }

    /// The view keyed by entity id.
    pub fn locator(&self) -> Result<&ViewDescriptor> {
        self.views
            .first()
            .filter(|v| v.is_locator())
            .ok_or_else(|| {
                CatalogError::Invalid(format!("view group for {} has no locator view", self.kind))
            })
    }

    /// Partition of the locator view holding `entity_id`.
    pub fn locator_key(&self, entity_id: EntityId) -> Result<ViewKey> {
        Ok(self.locator()?.key_for(entity_id))
    }

    pub fn view(&self, name: &str) -> Option<&ViewDescriptor> {
        self.views.iter().find(|v| v.name == name)
    }
}
