//! The static catalog of view groups.

use std::collections::{BTreeMap, HashSet};

use common::{ActorId, EntityId};
use store::{ClusteringKey, ViewKey};

use crate::{CatalogError, EntityKind, Result, ViewDescriptor, ViewGroup};

/// Membership rows ("actor liked post"), partitioned by the liked entity.
pub const MEMBERSHIP_VIEW: &str = "likes_by_post";

/// Declarative description of every entity kind and its view group.
///
/// Built once at startup and shared read-only by every worker.
#[derive(Debug, Clone)]
pub struct ViewCatalog {
    groups: BTreeMap<EntityKind, ViewGroup>,
}

impl ViewCatalog {
    /// Builds a catalog, validating that every group starts with a locator
    /// view and that view names are unique across the catalog.
    pub fn new(groups: impl IntoIterator<Item = ViewGroup>) -> Result<Self> {
        let mut by_kind = BTreeMap::new();
        let mut names = HashSet::new();

        for group in groups {
            group.locator()?;
            if group.views.iter().skip(1).any(|v| v.is_locator()) {
                return Err(CatalogError::Invalid(format!(
                    "view group for {} has more than one locator view",
                    group.kind
                )));
            }
            for view in &group.views {
                if view.name == MEMBERSHIP_VIEW || !names.insert(view.name) {
                    return Err(CatalogError::Invalid(format!(
                        "duplicate view name {}",
                        view.name
                    )));
                }
            }
            if by_kind.insert(group.kind, group).is_some() {
                return Err(CatalogError::Invalid(
                    "entity kind registered twice".to_string(),
                ));
            }
        }

        Ok(Self { groups: by_kind })
    }

    /// The posts/comments/users schema.
    pub fn standard() -> Self {
        let groups = BTreeMap::from([
            (
                EntityKind::Post,
                ViewGroup::new(
                    EntityKind::Post,
                    vec![
                        ViewDescriptor::by_id("posts_by_id"),
                        ViewDescriptor::by_attribute("posts_by_author", "author_id"),
                        ViewDescriptor::by_attribute("posts_by_category", "category"),
                    ],
                ),
            ),
            (
                EntityKind::Comment,
                ViewGroup::new(
                    EntityKind::Comment,
                    vec![
                        ViewDescriptor::by_id("comments_by_id"),
                        ViewDescriptor::by_attribute("comments_by_post", "post_id"),
                        ViewDescriptor::by_attribute("comments_by_author", "author_id"),
                    ],
                ),
            ),
            (
                EntityKind::User,
                ViewGroup::new(EntityKind::User, vec![ViewDescriptor::by_id("users_by_id")]),
            ),
        ]);
        Self { groups }
    }

    /// The ordered views of an entity kind, locator first.
    pub fn views_for(&self, kind: EntityKind) -> Result<&[ViewDescriptor]> {
        Ok(&self.group(kind)?.views)
    }

    pub fn group(&self, kind: EntityKind) -> Result<&ViewGroup> {
        self.groups.get(&kind).ok_or(CatalogError::UnknownKind(kind))
    }

    /// Finds a view by name along with the group that owns it.
    pub fn view(&self, name: &str) -> Result<(&ViewGroup, &ViewDescriptor)> {
        self.groups
            .values()
            .find_map(|group| group.view(name).map(|view| (group, view)))
            .ok_or_else(|| CatalogError::UnknownView(name.to_string()))
    }

    /// Partition of the membership view holding every actor of `entity_id`.
    pub fn membership_key(&self, entity_id: EntityId) -> ViewKey {
        ViewKey::new(MEMBERSHIP_VIEW, entity_id.to_string())
    }

    /// Position of `actor` inside a membership partition.
    pub fn membership_clustering(&self, actor: ActorId) -> ClusteringKey {
        ClusteringKey::for_id(actor.as_uuid())
    }
}

impl Default for ViewCatalog {
    fn default() -> Self {
        Self::standard()
    }
}
