//! The logical entity and its row encoding.

use std::collections::BTreeMap;

use chrono::{DateTime, SubsecRound, Utc};
use common::{ActorId, EntityId};
use serde::{Deserialize, Serialize};
use store::StoredRow;

use crate::Result;

/// Kind of logical entity; each kind owns one view group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Post,
    Comment,
    User,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Post => "post",
            EntityKind::Comment => "comment",
            EntityKind::User => "user",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A logical record with an immutable identity and mutable content.
///
/// `attributes` hold the immutable values views are keyed by (author,
/// category, parent post). Only `content` changes after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub kind: EntityKind,
    pub created_at: DateTime<Utc>,
    pub attributes: BTreeMap<String, String>,
    pub content: String,
}

impl Entity {
    /// Creates an entity of `kind` stamped with the current time.
    pub fn new(kind: EntityKind, content: impl Into<String>) -> Self {
        Self {
            id: EntityId::new(),
            kind,
            created_at: Utc::now().trunc_subsecs(3),
            attributes: BTreeMap::new(),
            content: content.into(),
        }
    }

    /// Creates a post by `author` filed under `category`.
    pub fn post(
        author: ActorId,
        author_name: impl Into<String>,
        category: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self::new(EntityKind::Post, content)
            .with_attribute("author_id", author.to_string())
            .with_attribute("author_name", author_name)
            .with_attribute("category", category)
    }

    /// Creates a comment by `author` on the post `post_id`.
    pub fn comment(
        post_id: EntityId,
        author: ActorId,
        author_name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self::new(EntityKind::Comment, content)
            .with_attribute("post_id", post_id.to_string())
            .with_attribute("author_id", author.to_string())
            .with_attribute("author_name", author_name)
    }

    /// Creates the stored record of a simulated user; its id is the actor id.
    pub fn user(actor: ActorId, name: impl Into<String>) -> Self {
        Self {
            id: EntityId::from_uuid(actor.as_uuid()),
            ..Self::new(EntityKind::User, name)
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at.trunc_subsecs(3);
        self
    }

    /// Returns a copy carrying new content and the same identity.
    pub fn with_content(&self, content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..self.clone()
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// Encodes the entity as a row payload.
    pub fn to_payload(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Decodes an entity from a stored row.
    pub fn from_row(row: &StoredRow) -> Result<Self> {
        Ok(serde_json::from_value(row.payload.clone())?)
    }
}
