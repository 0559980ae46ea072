//! Declarative description of entities and the views they fan out to.
//!
//! This crate is pure data:
//! - [`Entity`] is the logical record and its row encoding
//! - [`ViewDescriptor`] describes one denormalized projection of an entity
//! - [`ViewCatalog`] maps every entity kind to its [`ViewGroup`]

pub mod catalog;
pub mod entity;
pub mod error;
pub mod view;

pub use catalog::{MEMBERSHIP_VIEW, ViewCatalog};
pub use entity::{Entity, EntityKind};
pub use error::{CatalogError, Result};
pub use view::{KeyAttribute, ViewDescriptor, ViewGroup};
