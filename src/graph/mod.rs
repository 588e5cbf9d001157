//! Family graph engine: ancestry trees and consanguinity checks.
//!
//! Every operation reads the current state through a [`GraphStore`] and keeps
//! nothing between calls. Traversals are explicit worklists bounded by a
//! [`TraversalControl`], so malformed (cyclic) data ends in an error instead of
//! a hang.

mod ancestry;
mod control;
mod guard;
mod kinship;
mod memory;
pub(crate) mod store;

pub use ancestry::{
    build_ancestry, parents_of, AncestorNode, AncestryTree, FamilyRelationship, FamilyTree,
    Member, RelationKind, TreeNode,
};
pub use control::TraversalControl;
pub use guard::{add_relationship, add_relationships};
pub use kinship::{
    ancestor_distance, are_related, assess_kinship, gather_evidence, Kinship, KinshipPolicy,
    RelatednessEvidence, DEFAULT_KINSHIP_RADIUS,
};
pub use memory::MemoryGraphStore;
pub use store::{GraphStore, SqliteGraphStore};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A node in the family graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Person {
    /// Unique identifier (UUID v4).
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

/// A directed parent -> child edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relationship {
    /// Unique identifier (UUID v4).
    pub id: String,
    #[serde(rename = "parent")]
    pub parent_id: String,
    #[serde(rename = "child")]
    pub child_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Relationship {
    /// True if this edge links `a` and `b` in either direction.
    pub fn connects(&self, a: &str, b: &str) -> bool {
        (self.parent_id == a && self.child_id == b) || (self.parent_id == b && self.child_id == a)
    }

    pub fn touches(&self, id: &str) -> bool {
        self.parent_id == id || self.child_id == id
    }
}
