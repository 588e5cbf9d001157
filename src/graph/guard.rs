//! The single path by which new parent -> child edges enter the graph.
//!
//! Callers must run these inside one transaction that also covers the
//! insert (see `Db::with_transaction`); the check is only as good as the
//! isolation around it.

use super::{ancestor_distance, assess_kinship, GraphStore, Kinship, KinshipPolicy, TraversalControl};
use crate::error::{FamilyTreeError, Result};

/// Validate and persist `parent_id -> child_id`, returning the new edge id.
pub fn add_relationship<S: GraphStore + ?Sized>(
    store: &S,
    parent_id: &str,
    child_id: &str,
    policy: &KinshipPolicy,
    ctl: &TraversalControl,
) -> Result<String> {
    if parent_id == child_id {
        return Err(FamilyTreeError::SelfParentage(parent_id.to_string()));
    }

    for id in [parent_id, child_id] {
        if store.get_person(id)?.is_none() {
            return Err(FamilyTreeError::PersonNotFound(id.to_string()));
        }
    }

    let mut kinship = assess_kinship(store, parent_id, child_id, policy, ctl)?;
    if !kinship.is_related() {
        // A child anywhere above the parent would close a cycle.
        if let Some(generations) = ancestor_distance(store, parent_id, child_id, ctl)? {
            kinship = Kinship::Lineal {
                ancestor_id: child_id.to_string(),
                generations,
            };
        }
    }
    if kinship.is_related() {
        log::warn!(
            "Rejected relationship {} -> {}: {}",
            parent_id,
            child_id,
            kinship
        );
        return Err(FamilyTreeError::IncestuousOffspring {
            parent: parent_id.to_string(),
            child: child_id.to_string(),
            kinship,
        });
    }

    ctl.checkpoint()?;
    let edge_id = store.insert_edge(parent_id, child_id)?;
    log::info!("Added relationship {} ({} -> {})", edge_id, parent_id, child_id);
    Ok(edge_id)
}

/// Guard a batch of edges in order. Each check sees the edges added before
/// it; the first failure stops the batch, and the caller's transaction
/// discards everything.
pub fn add_relationships<S: GraphStore + ?Sized>(
    store: &S,
    pairs: &[(String, String)],
    policy: &KinshipPolicy,
    ctl: &TraversalControl,
) -> Result<Vec<String>> {
    pairs
        .iter()
        .map(|(parent, child)| add_relationship(store, parent, child, policy, ctl))
        .collect()
}
