//! Consanguinity check for a proposed parent -> child edge.
//!
//! Two people are considered related when an edge between them already
//! exists (either direction), when one is an ancestor of the other, or when
//! their lineages share an ancestor within [`KinshipPolicy::radius`] parent
//! hops. The walk is bounded on both sides and never follows child edges.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;

use serde::{Deserialize, Serialize};

use super::{GraphStore, Relationship, TraversalControl};
use crate::error::{FamilyTreeError, Result};

/// Parent hops examined on each side: parents and grandparents. Siblings,
/// half-siblings, first cousins and aunt/uncle pairs all fall inside it.
pub const DEFAULT_KINSHIP_RADIUS: usize = 2;

/// How far back the checker looks for shared ancestry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KinshipPolicy {
    radius: usize,
}

impl KinshipPolicy {
    /// Radii below [`DEFAULT_KINSHIP_RADIUS`] are raised to it; a shared
    /// grandparent must always block an edge.
    pub fn new(radius: usize) -> Self {
        Self {
            radius: radius.max(DEFAULT_KINSHIP_RADIUS),
        }
    }

    pub fn radius(&self) -> usize {
        self.radius
    }
}

impl Default for KinshipPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_KINSHIP_RADIUS)
    }
}

/// Verdict of a kinship assessment between `a` and `b`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Kinship {
    Unrelated,
    /// Edge `a -> b` already exists.
    DirectEdge,
    /// Edge `b -> a` already exists.
    MirroredEdge,
    /// `ancestor_id` (one of the pair) is `generations` hops above the other.
    Lineal { ancestor_id: String, generations: usize },
    /// Both descend from `ancestor_id`; `depth` is the farther of the two
    /// distances.
    CommonAncestor { ancestor_id: String, depth: usize },
}

impl Kinship {
    pub fn is_related(&self) -> bool {
        !matches!(self, Kinship::Unrelated)
    }
}

impl fmt::Display for Kinship {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Kinship::Unrelated => write!(f, "unrelated"),
            Kinship::DirectEdge => write!(f, "relationship already exists"),
            Kinship::MirroredEdge => write!(f, "reverse relationship already exists"),
            Kinship::Lineal { ancestor_id, generations } => {
                write!(f, "{} is already an ancestor ({} generation(s) up)", ancestor_id, generations)
            }
            Kinship::CommonAncestor { ancestor_id, depth } => {
                write!(f, "common ancestor {} within {} generation(s)", ancestor_id, depth)
            }
        }
    }
}

/// What the checker read from the store.
#[derive(Debug, Clone, Default)]
pub struct RelatednessEvidence {
    /// Live edges touching either endpoint.
    pub edges: Vec<Relationship>,
    /// Ancestors of `a` (including `a` at 0) by hop distance.
    pub lineage_a: HashMap<String, usize>,
    /// Ancestors of `b` (including `b` at 0) by hop distance.
    pub lineage_b: HashMap<String, usize>,
}

impl RelatednessEvidence {
    /// Decide kinship from the collected evidence. Pure; no store access.
    pub fn verdict(&self, a: &str, b: &str) -> Kinship {
        if self.edges.iter().any(|e| e.parent_id == a && e.child_id == b) {
            return Kinship::DirectEdge;
        }
        if self.edges.iter().any(|e| e.parent_id == b && e.child_id == a) {
            return Kinship::MirroredEdge;
        }

        if let Some(&generations) = self.lineage_a.get(b) {
            return Kinship::Lineal { ancestor_id: b.to_string(), generations };
        }
        if let Some(&generations) = self.lineage_b.get(a) {
            return Kinship::Lineal { ancestor_id: a.to_string(), generations };
        }

        // Closest shared ancestor; ties broken by id so the verdict is stable.
        self.lineage_a
            .iter()
            .filter(|&(_, &da)| da > 0)
            .filter_map(|(id, &da)| {
                self.lineage_b
                    .get(id)
                    .filter(|&&db| db > 0)
                    .map(|&db| (da.max(db), id))
            })
            .min()
            .map(|(depth, id)| Kinship::CommonAncestor { ancestor_id: id.clone(), depth })
            .unwrap_or(Kinship::Unrelated)
    }
}

/// Read the edge neighbourhood of `a` and `b` and their bounded lineages.
pub fn gather_evidence<S: GraphStore + ?Sized>(
    store: &S,
    a: &str,
    b: &str,
    policy: &KinshipPolicy,
    ctl: &TraversalControl,
) -> Result<RelatednessEvidence> {
    ctl.checkpoint()?;
    let edges = store.find_edges(a, b).map_err(|e| {
        log::error!("Kinship check {} / {}: reading edges failed: {}", a, b, e);
        e
    })?;

    // First hop comes straight from the edges already in hand.
    let lineage_a = lineage(store, a, first_hop(&edges, a), policy.radius(), ctl)?;
    let lineage_b = lineage(store, b, first_hop(&edges, b), policy.radius(), ctl)?;

    Ok(RelatednessEvidence {
        edges,
        lineage_a,
        lineage_b,
    })
}

/// Full kinship verdict for the pair.
pub fn assess_kinship<S: GraphStore + ?Sized>(
    store: &S,
    a: &str,
    b: &str,
    policy: &KinshipPolicy,
    ctl: &TraversalControl,
) -> Result<Kinship> {
    let evidence = gather_evidence(store, a, b, policy, ctl)?;
    let kinship = evidence.verdict(a, b);
    log::debug!("Kinship {} / {}: {}", a, b, kinship);
    Ok(kinship)
}

/// True if an edge between `a` and `b`, in either direction, must be refused.
pub fn are_related<S: GraphStore + ?Sized>(
    store: &S,
    a: &str,
    b: &str,
    policy: &KinshipPolicy,
    ctl: &TraversalControl,
) -> Result<bool> {
    Ok(assess_kinship(store, a, b, policy, ctl)?.is_related())
}

fn first_hop(edges: &[Relationship], person_id: &str) -> Vec<String> {
    let mut parents: Vec<String> = edges
        .iter()
        .filter(|e| e.child_id == person_id)
        .map(|e| e.parent_id.clone())
        .collect();
    parents.sort();
    parents.dedup();
    parents
}

/// Breadth-first walk up to `radius` parent hops. Already-seen ids are not
/// re-expanded, so cyclic data cannot loop.
fn lineage<S: GraphStore + ?Sized>(
    store: &S,
    person_id: &str,
    parents: Vec<String>,
    radius: usize,
    ctl: &TraversalControl,
) -> Result<HashMap<String, usize>> {
    let mut seen = HashMap::from([(person_id.to_string(), 0usize)]);
    let mut frontier = VecDeque::new();

    for parent in parents {
        if !seen.contains_key(&parent) {
            seen.insert(parent.clone(), 1);
            frontier.push_back((parent, 1usize));
        }
    }

    while let Some((id, depth)) = frontier.pop_front() {
        if depth >= radius {
            continue;
        }
        ctl.checkpoint()?;

        let grandparents = store.find_parents(&id).map_err(|e| {
            log::error!("Kinship check: reading parents of {} failed: {}", id, e);
            e
        })?;
        for gp in grandparents {
            if !seen.contains_key(&gp.id) {
                seen.insert(gp.id.clone(), depth + 1);
                frontier.push_back((gp.id, depth + 1));
            }
        }
    }

    Ok(seen)
}

/// Parent hops from `person_id` up to `ancestor_id`, or `None` if
/// `ancestor_id` is not an ancestor at any distance.
///
/// Ignores the kinship radius; the walk is bounded by the control's ancestor
/// cap instead, and exceeding it is `InconsistentGraph`.
pub fn ancestor_distance<S: GraphStore + ?Sized>(
    store: &S,
    person_id: &str,
    ancestor_id: &str,
    ctl: &TraversalControl,
) -> Result<Option<usize>> {
    let mut seen = HashSet::from([person_id.to_string()]);
    let mut frontier = VecDeque::from([(person_id.to_string(), 0usize)]);

    while let Some((id, depth)) = frontier.pop_front() {
        ctl.checkpoint()?;
        for parent in store.find_parents(&id)? {
            if parent.id == ancestor_id {
                return Ok(Some(depth + 1));
            }
            if seen.insert(parent.id.clone()) {
                if seen.len() > ctl.max_ancestors() {
                    return Err(FamilyTreeError::InconsistentGraph(format!(
                        "lineage of {} exceeds {} ancestors",
                        person_id,
                        ctl.max_ancestors()
                    )));
                }
                frontier.push_back((parent.id, depth + 1));
            }
        }
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{MemoryGraphStore, Person};
    use tokio_util::sync::CancellationToken;

    fn store_with(people: &[&str], edges: &[(&str, &str)]) -> MemoryGraphStore {
        let store = MemoryGraphStore::new();
        for id in people {
            store.add_person_with_id(id, id);
        }
        for (parent, child) in edges {
            store.insert_edge_unchecked(parent, child);
        }
        store
    }

    fn kinship(store: &MemoryGraphStore, a: &str, b: &str) -> Kinship {
        assess_kinship(store, a, b, &KinshipPolicy::default(), &TraversalControl::default()).unwrap()
    }

    #[test]
    fn test_strangers_are_unrelated() {
        let store = store_with(&["X", "Y"], &[]);
        assert_eq!(kinship(&store, "X", "Y"), Kinship::Unrelated);
    }

    #[test]
    fn test_duplicate_and_mirror() {
        let store = store_with(&["X", "Y"], &[("X", "Y")]);
        assert_eq!(kinship(&store, "X", "Y"), Kinship::DirectEdge);
        assert_eq!(kinship(&store, "Y", "X"), Kinship::MirroredEdge);
    }

    #[test]
    fn test_siblings_share_parent() {
        let store = store_with(&["P", "A", "B"], &[("P", "A"), ("P", "B")]);
        for (a, b) in [("A", "B"), ("B", "A")] {
            assert_eq!(
                kinship(&store, a, b),
                Kinship::CommonAncestor { ancestor_id: "P".to_string(), depth: 1 }
            );
        }
    }

    #[test]
    fn test_first_cousins_share_grandparent() {
        let store = store_with(
            &["G", "M", "F", "A", "B"],
            &[("G", "M"), ("G", "F"), ("M", "A"), ("F", "B")],
        );
        assert_eq!(
            kinship(&store, "A", "B"),
            Kinship::CommonAncestor { ancestor_id: "G".to_string(), depth: 2 }
        );
    }

    #[test]
    fn test_second_cousins_need_wider_radius() {
        let store = store_with(
            &["GG", "G1", "G2", "M", "F", "A", "B"],
            &[("GG", "G1"), ("GG", "G2"), ("G1", "M"), ("G2", "F"), ("M", "A"), ("F", "B")],
        );
        assert_eq!(kinship(&store, "A", "B"), Kinship::Unrelated);

        let wide = KinshipPolicy::new(3);
        let verdict = assess_kinship(&store, "A", "B", &wide, &TraversalControl::default()).unwrap();
        assert_eq!(verdict, Kinship::CommonAncestor { ancestor_id: "GG".to_string(), depth: 3 });
    }

    #[test]
    fn test_grandparent_is_lineal() {
        let store = store_with(&["G", "P", "K"], &[("G", "P"), ("P", "K")]);
        assert_eq!(
            kinship(&store, "G", "K"),
            Kinship::Lineal { ancestor_id: "G".to_string(), generations: 2 }
        );
        assert!(are_related(&store, "K", "G", &KinshipPolicy::default(), &TraversalControl::default()).unwrap());
    }

    #[test]
    fn test_in_laws_are_unrelated() {
        // A and B share a child but no ancestry.
        let store = store_with(&["A", "B", "K"], &[("A", "K"), ("B", "K")]);
        assert_eq!(kinship(&store, "A", "B"), Kinship::Unrelated);
    }

    #[test]
    fn test_radius_floor() {
        assert_eq!(KinshipPolicy::new(0).radius(), DEFAULT_KINSHIP_RADIUS);
        assert_eq!(KinshipPolicy::new(5).radius(), 5);
    }

    #[test]
    fn test_cyclic_data_terminates() {
        let store = store_with(&["A", "B", "X"], &[("A", "B"), ("B", "A")]);
        assert_eq!(kinship(&store, "X", "A"), Kinship::Unrelated);
    }

    #[test]
    fn test_cancelled_check_is_an_error() {
        let store = store_with(&["X", "Y"], &[]);
        let token = CancellationToken::new();
        token.cancel();
        let result = are_related(&store, "X", "Y", &KinshipPolicy::default(), &TraversalControl::new(token));
        assert!(matches!(result, Err(FamilyTreeError::Cancelled)));
    }

    struct FailingStore;

    impl GraphStore for FailingStore {
        fn get_person(&self, _id: &str) -> Result<Option<Person>> {
            Ok(None)
        }
        fn find_parents(&self, _child_id: &str) -> Result<Vec<Person>> {
            Err(FamilyTreeError::Database(rusqlite::Error::InvalidQuery))
        }
        fn find_edges(&self, _a: &str, _b: &str) -> Result<Vec<Relationship>> {
            Err(FamilyTreeError::Database(rusqlite::Error::InvalidQuery))
        }
        fn insert_edge(&self, _parent_id: &str, _child_id: &str) -> Result<String> {
            unreachable!("a failed check must never insert")
        }
    }

    #[test]
    fn test_store_failure_is_not_unrelated() {
        let result = are_related(&FailingStore, "X", "Y", &KinshipPolicy::default(), &TraversalControl::default());
        assert!(matches!(result, Err(FamilyTreeError::Database(_))));
    }

    #[test]
    fn test_ancestor_distance_ignores_radius() {
        let store = store_with(
            &["A", "B", "C", "D", "E"],
            &[("A", "B"), ("B", "C"), ("C", "D"), ("D", "E")],
        );
        let ctl = TraversalControl::default();
        assert_eq!(ancestor_distance(&store, "E", "A", &ctl).unwrap(), Some(4));
        assert_eq!(ancestor_distance(&store, "A", "E", &ctl).unwrap(), None);

        let capped = TraversalControl::default().with_limits(2, 10);
        assert!(matches!(
            ancestor_distance(&store, "E", "A", &capped),
            Err(FamilyTreeError::InconsistentGraph(_))
        ));
    }

    #[test]
    fn test_ancestor_distance_on_cyclic_data() {
        let store = store_with(&["A", "B", "X"], &[("A", "B"), ("B", "A")]);
        assert_eq!(ancestor_distance(&store, "A", "X", &TraversalControl::default()).unwrap(), None);
    }
}
