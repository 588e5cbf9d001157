//! Ancestor resolution and tree building.
//!
//! [`build_ancestry`] walks parent edges breadth-first from a root into an
//! arena ([`AncestryTree`]) where every person appears exactly once. The arena
//! is then projected into whichever shape the caller wants: a nested tree
//! ([`TreeNode`]) or a flat member list ([`FamilyTree`]).

use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};

use super::{GraphStore, Person, TraversalControl};
use crate::error::{FamilyTreeError, Result};

/// Direct parents of `person_id`. Unknown ids have no parents.
pub fn parents_of<S: GraphStore + ?Sized>(store: &S, person_id: &str) -> Result<Vec<Person>> {
    store.find_parents(person_id)
}

/// One person in an ancestry arena.
#[derive(Debug, Clone)]
pub struct AncestorNode {
    pub person: Person,
    /// Generations above the root at first discovery (root is 0).
    pub depth: usize,
    /// Arena indices of this person's parents.
    pub parents: Vec<usize>,
}

/// Canonical ancestry of one root person. Index 0 is the root.
#[derive(Debug, Clone)]
pub struct AncestryTree {
    nodes: Vec<AncestorNode>,
    index: HashMap<String, usize>,
}

/// Nested rendering: each node carries its parents' subtrees.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeNode {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub parents: Vec<TreeNode>,
    /// Set on a later appearance of a person already expanded elsewhere in
    /// the tree; its parents are not repeated.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub repeat: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationKind {
    Parent,
    Child,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FamilyRelationship {
    pub id: String,
    pub name: String,
    pub relationship: RelationKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: String,
    pub name: String,
    pub relationships: Vec<FamilyRelationship>,
}

/// Flat rendering: one member per person, root first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FamilyTree {
    pub members: Vec<Member>,
}

impl AncestryTree {
    fn with_root(root: Person) -> Self {
        let mut tree = Self {
            nodes: Vec::new(),
            index: HashMap::new(),
        };
        tree.push(root, 0);
        tree
    }

    fn push(&mut self, person: Person, depth: usize) -> usize {
        let idx = self.nodes.len();
        self.index.insert(person.id.clone(), idx);
        self.nodes.push(AncestorNode {
            person,
            depth,
            parents: Vec::new(),
        });
        idx
    }

    fn link(&mut self, child: usize, parent: usize) {
        let parents = &mut self.nodes[child].parents;
        if !parents.contains(&parent) {
            parents.push(parent);
        }
    }

    pub fn root(&self) -> &AncestorNode {
        &self.nodes[0]
    }

    pub fn nodes(&self) -> &[AncestorNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, person_id: &str) -> Option<&AncestorNode> {
        self.index.get(person_id).map(|&idx| &self.nodes[idx])
    }

    pub fn contains(&self, person_id: &str) -> bool {
        self.index.contains_key(person_id)
    }

    /// Parents of the node at `idx`, as nodes.
    pub fn parents(&self, idx: usize) -> impl Iterator<Item = &AncestorNode> + '_ {
        self.nodes[idx].parents.iter().map(move |&p| &self.nodes[p])
    }

    /// Kahn's algorithm over child -> parent links. Returns a person stuck on a
    /// cycle, if any.
    fn find_cycle(&self) -> Option<&Person> {
        let mut in_degree = vec![0usize; self.nodes.len()];
        for node in &self.nodes {
            for &p in &node.parents {
                in_degree[p] += 1;
            }
        }

        let mut queue: VecDeque<usize> = (0..self.nodes.len())
            .filter(|&i| in_degree[i] == 0)
            .collect();
        let mut visited = 0;

        while let Some(idx) = queue.pop_front() {
            visited += 1;
            for &p in &self.nodes[idx].parents {
                in_degree[p] -= 1;
                if in_degree[p] == 0 {
                    queue.push_back(p);
                }
            }
        }

        if visited == self.nodes.len() {
            return None;
        }
        in_degree
            .iter()
            .position(|&d| d > 0)
            .map(|idx| &self.nodes[idx].person)
    }

    /// Nested projection. A person reached through several lines appears
    /// under each of them, but only the first appearance (depth-first, parents
    /// in order) carries their ancestry; later ones are `repeat` leaves. The
    /// output is therefore linear in the number of parent links.
    pub fn to_nested(&self) -> TreeNode {
        let mut expanded = vec![false; self.nodes.len()];
        self.nest(0, &mut expanded)
    }

    fn nest(&self, idx: usize, expanded: &mut [bool]) -> TreeNode {
        let node = &self.nodes[idx];
        let repeat = expanded[idx];
        expanded[idx] = true;
        let parents = if repeat {
            Vec::new()
        } else {
            node.parents.iter().map(|&p| self.nest(p, expanded)).collect()
        };
        TreeNode {
            id: node.person.id.clone(),
            name: node.person.name.clone(),
            parents,
            repeat,
        }
    }

    /// Flat projection: each member lists its parents and its children that
    /// are part of this tree.
    pub fn to_family_tree(&self) -> FamilyTree {
        let mut children: Vec<Vec<usize>> = vec![Vec::new(); self.nodes.len()];
        for (idx, node) in self.nodes.iter().enumerate() {
            for &p in &node.parents {
                children[p].push(idx);
            }
        }

        let relation = |idx: usize, relationship: RelationKind| FamilyRelationship {
            id: self.nodes[idx].person.id.clone(),
            name: self.nodes[idx].person.name.clone(),
            relationship,
        };

        let members = self
            .nodes
            .iter()
            .enumerate()
            .map(|(idx, node)| Member {
                id: node.person.id.clone(),
                name: node.person.name.clone(),
                relationships: node
                    .parents
                    .iter()
                    .map(|&p| relation(p, RelationKind::Parent))
                    .chain(children[idx].iter().map(|&c| relation(c, RelationKind::Child)))
                    .collect(),
            })
            .collect();

        FamilyTree { members }
    }
}

/// Build the ancestry of `root_id`.
///
/// Each person is expanded once no matter how many lines reach them. The
/// walk fails with `InconsistentGraph` if it outgrows the control's
/// ancestor/depth bounds or if the collected parent links contain a cycle;
/// no partial tree is ever returned.
pub fn build_ancestry<S: GraphStore + ?Sized>(
    store: &S,
    root_id: &str,
    ctl: &TraversalControl,
) -> Result<AncestryTree> {
    ctl.checkpoint()?;
    let root = store
        .get_person(root_id)?
        .ok_or_else(|| FamilyTreeError::PersonNotFound(root_id.to_string()))?;

    let mut tree = AncestryTree::with_root(root);
    let mut frontier = VecDeque::from([0usize]);

    while let Some(idx) = frontier.pop_front() {
        ctl.checkpoint()?;

        let depth = tree.nodes[idx].depth;
        let person_id = tree.nodes[idx].person.id.clone();
        let parents = parents_of(store, &person_id)?;

        if !parents.is_empty() && depth >= ctl.max_depth() {
            return Err(inconsistent(format!(
                "ancestry of {} goes deeper than {} generations",
                root_id,
                ctl.max_depth()
            )));
        }

        for parent in parents {
            let parent_idx = match tree.index.get(&parent.id) {
                Some(&seen) => seen,
                None => {
                    if tree.len() >= ctl.max_ancestors() {
                        return Err(inconsistent(format!(
                            "ancestry of {} exceeds {} people",
                            root_id,
                            ctl.max_ancestors()
                        )));
                    }
                    let new_idx = tree.push(parent, depth + 1);
                    frontier.push_back(new_idx);
                    new_idx
                }
            };
            tree.link(idx, parent_idx);
        }
    }

    if let Some(person) = tree.find_cycle() {
        return Err(inconsistent(format!(
            "parent cycle through {} ({}) in ancestry of {}",
            person.name, person.id, root_id
        )));
    }

    log::debug!("Built ancestry of {} with {} people", root_id, tree.len());
    Ok(tree)
}

fn inconsistent(message: String) -> FamilyTreeError {
    log::warn!("Data quality: {}", message);
    FamilyTreeError::InconsistentGraph(message)
}
