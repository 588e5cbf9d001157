//! In-process [`GraphStore`], for dry runs and engine tests.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::Utc;
use uuid::Uuid;

use super::{GraphStore, Person, Relationship};
use crate::error::{FamilyTreeError, Result};

#[derive(Debug, Default)]
struct Inner {
    people: HashMap<String, Person>,
    edges: Vec<Relationship>,
}

/// Family graph held in memory.
///
/// `insert_edge` only checks that both endpoints exist; consistency rules are
/// the guard's job, exactly as with the SQLite store.
#[derive(Debug, Default)]
pub struct MemoryGraphStore {
    inner: Mutex<Inner>,
}

impl MemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a person under a caller-chosen id.
    pub fn add_person_with_id(&self, id: &str, name: &str) -> Person {
        let now = Utc::now();
        let person = Person {
            id: id.to_string(),
            name: name.to_string(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        self.lock().people.insert(person.id.clone(), person.clone());
        person
    }

    pub fn add_person(&self, name: &str) -> Person {
        self.add_person_with_id(&Uuid::new_v4().to_string(), name)
    }

    /// Insert an edge with no checks at all, not even self-parentage.
    /// Lets tests reproduce malformed stored data.
    pub fn insert_edge_unchecked(&self, parent_id: &str, child_id: &str) -> String {
        let now = Utc::now();
        let edge = Relationship {
            id: Uuid::new_v4().to_string(),
            parent_id: parent_id.to_string(),
            child_id: child_id.to_string(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        let id = edge.id.clone();
        self.lock().edges.push(edge);
        id
    }

    /// Mark a person deleted; their edges stop resolving.
    pub fn remove_person(&self, id: &str) -> bool {
        match self.lock().people.get_mut(id) {
            Some(person) if person.deleted_at.is_none() => {
                person.deleted_at = Some(Utc::now());
                true
            }
            _ => false,
        }
    }

    pub fn edge_count(&self) -> usize {
        let inner = self.lock();
        inner.edges.iter().filter(|e| inner.is_live(e)).count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A poisoned lock only means another test thread panicked mid-write.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Inner {
    fn live_person(&self, id: &str) -> Option<&Person> {
        self.people.get(id).filter(|p| p.deleted_at.is_none())
    }

    fn is_live(&self, edge: &Relationship) -> bool {
        edge.deleted_at.is_none()
            && self.live_person(&edge.parent_id).is_some()
            && self.live_person(&edge.child_id).is_some()
    }
}

impl GraphStore for MemoryGraphStore {
    fn get_person(&self, id: &str) -> Result<Option<Person>> {
        Ok(self.lock().live_person(id).cloned())
    }

    fn find_parents(&self, child_id: &str) -> Result<Vec<Person>> {
        let inner = self.lock();
        let mut parents: Vec<Person> = inner
            .edges
            .iter()
            .filter(|e| e.child_id == child_id && inner.is_live(e))
            .filter_map(|e| inner.live_person(&e.parent_id).cloned())
            .collect();
        parents.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(parents)
    }

    fn find_edges(&self, a: &str, b: &str) -> Result<Vec<Relationship>> {
        let inner = self.lock();
        Ok(inner
            .edges
            .iter()
            .filter(|e| (e.touches(a) || e.touches(b)) && inner.is_live(e))
            .cloned()
            .collect())
    }

    fn insert_edge(&self, parent_id: &str, child_id: &str) -> Result<String> {
        {
            let inner = self.lock();
            for id in [parent_id, child_id] {
                if inner.live_person(id).is_none() {
                    return Err(FamilyTreeError::PersonNotFound(id.to_string()));
                }
            }
        }
        Ok(self.insert_edge_unchecked(parent_id, child_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parents_sorted_and_deleted_skipped() {
        let store = MemoryGraphStore::new();
        store.add_person_with_id("mum", "Mum");
        store.add_person_with_id("dad", "Dad");
        store.add_person_with_id("kid", "Kid");
        store.insert_edge("mum", "kid").unwrap();
        store.insert_edge("dad", "kid").unwrap();

        let names: Vec<_> = store.find_parents("kid").unwrap().into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["Dad", "Mum"]);

        assert!(store.remove_person("dad"));
        assert!(!store.remove_person("dad"));
        assert_eq!(store.find_parents("kid").unwrap().len(), 1);
        assert_eq!(store.find_edges("kid", "kid").unwrap().len(), 1);
        assert_eq!(store.edge_count(), 1);
    }

    #[test]
    fn test_insert_edge_requires_people() {
        let store = MemoryGraphStore::new();
        store.add_person_with_id("a", "A");
        assert!(matches!(
            store.insert_edge("a", "ghost"),
            Err(FamilyTreeError::PersonNotFound(id)) if id == "ghost"
        ));
    }
}
