//! Bulk load of people and parent links from a JSON document.
//!
//! ```json
//! { "people": [{ "key": "ann", "name": "Ann" }],
//!   "relationships": [{ "parent": "ann", "child": "bob" }] }
//! ```
//!
//! Keys are local to the file; every link still goes through the guard.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{FamilyTreeError, Result};
use crate::graph::{add_relationships, GraphStore, KinshipPolicy, TraversalControl};

#[derive(Debug, Clone, Deserialize)]
pub struct ImportPerson {
    pub key: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImportLink {
    pub parent: String,
    pub child: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImportFile {
    #[serde(default)]
    pub people: Vec<ImportPerson>,
    #[serde(default)]
    pub relationships: Vec<ImportLink>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    /// File key -> stored person id.
    pub people: HashMap<String, String>,
    pub relationships: Vec<String>,
}

impl ImportFile {
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Create every person with `create`, then add every link through the guard.
///
/// Stops at the first failure; the caller owns rollback.
pub fn load<S, F>(
    store: &S,
    file: &ImportFile,
    mut create: F,
    policy: &KinshipPolicy,
    ctl: &TraversalControl,
) -> Result<ImportSummary>
where
    S: GraphStore + ?Sized,
    F: FnMut(&str) -> Result<String>,
{
    let mut ids = HashMap::with_capacity(file.people.len());
    for person in &file.people {
        if ids.contains_key(&person.key) {
            return Err(FamilyTreeError::InvalidInput(format!(
                "duplicate person key '{}'",
                person.key
            )));
        }
        ids.insert(person.key.clone(), create(&person.name)?);
    }

    let resolve = |key: &str| {
        ids.get(key)
            .cloned()
            .ok_or_else(|| FamilyTreeError::InvalidInput(format!("unknown person key '{}'", key)))
    };
    let pairs = file
        .relationships
        .iter()
        .map(|link| Ok((resolve(&link.parent)?, resolve(&link.child)?)))
        .collect::<Result<Vec<_>>>()?;

    let relationships = add_relationships(store, &pairs, policy, ctl)?;
    log::info!(
        "Imported {} people and {} relationships",
        ids.len(),
        relationships.len()
    );
    Ok(ImportSummary {
        people: ids,
        relationships,
    })
}
