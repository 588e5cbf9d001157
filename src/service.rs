//! Async façade over the database and the graph engine.
//!
//! Every call runs on the blocking pool with its own connection. Edge writes
//! run inside `BEGIN IMMEDIATE`, so the kinship reads and the insert are one
//! serialized unit.

use tokio_util::sync::CancellationToken;

use crate::config::EngineConfig;
use crate::db::{people, relationships, Db};
use crate::error::Result;
use crate::graph::{
    self, AncestryTree, KinshipPolicy, MemoryGraphStore, Person, Relationship,
    SqliteGraphStore, TraversalControl,
};
use crate::import::{self, ImportFile, ImportSummary};

#[derive(Debug, Clone)]
pub struct FamilyService {
    db: Db,
    engine: EngineConfig,
}

impl FamilyService {
    pub fn new(db: Db, engine: EngineConfig) -> Self {
        Self { db, engine }
    }

    pub fn db(&self) -> &Db {
        &self.db
    }

    fn control(&self, cancel: CancellationToken) -> TraversalControl {
        TraversalControl::new(cancel)
            .with_timeout(self.engine.request_timeout())
            .with_limits(self.engine.max_ancestors, self.engine.max_depth)
    }

    fn policy(&self) -> KinshipPolicy {
        self.engine.kinship_policy()
    }

    pub async fn list_people(&self) -> Result<Vec<Person>> {
        self.db.with_connection(|conn| people::list_people(conn)).await
    }

    pub async fn create_person(&self, name: String) -> Result<Person> {
        self.db
            .with_connection(move |conn| people::create_person(conn, &name))
            .await
    }

    /// All-or-nothing batch create.
    pub async fn create_people(&self, names: Vec<String>) -> Result<Vec<Person>> {
        self.db
            .with_transaction(move |tx| {
                names
                    .iter()
                    .map(|name| people::create_person(tx, name))
                    .collect()
            })
            .await
    }

    pub async fn rename_person(&self, id: String, name: String) -> Result<()> {
        self.db
            .with_connection(move |conn| people::rename_person(conn, &id, &name))
            .await
    }

    pub async fn delete_person(&self, id: String) -> Result<()> {
        self.db
            .with_transaction(move |tx| people::soft_delete_person(tx, &id))
            .await
    }

    /// Ancestry of `id`, built from the current state of the graph.
    pub async fn build_ancestry(&self, id: String, cancel: CancellationToken) -> Result<AncestryTree> {
        let ctl = self.control(cancel);
        self.db
            .with_connection(move |conn| {
                let store = SqliteGraphStore::new(conn);
                graph::build_ancestry(&store, &id, &ctl)
            })
            .await
    }

    pub async fn list_relationships(&self) -> Result<Vec<Relationship>> {
        self.db
            .with_connection(|conn| relationships::list_relationships(conn))
            .await
    }

    pub async fn add_relationship(
        &self,
        parent_id: String,
        child_id: String,
        cancel: CancellationToken,
    ) -> Result<String> {
        let ctl = self.control(cancel);
        let policy = self.policy();
        self.db
            .with_transaction(move |tx| {
                let store = SqliteGraphStore::new(tx);
                graph::add_relationship(&store, &parent_id, &child_id, &policy, &ctl)
            })
            .await
    }

    /// Guarded batch insert; one rejection discards the whole batch.
    pub async fn add_relationships(
        &self,
        pairs: Vec<(String, String)>,
        cancel: CancellationToken,
    ) -> Result<Vec<String>> {
        let ctl = self.control(cancel);
        let policy = self.policy();
        self.db
            .with_transaction(move |tx| {
                let store = SqliteGraphStore::new(tx);
                graph::add_relationships(&store, &pairs, &policy, &ctl)
            })
            .await
    }

    /// Retire edge `id` and add `parent_id -> child_id` through the guard in
    /// one transaction. Returns the id of the replacement edge.
    pub async fn relink_relationship(
        &self,
        id: String,
        parent_id: String,
        child_id: String,
        cancel: CancellationToken,
    ) -> Result<String> {
        let ctl = self.control(cancel);
        let policy = self.policy();
        self.db
            .with_transaction(move |tx| {
                relationships::get_relationship(tx, &id)?;
                relationships::soft_delete_relationship(tx, &id)?;
                let store = SqliteGraphStore::new(tx);
                graph::add_relationship(&store, &parent_id, &child_id, &policy, &ctl)
            })
            .await
    }

    pub async fn delete_relationship(&self, id: String) -> Result<()> {
        self.db
            .with_connection(move |conn| relationships::soft_delete_relationship(conn, &id))
            .await
    }

    /// Load a whole import file in one transaction.
    pub async fn import(&self, file: ImportFile, cancel: CancellationToken) -> Result<ImportSummary> {
        let ctl = self.control(cancel);
        let policy = self.policy();
        self.db
            .with_transaction(move |tx| {
                let store = SqliteGraphStore::new(tx);
                import::load(
                    &store,
                    &file,
                    |name| Ok(people::create_person(tx, name)?.id),
                    &policy,
                    &ctl,
                )
            })
            .await
    }

    /// Validate an import file against an empty in-memory graph; nothing is
    /// written.
    pub fn dry_run_import(&self, file: &ImportFile) -> Result<ImportSummary> {
        let store = MemoryGraphStore::new();
        import::load(
            &store,
            file,
            |name| Ok(store.add_person(name).id),
            &self.policy(),
            &self.control(CancellationToken::new()),
        )
    }
}
