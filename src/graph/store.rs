//! Read/write primitives the engine consumes, and their SQLite implementation.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row};

use super::{Person, Relationship};
use crate::db::relationships::insert_relationship;
use crate::error::Result;

/// The only view of the family graph the engine has.
///
/// Implementations read live (non-deleted) records only. `insert_edge` is
/// called by the edge guard alone, inside whatever transaction the caller
/// opened around the whole check-then-insert sequence.
pub trait GraphStore {
    /// Point lookup; `None` when the id is unknown or soft-deleted.
    fn get_person(&self, id: &str) -> Result<Option<Person>>;

    /// Live parents of `child_id`. Unknown ids yield an empty list.
    fn find_parents(&self, child_id: &str) -> Result<Vec<Person>>;

    /// Live edges with `a` or `b` at either end.
    fn find_edges(&self, a: &str, b: &str) -> Result<Vec<Relationship>>;

    /// Persist `parent_id -> child_id`, returning the new edge id.
    fn insert_edge(&self, parent_id: &str, child_id: &str) -> Result<String>;
}

/// [`GraphStore`] over a borrowed rusqlite connection.
///
/// Pass a `Transaction` (it derefs to `Connection`) to make a sequence of
/// engine calls atomic.
pub struct SqliteGraphStore<'c> {
    conn: &'c Connection,
}

impl<'c> SqliteGraphStore<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }
}

pub(crate) const PERSON_COLUMNS: &str = "p.id, p.name, p.created_at, p.updated_at, p.deleted_at";
pub(crate) const RELATIONSHIP_COLUMNS: &str =
    "r.id, r.parent_id, r.child_id, r.created_at, r.updated_at, r.deleted_at";

impl GraphStore for SqliteGraphStore<'_> {
    fn get_person(&self, id: &str) -> Result<Option<Person>> {
        let sql = format!(
            "SELECT {} FROM people p WHERE p.id = ?1 AND p.deleted_at IS NULL",
            PERSON_COLUMNS
        );
        let person = self.conn.query_row(&sql, [id], row_to_person).optional()?;
        Ok(person)
    }

    fn find_parents(&self, child_id: &str) -> Result<Vec<Person>> {
        let sql = format!(
            "SELECT {} FROM relationships r \
             JOIN people p ON p.id = r.parent_id \
             WHERE r.child_id = ?1 AND r.deleted_at IS NULL AND p.deleted_at IS NULL \
             ORDER BY p.name, p.id",
            PERSON_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let parents = stmt
            .query_map([child_id], row_to_person)?
            .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
        Ok(parents)
    }

    fn find_edges(&self, a: &str, b: &str) -> Result<Vec<Relationship>> {
        let sql = format!(
            "SELECT {} FROM relationships r \
             JOIN people pp ON pp.id = r.parent_id AND pp.deleted_at IS NULL \
             JOIN people pc ON pc.id = r.child_id AND pc.deleted_at IS NULL \
             WHERE r.deleted_at IS NULL \
               AND (r.parent_id IN (?1, ?2) OR r.child_id IN (?1, ?2))",
            RELATIONSHIP_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let edges = stmt
            .query_map([a, b], row_to_relationship)?
            .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
        Ok(edges)
    }

    fn insert_edge(&self, parent_id: &str, child_id: &str) -> Result<String> {
        insert_relationship(self.conn, parent_id, child_id)
    }
}

fn parse_timestamp(idx: usize, raw: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e)))
}

fn parse_optional_timestamp(idx: usize, raw: Option<String>) -> rusqlite::Result<Option<DateTime<Utc>>> {
    raw.map(|s| parse_timestamp(idx, s)).transpose()
}

/// Map a row selected with [`PERSON_COLUMNS`].
pub(crate) fn row_to_person(row: &Row<'_>) -> rusqlite::Result<Person> {
    Ok(Person {
        id: row.get(0)?,
        name: row.get(1)?,
        created_at: parse_timestamp(2, row.get(2)?)?,
        updated_at: parse_timestamp(3, row.get(3)?)?,
        deleted_at: parse_optional_timestamp(4, row.get(4)?)?,
    })
}

/// Map a row selected with [`RELATIONSHIP_COLUMNS`].
pub(crate) fn row_to_relationship(row: &Row<'_>) -> rusqlite::Result<Relationship> {
    Ok(Relationship {
        id: row.get(0)?,
        parent_id: row.get(1)?,
        child_id: row.get(2)?,
        created_at: parse_timestamp(3, row.get(3)?)?,
        updated_at: parse_timestamp(4, row.get(4)?)?,
        deleted_at: parse_optional_timestamp(5, row.get(5)?)?,
    })
}
