//! Relationship (edge) storage. New edges enter only through the graph guard.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::error::{FamilyTreeError, Result};
use crate::graph::store::{row_to_relationship, RELATIONSHIP_COLUMNS};
use crate::graph::Relationship;

/// All live edges whose endpoints are both live.
pub fn list_relationships(conn: &Connection) -> Result<Vec<Relationship>> {
    let sql = format!(
        "SELECT {} FROM relationships r \
         JOIN people pp ON pp.id = r.parent_id AND pp.deleted_at IS NULL \
         JOIN people pc ON pc.id = r.child_id AND pc.deleted_at IS NULL \
         WHERE r.deleted_at IS NULL \
         ORDER BY r.created_at, r.id",
        RELATIONSHIP_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let edges = stmt
        .query_map([], row_to_relationship)?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
    Ok(edges)
}

pub fn get_relationship(conn: &Connection, id: &str) -> Result<Relationship> {
    let sql = format!(
        "SELECT {} FROM relationships r WHERE r.id = ?1 AND r.deleted_at IS NULL",
        RELATIONSHIP_COLUMNS
    );
    conn.query_row(&sql, [id], row_to_relationship)
        .optional()?
        .ok_or_else(|| FamilyTreeError::RelationshipNotFound(id.to_string()))
}

/// Raw insert. Callers go through `graph::add_relationship` instead.
pub(crate) fn insert_relationship(conn: &Connection, parent_id: &str, child_id: &str) -> Result<String> {
    let id = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO relationships (id, parent_id, child_id, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?4)",
        params![id, parent_id, child_id, now],
    )?;
    log::debug!("Inserted relationship {} ({} -> {})", id, parent_id, child_id);
    Ok(id)
}

pub fn soft_delete_relationship(conn: &Connection, id: &str) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    let updated = conn.execute(
        "UPDATE relationships SET deleted_at = ?1, updated_at = ?1 WHERE id = ?2 AND deleted_at IS NULL",
        params![now, id],
    )?;
    if updated == 0 {
        return Err(FamilyTreeError::RelationshipNotFound(id.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::people::create_person;
    use crate::db::test_support::migrated_db;

    #[tokio::test]
    async fn test_get_and_delete_relationship() {
        let (db, _temp) = migrated_db().await;
        db.with_connection(|conn| {
            let p = create_person(conn, "P")?;
            let c = create_person(conn, "C")?;
            let id = insert_relationship(conn, &p.id, &c.id)?;

            let edge = get_relationship(conn, &id)?;
            assert_eq!(edge.parent_id, p.id);
            assert_eq!(edge.child_id, c.id);
            assert_eq!(list_relationships(conn)?.len(), 1);

            soft_delete_relationship(conn, &id)?;
            assert!(list_relationships(conn)?.is_empty());
            assert!(matches!(
                get_relationship(conn, &id),
                Err(FamilyTreeError::RelationshipNotFound(_))
            ));
            assert!(matches!(
                soft_delete_relationship(conn, &id),
                Err(FamilyTreeError::RelationshipNotFound(_))
            ));

            // The pair may be re-added once the old edge is retired.
            insert_relationship(conn, &p.id, &c.id)?;
            Ok::<(), FamilyTreeError>(())
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_insert_requires_existing_people() {
        let (db, _temp) = migrated_db().await;
        let result = db
            .with_connection(|conn| insert_relationship(conn, "nobody", "nobody-else"))
            .await;
        assert!(matches!(result, Err(FamilyTreeError::Database(_))));
    }
}
