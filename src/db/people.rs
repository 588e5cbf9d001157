//! Person CRUD.

use chrono::Utc;
use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::error::{FamilyTreeError, Result};
use crate::graph::store::{row_to_person, PERSON_COLUMNS};
use crate::graph::Person;

fn validate_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(FamilyTreeError::InvalidInput("name must not be empty".to_string()));
    }
    Ok(name.to_string())
}

/// All live people, by name.
pub fn list_people(conn: &Connection) -> Result<Vec<Person>> {
    let sql = format!(
        "SELECT {} FROM people p WHERE p.deleted_at IS NULL ORDER BY p.name, p.id",
        PERSON_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let people = stmt
        .query_map([], row_to_person)?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
    Ok(people)
}

pub fn create_person(conn: &Connection, name: &str) -> Result<Person> {
    let name = validate_name(name)?;
    let now = Utc::now();
    let person = Person {
        id: Uuid::new_v4().to_string(),
        name,
        created_at: now,
        updated_at: now,
        deleted_at: None,
    };
    conn.execute(
        "INSERT INTO people (id, name, created_at, updated_at) VALUES (?1, ?2, ?3, ?4)",
        params![person.id, person.name, now.to_rfc3339(), now.to_rfc3339()],
    )?;
    log::debug!("Created person {} ({})", person.id, person.name);
    Ok(person)
}

pub fn rename_person(conn: &Connection, id: &str, name: &str) -> Result<()> {
    let name = validate_name(name)?;
    let updated = conn.execute(
        "UPDATE people SET name = ?1, updated_at = ?2 WHERE id = ?3 AND deleted_at IS NULL",
        params![name, Utc::now().to_rfc3339(), id],
    )?;
    if updated == 0 {
        return Err(FamilyTreeError::PersonNotFound(id.to_string()));
    }
    Ok(())
}

/// Soft-delete a person together with every live edge touching them.
pub fn soft_delete_person(conn: &Connection, id: &str) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    let updated = conn.execute(
        "UPDATE people SET deleted_at = ?1, updated_at = ?1 WHERE id = ?2 AND deleted_at IS NULL",
        params![now, id],
    )?;
    if updated == 0 {
        return Err(FamilyTreeError::PersonNotFound(id.to_string()));
    }
    let edges = conn.execute(
        "UPDATE relationships SET deleted_at = ?1, updated_at = ?1 \
         WHERE (parent_id = ?2 OR child_id = ?2) AND deleted_at IS NULL",
        params![now, id],
    )?;
    log::debug!("Deleted person {} and {} relationship(s)", id, edges);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::migrated_db;
    use crate::graph::{GraphStore, SqliteGraphStore};

    #[tokio::test]
    async fn test_create_list_rename() {
        let (db, _temp) = migrated_db().await;
        db.with_connection(|conn| {
            let bob = create_person(conn, "  Bob ")?;
            assert_eq!(bob.name, "Bob");
            create_person(conn, "Alice")?;

            let names: Vec<_> = list_people(conn)?.into_iter().map(|p| p.name).collect();
            assert_eq!(names, vec!["Alice", "Bob"]);

            rename_person(conn, &bob.id, "Robert")?;
            let store = SqliteGraphStore::new(conn);
            assert_eq!(store.get_person(&bob.id)?.unwrap().name, "Robert");
            Ok::<(), FamilyTreeError>(())
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_empty_name_rejected() {
        let (db, _temp) = migrated_db().await;
        let result = db.with_connection(|conn| create_person(conn, "   ")).await;
        assert!(matches!(result, Err(FamilyTreeError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_delete_missing_person() {
        let (db, _temp) = migrated_db().await;
        let result = db.with_connection(|conn| soft_delete_person(conn, "nobody")).await;
        assert!(matches!(result, Err(FamilyTreeError::PersonNotFound(_))));
    }

    #[tokio::test]
    async fn test_deleted_person_not_listed() {
        let (db, _temp) = migrated_db().await;
        db.with_connection(|conn| {
            let ghost = create_person(conn, "Ghost")?;
            soft_delete_person(conn, &ghost.id)?;
            assert!(list_people(conn)?.is_empty());
            assert!(matches!(
                rename_person(conn, &ghost.id, "Spirit"),
                Err(FamilyTreeError::PersonNotFound(_))
            ));
            Ok::<(), FamilyTreeError>(())
        })
        .await
        .unwrap();
    }
}
