//! Versioned SQL migrations.
//!
//! Files are named `NNN_description.sql` and applied in version order, each
//! in its own transaction. `schema_migrations` records `(version, name)`; a
//! recorded version whose name no longer matches the file on disk is refused
//! rather than silently skipped.

use rusqlite::{params, Connection};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::error::{FamilyTreeError, Result};

#[derive(Debug)]
struct Migration {
    version: u32,
    name: String,
    sql: String,
}

fn ensure_migrations_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
        )",
    )?;
    Ok(())
}

/// Applied migrations as `version -> name`.
pub fn applied_migrations(conn: &Connection) -> Result<BTreeMap<u32, String>> {
    let mut stmt = conn.prepare("SELECT version, name FROM schema_migrations ORDER BY version")?;
    let applied = stmt
        .query_map([], |row| Ok((row.get::<_, u32>(0)?, row.get::<_, String>(1)?)))?
        .collect::<std::result::Result<BTreeMap<_, _>, rusqlite::Error>>()?;
    Ok(applied)
}

fn parse_version(filename: &str) -> Result<u32> {
    filename
        .split_once('_')
        .and_then(|(prefix, _)| prefix.parse().ok())
        .ok_or_else(|| {
            FamilyTreeError::Config(format!(
                "Migration file {} is not named NNN_description.sql",
                filename
            ))
        })
}

fn load_migrations(migrations_dir: &Path) -> Result<Vec<Migration>> {
    let mut by_version: BTreeMap<u32, Migration> = BTreeMap::new();

    for entry in fs::read_dir(migrations_dir)? {
        let path = entry?.path();
        if path.extension().and_then(|s| s.to_str()) != Some("sql") {
            continue;
        }
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| FamilyTreeError::Config(format!("Invalid migration filename: {}", path.display())))?;

        let version = parse_version(filename)?;
        let name = filename.trim_end_matches(".sql").to_string();
        if let Some(existing) = by_version.get(&version) {
            return Err(FamilyTreeError::Config(format!(
                "Migrations {} and {} share version {}",
                existing.name, name, version
            )));
        }

        let sql = fs::read_to_string(&path)?;
        by_version.insert(version, Migration { version, name, sql });
    }

    Ok(by_version.into_values().collect())
}

/// Apply every pending migration in `migrations_dir`. Returns how many ran.
pub fn run_migrations(conn: &mut Connection, migrations_dir: &Path) -> Result<usize> {
    ensure_migrations_table(conn)?;

    let applied = applied_migrations(conn)?;
    let mut ran = 0;

    for migration in load_migrations(migrations_dir)? {
        match applied.get(&migration.version) {
            Some(name) if *name == migration.name => {
                log::debug!("Migration {} already applied", migration.name);
                continue;
            }
            Some(name) => {
                return Err(FamilyTreeError::Config(format!(
                    "Schema version {} was applied as {} but the file is now {}",
                    migration.version, name, migration.name
                )));
            }
            None => {}
        }

        log::info!("Applying migration {} (version {})", migration.name, migration.version);
        let tx = conn.transaction()?;
        tx.execute_batch(&migration.sql).map_err(|e| {
            FamilyTreeError::Database(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_ERROR),
                Some(format!("Failed to execute migration {}: {}", migration.name, e)),
            ))
        })?;
        tx.execute(
            "INSERT INTO schema_migrations (version, name) VALUES (?1, ?2)",
            params![migration.version, migration.name],
        )?;
        tx.commit()?;
        ran += 1;
    }

    if ran > 0 {
        log::info!("Applied {} migration(s)", ran);
    }
    Ok(ran)
}
