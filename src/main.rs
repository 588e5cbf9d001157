use anyhow::Result;
use clap::{Parser, Subcommand};
use familytree::api::HttpServer;
use familytree::db::{migrate, Db};
use familytree::error::FamilyTreeError;
use familytree::import::ImportFile;
use familytree::{Config, FamilyService};
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(name = "familytree")]
#[command(version, about = "Family tree service: ancestry trees and guarded parent links")]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the REST API
    Serve,
    /// Run migrations and check the database schema (default)
    Verify,
    /// Print the ancestry of a person as JSON
    Tree {
        id: String,
        /// Nested parents-of-parents view instead of the flat member list
        #[arg(long)]
        nested: bool,
    },
    /// Add a parent -> child link
    Link { parent: String, child: String },
    /// Load people and links from a JSON file in one transaction
    Import {
        file: PathBuf,
        /// Validate against an empty in-memory graph without writing
        #[arg(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = Config::load()?;

    env_logger::Builder::from_env(
        env_logger::Env::default().filter_or("RUST_LOG", config.familytree.log_level.as_str()),
    )
    .init();

    match args.command.unwrap_or(Command::Verify) {
        Command::Serve => run_http_server(config).await?,
        Command::Verify => run_schema_verification(config).await?,
        Command::Tree { id, nested } => {
            let service = open_service(&config).await?;
            let tree = service.build_ancestry(id, CancellationToken::new()).await?;
            let json = if nested {
                serde_json::to_string_pretty(&tree.to_nested())?
            } else {
                serde_json::to_string_pretty(&tree.to_family_tree())?
            };
            println!("{}", json);
        }
        Command::Link { parent, child } => {
            let service = open_service(&config).await?;
            let id = service
                .add_relationship(parent, child, CancellationToken::new())
                .await?;
            println!("{}", id);
        }
        Command::Import { file, dry_run } => {
            let import = ImportFile::from_path(&file)?;
            let summary = if dry_run {
                log::info!("Dry run: validating {} without writing", file.display());
                let service = FamilyService::new(open_db(&config), config.engine.clone());
                service.dry_run_import(&import)?
            } else {
                let service = open_service(&config).await?;
                service.import(import, CancellationToken::new()).await?
            };
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
    }

    Ok(())
}

fn open_db(config: &Config) -> Db {
    Db::new(config.db_path())
        .with_busy_timeout(Duration::from_millis(config.database.busy_timeout_ms))
}

/// Open the database, apply pending migrations and wrap it in a service.
async fn open_service(config: &Config) -> Result<FamilyService> {
    let db = open_db(config);
    let migrations_dir = config.migrations_dir().to_path_buf();
    db.with_connection(move |conn| migrate::run_migrations(conn, &migrations_dir))
        .await?;
    log::debug!("Database ready at {}", config.db_path().display());
    Ok(FamilyService::new(db, config.engine.clone()))
}

async fn run_http_server(config: Config) -> Result<()> {
    log::info!("Starting familytree v{}", env!("CARGO_PKG_VERSION"));
    let service = open_service(&config).await?;
    log::info!("Database initialized successfully");

    HttpServer::new(service, config.http_server.clone()).run().await?;
    Ok(())
}

async fn run_schema_verification(config: Config) -> Result<()> {
    log::info!("Starting familytree v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Database path: {}", config.db_path().display());
    log::info!("Kinship radius: {}", config.engine.kinship_radius);

    let service = open_service(&config).await?;
    verify_database_schema(service.db()).await?;
    Ok(())
}

/// Verify that all expected database objects exist
async fn verify_database_schema(db: &Db) -> Result<()> {
    db.with_connection(|conn| {
        let mut stmt = conn.prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")?;
        let tables: Vec<String> = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;

        let missing: Vec<&str> = ["people", "relationships", "schema_migrations"]
            .into_iter()
            .filter(|table| !tables.iter().any(|t| t == table))
            .collect();
        if !missing.is_empty() {
            return Err(FamilyTreeError::Config(format!("Missing tables: {}", missing.join(", "))));
        }
        log::debug!("✓ Tables exist");

        let mut stmt = conn.prepare("SELECT name FROM sqlite_master WHERE type='index' AND name LIKE 'idx_%'")?;
        let indexes: Vec<String> = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
        for index_name in ["idx_relationships_child", "idx_relationships_parent", "idx_relationships_live_pair"] {
            if indexes.iter().any(|i| i == index_name) {
                log::debug!("✓ Index exists: {}", index_name);
            } else {
                log::warn!("Index not found: {}", index_name);
            }
        }

        let applied = migrate::applied_migrations(conn)?;
        log::debug!("✓ {} migrations applied", applied.len());

        let journal_mode: String = conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))?;
        if journal_mode.to_uppercase() != "WAL" {
            return Err(FamilyTreeError::Config(format!("Journal mode is not WAL: {}", journal_mode)));
        }

        let foreign_keys: i32 = conn.query_row("PRAGMA foreign_keys", [], |row| row.get(0))?;
        if foreign_keys != 1 {
            return Err(FamilyTreeError::Config("Foreign keys not enabled".to_string()));
        }

        let integrity: String = conn.query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
        if integrity != "ok" {
            return Err(FamilyTreeError::Config(format!("Database integrity check failed: {}", integrity)));
        }
        log::info!("✓ Database integrity: OK");

        Ok(())
    })
    .await?;

    log::info!("✓ Database schema verification complete");
    Ok(())
}
