//! Database migrations for the access store
//!
//! Each migration is applied atomically and tracked in the schema_version table.

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;
use tracing::info;

use super::errors::StoreResult;
use crate::core_access::Timestamp;

/// Current schema version
pub const CURRENT_SCHEMA_VERSION: i32 = 1;

/// Migration descriptor
pub struct Migration {
    pub version: i32,
    pub description: &'static str,
    pub up_sql: &'static str,
}

/// All available migrations in order
pub fn get_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial documents, access, invites and media schema",
        up_sql: r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                email TEXT NOT NULL UNIQUE,
                first_name TEXT,
                last_name TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                content TEXT,
                owner_id TEXT NOT NULL,
                is_public INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_documents_owner ON documents(owner_id);

            CREATE TABLE IF NOT EXISTS document_access (
                id TEXT PRIMARY KEY,
                document_id TEXT NOT NULL,
                collaborator_id TEXT NOT NULL,
                role TEXT NOT NULL CHECK(role IN ('creator', 'editor', 'viewer')),
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                UNIQUE (document_id, collaborator_id),
                FOREIGN KEY (document_id) REFERENCES documents(id) ON DELETE CASCADE
            );

            -- One creator per document
            CREATE UNIQUE INDEX IF NOT EXISTS idx_access_single_creator
                ON document_access(document_id) WHERE role = 'creator';
            CREATE INDEX IF NOT EXISTS idx_access_collaborator ON document_access(collaborator_id);

            CREATE TABLE IF NOT EXISTS invites (
                id TEXT PRIMARY KEY,
                document_id TEXT NOT NULL,
                inviter_id TEXT NOT NULL,
                email TEXT NOT NULL,
                collaborator_id TEXT,
                role TEXT NOT NULL CHECK(role IN ('creator', 'editor', 'viewer')),
                token TEXT NOT NULL UNIQUE,
                status TEXT NOT NULL CHECK(status IN ('pending', 'accepted', 'declined')),
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                FOREIGN KEY (document_id) REFERENCES documents(id) ON DELETE CASCADE
            );

            CREATE UNIQUE INDEX IF NOT EXISTS idx_invites_single_pending
                ON invites(document_id, email) WHERE status = 'pending';
            CREATE INDEX IF NOT EXISTS idx_invites_pair ON invites(document_id, email, created_at);

            CREATE TABLE IF NOT EXISTS document_media (
                id TEXT PRIMARY KEY,
                document_id TEXT NOT NULL,
                public_id TEXT NOT NULL,
                secure_url TEXT NOT NULL,
                format TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );

            -- No cascade: rows outlive their document until cleanup removes the object
            CREATE INDEX IF NOT EXISTS idx_media_created ON document_media(created_at);
            CREATE INDEX IF NOT EXISTS idx_media_document ON document_media(document_id);
        "#,
    }]
}

fn ensure_version_table(conn: &rusqlite::Connection) -> StoreResult<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;
    Ok(())
}

/// Get current schema version from database
pub fn get_current_version(pool: &Pool<SqliteConnectionManager>) -> StoreResult<i32> {
    let conn = pool.get()?;
    ensure_version_table(&conn)?;

    let version: Option<i32> = conn.query_row(
        "SELECT MAX(version) FROM schema_version",
        [],
        |row| row.get(0),
    )?;

    Ok(version.unwrap_or(0))
}

/// Run all pending migrations
pub fn migrate(pool: &Pool<SqliteConnectionManager>) -> StoreResult<()> {
    let current_version = get_current_version(pool)?;

    let pending: Vec<_> = get_migrations()
        .into_iter()
        .filter(|m| m.version > current_version)
        .collect();

    if pending.is_empty() {
        return Ok(());
    }

    let conn = pool.get()?;

    for migration in pending {
        let tx = conn.unchecked_transaction()?;
        tx.execute_batch(migration.up_sql)?;
        tx.execute(
            "INSERT INTO schema_version (version, applied_at) VALUES (?, ?)",
            params![migration.version, Timestamp::now().as_millis() as i64],
        )?;
        tx.commit()?;

        info!(
            version = migration.version,
            description = migration.description,
            "Applied migration"
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_test_pool() -> Pool<SqliteConnectionManager> {
        // A single connection keeps the in-memory database alive across gets
        Pool::builder()
            .max_size(1)
            .build(SqliteConnectionManager::memory())
            .expect("Failed to create pool")
    }

    #[test]
    fn test_initial_migration() {
        let pool = setup_test_pool();
        migrate(&pool).expect("Migration failed");

        let conn = pool.get().unwrap();
        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();

        for table in ["users", "documents", "document_access", "invites", "document_media"] {
            assert!(tables.contains(&table.to_string()), "missing table {}", table);
        }
    }

    #[test]
    fn test_idempotent_migrations() {
        let pool = setup_test_pool();
        migrate(&pool).expect("First migration failed");
        migrate(&pool).expect("Second migration failed");

        let version = get_current_version(&pool).expect("Failed to get version");
        assert_eq!(version, CURRENT_SCHEMA_VERSION);
    }

    #[test]
    fn test_single_creator_index() {
        let pool = setup_test_pool();
        migrate(&pool).unwrap();
        let conn = pool.get().unwrap();

        conn.execute(
            "INSERT INTO documents (id, title, owner_id, created_at, updated_at)
             VALUES ('d1', 'Plan', 'u1', 0, 0)",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO document_access (id, document_id, collaborator_id, role, created_at, updated_at)
             VALUES ('a1', 'd1', 'u1', 'creator', 0, 0)",
            [],
        )
        .unwrap();

        let second = conn.execute(
            "INSERT INTO document_access (id, document_id, collaborator_id, role, created_at, updated_at)
             VALUES ('a2', 'd1', 'u2', 'creator', 0, 0)",
            [],
        );
        assert!(second.is_err());
    }
}
