//! SQLite-backed access store

use async_trait::async_trait;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};

use super::errors::{StoreError, StoreResult};
use super::migrations::migrate;
use super::{AccessStore, StoreTx, TxUnit};
use crate::config::StoreConfig;
use crate::core_access::{
    normalize_email, AccessId, CollabError, CollabResult, Document, DocumentAccess, DocumentId,
    DocumentMedia, DocumentState, Invite, InviteId, MediaId, MediaLocator, Role, Timestamp, User,
    UserId,
};

const USER_COLUMNS: &str = "id, email, first_name, last_name, created_at, updated_at";
const DOCUMENT_COLUMNS: &str = "id, title, content, owner_id, is_public, created_at, updated_at";
const ACCESS_COLUMNS: &str = "id, document_id, collaborator_id, role, created_at, updated_at";
const INVITE_COLUMNS: &str = "id, document_id, inviter_id, email, collaborator_id, role, token, \
                              status, created_at, updated_at";
const MEDIA_COLUMNS: &str = "id, document_id, public_id, secure_url, format, created_at";

/// Parse a TEXT column through `FromStr`
fn parse_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = CollabError>,
{
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn timestamp_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Timestamp> {
    Ok(Timestamp::from_millis(row.get::<_, i64>(idx)?.max(0) as u64))
}

fn millis(ts: Timestamp) -> i64 {
    ts.as_millis() as i64
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: parse_column(row, 0)?,
        email: row.get(1)?,
        first_name: row.get(2)?,
        last_name: row.get(3)?,
        created_at: timestamp_column(row, 4)?,
        updated_at: timestamp_column(row, 5)?,
    })
}

fn document_from_row(row: &Row<'_>) -> rusqlite::Result<Document> {
    Ok(Document {
        id: parse_column(row, 0)?,
        title: row.get(1)?,
        content: row.get(2)?,
        owner_id: parse_column(row, 3)?,
        is_public: row.get(4)?,
        created_at: timestamp_column(row, 5)?,
        updated_at: timestamp_column(row, 6)?,
    })
}

fn access_from_row(row: &Row<'_>) -> rusqlite::Result<DocumentAccess> {
    Ok(DocumentAccess {
        id: parse_column(row, 0)?,
        document_id: parse_column(row, 1)?,
        collaborator_id: parse_column(row, 2)?,
        role: parse_column(row, 3)?,
        created_at: timestamp_column(row, 4)?,
        updated_at: timestamp_column(row, 5)?,
    })
}

fn invite_from_row(row: &Row<'_>) -> rusqlite::Result<Invite> {
    let collaborator_id = match row.get::<_, Option<String>>(4)? {
        Some(raw) => Some(UserId::from_str(&raw).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e))
        })?),
        None => None,
    };

    Ok(Invite {
        id: parse_column(row, 0)?,
        document_id: parse_column(row, 1)?,
        inviter_id: parse_column(row, 2)?,
        email: row.get(3)?,
        collaborator_id,
        role: parse_column(row, 5)?,
        token: row.get(6)?,
        status: parse_column(row, 7)?,
        created_at: timestamp_column(row, 8)?,
        updated_at: timestamp_column(row, 9)?,
    })
}

fn media_from_row(row: &Row<'_>) -> rusqlite::Result<DocumentMedia> {
    Ok(DocumentMedia {
        id: parse_column(row, 0)?,
        document_id: parse_column(row, 1)?,
        locator: MediaLocator {
            public_id: row.get(2)?,
            secure_url: row.get(3)?,
        },
        format: row.get(4)?,
        created_at: timestamp_column(row, 5)?,
    })
}

fn select_document(conn: &Connection, id: &DocumentId) -> rusqlite::Result<Option<Document>> {
    conn.query_row(
        &format!("SELECT {} FROM documents WHERE id = ?", DOCUMENT_COLUMNS),
        params![id.to_string()],
        document_from_row,
    )
    .optional()
}

fn select_access(conn: &Connection, id: &AccessId) -> rusqlite::Result<Option<DocumentAccess>> {
    conn.query_row(
        &format!("SELECT {} FROM document_access WHERE id = ?", ACCESS_COLUMNS),
        params![id.to_string()],
        access_from_row,
    )
    .optional()
}

fn select_access_pair(
    conn: &Connection,
    document: &DocumentId,
    collaborator: &UserId,
) -> rusqlite::Result<Option<DocumentAccess>> {
    conn.query_row(
        &format!(
            "SELECT {} FROM document_access WHERE document_id = ? AND collaborator_id = ?",
            ACCESS_COLUMNS
        ),
        params![document.to_string(), collaborator.to_string()],
        access_from_row,
    )
    .optional()
}

fn insert_access(conn: &Connection, access: &DocumentAccess) -> rusqlite::Result<()> {
    conn.execute(
        &format!("INSERT INTO document_access ({}) VALUES (?, ?, ?, ?, ?, ?)", ACCESS_COLUMNS),
        params![
            access.id.to_string(),
            access.document_id.to_string(),
            access.collaborator_id.to_string(),
            access.role.as_str(),
            millis(access.created_at),
            millis(access.updated_at),
        ],
    )?;
    Ok(())
}

/// Map "no row changed" on an update or delete to `NotFound`
fn expect_changed(changed: usize, what: impl FnOnce() -> String) -> StoreResult<()> {
    if changed == 0 {
        return Err(StoreError::NotFound(what()));
    }
    Ok(())
}

/// SQLite access store over an r2d2 connection pool
pub struct SqlAccessStore {
    pool: Pool<SqliteConnectionManager>,
}

impl SqlAccessStore {
    /// Create a store over an existing pool, running pending migrations
    pub fn new(pool: Pool<SqliteConnectionManager>) -> StoreResult<Self> {
        migrate(&pool)?;
        Ok(Self { pool })
    }

    /// Open (creating if needed) the database file named by the config
    pub fn open(config: &StoreConfig) -> StoreResult<Self> {
        if let Some(parent) = config.database_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StoreError::Backend(format!("create {}: {}", parent.display(), e))
                })?;
            }
        }

        let busy_timeout = config.busy_timeout;
        let manager = SqliteConnectionManager::file(&config.database_path).with_init(move |conn| {
            conn.busy_timeout(busy_timeout)?;
            conn.execute_batch("PRAGMA foreign_keys = ON;")
        });

        let pool = Pool::builder().max_size(config.pool_size).build(manager)?;

        info!(
            path = %config.database_path.display(),
            pool_size = config.pool_size,
            "Opened access store"
        );

        Self::new(pool)
    }

    /// Run SQLite work on the blocking pool with a pooled connection
    async fn with_conn<T, F>(&self, work: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> StoreResult<T> + Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> StoreResult<T> {
            let mut conn = pool.get()?;
            work(&mut *conn)
        })
        .await
        .map_err(|e| StoreError::Backend(format!("task join error: {}", e)))?
    }
}

struct SqlTx<'a> {
    tx: &'a rusqlite::Transaction<'a>,
}

impl StoreTx for SqlTx<'_> {
    fn get_document(&mut self, id: &DocumentId) -> CollabResult<Option<Document>> {
        Ok(select_document(self.tx, id).map_err(StoreError::from)?)
    }

    fn find_access(
        &mut self,
        document: &DocumentId,
        collaborator: &UserId,
    ) -> CollabResult<Option<DocumentAccess>> {
        Ok(select_access_pair(self.tx, document, collaborator).map_err(StoreError::from)?)
    }

    fn set_document_owner(&mut self, id: &DocumentId, owner: &UserId) -> CollabResult<()> {
        let changed = self
            .tx
            .execute(
                "UPDATE documents SET owner_id = ?, updated_at = ? WHERE id = ?",
                params![owner.to_string(), millis(Timestamp::now()), id.to_string()],
            )
            .map_err(StoreError::from)?;
        expect_changed(changed, || format!("document {}", id))?;
        Ok(())
    }

    fn set_access_role(&mut self, id: &AccessId, role: Role) -> CollabResult<()> {
        let changed = self
            .tx
            .execute(
                "UPDATE document_access SET role = ?, updated_at = ? WHERE id = ?",
                params![role.as_str(), millis(Timestamp::now()), id.to_string()],
            )
            .map_err(StoreError::from)?;
        expect_changed(changed, || format!("document access {}", id))?;
        Ok(())
    }
}

#[async_trait]
impl AccessStore for SqlAccessStore {
    // ===== Users =====

    async fn create_user(&self, user: &User) -> StoreResult<()> {
        let user = user.clone();
        self.with_conn(move |conn| {
            conn.execute(
                &format!("INSERT INTO users ({}) VALUES (?, ?, ?, ?, ?, ?)", USER_COLUMNS),
                params![
                    user.id.to_string(),
                    normalize_email(&user.email),
                    user.first_name,
                    user.last_name,
                    millis(user.created_at),
                    millis(user.updated_at),
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn get_user(&self, id: &UserId) -> StoreResult<Option<User>> {
        let id = *id;
        self.with_conn(move |conn| {
            Ok(conn
                .query_row(
                    &format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS),
                    params![id.to_string()],
                    user_from_row,
                )
                .optional()?)
        })
        .await
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let email = normalize_email(email);
        self.with_conn(move |conn| {
            Ok(conn
                .query_row(
                    &format!("SELECT {} FROM users WHERE email = ?", USER_COLUMNS),
                    params![email],
                    user_from_row,
                )
                .optional()?)
        })
        .await
    }

    // ===== Documents =====

    async fn create_document(
        &self,
        document: &Document,
        creator: &DocumentAccess,
    ) -> StoreResult<()> {
        if creator.role != Role::Creator
            || creator.document_id != document.id
            || creator.collaborator_id != document.owner_id
        {
            return Err(StoreError::Conflict(
                "creator row must belong to the document owner".to_string(),
            ));
        }

        let (document, creator) = (document.clone(), creator.clone());
        self.with_conn(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            tx.execute(
                &format!(
                    "INSERT INTO documents ({}) VALUES (?, ?, ?, ?, ?, ?, ?)",
                    DOCUMENT_COLUMNS
                ),
                params![
                    document.id.to_string(),
                    document.title,
                    document.content,
                    document.owner_id.to_string(),
                    document.is_public,
                    millis(document.created_at),
                    millis(document.updated_at),
                ],
            )?;
            insert_access(&tx, &creator)?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn get_document(&self, id: &DocumentId) -> StoreResult<Option<Document>> {
        let id = *id;
        self.with_conn(move |conn| Ok(select_document(conn, &id)?))
            .await
    }

    async fn list_owned_documents(&self, owner: &UserId) -> StoreResult<Vec<Document>> {
        let owner = *owner;
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM documents WHERE owner_id = ? ORDER BY created_at",
                DOCUMENT_COLUMNS
            ))?;
            let documents = stmt
                .query_map(params![owner.to_string()], document_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(documents)
        })
        .await
    }

    async fn update_document_state(
        &self,
        id: &DocumentId,
        state: &DocumentState,
    ) -> StoreResult<Document> {
        let (id, state) = (*id, state.clone());
        self.with_conn(move |conn| {
            let changed = conn.execute(
                "UPDATE documents SET title = ?, content = ?, updated_at = ? WHERE id = ?",
                params![state.title, state.content, millis(Timestamp::now()), id.to_string()],
            )?;
            expect_changed(changed, || format!("document {}", id))?;

            select_document(conn, &id)?
                .ok_or_else(|| StoreError::NotFound(format!("document {}", id)))
        })
        .await
    }

    async fn set_document_visibility(
        &self,
        id: &DocumentId,
        is_public: bool,
    ) -> StoreResult<Document> {
        let id = *id;
        self.with_conn(move |conn| {
            let changed = conn.execute(
                "UPDATE documents SET is_public = ?, updated_at = ? WHERE id = ?",
                params![is_public, millis(Timestamp::now()), id.to_string()],
            )?;
            expect_changed(changed, || format!("document {}", id))?;

            select_document(conn, &id)?
                .ok_or_else(|| StoreError::NotFound(format!("document {}", id)))
        })
        .await
    }

    async fn delete_document(&self, id: &DocumentId) -> StoreResult<()> {
        let id = *id;
        self.with_conn(move |conn| {
            let changed =
                conn.execute("DELETE FROM documents WHERE id = ?", params![id.to_string()])?;
            expect_changed(changed, || format!("document {}", id))
        })
        .await
    }

    // ===== Access =====

    async fn create_access(&self, access: &DocumentAccess) -> StoreResult<()> {
        let access = access.clone();
        self.with_conn(move |conn| {
            let Err(e) = insert_access(conn, &access) else {
                return Ok(());
            };

            // A foreign key failure means the document is gone, not a conflict
            if select_document(conn, &access.document_id)?.is_none() {
                debug!(error = %e, "Access insert for unknown document");
                return Err(StoreError::NotFound(format!("document {}", access.document_id)));
            }
            Err(e.into())
        })
        .await
    }

    async fn get_access(&self, id: &AccessId) -> StoreResult<Option<DocumentAccess>> {
        let id = *id;
        self.with_conn(move |conn| Ok(select_access(conn, &id)?))
            .await
    }

    async fn find_access(
        &self,
        document: &DocumentId,
        collaborator: &UserId,
    ) -> StoreResult<Option<DocumentAccess>> {
        let (document, collaborator) = (*document, *collaborator);
        self.with_conn(move |conn| Ok(select_access_pair(conn, &document, &collaborator)?))
            .await
    }

    async fn list_document_access(
        &self,
        document: &DocumentId,
    ) -> StoreResult<Vec<DocumentAccess>> {
        let document = *document;
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM document_access WHERE document_id = ? ORDER BY created_at",
                ACCESS_COLUMNS
            ))?;
            let rows = stmt
                .query_map(params![document.to_string()], access_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
    }

    async fn list_user_access(&self, user: &UserId) -> StoreResult<Vec<DocumentAccess>> {
        let user = *user;
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM document_access WHERE collaborator_id = ? ORDER BY created_at",
                ACCESS_COLUMNS
            ))?;
            let rows = stmt
                .query_map(params![user.to_string()], access_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
    }

    async fn update_access_role(&self, id: &AccessId, role: Role) -> StoreResult<DocumentAccess> {
        let id = *id;
        self.with_conn(move |conn| {
            let changed = conn.execute(
                "UPDATE document_access SET role = ?, updated_at = ? WHERE id = ?",
                params![role.as_str(), millis(Timestamp::now()), id.to_string()],
            )?;
            expect_changed(changed, || format!("document access {}", id))?;

            select_access(conn, &id)?
                .ok_or_else(|| StoreError::NotFound(format!("document access {}", id)))
        })
        .await
    }

    async fn delete_access(&self, id: &AccessId) -> StoreResult<()> {
        let id = *id;
        self.with_conn(move |conn| {
            let changed = conn
                .execute("DELETE FROM document_access WHERE id = ?", params![id.to_string()])?;
            expect_changed(changed, || format!("document access {}", id))
        })
        .await
    }

    // ===== Invites =====

    async fn create_invite(&self, invite: &Invite) -> StoreResult<()> {
        let invite = invite.clone();
        self.with_conn(move |conn| {
            conn.execute(
                &format!(
                    "INSERT INTO invites ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                    INVITE_COLUMNS
                ),
                params![
                    invite.id.to_string(),
                    invite.document_id.to_string(),
                    invite.inviter_id.to_string(),
                    normalize_email(&invite.email),
                    invite.collaborator_id.map(|id| id.to_string()),
                    invite.role.as_str(),
                    invite.token,
                    invite.status.as_str(),
                    millis(invite.created_at),
                    millis(invite.updated_at),
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn find_invite_by_token(&self, token: &str) -> StoreResult<Option<Invite>> {
        let token = token.to_string();
        self.with_conn(move |conn| {
            Ok(conn
                .query_row(
                    &format!("SELECT {} FROM invites WHERE token = ?", INVITE_COLUMNS),
                    params![token],
                    invite_from_row,
                )
                .optional()?)
        })
        .await
    }

    async fn find_invite(
        &self,
        document: &DocumentId,
        email: &str,
    ) -> StoreResult<Option<Invite>> {
        let (document, email) = (*document, normalize_email(email));
        self.with_conn(move |conn| {
            // A pending invite wins a same-millisecond tie, then insertion order
            Ok(conn
                .query_row(
                    &format!(
                        "SELECT {} FROM invites WHERE document_id = ? AND email = ?
                         ORDER BY created_at DESC, status = 'pending' DESC, rowid DESC
                         LIMIT 1",
                        INVITE_COLUMNS
                    ),
                    params![document.to_string(), email],
                    invite_from_row,
                )
                .optional()?)
        })
        .await
    }

    async fn update_invite(&self, invite: &Invite) -> StoreResult<()> {
        let invite = invite.clone();
        self.with_conn(move |conn| {
            let changed = conn.execute(
                "UPDATE invites SET status = ?, collaborator_id = ?, updated_at = ? WHERE id = ?",
                params![
                    invite.status.as_str(),
                    invite.collaborator_id.map(|id| id.to_string()),
                    millis(Timestamp::now()),
                    invite.id.to_string(),
                ],
            )?;
            expect_changed(changed, || format!("invite {}", invite.id))
        })
        .await
    }

    async fn delete_invite(&self, id: &InviteId) -> StoreResult<()> {
        let id = *id;
        self.with_conn(move |conn| {
            let changed =
                conn.execute("DELETE FROM invites WHERE id = ?", params![id.to_string()])?;
            expect_changed(changed, || format!("invite {}", id))
        })
        .await
    }

    // ===== Media =====

    async fn create_media(&self, media: &DocumentMedia) -> StoreResult<()> {
        let media = media.clone();
        self.with_conn(move |conn| {
            conn.execute(
                &format!(
                    "INSERT INTO document_media ({}) VALUES (?, ?, ?, ?, ?, ?)",
                    MEDIA_COLUMNS
                ),
                params![
                    media.id.to_string(),
                    media.document_id.to_string(),
                    media.locator.public_id,
                    media.locator.secure_url,
                    media.format,
                    millis(media.created_at),
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn list_media_created_before(
        &self,
        cutoff: Timestamp,
    ) -> StoreResult<Vec<DocumentMedia>> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM document_media WHERE created_at < ? ORDER BY created_at",
                MEDIA_COLUMNS
            ))?;
            let media = stmt
                .query_map(params![millis(cutoff)], media_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(media)
        })
        .await
    }

    async fn delete_media(&self, id: &MediaId) -> StoreResult<()> {
        let id = *id;
        self.with_conn(move |conn| {
            let changed = conn
                .execute("DELETE FROM document_media WHERE id = ?", params![id.to_string()])?;
            expect_changed(changed, || format!("media {}", id))
        })
        .await
    }

    // ===== Transactions =====

    async fn execute_transaction(&self, unit: Arc<TxUnit>) -> CollabResult<()> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> CollabResult<()> {
            let mut conn = pool.get().map_err(StoreError::from)?;
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(StoreError::from)?;

            // Dropping the transaction without commit rolls it back
            unit(&mut SqlTx { tx: &tx })?;

            tx.commit().map_err(StoreError::from)?;
            Ok(())
        })
        .await
        .map_err(|e| StoreError::Backend(format!("task join error: {}", e)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_access::InviteStatus;
    use std::time::Duration;
    use tempfile::TempDir;

    fn open_store() -> (TempDir, SqlAccessStore) {
        let dir = TempDir::new().unwrap();
        let config = StoreConfig {
            database_path: dir.path().join("quill.db"),
            pool_size: 4,
            busy_timeout: Duration::from_millis(500),
        };
        let store = SqlAccessStore::open(&config).unwrap();
        (dir, store)
    }

    async fn seed_document(store: &SqlAccessStore) -> (User, Document, DocumentAccess) {
        let owner = User::stub("Owner@Example.com");
        store.create_user(&owner).await.unwrap();
        let document = Document::new(
            owner.id,
            DocumentState {
                title: "Roadmap".to_string(),
                content: Some("v1".to_string()),
            },
            false,
        );
        let creator = DocumentAccess::new(document.id, owner.id, Role::Creator);
        store.create_document(&document, &creator).await.unwrap();
        (owner, document, creator)
    }

    #[tokio::test]
    async fn test_create_and_get_document() {
        let (_dir, store) = open_store();
        let (owner, document, creator) = seed_document(&store).await;

        let stored = store.get_document(&document.id).await.unwrap().unwrap();
        assert_eq!(stored, document);

        let access = store.find_access(&document.id, &owner.id).await.unwrap().unwrap();
        assert_eq!(access, creator);

        let found = store.find_user_by_email("owner@example.com").await.unwrap().unwrap();
        assert_eq!(found.id, owner.id);
    }

    #[tokio::test]
    async fn test_duplicate_email_conflicts() {
        let (_dir, store) = open_store();
        store.create_user(&User::stub("a@b.com")).await.unwrap();
        let result = store.create_user(&User::stub(" A@B.com")).await;
        assert!(matches!(result, Err(StoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_single_creator_enforced() {
        let (_dir, store) = open_store();
        let (_, document, _) = seed_document(&store).await;

        let intruder = DocumentAccess::new(document.id, UserId::generate(), Role::Creator);
        let result = store.create_access(&intruder).await;
        assert!(matches!(result, Err(StoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_access_for_unknown_document_is_not_found() {
        let (_dir, store) = open_store();
        let orphan = DocumentAccess::new(DocumentId::generate(), UserId::generate(), Role::Viewer);
        let result = store.create_access(&orphan).await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_transaction_rolls_back_on_error() {
        let (_dir, store) = open_store();
        let (owner, document, creator) = seed_document(&store).await;
        let stranger = UserId::generate();
        let (document_id, creator_id) = (document.id, creator.id);

        let result = store
            .execute_transaction(Arc::new(move |tx: &mut dyn StoreTx| -> CollabResult<()> {
                tx.set_document_owner(&document_id, &stranger)?;
                tx.set_access_role(&creator_id, Role::Editor)?;
                Err(CollabError::InvalidState("abort".to_string()))
            }))
            .await;
        assert!(matches!(result, Err(CollabError::InvalidState(_))));

        let stored = store.get_document(&document.id).await.unwrap().unwrap();
        assert_eq!(stored.owner_id, owner.id);
        let access = store.get_access(&creator.id).await.unwrap().unwrap();
        assert_eq!(access.role, Role::Creator);
    }

    #[tokio::test]
    async fn test_single_pending_invite_per_pair() {
        let (_dir, store) = open_store();
        let (owner, document, _) = seed_document(&store).await;

        let first =
            Invite::new(document.id, owner.id, "x@y.com", None, Role::Editor, "t1".to_string());
        store.create_invite(&first).await.unwrap();

        let second =
            Invite::new(document.id, owner.id, "x@y.com", None, Role::Viewer, "t2".to_string());
        assert!(matches!(
            store.create_invite(&second).await,
            Err(StoreError::Conflict(_))
        ));

        let mut accepted = first.clone();
        accepted.status = InviteStatus::Accepted;
        store.update_invite(&accepted).await.unwrap();
        store.create_invite(&second).await.unwrap();

        let latest = store.find_invite(&document.id, "X@y.com").await.unwrap().unwrap();
        assert_eq!(latest.token, "t2");
    }

    #[tokio::test]
    async fn test_delete_document_cascades_to_access_and_invites() {
        let (_dir, store) = open_store();
        let (owner, document, creator) = seed_document(&store).await;
        let media = DocumentMedia::new(
            document.id,
            MediaLocator {
                public_id: "exports/roadmap.pdf".to_string(),
                secure_url: "https://cdn.example.com/exports/roadmap.pdf".to_string(),
            },
            "pdf",
        );
        store.create_media(&media).await.unwrap();
        store
            .create_invite(&Invite::new(
                document.id,
                owner.id,
                "x@y.com",
                None,
                Role::Viewer,
                "tok".to_string(),
            ))
            .await
            .unwrap();

        store.delete_document(&document.id).await.unwrap();

        assert!(store.get_access(&creator.id).await.unwrap().is_none());
        assert!(store.find_invite_by_token("tok").await.unwrap().is_none());

        // Media rows wait for cleanup to remove their objects
        let remaining = store
            .list_media_created_before(Timestamp::from_millis(i64::MAX as u64))
            .await
            .unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, media.id);
    }

    #[tokio::test]
    async fn test_pending_invite_wins_timestamp_tie() {
        let (_dir, store) = open_store();
        let (owner, document, _) = seed_document(&store).await;

        let mut declined =
            Invite::new(document.id, owner.id, "x@y.com", None, Role::Viewer, "old".to_string());
        declined.status = InviteStatus::Declined;
        let mut pending =
            Invite::new(document.id, owner.id, "x@y.com", None, Role::Editor, "new".to_string());
        pending.created_at = declined.created_at;

        store.create_invite(&pending).await.unwrap();
        store.create_invite(&declined).await.unwrap();

        let latest = store.find_invite(&document.id, "x@y.com").await.unwrap().unwrap();
        assert_eq!(latest.token, "new");
    }

    #[tokio::test]
    async fn test_expired_media_listing() {
        let (_dir, store) = open_store();
        let (_, document, _) = seed_document(&store).await;

        let mut old = DocumentMedia::new(
            document.id,
            MediaLocator {
                public_id: "exports/old.pdf".to_string(),
                secure_url: "https://cdn.example.com/exports/old.pdf".to_string(),
            },
            "pdf",
        );
        old.created_at = Timestamp::from_millis(1_000);
        store.create_media(&old).await.unwrap();

        let fresh = DocumentMedia::new(
            document.id,
            MediaLocator {
                public_id: "exports/new.pdf".to_string(),
                secure_url: "https://cdn.example.com/exports/new.pdf".to_string(),
            },
            "pdf",
        );
        store.create_media(&fresh).await.unwrap();

        let expired = store
            .list_media_created_before(Timestamp::from_millis(2_000))
            .await
            .unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].id, old.id);
    }
}
