//! Local Backend for Markboard.
//!
//! An offline implementation of [`Backend`] backed by SQLite via `rusqlite`.
//! It plays the hosted backend's role end to end: a signed-in user is kept in
//! the database, rows are scoped to their owner, and every insert or delete is
//! echoed to the open change feeds of that owner in the same raw shape the
//! realtime service uses.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::database::connection::Database;
use crate::services::backend::{Backend, ChangeFeed, FeedHandle};
use crate::types::bookmark::{parse_timestamp, Bookmark, NewBookmark};
use crate::types::change::{ChangeKind, FeedFilter, RawChange, BOOKMARKS_TABLE};
use crate::types::errors::BackendError;
use crate::types::session::Identity;

struct LocalFeed {
    filter: FeedFilter,
    tx: mpsc::UnboundedSender<RawChange>,
}

/// SQLite-backed backend for offline use and tests.
pub struct LocalBackend {
    db: Arc<Database>,
    feeds: Mutex<HashMap<String, LocalFeed>>,
}

fn db_err(e: rusqlite::Error) -> BackendError {
    BackendError::DatabaseError(e.to_string())
}

impl LocalBackend {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            db,
            feeds: Mutex::new(HashMap::new()),
        }
    }

    /// Opens (or creates) the database file at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, BackendError> {
        let db = Database::open(path).map_err(db_err)?;
        Ok(Self::new(Arc::new(db)))
    }

    pub fn open_in_memory() -> Result<Self, BackendError> {
        let db = Database::open_in_memory().map_err(db_err)?;
        Ok(Self::new(Arc::new(db)))
    }

    /// Number of change feeds currently open.
    pub fn open_feed_count(&self) -> usize {
        self.feeds().len()
    }

    fn feeds(&self) -> MutexGuard<'_, HashMap<String, LocalFeed>> {
        self.feeds.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn session_user(conn: &Connection) -> Result<Option<Identity>, BackendError> {
        conn.query_row(
            "SELECT u.id, u.email FROM local_session s JOIN users u ON u.id = s.user_id WHERE s.id = 'default'",
            [],
            |row| {
                Ok(Identity {
                    id: row.get(0)?,
                    email: row.get(1)?,
                })
            },
        )
        .optional()
        .map_err(db_err)
    }

    fn require_user(conn: &Connection) -> Result<Identity, BackendError> {
        Self::session_user(conn)?.ok_or(BackendError::NotAuthenticated)
    }

    fn row_to_bookmark(row: &rusqlite::Row) -> rusqlite::Result<(String, String, String, String, String)> {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
    }

    fn into_bookmark(
        (id, title, url, created_at, user_id): (String, String, String, String, String),
    ) -> Result<Bookmark, BackendError> {
        let created_at = parse_timestamp(&created_at).ok_or_else(|| {
            BackendError::DecodeError(format!("bad created_at for bookmark {}: {}", id, created_at))
        })?;
        Ok(Bookmark {
            id,
            title,
            url,
            created_at,
            user_id: Some(user_id),
        })
    }

    /// Sends `change` to every open feed of `owner_id` that accepts `kind`.
    ///
    /// Feeds whose receiver is gone are dropped.
    fn broadcast(&self, owner_id: &str, kind: ChangeKind, change: RawChange) {
        let mut feeds = self.feeds();
        feeds.retain(|handle, feed| {
            if feed.filter.owner_id != owner_id || !feed.filter.accepts(kind) {
                return true;
            }
            let delivered = feed.tx.send(change.clone()).is_ok();
            if !delivered {
                debug!(handle = %handle, "dropping feed with no receiver");
            }
            delivered
        });
    }
}

#[async_trait]
impl Backend for LocalBackend {
    async fn resolve_identity(&self) -> Result<Option<Identity>, BackendError> {
        let conn = self.db.connection();
        Self::session_user(&conn)
    }

    /// Signs in by email, creating the user on first use. Passwords are not checked offline.
    async fn sign_in_with_password(
        &self,
        email: &str,
        _password: &str,
    ) -> Result<Identity, BackendError> {
        let email = email.trim().to_lowercase();
        if email.is_empty() {
            return Err(BackendError::NotAuthenticated);
        }
        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);

        let mut conn = self.db.connection();
        let tx = conn.transaction().map_err(db_err)?;
        tx.execute(
            "INSERT OR IGNORE INTO users (id, email, created_at) VALUES (?1, ?2, ?3)",
            params![Uuid::new_v4().to_string(), email, now],
        )
        .map_err(db_err)?;
        let user_id: String = tx
            .query_row("SELECT id FROM users WHERE email = ?1", params![email], |row| row.get(0))
            .map_err(db_err)?;
        tx.execute(
            "INSERT OR REPLACE INTO local_session (id, user_id, signed_in_at) VALUES ('default', ?1, ?2)",
            params![user_id, now],
        )
        .map_err(db_err)?;
        tx.commit().map_err(db_err)?;

        info!(user_id = %user_id, "local sign-in");
        Ok(Identity {
            id: user_id,
            email: Some(email),
        })
    }

    async fn query_bookmarks(&self, owner: &Identity) -> Result<Vec<Bookmark>, BackendError> {
        let conn = self.db.connection();
        Self::require_user(&conn)?;

        let mut stmt = conn
            .prepare(
                "SELECT id, title, url, created_at, user_id FROM bookmarks \
                 WHERE user_id = ?1 ORDER BY created_at DESC, rowid DESC",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![owner.id], Self::row_to_bookmark)
            .map_err(db_err)?;

        let mut results = Vec::new();
        for row in rows {
            results.push(Self::into_bookmark(row.map_err(db_err)?)?);
        }
        Ok(results)
    }

    async fn insert_bookmark(&self, bookmark: NewBookmark) -> Result<Bookmark, BackendError> {
        let inserted = {
            let conn = self.db.connection();
            let user = Self::require_user(&conn)?;
            if user.id != bookmark.user_id {
                return Err(BackendError::DatabaseError(
                    "bookmark owner does not match the signed-in user".to_string(),
                ));
            }

            let id = Uuid::new_v4().to_string();
            let created_at = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);
            conn.execute(
                "INSERT INTO bookmarks (id, user_id, title, url, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, bookmark.user_id, bookmark.title, bookmark.url, created_at],
            )
            .map_err(db_err)?;
            Self::into_bookmark((id, bookmark.title, bookmark.url, created_at, bookmark.user_id))?
        };

        let record = serde_json::to_value(&inserted)
            .map_err(|e| BackendError::DecodeError(e.to_string()))?;
        let owner = inserted.user_id.clone().unwrap_or_default();
        self.broadcast(&owner, ChangeKind::Insert, RawChange::insert(record));
        Ok(inserted)
    }

    /// Deletes the signed-in user's bookmark `id`. Deleting a missing row succeeds.
    async fn delete_bookmark(&self, id: &str) -> Result<(), BackendError> {
        let owner = {
            let conn = self.db.connection();
            let user = Self::require_user(&conn)?;
            let affected = conn
                .execute(
                    "DELETE FROM bookmarks WHERE id = ?1 AND user_id = ?2",
                    params![id, user.id],
                )
                .map_err(db_err)?;
            if affected == 0 {
                debug!(id, "delete matched no rows");
                return Ok(());
            }
            user.id
        };

        self.broadcast(&owner, ChangeKind::Delete, RawChange::delete(json!({ "id": id })));
        Ok(())
    }

    async fn open_change_feed(&self, filter: FeedFilter) -> Result<ChangeFeed, BackendError> {
        if filter.table != BOOKMARKS_TABLE {
            return Err(BackendError::RealtimeError(format!(
                "unknown relation: {}",
                filter.table
            )));
        }
        let (tx, events) = mpsc::unbounded_channel();
        let handle = FeedHandle::generate();
        self.feeds()
            .insert(handle.id().to_string(), LocalFeed { filter, tx });
        Ok(ChangeFeed { handle, events })
    }

    fn close_change_feed(&self, handle: FeedHandle) {
        if self.feeds().remove(handle.id()).is_none() {
            debug!(handle = handle.id(), "close of unknown feed");
        }
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        let conn = self.db.connection();
        conn.execute("DELETE FROM local_session", [])
            .map_err(db_err)?;
        Ok(())
    }
}
