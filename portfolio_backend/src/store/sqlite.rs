use super::models::{Comment, Contact, NewComment, NewContact};
use super::{RecordStore, StoreError, COMMENTS_TABLE, CONTACTS_TABLE};
use crate::utils::{now_utc, storage_timestamp};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

pub(crate) const MIGRATIONS: &str = r#"
    PRAGMA journal_mode = WAL;

    CREATE TABLE IF NOT EXISTS comments (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL CHECK (length(trim(name)) > 0 AND length(name) <= 100),
        message TEXT NOT NULL CHECK (length(trim(message)) > 0 AND length(message) <= 1000),
        created_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_comments_created_at_desc ON comments(created_at DESC);

    CREATE TABLE IF NOT EXISTS contacts (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        email TEXT NOT NULL,
        message TEXT NOT NULL,
        created_at TEXT NOT NULL
    );
"#;

/// Local store used when no hosted endpoint is configured, and by tests.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Ok(Self::from_connection(conn))
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Ok(Self::from_connection(Connection::open_in_memory()?))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    pub fn ensure_schema(&self) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute_batch(MIGRATIONS)?;
            Ok(())
        })
    }

    fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, StoreError>,
    {
        let guard = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        f(&guard)
    }

    fn get_comment(conn: &Connection, id: &str) -> Result<Option<Comment>, StoreError> {
        conn.query_row(
            r#"
            SELECT id, name, message, created_at
            FROM comments
            WHERE id = ?1
            "#,
            params![id],
            comment_from_row,
        )
        .optional()
        .map_err(classify)
    }
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn insert_comment(&self, comment: &NewComment) -> Result<Comment, StoreError> {
        let record = Comment {
            id: Uuid::new_v4().to_string(),
            name: comment.name.clone(),
            message: comment.message.clone(),
            created_at: now_utc(),
        };
        self.with_conn(|conn| {
            conn.execute(
                r#"
                INSERT INTO comments (id, name, message, created_at)
                VALUES (?1, ?2, ?3, ?4)
                "#,
                params![
                    record.id,
                    record.name,
                    record.message,
                    storage_timestamp(&record.created_at)
                ],
            )
            .map_err(classify)?;
            Ok(())
        })?;
        Ok(record)
    }

    async fn list_comments(&self) -> Result<Vec<Comment>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    r#"
                    SELECT id, name, message, created_at
                    FROM comments
                    ORDER BY created_at DESC, rowid DESC
                    "#,
                )
                .map_err(classify)?;
            let rows = stmt.query_map([], comment_from_row)?;
            let mut comments = Vec::new();
            for row in rows {
                comments.push(row?);
            }
            Ok(comments)
        })
    }

    async fn update_comment(
        &self,
        id: &str,
        changes: &NewComment,
    ) -> Result<Option<Comment>, StoreError> {
        self.with_conn(|conn| {
            let changed = conn
                .execute(
                    "UPDATE comments SET name = ?1, message = ?2 WHERE id = ?3",
                    params![changes.name, changes.message, id],
                )
                .map_err(classify)?;
            if changed == 0 {
                return Ok(None);
            }
            Self::get_comment(conn, id)
        })
    }

    async fn delete_comment(&self, id: &str) -> Result<bool, StoreError> {
        self.with_conn(|conn| {
            let changed = conn
                .execute("DELETE FROM comments WHERE id = ?1", params![id])
                .map_err(classify)?;
            Ok(changed > 0)
        })
    }

    async fn insert_contact(&self, contact: &NewContact) -> Result<Contact, StoreError> {
        let id = Uuid::new_v4().to_string();
        let created_at = now_utc();
        self.with_conn(|conn| {
            conn.execute(
                r#"
                INSERT INTO contacts (id, name, email, message, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
                params![
                    id,
                    contact.name,
                    contact.email,
                    contact.message,
                    storage_timestamp(&created_at)
                ],
            )
            .map_err(classify)?;
            Ok(())
        })?;
        Ok(Contact {
            id: Some(id),
            name: contact.name.clone(),
            email: contact.email.clone(),
            message: contact.message.clone(),
            created_at: Some(created_at),
        })
    }

    async fn probe(&self) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            for table in [COMMENTS_TABLE, CONTACTS_TABLE] {
                conn.prepare(&format!("SELECT id FROM {table} LIMIT 1"))
                    .map_err(classify)?;
            }
            Ok(())
        })
    }

    fn backend_name(&self) -> &'static str {
        "sqlite"
    }
}

fn comment_from_row(row: &Row<'_>) -> rusqlite::Result<Comment> {
    let raw: String = row.get(3)?;
    let created_at = DateTime::parse_from_rfc3339(&raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(err)))?;
    Ok(Comment {
        id: row.get(0)?,
        name: row.get(1)?,
        message: row.get(2)?,
        created_at,
    })
}

/// SQLite reports a missing table as `no such table: <name>`.
fn classify(err: rusqlite::Error) -> StoreError {
    if let rusqlite::Error::SqliteFailure(_, Some(message)) = &err {
        if let Some(table) = message.strip_prefix("no such table: ") {
            return StoreError::MissingRelation(table.trim().to_string());
        }
    }
    StoreError::Sqlite(err)
}
