pub mod models;
pub mod rest;
pub mod sqlite;

pub use models::{Comment, Contact, NewComment, NewContact};
pub use rest::RestStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use thiserror::Error;

pub const COMMENTS_TABLE: &str = "comments";
pub const CONTACTS_TABLE: &str = "contacts";

#[derive(Debug, Error)]
pub enum StoreError {
    /// The table has not been provisioned yet.
    #[error("relation \"{0}\" does not exist")]
    MissingRelation(String),
    #[error("{message}")]
    Remote {
        status: u16,
        code: Option<String>,
        message: String,
        details: Option<String>,
        hint: Option<String>,
    },
    #[error("storage service unreachable: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("invalid storage URL: {0}")]
    InvalidUrl(String),
    #[error("unexpected storage response: {0}")]
    Decode(String),
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("storage connection poisoned")]
    Poisoned,
}

impl StoreError {
    pub fn is_missing_relation(&self) -> bool {
        matches!(self, StoreError::MissingRelation(_))
    }
}

/// Record operations backing the comment and contact services. Each call is
/// a single atomic operation against the store; nothing spans calls.
///
/// `update_comment` and `delete_comment` report rows that did not change
/// (unknown id, or a row-level policy filtering the statement) as `None` /
/// `false` rather than as an error, so callers decide how to surface it.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn insert_comment(&self, comment: &NewComment) -> Result<Comment, StoreError>;
    /// All comments, newest first.
    async fn list_comments(&self) -> Result<Vec<Comment>, StoreError>;
    async fn update_comment(
        &self,
        id: &str,
        changes: &NewComment,
    ) -> Result<Option<Comment>, StoreError>;
    async fn delete_comment(&self, id: &str) -> Result<bool, StoreError>;
    async fn insert_contact(&self, contact: &NewContact) -> Result<Contact, StoreError>;
    /// Touches every table the services rely on.
    async fn probe(&self) -> Result<(), StoreError>;
    fn backend_name(&self) -> &'static str;
}
