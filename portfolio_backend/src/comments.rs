use crate::error::{cancellable, ServiceError, ValidationError};
use crate::store::{Comment, NewComment, RecordStore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub const MAX_NAME_CHARS: usize = 100;
pub const MAX_MESSAGE_CHARS: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentInput {
    pub name: String,
    pub message: String,
}

/// Checks presence and length (in characters) of both fields and returns
/// them trimmed. Markup in `message` is left alone: callers sanitize before
/// saving.
pub fn validate(input: &CommentInput) -> Result<CommentInput, ValidationError> {
    let name = input.name.trim();
    if name.is_empty() {
        return Err(ValidationError::NameRequired);
    }
    if name.chars().count() > MAX_NAME_CHARS {
        return Err(ValidationError::NameTooLong {
            max: MAX_NAME_CHARS,
        });
    }

    let message = input.message.trim();
    if message.is_empty() {
        return Err(ValidationError::MessageRequired);
    }
    if message.chars().count() > MAX_MESSAGE_CHARS {
        return Err(ValidationError::MessageTooLong {
            max: MAX_MESSAGE_CHARS,
        });
    }

    Ok(CommentInput {
        name: name.to_string(),
        message: message.to_string(),
    })
}

#[derive(Clone)]
pub struct CommentService {
    store: Arc<dyn RecordStore>,
}

impl CommentService {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Validates and inserts a comment whose message has already been
    /// sanitized. Returns the stored row, including its generated id.
    pub async fn save_comment(
        &self,
        input: CommentInput,
        cancel: &CancellationToken,
    ) -> Result<Comment, ServiceError> {
        let valid = validate(&input)?;
        let record = NewComment {
            name: valid.name,
            message: valid.message,
        };
        let comment = cancellable(cancel, self.store.insert_comment(&record))
            .await
            .inspect_err(|err| tracing::error!(error = %err, "failed to save comment"))?;
        tracing::info!(comment_id = %comment.id, "comment saved");
        Ok(comment)
    }

    /// Newest first. A table that has not been provisioned yet reads as an
    /// empty list so the page stays usable before first-time setup.
    pub async fn get_comments(&self, cancel: &CancellationToken) -> Result<Vec<Comment>, ServiceError> {
        match cancellable(cancel, self.store.list_comments()).await {
            Ok(comments) => Ok(comments),
            Err(ServiceError::Storage(err)) if err.is_missing_relation() => {
                tracing::warn!(
                    error = %err,
                    "comments table has not been created yet; run `portfolio schema` for the DDL"
                );
                Ok(Vec::new())
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to load comments");
                Err(err)
            }
        }
    }

    /// The identifier alone addresses the row; authorization happens in the
    /// HTTP layer.
    pub async fn update_comment(
        &self,
        id: &str,
        input: CommentInput,
        cancel: &CancellationToken,
    ) -> Result<Comment, ServiceError> {
        let valid = validate(&input)?;
        let changes = NewComment {
            name: valid.name,
            message: valid.message,
        };
        let updated = cancellable(cancel, self.store.update_comment(id, &changes))
            .await
            .inspect_err(|err| tracing::error!(comment_id = id, error = %err, "failed to update comment"))?;
        match updated {
            Some(comment) => {
                tracing::info!(comment_id = id, "comment updated");
                Ok(comment)
            }
            None => Err(ServiceError::NotFound(id.to_string())),
        }
    }

    pub async fn delete_comment(&self, id: &str, cancel: &CancellationToken) -> Result<(), ServiceError> {
        let deleted = cancellable(cancel, self.store.delete_comment(id))
            .await
            .inspect_err(|err| tracing::error!(comment_id = id, error = %err, "failed to delete comment"))?;
        if !deleted {
            return Err(ServiceError::NotFound(id.to_string()));
        }
        tracing::info!(comment_id = id, "comment deleted");
        Ok(())
    }
}
