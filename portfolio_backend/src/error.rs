use crate::store::StoreError;
use std::future::Future;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Rejected input, detected before any storage call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("name is required")]
    NameRequired,
    #[error("name is too long (max {max} characters)")]
    NameTooLong { max: usize },
    #[error("message is required")]
    MessageRequired,
    #[error("message is too long (max {max} characters)")]
    MessageTooLong { max: usize },
    #[error("{0} is required")]
    FieldRequired(&'static str),
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("comment {0} not found")]
    NotFound(String),
    #[error("operation cancelled")]
    Cancelled,
    #[error(transparent)]
    Storage(#[from] StoreError),
}

/// Runs a store operation unless `cancel` fires first. Once issued, a remote
/// request is abandoned rather than aborted on the server side.
pub(crate) async fn cancellable<T, F>(cancel: &CancellationToken, operation: F) -> Result<T, ServiceError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ServiceError::Cancelled),
        result = operation => result.map_err(ServiceError::from),
    }
}
