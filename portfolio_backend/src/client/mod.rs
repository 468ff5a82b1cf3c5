//! HTTP client for a running portfolio server, plus the browser-side state
//! that goes with it: which comments this client wrote, and the comment
//! form's submission flow.

pub mod composer;
pub mod tracker;

pub use composer::{CommentComposer, ComposerError, Feedback, FeedbackKind, SubmissionState};
pub use tracker::{JsonFileStore, KeyValueStore, MemoryStore, OwnershipTracker};

use crate::api::COMMENT_TOKEN_HEADER;
use crate::comments::CommentInput;
use crate::contacts::ContactInput;
use crate::store::Comment;
use reqwest::{RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Error)]
pub enum ClientError {
    /// The server answered with `success: false` or a non-2xx status.
    #[error("{message}")]
    Rejected { status: u16, message: String },
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("invalid base URL: {0}")]
    InvalidBaseUrl(String),
    #[error("request cancelled")]
    Cancelled,
}

/// Result of creating a comment. Both fields are optional on the wire: the
/// caller recovers the id from a fresh listing when the server omits it.
#[derive(Debug, Clone, Deserialize)]
pub struct SavedComment {
    #[serde(default)]
    pub comment: Option<Comment>,
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CommentsEnvelope {
    comments: Vec<Comment>,
}

#[derive(Debug, Deserialize)]
struct CommentEnvelope {
    comment: Comment,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    #[serde(default)]
    error: Option<String>,
}

#[derive(Clone)]
pub struct PortfolioClient {
    base_url: String,
    client: reqwest::Client,
}

impl PortfolioClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("portfolio/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            base_url: sanitize_base_url(base_url.into())?,
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn list_comments(&self, cancel: &CancellationToken) -> Result<Vec<Comment>, ClientError> {
        let request = self.client.get(self.url("/comments")?);
        let envelope: CommentsEnvelope = self.send(request, cancel).await?;
        Ok(envelope.comments)
    }

    pub async fn post_comment(
        &self,
        input: &CommentInput,
        cancel: &CancellationToken,
    ) -> Result<SavedComment, ClientError> {
        let request = self.client.post(self.url("/comments")?).json(input);
        self.send(request, cancel).await
    }

    pub async fn update_comment(
        &self,
        id: &str,
        token: &str,
        input: &CommentInput,
        cancel: &CancellationToken,
    ) -> Result<Comment, ClientError> {
        let request = self
            .client
            .put(self.comment_url(id)?)
            .header(COMMENT_TOKEN_HEADER, token)
            .json(input);
        let envelope: CommentEnvelope = self.send(request, cancel).await?;
        Ok(envelope.comment)
    }

    pub async fn delete_comment(
        &self,
        id: &str,
        token: &str,
        cancel: &CancellationToken,
    ) -> Result<(), ClientError> {
        let request = self
            .client
            .delete(self.comment_url(id)?)
            .header(COMMENT_TOKEN_HEADER, token);
        let _: serde_json::Value = self.send(request, cancel).await?;
        Ok(())
    }

    pub async fn send_contact(
        &self,
        input: &ContactInput,
        cancel: &CancellationToken,
    ) -> Result<(), ClientError> {
        let request = self.client.post(self.url("/contacts")?).json(input);
        let _: serde_json::Value = self.send(request, cancel).await?;
        Ok(())
    }

    fn url(&self, path: &str) -> Result<Url, ClientError> {
        Url::parse(&format!("{}{}", self.base_url, path))
            .map_err(|err| ClientError::InvalidBaseUrl(err.to_string()))
    }

    /// `/comments/{id}` with `id` percent-encoded as a single path segment.
    fn comment_url(&self, id: &str) -> Result<Url, ClientError> {
        let mut url = self.url("/comments")?;
        url.path_segments_mut()
            .map_err(|_| ClientError::InvalidBaseUrl(self.base_url.clone()))?
            .push(id);
        Ok(url)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        cancel: &CancellationToken,
    ) -> Result<T, ClientError> {
        let exchange = async {
            let response = check_status(request.send().await?).await?;
            Ok::<T, ClientError>(response.json::<T>().await?)
        };
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ClientError::Cancelled),
            result = exchange => result,
        }
    }
}

async fn check_status(response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorEnvelope>(&body)
        .ok()
        .and_then(|envelope| envelope.error)
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string()
        });
    Err(ClientError::Rejected {
        status: status.as_u16(),
        message,
    })
}

fn sanitize_base_url(mut base: String) -> Result<String, ClientError> {
    base = base.trim().to_string();
    if !base.starts_with("http://") && !base.starts_with("https://") {
        base = format!("http://{base}");
    }
    while base.ends_with('/') {
        base.pop();
    }
    Url::parse(&base).map_err(|err| ClientError::InvalidBaseUrl(err.to_string()))?;
    Ok(base)
}
