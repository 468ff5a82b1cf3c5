use super::tracker::OwnershipTracker;
use super::{ClientError, PortfolioClient};
use crate::comments::{validate, CommentInput};
use crate::error::ValidationError;
use crate::store::Comment;
use crate::utils::now_utc;
use chrono::{DateTime, Utc};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// How long a success or error message stays visible.
pub const FEEDBACK_DURATION: Duration = Duration::from_secs(5);

/// Window for matching a just-posted comment by name when the server did not
/// return it.
const RECOVERY_WINDOW_SECS: i64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionState {
    Idle,
    Submitting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackKind {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Feedback {
    pub kind: FeedbackKind,
    pub text: String,
    pub shown_at: Instant,
}

#[derive(Debug, Error)]
pub enum ComposerError {
    #[error("a comment is already being submitted")]
    AlreadySubmitting,
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("comment {0} was not posted from this client")]
    NotOwned(String),
    #[error("no ownership token stored for comment {0}")]
    MissingToken(String),
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error("failed to update local ownership state: {0}")]
    Tracker(#[from] anyhow::Error),
}

struct ComposerState {
    submission: SubmissionState,
    feedback: Option<Feedback>,
    comments: Vec<Comment>,
}

/// Returns the composer to `Idle` when a submission ends, including when its
/// future is dropped mid-flight.
struct SubmittingGuard<'a> {
    state: &'a Mutex<ComposerState>,
}

impl Drop for SubmittingGuard<'_> {
    fn drop(&mut self) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .submission = SubmissionState::Idle;
    }
}

/// The comment form and list: submits, reloads, and tracks ownership of
/// what it posted.
pub struct CommentComposer {
    client: PortfolioClient,
    tracker: Mutex<OwnershipTracker>,
    state: Mutex<ComposerState>,
}

impl CommentComposer {
    pub fn new(client: PortfolioClient, tracker: OwnershipTracker) -> Self {
        Self {
            client,
            tracker: Mutex::new(tracker),
            state: Mutex::new(ComposerState {
                submission: SubmissionState::Idle,
                feedback: None,
                comments: Vec::new(),
            }),
        }
    }

    pub fn submission_state(&self) -> SubmissionState {
        self.state().submission
    }

    pub fn comments(&self) -> Vec<Comment> {
        self.state().comments.clone()
    }

    pub fn is_mine(&self, id: &str) -> bool {
        self.tracker().is_mine(id)
    }

    pub fn feedback(&self) -> Option<Feedback> {
        self.feedback_at(Instant::now())
    }

    /// Feedback visible at `now`; expired feedback is cleared.
    pub fn feedback_at(&self, now: Instant) -> Option<Feedback> {
        let mut state = self.state();
        let expired = state
            .feedback
            .as_ref()
            .is_some_and(|f| now.saturating_duration_since(f.shown_at) >= FEEDBACK_DURATION);
        if expired {
            state.feedback = None;
        }
        state.feedback.clone()
    }

    pub async fn refresh(&self, cancel: &CancellationToken) -> Result<Vec<Comment>, ComposerError> {
        let comments = self.client.list_comments(cancel).await?;
        self.state().comments = comments.clone();
        Ok(comments)
    }

    /// Posts a comment and records it as this client's. Returns the new
    /// comment's id when it could be determined. Rejected while another
    /// submission is in flight.
    pub async fn submit(
        &self,
        input: CommentInput,
        cancel: &CancellationToken,
    ) -> Result<Option<String>, ComposerError> {
        {
            let mut state = self.state();
            if state.submission == SubmissionState::Submitting {
                return Err(ComposerError::AlreadySubmitting);
            }
            state.submission = SubmissionState::Submitting;
        }
        let in_flight = SubmittingGuard { state: &self.state };

        let result = self.post_and_track(input, cancel).await;
        drop(in_flight);

        let mut state = self.state();
        state.feedback = Some(match &result {
            Ok(_) => Feedback {
                kind: FeedbackKind::Success,
                text: "Comment posted!".into(),
                shown_at: Instant::now(),
            },
            Err(err) => Feedback {
                kind: FeedbackKind::Error,
                text: err.to_string(),
                shown_at: Instant::now(),
            },
        });
        result
    }

    async fn post_and_track(
        &self,
        input: CommentInput,
        cancel: &CancellationToken,
    ) -> Result<Option<String>, ComposerError> {
        let valid = validate(&input)?;
        let saved = self.client.post_comment(&valid, cancel).await?;

        // Saved at this point: a failed reload is only logged.
        if let Some(comment) = saved.comment {
            self.tracker().remember(&comment.id, saved.token)?;
            if let Err(err) = self.refresh(cancel).await {
                tracing::warn!(error = %err, "failed to reload comments after posting");
            }
            return Ok(Some(comment.id));
        }

        let comments = match self.refresh(cancel).await {
            Ok(comments) => comments,
            Err(err) => {
                tracing::warn!(error = %err, "failed to reload comments after posting");
                return Ok(None);
            }
        };
        let id = recover_created_id(&comments, &valid.name, now_utc());
        match &id {
            Some(id) => self.tracker().remember(id, saved.token)?,
            None => tracing::warn!("could not determine the id of the posted comment"),
        }
        Ok(id)
    }

    pub async fn edit(
        &self,
        id: &str,
        input: CommentInput,
        cancel: &CancellationToken,
    ) -> Result<Comment, ComposerError> {
        let token = self.owned_token(id)?;
        let valid = validate(&input)?;
        let updated = self
            .client
            .update_comment(id, &token, &valid, cancel)
            .await?;
        self.refresh(cancel).await?;
        Ok(updated)
    }

    pub async fn delete(&self, id: &str, cancel: &CancellationToken) -> Result<(), ComposerError> {
        let token = self.owned_token(id)?;
        self.client.delete_comment(id, &token, cancel).await?;
        self.tracker().forget(id)?;
        self.refresh(cancel).await?;
        Ok(())
    }

    fn owned_token(&self, id: &str) -> Result<String, ComposerError> {
        let tracker = self.tracker();
        if !tracker.is_mine(id) {
            return Err(ComposerError::NotOwned(id.to_string()));
        }
        tracker
            .token_for(id)
            .map(str::to_string)
            .ok_or_else(|| ComposerError::MissingToken(id.to_string()))
    }

    fn state(&self) -> MutexGuard<'_, ComposerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn tracker(&self) -> MutexGuard<'_, OwnershipTracker> {
        self.tracker.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Newest comment named `name` created within five seconds of `now`.
///
/// This is an approximation: two clients posting under the same name inside
/// the window can be credited with each other's comment. It only runs when
/// the save response carried no comment.
pub fn recover_created_id(comments: &[Comment], name: &str, now: DateTime<Utc>) -> Option<String> {
    let window = chrono::Duration::seconds(RECOVERY_WINDOW_SECS);
    comments
        .iter()
        .find(|c| {
            let age = now - c.created_at;
            c.name == name && age <= window && age >= -window
        })
        .map(|c| c.id.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MemoryStore;

    fn comment(id: &str, name: &str, created_at: DateTime<Utc>) -> Comment {
        Comment {
            id: id.into(),
            name: name.into(),
            message: "m".into(),
            created_at,
        }
    }

    fn composer() -> CommentComposer {
        let client = PortfolioClient::new("http://127.0.0.1:9").unwrap();
        let tracker = OwnershipTracker::load(Box::new(MemoryStore::default())).unwrap();
        CommentComposer::new(client, tracker)
    }

    #[test]
    fn recovery_matches_name_inside_the_window() {
        let now = Utc::now();
        let comments = vec![
            comment("new-other", "Bob", now),
            comment("mine", "Ada", now - chrono::Duration::seconds(2)),
            comment("old", "Ada", now - chrono::Duration::seconds(30)),
        ];
        assert_eq!(recover_created_id(&comments, "Ada", now).as_deref(), Some("mine"));
        assert_eq!(recover_created_id(&comments[2..], "Ada", now), None);
        assert_eq!(recover_created_id(&comments, "Eve", now), None);
    }

    #[test]
    fn feedback_expires_after_five_seconds() {
        let composer = composer();
        let shown_at = Instant::now();
        composer.state().feedback = Some(Feedback {
            kind: FeedbackKind::Success,
            text: "Comment posted!".into(),
            shown_at,
        });
        assert!(composer.feedback_at(shown_at + Duration::from_secs(4)).is_some());
        assert!(composer.feedback_at(shown_at + FEEDBACK_DURATION).is_none());
        assert!(composer.feedback_at(shown_at).is_none());
    }

    #[tokio::test]
    async fn invalid_input_fails_locally_and_reports_feedback() {
        let composer = composer();
        let err = composer
            .submit(
                CommentInput {
                    name: " ".into(),
                    message: "hi".into(),
                },
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ComposerError::Validation(ValidationError::NameRequired)));
        assert_eq!(composer.submission_state(), SubmissionState::Idle);
        let feedback = composer.feedback().unwrap();
        assert_eq!(feedback.kind, FeedbackKind::Error);
        assert_eq!(feedback.text, "name is required");
    }

    #[tokio::test]
    async fn only_owned_comments_can_be_changed() {
        let composer = composer();
        let cancel = CancellationToken::new();
        let err = composer.delete("someone-else", &cancel).await.unwrap_err();
        assert!(matches!(err, ComposerError::NotOwned(_)));

        composer.tracker().remember("legacy", None).unwrap();
        let err = composer.delete("legacy", &cancel).await.unwrap_err();
        assert!(matches!(err, ComposerError::MissingToken(_)));
    }

    #[tokio::test]
    async fn dropping_an_in_flight_submit_returns_to_idle() {
        // Connections queue in the backlog but are never answered.
        let silent = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = silent.local_addr().unwrap();
        let client = PortfolioClient::new(format!("http://{addr}")).unwrap();
        let tracker = OwnershipTracker::load(Box::new(MemoryStore::default())).unwrap();
        let composer = CommentComposer::new(client, tracker);
        let cancel = CancellationToken::new();

        let pending = composer.submit(
            CommentInput {
                name: "Ada".into(),
                message: "hi".into(),
            },
            &cancel,
        );
        let timed_out = tokio::time::timeout(Duration::from_millis(200), pending).await;
        assert!(timed_out.is_err());
        assert_eq!(composer.submission_state(), SubmissionState::Idle);
        drop(silent);
    }
}
