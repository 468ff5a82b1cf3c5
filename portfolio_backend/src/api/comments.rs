use super::{ApiError, ApiResult, AppState, COMMENT_TOKEN_HEADER};
use crate::comments::CommentInput;
use crate::sanitize::sanitize_html;
use crate::store::Comment;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub(crate) struct CommentsResponse {
    success: bool,
    comments: Vec<Comment>,
}

#[derive(Debug, Serialize)]
pub(crate) struct CreatedCommentResponse {
    success: bool,
    comment: Comment,
    /// Present this as `x-comment-token` to edit or delete the comment.
    token: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct CommentResponse {
    success: bool,
    comment: Comment,
}

#[derive(Debug, Serialize)]
pub(crate) struct SuccessResponse {
    pub(super) success: bool,
}

/// Trims the name and runs the message through the allow-list; the service
/// stores what it is given.
fn prepare(input: CommentInput) -> CommentInput {
    CommentInput {
        name: input.name.trim().to_string(),
        message: sanitize_html(&input.message),
    }
}

fn authorize(state: &AppState, headers: &HeaderMap, id: &str) -> Result<(), ApiError> {
    let token = headers
        .get(COMMENT_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| ApiError::Unauthorized("missing comment ownership token".into()))?;
    if !state.ownership.verify(id, token) {
        tracing::warn!(comment_id = id, "rejected comment mutation with invalid token");
        return Err(ApiError::Forbidden(
            "you can only change comments you created".into(),
        ));
    }
    Ok(())
}

pub(crate) async fn list_comments(State(state): State<AppState>) -> ApiResult<CommentsResponse> {
    let cancel = state.request_token();
    let comments = state.comments.get_comments(&cancel).await?;
    Ok(Json(CommentsResponse {
        success: true,
        comments,
    }))
}

pub(crate) async fn create_comment(
    State(state): State<AppState>,
    Json(input): Json<CommentInput>,
) -> Result<(StatusCode, Json<CreatedCommentResponse>), ApiError> {
    let cancel = state.request_token();
    let comment = state.comments.save_comment(prepare(input), &cancel).await?;
    let token = state.ownership.issue(&comment.id);
    Ok((
        StatusCode::CREATED,
        Json(CreatedCommentResponse {
            success: true,
            comment,
            token,
        }),
    ))
}

pub(crate) async fn update_comment(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(input): Json<CommentInput>,
) -> ApiResult<CommentResponse> {
    authorize(&state, &headers, &id)?;
    let cancel = state.request_token();
    let comment = state
        .comments
        .update_comment(&id, prepare(input), &cancel)
        .await?;
    Ok(Json(CommentResponse {
        success: true,
        comment,
    }))
}

pub(crate) async fn delete_comment(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<SuccessResponse> {
    authorize(&state, &headers, &id)?;
    let cancel = state.request_token();
    state.comments.delete_comment(&id, &cancel).await?;
    Ok(Json(SuccessResponse { success: true }))
}
