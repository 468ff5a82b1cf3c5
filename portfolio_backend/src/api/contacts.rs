use super::comments::SuccessResponse;
use super::{ApiError, AppState};
use crate::contacts::ContactInput;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;

pub(crate) async fn create_contact(
    State(state): State<AppState>,
    Json(input): Json<ContactInput>,
) -> Result<(StatusCode, Json<SuccessResponse>), ApiError> {
    input
        .require_fields()
        .map_err(|err| ApiError::BadRequest(err.to_string()))?;
    let cancel = state.request_token();
    state
        .contacts
        .save_contact(input.sanitized(), &cancel)
        .await?;
    Ok((StatusCode::CREATED, Json(SuccessResponse { success: true })))
}
