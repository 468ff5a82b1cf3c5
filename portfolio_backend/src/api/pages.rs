use super::AppState;
use crate::site::{render_page, PageContext};
use axum::extract::State;
use axum::response::Html;
use axum::Json;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub(crate) struct HealthResponse {
    status: &'static str,
    version: &'static str,
    api_port: u16,
    storage: &'static str,
}

pub(crate) async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        api_port: state.config.api_port,
        storage: state.storage_backend,
    })
}

/// The page always renders; a storage failure shows up as an empty comment
/// list and a log line.
pub(crate) async fn index(State(state): State<AppState>) -> Html<String> {
    let cancel = state.request_token();
    let comments = match state.comments.get_comments(&cancel).await {
        Ok(comments) => comments,
        Err(err) => {
            tracing::warn!(error = %err, "rendering page without comments");
            Vec::new()
        }
    };
    Html(render_page(&PageContext {
        profile: &state.site,
        comments: &comments,
    }))
}
