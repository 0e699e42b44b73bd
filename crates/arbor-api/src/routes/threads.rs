use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use arbor_engine::{GenerateOptions, SendMessage, ThreadView, TurnOutcome};
use arbor_persist::{NewThread, Thread, ThreadUpdate};

use crate::{
    error::{ApiError, ApiResult},
    state::AppState,
};

const UNTITLED_THREAD: &str = "New conversation";

#[derive(Debug, Default, Deserialize)]
pub struct CreateThreadRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub system_prompt: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListThreadsQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    20
}

#[derive(Debug, Serialize)]
pub struct ListThreadsResponse {
    pub threads: Vec<Thread>,
    pub has_more: bool,
}

#[derive(Debug, Deserialize)]
pub struct PostMessageRequest {
    #[serde(default)]
    pub parent_id: Option<String>,
    pub content: String,
    #[serde(flatten)]
    pub options: GenerateOptions,
}

/// Create a new thread
pub async fn create_thread(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CreateThreadRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Thread>)> {
    let Json(req) = payload?;

    let name = req
        .name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| UNTITLED_THREAD.to_string());
    let new = NewThread {
        name,
        system_prompt: req.system_prompt,
    };

    let thread = state.service.create_thread(new).await?;
    Ok((StatusCode::CREATED, Json(thread)))
}

/// List live threads, most recently updated first
pub async fn list_threads(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListThreadsQuery>,
) -> ApiResult<Json<ListThreadsResponse>> {
    let limit = query.limit.clamp(1, 100);

    // Fetch one extra to learn whether more exist
    let mut threads = state.service.list_threads(Some(limit + 1)).await?;
    let has_more = threads.len() > limit;
    threads.truncate(limit);

    Ok(Json(ListThreadsResponse { threads, has_more }))
}

pub async fn get_thread(
    State(state): State<Arc<AppState>>,
    Path(thread_id): Path<String>,
) -> ApiResult<Json<Thread>> {
    Ok(Json(state.service.get_thread(&thread_id).await?))
}

/// Rename a thread or set/clear its persona (`"system_prompt": null` clears)
pub async fn update_thread(
    State(state): State<Arc<AppState>>,
    Path(thread_id): Path<String>,
    payload: Result<Json<ThreadUpdate>, JsonRejection>,
) -> ApiResult<Json<Thread>> {
    let Json(update) = payload?;
    if update.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
        return Err(ApiError::BadRequest("name must not be empty".to_string()));
    }

    Ok(Json(state.service.update_thread(&thread_id, update).await?))
}

/// Soft-delete a thread
pub async fn delete_thread(
    State(state): State<Arc<AppState>>,
    Path(thread_id): Path<String>,
) -> ApiResult<StatusCode> {
    state.service.delete_thread(&thread_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Full branching structure plus the default (deepest) path
pub async fn get_thread_tree(
    State(state): State<Arc<AppState>>,
    Path(thread_id): Path<String>,
) -> ApiResult<Json<ThreadView>> {
    Ok(Json(state.service.get_thread_tree(&thread_id).await?))
}

/// Send a user message in a thread and generate the reply
pub async fn post_message(
    State(state): State<Arc<AppState>>,
    Path(thread_id): Path<String>,
    payload: Result<Json<PostMessageRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<TurnOutcome>)> {
    let Json(req) = payload?;
    if req.content.trim().is_empty() {
        return Err(ApiError::BadRequest("content must not be empty".to_string()));
    }

    let send = SendMessage {
        thread_id: Some(thread_id),
        parent_id: req.parent_id,
        content: req.content,
        options: req.options,
    };
    let outcome = state.service.send_message(send).await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}
