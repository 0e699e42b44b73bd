use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use arbor_context::ContextWindow;
use arbor_engine::{EditOutcome, GenerateOptions, SendMessage, TurnOutcome};
use arbor_persist::{Message, MessageRole};

use crate::{
    error::{ApiError, ApiResult},
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct EditMessageRequest {
    pub content: String,
    /// Generate a fresh reply after the edit
    #[serde(default)]
    pub regenerate: bool,
    #[serde(flatten)]
    pub options: GenerateOptions,
}

#[derive(Debug, Deserialize)]
pub struct BranchRequest {
    pub content: String,
    #[serde(default = "default_role")]
    pub role: MessageRole,
    /// Generate a reply to the new branch (user branches only)
    #[serde(default)]
    pub generate: bool,
    #[serde(flatten)]
    pub options: GenerateOptions,
}

fn default_role() -> MessageRole {
    MessageRole::User
}

#[derive(Debug, Deserialize)]
pub struct ContextFlagRequest {
    pub is_context: bool,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub deleted: usize,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum EditResponse {
    Edited(EditOutcome),
    Regenerated(TurnOutcome),
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum BranchResponse {
    Created(Message),
    Generated(TurnOutcome),
}

fn require_content(content: &str) -> ApiResult<()> {
    if content.trim().is_empty() {
        return Err(ApiError::BadRequest("content must not be empty".to_string()));
    }
    Ok(())
}

/// Send a message; starts a new thread when `thread_id` is omitted
pub async fn send_message(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SendMessage>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<TurnOutcome>)> {
    let Json(req) = payload?;
    require_content(&req.content)?;

    let outcome = state.service.send_message(req).await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

/// Context the model would see for a selected message
pub async fn get_context(
    State(state): State<Arc<AppState>>,
    Path(message_id): Path<String>,
) -> ApiResult<Json<ContextWindow>> {
    Ok(Json(state.service.get_context_for_message(&message_id).await?))
}

/// Edit a user message; its replies are deleted
pub async fn edit_message(
    State(state): State<Arc<AppState>>,
    Path(message_id): Path<String>,
    payload: Result<Json<EditMessageRequest>, JsonRejection>,
) -> ApiResult<Json<EditResponse>> {
    let Json(req) = payload?;
    require_content(&req.content)?;

    let response = if req.regenerate {
        let outcome = state
            .service
            .edit_and_regenerate(&message_id, &req.content, req.options)
            .await?;
        EditResponse::Regenerated(outcome)
    } else {
        EditResponse::Edited(state.service.edit_message(&message_id, &req.content).await?)
    };

    Ok(Json(response))
}

/// Delete a message and its subtree
pub async fn delete_message(
    State(state): State<Arc<AppState>>,
    Path(message_id): Path<String>,
) -> ApiResult<Json<DeleteResponse>> {
    let deleted = state.service.delete_message(&message_id).await?;
    Ok(Json(DeleteResponse { deleted }))
}

/// Create a sibling of the clicked message
pub async fn create_branch(
    State(state): State<Arc<AppState>>,
    Path(message_id): Path<String>,
    payload: Result<Json<BranchRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<BranchResponse>)> {
    let Json(req) = payload?;
    require_content(&req.content)?;

    let response = if req.generate {
        if req.role != MessageRole::User {
            return Err(ApiError::BadRequest(
                "only user branches can be generated from".to_string(),
            ));
        }
        let outcome = state
            .service
            .branch_and_generate(&message_id, &req.content, req.options)
            .await?;
        BranchResponse::Generated(outcome)
    } else {
        let branch = state
            .service
            .create_branch(&message_id, &req.content, req.role)
            .await?;
        BranchResponse::Created(branch)
    };

    Ok((StatusCode::CREATED, Json(response)))
}

/// Include or exclude a message from future context
pub async fn set_context_flag(
    State(state): State<Arc<AppState>>,
    Path(message_id): Path<String>,
    payload: Result<Json<ContextFlagRequest>, JsonRejection>,
) -> ApiResult<Json<Message>> {
    let Json(req) = payload?;
    let message = state
        .service
        .set_message_context_flag(&message_id, req.is_context)
        .await?;
    Ok(Json(message))
}

/// Generate another reply for a message
pub async fn regenerate(
    State(state): State<Arc<AppState>>,
    Path(message_id): Path<String>,
    payload: Option<Json<GenerateOptions>>,
) -> ApiResult<(StatusCode, Json<TurnOutcome>)> {
    let options = payload.map(|Json(o)| o).unwrap_or_default();
    let outcome = state.service.regenerate(&message_id, options).await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}
