use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use courtside_shared::errors::{AppError, AppResult};
use courtside_shared::types::api::ApiResponse;
use courtside_shared::types::auth::AuthUser;

use crate::models::Comment;
use crate::services::comment_service::{self, CommentNode};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateCommentRequest {
    pub content: String,
    pub post_id: Uuid,
    pub parent_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct ReplyRequest {
    pub content: String,
    pub post_id: Uuid,
    pub parent_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct UpdateCommentRequest {
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct DeleteCommentResponse {
    pub message: String,
    pub comments: i64,
}

/// GET /comment/post/:post_id
pub async fn post_comments(
    State(state): State<Arc<AppState>>,
    _auth_user: AuthUser,
    Path(post_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Vec<CommentNode>>>> {
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;
    let (comments, authors) = comment_service::load_for_post(&mut conn, post_id)?;
    Ok(Json(ApiResponse::ok(comment_service::two_level_threads(comments, &authors))))
}

/// GET /comment/tree/post/:post_id
pub async fn comment_tree(
    State(state): State<Arc<AppState>>,
    _auth_user: AuthUser,
    Path(post_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Vec<CommentNode>>>> {
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;
    let (comments, authors) = comment_service::load_for_post(&mut conn, post_id)?;
    Ok(Json(ApiResponse::ok(comment_service::build_tree(comments, &authors))))
}

fn add_comment(
    state: &AppState,
    user_id: Uuid,
    post_id: Uuid,
    parent_id: Option<Uuid>,
    content: &str,
) -> AppResult<Comment> {
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;
    let (comment, post_owner, parent) =
        comment_service::insert_comment(&mut conn, user_id, post_id, parent_id, content)?;

    comment_service::notify_comment(state, &mut conn, &comment, post_owner, parent.as_ref());

    tracing::info!(comment_id = %comment.id, post_id = %post_id, user_id = %user_id, "comment added");
    Ok(comment)
}

/// POST /comment
pub async fn create_comment(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Json(req): Json<CreateCommentRequest>,
) -> AppResult<Json<ApiResponse<Comment>>> {
    let comment = add_comment(&state, auth_user.id, req.post_id, req.parent_id, &req.content)?;
    Ok(Json(ApiResponse::ok_with_message(comment, "Comment added successfully")))
}

/// POST /comment/reply
pub async fn reply(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Json(req): Json<ReplyRequest>,
) -> AppResult<Json<ApiResponse<Comment>>> {
    let comment = add_comment(&state, auth_user.id, req.post_id, Some(req.parent_id), &req.content)?;
    Ok(Json(ApiResponse::ok_with_message(comment, "Reply added successfully")))
}

/// PUT /comment/update/:id
pub async fn update_comment(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Path(comment_id): Path<Uuid>,
    Json(req): Json<UpdateCommentRequest>,
) -> AppResult<Json<ApiResponse<Comment>>> {
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;
    let comment = comment_service::update_comment(&mut conn, auth_user.id, comment_id, &req.content)?;
    Ok(Json(ApiResponse::ok_with_message(comment, "Comment updated successfully")))
}

/// DELETE /comment/delete/:id
pub async fn delete_comment(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Path(comment_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<DeleteCommentResponse>>> {
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;
    let comments = comment_service::delete_comment(&mut conn, auth_user.id, comment_id)?;

    tracing::info!(comment_id = %comment_id, user_id = %auth_user.id, remaining = comments, "comment deleted");
    Ok(Json(ApiResponse::ok(DeleteCommentResponse {
        message: "Comment deleted successfully".into(),
        comments,
    })))
}
