use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;
use uuid::Uuid;

use courtside_shared::errors::AppResult;
use courtside_shared::types::api::ApiResponse;
use courtside_shared::types::auth::AuthUser;

use crate::models::Notification;
use crate::services::notification_service::{self, ReadFilter};
use crate::AppState;

/// GET /notifications
pub async fn list_notifications(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
) -> AppResult<Json<ApiResponse<Vec<Notification>>>> {
    let items = notification_service::list(&state.db, auth_user.id, ReadFilter::All)?;
    Ok(Json(ApiResponse::ok(items)))
}

/// GET /notifications/unread
pub async fn list_unread(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
) -> AppResult<Json<ApiResponse<Vec<Notification>>>> {
    let items = notification_service::list(&state.db, auth_user.id, ReadFilter::Unread)?;
    Ok(Json(ApiResponse::ok(items)))
}

/// GET /notifications/read
pub async fn list_read(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
) -> AppResult<Json<ApiResponse<Vec<Notification>>>> {
    let items = notification_service::list(&state.db, auth_user.id, ReadFilter::Read)?;
    Ok(Json(ApiResponse::ok(items)))
}

#[derive(Debug, Serialize)]
pub struct UnreadCountResponse {
    pub unread_count: i64,
}

/// GET /notifications/unread-count
pub async fn unread_count(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
) -> AppResult<Json<ApiResponse<UnreadCountResponse>>> {
    let unread_count = notification_service::count_unread(&state.db, auth_user.id)?;
    Ok(Json(ApiResponse::ok(UnreadCountResponse { unread_count })))
}

#[derive(Debug, Serialize)]
pub struct MarkAllReadResponse {
    pub updated: usize,
}

/// PATCH /notifications/read-all
pub async fn mark_all_read(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
) -> AppResult<Json<ApiResponse<MarkAllReadResponse>>> {
    let updated = notification_service::mark_all_read(&state.db, auth_user.id)?;
    tracing::info!(user_id = %auth_user.id, updated, "notifications marked read");
    Ok(Json(ApiResponse::ok(MarkAllReadResponse { updated })))
}

/// PATCH /notifications/:id/read
pub async fn mark_read(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Notification>>> {
    let notification = notification_service::mark_read(&state.db, id, auth_user.id)?;
    Ok(Json(ApiResponse::ok(notification)))
}
