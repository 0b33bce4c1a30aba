use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use courtside_shared::errors::{AppError, AppResult};
use courtside_shared::types::api::ApiResponse;
use courtside_shared::types::auth::AuthUser;

use crate::services::feed_service::{self, FeedItem};
use crate::services::like_service::{self, FeedType, ToggleOutcome};
use crate::AppState;

fn default_page() -> i64 {
    1
}

fn default_limit() -> i64 {
    20
}

#[derive(Debug, Deserialize)]
pub struct FeedQuery {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

#[derive(Debug, Deserialize)]
pub struct FeedTarget {
    pub feed_type: FeedType,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct ViewResponse {
    pub success: bool,
    pub message: &'static str,
}

impl ViewResponse {
    fn new(feed_type: FeedType, first: bool) -> Self {
        match (first, feed_type) {
            (false, _) => Self { success: false, message: "Already seen" },
            (true, FeedType::Post) => Self { success: true, message: "Post view incremented" },
            (true, FeedType::Highlight) => Self { success: true, message: "Highlight view incremented" },
        }
    }
}

fn invalid_target(feed_type: FeedType) -> AppError {
    match feed_type {
        FeedType::Post => AppError::bad_request("Invalid Post ID"),
        FeedType::Highlight => AppError::bad_request("Invalid Highlight ID"),
    }
}

/// GET /post-reel/feeds
pub async fn smart_feed(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Query(query): Query<FeedQuery>,
) -> AppResult<Json<ApiResponse<Vec<FeedItem>>>> {
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;
    let items = feed_service::smart_feed(&mut conn, auth_user.id, query.page, query.limit)?;
    Ok(Json(ApiResponse::ok(items)))
}

/// GET /post-reel/my-feeds
pub async fn my_feed(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Query(query): Query<FeedQuery>,
) -> AppResult<Json<ApiResponse<Vec<FeedItem>>>> {
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;
    let items = feed_service::my_feed(&mut conn, auth_user.id, query.page, query.limit)?;
    Ok(Json(ApiResponse::ok(items)))
}

/// POST /post-reel/:id/like
pub async fn toggle_like(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Path(target_id): Path<Uuid>,
    Json(target): Json<FeedTarget>,
) -> AppResult<Json<ApiResponse<ToggleOutcome>>> {
    let outcome = like_service::toggle(&state, target_id, auth_user.id, target.feed_type)?;
    Ok(Json(ApiResponse::ok(outcome)))
}

/// POST /post-reel/:id/seen
pub async fn mark_seen(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Path(target_id): Path<Uuid>,
    Json(target): Json<FeedTarget>,
) -> AppResult<Json<ApiResponse<ViewResponse>>> {
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;
    let first = like_service::record_view(&mut conn, target_id, auth_user.id, target.feed_type)?
        .ok_or_else(|| invalid_target(target.feed_type))?;
    Ok(Json(ApiResponse::ok(ViewResponse::new(target.feed_type, first))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn view_messages_depend_on_type() {
        assert_eq!(ViewResponse::new(FeedType::Post, true).message, "Post view incremented");
        assert_eq!(ViewResponse::new(FeedType::Highlight, true).message, "Highlight view incremented");
        let repeat = ViewResponse::new(FeedType::Highlight, false);
        assert!(!repeat.success);
        assert_eq!(repeat.message, "Already seen");
    }

    #[test]
    fn target_parses_uppercase_type() {
        let t: FeedTarget = serde_json::from_value(serde_json::json!({ "feed_type": "POST" })).unwrap();
        assert_eq!(t.feed_type, FeedType::Post);
    }
}
