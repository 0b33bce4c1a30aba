use std::sync::Arc;

use axum::extract::{Multipart, Path, State};
use axum::Json;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use courtside_shared::errors::{AppError, AppResult};
use courtside_shared::types::api::{ApiResponse, MessageBody};
use courtside_shared::middleware::AdminUser;
use courtside_shared::types::auth::AuthUser;

use crate::models::{Highlight, UserSummary};
use crate::routes::upload::MultipartForm;
use crate::schema::highlights;
use crate::services::access::{self, PAID_TIERS};
use crate::services::highlight_service::{self, HighlightUpload};
use crate::services::like_service::{self, FeedType, ToggleOutcome};
use crate::services::post_service::author_summaries;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct HighlightWithAuthor {
    #[serde(flatten)]
    pub highlight: Highlight,
    pub user: Option<UserSummary>,
}

#[derive(Debug, Deserialize)]
pub struct RemoveClipRequest {
    pub highlight_id: Uuid,
    pub order: i32,
}

/// POST /highlights/merge-video
pub async fn merge_video(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
    multipart: Multipart,
) -> AppResult<Json<ApiResponse<Highlight>>> {
    {
        let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;
        access::require_tier(&mut conn, &auth_user, PAID_TIERS)?;
    }

    let mut form = MultipartForm::read(multipart).await?;
    let upload = HighlightUpload {
        caption: form.text("caption"),
        description: form.text("description"),
        clips: form.take_files("clips"),
    };

    let highlight = highlight_service::create_merged(&state, auth_user.id, upload).await?;
    Ok(Json(ApiResponse::ok_with_message(highlight, "Highlight video merged successfully")))
}

/// DELETE /highlights/remove-clip
pub async fn remove_clip(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Json(req): Json<RemoveClipRequest>,
) -> AppResult<Json<ApiResponse<Highlight>>> {
    let highlight = highlight_service::remove_clip(&state, req.highlight_id, req.order).await?;
    tracing::info!(highlight_id = %req.highlight_id, order = req.order, admin_id = %admin.id, "clip removed by admin");
    Ok(Json(ApiResponse::ok_with_message(highlight, "Clip removed successfully")))
}

/// GET /highlights
pub async fn list_highlights(
    State(state): State<Arc<AppState>>,
    _auth_user: AuthUser,
) -> AppResult<Json<ApiResponse<Vec<HighlightWithAuthor>>>> {
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;

    let items: Vec<Highlight> = highlights::table
        .order((highlights::updated_at.desc(), highlights::created_at.desc()))
        .select(Highlight::as_select())
        .load(&mut conn)?;

    let author_ids: Vec<Uuid> = items.iter().map(|h| h.user_id).collect();
    let authors = author_summaries(&mut conn, &author_ids)?;

    let data = items
        .into_iter()
        .map(|highlight| HighlightWithAuthor {
            user: authors.get(&highlight.user_id).cloned(),
            highlight,
        })
        .collect();
    Ok(Json(ApiResponse::ok(data)))
}

/// PATCH /highlights/like/:id
pub async fn toggle_like(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Path(highlight_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<ToggleOutcome>>> {
    let outcome = like_service::toggle(&state, highlight_id, auth_user.id, FeedType::Highlight)?;
    Ok(Json(ApiResponse::ok(outcome)))
}

/// GET /highlights/:id
pub async fn get_highlight(
    State(state): State<Arc<AppState>>,
    Path(highlight_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Highlight>>> {
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;
    let highlight = highlight_service::find_highlight(&mut conn, highlight_id)?;
    Ok(Json(ApiResponse::ok(highlight)))
}

/// DELETE /highlights/deleteHighlights/:id
pub async fn delete_highlight(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Path(highlight_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<MessageBody>>> {
    {
        let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;
        access::require_tier(&mut conn, &auth_user, PAID_TIERS)?;
    }

    highlight_service::delete_highlight(&state, &auth_user, highlight_id).await?;
    Ok(Json(ApiResponse::ok(MessageBody::new("Highlight deleted successfully"))))
}
