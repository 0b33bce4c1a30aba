use std::sync::Arc;

use axum::extract::{Multipart, Path, Query, State};
use axum::Json;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use courtside_shared::errors::{AppError, AppResult, ErrorCode};
use courtside_shared::types::api::{ApiResponse, MessageBody};
use courtside_shared::types::auth::AuthUser;

use crate::models::PostImage;
use crate::routes::upload::MultipartForm;
use crate::schema::{post_images, posts};
use crate::services::like_service::{self, FeedType, ToggleOutcome};
use crate::services::post_service::{self, PostDetails};
use crate::services::upload_service;
use crate::AppState;

const POST_IMAGE_FOLDER: &str = "posts/images";
const MAX_POST_IMAGES: usize = 10;

/// POST /post/create
pub async fn create_post(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
    multipart: Multipart,
) -> AppResult<Json<ApiResponse<PostDetails>>> {
    let mut form = MultipartForm::read(multipart).await?;
    let files = form.take_files("images");

    if files.is_empty() {
        return Err(AppError::new(ErrorCode::PostImageRequired, "At least one image is required"));
    }
    if files.len() > MAX_POST_IMAGES {
        return Err(AppError::bad_request(format!("At most {MAX_POST_IMAGES} images are allowed")));
    }

    let urls = upload_service::store_all(&state.storage, POST_IMAGE_FOLDER, files).await?;

    let created = match state.db.get() {
        Ok(mut conn) => post_service::create_post(&mut conn, auth_user.id, form.text("caption"), &urls),
        Err(e) => Err(AppError::internal(e.to_string())),
    };
    let details = upload_service::discard_on_error(&state.storage, &urls, created).await?;

    tracing::info!(post_id = %details.post.id, user_id = %auth_user.id, images = urls.len(), "post created");
    Ok(Json(ApiResponse::ok_with_message(details, "Post created successfully")))
}

/// GET /post/:id
pub async fn get_post(
    State(state): State<Arc<AppState>>,
    _auth_user: AuthUser,
    Path(post_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<PostDetails>>> {
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;
    let post = post_service::find_post(&mut conn, post_id)?;
    let details = post_service::with_details(&mut conn, vec![post], true)?
        .pop()
        .ok_or_else(|| AppError::new(ErrorCode::PostNotFound, "Post not found"))?;
    Ok(Json(ApiResponse::ok(details)))
}

/// GET /post
pub async fn list_posts(
    State(state): State<Arc<AppState>>,
    _auth_user: AuthUser,
) -> AppResult<Json<ApiResponse<Vec<PostDetails>>>> {
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;
    let items = post_service::list_posts(&mut conn, None, true)?;
    Ok(Json(ApiResponse::ok(items)))
}

/// GET /post/user
pub async fn my_posts(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
) -> AppResult<Json<ApiResponse<Vec<PostDetails>>>> {
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;
    let items = post_service::list_posts(&mut conn, Some(auth_user.id), true)?;
    Ok(Json(ApiResponse::ok(items)))
}

/// GET /post/user/:user_id
pub async fn user_posts(
    State(state): State<Arc<AppState>>,
    _auth_user: AuthUser,
    Path(user_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Vec<PostDetails>>>> {
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;
    let items = post_service::list_posts(&mut conn, Some(user_id), true)?;
    Ok(Json(ApiResponse::ok(items)))
}

/// PATCH /post/update/:id
pub async fn update_post(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Path(post_id): Path<Uuid>,
    multipart: Multipart,
) -> AppResult<Json<ApiResponse<PostDetails>>> {
    let mut form = MultipartForm::read(multipart).await?;

    let (post, existing) = {
        let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;
        let post = post_service::find_post(&mut conn, post_id)?;
        if post.user_id != auth_user.id {
            return Err(AppError::forbidden("You can only update your own posts"));
        }
        let existing: Vec<PostImage> = post_images::table
            .filter(post_images::post_id.eq(post_id))
            .select(PostImage::as_select())
            .load(&mut conn)?;
        (post, existing)
    };

    // without kept_image_urls every current image stays
    let (kept, dropped) = if form.has_field("kept_image_urls") {
        post_service::partition_images(existing, &form.list("kept_image_urls"))
    } else {
        (existing, Vec::new())
    };

    let files = form.take_files("images");
    if kept.len() + files.len() > MAX_POST_IMAGES {
        return Err(AppError::bad_request(format!("At most {MAX_POST_IMAGES} images are allowed")));
    }
    let new_urls = upload_service::store_all(&state.storage, POST_IMAGE_FOLDER, files).await?;

    let caption = form.text("caption").or(post.caption);
    let dropped_ids: Vec<Uuid> = dropped.iter().map(|img| img.id).collect();

    let written = match state.db.get() {
        Ok(mut conn) => post_service::rewrite_post(&mut conn, post_id, caption, dropped_ids, &new_urls).map(|()| conn),
        Err(e) => Err(AppError::internal(e.to_string())),
    };
    let mut conn = upload_service::discard_on_error(&state.storage, &new_urls, written).await?;

    for image in &dropped {
        state.storage.delete_quietly(&image.url).await;
    }

    let updated = post_service::find_post(&mut conn, post_id)?;
    let details = post_service::with_details(&mut conn, vec![updated], false)?
        .pop()
        .ok_or_else(|| AppError::new(ErrorCode::PostNotFound, "Post not found"))?;

    tracing::info!(post_id = %post_id, added = new_urls.len(), removed = dropped.len(), "post updated");
    Ok(Json(ApiResponse::ok_with_message(details, "Post updated successfully")))
}

/// DELETE /post/delete/:id
pub async fn delete_post(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Path(post_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<MessageBody>>> {
    let images: Vec<PostImage> = {
        let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;
        let post = post_service::find_post(&mut conn, post_id)?;
        if post.user_id != auth_user.id && !auth_user.is_admin() {
            return Err(AppError::forbidden("You are not allowed to delete this post"));
        }
        post_images::table
            .filter(post_images::post_id.eq(post_id))
            .select(PostImage::as_select())
            .load(&mut conn)?
    };

    for image in &images {
        state.storage.delete_quietly(&image.url).await;
    }

    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;
    diesel::delete(posts::table.find(post_id)).execute(&mut conn)?;

    tracing::info!(post_id = %post_id, user_id = %auth_user.id, "post deleted");
    Ok(Json(ApiResponse::ok(MessageBody::new("Post deleted successfully"))))
}

fn default_page() -> i64 {
    1
}

fn default_feed_limit() -> i64 {
    10
}

#[derive(Debug, Deserialize)]
pub struct FeedQuery {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_feed_limit")]
    pub limit: i64,
}

/// GET /post/feed
pub async fn post_feed(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Query(query): Query<FeedQuery>,
) -> AppResult<Json<ApiResponse<Vec<PostDetails>>>> {
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;
    let items = post_service::unseen_first_feed(&mut conn, auth_user.id, query.page, query.limit)?;
    Ok(Json(ApiResponse::ok(items)))
}

#[derive(Debug, Serialize, PartialEq)]
pub struct SeenResponse {
    pub message: &'static str,
    pub status: &'static str,
}

impl SeenResponse {
    fn from_first_view(first: bool) -> Self {
        if first {
            Self { message: "First time seen, count incremented", status: "new" }
        } else {
            Self { message: "Already seen", status: "existing" }
        }
    }
}

/// POST /post/:id/seen
pub async fn mark_seen(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Path(post_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<SeenResponse>>> {
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;
    let first = like_service::record_view(&mut conn, post_id, auth_user.id, FeedType::Post)?
        .ok_or_else(|| AppError::new(ErrorCode::PostNotFound, "Post not found"))?;
    Ok(Json(ApiResponse::ok(SeenResponse::from_first_view(first))))
}

/// POST /post/:id/like
pub async fn toggle_like(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Path(post_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<ToggleOutcome>>> {
    let outcome = like_service::toggle(&state, post_id, auth_user.id, FeedType::Post)?;
    Ok(Json(ApiResponse::ok(outcome)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seen_response_reports_first_views() {
        assert_eq!(SeenResponse::from_first_view(true).status, "new");
        assert_eq!(SeenResponse::from_first_view(false).message, "Already seen");
    }

    #[test]
    fn feed_query_defaults() {
        let q: FeedQuery = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!((q.page, q.limit), (1, 10));
    }
}
