use std::sync::Arc;

use axum::extract::{Multipart, Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use courtside_shared::errors::{AppError, AppResult};
use courtside_shared::types::api::ApiResponse;
use courtside_shared::types::auth::AuthUser;

use crate::routes::upload::MultipartForm;
use crate::services::chat_service::{self, ConversationSummary, ConversationView, MessageView};
use crate::services::upload_service::{self, AttachmentKind};
use crate::AppState;

const MAX_CHAT_FILES: usize = 10;

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default = "default_history_limit")]
    pub limit: i64,
    #[serde(default)]
    pub skip: i64,
}

fn default_history_limit() -> i64 {
    50
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_list_limit")]
    pub limit: i64,
    #[serde(default)]
    pub skip: i64,
}

fn default_list_limit() -> i64 {
    20
}

#[derive(Debug, Serialize)]
pub struct ChatUpload {
    pub url: String,
    #[serde(rename = "type")]
    pub kind: AttachmentKind,
}

/// POST /chat/start/:receiver_id
pub async fn start_chat(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Path(receiver_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<ConversationView>>> {
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;
    let view = chat_service::start_chat(&mut conn, auth_user.id, receiver_id)?;
    Ok(Json(ApiResponse::ok(view)))
}

/// GET /chat/history/:contact_id
pub async fn history(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Path(contact_id): Path<Uuid>,
    Query(query): Query<HistoryQuery>,
) -> AppResult<Json<ApiResponse<Vec<MessageView>>>> {
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;
    let items = chat_service::history(&mut conn, auth_user.id, contact_id, query.limit, query.skip)?;
    Ok(Json(ApiResponse::ok(items)))
}

/// GET /chat/list
pub async fn list_conversations(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Query(query): Query<ListQuery>,
) -> AppResult<Json<ApiResponse<Vec<ConversationSummary>>>> {
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;
    let items = chat_service::list_conversations(&mut conn, auth_user.id, query.limit, query.skip)?;
    Ok(Json(ApiResponse::ok(items)))
}

/// POST /chat/upload
pub async fn upload_files(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
    multipart: Multipart,
) -> AppResult<Json<ApiResponse<Vec<ChatUpload>>>> {
    let mut form = MultipartForm::read(multipart).await?;
    let files = form.take_files("files");
    if files.len() > MAX_CHAT_FILES {
        return Err(AppError::bad_request(format!("At most {MAX_CHAT_FILES} files can be uploaded")));
    }

    let mut uploaded = Vec::with_capacity(files.len());
    for file in files {
        let kind = AttachmentKind::from_mime(&file.content_type);
        let object = upload_service::store(&state.storage, kind.chat_folder(), file).await?;
        uploaded.push(ChatUpload { url: object.url, kind });
    }

    tracing::info!(user_id = %auth_user.id, files = uploaded.len(), "chat files uploaded");
    Ok(Json(ApiResponse::ok(uploaded)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_defaults() {
        let h: HistoryQuery = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!((h.limit, h.skip), (50, 0));
        let l: ListQuery = serde_json::from_value(serde_json::json!({ "skip": 40 })).unwrap();
        assert_eq!((l.limit, l.skip), (20, 40));
    }

    #[test]
    fn upload_serializes_type_field() {
        let item = ChatUpload { url: "https://cdn/chat/images/a.png".into(), kind: AttachmentKind::Image };
        let v = serde_json::to_value(&item).unwrap();
        assert_eq!(v["type"], "IMAGE");
        assert_eq!(v["url"], "https://cdn/chat/images/a.png");
    }
}
