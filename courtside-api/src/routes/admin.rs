use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{NaiveDate, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use courtside_shared::errors::{AppError, AppResult, ErrorCode};
use courtside_shared::middleware::AdminUser;
use courtside_shared::types::api::{ApiResponse, MessageBody};
use courtside_shared::types::auth::{SubscriptionTier, UserRole};
use courtside_shared::types::pagination::{PageMeta, PaginationParams};

use crate::models::{NewUser, User};
use crate::schema::{highlights, users};
use crate::services::admin_service::{self, DashboardStats, UserQuery};
use crate::services::auth_service;
use crate::AppState;

// --- Users ---

fn default_page() -> u64 {
    1
}

fn default_limit() -> u64 {
    10
}

#[derive(Debug, Deserialize)]
pub struct UsersQuery {
    pub role: Option<String>,
    pub search: Option<String>,
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_limit")]
    pub limit: u64,
}

impl UsersQuery {
    /// `all`, blank or an unknown value means no role filter.
    fn role_filter(&self) -> Option<UserRole> {
        self.role
            .as_deref()
            .filter(|r| !r.eq_ignore_ascii_case("all"))
            .and_then(|r| r.parse().ok())
    }
}

#[derive(Debug, Serialize)]
pub struct UserList {
    pub users: Vec<User>,
    pub pagination: PageMeta,
}

/// GET /admin/users
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Query(query): Query<UsersQuery>,
) -> AppResult<Json<ApiResponse<UserList>>> {
    let params = PaginationParams::new(query.page, query.limit);
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;

    let (users, total) = admin_service::search_users(
        &mut conn,
        &UserQuery {
            role: query.role_filter(),
            search: query.search.clone(),
            page: params.page as i64,
            limit: params.limit() as i64,
        },
    )?;

    Ok(Json(ApiResponse::ok(UserList {
        users,
        pagination: PageMeta::new(total.max(0) as u64, &params),
    })))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ManageAction {
    Delete,
    #[default]
    Deactivate,
}

#[derive(Debug, Default, Deserialize)]
pub struct ManageUserRequest {
    #[serde(default)]
    pub action: ManageAction,
}

/// POST /admin/manage-user/:user_id
pub async fn manage_user(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path(user_id): Path<Uuid>,
    body: Option<Json<ManageUserRequest>>,
) -> AppResult<Json<ApiResponse<MessageBody>>> {
    let action = body.map(|Json(b)| b.action).unwrap_or_default();
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;

    let target: User = users::table
        .find(user_id)
        .select(User::as_select())
        .first(&mut conn)
        .optional()?
        .ok_or_else(|| AppError::new(ErrorCode::UserNotFound, "User not found"))?;

    if target.is_admin() {
        return Err(AppError::new(ErrorCode::AdminImmutable, "Admin users cannot be modified"));
    }

    let now = Utc::now();
    let message = match action {
        ManageAction::Delete => {
            diesel::update(users::table.find(user_id))
                .set((users::is_deleted.eq(true), users::updated_at.eq(now)))
                .execute(&mut conn)?;
            "User deleted successfully"
        }
        ManageAction::Deactivate => {
            diesel::update(users::table.find(user_id))
                .set((users::is_active.eq(false), users::updated_at.eq(now)))
                .execute(&mut conn)?;
            "User deactivated successfully"
        }
    };

    tracing::info!(user_id = %user_id, admin_id = %admin.id, action = ?action, "user managed");
    Ok(Json(ApiResponse::ok(MessageBody::new(message))))
}

/// GET /admin/user-details/:user_id
pub async fn user_details(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Path(user_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<User>>> {
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;
    let user = auth_service::find_live_user(&mut conn, user_id)?;
    Ok(Json(ApiResponse::ok(user)))
}

#[derive(Debug, Serialize)]
pub struct UserOverview {
    #[serde(flatten)]
    pub user: User,
    pub total_highlights: i64,
    pub referred_users: Vec<User>,
}

/// GET /admin/userDetails/:id
pub async fn user_overview(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Path(user_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<UserOverview>>> {
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;
    let user = auth_service::find_live_user(&mut conn, user_id)?;

    let total_highlights: i64 = highlights::table
        .filter(highlights::user_id.eq(user_id))
        .count()
        .get_result(&mut conn)?;

    let referred_users = match user.referral_code.as_deref() {
        Some(code) => users::table
            .filter(users::referred_by.eq(code))
            .filter(users::is_deleted.eq(false))
            .order(users::created_at.desc())
            .select(User::as_select())
            .load(&mut conn)?,
        None => Vec::new(),
    };

    Ok(Json(ApiResponse::ok(UserOverview { user, total_highlights, referred_users })))
}

/// GET /admin/dashboard-stats
pub async fn dashboard_stats(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
) -> AppResult<Json<ApiResponse<DashboardStats>>> {
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;
    Ok(Json(ApiResponse::ok(admin_service::dashboard_stats(&mut conn)?)))
}

// --- Account creation ---

#[derive(Debug, Deserialize, Validate)]
pub struct AddUserRequest {
    #[validate(length(min = 1, message = "full name is required"))]
    pub athlete_full_name: String,
    pub date_of_birth: NaiveDate,
    #[validate(email(message = "invalid email format"))]
    pub email: String,
    #[validate(length(min = 6, message = "password must be at least 6 characters"))]
    pub password: String,
    pub role: Option<UserRole>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub school: Option<String>,
    pub position: Option<String>,
}

/// POST /admin/add-user
pub async fn add_user(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Json(req): Json<AddUserRequest>,
) -> AppResult<Json<ApiResponse<User>>> {
    req.validate()
        .map_err(|e| AppError::new(ErrorCode::ValidationError, e.to_string()))?;

    let email = req.email.trim().to_lowercase();
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;

    if auth_service::email_taken(&mut conn, &email)? {
        return Err(AppError::new(ErrorCode::EmailAlreadyExists, "Email is already registered!"));
    }

    let id = Uuid::now_v7();
    let user: User = diesel::insert_into(users::table)
        .values(&NewUser {
            id,
            athlete_full_name: req.athlete_full_name.trim().to_string(),
            date_of_birth: req.date_of_birth,
            email,
            password_hash: auth_service::hash_password(&req.password)?,
            img_url: None,
            parent_name: None,
            parent_email: None,
            city: req.city,
            state: req.state,
            bio: None,
            grad_year: None,
            position: req.position,
            height: None,
            weight: None,
            school: req.school,
            gpa: None,
            fcm_token: None,
            role: req.role.unwrap_or(UserRole::Athlete).as_str().to_string(),
            subscribe_status: SubscriptionTier::Free.as_str().to_string(),
            is_active: true,
            referral_code: Some(auth_service::generate_referral_code()),
            referred_by: None,
            organization_code: None,
            profile_link: Some(state.config.profile_link(id)),
        })
        .returning(User::as_returning())
        .get_result(&mut conn)?;

    tracing::info!(user_id = %user.id, admin_id = %admin.id, role = %user.role, "user added by admin");
    Ok(Json(ApiResponse::ok_with_message(user, "User created successfully")))
}

/// GET /admin/stats/subscribers
pub async fn subscriber_stats(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
) -> AppResult<Json<ApiResponse<BTreeMap<&'static str, i64>>>> {
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;
    let counts = admin_service::tier_counts(&mut conn)?
        .into_iter()
        .map(|(tier, count)| (tier.as_str(), count))
        .collect();
    Ok(Json(ApiResponse::ok(counts)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users_query(role: Option<&str>) -> UsersQuery {
        UsersQuery { role: role.map(str::to_string), search: None, page: 1, limit: 10 }
    }

    #[test]
    fn role_all_disables_filter() {
        assert_eq!(users_query(Some("all")).role_filter(), None);
        assert_eq!(users_query(None).role_filter(), None);
        assert_eq!(users_query(Some("athlete")).role_filter(), Some(UserRole::Athlete));
        assert_eq!(users_query(Some("ADMIN")).role_filter(), Some(UserRole::Admin));
    }

    #[test]
    fn manage_action_defaults_to_deactivate() {
        let req: ManageUserRequest = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(req.action, ManageAction::Deactivate);
        let req: ManageUserRequest = serde_json::from_value(serde_json::json!({ "action": "delete" })).unwrap();
        assert_eq!(req.action, ManageAction::Delete);
    }

    #[test]
    fn users_query_defaults() {
        let q: UsersQuery = serde_json::from_value(serde_json::json!({ "role": "all" })).unwrap();
        assert_eq!((q.page, q.limit), (1, 10));
    }
}
