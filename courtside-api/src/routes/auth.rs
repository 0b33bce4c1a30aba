use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Multipart, Path, State};
use axum::http::{header, HeaderMap};
use axum::Json;
use chrono::{DateTime, NaiveDate, Utc};
use diesel::dsl::{count_star, sum};
use diesel::prelude::*;
use diesel::PgConnection;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use courtside_shared::clients::email::OtpPurpose;
use courtside_shared::errors::{AppError, AppResult, ErrorCode};
use courtside_shared::types::api::{ApiResponse, MessageBody};
use courtside_shared::types::auth::{AuthUser, SubscriptionTier, TokenPair, UserRole};

use crate::models::{Highlight, LoginSession, NewUser, ProfileChanges, User};
use crate::routes::upload::MultipartForm;
use crate::schema::{highlights, login_sessions, organizations, users};
use crate::services::session_service::{self, GeoLocation, SessionContext};
use crate::services::{auth_service, token_service, upload_service};
use crate::AppState;

const PROFILE_IMAGE_FOLDER: &str = "profiles/images";
const OTP_RATE_LIMIT_WINDOW_SECS: u64 = 60;

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user: User,
    pub tokens: TokenPair,
}

// --- Register / login ---

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 1, message = "full name is required"))]
    pub athlete_full_name: String,
    pub date_of_birth: NaiveDate,
    #[validate(email(message = "invalid email format"))]
    pub email: String,
    #[validate(length(min = 6, message = "password must be at least 6 characters"))]
    pub password: String,
    pub parent_name: Option<String>,
    #[validate(email(message = "invalid parent email format"))]
    pub parent_email: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub bio: Option<String>,
    pub grad_year: Option<i32>,
    pub position: Option<String>,
    pub height: Option<f64>,
    pub weight: Option<f64>,
    pub school: Option<String>,
    pub gpa: Option<f64>,
    pub fcm_token: Option<String>,
    pub role: Option<UserRole>,
    pub organization_code: Option<String>,
    pub referred_by: Option<String>,
}

/// POST /auth/register
pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> AppResult<Json<ApiResponse<AuthResponse>>> {
    req.validate()
        .map_err(|e| AppError::new(ErrorCode::ValidationError, e.to_string()))?;

    let role = match req.role.unwrap_or(UserRole::Athlete) {
        UserRole::Admin => return Err(AppError::forbidden("Admin accounts cannot be self-registered")),
        role => role,
    };

    let email = req.email.trim().to_lowercase();
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;

    if auth_service::email_taken(&mut conn, &email)? {
        return Err(AppError::new(ErrorCode::EmailAlreadyExists, "Email is already registered!"));
    }

    let organization_code = req
        .organization_code
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty());
    if let Some(code) = &organization_code {
        let bumped = diesel::update(organizations::table.filter(organizations::organization_code.eq(code)))
            .set(organizations::unique_visitors.eq(organizations::unique_visitors + 1))
            .execute(&mut conn)?;
        if bumped == 0 {
            tracing::warn!(organization_code = %code, "registration with unknown organization code");
        }
    }

    let id = Uuid::now_v7();
    let user: User = diesel::insert_into(users::table)
        .values(&NewUser {
            id,
            athlete_full_name: req.athlete_full_name.trim().to_string(),
            date_of_birth: req.date_of_birth,
            email: email.clone(),
            password_hash: auth_service::hash_password(&req.password)?,
            img_url: None,
            parent_name: req.parent_name,
            parent_email: req.parent_email,
            city: req.city,
            state: req.state,
            bio: req.bio,
            grad_year: req.grad_year,
            position: req.position,
            height: req.height,
            weight: req.weight,
            school: req.school,
            gpa: req.gpa,
            fcm_token: req.fcm_token,
            role: role.as_str().to_string(),
            subscribe_status: SubscriptionTier::Free.as_str().to_string(),
            is_active: true,
            referral_code: Some(auth_service::generate_referral_code()),
            referred_by: req.referred_by,
            organization_code,
            profile_link: Some(state.config.profile_link(id)),
        })
        .returning(User::as_returning())
        .get_result(&mut conn)?;

    let tokens = token_service::issue_token_pair(&mut conn, &user, &state.config)?;

    tracing::info!(user_id = %user.id, email = %user.email, "user registered");

    Ok(Json(ApiResponse::ok_with_message(
        AuthResponse { user, tokens },
        "User registered successfully",
    )))
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// POST /auth/login
pub async fn login(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(req): Json<LoginRequest>,
) -> AppResult<Json<ApiResponse<AuthResponse>>> {
    let invalid = || AppError::new(ErrorCode::InvalidCredentials, "Invalid credentials");

    let user: User = {
        let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;
        users::table
            .filter(users::email.eq(req.email.trim().to_lowercase()))
            .select(User::as_select())
            .first(&mut conn)
            .optional()?
            .ok_or_else(invalid)?
    };

    if !auth_service::verify_password(&req.password, &user.password_hash)? {
        return Err(invalid());
    }
    if user.is_deleted {
        return Err(AppError::new(ErrorCode::UserDeleted, "User is deleted!"));
    }

    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let ip = session_service::client_ip(&headers, Some(peer));
    let geo = if state.config.geoip_enabled {
        session_service::lookup_geo(&state.http_client, &ip).await
    } else {
        GeoLocation::default()
    };

    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;
    if let Err(e) = session_service::record_session(&mut conn, user.id, SessionContext { user_agent, ip, geo }) {
        tracing::warn!(user_id = %user.id, error = %e, "failed to record login session");
    }

    let tokens = token_service::issue_token_pair(&mut conn, &user, &state.config)?;

    tracing::info!(user_id = %user.id, "user logged in");

    Ok(Json(ApiResponse::ok_with_message(
        AuthResponse { user, tokens },
        "Login successful",
    )))
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// POST /auth/refresh-token
pub async fn refresh_token(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RefreshRequest>,
) -> AppResult<Json<ApiResponse<TokenPair>>> {
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;

    let stored = token_service::consume_refresh_token(&mut conn, &req.refresh_token)?;
    let user = auth_service::find_live_user(&mut conn, stored.user_id)
        .map_err(|_| AppError::new(ErrorCode::TokenInvalid, "Invalid refresh token"))?;

    let tokens = token_service::issue_token_pair(&mut conn, &user, &state.config)?;
    tracing::info!(user_id = %user.id, "tokens refreshed");

    Ok(Json(ApiResponse::ok(tokens)))
}

/// POST /auth/logout
pub async fn logout(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Json(req): Json<RefreshRequest>,
) -> AppResult<Json<ApiResponse<MessageBody>>> {
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;
    let revoked = token_service::revoke_by_value(&mut conn, &req.refresh_token)?;

    tracing::info!(user_id = %auth_user.id, revoked, "user logged out");
    Ok(Json(ApiResponse::ok(MessageBody::new("Logged out successfully"))))
}

// --- Password and profile ---

#[derive(Debug, Deserialize, Validate)]
pub struct ChangePasswordRequest {
    pub old_password: String,
    #[validate(length(min = 6, message = "password must be at least 6 characters"))]
    pub new_password: String,
}

fn load_user_for_update(conn: &mut PgConnection, user_id: Uuid) -> AppResult<User> {
    let user: User = users::table
        .find(user_id)
        .select(User::as_select())
        .first(conn)
        .optional()?
        .ok_or_else(|| AppError::new(ErrorCode::UserNotFound, "User not found"))?;
    if user.is_deleted {
        return Err(AppError::new(ErrorCode::UserDeleted, "User is deleted!"));
    }
    Ok(user)
}

/// PATCH /auth/change-password
pub async fn change_password(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Json(req): Json<ChangePasswordRequest>,
) -> AppResult<Json<ApiResponse<MessageBody>>> {
    req.validate()
        .map_err(|e| AppError::new(ErrorCode::ValidationError, e.to_string()))?;

    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;
    let user = load_user_for_update(&mut conn, auth_user.id)?;

    if !auth_service::verify_password(&req.old_password, &user.password_hash)? {
        return Err(AppError::bad_request("Old password is incorrect"));
    }

    diesel::update(users::table.find(user.id))
        .set((
            users::password_hash.eq(auth_service::hash_password(&req.new_password)?),
            users::updated_at.eq(Utc::now()),
        ))
        .execute(&mut conn)?;

    tracing::info!(user_id = %user.id, "password changed");
    Ok(Json(ApiResponse::ok(MessageBody::new("Password changed successfully"))))
}

/// PATCH /auth/update-profile
pub async fn update_profile(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Json(mut changes): Json<ProfileChanges>,
) -> AppResult<Json<ApiResponse<User>>> {
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;
    let user = load_user_for_update(&mut conn, auth_user.id)?;

    if let Some(email) = changes.email.take() {
        let email = email.trim().to_lowercase();
        if email != user.email {
            if auth_service::email_taken(&mut conn, &email)? {
                return Err(AppError::new(ErrorCode::EmailAlreadyExists, "Email is already registered!"));
            }
            changes.email = Some(email);
        }
    }

    let updated = diesel::update(users::table.find(user.id))
        .set((&changes, users::updated_at.eq(Utc::now())))
        .returning(User::as_returning())
        .get_result(&mut conn)?;

    tracing::info!(user_id = %user.id, "profile updated");
    Ok(Json(ApiResponse::ok_with_message(updated, "Profile updated successfully")))
}

/// PATCH /auth/update-profile/image
pub async fn update_profile_image(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
    multipart: Multipart,
) -> AppResult<Json<ApiResponse<User>>> {
    let mut form = MultipartForm::read(multipart).await?;
    let file = form
        .take_files("image")
        .into_iter()
        .next()
        .ok_or_else(|| AppError::bad_request("Image is required"))?;

    let previous = {
        let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;
        load_user_for_update(&mut conn, auth_user.id)?.img_url
    };

    let object = upload_service::store(&state.storage, PROFILE_IMAGE_FOLDER, file).await?;

    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;
    let updated: User = diesel::update(users::table.find(auth_user.id))
        .set((users::img_url.eq(Some(&object.url)), users::updated_at.eq(Utc::now())))
        .returning(User::as_returning())
        .get_result(&mut conn)?;

    if let Some(old) = previous.filter(|old| *old != object.url) {
        state.storage.delete_quietly(&old).await;
    }

    tracing::info!(user_id = %auth_user.id, "profile image updated");
    Ok(Json(ApiResponse::ok_with_message(updated, "Profile image updated successfully")))
}

// --- OTP flows ---

#[derive(Debug, Deserialize)]
pub struct EmailRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct OtpRequest {
    pub email: String,
    pub otp: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ResetPasswordRequest {
    pub email: String,
    pub otp: String,
    #[validate(length(min = 6, message = "password must be at least 6 characters"))]
    pub new_password: String,
}

async fn enforce_otp_rate_limit(state: &AppState, email: &str) -> AppResult<()> {
    match state
        .redis
        .rate_limit_check(&format!("otp:{email}"), 1, OTP_RATE_LIMIT_WINDOW_SECS)
        .await
    {
        Ok(true) => Ok(()),
        Ok(false) => Err(AppError::new(
            ErrorCode::RateLimited,
            "Please wait a minute before requesting another code",
        )),
        Err(e) => {
            tracing::warn!(error = %e, "otp rate limit check failed, allowing request");
            Ok(())
        }
    }
}

async fn send_code(state: &AppState, email: &str, purpose: OtpPurpose) -> AppResult<()> {
    let code = {
        let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;
        auth_service::issue_otp(&mut conn, email)?
    };
    state.email.send_otp(email, &code, purpose).await.map_err(|e| {
        tracing::error!(email = %email, error = %e, "failed to send otp email");
        AppError::new(ErrorCode::ServiceUnavailable, "Failed to send verification code")
    })
}

/// POST /auth/forgot-password
pub async fn forgot_password(
    State(state): State<Arc<AppState>>,
    Json(req): Json<EmailRequest>,
) -> AppResult<Json<ApiResponse<MessageBody>>> {
    let email = req.email.trim().to_lowercase();
    enforce_otp_rate_limit(&state, &email).await?;

    {
        let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;
        auth_service::find_live_user_by_email(&mut conn, &email)?;
    }
    send_code(&state, &email, OtpPurpose::ResetPassword).await?;

    tracing::info!(email = %email, "password reset code sent");
    Ok(Json(ApiResponse::ok(MessageBody::new("OTP sent to your email"))))
}

/// POST /auth/verify-otp
pub async fn verify_otp(
    State(state): State<Arc<AppState>>,
    Json(req): Json<OtpRequest>,
) -> AppResult<Json<ApiResponse<MessageBody>>> {
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;
    auth_service::verify_otp(&mut conn, &req.email, &req.otp, false)?;
    Ok(Json(ApiResponse::ok(MessageBody::new("OTP verified successfully"))))
}

/// POST /auth/forget-reset-password
pub async fn reset_password(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ResetPasswordRequest>,
) -> AppResult<Json<ApiResponse<MessageBody>>> {
    req.validate()
        .map_err(|e| AppError::new(ErrorCode::ValidationError, e.to_string()))?;

    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;
    let user = auth_service::find_live_user_by_email(&mut conn, &req.email)?;
    auth_service::verify_otp(&mut conn, &req.email, &req.otp, true)?;

    diesel::update(users::table.find(user.id))
        .set((
            users::password_hash.eq(auth_service::hash_password(&req.new_password)?),
            users::updated_at.eq(Utc::now()),
        ))
        .execute(&mut conn)?;

    tracing::info!(user_id = %user.id, "password reset");
    Ok(Json(ApiResponse::ok(MessageBody::new("Password reset successful"))))
}

/// POST /auth/verify-email
pub async fn verify_email(
    State(state): State<Arc<AppState>>,
    Json(req): Json<OtpRequest>,
) -> AppResult<Json<ApiResponse<MessageBody>>> {
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;
    auth_service::verify_otp(&mut conn, &req.email, &req.otp, true)?;

    let user = auth_service::find_live_user_by_email(&mut conn, &req.email)?;
    if !user.is_active {
        diesel::update(users::table.find(user.id))
            .set((users::is_active.eq(true), users::updated_at.eq(Utc::now())))
            .execute(&mut conn)?;
        tracing::info!(user_id = %user.id, "account verified");
    }

    Ok(Json(ApiResponse::ok(MessageBody::new("Account verified successfully"))))
}

/// POST /auth/resend-otp
pub async fn resend_otp(
    State(state): State<Arc<AppState>>,
    Json(req): Json<EmailRequest>,
) -> AppResult<Json<ApiResponse<MessageBody>>> {
    let email = req.email.trim().to_lowercase();
    enforce_otp_rate_limit(&state, &email).await?;

    let user = {
        let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;
        auth_service::find_live_user_by_email(&mut conn, &email)?
    };
    if user.is_active {
        return Err(AppError::new(ErrorCode::AccountAlreadyVerified, "Account already verified"));
    }

    send_code(&state, &email, OtpPurpose::VerifyEmail).await?;
    Ok(Json(ApiResponse::ok(MessageBody::new("OTP resent successfully"))))
}

// --- Users ---

/// GET /auth/me
pub async fn me(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
) -> AppResult<Json<ApiResponse<User>>> {
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;
    let user = auth_service::find_live_user(&mut conn, auth_user.id)
        .map_err(|_| AppError::bad_request("User not Found"))?;
    Ok(Json(ApiResponse::ok(user)))
}

/// GET /auth/users
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    _auth_user: AuthUser,
) -> AppResult<Json<ApiResponse<Vec<User>>>> {
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;
    let items = users::table
        .filter(users::is_deleted.eq(false))
        .order(users::created_at.desc())
        .select(User::as_select())
        .load(&mut conn)?;
    Ok(Json(ApiResponse::ok(items)))
}

fn find_visible_user(conn: &mut PgConnection, user_id: Uuid) -> AppResult<User> {
    users::table
        .find(user_id)
        .filter(users::is_deleted.eq(false))
        .filter(users::is_active.eq(true))
        .select(User::as_select())
        .first(conn)
        .optional()?
        .ok_or_else(|| AppError::new(ErrorCode::UserNotFound, "User not found"))
}

#[derive(Debug, Serialize)]
pub struct PublicProfile {
    #[serde(flatten)]
    pub user: User,
    pub highlights: Vec<Highlight>,
    pub highlight_count: usize,
}

/// GET /auth/users/:id
pub async fn public_profile(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<PublicProfile>>> {
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;
    let user = find_visible_user(&mut conn, user_id)?;

    let items: Vec<Highlight> = highlights::table
        .filter(highlights::user_id.eq(user_id))
        .order((highlights::updated_at.desc(), highlights::created_at.desc()))
        .select(Highlight::as_select())
        .load(&mut conn)?;

    Ok(Json(ApiResponse::ok(PublicProfile {
        user,
        highlight_count: items.len(),
        highlights: items,
    })))
}

/// PATCH /auth/profile-view/:id
pub async fn profile_view(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Path(user_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<User>>> {
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;
    let target = find_visible_user(&mut conn, user_id)?;

    if target.id == auth_user.id {
        return Ok(Json(ApiResponse::ok_with_message(target, "Own profile views are not counted")));
    }

    let updated = diesel::update(users::table.find(user_id))
        .set((
            users::profile_views.eq(users::profile_views + 1),
            users::last_viewed.eq(Some(Utc::now())),
        ))
        .returning(User::as_returning())
        .get_result(&mut conn)?;

    Ok(Json(ApiResponse::ok_with_message(updated, "Profile view recorded")))
}

#[derive(Debug, Serialize)]
pub struct HighlightTotals {
    pub total_count: i64,
    pub total_views: i64,
    pub total_likes: i64,
}

#[derive(Debug, Serialize)]
pub struct ProfileStats {
    pub profile_views: i32,
    pub last_viewed: Option<DateTime<Utc>>,
    pub highlights: HighlightTotals,
}

/// GET /auth/me/stats
pub async fn my_stats(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
) -> AppResult<Json<ApiResponse<ProfileStats>>> {
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;
    let user = auth_service::find_live_user(&mut conn, auth_user.id)?;

    let (total_count, total_views, total_likes): (i64, Option<i64>, Option<i64>) = highlights::table
        .filter(highlights::user_id.eq(user.id))
        .select((count_star(), sum(highlights::views), sum(highlights::likes)))
        .first(&mut conn)?;

    Ok(Json(ApiResponse::ok(ProfileStats {
        profile_views: user.profile_views,
        last_viewed: user.last_viewed,
        highlights: HighlightTotals {
            total_count,
            total_views: total_views.unwrap_or(0),
            total_likes: total_likes.unwrap_or(0),
        },
    })))
}

/// GET /auth/login-sessions
pub async fn login_sessions(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
) -> AppResult<Json<ApiResponse<Vec<LoginSession>>>> {
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;
    let sessions = login_sessions::table
        .filter(login_sessions::user_id.eq(auth_user.id))
        .order(login_sessions::last_active.desc())
        .select(LoginSession::as_select())
        .load(&mut conn)?;
    Ok(Json(ApiResponse::ok(sessions)))
}
