use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::types::ApiErrorResponse;

/// Application error codes following the pattern E{area}{sequence}
///
/// Ranges:
/// - E0xxx: Shared/infrastructure errors
/// - E1xxx: Identity errors
/// - E2xxx: Content errors (posts, comments, highlights)
/// - E3xxx: Chat errors
/// - E4xxx: Notification errors
/// - E5xxx: Billing errors
/// - E6xxx: Organization and admin errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    // Shared (E0xxx)
    InternalError,
    ValidationError,
    NotFound,
    Unauthorized,
    Forbidden,
    RateLimited,
    ServiceUnavailable,
    BadRequest,
    PayloadTooLarge,

    // Identity (E1xxx)
    InvalidCredentials,
    EmailAlreadyExists,
    UserDeleted,
    TokenExpired,
    TokenInvalid,
    RefreshTokenRevoked,
    OtpInvalid,
    OtpExpired,
    AccountAlreadyVerified,
    UserNotFound,
    SubscriptionRequired,

    // Content (E2xxx)
    PostNotFound,
    PostImageRequired,
    CommentNotFound,
    ParentCommentNotFound,
    HighlightNotFound,
    ClipNotFound,
    NotEnoughClips,
    UploadFailed,
    MergeFailed,

    // Chat (E3xxx)
    ConversationNotFound,
    CannotChatWithSelf,
    EmptyMessage,

    // Notification (E4xxx)
    NotificationNotFound,

    // Billing (E5xxx)
    PlanNotFound,
    InvalidPlan,
    SubscriptionNotFound,
    StripeError,
    WebhookSignatureInvalid,

    // Organization / admin (E6xxx)
    OrganizationNotFound,
    OrganizationCodeTaken,
    OrganizationEmailTaken,
    AdminImmutable,
}

impl ErrorCode {
    pub fn code(&self) -> &'static str {
        match self {
            // Shared
            Self::InternalError => "E0001",
            Self::ValidationError => "E0002",
            Self::NotFound => "E0003",
            Self::Unauthorized => "E0004",
            Self::Forbidden => "E0005",
            Self::RateLimited => "E0006",
            Self::ServiceUnavailable => "E0007",
            Self::BadRequest => "E0008",
            Self::PayloadTooLarge => "E0009",

            // Identity
            Self::InvalidCredentials => "E1001",
            Self::EmailAlreadyExists => "E1002",
            Self::UserDeleted => "E1003",
            Self::TokenExpired => "E1004",
            Self::TokenInvalid => "E1005",
            Self::RefreshTokenRevoked => "E1006",
            Self::OtpInvalid => "E1007",
            Self::OtpExpired => "E1008",
            Self::AccountAlreadyVerified => "E1009",
            Self::UserNotFound => "E1010",
            Self::SubscriptionRequired => "E1011",

            // Content
            Self::PostNotFound => "E2001",
            Self::PostImageRequired => "E2002",
            Self::CommentNotFound => "E2003",
            Self::ParentCommentNotFound => "E2004",
            Self::HighlightNotFound => "E2005",
            Self::ClipNotFound => "E2006",
            Self::NotEnoughClips => "E2007",
            Self::UploadFailed => "E2008",
            Self::MergeFailed => "E2009",

            // Chat
            Self::ConversationNotFound => "E3001",
            Self::CannotChatWithSelf => "E3002",
            Self::EmptyMessage => "E3003",

            // Notification
            Self::NotificationNotFound => "E4001",

            // Billing
            Self::PlanNotFound => "E5001",
            Self::InvalidPlan => "E5002",
            Self::SubscriptionNotFound => "E5003",
            Self::StripeError => "E5004",
            Self::WebhookSignatureInvalid => "E5005",

            // Organization / admin
            Self::OrganizationNotFound => "E6001",
            Self::OrganizationCodeTaken => "E6002",
            Self::OrganizationEmailTaken => "E6003",
            Self::AdminImmutable => "E6004",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InternalError | Self::ServiceUnavailable | Self::UploadFailed
            | Self::MergeFailed => StatusCode::INTERNAL_SERVER_ERROR,
            Self::StripeError => StatusCode::BAD_GATEWAY,
            Self::ValidationError | Self::BadRequest | Self::UserDeleted | Self::OtpInvalid
            | Self::OtpExpired | Self::AccountAlreadyVerified | Self::PostImageRequired
            | Self::ClipNotFound | Self::NotEnoughClips | Self::CannotChatWithSelf
            | Self::EmptyMessage | Self::InvalidPlan | Self::WebhookSignatureInvalid
            | Self::EmailAlreadyExists | Self::OrganizationCodeTaken
            | Self::OrganizationEmailTaken | Self::AdminImmutable => StatusCode::BAD_REQUEST,
            Self::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::NotFound | Self::UserNotFound | Self::PostNotFound | Self::CommentNotFound
            | Self::ParentCommentNotFound | Self::HighlightNotFound
            | Self::ConversationNotFound | Self::NotificationNotFound | Self::PlanNotFound
            | Self::SubscriptionNotFound | Self::OrganizationNotFound => StatusCode::NOT_FOUND,
            Self::Unauthorized | Self::TokenExpired | Self::TokenInvalid
            | Self::RefreshTokenRevoked => StatusCode::UNAUTHORIZED,
            Self::Forbidden | Self::InvalidCredentials
            | Self::SubscriptionRequired => StatusCode::FORBIDDEN,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{message}")]
    Known {
        code: ErrorCode,
        message: String,
        details: Option<serde_json::Value>,
    },

    #[error("internal server error")]
    Internal(#[from] anyhow::Error),

    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("validation error: {0}")]
    Validation(String),
}

impl AppError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Known {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(code: ErrorCode, message: impl Into<String>, details: serde_json::Value) -> Self {
        Self::Known {
            code,
            message: message.into(),
            details: Some(details),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::BadRequest, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Forbidden, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    /// The code this error renders with.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            AppError::Known { code, .. } => *code,
            AppError::Internal(_) => ErrorCode::InternalError,
            AppError::Database(diesel::result::Error::NotFound) => ErrorCode::NotFound,
            AppError::Database(_) => ErrorCode::InternalError,
            AppError::Validation(_) => ErrorCode::ValidationError,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_response) = match &self {
            AppError::Known { code, message, details } => {
                let status = code.status_code();
                let mut resp = ApiErrorResponse::new(code.code(), message);
                if let Some(d) = details {
                    resp = resp.with_details(d.clone());
                }
                (status, resp)
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiErrorResponse::new("E0001", "internal server error"),
                )
            }
            AppError::Database(err) => {
                tracing::error!(error = %err, "database error");
                match err {
                    diesel::result::Error::NotFound => (
                        StatusCode::NOT_FOUND,
                        ApiErrorResponse::new("E0003", "resource not found"),
                    ),
                    _ => (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        ApiErrorResponse::new("E0001", "database error"),
                    ),
                }
            }
            AppError::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                ApiErrorResponse::new("E0002", msg),
            ),
        };

        (status, Json(error_response)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_errors_render_their_status() {
        let resp = AppError::new(ErrorCode::PostNotFound, "Post not found").into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let resp = AppError::new(ErrorCode::InvalidCredentials, "Invalid credentials").into_response();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn diesel_not_found_maps_to_404() {
        let err = AppError::from(diesel::result::Error::NotFound);
        assert_eq!(err.error_code(), ErrorCode::NotFound);
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn codes_are_unique() {
        let all = [
            ErrorCode::InternalError,
            ErrorCode::BadRequest,
            ErrorCode::UserDeleted,
            ErrorCode::PostNotFound,
            ErrorCode::ConversationNotFound,
            ErrorCode::NotificationNotFound,
            ErrorCode::PlanNotFound,
            ErrorCode::OrganizationNotFound,
        ];
        let mut codes: Vec<_> = all.iter().map(|c| c.code()).collect();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), all.len());
    }
}
