pub mod access;
pub mod admin_service;
pub mod auth_service;
pub mod billing_service;
pub mod chat_service;
pub mod comment_service;
pub mod feed_service;
pub mod highlight_service;
pub mod like_service;
pub mod notification_service;
pub mod post_service;
pub mod session_service;
pub mod token_service;
pub mod upload_service;
