pub mod admin;
pub mod auth;
pub mod chat;
pub mod comment;
pub mod feed;
pub mod health;
pub mod highlights;
pub mod notifications;
pub mod organization;
pub mod post;
pub mod stripe;
pub mod upload;
