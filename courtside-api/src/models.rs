use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use courtside_shared::types::auth::{SubscriptionTier, UserRole};

use crate::schema::{
    attachments, comments, conversations, highlight_likes, highlight_views, highlights,
    login_sessions, messages, notifications, organizations, otp_codes, plans, post_images,
    post_likes, post_views, posts, refresh_tokens, subscriptions, transactions, users,
};

// --- Users ---

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Serialize)]
#[diesel(table_name = users)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct User {
    pub id: Uuid,
    pub athlete_full_name: String,
    pub date_of_birth: NaiveDate,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub img_url: Option<String>,
    pub parent_name: Option<String>,
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
    pub ppg: Option<f64>,
    pub rpg: Option<f64>,
    pub apg: Option<f64>,
    pub spg: Option<f64>,
    pub blk: Option<f64>,
    #[serde(skip_serializing)]
    pub fcm_token: Option<String>,
    pub agreed_to_terms: bool,
    pub role: String,
    pub subscribe_status: String,
    pub is_active: bool,
    pub is_deleted: bool,
    pub referral_code: Option<String>,
    pub referred_by: Option<String>,
    pub organization_code: Option<String>,
    pub profile_link: Option<String>,
    pub profile_views: i32,
    pub last_viewed: Option<DateTime<Utc>>,
    #[serde(skip_serializing)]
    pub stripe_customer_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn role(&self) -> UserRole {
        self.role.parse().unwrap_or(UserRole::Athlete)
    }

    pub fn tier(&self) -> SubscriptionTier {
        self.subscribe_status.parse().unwrap_or(SubscriptionTier::Free)
    }

    pub fn is_admin(&self) -> bool {
        self.role() == UserRole::Admin
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub id: Uuid,
    pub athlete_full_name: String,
    pub date_of_birth: NaiveDate,
    pub email: String,
    pub password_hash: String,
    pub img_url: Option<String>,
    pub parent_name: Option<String>,
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
    pub role: String,
    pub subscribe_status: String,
    pub is_active: bool,
    pub referral_code: Option<String>,
    pub referred_by: Option<String>,
    pub organization_code: Option<String>,
    pub profile_link: Option<String>,
}

/// Partial profile update. `None` leaves the column untouched.
#[derive(Debug, Default, AsChangeset, Deserialize)]
#[diesel(table_name = users)]
pub struct ProfileChanges {
    pub athlete_full_name: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub email: Option<String>,
    pub parent_name: Option<String>,
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
    pub ppg: Option<f64>,
    pub rpg: Option<f64>,
    pub apg: Option<f64>,
    pub spg: Option<f64>,
    pub blk: Option<f64>,
    pub fcm_token: Option<String>,
    pub agreed_to_terms: Option<bool>,
}

/// Author block embedded in posts, comments, highlights and chat payloads.
#[derive(Debug, Clone, Queryable, Selectable, Serialize, PartialEq)]
#[diesel(table_name = users)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct UserSummary {
    pub id: Uuid,
    pub athlete_full_name: String,
    pub img_url: Option<String>,
    pub is_active: bool,
    pub subscribe_status: String,
}

// --- Sessions & tokens ---

#[derive(Debug, Queryable, Selectable, Identifiable)]
#[diesel(table_name = refresh_tokens)]
pub struct RefreshToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = refresh_tokens)]
pub struct NewRefreshToken {
    pub user_id: Uuid,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Queryable, Selectable, Identifiable)]
#[diesel(table_name = otp_codes)]
pub struct OtpCode {
    pub id: Uuid,
    pub email: String,
    pub code_hash: String,
    pub expires_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = otp_codes)]
pub struct NewOtpCode {
    pub email: String,
    pub code_hash: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Queryable, Selectable, Identifiable, Serialize)]
#[diesel(table_name = login_sessions)]
pub struct LoginSession {
    pub id: Uuid,
    #[serde(skip_serializing)]
    pub user_id: Uuid,
    pub device: String,
    pub os: String,
    pub browser: String,
    pub ip_address: String,
    pub city: Option<String>,
    pub region: Option<String>,
    pub country: Option<String>,
    pub is_active: bool,
    pub last_active: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = login_sessions)]
pub struct NewLoginSession {
    pub user_id: Uuid,
    pub device: String,
    pub os: String,
    pub browser: String,
    pub ip_address: String,
    pub city: Option<String>,
    pub region: Option<String>,
    pub country: Option<String>,
    pub is_active: bool,
    pub last_active: DateTime<Utc>,
}

// --- Posts ---

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Serialize)]
#[diesel(table_name = posts)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Post {
    pub id: Uuid,
    pub user_id: Uuid,
    pub caption: Option<String>,
    pub likes: i32,
    pub view_count: i32,
    pub comments: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = posts)]
pub struct NewPost {
    pub id: Uuid,
    pub user_id: Uuid,
    pub caption: Option<String>,
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Associations, Serialize)]
#[diesel(belongs_to(Post))]
#[diesel(table_name = post_images)]
pub struct PostImage {
    pub id: Uuid,
    #[serde(skip_serializing)]
    pub post_id: Uuid,
    pub url: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = post_images)]
pub struct NewPostImage {
    pub post_id: Uuid,
    pub url: String,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = post_likes)]
pub struct NewPostLike {
    pub user_id: Uuid,
    pub post_id: Uuid,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = post_views)]
pub struct NewPostView {
    pub user_id: Uuid,
    pub post_id: Uuid,
}

// --- Comments ---

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Serialize)]
#[diesel(table_name = comments)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Comment {
    pub id: Uuid,
    pub post_id: Uuid,
    pub user_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = comments)]
pub struct NewComment {
    pub id: Uuid,
    pub post_id: Uuid,
    pub user_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub content: String,
}

// --- Highlights ---

/// One uploaded clip. Stored as an element of `highlights.clips`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Clip {
    pub key: String,
    pub s3_key: String,
    pub url: String,
    pub order: i32,
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Serialize)]
#[diesel(table_name = highlights)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Highlight {
    pub id: Uuid,
    pub user_id: Uuid,
    pub caption: Option<String>,
    pub description: Option<String>,
    pub merged_video_url: Option<String>,
    pub clips: serde_json::Value,
    pub is_processing: bool,
    pub high_lights_link: Option<String>,
    pub likes: i32,
    pub views: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Highlight {
    pub fn clip_list(&self) -> Vec<Clip> {
        serde_json::from_value(self.clips.clone()).unwrap_or_default()
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = highlights)]
pub struct NewHighlight {
    pub id: Uuid,
    pub user_id: Uuid,
    pub caption: Option<String>,
    pub description: Option<String>,
    pub is_processing: bool,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = highlight_likes)]
pub struct NewHighlightLike {
    pub user_id: Uuid,
    pub highlight_id: Uuid,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = highlight_views)]
pub struct NewHighlightView {
    pub user_id: Uuid,
    pub highlight_id: Uuid,
}

// --- Notifications ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    Like,
    Comment,
    NewPost,
    Reply,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Like => "LIKE",
            NotificationKind::Comment => "COMMENT",
            NotificationKind::NewPost => "NEW_POST",
            NotificationKind::Reply => "REPLY",
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Serialize)]
#[diesel(table_name = notifications)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Notification {
    pub id: Uuid,
    pub recipient_id: Uuid,
    pub sender_id: Option<Uuid>,
    pub post_id: Option<Uuid>,
    pub highlight_id: Option<Uuid>,
    pub title: String,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = notifications)]
pub struct NewNotification {
    pub recipient_id: Uuid,
    pub sender_id: Option<Uuid>,
    pub post_id: Option<Uuid>,
    pub highlight_id: Option<Uuid>,
    pub title: String,
    pub message: String,
    pub kind: String,
}

// --- Chat ---

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Serialize)]
#[diesel(table_name = conversations)]
pub struct Conversation {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Serialize)]
#[diesel(table_name = messages)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub content: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = messages)]
pub struct NewMessage {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub content: Option<String>,
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Serialize)]
#[diesel(table_name = attachments)]
pub struct Attachment {
    pub id: Uuid,
    #[serde(skip_serializing)]
    pub message_id: Uuid,
    pub file_url: String,
    pub file_type: String,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = attachments)]
pub struct NewAttachment {
    pub message_id: Uuid,
    pub file_url: String,
    pub file_type: String,
}

// --- Organizations ---

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Serialize)]
#[diesel(table_name = organizations)]
pub struct Organization {
    pub id: Uuid,
    pub organization_code: String,
    pub name: String,
    pub email: String,
    pub access_url: String,
    pub image_url: Option<String>,
    pub total_clicks: i32,
    pub unique_visitors: i32,
    pub last_accessed: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = organizations)]
pub struct NewOrganization {
    pub organization_code: String,
    pub name: String,
    pub email: String,
    pub access_url: String,
}

// --- Billing ---

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Serialize)]
#[diesel(table_name = plans)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Plan {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub price: f64,
    pub currency: String,
    pub interval: String,
    pub features: serde_json::Value,
    pub is_popular: bool,
    pub stripe_product_id: Option<String>,
    pub stripe_price_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = plans)]
pub struct NewPlan {
    pub name: String,
    pub description: String,
    pub price: f64,
    pub currency: String,
    pub interval: String,
    pub features: serde_json::Value,
    pub is_popular: bool,
    pub stripe_product_id: Option<String>,
    pub stripe_price_id: String,
}

#[derive(Debug, Default, AsChangeset)]
#[diesel(table_name = plans)]
pub struct PlanChanges {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<f64>,
    pub currency: Option<String>,
    pub features: Option<serde_json::Value>,
    pub is_popular: Option<bool>,
    pub stripe_price_id: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Serialize)]
#[diesel(table_name = subscriptions)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Subscription {
    pub id: Uuid,
    pub user_id: Uuid,
    pub plan_id: Uuid,
    pub transaction_id: String,
    pub status: String,
    pub stripe_subscription_id: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = subscriptions)]
pub struct NewSubscription {
    pub user_id: Uuid,
    pub plan_id: Uuid,
    pub transaction_id: String,
    pub status: String,
    pub stripe_subscription_id: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Serialize)]
#[diesel(table_name = transactions)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct PaymentTransaction {
    pub id: Uuid,
    pub user_id: Uuid,
    pub subscription_id: Option<Uuid>,
    pub plan_id: Option<Uuid>,
    pub transaction_id: String,
    pub amount: f64,
    pub currency: String,
    pub status: String,
    pub receipt_url: Option<String>,
    pub billing_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = transactions)]
pub struct NewPaymentTransaction {
    pub user_id: Uuid,
    pub subscription_id: Option<Uuid>,
    pub plan_id: Option<Uuid>,
    pub transaction_id: String,
    pub amount: f64,
    pub currency: String,
    pub status: String,
    pub receipt_url: Option<String>,
}
