use diesel::prelude::*;
use diesel::PgConnection;
use uuid::Uuid;

use courtside_shared::clients::db::{DbConn, DbPool};
use courtside_shared::errors::{AppError, AppResult, ErrorCode};

use crate::models::{NewNotification, Notification, NotificationKind};
use crate::schema::notifications;
use crate::AppState;

pub const NOTIFICATION_EVENT: &str = "notification";

/// What a caller wants delivered. Post and highlight ids are optional context.
#[derive(Debug, Clone)]
pub struct NotificationDraft {
    pub recipient_id: Uuid,
    pub sender_id: Option<Uuid>,
    pub post_id: Option<Uuid>,
    pub highlight_id: Option<Uuid>,
    pub title: String,
    pub message: String,
    pub kind: NotificationKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadFilter {
    All,
    Unread,
    Read,
}

impl ReadFilter {
    fn limit(self) -> i64 {
        match self {
            ReadFilter::All => 50,
            ReadFilter::Unread | ReadFilter::Read => 20,
        }
    }
}

fn conn(pool: &DbPool) -> AppResult<DbConn> {
    pool.get().map_err(|e| {
        tracing::error!(error = %e, "failed to get db connection");
        AppError::internal("database connection error")
    })
}

/// Persists the notification on the caller's connection, then pushes it to the recipient's room.
pub fn create_and_send(state: &AppState, conn: &mut PgConnection, draft: NotificationDraft) -> AppResult<Notification> {
    let notification: Notification = diesel::insert_into(notifications::table)
        .values(&NewNotification {
            recipient_id: draft.recipient_id,
            sender_id: draft.sender_id,
            post_id: draft.post_id,
            highlight_id: draft.highlight_id,
            title: draft.title,
            message: draft.message,
            kind: draft.kind.as_str().to_string(),
        })
        .returning(Notification::as_returning())
        .get_result(conn)?;

    let room = format!("user:{}", notification.recipient_id);
    if let Err(e) = state.io.to(room).emit(NOTIFICATION_EVENT, &notification) {
        tracing::warn!(
            notification_id = %notification.id,
            error = %e,
            "notification stored but push failed"
        );
    }

    tracing::debug!(
        notification_id = %notification.id,
        recipient_id = %notification.recipient_id,
        kind = %notification.kind,
        "notification created"
    );

    Ok(notification)
}

/// Fan-out that never fails the caller.
pub fn notify(state: &AppState, conn: &mut PgConnection, draft: NotificationDraft) {
    let recipient = draft.recipient_id;
    if let Err(e) = create_and_send(state, conn, draft) {
        tracing::warn!(recipient_id = %recipient, error = %e, "failed to deliver notification");
    }
}

pub fn list(pool: &DbPool, user_id: Uuid, filter: ReadFilter) -> AppResult<Vec<Notification>> {
    let mut conn = conn(pool)?;

    let mut query = notifications::table
        .filter(notifications::recipient_id.eq(user_id))
        .select(Notification::as_select())
        .into_boxed();
    query = match filter {
        ReadFilter::All => query,
        ReadFilter::Unread => query.filter(notifications::is_read.eq(false)),
        ReadFilter::Read => query.filter(notifications::is_read.eq(true)),
    };

    let items = query
        .order(notifications::created_at.desc())
        .limit(filter.limit())
        .load(&mut conn)?;

    Ok(items)
}

pub fn count_unread(pool: &DbPool, user_id: Uuid) -> AppResult<i64> {
    let mut conn = conn(pool)?;

    let count: i64 = notifications::table
        .filter(notifications::recipient_id.eq(user_id))
        .filter(notifications::is_read.eq(false))
        .count()
        .get_result(&mut conn)?;

    Ok(count)
}

pub fn mark_all_read(pool: &DbPool, user_id: Uuid) -> AppResult<usize> {
    let mut conn = conn(pool)?;

    let updated = diesel::update(
        notifications::table
            .filter(notifications::recipient_id.eq(user_id))
            .filter(notifications::is_read.eq(false)),
    )
    .set(notifications::is_read.eq(true))
    .execute(&mut conn)?;

    Ok(updated)
}

/// Marks one notification read, only when it belongs to `user_id`.
pub fn mark_read(pool: &DbPool, notification_id: Uuid, user_id: Uuid) -> AppResult<Notification> {
    let mut conn = conn(pool)?;

    diesel::update(
        notifications::table
            .filter(notifications::id.eq(notification_id))
            .filter(notifications::recipient_id.eq(user_id)),
    )
    .set(notifications::is_read.eq(true))
    .returning(Notification::as_returning())
    .get_result(&mut conn)
    .optional()?
    .ok_or_else(|| AppError::new(ErrorCode::NotificationNotFound, "Notification not found"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filters_carry_their_page_size() {
        assert_eq!(ReadFilter::All.limit(), 50);
        assert_eq!(ReadFilter::Unread.limit(), 20);
        assert_eq!(ReadFilter::Read.limit(), 20);
    }

    #[test]
    fn kinds_serialize_upper_snake() {
        assert_eq!(serde_json::to_value(NotificationKind::NewPost).unwrap(), "NEW_POST");
        assert_eq!(NotificationKind::Reply.as_str(), "REPLY");
    }
}
