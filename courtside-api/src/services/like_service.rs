use diesel::prelude::*;
use diesel::PgConnection;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use courtside_shared::errors::{AppError, AppResult, ErrorCode};

use crate::models::{NewHighlightLike, NewHighlightView, NewPostLike, NewPostView, NotificationKind};
use crate::schema::{highlight_likes, highlight_views, highlights, post_likes, post_views, posts, users};
use crate::services::notification_service::{self, NotificationDraft};
use crate::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FeedType {
    Post,
    Highlight,
}

impl FeedType {
    pub fn label(self) -> &'static str {
        match self {
            FeedType::Post => "Post",
            FeedType::Highlight => "Highlight",
        }
    }

    fn noun(self) -> &'static str {
        match self {
            FeedType::Post => "post",
            FeedType::Highlight => "highlight",
        }
    }
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct ToggleOutcome {
    pub liked: bool,
    pub message: String,
}

/// Likes or unlikes `target_id`, then notifies the owner on a new like.
pub fn toggle(state: &AppState, target_id: Uuid, user_id: Uuid, feed_type: FeedType) -> AppResult<ToggleOutcome> {
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;

    let (liked, owner_id) = conn.transaction::<_, AppError, _>(|conn| match feed_type {
        FeedType::Post => toggle_post(conn, target_id, user_id),
        FeedType::Highlight => toggle_highlight(conn, target_id, user_id),
    })?;

    if !liked {
        return Ok(ToggleOutcome { liked, message: "Like removed".into() });
    }

    if owner_id != user_id {
        let name = display_name(&mut conn, user_id);
        let draft = like_notification(owner_id, user_id, target_id, feed_type, &name);
        notification_service::notify(state, &mut conn, draft);
    }

    tracing::info!(user_id = %user_id, target_id = %target_id, feed_type = ?feed_type, "liked");
    Ok(ToggleOutcome {
        liked,
        message: format!("{} liked", feed_type.label()),
    })
}

fn like_notification(owner_id: Uuid, user_id: Uuid, target_id: Uuid, feed_type: FeedType, name: &str) -> NotificationDraft {
    let (post_id, highlight_id) = match feed_type {
        FeedType::Post => (Some(target_id), None),
        FeedType::Highlight => (None, Some(target_id)),
    };
    NotificationDraft {
        recipient_id: owner_id,
        sender_id: Some(user_id),
        post_id,
        highlight_id,
        title: "New Like ❤️".into(),
        message: format!("{name} liked your {}", feed_type.noun()),
        kind: NotificationKind::Like,
    }
}

fn toggle_post(conn: &mut PgConnection, post_id: Uuid, user_id: Uuid) -> AppResult<(bool, Uuid)> {
    let owner_id: Uuid = posts::table
        .find(post_id)
        .select(posts::user_id)
        .first(conn)
        .optional()?
        .ok_or_else(|| AppError::new(ErrorCode::PostNotFound, "Post not found"))?;

    let removed = diesel::delete(
        post_likes::table
            .filter(post_likes::user_id.eq(user_id))
            .filter(post_likes::post_id.eq(post_id)),
    )
    .execute(conn)?;

    if removed > 0 {
        diesel::update(posts::table.find(post_id).filter(posts::likes.gt(0)))
            .set(posts::likes.eq(posts::likes - 1))
            .execute(conn)?;
        return Ok((false, owner_id));
    }

    diesel::insert_into(post_likes::table)
        .values(&NewPostLike { user_id, post_id })
        .execute(conn)?;
    diesel::update(posts::table.find(post_id))
        .set(posts::likes.eq(posts::likes + 1))
        .execute(conn)?;
    Ok((true, owner_id))
}

fn toggle_highlight(conn: &mut PgConnection, highlight_id: Uuid, user_id: Uuid) -> AppResult<(bool, Uuid)> {
    let owner_id: Uuid = highlights::table
        .find(highlight_id)
        .select(highlights::user_id)
        .first(conn)
        .optional()?
        .ok_or_else(|| AppError::new(ErrorCode::HighlightNotFound, "Highlight not found"))?;

    let removed = diesel::delete(
        highlight_likes::table
            .filter(highlight_likes::user_id.eq(user_id))
            .filter(highlight_likes::highlight_id.eq(highlight_id)),
    )
    .execute(conn)?;

    if removed > 0 {
        diesel::update(highlights::table.find(highlight_id).filter(highlights::likes.gt(0)))
            .set(highlights::likes.eq(highlights::likes - 1))
            .execute(conn)?;
        return Ok((false, owner_id));
    }

    diesel::insert_into(highlight_likes::table)
        .values(&NewHighlightLike { user_id, highlight_id })
        .execute(conn)?;
    diesel::update(highlights::table.find(highlight_id))
        .set(highlights::likes.eq(highlights::likes + 1))
        .execute(conn)?;
    Ok((true, owner_id))
}

/// Records a first view. `None` when the target does not exist, otherwise whether the view was new.
pub fn record_view(conn: &mut PgConnection, target_id: Uuid, user_id: Uuid, feed_type: FeedType) -> AppResult<Option<bool>> {
    conn.transaction::<_, AppError, _>(|conn| match feed_type {
        FeedType::Post => {
            let exists: i64 = posts::table.find(target_id).count().get_result(conn)?;
            if exists == 0 {
                return Ok(None);
            }
            let inserted = diesel::insert_into(post_views::table)
                .values(&NewPostView { user_id, post_id: target_id })
                .on_conflict_do_nothing()
                .execute(conn)?;
            if inserted > 0 {
                diesel::update(posts::table.find(target_id))
                    .set(posts::view_count.eq(posts::view_count + 1))
                    .execute(conn)?;
            }
            Ok(Some(inserted > 0))
        }
        FeedType::Highlight => {
            let exists: i64 = highlights::table.find(target_id).count().get_result(conn)?;
            if exists == 0 {
                return Ok(None);
            }
            let inserted = diesel::insert_into(highlight_views::table)
                .values(&NewHighlightView { user_id, highlight_id: target_id })
                .on_conflict_do_nothing()
                .execute(conn)?;
            if inserted > 0 {
                diesel::update(highlights::table.find(target_id))
                    .set(highlights::views.eq(highlights::views + 1))
                    .execute(conn)?;
            }
            Ok(Some(inserted > 0))
        }
    })
}

/// The user's name for notification copy, "Someone" when unknown.
pub fn display_name(conn: &mut PgConnection, user_id: Uuid) -> String {
    let name: Option<String> = users::table
        .find(user_id)
        .select(users::athlete_full_name)
        .first(conn)
        .optional()
        .unwrap_or_else(|e| {
            tracing::debug!(user_id = %user_id, error = %e, "name lookup failed");
            None
        });
    name_or_someone(name)
}

fn name_or_someone(name: Option<String>) -> String {
    name.map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "Someone".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feed_type_parses_upper_case() {
        let t: FeedType = serde_json::from_str("\"HIGHLIGHT\"").unwrap();
        assert_eq!(t, FeedType::Highlight);
        assert_eq!(FeedType::Post.label(), "Post");
        assert!(serde_json::from_str::<FeedType>("\"REEL\"").is_err());
    }

    #[test]
    fn like_notification_points_at_the_liked_target() {
        let (owner, liker, target) = (Uuid::now_v7(), Uuid::now_v7(), Uuid::now_v7());

        let draft = like_notification(owner, liker, target, FeedType::Highlight, "Jordan");
        assert_eq!(draft.recipient_id, owner);
        assert_eq!(draft.sender_id, Some(liker));
        assert_eq!(draft.highlight_id, Some(target));
        assert_eq!(draft.post_id, None);
        assert_eq!(draft.message, "Jordan liked your highlight");
        assert_eq!(draft.kind, NotificationKind::Like);

        let draft = like_notification(owner, liker, target, FeedType::Post, "Jordan");
        assert_eq!(draft.post_id, Some(target));
        assert_eq!(draft.highlight_id, None);
    }

    #[test]
    fn missing_names_fall_back_to_someone() {
        assert_eq!(name_or_someone(None), "Someone");
        assert_eq!(name_or_someone(Some("  ".into())), "Someone");
        assert_eq!(name_or_someone(Some("Jordan".into())), "Jordan");
    }
}
