use std::collections::{HashMap, HashSet};

use chrono::Utc;
use diesel::prelude::*;
use diesel::PgConnection;
use serde::Serialize;
use uuid::Uuid;

use courtside_shared::errors::{AppError, AppResult, ErrorCode};

use crate::models::{Comment, NewComment, NotificationKind, UserSummary};
use crate::schema::{comments, posts};
use crate::services::like_service::display_name;
use crate::services::notification_service::{self, NotificationDraft};
use crate::services::post_service;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct CommentNode {
    #[serde(flatten)]
    pub comment: Comment,
    pub user: Option<UserSummary>,
    pub replies: Vec<CommentNode>,
}

pub fn find_comment(conn: &mut PgConnection, comment_id: Uuid) -> AppResult<Comment> {
    comments::table
        .find(comment_id)
        .select(Comment::as_select())
        .first(conn)
        .optional()?
        .ok_or_else(|| AppError::new(ErrorCode::CommentNotFound, "Comment not found"))
}

pub fn load_for_post(conn: &mut PgConnection, post_id: Uuid) -> AppResult<(Vec<Comment>, HashMap<Uuid, UserSummary>)> {
    post_service::find_post(conn, post_id)?;

    let all: Vec<Comment> = comments::table
        .filter(comments::post_id.eq(post_id))
        .order(comments::created_at.asc())
        .select(Comment::as_select())
        .load(conn)?;

    let author_ids: Vec<Uuid> = all.iter().map(|c| c.user_id).collect::<HashSet<_>>().into_iter().collect();
    let authors = post_service::author_summaries(conn, &author_ids)?;
    Ok((all, authors))
}

fn group_children(comments: Vec<Comment>, known: &HashSet<Uuid>) -> (Vec<Comment>, HashMap<Uuid, Vec<Comment>>) {
    let mut roots = Vec::new();
    let mut children: HashMap<Uuid, Vec<Comment>> = HashMap::new();
    for comment in comments {
        match comment.parent_id.filter(|p| known.contains(p) && *p != comment.id) {
            Some(parent) => children.entry(parent).or_default().push(comment),
            None => roots.push(comment),
        }
    }
    (roots, children)
}

fn attach(
    comment: Comment,
    children: &mut HashMap<Uuid, Vec<Comment>>,
    authors: &HashMap<Uuid, UserSummary>,
    depth_left: usize,
) -> CommentNode {
    let kids = if depth_left == 0 {
        Vec::new()
    } else {
        children.remove(&comment.id).unwrap_or_default()
    };
    let replies = kids
        .into_iter()
        .map(|kid| attach(kid, children, authors, depth_left - 1))
        .collect();
    CommentNode {
        user: authors.get(&comment.user_id).cloned(),
        comment,
        replies,
    }
}

/// Full thread, oldest first at every level. Comments whose parent is gone become roots.
pub fn build_tree(mut comments: Vec<Comment>, authors: &HashMap<Uuid, UserSummary>) -> Vec<CommentNode> {
    comments.sort_by_key(|c| c.created_at);
    let known: HashSet<Uuid> = comments.iter().map(|c| c.id).collect();
    let (roots, mut children) = group_children(comments, &known);
    roots
        .into_iter()
        .map(|root| attach(root, &mut children, authors, usize::MAX))
        .collect()
}

/// Top-level comments newest first, each with two levels of replies oldest first.
pub fn two_level_threads(mut comments: Vec<Comment>, authors: &HashMap<Uuid, UserSummary>) -> Vec<CommentNode> {
    comments.sort_by_key(|c| c.created_at);
    let known: HashSet<Uuid> = comments.iter().map(|c| c.id).collect();
    let (roots, mut children) = group_children(comments, &known);
    roots
        .into_iter()
        .rev()
        .filter(|root| root.parent_id.is_none())
        .map(|root| attach(root, &mut children, authors, 2))
        .collect()
}

/// Inserts a comment and bumps the post's counter. Returns the comment and the post owner.
pub fn insert_comment(
    conn: &mut PgConnection,
    user_id: Uuid,
    post_id: Uuid,
    parent_id: Option<Uuid>,
    content: &str,
) -> AppResult<(Comment, Uuid, Option<Comment>)> {
    let content = content.trim();
    if content.is_empty() {
        return Err(AppError::bad_request("Comment content is required"));
    }

    let post = post_service::find_post(conn, post_id)?;

    let parent = match parent_id {
        Some(pid) => {
            let parent = comments::table
                .find(pid)
                .filter(comments::post_id.eq(post_id))
                .select(Comment::as_select())
                .first(conn)
                .optional()?
                .ok_or_else(|| AppError::new(ErrorCode::ParentCommentNotFound, "Parent comment not found"))?;
            Some(parent)
        }
        None => None,
    };

    let comment = conn.transaction::<_, AppError, _>(|conn| {
        let comment: Comment = diesel::insert_into(comments::table)
            .values(&NewComment {
                id: Uuid::now_v7(),
                post_id,
                user_id,
                parent_id,
                content: content.to_string(),
            })
            .returning(Comment::as_returning())
            .get_result(conn)?;

        diesel::update(posts::table.find(post_id))
            .set(posts::comments.eq(posts::comments + 1))
            .execute(conn)?;
        Ok(comment)
    })?;

    Ok((comment, post.user_id, parent))
}

/// Tells the post owner and, for replies, the parent's author. Never fails the request.
pub fn notify_comment(state: &AppState, conn: &mut PgConnection, comment: &Comment, post_owner: Uuid, parent: Option<&Comment>) {
    let commenter = comment.user_id;
    let name = display_name(conn, commenter);

    for draft in comment_notifications(comment, post_owner, parent, &name) {
        notification_service::notify(state, conn, draft);
    }
}

fn comment_notifications(comment: &Comment, post_owner: Uuid, parent: Option<&Comment>, name: &str) -> Vec<NotificationDraft> {
    let commenter = comment.user_id;
    let mut drafts = Vec::new();

    if post_owner != commenter {
        let (title, message, kind) = if parent.is_some() {
            ("New Reply on Post ↩️", format!("{name} replied to a comment on your post"), NotificationKind::Reply)
        } else {
            ("New Comment 💬", format!("{name} commented on your post"), NotificationKind::Comment)
        };
        drafts.push(NotificationDraft {
            recipient_id: post_owner,
            sender_id: Some(commenter),
            post_id: Some(comment.post_id),
            highlight_id: None,
            title: title.into(),
            message,
            kind,
        });
    }

    if let Some(parent) = parent {
        if parent.user_id != commenter && parent.user_id != post_owner {
            drafts.push(NotificationDraft {
                recipient_id: parent.user_id,
                sender_id: Some(commenter),
                post_id: Some(comment.post_id),
                highlight_id: None,
                title: "New Reply ↩️".into(),
                message: format!("{name} replied to your comment"),
                kind: NotificationKind::Reply,
            });
        }
    }

    drafts
}

pub fn update_comment(conn: &mut PgConnection, user_id: Uuid, comment_id: Uuid, content: &str) -> AppResult<Comment> {
    let existing = find_comment(conn, comment_id)?;
    if existing.user_id != user_id {
        return Err(AppError::forbidden("You can only edit your own comments"));
    }
    let content = content.trim();
    if content.is_empty() {
        return Err(AppError::bad_request("Comment content is required"));
    }

    let updated = diesel::update(comments::table.find(comment_id))
        .set((comments::content.eq(content), comments::updated_at.eq(Utc::now())))
        .returning(Comment::as_returning())
        .get_result(conn)?;
    Ok(updated)
}

/// Deletes a comment (replies cascade) and resynchronises the post's counter.
pub fn delete_comment(conn: &mut PgConnection, user_id: Uuid, comment_id: Uuid) -> AppResult<i64> {
    let existing = find_comment(conn, comment_id)?;
    let post = post_service::find_post(conn, existing.post_id)?;

    if existing.user_id != user_id && post.user_id != user_id {
        return Err(AppError::forbidden("You are not allowed to delete this comment"));
    }

    conn.transaction::<_, AppError, _>(|conn| {
        diesel::delete(comments::table.find(comment_id)).execute(conn)?;

        let remaining: i64 = comments::table
            .filter(comments::post_id.eq(post.id))
            .count()
            .get_result(conn)?;

        diesel::update(posts::table.find(post.id))
            .set(posts::comments.eq(remaining as i32))
            .execute(conn)?;
        Ok(remaining)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration};

    fn at(base: DateTime<Utc>, mins: i64) -> DateTime<Utc> {
        base + Duration::minutes(mins)
    }

    fn comment(id: u128, parent: Option<u128>, created_at: DateTime<Utc>, user: Uuid) -> Comment {
        Comment {
            id: Uuid::from_u128(id),
            post_id: Uuid::nil(),
            user_id: user,
            parent_id: parent.map(Uuid::from_u128),
            content: format!("c{id}"),
            created_at,
            updated_at: created_at,
        }
    }

    fn ids(nodes: &[CommentNode]) -> Vec<u128> {
        nodes.iter().map(|n| n.comment.id.as_u128()).collect()
    }

    #[test]
    fn tree_nests_replies_and_promotes_orphans() {
        let base = Utc::now();
        let u = Uuid::new_v4();
        let flat = vec![
            comment(3, Some(1), at(base, 3), u),
            comment(1, None, at(base, 1), u),
            comment(2, None, at(base, 2), u),
            comment(4, Some(3), at(base, 4), u),
            comment(5, Some(99), at(base, 5), u),
        ];

        let tree = build_tree(flat, &HashMap::new());
        assert_eq!(ids(&tree), [1, 2, 5]);
        assert_eq!(ids(&tree[0].replies), [3]);
        assert_eq!(ids(&tree[0].replies[0].replies), [4]);
        assert!(tree[1].replies.is_empty());
    }

    #[test]
    fn two_level_view_orders_roots_desc_and_caps_depth() {
        let base = Utc::now();
        let u = Uuid::new_v4();
        let flat = vec![
            comment(1, None, at(base, 1), u),
            comment(2, None, at(base, 2), u),
            comment(3, Some(1), at(base, 4), u),
            comment(6, Some(1), at(base, 3), u),
            comment(4, Some(3), at(base, 5), u),
            comment(5, Some(4), at(base, 6), u),
        ];

        let threads = two_level_threads(flat, &HashMap::new());
        assert_eq!(ids(&threads), [2, 1]);
        assert_eq!(ids(&threads[1].replies), [6, 3]);
        let second = &threads[1].replies[1];
        assert_eq!(ids(&second.replies), [4]);
        assert!(second.replies[0].replies.is_empty());
    }

    #[test]
    fn authors_are_attached() {
        let u = Uuid::new_v4();
        let mut authors = HashMap::new();
        authors.insert(
            u,
            UserSummary {
                id: u,
                athlete_full_name: "Sam".into(),
                img_url: None,
                is_active: true,
                subscribe_status: "FREE".into(),
            },
        );
        let tree = build_tree(vec![comment(1, None, Utc::now(), u)], &authors);
        assert_eq!(tree[0].user.as_ref().map(|a| a.athlete_full_name.as_str()), Some("Sam"));
    }

    #[test]
    fn reply_notifies_owner_and_parent_author() {
        let owner = Uuid::new_v4();
        let parent_author = Uuid::new_v4();
        let replier = Uuid::new_v4();
        let now = Utc::now();
        let parent = comment(1, None, now, parent_author);
        let reply = comment(2, Some(1), now, replier);

        let drafts = comment_notifications(&reply, owner, Some(&parent), "Kai");
        assert_eq!(drafts.len(), 2);
        assert_eq!(drafts[0].recipient_id, owner);
        assert_eq!(drafts[0].title, "New Reply on Post ↩️");
        assert_eq!(drafts[0].message, "Kai replied to a comment on your post");
        assert_eq!(drafts[1].recipient_id, parent_author);
        assert_eq!(drafts[1].message, "Kai replied to your comment");
        assert_eq!(drafts[1].kind, NotificationKind::Reply);
    }

    #[test]
    fn own_post_comment_is_silent() {
        let owner = Uuid::new_v4();
        let c = comment(1, None, Utc::now(), owner);
        assert!(comment_notifications(&c, owner, None, "Me").is_empty());

        let other = comment(2, None, Utc::now(), Uuid::new_v4());
        let drafts = comment_notifications(&other, owner, None, "Someone");
        assert_eq!(drafts[0].title, "New Comment 💬");
        assert_eq!(drafts[0].kind, NotificationKind::Comment);
    }

    #[test]
    fn parent_author_who_owns_post_gets_one_notification() {
        let owner = Uuid::new_v4();
        let now = Utc::now();
        let parent = comment(1, None, now, owner);
        let reply = comment(2, Some(1), now, Uuid::new_v4());
        assert_eq!(comment_notifications(&reply, owner, Some(&parent), "X").len(), 1);
    }
}
