use std::collections::HashMap;

use diesel::dsl::not;
use diesel::prelude::*;
use diesel::PgConnection;
use serde::Serialize;
use uuid::Uuid;

use courtside_shared::errors::{AppError, AppResult, ErrorCode};

use crate::models::{Comment, NewPost, NewPostImage, Post, PostImage, UserSummary};
use crate::schema::{comments, post_images, post_views, posts, users};

#[derive(Debug, Serialize)]
pub struct PostDetails {
    #[serde(flatten)]
    pub post: Post,
    pub images: Vec<PostImage>,
    pub user: Option<UserSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment_list: Option<Vec<Comment>>,
}

pub fn find_post(conn: &mut PgConnection, post_id: Uuid) -> AppResult<Post> {
    posts::table
        .find(post_id)
        .select(Post::as_select())
        .first(conn)
        .optional()?
        .ok_or_else(|| AppError::new(ErrorCode::PostNotFound, "Post not found"))
}

pub fn author_summaries(conn: &mut PgConnection, ids: &[Uuid]) -> AppResult<HashMap<Uuid, UserSummary>> {
    let summaries = users::table
        .filter(users::id.eq_any(ids.to_vec()))
        .select(UserSummary::as_select())
        .load(conn)?;
    Ok(summaries.into_iter().map(|u| (u.id, u)).collect())
}

/// Attaches images, author and (optionally) comments to each post, preserving order.
pub fn with_details(conn: &mut PgConnection, items: Vec<Post>, include_comments: bool) -> AppResult<Vec<PostDetails>> {
    let images = PostImage::belonging_to(&items)
        .select(PostImage::as_select())
        .order(post_images::created_at.asc())
        .load(conn)?
        .grouped_by(&items);

    let author_ids: Vec<Uuid> = items.iter().map(|p| p.user_id).collect();
    let authors = author_summaries(conn, &author_ids)?;

    let mut comments_by_post: HashMap<Uuid, Vec<Comment>> = HashMap::new();
    if include_comments {
        let post_ids: Vec<Uuid> = items.iter().map(|p| p.id).collect();
        let all: Vec<Comment> = comments::table
            .filter(comments::post_id.eq_any(post_ids))
            .order(comments::created_at.desc())
            .select(Comment::as_select())
            .load(conn)?;
        for comment in all {
            comments_by_post.entry(comment.post_id).or_default().push(comment);
        }
    }

    Ok(items
        .into_iter()
        .zip(images)
        .map(|(post, images)| {
            let user = authors.get(&post.user_id).cloned();
            let comment_list = include_comments
                .then(|| comments_by_post.remove(&post.id).unwrap_or_default());
            PostDetails { post, images, user, comment_list }
        })
        .collect())
}

/// Swaps a post's images and caption in one transaction.
pub fn rewrite_post(
    conn: &mut PgConnection,
    post_id: Uuid,
    caption: Option<String>,
    dropped_ids: Vec<Uuid>,
    new_urls: &[String],
) -> AppResult<()> {
    conn.transaction::<_, AppError, _>(|conn| {
        diesel::delete(post_images::table.filter(post_images::id.eq_any(dropped_ids)))
            .execute(conn)?;

        let rows: Vec<NewPostImage> = new_urls
            .iter()
            .map(|url| NewPostImage { post_id, url: url.clone() })
            .collect();
        if !rows.is_empty() {
            diesel::insert_into(post_images::table).values(&rows).execute(conn)?;
        }

        diesel::update(posts::table.find(post_id))
            .set((posts::caption.eq(caption), posts::updated_at.eq(chrono::Utc::now())))
            .execute(conn)?;
        Ok(())
    })
}

pub fn create_post(conn: &mut PgConnection, user_id: Uuid, caption: Option<String>, image_urls: &[String]) -> AppResult<PostDetails> {
    let post = conn.transaction::<_, AppError, _>(|conn| {
        let post: Post = diesel::insert_into(posts::table)
            .values(&NewPost { id: Uuid::now_v7(), user_id, caption })
            .returning(Post::as_returning())
            .get_result(conn)?;

        let rows: Vec<NewPostImage> = image_urls
            .iter()
            .map(|url| NewPostImage { post_id: post.id, url: url.clone() })
            .collect();
        diesel::insert_into(post_images::table).values(&rows).execute(conn)?;
        Ok(post)
    })?;

    let mut details = with_details(conn, vec![post], false)?;
    details
        .pop()
        .ok_or_else(|| AppError::internal("created post vanished"))
}

pub fn list_posts(conn: &mut PgConnection, author: Option<Uuid>, include_comments: bool) -> AppResult<Vec<PostDetails>> {
    let mut query = posts::table.select(Post::as_select()).into_boxed();
    if let Some(author) = author {
        query = query.filter(posts::user_id.eq(author));
    }
    let items = query.order(posts::created_at.desc()).load(conn)?;
    with_details(conn, items, include_comments)
}

/// Unseen posts first (newest first), topped up with seen posts at the same offset.
pub fn unseen_first_feed(conn: &mut PgConnection, viewer: Uuid, page: i64, limit: i64) -> AppResult<Vec<PostDetails>> {
    let page = page.max(1);
    let limit = limit.clamp(1, 100);
    let skip = (page - 1) * limit;

    let seen_ids = post_views::table
        .filter(post_views::user_id.eq(viewer))
        .select(post_views::post_id);

    let mut items: Vec<Post> = posts::table
        .filter(not(posts::id.eq_any(seen_ids.clone())))
        .order(posts::created_at.desc())
        .offset(skip)
        .limit(limit)
        .select(Post::as_select())
        .load(conn)?;

    let missing = limit - items.len() as i64;
    if missing > 0 {
        let seen: Vec<Post> = posts::table
            .filter(posts::id.eq_any(seen_ids))
            .order(posts::created_at.desc())
            .offset(skip)
            .limit(missing)
            .select(Post::as_select())
            .load(conn)?;
        items.extend(seen);
    }

    with_details(conn, items, false)
}

/// Splits stored image urls into those to keep and those to drop.
pub fn partition_images(existing: Vec<PostImage>, kept_urls: &[String]) -> (Vec<PostImage>, Vec<PostImage>) {
    existing.into_iter().partition(|img| kept_urls.contains(&img.url))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn image(url: &str) -> PostImage {
        PostImage {
            id: Uuid::new_v4(),
            post_id: Uuid::nil(),
            url: url.into(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn partition_keeps_listed_urls() {
        let existing = vec![image("a"), image("b"), image("c")];
        let (kept, dropped) = partition_images(existing, &["c".into(), "a".into(), "zzz".into()]);
        let kept: Vec<_> = kept.iter().map(|i| i.url.as_str()).collect();
        let dropped: Vec<_> = dropped.iter().map(|i| i.url.as_str()).collect();
        assert_eq!(kept, ["a", "c"]);
        assert_eq!(dropped, ["b"]);
    }

    #[test]
    fn empty_keep_list_drops_everything() {
        let (kept, dropped) = partition_images(vec![image("a")], &[]);
        assert!(kept.is_empty());
        assert_eq!(dropped.len(), 1);
    }
}
