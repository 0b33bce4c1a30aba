use std::cmp::Ordering;
use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use diesel::prelude::*;
use diesel::PgConnection;
use serde::Serialize;
use uuid::Uuid;

use courtside_shared::errors::AppResult;

use crate::models::{Highlight, Post, PostImage, UserSummary};
use crate::schema::{highlight_likes, highlight_views, highlights, post_likes, post_views, posts};
use crate::services::like_service::FeedType;
use crate::services::post_service::author_summaries;

const FRESH_WINDOW_HOURS: i64 = 24;

#[derive(Debug, Clone, Serialize)]
pub struct FeedItem {
    pub id: Uuid,
    pub feed_type: FeedType,
    pub user_id: Uuid,
    pub caption: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merged_video_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub high_lights_link: Option<String>,
    pub user: Option<UserSummary>,
    pub total_likes: i64,
    pub total_views: i64,
    pub comments: i32,
    pub is_seen: bool,
    pub is_liked: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FeedItem {
    fn engagement(&self) -> i64 {
        self.total_likes + self.total_views
    }
}

/// Unseen first, then items from the last day, then engagement, then recency.
pub fn rank(a: &FeedItem, b: &FeedItem, now: DateTime<Utc>) -> Ordering {
    let fresh_cutoff = now - Duration::hours(FRESH_WINDOW_HOURS);
    let a_fresh = a.created_at > fresh_cutoff;
    let b_fresh = b.created_at > fresh_cutoff;

    a.is_seen
        .cmp(&b.is_seen)
        .then_with(|| b_fresh.cmp(&a_fresh))
        .then_with(|| b.engagement().cmp(&a.engagement()))
        .then_with(|| b.created_at.cmp(&a.created_at))
}

fn window<T>(items: Vec<T>, skip: usize, limit: usize) -> Vec<T> {
    items.into_iter().skip(skip).take(limit).collect()
}

fn skip_for(page: i64, limit: i64) -> (usize, usize) {
    let page = page.max(1) as usize;
    let limit = limit.clamp(1, 100) as usize;
    ((page - 1) * limit, limit)
}

fn post_items(conn: &mut PgConnection, viewer: Uuid, items: Vec<Post>) -> AppResult<Vec<FeedItem>> {
    let ids: Vec<Uuid> = items.iter().map(|p| p.id).collect();

    let seen: HashSet<Uuid> = post_views::table
        .filter(post_views::user_id.eq(viewer))
        .filter(post_views::post_id.eq_any(ids.clone()))
        .select(post_views::post_id)
        .load::<Uuid>(conn)?
        .into_iter()
        .collect();
    let liked: HashSet<Uuid> = post_likes::table
        .filter(post_likes::user_id.eq(viewer))
        .filter(post_likes::post_id.eq_any(ids))
        .select(post_likes::post_id)
        .load::<Uuid>(conn)?
        .into_iter()
        .collect();

    let images = PostImage::belonging_to(&items)
        .select(PostImage::as_select())
        .order(crate::schema::post_images::created_at.asc())
        .load(conn)?
        .grouped_by(&items);

    let author_ids: Vec<Uuid> = items.iter().map(|p| p.user_id).collect();
    let authors = author_summaries(conn, &author_ids)?;

    Ok(items
        .into_iter()
        .zip(images)
        .map(|(post, images)| FeedItem {
            id: post.id,
            feed_type: FeedType::Post,
            user_id: post.user_id,
            caption: post.caption,
            description: None,
            images: images.into_iter().map(|i| i.url).collect(),
            merged_video_url: None,
            high_lights_link: None,
            user: authors.get(&post.user_id).cloned(),
            total_likes: post.likes as i64,
            total_views: post.view_count as i64,
            comments: post.comments,
            is_seen: seen.contains(&post.id),
            is_liked: liked.contains(&post.id),
            created_at: post.created_at,
            updated_at: post.updated_at,
        })
        .collect())
}

fn highlight_items(conn: &mut PgConnection, viewer: Uuid, items: Vec<Highlight>) -> AppResult<Vec<FeedItem>> {
    let ids: Vec<Uuid> = items.iter().map(|h| h.id).collect();

    let seen: HashSet<Uuid> = highlight_views::table
        .filter(highlight_views::user_id.eq(viewer))
        .filter(highlight_views::highlight_id.eq_any(ids.clone()))
        .select(highlight_views::highlight_id)
        .load::<Uuid>(conn)?
        .into_iter()
        .collect();
    let liked: HashSet<Uuid> = highlight_likes::table
        .filter(highlight_likes::user_id.eq(viewer))
        .filter(highlight_likes::highlight_id.eq_any(ids))
        .select(highlight_likes::highlight_id)
        .load::<Uuid>(conn)?
        .into_iter()
        .collect();

    let author_ids: Vec<Uuid> = items.iter().map(|h| h.user_id).collect();
    let authors = author_summaries(conn, &author_ids)?;

    Ok(items
        .into_iter()
        .map(|h| FeedItem {
            id: h.id,
            feed_type: FeedType::Highlight,
            user_id: h.user_id,
            caption: h.caption,
            description: h.description,
            images: Vec::new(),
            merged_video_url: h.merged_video_url,
            high_lights_link: h.high_lights_link,
            user: authors.get(&h.user_id).cloned(),
            total_likes: h.likes as i64,
            total_views: h.views as i64,
            comments: 0,
            is_seen: seen.contains(&h.id),
            is_liked: liked.contains(&h.id),
            created_at: h.created_at,
            updated_at: h.updated_at,
        })
        .collect())
}

/// Ranked mix of posts and finished highlights for `viewer`.
pub fn smart_feed(conn: &mut PgConnection, viewer: Uuid, page: i64, limit: i64) -> AppResult<Vec<FeedItem>> {
    let (skip, limit) = skip_for(page, limit);
    let fetch = (skip + limit) as i64;

    let recent_posts: Vec<Post> = posts::table
        .order(posts::created_at.desc())
        .limit(fetch)
        .select(Post::as_select())
        .load(conn)?;
    let recent_highlights: Vec<Highlight> = highlights::table
        .filter(highlights::is_processing.eq(false))
        .order(highlights::created_at.desc())
        .limit(fetch)
        .select(Highlight::as_select())
        .load(conn)?;

    let mut items = post_items(conn, viewer, recent_posts)?;
    items.extend(highlight_items(conn, viewer, recent_highlights)?);

    let now = Utc::now();
    items.sort_by(|a, b| rank(a, b, now));
    Ok(window(items, skip, limit))
}

/// The viewer's own posts and finished highlights, newest first.
pub fn my_feed(conn: &mut PgConnection, viewer: Uuid, page: i64, limit: i64) -> AppResult<Vec<FeedItem>> {
    let (skip, limit) = skip_for(page, limit);

    let own_posts: Vec<Post> = posts::table
        .filter(posts::user_id.eq(viewer))
        .order(posts::created_at.desc())
        .select(Post::as_select())
        .load(conn)?;
    let own_highlights: Vec<Highlight> = highlights::table
        .filter(highlights::user_id.eq(viewer))
        .filter(highlights::is_processing.eq(false))
        .order(highlights::created_at.desc())
        .select(Highlight::as_select())
        .load(conn)?;

    let mut items = post_items(conn, viewer, own_posts)?;
    items.extend(highlight_items(conn, viewer, own_highlights)?);
    items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(window(items, skip, limit))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(name: u128, age_hours: i64, likes: i64, views: i64, seen: bool, now: DateTime<Utc>) -> FeedItem {
        let created_at = now - Duration::hours(age_hours);
        FeedItem {
            id: Uuid::from_u128(name),
            feed_type: FeedType::Post,
            user_id: Uuid::nil(),
            caption: None,
            description: None,
            images: Vec::new(),
            merged_video_url: None,
            high_lights_link: None,
            user: None,
            total_likes: likes,
            total_views: views,
            comments: 0,
            is_seen: seen,
            is_liked: false,
            created_at,
            updated_at: created_at,
        }
    }

    fn order(mut items: Vec<FeedItem>, now: DateTime<Utc>) -> Vec<u128> {
        items.sort_by(|a, b| rank(a, b, now));
        items.iter().map(|i| i.id.as_u128()).collect()
    }

    #[test]
    fn unseen_beats_everything() {
        let now = Utc::now();
        let items = vec![
            item(1, 1, 500, 500, true, now),
            item(2, 72, 0, 0, false, now),
        ];
        assert_eq!(order(items, now), [2, 1]);
    }

    #[test]
    fn fresh_beats_popular() {
        let now = Utc::now();
        let items = vec![
            item(1, 48, 100, 100, false, now),
            item(2, 2, 0, 1, false, now),
        ];
        assert_eq!(order(items, now), [2, 1]);
    }

    #[test]
    fn engagement_then_recency() {
        let now = Utc::now();
        let items = vec![
            item(1, 5, 1, 1, false, now),
            item(2, 6, 3, 0, false, now),
            item(3, 3, 1, 1, false, now),
        ];
        assert_eq!(order(items, now), [2, 3, 1]);
    }

    #[test]
    fn window_pages_in_memory() {
        let data: Vec<u32> = (0..25).collect();
        assert_eq!(window(data.clone(), 20, 10), (20..25).collect::<Vec<_>>());
        assert!(window(data, 40, 10).is_empty());
        assert_eq!(skip_for(3, 10), (20, 10));
        assert_eq!(skip_for(0, 0), (0, 1));
    }
}
