use chrono::Utc;
use diesel::prelude::*;
use diesel::PgConnection;
use uuid::Uuid;

use courtside_shared::errors::{AppError, AppResult, ErrorCode};
use courtside_shared::types::auth::AuthUser;

use crate::models::{Clip, Highlight, NewHighlight};
use crate::schema::{highlight_likes, highlight_views, highlights};
use crate::services::upload_service::{self, UploadedFile};
use crate::AppState;

pub const MIN_CLIPS: usize = 2;
pub const MAX_CLIPS: usize = 20;
const CLIP_FOLDER: &str = "highlights/clips";
const MERGED_FOLDER: &str = "highlights/merged";

pub fn find_highlight(conn: &mut PgConnection, highlight_id: Uuid) -> AppResult<Highlight> {
    highlights::table
        .find(highlight_id)
        .select(Highlight::as_select())
        .first(conn)
        .optional()?
        .ok_or_else(|| AppError::new(ErrorCode::HighlightNotFound, "Highlight not found"))
}

/// Drops the clip at `order` and renumbers the rest 1..n, keeping their relative order.
pub fn remove_and_reindex(mut clips: Vec<Clip>, order: i32) -> Option<(Clip, Vec<Clip>)> {
    let position = clips.iter().position(|c| c.order == order)?;
    let removed = clips.remove(position);
    clips.sort_by_key(|c| c.order);
    for (i, clip) in clips.iter_mut().enumerate() {
        clip.order = i as i32 + 1;
    }
    Some((removed, clips))
}

fn merge_inputs(clips: &[Clip]) -> Vec<(String, i32)> {
    clips.iter().map(|c| (c.s3_key.clone(), c.order)).collect()
}

fn clips_json(clips: &[Clip]) -> AppResult<serde_json::Value> {
    serde_json::to_value(clips).map_err(|e| AppError::internal(format!("clip encoding failed: {e}")))
}

fn set_processing(conn: &mut PgConnection, highlight_id: Uuid, processing: bool) -> AppResult<()> {
    diesel::update(highlights::table.find(highlight_id))
        .set((highlights::is_processing.eq(processing), highlights::updated_at.eq(Utc::now())))
        .execute(conn)?;
    Ok(())
}

fn release_after_failure(conn: &mut PgConnection, highlight_id: Uuid, err: &AppError) {
    tracing::error!(highlight_id = %highlight_id, error = %err, "highlight processing failed");
    if let Err(e) = set_processing(conn, highlight_id, false) {
        tracing::error!(highlight_id = %highlight_id, error = %e, "failed to clear processing flag");
    }
}

async fn delete_objects(state: &AppState, clips: &[Clip], merged_url: Option<&str>) {
    for clip in clips {
        if let Err(e) = state.storage.delete(&clip.s3_key).await {
            tracing::warn!(key = %clip.s3_key, error = %e, "failed to delete clip");
        }
    }
    if let Some(url) = merged_url {
        state.storage.delete_quietly(url).await;
    }
}

async fn merge(state: &AppState, clips: &[Clip]) -> AppResult<String> {
    state
        .media
        .merge(&merge_inputs(clips), MERGED_FOLDER)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "merge service failed");
            AppError::new(ErrorCode::MergeFailed, "Failed to merge highlight video")
        })
}

pub struct HighlightUpload {
    pub caption: Option<String>,
    pub description: Option<String>,
    pub clips: Vec<UploadedFile>,
}

/// Uploads clips, merges them and publishes the highlight.
pub async fn create_merged(state: &AppState, user_id: Uuid, upload: HighlightUpload) -> AppResult<Highlight> {
    if upload.clips.len() < MIN_CLIPS {
        return Err(AppError::new(ErrorCode::NotEnoughClips, "At least 2 clips are required to merge"));
    }
    if upload.clips.len() > MAX_CLIPS {
        return Err(AppError::bad_request(format!("At most {MAX_CLIPS} clips can be merged")));
    }

    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;

    let highlight: Highlight = diesel::insert_into(highlights::table)
        .values(&NewHighlight {
            id: Uuid::now_v7(),
            user_id,
            caption: upload.caption,
            description: upload.description,
            is_processing: true,
        })
        .returning(Highlight::as_returning())
        .get_result(&mut conn)?;

    tracing::info!(highlight_id = %highlight.id, user_id = %user_id, clips = upload.clips.len(), "highlight merge started");

    match upload_and_merge(state, &mut conn, highlight.id, upload.clips).await {
        Ok(done) => Ok(done),
        Err(e) => {
            release_after_failure(&mut conn, highlight.id, &e);
            Err(e)
        }
    }
}

async fn upload_and_merge(state: &AppState, conn: &mut PgConnection, highlight_id: Uuid, files: Vec<UploadedFile>) -> AppResult<Highlight> {
    let mut clips = Vec::with_capacity(files.len());
    for (i, file) in files.into_iter().enumerate() {
        let order = i as i32 + 1;
        let key = file.filename.clone().unwrap_or_else(|| format!("clip-{order}"));
        let object = match upload_service::store(&state.storage, CLIP_FOLDER, file).await {
            Ok(object) => object,
            Err(e) => {
                delete_objects(state, &clips, None).await;
                return Err(e);
            }
        };
        clips.push(Clip { key, s3_key: object.key, url: object.url, order });
    }

    let merged_url = merge(state, &clips).await?;

    let updated = diesel::update(highlights::table.find(highlight_id))
        .set((
            highlights::merged_video_url.eq(Some(&merged_url)),
            highlights::clips.eq(clips_json(&clips)?),
            highlights::is_processing.eq(false),
            highlights::high_lights_link.eq(Some(state.config.highlight_link(&merged_url))),
            highlights::updated_at.eq(Utc::now()),
        ))
        .returning(Highlight::as_returning())
        .get_result(conn)?;

    tracing::info!(highlight_id = %highlight_id, "highlight merged");
    Ok(updated)
}

/// Removes one clip and re-merges what is left.
pub async fn remove_clip(state: &AppState, highlight_id: Uuid, order: i32) -> AppResult<Highlight> {
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;

    let highlight = find_highlight(&mut conn, highlight_id)?;
    let (removed, remaining) = remove_and_reindex(highlight.clip_list(), order)
        .ok_or_else(|| AppError::new(ErrorCode::ClipNotFound, "Clip not found"))?;

    set_processing(&mut conn, highlight_id, true)?;

    match remerge(state, &mut conn, &highlight, removed, remaining).await {
        Ok(updated) => Ok(updated),
        Err(e) => {
            release_after_failure(&mut conn, highlight_id, &e);
            Err(e)
        }
    }
}

async fn remerge(state: &AppState, conn: &mut PgConnection, highlight: &Highlight, removed: Clip, remaining: Vec<Clip>) -> AppResult<Highlight> {
    delete_objects(state, std::slice::from_ref(&removed), highlight.merged_video_url.as_deref()).await;

    let merged_url = if remaining.len() >= MIN_CLIPS {
        Some(merge(state, &remaining).await?)
    } else {
        None
    };
    let link = merged_url.as_deref().map(|url| state.config.highlight_link(url));

    let updated = diesel::update(highlights::table.find(highlight.id))
        .set((
            highlights::merged_video_url.eq(merged_url),
            highlights::clips.eq(clips_json(&remaining)?),
            highlights::is_processing.eq(false),
            highlights::high_lights_link.eq(link),
            highlights::updated_at.eq(Utc::now()),
        ))
        .returning(Highlight::as_returning())
        .get_result(conn)?;

    tracing::info!(highlight_id = %highlight.id, removed_order = removed.order, remaining = remaining.len(), "clip removed");
    Ok(updated)
}

pub async fn delete_highlight(state: &AppState, user: &AuthUser, highlight_id: Uuid) -> AppResult<()> {
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;

    let highlight = find_highlight(&mut conn, highlight_id)?;
    if highlight.user_id != user.id && !user.is_admin() {
        return Err(AppError::forbidden("You are not allowed to delete this highlight"));
    }

    delete_objects(state, &highlight.clip_list(), highlight.merged_video_url.as_deref()).await;

    conn.transaction::<_, AppError, _>(|conn| {
        diesel::delete(highlight_likes::table.filter(highlight_likes::highlight_id.eq(highlight_id))).execute(conn)?;
        diesel::delete(highlight_views::table.filter(highlight_views::highlight_id.eq(highlight_id))).execute(conn)?;
        diesel::delete(highlights::table.find(highlight_id)).execute(conn)?;
        Ok(())
    })?;

    tracing::info!(highlight_id = %highlight_id, user_id = %user.id, "highlight deleted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clip(order: i32) -> Clip {
        Clip {
            key: format!("clip-{order}.mp4"),
            s3_key: format!("highlights/clips/{order}.mp4"),
            url: format!("https://cdn/highlights/clips/{order}.mp4"),
            order,
        }
    }

    #[test]
    fn removing_a_middle_clip_renumbers_the_rest() {
        let clips = vec![clip(3), clip(1), clip(2), clip(4)];
        let (removed, rest) = remove_and_reindex(clips, 2).unwrap();
        assert_eq!(removed.s3_key, "highlights/clips/2.mp4");
        let orders: Vec<i32> = rest.iter().map(|c| c.order).collect();
        let keys: Vec<&str> = rest.iter().map(|c| c.s3_key.as_str()).collect();
        assert_eq!(orders, [1, 2, 3]);
        assert_eq!(keys, ["highlights/clips/1.mp4", "highlights/clips/3.mp4", "highlights/clips/4.mp4"]);
    }

    #[test]
    fn unknown_order_is_rejected() {
        assert!(remove_and_reindex(vec![clip(1), clip(2)], 7).is_none());
    }

    #[test]
    fn merge_inputs_follow_clip_order() {
        let (_, rest) = remove_and_reindex(vec![clip(1), clip(2), clip(3)], 1).unwrap();
        assert_eq!(
            merge_inputs(&rest),
            [("highlights/clips/2.mp4".to_string(), 1), ("highlights/clips/3.mp4".to_string(), 2)]
        );
    }

    #[test]
    fn clips_round_trip_through_jsonb() {
        let clips = vec![clip(1), clip(2)];
        let value = clips_json(&clips).unwrap();
        assert_eq!(value[1]["order"], 2);
        let highlight = Highlight {
            id: Uuid::nil(),
            user_id: Uuid::nil(),
            caption: None,
            description: None,
            merged_video_url: None,
            clips: value,
            is_processing: false,
            high_lights_link: None,
            likes: 0,
            views: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert_eq!(highlight.clip_list(), clips);
    }
}
