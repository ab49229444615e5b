use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use tracing::{debug, info};
use uuid::Uuid;
use validator::Validate;

use crate::backend::cache::{ListCache, Lookup};
use crate::backend::query::{Direction, Insert, Select, Update};
use crate::backend::Table;
use crate::errors::AppError;
use crate::forum::posts::{author_view, AuthorView, POSTS_SCOPE};
use crate::models::forum::CommentRow;
use crate::storage::Storage;

/// Content shown in place of a removed comment that still has replies.
pub const DELETED_PLACEHOLDER: &str = "[deleted]";

const COMMENT_COLUMNS: &str = "comments.*, \
     profiles.first_name AS author_first_name, \
     profiles.last_name AS author_last_name, \
     profiles.profile_picture AS author_picture";

pub fn comments_scope(post_id: Uuid) -> String {
    format!("comments:{post_id}")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentView {
    pub id: Uuid,
    pub post_id: Uuid,
    pub parent_id: Option<Uuid>,
    /// Absent for placeholders.
    #[serde(flatten)]
    pub author: Option<AuthorView>,
    pub content: String,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub replies: Vec<CommentView>,
}

/// One top-level comment and its replies, both newest first.
#[derive(Debug, Clone)]
pub struct Thread {
    pub comment: CommentRow,
    pub replies: Vec<CommentRow>,
}

/// Nests a flat comment list one level deep.
///
/// Deleted replies are dropped. A deleted top-level comment survives only
/// when at least one live reply hangs off it. Replies whose parent is not
/// in the list are dropped.
pub fn nest_comments(rows: Vec<CommentRow>) -> Vec<Thread> {
    let mut top: Vec<CommentRow> = Vec::new();
    let mut replies: HashMap<Uuid, Vec<CommentRow>> = HashMap::new();
    for row in rows {
        match row.parent_id {
            None => top.push(row),
            Some(parent) if !row.is_deleted => replies.entry(parent).or_default().push(row),
            Some(_) => {}
        }
    }

    let top_ids: HashSet<Uuid> = top.iter().map(|c| c.id).collect();
    replies.retain(|parent, _| top_ids.contains(parent));

    let mut threads: Vec<Thread> = top
        .into_iter()
        .filter_map(|comment| {
            let mut children = replies.remove(&comment.id).unwrap_or_default();
            if comment.is_deleted && children.is_empty() {
                return None;
            }
            children.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Some(Thread {
                comment,
                replies: children,
            })
        })
        .collect();
    threads.sort_by(|a, b| b.comment.created_at.cmp(&a.comment.created_at));
    threads
}

async fn comment_view(storage: &Storage, row: CommentRow, replies: Vec<CommentView>) -> CommentView {
    let (author, content) = if row.is_deleted {
        (None, DELETED_PLACEHOLDER.to_string())
    } else {
        let author = author_view(
            storage,
            row.author_id,
            row.author_first_name.as_deref(),
            row.author_last_name.as_deref(),
            row.author_picture.as_deref(),
        )
        .await;
        (Some(author), row.content)
    };
    CommentView {
        id: row.id,
        post_id: row.post_id,
        parent_id: row.parent_id,
        author,
        content,
        is_deleted: row.is_deleted,
        created_at: row.created_at,
        replies,
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewComment {
    #[validate(length(min = 1, max = 5000, message = "Comment must be 1-5000 characters"))]
    pub content: String,
    pub parent_id: Option<Uuid>,
}

#[derive(Debug, FromRow)]
struct CommentRefRow {
    id: Uuid,
    post_id: Uuid,
    author_id: Uuid,
    parent_id: Option<Uuid>,
    is_deleted: bool,
}

#[derive(Debug, FromRow)]
struct IdRow {
    id: Uuid,
}

async fn require_live_post(pool: &PgPool, post_id: Uuid) -> Result<Uuid, AppError> {
    let post: Option<IdRow> = Select::from(Table::Posts)
        .columns("id")
        .eq("id", post_id)
        .eq("is_deleted", false)
        .maybe_single(pool)
        .await?;
    post.map(|p| p.id)
        .ok_or_else(|| AppError::NotFound(format!("Post {post_id} not found")))
}

async fn comment_ref(pool: &PgPool, id: Uuid) -> Result<Option<CommentRefRow>, AppError> {
    Ok(Select::from(Table::Comments)
        .columns("id, post_id, author_id, parent_id, is_deleted")
        .eq("id", id)
        .maybe_single(pool)
        .await?)
}

pub async fn list_comments(
    pool: &PgPool,
    cache: &ListCache,
    storage: &Storage,
    post_id: Uuid,
) -> Result<Vec<CommentView>, AppError> {
    let scope = comments_scope(post_id);
    let slot = match cache.get::<Vec<CommentView>>(&scope, "threads").await {
        Lookup::Hit(cached) => return Ok(cached),
        Lookup::Miss(slot) => slot,
    };

    require_live_post(pool, post_id).await?;
    let rows: Vec<CommentRow> = Select::from(Table::Comments)
        .columns(COMMENT_COLUMNS)
        .join("JOIN profiles ON profiles.id = comments.author_id")
        .eq("comments.post_id", post_id)
        .order("comments.created_at", Direction::Desc)
        .fetch_all(pool)
        .await?;
    debug!("Loaded {} comments for post {post_id}", rows.len());

    let mut views = Vec::new();
    for thread in nest_comments(rows) {
        let mut replies = Vec::with_capacity(thread.replies.len());
        for reply in thread.replies {
            replies.push(comment_view(storage, reply, Vec::new()).await);
        }
        views.push(comment_view(storage, thread.comment, replies).await);
    }

    cache.put(slot, &views).await;
    Ok(views)
}

pub async fn create_comment(
    pool: &PgPool,
    cache: &ListCache,
    storage: &Storage,
    author: Uuid,
    post_id: Uuid,
    comment: NewComment,
) -> Result<CommentView, AppError> {
    comment.validate()?;
    let content = comment.content.trim().to_string();
    if content.is_empty() {
        return Err(AppError::Validation("Comment cannot be blank".to_string()));
    }
    require_live_post(pool, post_id).await?;

    if let Some(parent_id) = comment.parent_id {
        let parent = comment_ref(pool, parent_id)
            .await?
            .filter(|p| p.post_id == post_id && !p.is_deleted)
            .ok_or_else(|| AppError::NotFound(format!("Comment {parent_id} not found")))?;
        if parent.parent_id.is_some() {
            return Err(AppError::Validation(
                "Replies can only be one level deep".to_string(),
            ));
        }
    }

    let id: Uuid = Insert::into(Table::Comments)
        .value("post_id", post_id)
        .value("author_id", author)
        .value("parent_id", comment.parent_id)
        .value("content", content)
        .returning::<IdRow, _>(pool)
        .await?
        .id;
    info!("Comment {id} added to post {post_id}");
    cache.invalidate(&comments_scope(post_id)).await;
    cache.invalidate(POSTS_SCOPE).await;

    let row: CommentRow = Select::from(Table::Comments)
        .columns(COMMENT_COLUMNS)
        .join("JOIN profiles ON profiles.id = comments.author_id")
        .eq("comments.id", id)
        .single(pool)
        .await?;
    Ok(comment_view(storage, row, Vec::new()).await)
}

/// Soft delete; replies stay visible under a placeholder.
pub async fn delete_comment(
    pool: &PgPool,
    cache: &ListCache,
    author: Uuid,
    id: Uuid,
) -> Result<(), AppError> {
    let comment = comment_ref(pool, id)
        .await?
        .filter(|c| !c.is_deleted)
        .ok_or_else(|| AppError::NotFound(format!("Comment {id} not found")))?;
    if comment.author_id != author {
        return Err(AppError::Forbidden);
    }

    Update::table(Table::Comments)
        .set("is_deleted", true)
        .eq("id", comment.id)
        .execute(pool)
        .await?;
    info!("Comment {id} deleted");
    cache.invalidate(&comments_scope(comment.post_id)).await;
    cache.invalidate(POSTS_SCOPE).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn make_comment(parent: Option<Uuid>, minutes_ago: i64, deleted: bool) -> CommentRow {
        CommentRow {
            id: Uuid::new_v4(),
            post_id: Uuid::nil(),
            author_id: Uuid::new_v4(),
            parent_id: parent,
            content: "Thanks, that helped".to_string(),
            is_deleted: deleted,
            created_at: Utc::now() - Duration::minutes(minutes_ago),
            author_first_name: Some("Ravi".to_string()),
            author_last_name: None,
            author_picture: None,
        }
    }

    #[test]
    fn test_top_level_and_replies_newest_first() {
        let old = make_comment(None, 60, false);
        let new = make_comment(None, 5, false);
        let r1 = make_comment(Some(old.id), 50, false);
        let r2 = make_comment(Some(old.id), 10, false);
        let (old_id, new_id, r1_id, r2_id) = (old.id, new.id, r1.id, r2.id);

        let threads = nest_comments(vec![old, r1, new, r2]);
        let order: Vec<Uuid> = threads.iter().map(|t| t.comment.id).collect();
        assert_eq!(order, vec![new_id, old_id]);
        let replies: Vec<Uuid> = threads[1].replies.iter().map(|r| r.id).collect();
        assert_eq!(replies, vec![r2_id, r1_id]);
    }

    #[test]
    fn test_deleted_parent_with_live_reply_is_kept() {
        let parent = make_comment(None, 30, true);
        let reply = make_comment(Some(parent.id), 20, false);
        let threads = nest_comments(vec![parent, reply]);
        assert_eq!(threads.len(), 1);
        assert!(threads[0].comment.is_deleted);
        assert_eq!(threads[0].replies.len(), 1);
    }

    #[test]
    fn test_deleted_parent_without_live_replies_is_dropped() {
        let parent = make_comment(None, 30, true);
        let dead_reply = make_comment(Some(parent.id), 20, true);
        let live = make_comment(None, 10, false);
        let live_id = live.id;
        let threads = nest_comments(vec![parent, dead_reply, live]);
        assert_eq!(threads.len(), 1);
        assert_eq!(threads[0].comment.id, live_id);
    }

    #[test]
    fn test_orphan_replies_are_dropped() {
        let orphan = make_comment(Some(Uuid::new_v4()), 5, false);
        assert!(nest_comments(vec![orphan]).is_empty());
    }

    #[test]
    fn test_author_is_flattened_and_hidden_for_placeholders() {
        let mut view = CommentView {
            id: Uuid::nil(),
            post_id: Uuid::nil(),
            parent_id: None,
            author: Some(AuthorView {
                author_id: Uuid::nil(),
                author_name: "Ravi Shah".to_string(),
                author_avatar: None,
            }),
            content: "Thanks".to_string(),
            is_deleted: false,
            created_at: Utc::now(),
            replies: Vec::new(),
        };
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["author_name"], "Ravi Shah");
        assert!(json.get("replies").is_none());

        view.author = None;
        view.content = DELETED_PLACEHOLDER.to_string();
        let json = serde_json::to_value(&view).unwrap();
        assert!(json.get("author_name").is_none());
        assert_eq!(json["content"], "[deleted]");
    }

    #[test]
    fn test_comments_scope_is_per_post() {
        let id = Uuid::nil();
        assert_eq!(
            comments_scope(id),
            "comments:00000000-0000-0000-0000-000000000000"
        );
    }
}
