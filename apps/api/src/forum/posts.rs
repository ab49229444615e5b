use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use tracing::{debug, info};
use uuid::Uuid;
use validator::Validate;

use crate::backend::cache::{ListCache, Lookup};
use crate::backend::pagination::{PageRequest, Paginated};
use crate::backend::query::{Direction, Filter, Insert, Select, Update};
use crate::backend::Table;
use crate::errors::AppError;
use crate::forum::comments::comments_scope;
use crate::models::forum::{CategoryRow, PostRow, TagRow};
use crate::models::profile::join_name;
use crate::storage::{Bucket, Storage};
use crate::upload::UploadedFile;

pub const POSTS_SCOPE: &str = "posts";
pub const TAXONOMY_SCOPE: &str = "taxonomy";
pub const MAX_TAGS: usize = 10;

const POST_COLUMNS: &str = "posts.*, \
     profiles.first_name AS author_first_name, \
     profiles.last_name AS author_last_name, \
     profiles.profile_picture AS author_picture, \
     categories.name AS category_name, \
     (SELECT COUNT(*) FROM comments c WHERE c.post_id = posts.id AND c.is_deleted = false) AS comment_count";

/// Joined author, flattened into the owning view as `author_id`, `author_name`, `author_avatar`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthorView {
    pub author_id: Uuid,
    pub author_name: String,
    pub author_avatar: Option<String>,
}

pub async fn author_view(
    storage: &Storage,
    id: Uuid,
    first: Option<&str>,
    last: Option<&str>,
    picture: Option<&str>,
) -> AuthorView {
    AuthorView {
        author_id: id,
        author_name: join_name(first, last),
        author_avatar: storage.resolve(Bucket::ProfilePictures, picture).await,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostView {
    pub id: Uuid,
    #[serde(flatten)]
    pub author: AuthorView,
    pub title: String,
    pub content: String,
    pub category_id: Option<Uuid>,
    pub category_name: Option<String>,
    pub tags: Vec<String>,
    pub image_url: Option<String>,
    pub comment_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

async fn post_view(storage: &Storage, row: PostRow) -> PostView {
    let author = author_view(
        storage,
        row.author_id,
        row.author_first_name.as_deref(),
        row.author_last_name.as_deref(),
        row.author_picture.as_deref(),
    )
    .await;
    let image_url = storage.resolve(Bucket::Images, row.image_path.as_deref()).await;
    PostView {
        id: row.id,
        author,
        title: row.title,
        content: row.content,
        category_id: row.category_id,
        category_name: row.category_name,
        tags: row.tags,
        image_url,
        comment_count: row.comment_count,
        created_at: row.created_at,
        updated_at: row.updated_at,
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PostFilter {
    pub category_id: Option<Uuid>,
    pub tag: Option<String>,
    pub author_id: Option<Uuid>,
    pub search: Option<String>,
}

impl PostFilter {
    pub fn cache_key(&self, page: &PageRequest) -> String {
        format!(
            "cat={}|tag={}|author={}|q={}|p={}|n={}",
            self.category_id.map(|c| c.to_string()).unwrap_or_default(),
            self.tag.as_deref().map(normalize_tag).unwrap_or_default(),
            self.author_id.map(|a| a.to_string()).unwrap_or_default(),
            self.search.as_deref().unwrap_or_default().trim().to_lowercase(),
            page.page,
            page.page_size
        )
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewPost {
    #[validate(length(min = 5, max = 200, message = "Title must be 5-200 characters"))]
    pub title: String,
    #[validate(length(min = 1, max = 10000, message = "Content is required"))]
    pub content: String,
    pub category_id: Option<Uuid>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Object path returned by the image upload endpoint.
    pub image_path: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct PostPatch {
    #[validate(length(min = 5, max = 200, message = "Title must be 5-200 characters"))]
    pub title: Option<String>,
    #[validate(length(min = 1, max = 10000, message = "Content is required"))]
    pub content: Option<String>,
    pub category_id: Option<Uuid>,
    pub tags: Option<Vec<String>>,
    pub image_path: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadedImage {
    pub path: String,
    pub url: Option<String>,
}

#[derive(Debug, FromRow)]
struct PostOwnerRow {
    id: Uuid,
    author_id: Uuid,
    is_deleted: bool,
}

#[derive(Debug, FromRow)]
struct IdRow {
    id: Uuid,
}

pub fn normalize_tag(raw: &str) -> String {
    raw.trim().trim_start_matches('#').trim().to_lowercase()
}

/// Lowercases, strips `#`, drops blanks and duplicates.
pub fn normalize_tags(raw: &[String]) -> Result<Vec<String>, AppError> {
    let mut tags: Vec<String> = Vec::new();
    for tag in raw.iter().map(|t| normalize_tag(t)) {
        if !tag.is_empty() && !tags.contains(&tag) {
            tags.push(tag);
        }
    }
    if tags.len() > MAX_TAGS {
        return Err(AppError::Validation(format!(
            "A post can have at most {MAX_TAGS} tags"
        )));
    }
    Ok(tags)
}

fn post_query() -> Select {
    Select::from(Table::Posts)
        .columns(POST_COLUMNS)
        .join("JOIN profiles ON profiles.id = posts.author_id")
        .join("LEFT JOIN categories ON categories.id = posts.category_id")
        .eq("posts.is_deleted", false)
}

fn apply_filter(mut select: Select, filter: &PostFilter) -> Select {
    if let Some(category_id) = filter.category_id {
        select = select.eq("posts.category_id", category_id);
    }
    if let Some(tag) = filter.tag.as_deref().map(normalize_tag).filter(|t| !t.is_empty()) {
        select = select.filter(Filter::ArrayContains("posts.tags", tag.into()));
    }
    if let Some(author_id) = filter.author_id {
        select = select.eq("posts.author_id", author_id);
    }
    if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        select = select.filter(Filter::AnyILike(
            vec!["posts.title", "posts.content"],
            search.to_string(),
        ));
    }
    select
}

pub async fn list_posts(
    pool: &PgPool,
    cache: &ListCache,
    storage: &Storage,
    filter: &PostFilter,
    page: &PageRequest,
) -> Result<Paginated<PostView>, AppError> {
    let key = filter.cache_key(page);
    let slot = match cache.get::<Paginated<PostView>>(POSTS_SCOPE, &key).await {
        Lookup::Hit(cached) => return Ok(cached),
        Lookup::Miss(slot) => slot,
    };

    let rows: Vec<PostRow> = apply_filter(post_query(), filter)
        .order("posts.created_at", Direction::Desc)
        .page(page)
        .fetch_all(pool)
        .await?;
    debug!("Loaded {} posts (page {})", rows.len(), page.page);

    let mut items = Vec::with_capacity(rows.len());
    for row in rows {
        items.push(post_view(storage, row).await);
    }
    let result = Paginated::from_page(items, page);
    cache.put(slot, &result).await;
    Ok(result)
}

pub async fn get_post(pool: &PgPool, storage: &Storage, id: Uuid) -> Result<PostView, AppError> {
    let row: PostRow = post_query()
        .eq("posts.id", id)
        .maybe_single(pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Post {id} not found")))?;
    Ok(post_view(storage, row).await)
}

/// Live post owned by `author`; someone else's post is `Forbidden`.
async fn owned_post(pool: &PgPool, author: Uuid, id: Uuid) -> Result<PostOwnerRow, AppError> {
    let post: PostOwnerRow = Select::from(Table::Posts)
        .columns("id, author_id, is_deleted")
        .eq("id", id)
        .maybe_single(pool)
        .await?
        .filter(|p: &PostOwnerRow| !p.is_deleted)
        .ok_or_else(|| AppError::NotFound(format!("Post {id} not found")))?;
    if post.author_id != author {
        return Err(AppError::Forbidden);
    }
    Ok(post)
}

pub async fn create_post(
    pool: &PgPool,
    cache: &ListCache,
    storage: &Storage,
    author: Uuid,
    post: NewPost,
) -> Result<PostView, AppError> {
    post.validate()?;
    let tags = normalize_tags(&post.tags)?;

    let created: IdRow = Insert::into(Table::Posts)
        .value("author_id", author)
        .value("title", post.title.trim())
        .value("content", post.content.trim())
        .value("category_id", post.category_id)
        .value("tags", tags)
        .value("image_path", post.image_path)
        .returning(pool)
        .await?;
    info!("Post {} created by {author}", created.id);
    cache.invalidate(POSTS_SCOPE).await;
    get_post(pool, storage, created.id).await
}

pub async fn update_post(
    pool: &PgPool,
    cache: &ListCache,
    storage: &Storage,
    author: Uuid,
    id: Uuid,
    patch: PostPatch,
) -> Result<PostView, AppError> {
    patch.validate()?;
    let post = owned_post(pool, author, id).await?;
    let tags = match &patch.tags {
        Some(tags) => Some(normalize_tags(tags)?),
        None => None,
    };

    Update::table(Table::Posts)
        .set_some("title", patch.title.map(|t| t.trim().to_string()))
        .set_some("content", patch.content.map(|c| c.trim().to_string()))
        .set_some("category_id", patch.category_id)
        .set_some("tags", tags)
        .set_some("image_path", patch.image_path)
        .touch("updated_at")
        .eq("id", post.id)
        .execute(pool)
        .await?;
    info!("Post {id} updated");
    cache.invalidate(POSTS_SCOPE).await;
    get_post(pool, storage, id).await
}

/// Soft delete.
pub async fn delete_post(
    pool: &PgPool,
    cache: &ListCache,
    author: Uuid,
    id: Uuid,
) -> Result<(), AppError> {
    let post = owned_post(pool, author, id).await?;
    Update::table(Table::Posts)
        .set("is_deleted", true)
        .touch("updated_at")
        .eq("id", post.id)
        .execute(pool)
        .await?;
    info!("Post {id} deleted");
    for scope in removal_scopes(post.id) {
        cache.invalidate(&scope).await;
    }
    Ok(())
}

/// Cached lists that still show a post after it is removed.
fn removal_scopes(post_id: Uuid) -> [String; 2] {
    [POSTS_SCOPE.to_string(), comments_scope(post_id)]
}

pub async fn upload_post_image(
    storage: &Storage,
    author: Uuid,
    file: UploadedFile,
) -> Result<UploadedImage, AppError> {
    let path = storage
        .upload(Bucket::Images, author, &file.content_type, file.bytes)
        .await?;
    let url = storage.resolve(Bucket::Images, Some(&path)).await;
    Ok(UploadedImage { path, url })
}

pub async fn list_categories(pool: &PgPool, cache: &ListCache) -> Result<Vec<CategoryRow>, AppError> {
    let slot = match cache.get::<Vec<CategoryRow>>(TAXONOMY_SCOPE, "categories").await {
        Lookup::Hit(cached) => return Ok(cached),
        Lookup::Miss(slot) => slot,
    };
    let rows: Vec<CategoryRow> = Select::from(Table::Categories)
        .order("name", Direction::Asc)
        .fetch_all(pool)
        .await?;
    cache.put(slot, &rows).await;
    Ok(rows)
}

pub async fn list_tags(pool: &PgPool, cache: &ListCache) -> Result<Vec<TagRow>, AppError> {
    let slot = match cache.get::<Vec<TagRow>>(TAXONOMY_SCOPE, "tags").await {
        Lookup::Hit(cached) => return Ok(cached),
        Lookup::Miss(slot) => slot,
    };
    let rows: Vec<TagRow> = Select::from(Table::Tags)
        .order("name", Direction::Asc)
        .fetch_all(pool)
        .await?;
    cache.put(slot, &rows).await;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::cache::testing::memory_cache;

    #[test]
    fn test_normalize_tags() {
        let tags = normalize_tags(&[
            "#GST".to_string(),
            "gst".to_string(),
            " Income Tax ".to_string(),
            "".to_string(),
        ])
        .unwrap();
        assert_eq!(tags, vec!["gst", "income tax"]);
    }

    #[test]
    fn test_too_many_tags_rejected() {
        let tags: Vec<String> = (0..=MAX_TAGS).map(|i| format!("tag{i}")).collect();
        assert!(matches!(normalize_tags(&tags), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_post_query_excludes_deleted() {
        let sql = post_query().build().sql().to_string();
        assert!(sql.contains("JOIN profiles ON profiles.id = posts.author_id"));
        assert!(sql.ends_with("WHERE posts.is_deleted = $1"));
    }

    #[test]
    fn test_filters_are_conjunctive() {
        let filter = PostFilter {
            category_id: Some(Uuid::nil()),
            tag: Some("#GST".to_string()),
            author_id: None,
            search: Some("refund".to_string()),
        };
        let sql = apply_filter(post_query(), &filter).build().sql().to_string();
        assert!(sql.contains(
            "WHERE posts.is_deleted = $1 AND posts.category_id = $2 AND $3 = ANY(posts.tags) \
             AND (posts.title ILIKE $4 OR posts.content ILIKE $5)"
        ));
    }

    #[test]
    fn test_title_length_validated() {
        let post = NewPost {
            title: "Hi".to_string(),
            content: "Body".to_string(),
            category_id: None,
            tags: vec![],
            image_path: None,
        };
        assert!(post.validate().is_err());
    }

    #[test]
    fn test_cache_key_normalizes_tag() {
        let page = PageRequest::new(1, 10);
        let a = PostFilter {
            tag: Some("#GST".to_string()),
            ..Default::default()
        };
        let b = PostFilter {
            tag: Some("gst".to_string()),
            ..Default::default()
        };
        assert_eq!(a.cache_key(&page), b.cache_key(&page));
    }

    #[tokio::test]
    async fn test_removing_a_post_drops_its_cached_comments() {
        let cache = memory_cache();
        let post_id = Uuid::new_v4();
        let scope = comments_scope(post_id);
        let Lookup::Miss(slot) = cache.get::<Vec<String>>(&scope, "threads").await else {
            panic!("expected a miss");
        };
        cache.put(slot, &vec!["first!".to_string()]).await;

        for scope in removal_scopes(post_id) {
            cache.invalidate(&scope).await;
        }
        assert!(matches!(
            cache.get::<Vec<String>>(&scope, "threads").await,
            Lookup::Miss(_)
        ));
    }
}
