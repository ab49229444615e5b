use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::CurrentUser;
use crate::backend::pagination::{PageParams, PageRequest, Paginated};
use crate::errors::AppError;
use crate::forum::comments::{self, CommentView, NewComment};
use crate::forum::posts::{self, NewPost, PostFilter, PostPatch, PostView, UploadedImage};
use crate::models::forum::{CategoryRow, TagRow};
use crate::state::AppState;
use crate::upload::read_upload_form;

#[derive(Debug, Default, Deserialize)]
pub struct PostQuery {
    pub category_id: Option<Uuid>,
    pub tag: Option<String>,
    pub author_id: Option<Uuid>,
    pub search: Option<String>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

impl PostQuery {
    pub fn into_parts(self) -> (PostFilter, PageParams) {
        (
            PostFilter {
                category_id: self.category_id,
                tag: self.tag,
                author_id: self.author_id,
                search: self.search,
            },
            PageParams {
                page: self.page,
                page_size: self.page_size,
            },
        )
    }
}

/// GET /api/v1/posts
pub async fn handle_list_posts(
    State(state): State<AppState>,
    Query(query): Query<PostQuery>,
) -> Result<Json<Paginated<PostView>>, AppError> {
    let (filter, page) = query.into_parts();
    let page = PageRequest::from_params(&page, state.config.default_page_size);
    let result =
        posts::list_posts(&state.db, &state.cache, &state.storage, &filter, &page).await?;
    Ok(Json(result))
}

/// POST /api/v1/posts
pub async fn handle_create_post(
    State(state): State<AppState>,
    CurrentUser(author): CurrentUser,
    Json(post): Json<NewPost>,
) -> Result<(StatusCode, Json<PostView>), AppError> {
    let view = posts::create_post(&state.db, &state.cache, &state.storage, author, post).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

/// GET /api/v1/posts/:id
pub async fn handle_get_post(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<PostView>, AppError> {
    Ok(Json(posts::get_post(&state.db, &state.storage, id).await?))
}

/// PATCH /api/v1/posts/:id
pub async fn handle_update_post(
    State(state): State<AppState>,
    CurrentUser(author): CurrentUser,
    Path(id): Path<Uuid>,
    Json(patch): Json<PostPatch>,
) -> Result<Json<PostView>, AppError> {
    let view =
        posts::update_post(&state.db, &state.cache, &state.storage, author, id, patch).await?;
    Ok(Json(view))
}

/// DELETE /api/v1/posts/:id
pub async fn handle_delete_post(
    State(state): State<AppState>,
    CurrentUser(author): CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    posts::delete_post(&state.db, &state.cache, author, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/posts/images
pub async fn handle_upload_image(
    State(state): State<AppState>,
    CurrentUser(author): CurrentUser,
    multipart: Multipart,
) -> Result<(StatusCode, Json<UploadedImage>), AppError> {
    let mut form = read_upload_form(multipart).await?;
    let file = form.require_file()?;
    state.ui_state.start_upload(author, "post_image").await;
    let result = posts::upload_post_image(&state.storage, author, file).await;
    state
        .ui_state
        .finish_upload(author, "post_image", result.is_ok())
        .await;
    Ok((StatusCode::CREATED, Json(result?)))
}

/// GET /api/v1/posts/:id/comments
pub async fn handle_list_comments(
    State(state): State<AppState>,
    Path(post_id): Path<Uuid>,
) -> Result<Json<Vec<CommentView>>, AppError> {
    let threads = comments::list_comments(&state.db, &state.cache, &state.storage, post_id).await?;
    Ok(Json(threads))
}

/// POST /api/v1/posts/:id/comments
pub async fn handle_create_comment(
    State(state): State<AppState>,
    CurrentUser(author): CurrentUser,
    Path(post_id): Path<Uuid>,
    Json(comment): Json<NewComment>,
) -> Result<(StatusCode, Json<CommentView>), AppError> {
    let view = comments::create_comment(
        &state.db,
        &state.cache,
        &state.storage,
        author,
        post_id,
        comment,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(view)))
}

/// DELETE /api/v1/comments/:id
pub async fn handle_delete_comment(
    State(state): State<AppState>,
    CurrentUser(author): CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    comments::delete_comment(&state.db, &state.cache, author, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/categories
pub async fn handle_list_categories(
    State(state): State<AppState>,
) -> Result<Json<Vec<CategoryRow>>, AppError> {
    Ok(Json(posts::list_categories(&state.db, &state.cache).await?))
}

/// GET /api/v1/tags
pub async fn handle_list_tags(State(state): State<AppState>) -> Result<Json<Vec<TagRow>>, AppError> {
    Ok(Json(posts::list_tags(&state.db, &state.cache).await?))
}
