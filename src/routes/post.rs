use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};

use crate::db::models::Post;
use crate::db::posts::{self, NewPost, PostFields};
use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::pagination::{paginate, PageQuery, POST_PAGE_LIMIT};
use crate::routes::{non_blank, parse_id};
use crate::state::AppState;
use crate::uploads::{ImageChange, UploadForm, POST_IMAGE};

const MAX_TITLE_LEN: usize = 200;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/post", get(list_posts).post(create_post))
        .route(
            "/post/{id}",
            get(get_post).put(update_post).delete(delete_post),
        )
        .route("/post/user/{user_id}", get(list_user_posts))
}

fn check_title(title: &str) -> AppResult<()> {
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(AppError::BadRequest(format!(
            "Title must be {} characters or less",
            MAX_TITLE_LEN
        )));
    }
    Ok(())
}

fn insert_post(state: &AppState, current: &CurrentUser, new: &NewPost<'_>) -> AppResult<Post> {
    let conn = state.db.get()?;
    Ok(posts::create(&conn, &current.user, new)?)
}

/// POST /post: create a post, optionally with an image.
async fn create_post(
    State(state): State<AppState>,
    current: CurrentUser,
    multipart: Multipart,
) -> AppResult<Response> {
    let mut form = UploadForm::read(multipart, "img", state.uploads.max_bytes()).await?;

    let title = non_blank(form.text("title"), "Title")?
        .ok_or_else(|| AppError::BadRequest("Title and content are required".into()))?
        .to_string();
    let content = non_blank(form.text("content"), "Content")?
        .ok_or_else(|| AppError::BadRequest("Title and content are required".into()))?
        .to_string();
    check_title(&title)?;

    let img = match form.take_file() {
        Some(file) => Some(state.uploads.save(&POST_IMAGE, &file)?),
        None => None,
    };

    let new = NewPost {
        title: &title,
        content: &content,
        img: img.as_deref(),
    };
    let post = match insert_post(&state, &current, &new) {
        Ok(post) => post,
        Err(e) => {
            if let Some(img) = &img {
                state.uploads.discard(img);
            }
            return Err(e);
        }
    };

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": "Post created",
            "post": post,
        })),
    )
        .into_response())
}

/// GET /post: paginated listing, newest first.
async fn list_posts(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> AppResult<Json<Value>> {
    let request = query.resolve(POST_PAGE_LIMIT);
    let conn = state.db.get()?;
    let total = posts::count(&conn)?;
    let window = paginate(request, total);
    let posts = posts::list_page(&conn, &window)?;

    Ok(Json(json!({
        "success": true,
        "message": "Posts loaded",
        "posts": posts,
        "pagination": window.summary(total),
    })))
}

/// GET /post/{id}
async fn get_post(State(state): State<AppState>, Path(id): Path<String>) -> AppResult<Json<Value>> {
    let id = parse_id(&id, "Post")?;
    let conn = state.db.get()?;
    let post = posts::get_with_owner(&conn, id)?.ok_or(AppError::NotFound("Post"))?;

    Ok(Json(json!({
        "success": true,
        "message": "Post loaded",
        "post": post,
    })))
}

fn apply_update(
    state: &AppState,
    id: i64,
    owner_id: i64,
    fields: &PostFields<'_>,
) -> AppResult<Post> {
    let conn = state.db.get()?;
    posts::update(&conn, id, owner_id, fields)
}

/// PUT /post/{id}: owner-only update of title, content and image.
async fn update_post(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<String>,
    multipart: Multipart,
) -> AppResult<Json<Value>> {
    let id = parse_id(&id, "Post")?;
    let mut form = UploadForm::read(multipart, "img", state.uploads.max_bytes()).await?;

    let existing = {
        let conn = state.db.get()?;
        posts::find_owned(&conn, id, current.id())?
    };

    let title = non_blank(form.text("title"), "Title")?
        .map(str::to_string)
        .unwrap_or_else(|| existing.title.clone());
    let content = non_blank(form.text("content"), "Content")?
        .map(str::to_string)
        .unwrap_or_else(|| existing.content.clone());
    check_title(&title)?;

    let change = ImageChange::from_form(form.flag("removeImg"), form.take_file());
    let replacement = state
        .uploads
        .replace_image(&POST_IMAGE, existing.img.as_deref(), change)?;

    let fields = PostFields {
        title: &title,
        content: &content,
        img: replacement.reference.as_deref(),
    };
    let post = match apply_update(&state, id, current.id(), &fields) {
        Ok(post) => post,
        Err(e) => {
            state.uploads.rollback(&replacement);
            return Err(e);
        }
    };
    state.uploads.discard_stale(&replacement);

    Ok(Json(json!({
        "success": true,
        "message": "Post updated",
        "post": post,
    })))
}

/// DELETE /post/{id}: owner-only; comments go with the post.
async fn delete_post(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    let id = parse_id(&id, "Post")?;
    let removed = {
        let conn = state.db.get()?;
        posts::delete(&conn, id, current.id())?
    };
    if let Some(img) = &removed.img {
        state.uploads.discard(img);
    }

    Ok(Json(json!({
        "success": true,
        "message": "Post deleted",
    })))
}

/// GET /post/user/{user_id}: all posts by one user, newest first.
async fn list_user_posts(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> AppResult<Json<Value>> {
    let user_id = parse_id(&user_id, "User")?;
    let conn = state.db.get()?;
    let posts = posts::list_by_owner(&conn, user_id)?;

    Ok(Json(json!({
        "success": true,
        "message": "Posts loaded",
        "posts": posts,
    })))
}
