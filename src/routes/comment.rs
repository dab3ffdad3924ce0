use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, put};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::db::comments;
use crate::db::models::AuthoredComment;
use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::pagination::{paginate, PageQuery, COMMENT_PAGE_LIMIT};
use crate::routes::parse_id;
use crate::state::AppState;

const MAX_COMMENT_LEN: usize = 1000;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/comment", get(list_comments).post(create_comment))
        .route("/comment/{id}", put(update_comment).delete(delete_comment))
}

// -- Request types --

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCommentRequest {
    pub content: Option<String>,
    /// Accepted as a JSON number or a numeric string.
    pub post_id: Option<Value>,
}

#[derive(Deserialize)]
pub struct UpdateCommentRequest {
    pub content: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentListQuery {
    pub post_id: Option<String>,
    pub page: Option<String>,
    pub limit: Option<String>,
}

fn post_id_from(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn comment_body(content: Option<&str>) -> AppResult<&str> {
    let content = content.map(str::trim).unwrap_or_default();
    if content.is_empty() {
        return Err(AppError::BadRequest("Comment content is required".into()));
    }
    if content.chars().count() > MAX_COMMENT_LEN {
        return Err(AppError::BadRequest(format!(
            "Comment must be {} characters or less",
            MAX_COMMENT_LEN
        )));
    }
    Ok(content)
}

// -- Handlers --

/// POST /comment: any logged-in user may comment on an existing post.
async fn create_comment(
    State(state): State<AppState>,
    current: CurrentUser,
    payload: Result<Json<CreateCommentRequest>, JsonRejection>,
) -> AppResult<Response> {
    let Json(req) = payload?;
    let (Some(content), Some(post_id)) = (req.content.as_deref(), req.post_id.as_ref()) else {
        return Err(AppError::BadRequest(
            "Comment content and post id are required".into(),
        ));
    };
    let content = comment_body(Some(content))?;
    let post_id = post_id_from(post_id)
        .ok_or_else(|| AppError::InvalidReference("Post id must be a number".into()))?;

    let conn = state.db.get()?;
    let comment = comments::create(&conn, current.id(), post_id, content)?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": "Comment created",
            "comment": AuthoredComment {
                comment,
                user: current.user.summary(),
            },
        })),
    )
        .into_response())
}

/// GET /comment?postId=..&page=..&limit=..: newest first.
async fn list_comments(
    State(state): State<AppState>,
    Query(query): Query<CommentListQuery>,
) -> AppResult<Json<Value>> {
    let post_id = query
        .post_id
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::BadRequest("Post id is required".into()))?;
    let post_id: i64 = post_id
        .parse()
        .map_err(|_| AppError::BadRequest("Post id must be a number".into()))?;

    let request = PageQuery {
        page: query.page,
        limit: query.limit,
    }
    .resolve(COMMENT_PAGE_LIMIT);

    let conn = state.db.get()?;
    let total = comments::count_for_post(&conn, post_id)?;
    let window = paginate(request, total);
    let comments = comments::list_page_for_post(&conn, post_id, &window)?;

    Ok(Json(json!({
        "success": true,
        "message": "Comments loaded",
        "comments": comments,
        "pagination": window.summary(total),
    })))
}

/// PUT /comment/{id}: author-only.
async fn update_comment(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<String>,
    payload: Result<Json<UpdateCommentRequest>, JsonRejection>,
) -> AppResult<Json<Value>> {
    let id = parse_id(&id, "Comment")?;
    let Json(req) = payload?;
    let content = comment_body(req.content.as_deref())?;

    let conn = state.db.get()?;
    let comment = comments::update(&conn, id, current.id(), content)?;

    Ok(Json(json!({
        "success": true,
        "message": "Comment updated",
        "comment": comment,
    })))
}

/// DELETE /comment/{id}: author-only.
async fn delete_comment(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    let id = parse_id(&id, "Comment")?;
    let conn = state.db.get()?;
    comments::delete(&conn, id, current.id())?;

    Ok(Json(json!({
        "success": true,
        "message": "Comment deleted",
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn post_id_accepts_numbers_and_numeric_strings() {
        assert_eq!(post_id_from(&json!(12)), Some(12));
        assert_eq!(post_id_from(&json!(" 12 ")), Some(12));
        assert_eq!(post_id_from(&json!("twelve")), None);
        assert_eq!(post_id_from(&json!(null)), None);
        assert_eq!(post_id_from(&json!(1.5)), None);
    }

    #[test]
    fn comment_body_must_have_content() {
        assert_eq!(comment_body(Some("  nice  ")).unwrap(), "nice");
        assert!(comment_body(Some("   ")).is_err());
        assert!(comment_body(None).is_err());
        assert!(comment_body(Some(&"x".repeat(MAX_COMMENT_LEN + 1))).is_err());
    }
}
