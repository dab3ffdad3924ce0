use axum::extract::{Multipart, Path, State};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};

use crate::db::models::{User, DEFAULT_AVATAR};
use crate::db::users;
use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::routes::parse_id;
use crate::state::AppState;
use crate::uploads::{ImageChange, UploadForm, AVATAR};

const MAX_PROFILE_TEXT_LEN: usize = 200;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/page/profile", get(own_profile).put(update_profile))
        .route("/page/profile/{id}", get(user_profile))
}

/// GET /page/profile
async fn own_profile(current: CurrentUser) -> Json<Value> {
    Json(json!({
        "success": true,
        "message": "Profile loaded",
        "user": current.user,
    }))
}

/// GET /page/profile/{id}
async fn user_profile(
    State(state): State<AppState>,
    _current: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    let id = parse_id(&id, "User")?;
    let conn = state.db.get()?;
    let user = users::find_by_id(&conn, id)?.ok_or(AppError::NotFound("User"))?;

    Ok(Json(json!({
        "success": true,
        "message": "Profile loaded",
        "user": user,
    })))
}

fn profile_text_or_greeting(raw: Option<&str>, nick: &str) -> AppResult<String> {
    let text = raw.map(str::trim).filter(|s| !s.is_empty());
    match text {
        Some(text) if text.chars().count() > MAX_PROFILE_TEXT_LEN => Err(AppError::BadRequest(
            format!("Profile text must be {} characters or less", MAX_PROFILE_TEXT_LEN),
        )),
        Some(text) => Ok(text.to_string()),
        None => Ok(format!("Hello, I'm {}.", nick)),
    }
}

fn save_profile(state: &AppState, id: i64, profile_text: &str, avatar: &str) -> AppResult<User> {
    let conn = state.db.get()?;
    users::update_profile(&conn, id, profile_text, avatar)?.ok_or(AppError::NotFound("User"))
}

/// PUT /page/profile: update profile text and avatar.
async fn update_profile(
    State(state): State<AppState>,
    current: CurrentUser,
    multipart: Multipart,
) -> AppResult<Json<Value>> {
    let mut form = UploadForm::read(multipart, "profile", state.uploads.max_bytes()).await?;
    let profile_text = profile_text_or_greeting(form.text("profileText"), &current.user.nick)?;
    let change = ImageChange::from_form(form.flag("removeImg"), form.take_file());

    let replacement = state
        .uploads
        .replace_image(&AVATAR, Some(current.user.profile.as_str()), change)?;
    let avatar = replacement.reference.as_deref().unwrap_or(DEFAULT_AVATAR);

    let user = match save_profile(&state, current.id(), &profile_text, avatar) {
        Ok(user) => user,
        Err(e) => {
            state.uploads.rollback(&replacement);
            return Err(e);
        }
    };
    state.uploads.discard_stale(&replacement);

    Ok(Json(json!({
        "success": true,
        "message": "Profile updated",
        "user": user,
    })))
}
