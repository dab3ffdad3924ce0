use axum::extract::{Multipart, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::auth::{authenticate, password, session};
use crate::db::users::{self, NewUser};
use crate::error::{AppError, AppResult};
use crate::extractors::{CurrentUser, MaybeUser};
use crate::state::AppState;
use crate::uploads::{UploadForm, AVATAR};

const MAX_USERID_LEN: usize = 40;
const MAX_NICK_LEN: usize = 40;

// -- Request types --

#[derive(Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub userid: String,
    #[serde(default)]
    pub password: String,
}

fn required<'a>(value: Option<&'a str>, max_len: usize, label: &str) -> AppResult<&'a str> {
    let value = value.map(str::trim).unwrap_or_default();
    if value.is_empty() {
        return Err(AppError::BadRequest("All fields are required".into()));
    }
    if value.chars().count() > max_len {
        return Err(AppError::BadRequest(format!(
            "{} must be {} characters or less",
            label, max_len
        )));
    }
    Ok(value)
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

// -- Signup --

/// POST /auth/join: create an account, optionally with an avatar upload.
pub async fn join(State(state): State<AppState>, multipart: Multipart) -> AppResult<Response> {
    let mut form = UploadForm::read(multipart, "profileImage", state.uploads.max_bytes()).await?;

    let userid = required(form.text("userid"), MAX_USERID_LEN, "Login id")?.to_string();
    let nick = required(form.text("nick"), MAX_NICK_LEN, "Nickname")?.to_string();
    let plaintext = form.text("password").unwrap_or_default().to_string();
    if plaintext.is_empty() {
        return Err(AppError::BadRequest("All fields are required".into()));
    }

    {
        let conn = state.db.get()?;
        if users::userid_taken(&conn, &userid)? {
            return Err(AppError::Conflict("Login id already exists".into()));
        }
    }

    let hash = password::hash_password(&plaintext, state.config.auth.bcrypt_cost)?;

    let avatar = match form.take_file() {
        Some(file) => Some(state.uploads.save(&AVATAR, &file)?),
        None => None,
    };

    let created = {
        let conn = state.db.get()?;
        users::create(
            &conn,
            &NewUser {
                userid: &userid,
                password_hash: &hash,
                nick: &nick,
                profile: avatar.as_deref(),
            },
        )
    };

    let user = match created {
        Ok(user) => user,
        Err(e) => {
            if let Some(avatar) = &avatar {
                state.uploads.discard(avatar);
            }
            if is_unique_violation(&e) {
                return Err(AppError::Conflict("Login id already exists".into()));
            }
            return Err(e.into());
        }
    };

    tracing::info!("New account {} ({})", user.userid, user.id);

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": "Signup complete",
            "user": user.summary(),
        })),
    )
        .into_response())
}

// -- Login / logout --

/// POST /auth/login: verify credentials and start a session.
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, axum::extract::rejection::JsonRejection>,
) -> AppResult<Response> {
    let Json(req) = payload?;
    let userid = req.userid.trim();
    if userid.is_empty() || req.password.is_empty() {
        return Err(AppError::BadRequest("Login id and password are required".into()));
    }

    let conn = state.db.get()?;
    let user = authenticate(&conn, userid, &req.password, state.config.auth.bcrypt_cost)?;
    let token = session::create_session(&conn, user.id, state.config.auth.session_hours)?;

    tracing::info!("User {} logged in", user.userid);

    let cookie = session::session_cookie(
        &state.config.auth.cookie_name,
        &token,
        state.config.auth.session_hours,
    );

    Ok((
        StatusCode::OK,
        [(header::SET_COOKIE, cookie)],
        Json(json!({
            "success": true,
            "message": "Logged in",
            "user": user.summary(),
        })),
    )
        .into_response())
}

/// GET /auth/logout: destroy the caller's session.
pub async fn logout(State(state): State<AppState>, current: CurrentUser) -> AppResult<Response> {
    let conn = state.db.get()?;
    session::delete_session(&conn, &current.token)?;

    tracing::info!("User {} logged out", current.user.userid);

    Ok((
        StatusCode::OK,
        [(
            header::SET_COOKIE,
            session::clear_session_cookie(&state.config.auth.cookie_name),
        )],
        Json(json!({ "success": true, "message": "Logged out" })),
    )
        .into_response())
}

/// GET /auth/status: report whether the caller holds a valid session.
pub async fn status(MaybeUser(current): MaybeUser) -> Json<serde_json::Value> {
    match current {
        Some(current) => Json(json!({
            "success": true,
            "message": "Authenticated",
            "isAuthenticated": true,
            "user": current.user.summary(),
        })),
        None => Json(json!({
            "success": true,
            "message": "Not authenticated",
            "isAuthenticated": false,
        })),
    }
}
