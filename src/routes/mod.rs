pub mod auth;
pub mod comment;
pub mod page;
pub mod post;

use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue, Method};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::set_header::SetResponseHeader;
use tower_http::trace::TraceLayer;

use crate::error::AppError;
use crate::state::AppState;
use crate::uploads::PUBLIC_PREFIX;

/// Slack on top of the image ceiling for the text fields of a multipart body.
const FORM_OVERHEAD_BYTES: usize = 1024 * 1024;

/// Build the full application router.
pub fn app(state: AppState) -> Router {
    let body_limit = state.uploads.max_bytes() + FORM_OVERHEAD_BYTES;

    let mut app = Router::new()
        .merge(auth::router())
        .merge(page::router())
        .merge(post::router())
        .merge(comment::router())
        .nest_service(
            PUBLIC_PREFIX,
            SetResponseHeader::overriding(
                ServeDir::new(state.uploads.root()),
                header::X_CONTENT_TYPE_OPTIONS,
                HeaderValue::from_static("nosniff"),
            ),
        )
        .layer(DefaultBodyLimit::max(body_limit));

    if let Some(origin) = state.config.server.cors_origin.as_deref() {
        match origin.parse::<HeaderValue>() {
            Ok(origin) => {
                app = app.layer(
                    CorsLayer::new()
                        .allow_origin(origin)
                        .allow_credentials(true)
                        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
                        .allow_headers([header::CONTENT_TYPE]),
                );
            }
            Err(e) => tracing::warn!("Ignoring invalid cors_origin {:?}: {}", origin, e),
        }
    }

    app.layer(TraceLayer::new_for_http()).with_state(state)
}

/// Parse a numeric path id. Anything unparsable cannot name an existing
/// row, so it is reported as not found.
pub(crate) fn parse_id(raw: &str, kind: &'static str) -> Result<i64, AppError> {
    raw.trim().parse::<i64>().map_err(|_| AppError::NotFound(kind))
}

/// Trimmed value of an optional text field; a present-but-blank value is
/// a validation error.
pub(crate) fn non_blank<'a>(value: Option<&'a str>, label: &str) -> Result<Option<&'a str>, AppError> {
    match value.map(str::trim) {
        Some("") => Err(AppError::BadRequest(format!("{} cannot be empty", label))),
        other => Ok(other),
    }
}
