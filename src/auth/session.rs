use axum::http::{header, HeaderMap};
use rand::Rng;
use rusqlite::{params, Connection, OptionalExtension};

use crate::db::models::User;

/// Create a new session for a user. Returns the session token.
/// Expired rows are swept on the way in.
pub fn create_session(conn: &Connection, user_id: i64, hours: u64) -> rusqlite::Result<String> {
    let purged = purge_expired(conn)?;
    if purged > 0 {
        tracing::debug!("Purged {} expired sessions", purged);
    }

    let token = generate_token();
    let id = uuid::Uuid::now_v7().to_string();

    conn.execute(
        "INSERT INTO sessions (id, user_id, token, expires_at) VALUES (?1, ?2, ?3, datetime('now', ?4))",
        params![id, user_id, token, format!("+{} hours", hours)],
    )?;

    Ok(token)
}

/// Delete a session by token. Returns whether a session was removed.
pub fn delete_session(conn: &Connection, token: &str) -> rusqlite::Result<bool> {
    let removed = conn.execute("DELETE FROM sessions WHERE token = ?1", params![token])?;
    Ok(removed > 0)
}

/// Resolve a token to its live, non-deleted user.
pub fn resolve_session(conn: &Connection, token: &str) -> rusqlite::Result<Option<User>> {
    conn.query_row(
        "SELECT u.id AS id, u.userid AS userid, u.password_hash AS password_hash,
                u.nick AS nick, u.profile AS profile, u.profile_text AS profile_text,
                u.created_at AS created_at, u.updated_at AS updated_at
         FROM sessions s
         JOIN users u ON u.id = s.user_id
         WHERE s.token = ?1 AND s.expires_at > datetime('now') AND u.deleted_at IS NULL",
        params![token],
        User::from_row,
    )
    .optional()
}

pub fn purge_expired(conn: &Connection) -> rusqlite::Result<usize> {
    conn.execute(
        "DELETE FROM sessions WHERE expires_at <= datetime('now')",
        [],
    )
}

pub fn session_cookie(name: &str, token: &str, max_age_hours: u64) -> String {
    let max_age_secs = max_age_hours * 3600;
    format!(
        "{}={}; HttpOnly; SameSite=Strict; Path=/; Max-Age={}",
        name, token, max_age_secs
    )
}

pub fn clear_session_cookie(name: &str) -> String {
    format!("{}=; HttpOnly; SameSite=Strict; Path=/; Max-Age=0", name)
}

pub fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|s| s.split(';'))
        .map(|s| s.trim())
        .find_map(|cookie| {
            let mut split = cookie.splitn(2, '=');
            let key = split.next()?.trim();
            let val = split.next()?.trim();
            if key == name && !val.is_empty() {
                Some(val)
            } else {
                None
            }
        })
}

/// Generate a cryptographically random 32-byte hex token.
fn generate_token() -> String {
    let bytes: [u8; 32] = rand::thread_rng().gen();
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::{insert_user, migrated_pool};
    use crate::db::users;
    use axum::http::HeaderValue;

    #[test]
    fn generate_token_is_64_hex_chars() {
        let token = generate_token();
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn generate_token_is_unique() {
        assert_ne!(generate_token(), generate_token());
    }

    #[test]
    fn session_resolves_until_deleted() {
        let pool = migrated_pool();
        let conn = pool.get().unwrap();
        let alice = insert_user(&conn, "alice", "Alice");

        let token = create_session(&conn, alice.id, 1).unwrap();
        let resolved = resolve_session(&conn, &token).unwrap().unwrap();
        assert_eq!(resolved.id, alice.id);

        assert!(delete_session(&conn, &token).unwrap());
        assert!(resolve_session(&conn, &token).unwrap().is_none());
        assert!(!delete_session(&conn, &token).unwrap());
    }

    #[test]
    fn unknown_token_does_not_resolve() {
        let pool = migrated_pool();
        let conn = pool.get().unwrap();
        assert!(resolve_session(&conn, "nope").unwrap().is_none());
    }

    #[test]
    fn expired_sessions_do_not_resolve_and_are_purged() {
        let pool = migrated_pool();
        let conn = pool.get().unwrap();
        let alice = insert_user(&conn, "alice", "Alice");
        let live = create_session(&conn, alice.id, 1).unwrap();
        insert_stale_session(&conn, alice.id, "stale-token");

        assert!(resolve_session(&conn, "stale-token").unwrap().is_none());
        assert_eq!(purge_expired(&conn).unwrap(), 1);
        assert!(resolve_session(&conn, &live).unwrap().is_some());
    }

    fn insert_stale_session(conn: &Connection, user_id: i64, token: &str) {
        conn.execute(
            "INSERT INTO sessions (id, user_id, token, expires_at)
             VALUES (?1, ?2, ?1, datetime('now', '-1 hours'))",
            params![token, user_id],
        )
        .unwrap();
    }

    #[test]
    fn new_session_sweeps_expired_rows() {
        let pool = migrated_pool();
        let conn = pool.get().unwrap();
        let alice = insert_user(&conn, "alice", "Alice");
        insert_stale_session(&conn, alice.id, "stale-a");
        insert_stale_session(&conn, alice.id, "stale-b");

        create_session(&conn, alice.id, 1).unwrap();

        let remaining: i64 = conn
            .query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get(0))
            .unwrap();
        assert_eq!(remaining, 1);
    }

    #[test]
    fn soft_deleted_user_loses_session() {
        let pool = migrated_pool();
        let conn = pool.get().unwrap();
        let alice = insert_user(&conn, "alice", "Alice");
        let token = create_session(&conn, alice.id, 1).unwrap();

        users::soft_delete(&conn, alice.id).unwrap();
        assert!(resolve_session(&conn, &token).unwrap().is_none());
    }

    #[test]
    fn cookie_value_finds_named_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; blogboard_session=abc123; other=1"),
        );
        assert_eq!(cookie_value(&headers, "blogboard_session"), Some("abc123"));
        assert_eq!(cookie_value(&headers, "missing"), None);
    }

    #[test]
    fn empty_cookie_value_is_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("blogboard_session="));
        assert_eq!(cookie_value(&headers, "blogboard_session"), None);
    }

    #[test]
    fn cookies_carry_name_and_lifetime() {
        assert_eq!(
            session_cookie("sid", "tok", 2),
            "sid=tok; HttpOnly; SameSite=Strict; Path=/; Max-Age=7200"
        );
        assert!(clear_session_cookie("sid").contains("Max-Age=0"));
    }
}
