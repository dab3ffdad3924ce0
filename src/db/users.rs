//! Identity store. Soft-deleted users are invisible to every lookup here
//! except [`userid_taken`], since their login ids stay reserved.

use rusqlite::{params, Connection, OptionalExtension};

use super::models::{User, DEFAULT_AVATAR};
use super::NOW;

pub struct NewUser<'a> {
    pub userid: &'a str,
    pub password_hash: &'a str,
    pub nick: &'a str,
    pub profile: Option<&'a str>,
}

pub fn create(conn: &Connection, new: &NewUser<'_>) -> rusqlite::Result<User> {
    conn.execute(
        "INSERT INTO users (userid, password_hash, nick, profile) VALUES (?1, ?2, ?3, ?4)",
        params![
            new.userid,
            new.password_hash,
            new.nick,
            new.profile.unwrap_or(DEFAULT_AVATAR)
        ],
    )?;
    let id = conn.last_insert_rowid();
    conn.query_row(
        &format!("SELECT {} FROM users WHERE id = ?1", User::COLUMNS),
        params![id],
        User::from_row,
    )
}

pub fn find_by_id(conn: &Connection, id: i64) -> rusqlite::Result<Option<User>> {
    conn.query_row(
        &format!(
            "SELECT {} FROM users WHERE id = ?1 AND deleted_at IS NULL",
            User::COLUMNS
        ),
        params![id],
        User::from_row,
    )
    .optional()
}

pub fn find_by_userid(conn: &Connection, userid: &str) -> rusqlite::Result<Option<User>> {
    conn.query_row(
        &format!(
            "SELECT {} FROM users WHERE userid = ?1 AND deleted_at IS NULL",
            User::COLUMNS
        ),
        params![userid],
        User::from_row,
    )
    .optional()
}

pub fn userid_taken(conn: &Connection, userid: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT COUNT(*) > 0 FROM users WHERE userid = ?1",
        params![userid],
        |row| row.get(0),
    )
}

/// Overwrite profile text and avatar reference. Returns the refreshed row,
/// or `None` if the user no longer exists.
pub fn update_profile(
    conn: &Connection,
    id: i64,
    profile_text: &str,
    profile: &str,
) -> rusqlite::Result<Option<User>> {
    let updated = conn.execute(
        &format!(
            "UPDATE users SET profile_text = ?1, profile = ?2, updated_at = {NOW}
             WHERE id = ?3 AND deleted_at IS NULL"
        ),
        params![profile_text, profile, id],
    )?;
    if updated == 0 {
        return Ok(None);
    }
    find_by_id(conn, id)
}

/// Mark a user deleted without removing the row. Their sessions are dropped.
///
/// Store-level operation with no HTTP route; account removal is an
/// administrative action taken against the database directly.
pub fn soft_delete(conn: &Connection, id: i64) -> rusqlite::Result<bool> {
    let updated = conn.execute(
        &format!("UPDATE users SET deleted_at = {NOW} WHERE id = ?1 AND deleted_at IS NULL"),
        params![id],
    )?;
    conn.execute("DELETE FROM sessions WHERE user_id = ?1", params![id])?;
    Ok(updated > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::{insert_user, migrated_pool};

    #[test]
    fn create_defaults_avatar_to_placeholder() {
        let pool = migrated_pool();
        let conn = pool.get().unwrap();
        let user = insert_user(&conn, "alice", "Alice");
        assert_eq!(user.userid, "alice");
        assert_eq!(user.nick, "Alice");
        assert_eq!(user.profile, DEFAULT_AVATAR);
        assert!(user.profile_text.is_none());
    }

    #[test]
    fn create_keeps_uploaded_avatar() {
        let pool = migrated_pool();
        let conn = pool.get().unwrap();
        let user = create(
            &conn,
            &NewUser {
                userid: "bob",
                password_hash: "h",
                nick: "Bob",
                profile: Some("/uploads/profiles/bob_1.png"),
            },
        )
        .unwrap();
        assert_eq!(user.profile, "/uploads/profiles/bob_1.png");
    }

    #[test]
    fn duplicate_userid_is_rejected_by_schema() {
        let pool = migrated_pool();
        let conn = pool.get().unwrap();
        insert_user(&conn, "alice", "Alice");
        let again = create(
            &conn,
            &NewUser {
                userid: "alice",
                password_hash: "h",
                nick: "Other",
                profile: None,
            },
        );
        assert!(again.is_err());
    }

    #[test]
    fn lookups_find_live_users() {
        let pool = migrated_pool();
        let conn = pool.get().unwrap();
        let user = insert_user(&conn, "alice", "Alice");
        assert_eq!(find_by_id(&conn, user.id).unwrap().unwrap().userid, "alice");
        assert_eq!(find_by_userid(&conn, "alice").unwrap().unwrap().id, user.id);
        assert!(find_by_userid(&conn, "nobody").unwrap().is_none());
        assert!(find_by_id(&conn, 4242).unwrap().is_none());
    }

    #[test]
    fn soft_deleted_users_disappear_but_keep_their_login_id() {
        let pool = migrated_pool();
        let conn = pool.get().unwrap();
        let user = insert_user(&conn, "alice", "Alice");

        assert!(soft_delete(&conn, user.id).unwrap());
        assert!(!soft_delete(&conn, user.id).unwrap());

        assert!(find_by_id(&conn, user.id).unwrap().is_none());
        assert!(find_by_userid(&conn, "alice").unwrap().is_none());
        assert!(userid_taken(&conn, "alice").unwrap());

        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM users", [], |r| r.get(0))
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[test]
    fn update_profile_overwrites_text_and_avatar() {
        let pool = migrated_pool();
        let conn = pool.get().unwrap();
        let user = insert_user(&conn, "alice", "Alice");

        let updated = update_profile(&conn, user.id, "about me", "/uploads/profiles/a.png")
            .unwrap()
            .unwrap();
        assert_eq!(updated.profile_text.as_deref(), Some("about me"));
        assert_eq!(updated.profile, "/uploads/profiles/a.png");
    }

    #[test]
    fn update_profile_of_missing_user_returns_none() {
        let pool = migrated_pool();
        let conn = pool.get().unwrap();
        assert!(update_profile(&conn, 77, "x", DEFAULT_AVATAR)
            .unwrap()
            .is_none());
    }
}
