use rusqlite::{params, Connection, OptionalExtension};

use super::models::{Comment, CommentListItem, UserSummary};
use super::{posts, NOW};
use crate::error::{AppError, AppResult};
use crate::ownership::require_owned;
use crate::pagination::PageWindow;

/// Insert a comment by `owner_id` on `post_id`. The post must exist.
pub fn create(conn: &Connection, owner_id: i64, post_id: i64, content: &str) -> AppResult<Comment> {
    if !posts::exists(conn, post_id)? {
        return Err(AppError::InvalidReference(format!(
            "Post {} does not exist",
            post_id
        )));
    }
    conn.execute(
        "INSERT INTO comments (post_id, user_id, content) VALUES (?1, ?2, ?3)",
        params![post_id, owner_id, content],
    )?;
    let id = conn.last_insert_rowid();
    get(conn, id)?.ok_or(AppError::NotFound("Comment"))
}

pub fn get(conn: &Connection, id: i64) -> rusqlite::Result<Option<Comment>> {
    conn.query_row(
        &format!("SELECT {} FROM comments c WHERE c.id = ?1", Comment::COLUMNS),
        params![id],
        Comment::from_row,
    )
    .optional()
}

pub fn find_owned(conn: &Connection, id: i64, owner_id: i64) -> AppResult<Comment> {
    let found = conn
        .query_row(
            &format!(
                "SELECT {} FROM comments c WHERE c.id = ?1 AND c.user_id = ?2",
                Comment::COLUMNS
            ),
            params![id, owner_id],
            Comment::from_row,
        )
        .optional()?;
    require_owned(found, owner_id)
}

pub fn update(conn: &Connection, id: i64, owner_id: i64, content: &str) -> AppResult<Comment> {
    find_owned(conn, id, owner_id)?;
    conn.execute(
        &format!(
            "UPDATE comments SET content = ?1, updated_at = {NOW}
             WHERE id = ?2 AND user_id = ?3"
        ),
        params![content, id, owner_id],
    )?;
    find_owned(conn, id, owner_id)
}

pub fn delete(conn: &Connection, id: i64, owner_id: i64) -> AppResult<Comment> {
    let comment = find_owned(conn, id, owner_id)?;
    conn.execute(
        "DELETE FROM comments WHERE id = ?1 AND user_id = ?2",
        params![id, owner_id],
    )?;
    Ok(comment)
}

pub fn list_by_owner(conn: &Connection, owner_id: i64) -> rusqlite::Result<Vec<Comment>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM comments c WHERE c.user_id = ?1
         ORDER BY c.created_at DESC, c.id DESC",
        Comment::COLUMNS
    ))?;
    let comments = stmt
        .query_map(params![owner_id], Comment::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(comments)
}

pub fn count_for_post(conn: &Connection, post_id: i64) -> rusqlite::Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM comments WHERE post_id = ?1",
        params![post_id],
        |row| row.get(0),
    )
}

/// One page of a post's comments, newest first, numbered over the post's
/// full ascending comment ordering.
pub fn list_page_for_post(
    conn: &Connection,
    post_id: i64,
    window: &PageWindow,
) -> rusqlite::Result<Vec<CommentListItem>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {},
                ROW_NUMBER() OVER (ORDER BY c.created_at ASC, c.id ASC) AS number,
                u.id AS owner_id, u.userid AS owner_userid,
                u.nick AS owner_nick, u.profile AS owner_profile
         FROM comments c
         LEFT JOIN users u ON u.id = c.user_id AND u.deleted_at IS NULL
         WHERE c.post_id = ?1
         ORDER BY c.created_at DESC, c.id DESC
         LIMIT ?2 OFFSET ?3",
        Comment::COLUMNS
    ))?;
    let comments = stmt
        .query_map(params![post_id, window.limit, window.offset], |row| {
            Ok(CommentListItem {
                comment: Comment::from_row(row)?,
                number: row.get("number")?,
                user: UserSummary::from_joined_row(row)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(comments)
}
