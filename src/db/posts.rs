use rusqlite::{params, Connection, OptionalExtension};

use super::models::{Post, PostDetail, PostListItem, User, UserSummary};
use super::NOW;
use crate::error::AppResult;
use crate::ownership::require_owned;
use crate::pagination::PageWindow;

const OWNER_COLUMNS: &str = "u.id AS owner_id, u.userid AS owner_userid, \
     u.nick AS owner_nick, u.profile AS owner_profile";

const OWNER_JOIN: &str = "LEFT JOIN users u ON u.id = p.user_id AND u.deleted_at IS NULL";

pub struct NewPost<'a> {
    pub title: &'a str,
    pub content: &'a str,
    pub img: Option<&'a str>,
}

/// Full replacement values for an update; callers merge partial input
/// against the stored post first.
pub struct PostFields<'a> {
    pub title: &'a str,
    pub content: &'a str,
    pub img: Option<&'a str>,
}

/// Insert a post owned by `owner`, snapshotting the owner's nickname and
/// avatar onto the row.
pub fn create(conn: &Connection, owner: &User, new: &NewPost<'_>) -> rusqlite::Result<Post> {
    conn.execute(
        "INSERT INTO posts (user_id, title, content, img, nick, profile)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            owner.id,
            new.title,
            new.content,
            new.img,
            owner.nick,
            owner.profile
        ],
    )?;
    let id = conn.last_insert_rowid();
    get(conn, id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)
}

pub fn get(conn: &Connection, id: i64) -> rusqlite::Result<Option<Post>> {
    conn.query_row(
        &format!("SELECT {} FROM posts p WHERE p.id = ?1", Post::COLUMNS),
        params![id],
        Post::from_row,
    )
    .optional()
}

pub fn exists(conn: &Connection, id: i64) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT COUNT(*) > 0 FROM posts WHERE id = ?1",
        params![id],
        |row| row.get(0),
    )
}

pub fn get_with_owner(conn: &Connection, id: i64) -> rusqlite::Result<Option<PostDetail>> {
    conn.query_row(
        &format!(
            "SELECT {}, {OWNER_COLUMNS} FROM posts p {OWNER_JOIN} WHERE p.id = ?1",
            Post::COLUMNS
        ),
        params![id],
        |row| {
            Ok(PostDetail {
                post: Post::from_row(row)?,
                user: UserSummary::from_joined_row(row)?,
            })
        },
    )
    .optional()
}

/// Fetch a post scoped to its owner. Missing and foreign posts both come
/// back as not found.
pub fn find_owned(conn: &Connection, id: i64, owner_id: i64) -> AppResult<Post> {
    let found = conn
        .query_row(
            &format!(
                "SELECT {} FROM posts p WHERE p.id = ?1 AND p.user_id = ?2",
                Post::COLUMNS
            ),
            params![id, owner_id],
            Post::from_row,
        )
        .optional()?;
    require_owned(found, owner_id)
}

pub fn update(
    conn: &Connection,
    id: i64,
    owner_id: i64,
    fields: &PostFields<'_>,
) -> AppResult<Post> {
    find_owned(conn, id, owner_id)?;
    conn.execute(
        &format!(
            "UPDATE posts SET title = ?1, content = ?2, img = ?3, updated_at = {NOW}
             WHERE id = ?4 AND user_id = ?5"
        ),
        params![fields.title, fields.content, fields.img, id, owner_id],
    )?;
    find_owned(conn, id, owner_id)
}

/// Delete a post and, through the foreign key cascade, its comments.
/// Returns the removed row so the caller can clean up its image.
pub fn delete(conn: &Connection, id: i64, owner_id: i64) -> AppResult<Post> {
    let post = find_owned(conn, id, owner_id)?;
    conn.execute(
        "DELETE FROM posts WHERE id = ?1 AND user_id = ?2",
        params![id, owner_id],
    )?;
    Ok(post)
}

pub fn list_by_owner(conn: &Connection, owner_id: i64) -> rusqlite::Result<Vec<Post>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM posts p WHERE p.user_id = ?1
         ORDER BY p.created_at DESC, p.id DESC",
        Post::COLUMNS
    ))?;
    let posts = stmt
        .query_map(params![owner_id], Post::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(posts)
}

pub fn count(conn: &Connection) -> rusqlite::Result<i64> {
    conn.query_row("SELECT COUNT(*) FROM posts", [], |row| row.get(0))
}

/// One page of posts, newest first. Row numbers are assigned over the
/// whole table in ascending creation order before the window is applied.
pub fn list_page(conn: &Connection, window: &PageWindow) -> rusqlite::Result<Vec<PostListItem>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {},
                ROW_NUMBER() OVER (ORDER BY p.created_at ASC, p.id ASC) AS number,
                {OWNER_COLUMNS}
         FROM posts p {OWNER_JOIN}
         ORDER BY p.created_at DESC, p.id DESC
         LIMIT ?1 OFFSET ?2",
        Post::COLUMNS
    ))?;
    let posts = stmt
        .query_map(params![window.limit, window.offset], |row| {
            Ok(PostListItem {
                post: Post::from_row(row)?,
                number: row.get("number")?,
                user: UserSummary::from_joined_row(row)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(posts)
}
