use rusqlite::Row;
use serde::Serialize;

/// Avatar reference assigned to accounts that never uploaded one.
pub const DEFAULT_AVATAR: &str = "/uploads/profiles/default_profile.png";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub userid: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub nick: String,
    pub profile: String,
    pub profile_text: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl User {
    pub(crate) const COLUMNS: &'static str =
        "id, userid, password_hash, nick, profile, profile_text, created_at, updated_at";

    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            userid: row.get("userid")?,
            password_hash: row.get("password_hash")?,
            nick: row.get("nick")?,
            profile: row.get("profile")?,
            profile_text: row.get("profile_text")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }

    pub fn summary(&self) -> UserSummary {
        UserSummary {
            id: self.id,
            userid: self.userid.clone(),
            nick: self.nick.clone(),
            profile: self.profile.clone(),
        }
    }
}

/// Minimal identity projection shown next to posts, comments and in the
/// session status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserSummary {
    pub id: i64,
    pub userid: String,
    pub nick: String,
    pub profile: String,
}

impl UserSummary {
    /// Reads the `owner_*` columns of a LEFT JOIN against users. A missing
    /// or soft-deleted owner yields `None`.
    pub(crate) fn from_joined_row(row: &Row<'_>) -> rusqlite::Result<Option<Self>> {
        let id: Option<i64> = row.get("owner_id")?;
        match id {
            Some(id) => Ok(Some(Self {
                id,
                userid: row.get("owner_userid")?,
                nick: row.get("owner_nick")?,
                profile: row.get("owner_profile")?,
            })),
            None => Ok(None),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub img: Option<String>,
    pub user_id: i64,
    /// Owner nickname copied at creation time.
    pub nick: String,
    /// Owner avatar copied at creation time.
    pub profile: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Post {
    pub(crate) const COLUMNS: &'static str =
        "p.id AS id, p.title AS title, p.content AS content, p.img AS img, \
         p.user_id AS user_id, p.nick AS nick, p.profile AS profile, \
         p.created_at AS created_at, p.updated_at AS updated_at";

    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            title: row.get("title")?,
            content: row.get("content")?,
            img: row.get("img")?,
            user_id: row.get("user_id")?,
            nick: row.get("nick")?,
            profile: row.get("profile")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PostDetail {
    #[serde(flatten)]
    pub post: Post,
    pub user: Option<UserSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PostListItem {
    #[serde(flatten)]
    pub post: Post,
    /// Position in the full ascending-by-creation ordering.
    pub number: i64,
    pub user: Option<UserSummary>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: i64,
    pub content: String,
    pub post_id: i64,
    pub user_id: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl Comment {
    pub(crate) const COLUMNS: &'static str =
        "c.id AS id, c.content AS content, c.post_id AS post_id, \
         c.user_id AS user_id, c.created_at AS created_at, c.updated_at AS updated_at";

    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            content: row.get("content")?,
            post_id: row.get("post_id")?,
            user_id: row.get("user_id")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CommentListItem {
    #[serde(flatten)]
    pub comment: Comment,
    pub number: i64,
    pub user: Option<UserSummary>,
}

/// A freshly created comment together with its author.
#[derive(Debug, Clone, Serialize)]
pub struct AuthoredComment {
    #[serde(flatten)]
    pub comment: Comment,
    pub user: UserSummary,
}
