//! Owner-only write access for posts and comments.
//!
//! A failed check is reported exactly like a missing resource so that
//! non-owners cannot probe which ids exist.

use crate::db::models::{Comment, Post};
use crate::error::{AppError, AppResult};

pub trait Owned {
    /// Label used in the not-found message.
    const KIND: &'static str;

    fn owner_id(&self) -> i64;
}

impl Owned for Post {
    const KIND: &'static str = "Post";

    fn owner_id(&self) -> i64 {
        self.user_id
    }
}

impl Owned for Comment {
    const KIND: &'static str = "Comment";

    fn owner_id(&self) -> i64 {
        self.user_id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Allowed,
    Forbidden,
}

pub fn authorize_mutation<R: Owned>(acting_user_id: i64, resource: &R) -> Access {
    if resource.owner_id() == acting_user_id {
        Access::Allowed
    } else {
        Access::Forbidden
    }
}

/// Collapse "absent" and "not yours" into one not-found outcome.
pub fn require_owned<R: Owned>(found: Option<R>, acting_user_id: i64) -> AppResult<R> {
    match found {
        Some(resource) if authorize_mutation(acting_user_id, &resource) == Access::Allowed => {
            Ok(resource)
        }
        _ => Err(AppError::NotFound(R::KIND)),
    }
}
