pub mod handlers;
pub mod password;
pub mod session;

use rusqlite::Connection;

use crate::db::models::User;
use crate::db::users;
use crate::error::{AppError, AppResult};

/// Check a login id and password pair. Unknown, soft-deleted, and
/// wrong-password logins all fail the same way, and all pay for one bcrypt
/// verification at `cost`.
pub fn authenticate(conn: &Connection, userid: &str, password: &str, cost: u32) -> AppResult<User> {
    let Some(user) = users::find_by_userid(conn, userid)? else {
        password::verify_against_dummy(password, cost);
        return Err(AppError::InvalidCredentials);
    };
    if !password::verify_password(password, &user.password_hash) {
        return Err(AppError::InvalidCredentials);
    }
    Ok(user)
}
