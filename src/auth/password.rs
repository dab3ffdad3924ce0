use std::sync::OnceLock;

use bcrypt::BcryptError;

pub fn hash_password(plaintext: &str, cost: u32) -> Result<String, BcryptError> {
    bcrypt::hash(plaintext, cost)
}

/// Constant-time check via bcrypt. A malformed stored hash never verifies.
pub fn verify_password(plaintext: &str, hash: &str) -> bool {
    bcrypt::verify(plaintext, hash).unwrap_or(false)
}

const DUMMY_PASSWORD: &str = "blogboard-dummy-password";

/// Throwaway hash, built once at the cost first asked for.
fn dummy_hash(cost: u32) -> Option<&'static str> {
    static DUMMY: OnceLock<Option<String>> = OnceLock::new();
    DUMMY
        .get_or_init(|| hash_password(DUMMY_PASSWORD, cost).ok())
        .as_deref()
}

/// Burn one bcrypt verification when there is no stored hash to check, so
/// an unknown login id costs as much as a wrong password.
pub fn verify_against_dummy(plaintext: &str, cost: u32) {
    if let Some(hash) = dummy_hash(cost) {
        verify_password(plaintext, hash);
    }
}
