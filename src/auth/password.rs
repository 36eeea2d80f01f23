use crate::error::{AppError, AppResult};

/// Hash a plaintext password for storage.
pub fn hash(plaintext: &str) -> AppResult<String> {
    bcrypt::hash(plaintext, bcrypt::DEFAULT_COST)
        .map_err(|e| AppError::Internal(format!("bcrypt hash failed: {}", e)))
}

/// Verify a plaintext password against a stored hash - constant-time via bcrypt.
/// Accounts without a stored hash (social-only) never verify.
pub fn verify(plaintext: &str, stored_hash: Option<&str>) -> bool {
    match stored_hash {
        Some(h) => bcrypt::verify(plaintext, h).unwrap_or(false),
        None => false,
    }
}
