//! Request parameter helpers for the HTTP layer.

pub use crate::models::validation::{
    validate_alias, validate_description, validate_repo_url, MAX_ALIAS_LEN,
    MAX_DESCRIPTION_LEN,
};

/// Clamp a requested page size to `1..=max`, falling back to `default`.
pub fn clamp_limit(limit: Option<i64>, default: i64, max: i64) -> i64 {
    match limit {
        Some(l) if l > 0 => l.min(max),
        _ => default,
    }
}
