//! Registered project model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A backend project exposed through the gateway under a stable alias.
///
/// `token` and `encrypted_token` are never both populated outside a single
/// encrypt/decrypt step: storage only ever holds the encrypted form, callers
/// of the resolver only ever see the plaintext form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub alias: String,
    pub repo_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted_token: Option<String>,
    #[serde(default)]
    pub description: String,
    pub source_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Project {
    pub fn new(
        alias: impl Into<String>,
        repo_url: impl Into<String>,
        source_name: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            alias: alias.into(),
            repo_url: repo_url.into(),
            token: None,
            encrypted_token: None,
            description: String::new(),
            source_name: source_name.into(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Plaintext token when one is set and non-empty.
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref().filter(|t| !t.is_empty())
    }

    /// Whether a token is attached in either form.
    pub fn has_token(&self) -> bool {
        self.token().is_some() || self.encrypted_token.as_deref().is_some_and(|t| !t.is_empty())
    }
}

/// Input for creating a project.
#[derive(Debug, Clone, Default)]
pub struct NewProject {
    pub alias: String,
    pub repo_url: String,
    pub token: Option<String>,
    pub description: String,
    pub source_name: String,
}

/// Partial update: `None` keeps the stored value.
///
/// A token of `Some("")` clears the stored token.
#[derive(Debug, Clone, Default)]
pub struct ProjectUpdate {
    pub repo_url: Option<String>,
    pub token: Option<String>,
    pub description: Option<String>,
    pub source_name: Option<String>,
}

impl ProjectUpdate {
    pub fn is_empty(&self) -> bool {
        self.repo_url.is_none()
            && self.token.is_none()
            && self.description.is_none()
            && self.source_name.is_none()
    }
}
