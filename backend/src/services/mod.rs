//! Business logic: backend clients, resolution, rewriting, and the engine.

pub mod encryption;
pub mod engine;
pub mod git_refs;
pub mod github_client;
pub mod gitlab_client;
pub mod resolver;
pub mod source_registry;
pub mod transformer;
pub mod upstream;
pub mod url_helpers;
