//! HTTP request handlers.

pub mod health;
pub mod packages;
pub mod projects;
