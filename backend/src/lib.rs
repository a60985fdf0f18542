//! Package gateway backend library.
//!
//! Resolves project aliases to GitLab or GitHub release packages, rewrites
//! their manifests to point back at the gateway, and proxies artifacts.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod storage;

pub use error::{AppError, Result};
