//! Domain models shared by storage, cache, and the engine.

pub mod catalog_version;
pub mod manifest;
pub mod project;
pub mod validation;
