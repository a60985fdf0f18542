//! Gateway-wide catalog version.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Three-part counter bumped with every project mutation so clients can
/// detect "the catalog changed" without enumerating projects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogVersion {
    pub major: i32,
    pub minor: i32,
    pub patch: i32,
}

/// Which component a mutation bumps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogBump {
    /// Project created
    Minor,
    /// Project updated
    Patch,
    /// Project deleted
    Major,
}

impl Default for CatalogVersion {
    fn default() -> Self {
        Self {
            major: 1,
            minor: 0,
            patch: 0,
        }
    }
}

impl CatalogVersion {
    pub fn bumped(self, bump: CatalogBump) -> Self {
        match bump {
            CatalogBump::Major => Self {
                major: self.major + 1,
                minor: 0,
                patch: 0,
            },
            CatalogBump::Minor => Self {
                major: self.major,
                minor: self.minor + 1,
                patch: 0,
            },
            CatalogBump::Patch => Self {
                patch: self.patch + 1,
                ..self
            },
        }
    }
}

impl fmt::Display for CatalogVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_one_zero_zero() {
        assert_eq!(CatalogVersion::default().to_string(), "1.0.0");
    }

    #[test]
    fn test_bump_policy() {
        let v = CatalogVersion {
            major: 1,
            minor: 2,
            patch: 3,
        };
        assert_eq!(v.bumped(CatalogBump::Minor).to_string(), "1.3.0");
        assert_eq!(v.bumped(CatalogBump::Patch).to_string(), "1.2.4");
        assert_eq!(v.bumped(CatalogBump::Major).to_string(), "2.0.0");
    }

    #[test]
    fn test_every_bump_changes_version() {
        let v = CatalogVersion::default();
        for bump in [CatalogBump::Minor, CatalogBump::Patch, CatalogBump::Major] {
            assert_ne!(v.bumped(bump), v);
        }
    }
}
