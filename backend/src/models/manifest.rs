//! Manifest wire format (`manifest.yml`).
//!
//! The same document shape is consumed from backends and re-emitted to
//! clients after URL rewriting. Empty optional fields are omitted on output
//! so that an untouched manifest serializes the way it was authored.

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub version: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub manifests: Vec<ManifestRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub packages: Vec<Package>,
}

/// Reference to another manifest, used by aggregate manifests.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ManifestRef {
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Package {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub descr: String,
    #[serde(default)]
    pub downloads: Vec<PlatformDownload>,
    #[serde(default)]
    pub files: Vec<FileInstallation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scripts: Option<Scripts>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlatformDownload {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub os: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub arch: String,
    pub url: String,
}

/// Install-time copy instruction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileInstallation {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub file: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub source: String,
    #[serde(default)]
    pub destination: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub checksum: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Scripts {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_install: Option<ScriptAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_install: Option<ScriptAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_uninstall: Option<ScriptAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_uninstall: Option<ScriptAction>,
}

impl Scripts {
    /// Mutable access to every present action, in lifecycle order.
    pub fn actions_mut(&mut self) -> impl Iterator<Item = &mut ScriptAction> {
        [
            self.pre_install.as_mut(),
            self.post_install.as_mut(),
            self.pre_uninstall.as_mut(),
            self.post_uninstall.as_mut(),
        ]
        .into_iter()
        .flatten()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScriptAction {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub script: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub source: String,
    #[serde(default)]
    pub exec: String,
}

impl Manifest {
    /// Parse a backend-supplied manifest body.
    pub fn from_yaml(body: &[u8]) -> Result<Self> {
        serde_yaml::from_slice(body).map_err(|e| AppError::ManifestParse(e.to_string()))
    }

    /// Serialize to the client-facing wire format.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| AppError::ManifestMarshal(e.to_string()))
    }
}
