//! Provider manifest
//!
//! The id→file registry of a store, persisted as `manifest.json` in the
//! storage root so a store can be reopened in a later session. Reference
//! counts and open streams are session state and are not persisted.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::data::provider::ProviderId;
use crate::error::{Result, TalkbookError};

/// File name of the manifest inside the storage root.
pub const MANIFEST_FILE_NAME: &str = "manifest.json";

/// Metadata for a single provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Backing file name, relative to the storage root
    pub file_name: String,
    pub mime_type: String,
    pub created_at: DateTime<Utc>,
    /// Directory holding the file when it is not the storage root, as left
    /// behind by a partially failed relocation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<PathBuf>,
}

/// Manifest tracking every provider of a store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderManifest {
    pub providers: BTreeMap<ProviderId, ManifestEntry>,
}

impl ProviderManifest {
    /// Load the manifest from `root`, or an empty one if none was saved.
    pub fn load(root: &Path) -> Result<Self> {
        let path = root.join(MANIFEST_FILE_NAME);
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path).map_err(|e| TalkbookError::FileReadError {
            path: path.clone(),
            source: e,
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = root.join(MANIFEST_FILE_NAME);
        let content = serde_json::to_string_pretty(self)?;
        fs::write(&path, content).map_err(|e| TalkbookError::FileWriteError { path, source: e })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_load_empty_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = ProviderManifest::load(dir.path()).unwrap();
        assert!(manifest.providers.is_empty());
    }

    #[test]
    fn test_save_and_load_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let mut manifest = ProviderManifest::default();
        manifest.providers.insert(
            ProviderId::from("a1"),
            ManifestEntry {
                file_name: "a1.bin".to_string(),
                mime_type: "audio/pcm".to_string(),
                created_at: Utc::now(),
                location: None,
            },
        );

        manifest.save(dir.path()).unwrap();
        let loaded = ProviderManifest::load(dir.path()).unwrap();
        assert_eq!(loaded, manifest);
    }
}
