//! Engine configuration
//!
//! Loaded from a JSON file; every field has a default so a partial (or
//! empty) file is valid.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TalkbookError};
use crate::pcm::PcmFormat;

/// Default extension for provider backing files.
const DEFAULT_FILE_EXTENSION: &str = "bin";

/// Default buffer size for stream-to-stream copies (64 KiB).
const DEFAULT_COPY_BUFFER_SIZE: usize = 64 * 1024;

/// Configuration for the data provider store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Extension given to every backing file
    pub file_extension: String,
    /// Buffer size used when copying between streams
    pub copy_buffer_size: usize,
    /// Delete a provider's file when its last lease is released
    pub delete_unreferenced: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            file_extension: DEFAULT_FILE_EXTENSION.to_string(),
            copy_buffer_size: DEFAULT_COPY_BUFFER_SIZE,
            delete_unreferenced: true,
        }
    }
}

/// Configuration for audio media objects created under one manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    /// Format committed by objects that receive raw PCM before any format was set
    pub default_pcm_format: PcmFormat,
    /// Require every audio object to use `default_pcm_format`
    pub enforce_single_pcm_format: bool,
    /// Local name of the audio type created by `MediaDataManager::create_audio`
    pub default_audio_type: String,
}

impl Default for MediaConfig {
    fn default() -> Self {
        MediaConfig {
            default_pcm_format: PcmFormat::default(),
            enforce_single_pcm_format: false,
            default_audio_type: crate::audio::SegmentedAudioData::TYPE_TAG
                .local_name
                .to_string(),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub storage: StorageConfig,
    pub media: MediaConfig,
}

impl EngineConfig {
    /// Load configuration from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| TalkbookError::FileReadError {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration from `path` when given, defaults otherwise.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// Save configuration as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content).map_err(|e| TalkbookError::FileWriteError {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(())
    }
}
