//! Media data manager
//!
//! Shared by every audio object created from it. Holds the provider store,
//! the default (and optionally enforced) PCM format, and the factory that
//! maps type tags to constructors.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use crate::audio::{
    AudioMediaData, MediaTypeTag, SegmentedAudioData, SingleProviderAudioData, PCM_MIME_TYPE,
};
use crate::config::{EngineConfig, MediaConfig};
use crate::data::{DataProviderManager, ProviderLease};
use crate::error::{Result, TalkbookError};
use crate::pcm::PcmFormat;

/// Creates an empty audio object bound to a manager.
pub type AudioConstructor = fn(MediaDataManager) -> Box<dyn AudioMediaData>;

// ============================================================================
// Factory
// ============================================================================

/// Registry of audio types by [`MediaTypeTag`].
#[derive(Debug, Clone)]
pub struct AudioMediaDataFactory {
    constructors: HashMap<MediaTypeTag, AudioConstructor>,
}

impl AudioMediaDataFactory {
    /// A factory with no registered types.
    pub fn empty() -> Self {
        AudioMediaDataFactory {
            constructors: HashMap::new(),
        }
    }

    pub fn register(&mut self, tag: MediaTypeTag, constructor: AudioConstructor) {
        self.constructors.insert(tag, constructor);
    }

    pub fn is_registered(&self, tag: &MediaTypeTag) -> bool {
        self.constructors.contains_key(tag)
    }

    /// Find a registered tag by its local name.
    pub fn lookup(&self, local_name: &str) -> Option<MediaTypeTag> {
        self.constructors
            .keys()
            .find(|tag| tag.local_name == local_name)
            .copied()
    }

    pub fn create(
        &self,
        tag: &MediaTypeTag,
        manager: MediaDataManager,
    ) -> Result<Box<dyn AudioMediaData>> {
        let constructor = self
            .constructors
            .get(tag)
            .ok_or_else(|| TalkbookError::UnknownMediaType {
                tag: tag.to_string(),
            })?;
        Ok(constructor(manager))
    }
}

impl Default for AudioMediaDataFactory {
    fn default() -> Self {
        let mut factory = Self::empty();
        factory.register(SegmentedAudioData::TYPE_TAG, SegmentedAudioData::create);
        factory.register(SingleProviderAudioData::TYPE_TAG, SingleProviderAudioData::create);
        factory
    }
}

// ============================================================================
// Manager
// ============================================================================

struct MediaInner {
    providers: DataProviderManager,
    config: MediaConfig,
    factory: AudioMediaDataFactory,
}

/// Cheap to clone; all clones share the same store and policy.
#[derive(Clone)]
pub struct MediaDataManager {
    inner: Arc<MediaInner>,
}

impl MediaDataManager {
    pub fn new(providers: DataProviderManager, config: MediaConfig) -> Self {
        Self::with_factory(providers, config, AudioMediaDataFactory::default())
    }

    pub fn with_factory(
        providers: DataProviderManager,
        config: MediaConfig,
        factory: AudioMediaDataFactory,
    ) -> Self {
        MediaDataManager {
            inner: Arc::new(MediaInner {
                providers,
                config,
                factory,
            }),
        }
    }

    /// Open (or create) the store at `root` with the given configuration.
    pub fn open(root: &Path, config: &EngineConfig) -> Result<Self> {
        let providers = DataProviderManager::open(root, config.storage.clone())?;
        Ok(Self::new(providers, config.media.clone()))
    }

    pub fn providers(&self) -> &DataProviderManager {
        &self.inner.providers
    }

    pub fn config(&self) -> &MediaConfig {
        &self.inner.config
    }

    pub fn factory(&self) -> &AudioMediaDataFactory {
        &self.inner.factory
    }

    pub fn default_pcm_format(&self) -> PcmFormat {
        self.inner.config.default_pcm_format
    }

    pub fn enforces_single_pcm_format(&self) -> bool {
        self.inner.config.enforce_single_pcm_format
    }

    /// Reject `format` if single-format enforcement is on and it differs
    /// from the default.
    pub fn check_format(&self, format: &PcmFormat) -> Result<()> {
        let expected = self.default_pcm_format();
        if self.enforces_single_pcm_format() && !expected.is_compatible_with(format) {
            return Err(TalkbookError::IncompatibleFormat {
                expected,
                actual: *format,
            });
        }
        Ok(())
    }

    /// Create an empty audio object of the configured default type.
    pub fn create_audio(&self) -> Result<Box<dyn AudioMediaData>> {
        let name = &self.inner.config.default_audio_type;
        let tag = self
            .inner
            .factory
            .lookup(name)
            .ok_or_else(|| TalkbookError::UnknownMediaType { tag: name.clone() })?;
        self.create_audio_of(tag)
    }

    pub fn create_audio_of(&self, tag: MediaTypeTag) -> Result<Box<dyn AudioMediaData>> {
        self.inner.factory.create(&tag, self.clone())
    }

    /// Allocate a provider for raw PCM and take the first lease on it.
    pub(crate) fn create_pcm_provider(&self, size_hint: Option<u64>) -> Result<ProviderLease> {
        let provider = self.inner.providers.create_provider(PCM_MIME_TYPE, size_hint)?;
        debug!(id = %provider.id(), size_hint = ?size_hint, "allocated pcm provider");
        provider.lease()
    }
}

impl fmt::Debug for MediaDataManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaDataManager")
            .field("providers", &self.inner.providers)
            .field("config", &self.inner.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageConfig;
    use std::io::Cursor;
    use tempfile::TempDir;

    fn manager(config: MediaConfig) -> (TempDir, MediaDataManager) {
        let dir = tempfile::tempdir().unwrap();
        let providers = DataProviderManager::new(dir.path(), StorageConfig::default()).unwrap();
        (dir, MediaDataManager::new(providers, config))
    }

    #[test]
    fn test_create_default_type() {
        let (_dir, manager) = manager(MediaConfig::default());
        let audio = manager.create_audio().unwrap();
        assert_eq!(audio.type_tag(), SegmentedAudioData::TYPE_TAG);
        assert!(audio.is_empty());
        assert!(!audio.has_committed_format());
    }

    #[test]
    fn test_create_configured_type() {
        let config = MediaConfig {
            default_audio_type: "SingleProviderAudioMediaData".to_string(),
            ..MediaConfig::default()
        };
        let (_dir, manager) = manager(config);
        let audio = manager.create_audio().unwrap();
        assert_eq!(audio.type_tag(), SingleProviderAudioData::TYPE_TAG);
    }

    #[test]
    fn test_unknown_type() {
        let config = MediaConfig {
            default_audio_type: "WavAudioMediaData".to_string(),
            ..MediaConfig::default()
        };
        let (_dir, manager) = manager(config);
        let err = manager.create_audio().unwrap_err();
        assert_eq!(err.error_code(), "UNKNOWN_MEDIA_TYPE");
    }

    #[test]
    fn test_custom_factory() {
        let dir = tempfile::tempdir().unwrap();
        let providers = DataProviderManager::new(dir.path(), StorageConfig::default()).unwrap();
        let mut factory = AudioMediaDataFactory::empty();
        factory.register(SingleProviderAudioData::TYPE_TAG, SingleProviderAudioData::create);
        let manager = MediaDataManager::with_factory(providers, MediaConfig::default(), factory);

        assert!(manager.create_audio_of(SegmentedAudioData::TYPE_TAG).is_err());
        assert!(manager.create_audio_of(SingleProviderAudioData::TYPE_TAG).is_ok());
    }

    #[test]
    fn test_single_format_enforcement() {
        let config = MediaConfig {
            default_pcm_format: PcmFormat::new(1, 22050, 16).unwrap(),
            enforce_single_pcm_format: true,
            ..MediaConfig::default()
        };
        let (_dir, manager) = manager(config);
        let mut audio = manager.create_audio().unwrap();

        let stereo = PcmFormat::new(2, 22050, 16).unwrap();
        let err = audio.set_pcm_format(stereo).unwrap_err();
        assert_eq!(err.error_code(), "INCOMPATIBLE_FORMAT");
        assert!(!audio.has_committed_format());

        audio.set_pcm_format(PcmFormat::new(1, 22050, 16).unwrap()).unwrap();
        assert!(audio.has_committed_format());
    }

    #[test]
    fn test_pcm_providers_share_store() {
        let (_dir, manager) = manager(MediaConfig::default());
        let mut audio = manager.create_audio().unwrap();
        audio
            .append_audio_data(
                &mut Cursor::new(vec![0u8; 882]),
                crate::time::TimeDelta::from_millis(10.0),
            )
            .unwrap();

        for provider in audio.providers() {
            assert!(provider.manager().same_store(manager.providers()));
            assert_eq!(provider.mime_type().unwrap(), PCM_MIME_TYPE);
        }
    }
}
