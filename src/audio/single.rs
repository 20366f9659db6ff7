//! Audio stored in one provider
//!
//! Every edit streams the surviving bytes and the new bytes into a fresh
//! provider, then swaps it in. The old provider is released, and deleted by
//! the manager once its last reader closes. Readers of the old content are
//! never disturbed.

use std::fmt;
use std::io::{Read, Seek, SeekFrom};

use crate::audio::base::AudioCore;
use crate::audio::manager::MediaDataManager;
use crate::audio::stream::AudioStream;
use crate::audio::{
    copy_stored, copy_supplied, AudioMediaData, MediaTypeTag, TALKBOOK_NAMESPACE_URI,
};
use crate::data::{DataProvider, ProviderLease};
use crate::error::Result;

pub struct SingleProviderAudioData {
    core: AudioCore,
    data: Option<ProviderLease>,
    len: u64,
}

impl SingleProviderAudioData {
    pub const TYPE_TAG: MediaTypeTag = MediaTypeTag {
        local_name: "SingleProviderAudioMediaData",
        namespace_uri: TALKBOOK_NAMESPACE_URI,
    };

    pub fn new(manager: MediaDataManager) -> Self {
        SingleProviderAudioData {
            core: AudioCore::new(manager),
            data: None,
            len: 0,
        }
    }

    /// Factory entry point.
    pub fn create(manager: MediaDataManager) -> Box<dyn AudioMediaData> {
        Box::new(Self::new(manager))
    }
}

impl AudioMediaData for SingleProviderAudioData {
    fn type_tag(&self) -> MediaTypeTag {
        Self::TYPE_TAG
    }

    fn core(&self) -> &AudioCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut AudioCore {
        &mut self.core
    }

    fn pcm_byte_len(&self) -> u64 {
        self.len
    }

    fn open_pcm_range(&self, begin: u64, end: u64) -> Result<AudioStream> {
        match &self.data {
            Some(lease) if begin < end => {
                let reader = lease.provider().open_input(begin)?;
                Ok(AudioStream::new(vec![reader.take(end - begin)]))
            }
            _ => Ok(AudioStream::empty()),
        }
    }

    fn insert_pcm(&mut self, source: &mut dyn Read, offset: u64, len: u64) -> Result<()> {
        let target = self.core.manager().create_pcm_provider(Some(self.len + len))?;
        {
            let mut writer = target.provider().open_output()?;
            match &self.data {
                Some(current) => {
                    let mut reader = current.provider().open_input(0)?;
                    copy_stored(&mut reader, &mut writer, offset)?;
                    copy_supplied(source, &mut writer, len)?;
                    copy_stored(&mut reader, &mut writer, self.len - offset)?;
                }
                None => copy_supplied(source, &mut writer, len)?,
            }
            writer.finish()?;
        }

        self.data = Some(target);
        self.len += len;
        Ok(())
    }

    fn remove_pcm(&mut self, begin: u64, end: u64) -> Result<()> {
        let current = match &self.data {
            Some(current) if begin < end => current,
            _ => return Ok(()),
        };

        let remaining = self.len - (end - begin);
        if remaining == 0 {
            self.data = None;
            self.len = 0;
            return Ok(());
        }

        let target = self.core.manager().create_pcm_provider(Some(remaining))?;
        {
            let mut writer = target.provider().open_output()?;
            let mut reader = current.provider().open_input(0)?;
            copy_stored(&mut reader, &mut writer, begin)?;
            reader.seek(SeekFrom::Start(end))?;
            copy_stored(&mut reader, &mut writer, self.len - end)?;
            writer.finish()?;
        }

        self.data = Some(target);
        self.len = remaining;
        Ok(())
    }

    fn providers(&self) -> Vec<DataProvider> {
        self.data
            .iter()
            .map(|lease| lease.provider().clone())
            .collect()
    }
}

impl fmt::Debug for SingleProviderAudioData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SingleProviderAudioData")
            .field("format", &self.core.format())
            .field("provider", &self.data.as_ref().map(|l| l.provider().id().clone()))
            .field("len", &self.len)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MediaConfig, StorageConfig};
    use crate::data::DataProviderManager;
    use crate::pcm::PcmFormat;
    use std::io::Cursor;
    use tempfile::TempDir;

    fn setup() -> (TempDir, SingleProviderAudioData) {
        let dir = tempfile::tempdir().unwrap();
        let providers = DataProviderManager::new(dir.path(), StorageConfig::default()).unwrap();
        let config = MediaConfig {
            default_pcm_format: PcmFormat::new(1, 1000, 8).unwrap(),
            ..MediaConfig::default()
        };
        let manager = MediaDataManager::new(providers, config);
        (dir, SingleProviderAudioData::new(manager))
    }

    fn read_all(audio: &SingleProviderAudioData) -> Vec<u8> {
        let mut bytes = Vec::new();
        audio.audio_data_all().unwrap().read_to_end(&mut bytes).unwrap();
        bytes
    }

    #[test]
    fn test_insert_rewrites_into_new_provider() {
        let (_dir, mut audio) = setup();
        audio.insert_pcm(&mut Cursor::new(vec![1, 2, 3, 4]), 0, 4).unwrap();
        let first = audio.providers();

        audio.insert_pcm(&mut Cursor::new(vec![9, 9]), 2, 2).unwrap();
        let second = audio.providers();

        assert_eq!(read_all(&audio), vec![1, 2, 9, 9, 3, 4]);
        assert_eq!(second.len(), 1);
        assert_ne!(first, second);
        // the replaced provider was released and deleted
        assert!(audio.manager().providers().provider(first[0].id()).is_none());
    }

    #[test]
    fn test_open_reader_keeps_old_content() {
        let (_dir, mut audio) = setup();
        audio.insert_pcm(&mut Cursor::new(vec![1, 2, 3, 4]), 0, 4).unwrap();

        let mut before = audio.audio_data_all().unwrap();
        audio.remove_pcm(0, 2).unwrap();

        let mut old = Vec::new();
        before.read_to_end(&mut old).unwrap();
        assert_eq!(old, vec![1, 2, 3, 4]);
        assert_eq!(read_all(&audio), vec![3, 4]);
    }

    #[test]
    fn test_short_source_leaves_object_unchanged() {
        let (_dir, mut audio) = setup();
        audio.insert_pcm(&mut Cursor::new(vec![1, 2]), 0, 2).unwrap();
        let before = audio.providers();

        let err = audio.insert_pcm(&mut Cursor::new(vec![7]), 1, 3).unwrap_err();
        assert_eq!(err.error_code(), "SHORT_READ");
        assert_eq!(audio.providers(), before);
        assert_eq!(read_all(&audio), vec![1, 2]);
        // the staging provider was cleaned up
        assert_eq!(audio.manager().providers().managed_providers().len(), 1);
    }

    #[test]
    fn test_remove_everything_drops_provider() {
        let (_dir, mut audio) = setup();
        audio.insert_pcm(&mut Cursor::new(vec![1, 2, 3]), 0, 3).unwrap();
        audio.remove_pcm(0, 3).unwrap();

        assert_eq!(audio.pcm_byte_len(), 0);
        assert!(audio.providers().is_empty());
        assert!(audio.manager().providers().managed_providers().is_empty());
    }
}
