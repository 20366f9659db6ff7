//! Audio stored as an ordered list of clips
//!
//! A clip is a byte range inside one provider. Inserting writes only the new
//! bytes into a fresh provider and splices a clip into the list; removing
//! trims or drops clips. Existing provider files are never rewritten, so
//! edits cost O(inserted bytes) instead of O(total bytes).

use std::fmt;
use std::io::Read;

use tracing::debug;

use crate::audio::base::AudioCore;
use crate::audio::manager::MediaDataManager;
use crate::audio::stream::AudioStream;
use crate::audio::{
    copy_stored, copy_supplied, AudioMediaData, MediaTypeTag, TALKBOOK_NAMESPACE_URI,
};
use crate::data::{DataProvider, ProviderLease};
use crate::error::Result;

#[derive(Clone)]
struct Clip {
    lease: ProviderLease,
    /// Byte range inside the provider file
    begin: u64,
    end: u64,
}

impl Clip {
    fn len(&self) -> u64 {
        self.end - self.begin
    }

    fn slice(&self, from: u64, to: u64) -> Clip {
        Clip {
            lease: self.lease.clone(),
            begin: self.begin + from,
            end: self.begin + to,
        }
    }
}

pub struct SegmentedAudioData {
    core: AudioCore,
    clips: Vec<Clip>,
}

impl SegmentedAudioData {
    pub const TYPE_TAG: MediaTypeTag = MediaTypeTag {
        local_name: "SegmentedAudioMediaData",
        namespace_uri: TALKBOOK_NAMESPACE_URI,
    };

    pub fn new(manager: MediaDataManager) -> Self {
        SegmentedAudioData {
            core: AudioCore::new(manager),
            clips: Vec::new(),
        }
    }

    /// Factory entry point.
    pub fn create(manager: MediaDataManager) -> Box<dyn AudioMediaData> {
        Box::new(Self::new(manager))
    }

    pub fn clip_count(&self) -> usize {
        self.clips.len()
    }

    /// Rewrite all clips into a single provider.
    pub fn consolidate(&mut self) -> Result<()> {
        if self.clips.len() <= 1 {
            return Ok(());
        }

        let len = self.pcm_byte_len();
        let target = self.core.manager().create_pcm_provider(Some(len))?;
        {
            let mut writer = target.provider().open_output()?;
            let mut stream = self.open_pcm_range(0, len)?;
            copy_stored(&mut stream, &mut writer, len)?;
            writer.finish()?;
        }

        debug!(clips = self.clips.len(), bytes = len, "consolidated audio clips");
        self.clips = vec![Clip {
            lease: target,
            begin: 0,
            end: len,
        }];
        Ok(())
    }
}

impl AudioMediaData for SegmentedAudioData {
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
        self.clips.iter().map(Clip::len).sum()
    }

    fn open_pcm_range(&self, begin: u64, end: u64) -> Result<AudioStream> {
        let mut parts = Vec::new();
        let mut position = 0;
        for clip in &self.clips {
            let clip_end = position + clip.len();
            let from = begin.max(position);
            let to = end.min(clip_end);
            if from < to {
                let reader = clip
                    .lease
                    .provider()
                    .open_input(clip.begin + (from - position))?;
                parts.push(reader.take(to - from));
            }
            position = clip_end;
            if position >= end {
                break;
            }
        }
        Ok(AudioStream::new(parts))
    }

    fn insert_pcm(&mut self, source: &mut dyn Read, offset: u64, len: u64) -> Result<()> {
        let target = self.core.manager().create_pcm_provider(Some(len))?;
        {
            let mut writer = target.provider().open_output()?;
            copy_supplied(source, &mut writer, len)?;
            writer.finish()?;
        }
        let inserted = Clip {
            lease: target,
            begin: 0,
            end: len,
        };

        let mut position = 0;
        for index in 0..self.clips.len() {
            let clip_len = self.clips[index].len();
            if offset == position {
                self.clips.insert(index, inserted);
                return Ok(());
            }
            if offset < position + clip_len {
                let cut = offset - position;
                let clip = self.clips[index].clone();
                let pieces = [clip.slice(0, cut), inserted, clip.slice(cut, clip_len)];
                self.clips.splice(index..=index, pieces);
                return Ok(());
            }
            position += clip_len;
        }

        self.clips.push(inserted);
        Ok(())
    }

    fn remove_pcm(&mut self, begin: u64, end: u64) -> Result<()> {
        let mut kept = Vec::with_capacity(self.clips.len() + 1);
        let mut position = 0;
        for clip in self.clips.drain(..) {
            let clip_len = clip.len();
            let clip_end = position + clip_len;

            if clip_end <= begin || position >= end {
                kept.push(clip);
            } else {
                if begin > position {
                    kept.push(clip.slice(0, begin - position));
                }
                if end < clip_end {
                    kept.push(clip.slice(end - position, clip_len));
                }
            }
            position = clip_end;
        }
        self.clips = kept;
        Ok(())
    }

    fn providers(&self) -> Vec<DataProvider> {
        self.clips
            .iter()
            .map(|clip| clip.lease.provider().clone())
            .collect()
    }
}

impl fmt::Debug for SegmentedAudioData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SegmentedAudioData")
            .field("format", &self.core.format())
            .field("clips", &self.clips.len())
            .field("len", &self.pcm_byte_len())
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

    fn setup() -> (TempDir, SegmentedAudioData) {
        let dir = tempfile::tempdir().unwrap();
        let providers = DataProviderManager::new(dir.path(), StorageConfig::default()).unwrap();
        let config = MediaConfig {
            default_pcm_format: PcmFormat::new(1, 1000, 8).unwrap(),
            ..MediaConfig::default()
        };
        (dir, SegmentedAudioData::new(MediaDataManager::new(providers, config)))
    }

    fn read_range(audio: &SegmentedAudioData, begin: u64, end: u64) -> Vec<u8> {
        let mut bytes = Vec::new();
        audio.open_pcm_range(begin, end).unwrap().read_to_end(&mut bytes).unwrap();
        bytes
    }

    #[test]
    fn test_insert_splits_clip() {
        let (_dir, mut audio) = setup();
        audio.insert_pcm(&mut Cursor::new(vec![1, 2, 3, 4]), 0, 4).unwrap();
        audio.insert_pcm(&mut Cursor::new(vec![8, 9]), 1, 2).unwrap();

        assert_eq!(audio.clip_count(), 3);
        assert_eq!(read_range(&audio, 0, 6), vec![1, 8, 9, 2, 3, 4]);
        assert_eq!(read_range(&audio, 2, 5), vec![9, 2, 3]);
        // both halves of the split clip share one provider
        let providers = audio.providers();
        assert_eq!(providers[0], providers[2]);
        let store = audio.manager().providers();
        assert_eq!(store.reference_count(&providers[0]).unwrap(), 2);
    }

    #[test]
    fn test_insert_at_clip_boundaries() {
        let (_dir, mut audio) = setup();
        audio.insert_pcm(&mut Cursor::new(vec![2]), 0, 1).unwrap();
        audio.insert_pcm(&mut Cursor::new(vec![1]), 0, 1).unwrap();
        audio.insert_pcm(&mut Cursor::new(vec![3]), 2, 1).unwrap();

        assert_eq!(audio.clip_count(), 3);
        assert_eq!(read_range(&audio, 0, 3), vec![1, 2, 3]);
    }

    #[test]
    fn test_remove_across_clips() {
        let (_dir, mut audio) = setup();
        audio.insert_pcm(&mut Cursor::new(vec![1, 2, 3]), 0, 3).unwrap();
        audio.insert_pcm(&mut Cursor::new(vec![4, 5, 6]), 3, 3).unwrap();
        audio.insert_pcm(&mut Cursor::new(vec![7, 8, 9]), 6, 3).unwrap();

        audio.remove_pcm(2, 7).unwrap();
        assert_eq!(read_range(&audio, 0, audio.pcm_byte_len()), vec![1, 2, 8, 9]);
        assert_eq!(audio.clip_count(), 2);
        // the middle provider lost its last clip and was deleted
        assert_eq!(audio.manager().providers().managed_providers().len(), 2);
    }

    #[test]
    fn test_remove_inside_one_clip() {
        let (_dir, mut audio) = setup();
        audio.insert_pcm(&mut Cursor::new(vec![1, 2, 3, 4, 5]), 0, 5).unwrap();
        audio.remove_pcm(1, 3).unwrap();

        assert_eq!(audio.clip_count(), 2);
        assert_eq!(read_range(&audio, 0, 3), vec![1, 4, 5]);
    }

    #[test]
    fn test_consolidate() {
        let (_dir, mut audio) = setup();
        audio.insert_pcm(&mut Cursor::new(vec![1, 2]), 0, 2).unwrap();
        audio.insert_pcm(&mut Cursor::new(vec![3, 4]), 2, 2).unwrap();
        audio.insert_pcm(&mut Cursor::new(vec![5]), 1, 1).unwrap();

        audio.consolidate().unwrap();
        assert_eq!(audio.clip_count(), 1);
        assert_eq!(read_range(&audio, 0, 5), vec![1, 5, 2, 3, 4]);
        assert_eq!(audio.manager().providers().managed_providers().len(), 1);
    }
}
