//! Audio Media Data Module
//!
//! Time-addressed PCM audio stored in data providers:
//! - [`AudioMediaData`] capability trait; every time-based operation is a
//!   provided method built on a handful of byte-level primitives
//! - Two storage strategies: one provider rewritten per edit, or an ordered
//!   list of provider clips
//! - The manager holding the single-format policy and the type factory
//! - WAVE export for consumers that need standalone files

pub mod base;
pub mod export;
pub mod manager;
pub mod segmented;
pub mod single;
pub mod stream;

use std::fmt;
use std::io::{self, Read, Seek};

use tracing::info;

use crate::data::DataProvider;
use crate::error::{Result, TalkbookError};
use crate::pcm::{parse_riff_wave_header, PcmDataInfo, PcmFormat};
use crate::time::{Time, TimeDelta};

pub use base::{AudioCore, MutationEvent, MutationHook};
pub use export::{export_riff_wave, export_riff_wave_clip, export_riff_wave_file};
pub use manager::{AudioConstructor, AudioMediaDataFactory, MediaDataManager};
pub use segmented::SegmentedAudioData;
pub use single::SingleProviderAudioData;
pub use stream::AudioStream;

/// MIME type recorded on providers that hold raw PCM.
pub const PCM_MIME_TYPE: &str = "audio/x-pcm";

/// Namespace of the built-in audio media data types.
pub const TALKBOOK_NAMESPACE_URI: &str = "http://www.talkbook.org/audio";

/// Type identity used by the factory to create instances of the same
/// concrete type on `split` and `copy`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MediaTypeTag {
    pub local_name: &'static str,
    pub namespace_uri: &'static str,
}

impl fmt::Display for MediaTypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}}{}", self.namespace_uri, self.local_name)
    }
}

/// A seekable byte source, as needed to validate RIFF headers.
pub trait ReadSeek: Read + Seek {}

impl<T: Read + Seek> ReadSeek for T {}

/// Copy exactly `len` bytes of stored audio, failing if the store is short.
pub(crate) fn copy_stored<R, W>(source: &mut R, dest: &mut W, len: u64) -> Result<()>
where
    R: Read + ?Sized,
    W: io::Write + ?Sized,
{
    let copied = crate::data::copy_exact(source, dest, len)?;
    if copied < len {
        return Err(TalkbookError::Io(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("stored audio ended after {} of {} bytes", copied, len),
        )));
    }
    Ok(())
}

/// Copy exactly `len` bytes supplied by a caller, failing with `ShortRead`.
pub(crate) fn copy_supplied<R, W>(source: &mut R, dest: &mut W, len: u64) -> Result<()>
where
    R: Read + ?Sized,
    W: io::Write + ?Sized,
{
    let copied = crate::data::copy_exact(source, dest, len)?;
    if copied < len {
        return Err(TalkbookError::ShortRead {
            expected: len,
            actual: copied,
        });
    }
    Ok(())
}

/// Time-addressed PCM audio.
///
/// Implementors provide the byte-level primitives; all time-based operations
/// are provided on top of them and validate their arguments before touching
/// storage.
///
/// Byte-level contract:
/// - `insert_pcm` reads exactly `len` bytes from `source` or fails with the
///   object unchanged
/// - every offset passed in is frame aligned and within `[0, pcm_byte_len]`
/// - edits never shift bytes in place inside a provider that may have open readers
pub trait AudioMediaData: Send + fmt::Debug {
    /// Type identity of the concrete storage strategy
    fn type_tag(&self) -> MediaTypeTag;

    fn core(&self) -> &AudioCore;

    fn core_mut(&mut self) -> &mut AudioCore;

    /// Total stored PCM bytes
    fn pcm_byte_len(&self) -> u64;

    /// Open a stream over the byte range `[begin, end)`.
    fn open_pcm_range(&self, begin: u64, end: u64) -> Result<AudioStream>;

    /// Insert `len` bytes read from `source` at byte `offset`.
    fn insert_pcm(&mut self, source: &mut dyn Read, offset: u64, len: u64) -> Result<()>;

    /// Remove the byte range `[begin, end)`.
    fn remove_pcm(&mut self, begin: u64, end: u64) -> Result<()>;

    /// Providers currently backing the audio, in playback order
    fn providers(&self) -> Vec<DataProvider>;

    // ========================================================================
    // Format
    // ========================================================================

    fn manager(&self) -> &MediaDataManager {
        self.core().manager()
    }

    /// The committed format, or the manager default while none is committed.
    fn pcm_format(&self) -> PcmFormat {
        self.core()
            .format()
            .unwrap_or_else(|| self.manager().default_pcm_format())
    }

    fn has_committed_format(&self) -> bool {
        self.core().format().is_some()
    }

    /// Set the PCM format.
    ///
    /// # Errors
    /// * `IncompatibleFormat` - if the manager enforces a different single
    ///   format, or if the object already holds audio in another format
    fn set_pcm_format(&mut self, format: PcmFormat) -> Result<()> {
        self.manager().check_format(&format)?;

        let current = self.pcm_format();
        if self.pcm_byte_len() > 0 && !current.is_compatible_with(&format) {
            return Err(TalkbookError::IncompatibleFormat {
                expected: current,
                actual: format,
            });
        }

        let previous = self.core().format();
        self.core_mut().commit_format(format);
        if previous != Some(format) {
            self.core_mut().notify(MutationEvent::FormatChanged {
                previous,
                current: format,
            });
        }
        Ok(())
    }

    /// Install (or clear) the on-mutation hook.
    fn set_mutation_hook(&mut self, hook: Option<MutationHook>) {
        self.core_mut().set_hook(hook);
    }

    // ========================================================================
    // Durations and positions
    // ========================================================================

    fn audio_duration(&self) -> TimeDelta {
        self.pcm_format().duration_of(self.pcm_byte_len())
    }

    /// PCM bytes covering `duration` in this object's format.
    fn pcm_length(&self, duration: TimeDelta) -> u64 {
        self.pcm_format().pcm_length(duration)
    }

    fn is_empty(&self) -> bool {
        self.pcm_byte_len() == 0
    }

    /// Byte offset of `at`, which must lie within `[0, duration]`.
    fn byte_position(&self, at: Time) -> Result<u64> {
        let duration = self.audio_duration();
        if at.is_negative() || at > Time::from(duration) {
            return Err(TalkbookError::TimeOutOfRange { time: at, duration });
        }
        Ok(self.pcm_format().byte_offset(at).min(self.pcm_byte_len()))
    }

    /// Byte range of `[begin, end)`; both ends within `[0, duration]`.
    fn byte_range(&self, begin: Time, end: Time) -> Result<(u64, u64)> {
        if begin > end {
            return Err(TalkbookError::InvalidRange { begin, end });
        }
        Ok((self.byte_position(begin)?, self.byte_position(end)?))
    }

    // ========================================================================
    // Reading
    // ========================================================================

    /// Stream the audio on `[begin, end)`.
    fn audio_data(&self, begin: Time, end: Time) -> Result<AudioStream> {
        let (begin, end) = self.byte_range(begin, end)?;
        self.open_pcm_range(begin, end)
    }

    fn audio_data_from(&self, begin: Time) -> Result<AudioStream> {
        self.audio_data(begin, Time::from(self.audio_duration()))
    }

    fn audio_data_all(&self) -> Result<AudioStream> {
        self.open_pcm_range(0, self.pcm_byte_len())
    }

    // ========================================================================
    // Mutation
    // ========================================================================

    fn append_audio_data(&mut self, source: &mut dyn Read, duration: TimeDelta) -> Result<()> {
        let end = Time::from(self.audio_duration());
        self.insert_audio_data(source, end, duration)
    }

    /// Insert `pcm_length(duration)` bytes from `source` at `at`.
    ///
    /// # Errors
    /// * `TimeOutOfRange` - if `at` is outside `[0, duration]`
    /// * `ShortRead` - if `source` ends early; the object is left unchanged
    fn insert_audio_data(
        &mut self,
        source: &mut dyn Read,
        at: Time,
        duration: TimeDelta,
    ) -> Result<()> {
        let offset = self.byte_position(at)?;
        if !self.has_committed_format() {
            let format = self.pcm_format();
            self.set_pcm_format(format)?;
        }

        let len = self.pcm_length(duration);
        if len == 0 {
            return Ok(());
        }
        self.insert_pcm(source, offset, len)?;

        let inserted = self.pcm_format().duration_of(len);
        self.core_mut().notify(MutationEvent::Inserted {
            at,
            duration: inserted,
        });
        Ok(())
    }

    /// Parse a RIFF/WAVE stream and append its PCM payload.
    fn append_audio_data_from_riff_wave(
        &mut self,
        source: &mut dyn ReadSeek,
    ) -> Result<PcmDataInfo> {
        let end = Time::from(self.audio_duration());
        self.insert_audio_data_from_riff_wave(source, end)
    }

    /// Parse a RIFF/WAVE stream and insert its PCM payload at `at`.
    ///
    /// An object without audio adopts the file's format; otherwise the
    /// formats must be compatible. Both checks happen before any mutation.
    fn insert_audio_data_from_riff_wave(
        &mut self,
        source: &mut dyn ReadSeek,
        at: Time,
    ) -> Result<PcmDataInfo> {
        let info = parse_riff_wave_header(&mut *source)?;
        let offset = self.byte_position(at)?;

        if self.is_empty() {
            self.set_pcm_format(info.format)?;
        } else if !self.pcm_format().is_compatible_with(&info.format) {
            return Err(TalkbookError::IncompatibleFormat {
                expected: self.pcm_format(),
                actual: info.format,
            });
        }

        let len = u64::from(info.data_length);
        if len > 0 {
            let mut reader = source;
            self.insert_pcm(&mut reader, offset, len)?;
            let duration = info.format.duration_of(len);
            self.core_mut()
                .notify(MutationEvent::Inserted { at, duration });
        }
        Ok(info)
    }

    /// Remove the audio on `[begin, end)`.
    fn remove_audio_data(&mut self, begin: Time, end: Time) -> Result<()> {
        let (first, last) = self.byte_range(begin, end)?;
        if first == last {
            return Ok(());
        }
        self.remove_pcm(first, last)?;

        let duration = self.pcm_format().duration_of(last - first);
        self.core_mut()
            .notify(MutationEvent::Removed { begin, duration });
        Ok(())
    }

    /// Remove everything from `begin` to the end.
    fn remove_audio_data_from(&mut self, begin: Time) -> Result<()> {
        let end = Time::from(self.audio_duration());
        self.remove_audio_data(begin, end)
    }

    /// Replace `duration` of audio starting at `at` with bytes from `source`.
    ///
    /// The replacement is read completely into a staging provider before
    /// anything is removed, so a short or failing `source` leaves the object
    /// untouched.
    ///
    /// # Errors
    /// * `TimeOutOfRange` - if `[at, at + duration]` leaves the audio
    /// * `ShortRead` - if `source` ends early
    fn replace_audio_data(
        &mut self,
        source: &mut dyn Read,
        at: Time,
        duration: TimeDelta,
    ) -> Result<()> {
        let end = at + duration;
        let (first, _) = self.byte_range(at, end)?;
        let len = self.pcm_length(duration);
        if first + len > self.pcm_byte_len() {
            return Err(TalkbookError::TimeOutOfRange {
                time: end,
                duration: self.audio_duration(),
            });
        }
        if len == 0 {
            return Ok(());
        }

        let staging = self.manager().create_pcm_provider(Some(len))?;
        {
            let mut writer = staging.provider().open_output()?;
            copy_supplied(source, &mut writer, len)?;
            writer.finish()?;
        }
        let mut staged = staging.provider().open_input(0)?;

        self.remove_pcm(first, first + len)?;
        self.insert_pcm(&mut staged, first, len)?;

        let replaced = self.pcm_format().duration_of(len);
        self.core_mut().notify(MutationEvent::Removed {
            begin: at,
            duration: replaced,
        });
        self.core_mut().notify(MutationEvent::Inserted {
            at,
            duration: replaced,
        });
        Ok(())
    }

    /// Move the audio on `[at, end)` into a new object of the same type.
    ///
    /// `at == 0` moves everything; `at == duration` returns an empty object.
    fn split(&mut self, at: Time) -> Result<Box<dyn AudioMediaData>> {
        let offset = self.byte_position(at)?;
        let mut tail = self.manager().create_audio_of(self.type_tag())?;
        tail.set_pcm_format(self.pcm_format())?;

        let end = self.pcm_byte_len();
        if offset < end {
            {
                let mut stream = self.open_pcm_range(offset, end)?;
                tail.insert_pcm(&mut stream, 0, end - offset)?;
            }
            self.remove_pcm(offset, end)?;

            let duration = self.pcm_format().duration_of(end - offset);
            self.core_mut()
                .notify(MutationEvent::Removed { begin: at, duration });
        }

        info!(
            at = %at,
            head = %self.audio_duration(),
            tail = %tail.audio_duration(),
            "split audio media data"
        );
        Ok(tail)
    }

    /// Append all of `other`'s audio, then empty `other`.
    ///
    /// # Errors
    /// * `IncompatibleFormat` - checked before either object is touched
    fn merge_with(&mut self, other: &mut dyn AudioMediaData) -> Result<()> {
        let format = self.pcm_format();
        let other_format = other.pcm_format();
        if !format.is_compatible_with(&other_format) {
            return Err(TalkbookError::IncompatibleFormat {
                expected: format,
                actual: other_format,
            });
        }

        let len = other.pcm_byte_len();
        if len == 0 {
            return Ok(());
        }
        if !self.has_committed_format() {
            self.set_pcm_format(format)?;
        }

        let at = Time::from(self.audio_duration());
        {
            let mut stream = other.audio_data_all()?;
            let offset = self.pcm_byte_len();
            self.insert_pcm(&mut stream, offset, len)?;
        }
        self.core_mut().notify(MutationEvent::Inserted {
            at,
            duration: format.duration_of(len),
        });

        other.remove_audio_data_from(Time::ZERO)?;
        info!(
            merged = %format.duration_of(len),
            total = %self.audio_duration(),
            "merged audio media data"
        );
        Ok(())
    }

    /// Deep copy into new providers.
    fn copy(&self) -> Result<Box<dyn AudioMediaData>> {
        let mut copy = self.manager().create_audio_of(self.type_tag())?;
        if let Some(format) = self.core().format() {
            copy.set_pcm_format(format)?;
        }

        let len = self.pcm_byte_len();
        if len > 0 {
            let mut stream = self.audio_data_all()?;
            copy.insert_pcm(&mut stream, 0, len)?;
        }
        Ok(copy)
    }

    /// Same format and byte-identical audio.
    fn value_equals(&self, other: &dyn AudioMediaData) -> Result<bool> {
        if self.pcm_format() != other.pcm_format() || self.pcm_byte_len() != other.pcm_byte_len() {
            return Ok(false);
        }

        let mut ours = self.audio_data_all()?;
        let mut theirs = other.audio_data_all()?;
        let mut a = vec![0u8; 8192];
        let mut b = vec![0u8; 8192];
        loop {
            let read = ours.read(&mut a)?;
            if read == 0 {
                return Ok(true);
            }
            theirs.read_exact(&mut b[..read])?;
            if a[..read] != b[..read] {
                return Ok(false);
            }
        }
    }
}
