//! Standalone WAVE export of any audio object.
//!
//! The header is written first with a zero data length, the PCM is streamed
//! after it, and the length fields are patched once the copy is done.

use std::fs::File;
use std::io::{self, BufWriter, Read, Seek, Write};
use std::path::Path;

use tracing::info;

use crate::audio::AudioMediaData;
use crate::error::{Result, TalkbookError};
use crate::pcm::{rewrite_data_length, write_riff_wave_header, RiffCheck};
use crate::time::Time;

/// Write all of `media` as a canonical RIFF/WAVE stream.
///
/// Returns the number of PCM bytes written.
pub fn export_riff_wave<W>(media: &dyn AudioMediaData, out: &mut W) -> Result<u64>
where
    W: Write + Seek + ?Sized,
{
    let stream = media.audio_data_all()?;
    write_stream(media, stream, out)
}

/// Write the audio on `[begin, end)` as a canonical RIFF/WAVE stream.
pub fn export_riff_wave_clip<W>(
    media: &dyn AudioMediaData,
    begin: Time,
    end: Time,
    out: &mut W,
) -> Result<u64>
where
    W: Write + Seek + ?Sized,
{
    let stream = media.audio_data(begin, end)?;
    write_stream(media, stream, out)
}

/// Export all of `media` to a new file at `path`.
pub fn export_riff_wave_file(media: &dyn AudioMediaData, path: &Path) -> Result<u64> {
    let file = File::create(path).map_err(|e| TalkbookError::FileWriteError {
        path: path.to_path_buf(),
        source: e,
    })?;
    let mut writer = BufWriter::new(file);
    let written = export_riff_wave(media, &mut writer)?;
    writer.flush()?;

    info!(
        path = %path.display(),
        bytes = written,
        duration = %media.audio_duration(),
        "exported wave file"
    );
    Ok(written)
}

fn write_stream<R, W>(media: &dyn AudioMediaData, mut stream: R, out: &mut W) -> Result<u64>
where
    R: Read,
    W: Write + Seek + ?Sized,
{
    let header_start = out.stream_position()?;
    write_riff_wave_header(out, &media.pcm_format(), 0)?;

    let written = io::copy(&mut stream, out)?;
    let data_length = u32::try_from(written)
        .ok()
        .filter(|len| len.checked_add(36).is_some())
        .ok_or_else(|| TalkbookError::InvalidRiffWave {
            check: RiffCheck::DataSize,
            detail: format!("{} bytes of pcm do not fit a riff chunk", written),
        })?;

    rewrite_data_length(out, header_start, data_length)?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::MediaDataManager;
    use crate::config::{MediaConfig, StorageConfig};
    use crate::data::DataProviderManager;
    use crate::pcm::{parse_riff_wave_header, PcmFormat, CANONICAL_HEADER_LEN};
    use crate::time::TimeDelta;
    use std::io::Cursor;

    #[test]
    fn test_export_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let providers = DataProviderManager::new(dir.path(), StorageConfig::default()).unwrap();
        let manager = MediaDataManager::new(providers, MediaConfig::default());
        let mut audio = manager.create_audio().unwrap();
        let format = PcmFormat::new(2, 8000, 16).unwrap();
        audio.set_pcm_format(format).unwrap();

        let pcm: Vec<u8> = (0..3200u32).map(|i| (i % 251) as u8).collect();
        audio
            .append_audio_data(&mut Cursor::new(pcm.clone()), TimeDelta::from_millis(100.0))
            .unwrap();

        let mut out = Cursor::new(Vec::new());
        let written = export_riff_wave(audio.as_ref(), &mut out).unwrap();
        assert_eq!(written, 3200);

        out.set_position(0);
        let info = parse_riff_wave_header(&mut out).unwrap();
        assert_eq!(info.format, format);
        assert_eq!(info.data_length, 3200);
        assert_eq!(&out.get_ref()[CANONICAL_HEADER_LEN as usize..], &pcm[..]);
    }

    #[test]
    fn test_export_clip_reads_hound() {
        let dir = tempfile::tempdir().unwrap();
        let providers = DataProviderManager::new(dir.path(), StorageConfig::default()).unwrap();
        let manager = MediaDataManager::new(providers, MediaConfig::default());
        let mut audio = manager.create_audio().unwrap();
        audio.set_pcm_format(PcmFormat::new(1, 1000, 16).unwrap()).unwrap();

        let samples: Vec<i16> = (0..1000).map(|i| i as i16).collect();
        let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        audio
            .append_audio_data(&mut Cursor::new(bytes), TimeDelta::from_millis(1000.0))
            .unwrap();

        let path = dir.path().join("clip.wav");
        {
            let mut file = BufWriter::new(File::create(&path).unwrap());
            export_riff_wave_clip(
                audio.as_ref(),
                Time::from_millis(250.0),
                Time::from_millis(500.0),
                &mut file,
            )
            .unwrap();
        }

        let mut reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().sample_rate, 1000);
        let read: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(read, samples[250..500].to_vec());
    }

    #[test]
    fn test_export_empty_audio() {
        let dir = tempfile::tempdir().unwrap();
        let providers = DataProviderManager::new(dir.path(), StorageConfig::default()).unwrap();
        let manager = MediaDataManager::new(providers, MediaConfig::default());
        let audio = manager.create_audio().unwrap();

        let path = dir.path().join("empty.wav");
        assert_eq!(export_riff_wave_file(audio.as_ref(), &path).unwrap(), 0);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), CANONICAL_HEADER_LEN);
    }
}
