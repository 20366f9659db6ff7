//! RIFF/WAVE header codec
//!
//! Only the canonical layout is produced: a `RIFF` chunk holding the `WAVE`
//! tag, a 16-byte `fmt ` sub-chunk for linear PCM and a `data` sub-chunk.
//! Parsing is strict. Every check that fails is reported with the
//! [`RiffCheck`] that rejected the stream; nothing is patched up.
//!
//! ```text
//! offset size field
//!      0    4 "RIFF"
//!      4    4 chunk size (file size - 8)
//!      8    4 "WAVE"
//!     12    4 "fmt "
//!     16    4 16
//!     20    2 audio format (1 = PCM)
//!     22    2 channels
//!     24    4 sample rate
//!     28    4 byte rate
//!     32    2 block align
//!     34    2 bits per sample
//!     36    4 "data"
//!     40    4 data length
//! ```

use std::fmt;
use std::io::{self, Read, Seek, SeekFrom, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{Result, TalkbookError};
use crate::pcm::format::{PcmDataInfo, PcmFormat};

/// Size of the canonical header written by [`write_riff_wave_header`]
pub const CANONICAL_HEADER_LEN: u64 = 44;

const RIFF_ID: &[u8; 4] = b"RIFF";
const WAVE_ID: &[u8; 4] = b"WAVE";
const FMT_ID: &[u8; 4] = b"fmt ";
const DATA_ID: &[u8; 4] = b"data";
const PCM_FORMAT_TAG: u16 = 1;
const PCM_FMT_CHUNK_LEN: u32 = 16;

/// The individual validation steps of [`parse_riff_wave_header`], in the
/// order they are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiffCheck {
    RiffId,
    RiffSize,
    WaveId,
    FmtChunk,
    AudioFormat,
    FmtSize,
    Channels,
    SampleRate,
    BitDepth,
    BlockAlign,
    ByteRate,
    DataChunk,
    DataSize,
    DataAlignment,
    Truncated,
}

impl fmt::Display for RiffCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RiffCheck::RiffId => "RIFF chunk id",
            RiffCheck::RiffSize => "RIFF chunk size",
            RiffCheck::WaveId => "WAVE format tag",
            RiffCheck::FmtChunk => "fmt sub-chunk",
            RiffCheck::AudioFormat => "audio format",
            RiffCheck::FmtSize => "fmt sub-chunk size",
            RiffCheck::Channels => "channel count",
            RiffCheck::SampleRate => "sample rate",
            RiffCheck::BitDepth => "bit depth",
            RiffCheck::BlockAlign => "block align",
            RiffCheck::ByteRate => "byte rate",
            RiffCheck::DataChunk => "data sub-chunk",
            RiffCheck::DataSize => "data sub-chunk size",
            RiffCheck::DataAlignment => "data alignment",
            RiffCheck::Truncated => "truncated header",
        };
        f.write_str(name)
    }
}

fn invalid(check: RiffCheck, detail: impl Into<String>) -> TalkbookError {
    TalkbookError::InvalidRiffWave {
        check,
        detail: detail.into(),
    }
}

/// Map an end-of-stream while reading header fields to a format error.
fn header_io(err: io::Error) -> TalkbookError {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        invalid(RiffCheck::Truncated, "stream ended inside the header")
    } else {
        TalkbookError::Io(err)
    }
}

fn read_tag<R: Read + ?Sized>(stream: &mut R) -> Result<[u8; 4]> {
    let mut tag = [0u8; 4];
    stream.read_exact(&mut tag).map_err(header_io)?;
    Ok(tag)
}

fn read_u16<R: Read + ?Sized>(stream: &mut R) -> Result<u16> {
    stream.read_u16::<LittleEndian>().map_err(header_io)
}

fn read_u32<R: Read + ?Sized>(stream: &mut R) -> Result<u32> {
    stream.read_u32::<LittleEndian>().map_err(header_io)
}

/// Parse a RIFF/WAVE header.
///
/// On success the stream is positioned at the first PCM byte of the `data`
/// sub-chunk. Sub-chunks other than `fmt ` and `data` are skipped by their
/// declared size.
///
/// # Errors
/// * `InvalidRiffWave` - naming the first [`RiffCheck`] that failed
/// * `Io` - if the underlying stream fails for a reason other than end-of-stream
pub fn parse_riff_wave_header<R: Read + Seek + ?Sized>(stream: &mut R) -> Result<PcmDataInfo> {
    let start = stream.stream_position()?;
    let end = stream.seek(SeekFrom::End(0))?;
    stream.seek(SeekFrom::Start(start))?;
    let available = end.saturating_sub(start);

    let riff = read_tag(stream)?;
    if &riff != RIFF_ID {
        return Err(invalid(
            RiffCheck::RiffId,
            format!("expected \"RIFF\", found {:?}", String::from_utf8_lossy(&riff)),
        ));
    }

    let riff_size = u64::from(read_u32(stream)?);
    if riff_size + 8 > available {
        return Err(invalid(
            RiffCheck::RiffSize,
            format!(
                "chunk declares {} bytes but only {} remain",
                riff_size,
                available.saturating_sub(8)
            ),
        ));
    }
    let riff_end = start + 8 + riff_size;

    let wave = read_tag(stream)?;
    if &wave != WAVE_ID {
        return Err(invalid(
            RiffCheck::WaveId,
            format!("expected \"WAVE\", found {:?}", String::from_utf8_lossy(&wave)),
        ));
    }

    let fmt_size = seek_to_chunk(stream, FMT_ID, riff_end, RiffCheck::FmtChunk)?;
    let format = read_fmt_chunk(stream, fmt_size)?;

    let data_size = seek_to_chunk(stream, DATA_ID, riff_end, RiffCheck::DataChunk)?;
    let data_start = stream.stream_position()?;
    if data_start + u64::from(data_size) > riff_end {
        return Err(invalid(
            RiffCheck::DataSize,
            format!(
                "data declares {} bytes but the RIFF chunk ends {} bytes later",
                data_size,
                riff_end - data_start
            ),
        ));
    }
    if !format.is_frame_aligned(u64::from(data_size)) {
        return Err(invalid(
            RiffCheck::DataAlignment,
            format!(
                "{} bytes is not a multiple of block align {}",
                data_size,
                format.block_align()
            ),
        ));
    }

    Ok(PcmDataInfo::new(format, data_size))
}

/// Advance past sub-chunks until `wanted` is found; returns its declared size
/// with the stream positioned at the chunk body.
fn seek_to_chunk<R: Read + Seek + ?Sized>(
    stream: &mut R,
    wanted: &[u8; 4],
    riff_end: u64,
    missing: RiffCheck,
) -> Result<u32> {
    loop {
        let position = stream.stream_position()?;
        if position + 8 > riff_end {
            return Err(invalid(
                missing,
                format!("no {:?} sub-chunk", String::from_utf8_lossy(wanted)),
            ));
        }

        let id = read_tag(stream)?;
        let size = read_u32(stream)?;
        if &id == wanted {
            return Ok(size);
        }

        // chunk bodies are padded to an even length
        let skip = u64::from(size) + u64::from(size & 1);
        stream.seek(SeekFrom::Current(skip as i64))?;
    }
}

fn read_fmt_chunk<R: Read + ?Sized>(stream: &mut R, size: u32) -> Result<PcmFormat> {
    if size < 2 {
        return Err(invalid(
            RiffCheck::FmtSize,
            format!("expected {} bytes, found {}", PCM_FMT_CHUNK_LEN, size),
        ));
    }
    let audio_format = read_u16(stream)?;
    if audio_format != PCM_FORMAT_TAG {
        return Err(invalid(
            RiffCheck::AudioFormat,
            format!("format tag {} is not linear PCM", audio_format),
        ));
    }
    if size != PCM_FMT_CHUNK_LEN {
        return Err(invalid(
            RiffCheck::FmtSize,
            format!("expected {} bytes, found {}", PCM_FMT_CHUNK_LEN, size),
        ));
    }

    let channels = read_u16(stream)?;
    let sample_rate = read_u32(stream)?;
    let byte_rate = read_u32(stream)?;
    let block_align = read_u16(stream)?;
    let bit_depth = read_u16(stream)?;

    if channels == 0 {
        return Err(invalid(RiffCheck::Channels, "channel count is zero"));
    }
    if sample_rate == 0 {
        return Err(invalid(RiffCheck::SampleRate, "sample rate is zero"));
    }
    if bit_depth == 0 || bit_depth % 8 != 0 {
        return Err(invalid(
            RiffCheck::BitDepth,
            format!("{} bits is not a multiple of 8", bit_depth),
        ));
    }

    let expected_align = u32::from(channels) * u32::from(bit_depth / 8);
    if u32::from(block_align) != expected_align {
        return Err(invalid(
            RiffCheck::BlockAlign,
            format!("expected {}, found {}", expected_align, block_align),
        ));
    }
    let expected_rate = u64::from(sample_rate) * u64::from(block_align);
    if u64::from(byte_rate) != expected_rate {
        return Err(invalid(
            RiffCheck::ByteRate,
            format!("expected {}, found {}", expected_rate, byte_rate),
        ));
    }

    PcmFormat::new(channels, sample_rate, bit_depth)
}

/// Write the 44-byte canonical header.
///
/// Returns the number of header bytes written so callers can patch the
/// length fields later with [`rewrite_data_length`].
pub fn write_riff_wave_header<W: Write + ?Sized>(
    stream: &mut W,
    format: &PcmFormat,
    data_length: u32,
) -> Result<u64> {
    stream.write_all(RIFF_ID)?;
    stream.write_u32::<LittleEndian>(data_length.saturating_add(36))?;
    stream.write_all(WAVE_ID)?;

    stream.write_all(FMT_ID)?;
    stream.write_u32::<LittleEndian>(PCM_FMT_CHUNK_LEN)?;
    stream.write_u16::<LittleEndian>(PCM_FORMAT_TAG)?;
    stream.write_u16::<LittleEndian>(format.channels())?;
    stream.write_u32::<LittleEndian>(format.sample_rate())?;
    stream.write_u32::<LittleEndian>(format.byte_rate())?;
    stream.write_u16::<LittleEndian>(format.block_align())?;
    stream.write_u16::<LittleEndian>(format.bit_depth())?;

    stream.write_all(DATA_ID)?;
    stream.write_u32::<LittleEndian>(data_length)?;

    Ok(CANONICAL_HEADER_LEN)
}

/// Patch the RIFF size and data length of a canonical header that starts at
/// `header_start`, once the real PCM length is known. The stream position is
/// restored afterwards.
pub fn rewrite_data_length<W: Write + Seek + ?Sized>(
    stream: &mut W,
    header_start: u64,
    data_length: u32,
) -> Result<()> {
    let resume = stream.stream_position()?;

    stream.seek(SeekFrom::Start(header_start + 4))?;
    stream.write_u32::<LittleEndian>(data_length.saturating_add(36))?;
    stream.seek(SeekFrom::Start(header_start + 40))?;
    stream.write_u32::<LittleEndian>(data_length)?;

    stream.seek(SeekFrom::Start(resume))?;
    Ok(())
}
