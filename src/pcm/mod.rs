//! PCM Module
//!
//! PCM stream description and the RIFF/WAVE header codec:
//! - Format value type with derived byte rate and block align
//! - Header parsing with strict validation
//! - Canonical header writing and length patching

pub mod format;
pub mod riff;

pub use format::{PcmDataInfo, PcmFormat};
pub use riff::{
    parse_riff_wave_header, rewrite_data_length, write_riff_wave_header, RiffCheck,
    CANONICAL_HEADER_LEN,
};
