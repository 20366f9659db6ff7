//! Talkbook - Managed Audio Engine for Digital Talking Books
//!
//! Talkbook stores narration as raw PCM in file-backed data providers and
//! edits it by time rather than by byte offset.
//!
//! # Architecture
//!
//! The engine is built in three layers:
//! - `pcm`: PCM format description and the RIFF/WAVE header codec
//! - `data`: file-backed blob store with reference and stream bookkeeping
//! - `audio`: time-addressed audio objects (insert, remove, split, merge)
//!   on top of the store
//!
//! ```no_run
//! use std::fs::File;
//! use std::path::Path;
//! use talkbook::audio::{AudioMediaData, MediaDataManager};
//! use talkbook::config::EngineConfig;
//! use talkbook::time::Time;
//!
//! # fn main() -> talkbook::Result<()> {
//! let manager = MediaDataManager::open(Path::new("book-data"), &EngineConfig::default())?;
//! let mut audio = manager.create_audio()?;
//! audio.append_audio_data_from_riff_wave(&mut File::open("chapter1.wav")?)?;
//! let tail = audio.split(Time::from_millis(1500.0))?;
//! # let _ = tail;
//! # Ok(())
//! # }
//! ```

pub mod audio;
pub mod cli;
pub mod config;
pub mod data;
pub mod error;
pub mod pcm;
pub mod time;

pub use error::{Result, TalkbookError};
