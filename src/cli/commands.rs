//! CLI Command Implementations
//!
//! Implements the actual logic for each CLI command.

use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::audio::{export_riff_wave_file, AudioMediaData, MediaDataManager};
use crate::config::EngineConfig;
use crate::data::{DataProviderManager, RelocationReport};
use crate::error::TalkbookError;
use crate::pcm::parse_riff_wave_header;
use crate::time::Time;

/// MIME type of providers holding whole imported WAVE files.
const WAVE_MIME_TYPE: &str = "audio/wav";

/// Print the header of each WAVE file.
pub fn inspect(files: &[impl AsRef<Path>]) -> Result<()> {
    for path in files {
        let path = path.as_ref();
        let mut reader = BufReader::new(
            File::open(path).with_context(|| format!("failed to open {}", path.display()))?,
        );
        let info = parse_riff_wave_header(&mut reader)
            .with_context(|| format!("{} is not a supported WAVE file", path.display()))?;

        println!("{}", path.display());
        println!("  Format:   {}", info.format);
        println!("  Data:     {} bytes", info.data_length);
        println!("  Duration: {}", info.duration()?);
    }
    Ok(())
}

/// Copy WAVE files into the store and record them in its manifest.
pub fn import(store: &Path, files: &[impl AsRef<Path>], config: &EngineConfig) -> Result<()> {
    let manager = DataProviderManager::open(store, config.storage.clone())?;

    for path in files {
        let path = path.as_ref();
        let mut reader = BufReader::new(
            File::open(path).with_context(|| format!("failed to open {}", path.display()))?,
        );
        // Validate before anything lands in the store
        parse_riff_wave_header(&mut reader)
            .with_context(|| format!("{} is not a supported WAVE file", path.display()))?;
        let len = std::fs::metadata(path)?.len();
        io::Seek::rewind(&mut reader)?;

        let provider = manager.create_provider(WAVE_MIME_TYPE, Some(len))?;
        let mut writer = provider.open_output()?;
        io::copy(&mut reader, &mut writer)?;
        writer.finish()?;

        info!(path = %path.display(), id = %provider.id(), bytes = len, "imported wave file");
        println!("{}  {}", provider.id(), path.display());
    }

    manager.save_manifest()?;
    Ok(())
}

/// List every provider of the store.
pub fn list(store: &Path, checksum: bool, config: &EngineConfig) -> Result<()> {
    let manager = DataProviderManager::open(store, config.storage.clone())?;
    let providers = manager.managed_providers();

    if providers.is_empty() {
        println!("No providers in {}", store.display());
        return Ok(());
    }

    println!("{:<34} {:<14} {:>12}", "ID", "TYPE", "BYTES");
    println!("{:-<62}", "");
    for provider in providers {
        let mut line = format!(
            "{:<34} {:<14} {:>12}",
            provider.id(),
            provider.mime_type()?,
            provider.len()?
        );
        if checksum {
            line.push_str(&format!("  {}", provider.checksum()?));
        }
        println!("{}", line);
    }
    Ok(())
}

/// Join WAVE files through the store, then export one or two WAVE files.
pub fn concat(
    store: &Path,
    files: &[impl AsRef<Path>],
    output: &Path,
    split: Option<(f64, &Path)>,
    config: &EngineConfig,
) -> Result<()> {
    let manager = MediaDataManager::open(store, config)?;
    let mut audio = manager.create_audio()?;

    for path in files {
        let path = path.as_ref();
        let mut reader = BufReader::new(
            File::open(path).with_context(|| format!("failed to open {}", path.display()))?,
        );
        audio
            .append_audio_data_from_riff_wave(&mut reader)
            .with_context(|| format!("failed to append {}", path.display()))?;
    }
    println!("Joined {} files: {} ({})", files.len(), audio.audio_duration(), audio.pcm_format());

    if let Some((millis, tail_path)) = split {
        let tail = audio.split(Time::from_millis(millis))?;
        export(tail.as_ref(), tail_path)?;
    }
    export(audio.as_ref(), output)?;
    Ok(())
}

fn export(audio: &dyn AudioMediaData, path: &Path) -> Result<()> {
    let written = export_riff_wave_file(audio, path)?;
    println!("Wrote {} ({} bytes, {})", path.display(), written, audio.audio_duration());
    Ok(())
}

/// Move or copy every provider to a new directory.
pub fn relocate(store: &Path, to: &Path, copy: bool, config: &EngineConfig) -> Result<()> {
    let manager = DataProviderManager::open(store, config.storage.clone())?;

    match manager.relocate(to, copy) {
        Ok(report) => {
            print_report(&report);
            Ok(())
        }
        Err(TalkbookError::RelocationFailed { report }) => {
            print_report(&report);
            for failure in &report.failed {
                warn!(id = %failure.id, error = %failure.error, "provider was not relocated");
            }
            anyhow::bail!(
                "{} of {} providers could not be relocated; rerun to retry them",
                report.failed.len(),
                report.failed.len() + report.relocated.len() + report.skipped.len()
            )
        }
        Err(e) => Err(e.into()),
    }
}

fn print_report(report: &RelocationReport) {
    println!("{}", report);
    for id in &report.relocated {
        println!("  moved    {}", id);
    }
    for id in &report.skipped {
        println!("  skipped  {}", id);
    }
    for failure in &report.failed {
        println!("  FAILED   {}: {}", failure.id, failure.error);
    }
}

/// Delete files in the store that no provider owns.
///
/// Reference counts only exist while audio objects are alive, so a fresh
/// process cannot tell which providers are unused; those are left alone.
pub fn sweep(store: &Path, config: &EngineConfig) -> Result<()> {
    let manager = DataProviderManager::open(store, config.storage.clone())?;

    let orphans = manager.sweep_orphan_files()?;
    if orphans.is_empty() {
        println!("Nothing to sweep in {}", store.display());
    }
    for path in &orphans {
        println!("Removed orphan file {}", path.display());
    }
    Ok(())
}
