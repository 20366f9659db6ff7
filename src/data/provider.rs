//! Data provider handles and scoped streams
//!
//! A [`DataProvider`] is a cheap handle naming one backing file of a
//! [`DataProviderManager`]. Streams and leases obtained from it update the
//! manager's bookkeeping when they are dropped, so every acquisition is
//! released exactly once on every exit path.

use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::data::manager::DataProviderManager;
use crate::error::Result;

/// Opaque provider identifier, stable across relocation.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderId(String);

impl ProviderId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ProviderId {
    fn from(id: &str) -> Self {
        ProviderId(id.to_string())
    }
}

impl From<String> for ProviderId {
    fn from(id: String) -> Self {
        ProviderId(id)
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Handle to one file-backed byte blob.
#[derive(Clone)]
pub struct DataProvider {
    id: ProviderId,
    manager: DataProviderManager,
}

impl DataProvider {
    pub(crate) fn new(id: ProviderId, manager: DataProviderManager) -> Self {
        DataProvider { id, manager }
    }

    pub fn id(&self) -> &ProviderId {
        &self.id
    }

    pub fn manager(&self) -> &DataProviderManager {
        &self.manager
    }

    /// Open a reader positioned at `byte_offset`.
    pub fn open_input(&self, byte_offset: u64) -> Result<ProviderReader> {
        self.manager.get_input_stream(self, byte_offset)
    }

    /// Open the exclusive writer. The file is truncated.
    pub fn open_output(&self) -> Result<ProviderWriter> {
        self.manager.get_output_stream(self)
    }

    /// Take a reference on the provider for as long as the lease lives.
    pub fn lease(&self) -> Result<ProviderLease> {
        self.manager.lease(self)
    }

    /// Current length of the backing file in bytes
    pub fn len(&self) -> Result<u64> {
        self.manager.provider_len(self)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    pub fn path(&self) -> Result<PathBuf> {
        self.manager.provider_path(self)
    }

    pub fn mime_type(&self) -> Result<String> {
        self.manager.provider_mime_type(self)
    }

    pub fn delete(&self) -> Result<()> {
        self.manager.delete_provider(self)
    }

    /// SHA-256 of the provider content, hex encoded.
    pub fn checksum(&self) -> Result<String> {
        let mut reader = self.open_input(0)?;
        let mut hasher = Sha256::new();
        io::copy(&mut reader, &mut hasher)?;
        Ok(format!("{:x}", hasher.finalize()))
    }

    /// True when both providers hold the same bytes.
    pub fn value_equals(&self, other: &DataProvider) -> Result<bool> {
        if self.len()? != other.len()? {
            return Ok(false);
        }
        Ok(self.checksum()? == other.checksum()?)
    }
}

impl PartialEq for DataProvider {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.manager.same_store(&other.manager)
    }
}

impl Eq for DataProvider {}

impl fmt::Debug for DataProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataProvider").field("id", &self.id).finish()
    }
}

/// Counted reference on a provider, held by audio objects.
///
/// Dropping the last lease hands the provider back to the manager, which
/// deletes it when `delete_unreferenced` is configured.
pub struct ProviderLease {
    provider: DataProvider,
}

impl ProviderLease {
    pub(crate) fn new(provider: DataProvider) -> Self {
        ProviderLease { provider }
    }

    pub fn provider(&self) -> &DataProvider {
        &self.provider
    }
}

impl Clone for ProviderLease {
    fn clone(&self) -> Self {
        self.provider.manager.retain(&self.provider.id);
        ProviderLease {
            provider: self.provider.clone(),
        }
    }
}

impl Drop for ProviderLease {
    fn drop(&mut self) {
        self.provider.manager.release(&self.provider.id);
    }
}

impl fmt::Debug for ProviderLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ProviderLease").field(&self.provider.id).finish()
    }
}

/// Read stream over a provider. Any number may be open at once.
pub struct ProviderReader {
    id: ProviderId,
    manager: DataProviderManager,
    inner: BufReader<File>,
}

impl ProviderReader {
    pub(crate) fn new(
        id: ProviderId,
        manager: DataProviderManager,
        inner: BufReader<File>,
    ) -> Self {
        ProviderReader { id, manager, inner }
    }

    pub fn id(&self) -> &ProviderId {
        &self.id
    }
}

impl Read for ProviderReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Seek for ProviderReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.inner.seek(pos)
    }
}

impl fmt::Debug for ProviderReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ProviderReader").field(&self.id).finish()
    }
}

impl Drop for ProviderReader {
    fn drop(&mut self) {
        self.manager.close_reader(&self.id);
    }
}

/// Exclusive write stream over a provider.
///
/// Call [`ProviderWriter::finish`] to observe flush errors; dropping the
/// writer flushes on a best-effort basis.
pub struct ProviderWriter {
    id: ProviderId,
    manager: DataProviderManager,
    inner: Option<BufWriter<File>>,
}

impl ProviderWriter {
    pub(crate) fn new(
        id: ProviderId,
        manager: DataProviderManager,
        inner: BufWriter<File>,
    ) -> Self {
        ProviderWriter {
            id,
            manager,
            inner: Some(inner),
        }
    }

    pub fn id(&self) -> &ProviderId {
        &self.id
    }

    /// Flush buffered bytes and sync them to disk, then release the writer.
    pub fn finish(mut self) -> Result<()> {
        if let Some(mut inner) = self.inner.take() {
            inner.flush()?;
            inner.get_ref().sync_data()?;
        }
        Ok(())
    }

    fn file(&mut self) -> io::Result<&mut BufWriter<File>> {
        self.inner
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "writer already finished"))
    }
}

impl Write for ProviderWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file()?.flush()
    }
}

impl Seek for ProviderWriter {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.file()?.seek(pos)
    }
}

impl fmt::Debug for ProviderWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ProviderWriter").field(&self.id).finish()
    }
}

impl Drop for ProviderWriter {
    fn drop(&mut self) {
        // flush before the manager sees the writer as closed
        drop(self.inner.take());
        self.manager.close_writer(&self.id);
    }
}

/// Copy up to `len` bytes from `source` into `dest`.
///
/// Returns the number of bytes copied, which is less than `len` only when
/// `source` ended first.
pub fn copy_exact<R, W>(source: &mut R, dest: &mut W, len: u64) -> io::Result<u64>
where
    R: Read + ?Sized,
    W: Write + ?Sized,
{
    let mut limited = Read::take(source, len);
    io::copy(&mut limited, dest)
}
