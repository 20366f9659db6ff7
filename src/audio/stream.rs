//! Scoped read stream over a range of an audio object.

use std::collections::VecDeque;
use std::fmt;
use std::io::{self, Read, Take};

use crate::data::ProviderReader;

/// Logical concatenation of provider reads covering one time range.
///
/// Every provider stream it holds is closed when the part is exhausted or
/// when the `AudioStream` is dropped, whichever comes first.
pub struct AudioStream {
    parts: VecDeque<Take<ProviderReader>>,
    len: u64,
    remaining: u64,
}

impl AudioStream {
    pub(crate) fn new(parts: Vec<Take<ProviderReader>>) -> Self {
        let len = parts.iter().map(|p| p.limit()).sum();
        AudioStream {
            parts: parts.into(),
            len,
            remaining: len,
        }
    }

    pub(crate) fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Total number of PCM bytes the stream covers
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bytes not yet read
    pub fn remaining(&self) -> u64 {
        self.remaining
    }
}

impl Read for AudioStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        while let Some(part) = self.parts.front_mut() {
            let read = part.read(buf)?;
            if read > 0 {
                self.remaining -= read as u64;
                return Ok(read);
            }
            if part.limit() > 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "provider file is shorter than its recorded range",
                ));
            }
            self.parts.pop_front();
        }
        Ok(0)
    }
}

impl fmt::Debug for AudioStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioStream")
            .field("parts", &self.parts.len())
            .field("len", &self.len)
            .field("remaining", &self.remaining)
            .finish()
    }
}
