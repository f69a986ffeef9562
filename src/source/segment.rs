//! Random-access segment loading.
//!
//! Every load opens the file, seeks, reads the requested window plus a few lookahead
//! bytes in chunks, then trims the window to character boundaries before decoding.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

use super::boundary::{self, RawWindow};
use super::cancel::CancelToken;
use super::gate::ReadGate;
use crate::model::{FileStreamInfo, TextEncoding, TextSegment, ViewerError};

/// Hard ceiling on bytes read by a single load.
pub const DEFAULT_MAX_SEGMENT_SIZE: u64 = 10_000_000;

/// Reads happen in chunks of this size so cancellation is noticed promptly.
const READ_CHUNK_SIZE: u64 = 1024 * 1024;

/// Memory limits applied to every load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoaderLimits {
    /// Largest segment a single load may return.
    pub max_segment_size: u64,
}

impl Default for LoaderLimits {
    fn default() -> Self {
        Self {
            max_segment_size: DEFAULT_MAX_SEGMENT_SIZE,
        }
    }
}

/// Anything that can serve decoded segments of a fixed file.
///
/// [`SegmentLoader`] is the file-backed implementation; the controller and search
/// engine only depend on this trait.
pub trait SegmentSource: Send + Sync {
    /// Load `length` bytes starting at `start_position`.
    ///
    /// Returns `Ok(None)` if `cancel` fired before the load completed.
    fn load(
        &self,
        start_position: i64,
        length: u64,
        cancel: &CancelToken,
    ) -> Result<Option<TextSegment>, ViewerError>;

    /// Size of the underlying file in bytes.
    fn file_size(&self) -> u64;

    /// Encoding used to decode segments.
    fn encoding(&self) -> TextEncoding;

    /// Largest length a single load will honour.
    fn max_segment_size(&self) -> u64;
}

/// File-backed [`SegmentSource`].
#[derive(Debug)]
pub struct SegmentLoader {
    path: PathBuf,
    file_size: u64,
    encoding: TextEncoding,
    max_segment_size: u64,
    gate: Arc<ReadGate>,
}

impl SegmentLoader {
    /// Create a loader for an analyzed file.
    ///
    /// The encoding detected during analysis is reused for every load.
    pub fn new(info: &FileStreamInfo, limits: LoaderLimits, gate: Arc<ReadGate>) -> Self {
        Self {
            path: info.path().to_path_buf(),
            file_size: info.size(),
            encoding: info.encoding(),
            max_segment_size: limits.max_segment_size.max(1),
            gate,
        }
    }

    /// Load a segment. See [`SegmentSource::load`].
    ///
    /// # Errors
    ///
    /// - [`ViewerError::OutOfRange`] if `start_position` is negative or past the end.
    /// - [`ViewerError::MemoryPressure`] if the read buffer cannot be allocated.
    /// - [`ViewerError::Io`] if opening, seeking, or reading fails.
    pub fn load(
        &self,
        start_position: i64,
        length: u64,
        cancel: &CancelToken,
    ) -> Result<Option<TextSegment>, ViewerError> {
        if start_position < 0 || start_position as u64 >= self.file_size {
            return Err(ViewerError::OutOfRange {
                position: start_position,
                file_size: self.file_size,
            });
        }
        let start = start_position as u64;

        let mut length = length.min(self.file_size - start);
        if length > self.max_segment_size {
            warn!(
                requested = length,
                max = self.max_segment_size,
                "Segment request clamped to maximum size"
            );
            length = self.max_segment_size;
        }

        if cancel.is_cancelled() {
            return Ok(None);
        }
        let Some(_permit) = self.gate.acquire(cancel) else {
            debug!(start, "Load cancelled while waiting for a read permit");
            return Ok(None);
        };

        // One byte before the window tells the legacy encodings whether we are at a
        // line start; lookahead lets a tiny request complete its first character.
        let lead = u64::from(start > 0);
        let remaining = self.file_size - start - length;
        let lookahead = (self.encoding.max_char_width() as u64 - 1).min(remaining);
        let Some(buffer) = self.read_range(start - lead, lead + length + lookahead, cancel)? else {
            debug!(start, "Load cancelled mid-read");
            return Ok(None);
        };

        if cancel.is_cancelled() {
            return Ok(None);
        }

        let lead = (lead as usize).min(buffer.len());
        let bytes = &buffer[lead..];
        let window = RawWindow {
            bytes,
            abs_start: start,
            requested_len: (length as usize).min(bytes.len()),
            prev_byte: buffer[..lead].first().copied(),
            at_eof: start + length >= self.file_size,
        };
        let range = boundary::adjust(self.encoding, &window);
        let (content, substitutions) = self.encoding.decode(&bytes[range.clone()]);

        debug!(
            requested_start = start,
            requested_len = length,
            start = start + range.start as u64,
            len = range.len(),
            malformed = substitutions.len(),
            "Loaded segment"
        );

        Ok(Some(TextSegment {
            start_position: start + range.start as u64,
            length: range.len() as u64,
            content,
            substitutions,
        }))
    }

    /// Read `len` bytes at `offset` in chunks, checking `cancel` between chunks.
    fn read_range(
        &self,
        offset: u64,
        len: u64,
        cancel: &CancelToken,
    ) -> Result<Option<Vec<u8>>, ViewerError> {
        let mut buffer = Vec::new();
        buffer
            .try_reserve_exact(len as usize)
            .map_err(|_| ViewerError::MemoryPressure { requested: len })?;

        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(offset))?;

        while (buffer.len() as u64) < len {
            if cancel.is_cancelled() {
                return Ok(None);
            }
            let want = READ_CHUNK_SIZE.min(len - buffer.len() as u64);
            let read = (&mut file).take(want).read_to_end(&mut buffer)?;
            if read == 0 {
                // File shrank under us; decode what we have.
                break;
            }
        }
        Ok(Some(buffer))
    }
}

impl SegmentSource for SegmentLoader {
    fn load(
        &self,
        start_position: i64,
        length: u64,
        cancel: &CancelToken,
    ) -> Result<Option<TextSegment>, ViewerError> {
        SegmentLoader::load(self, start_position, length, cancel)
    }

    fn file_size(&self) -> u64 {
        self.file_size
    }

    fn encoding(&self) -> TextEncoding {
        self.encoding
    }

    fn max_segment_size(&self) -> u64 {
        self.max_segment_size
    }
}
