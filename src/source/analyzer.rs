//! One-shot file analysis: size, streaming decision, encoding, line estimate.

use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;
use tracing::{debug, info};

use crate::model::{FileStreamInfo, TextEncoding, ViewerError};

/// Files larger than this are streamed rather than loaded whole (50 MiB).
pub const DEFAULT_STREAM_THRESHOLD: u64 = 50 * 1024 * 1024;

/// Prefix sampled for encoding detection and line estimation (1 MiB).
pub const DEFAULT_SAMPLE_SIZE: usize = 1024 * 1024;

/// Tunables for [`analyze_file`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalyzerConfig {
    /// Size above which a file requires streaming.
    pub stream_threshold: u64,
    /// Bytes read from the start of the file for sampling.
    pub sample_size: usize,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            stream_threshold: DEFAULT_STREAM_THRESHOLD,
            sample_size: DEFAULT_SAMPLE_SIZE,
        }
    }
}

/// Inspect a file without reading all of it.
///
/// # Errors
///
/// - [`ViewerError::NotFound`] if the path does not exist.
/// - [`ViewerError::Access`] if it cannot be opened or is not a regular file.
/// - [`ViewerError::Io`] if reading the sample fails.
pub fn analyze_file(path: &Path, config: &AnalyzerConfig) -> Result<FileStreamInfo, ViewerError> {
    let metadata = std::fs::metadata(path).map_err(|e| classify_open_error(path, e))?;
    if !metadata.is_file() {
        return Err(ViewerError::Access {
            path: path.to_path_buf(),
            reason: "not a regular file".to_string(),
        });
    }
    let size = metadata.len();

    let file = File::open(path).map_err(|e| classify_open_error(path, e))?;
    let sample = read_sample(file, config.sample_size.max(1), size)?;
    let complete = sample.len() as u64 >= size;

    let encoding = TextEncoding::detect(&sample, complete);
    let estimated_line_count = estimate_line_count(encoding, &sample, size, complete);
    let requires_streaming = size > config.stream_threshold;

    info!(
        path = %path.display(),
        size,
        %encoding,
        requires_streaming,
        estimated_line_count,
        exact = complete,
        "Analyzed file"
    );

    Ok(FileStreamInfo::new(
        path,
        size,
        requires_streaming,
        estimated_line_count,
        encoding,
    ))
}

fn classify_open_error(path: &Path, err: std::io::Error) -> ViewerError {
    match err.kind() {
        ErrorKind::NotFound => ViewerError::NotFound {
            path: path.to_path_buf(),
        },
        ErrorKind::PermissionDenied => ViewerError::Access {
            path: path.to_path_buf(),
            reason: err.to_string(),
        },
        _ => ViewerError::Io(err),
    }
}

fn read_sample(file: File, sample_size: usize, file_size: u64) -> Result<Vec<u8>, ViewerError> {
    let want = (sample_size as u64).min(file_size) as usize;
    let mut sample = Vec::new();
    sample
        .try_reserve_exact(want)
        .map_err(|_| ViewerError::MemoryPressure {
            requested: want as u64,
        })?;
    file.take(want as u64).read_to_end(&mut sample)?;
    debug!(sampled = sample.len(), "Read analysis sample");
    Ok(sample)
}

/// Count lines in the sample and extrapolate to the whole file.
///
/// When `complete` the count is exact: an unterminated last line still counts.
fn estimate_line_count(encoding: TextEncoding, sample: &[u8], size: u64, complete: bool) -> u64 {
    if size == 0 || sample.is_empty() {
        return 0;
    }
    let breaks = encoding.count_line_breaks(sample) as u64;

    if complete {
        let body = &sample[encoding.bom_len().min(sample.len())..];
        let unterminated = !body.is_empty() && !ends_with_line_break(encoding, body);
        return breaks + u64::from(unterminated);
    }

    let estimate = (breaks as u128 * size as u128 / sample.len() as u128) as u64;
    estimate.max(1)
}

fn ends_with_line_break(encoding: TextEncoding, bytes: &[u8]) -> bool {
    match encoding {
        TextEncoding::Utf16Le => bytes.ends_with(&[b'\n', 0]),
        TextEncoding::Utf16Be => bytes.ends_with(&[0, b'\n']),
        _ => bytes.ends_with(b"\n"),
    }
}
