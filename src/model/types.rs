//! Core value types shared by the loader, search engine, and controller.

use serde::Serialize;
use std::path::{Path, PathBuf};

use super::encoding::TextEncoding;

/// What the analyzer learned about a file.
///
/// Created once per open and immutable afterwards; reloading the file produces a new
/// value rather than mutating this one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileStreamInfo {
    path: PathBuf,
    size: u64,
    requires_streaming: bool,
    estimated_line_count: u64,
    encoding: TextEncoding,
}

impl FileStreamInfo {
    /// Assemble analysis results.
    pub fn new(
        path: impl Into<PathBuf>,
        size: u64,
        requires_streaming: bool,
        estimated_line_count: u64,
        encoding: TextEncoding,
    ) -> Self {
        Self {
            path: path.into(),
            size,
            requires_streaming,
            estimated_line_count,
            encoding,
        }
    }

    /// Path of the analyzed file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File size in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Whether the file is too large to hold in memory at once.
    pub fn requires_streaming(&self) -> bool {
        self.requires_streaming
    }

    /// Sampled estimate of the number of lines. Exact for files that fit in the sample.
    pub fn estimated_line_count(&self) -> u64 {
        self.estimated_line_count
    }

    /// Detected text encoding.
    pub fn encoding(&self) -> TextEncoding {
        self.encoding
    }
}

/// A decoded byte range of the file.
///
/// `start_position` and `length` describe the bytes actually consumed after boundary
/// adjustment, which may differ slightly from what was requested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextSegment {
    /// Absolute byte offset of the first consumed byte.
    pub start_position: u64,
    /// Number of bytes consumed.
    pub length: u64,
    /// Decoded text.
    pub content: String,
    /// Malformed byte runs that decoded to U+FFFD, in text order.
    pub substitutions: Vec<Substitution>,
}

impl TextSegment {
    /// Absolute byte offset one past the last consumed byte.
    pub fn end_position(&self) -> u64 {
        self.start_position + self.length
    }

    /// Absolute file offset of the character at `text_pos` in `content`.
    ///
    /// `text_pos` must be a character boundary.
    pub fn file_offset_of(&self, encoding: TextEncoding, text_pos: usize) -> u64 {
        let text_pos = text_pos.min(self.content.len());
        let passed = self
            .substitutions
            .partition_point(|s| s.text_offset < text_pos);
        let (text_anchor, byte_anchor) = match passed.checked_sub(1) {
            Some(i) => (
                self.substitutions[i].text_end(),
                self.substitutions[i].byte_end(),
            ),
            None => (0, 0),
        };
        self.start_position
            + byte_anchor
            + encoding.encoded_len(&self.content[text_anchor..text_pos]) as u64
    }
}

/// A U+FFFD in decoded text standing in for malformed bytes.
///
/// The replacement is always three bytes of text but may cover one to four bytes
/// of the file, so offsets after it are re-anchored here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Substitution {
    /// Offset of the replacement character in the decoded text.
    pub text_offset: usize,
    /// Offset of the malformed bytes, relative to the segment start.
    pub byte_offset: u64,
    /// Number of malformed bytes.
    pub byte_len: u64,
}

impl Substitution {
    /// Text offset just past the replacement character.
    pub fn text_end(&self) -> usize {
        self.text_offset + char::REPLACEMENT_CHARACTER.len_utf8()
    }

    /// Segment-relative byte offset just past the malformed bytes.
    pub fn byte_end(&self) -> u64 {
        self.byte_offset + self.byte_len
    }
}

/// The controller's view of the document.
///
/// Only the controller mutates this; everything else reads snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewportState {
    /// First visible line (0-based).
    pub top_line: u64,
    /// Number of lines the display can show.
    pub visible_line_count: u64,
    /// Prefetch margin loaded above and below the visible window.
    pub buffer_lines: u64,
    /// Best known total line count.
    pub total_lines: u64,
}

impl ViewportState {
    /// Largest valid `top_line`: `max(0, total_lines - visible_line_count)`.
    pub fn max_top_line(&self) -> u64 {
        self.total_lines.saturating_sub(self.visible_line_count)
    }

    /// Clamp a requested top line into the valid range.
    pub fn clamp_top(&self, line: u64) -> u64 {
        line.min(self.max_top_line())
    }

    /// Lines that should be resident: visible window plus prefetch margin on both
    /// sides, clipped to the document.
    pub fn prefetch_window(&self) -> std::ops::Range<u64> {
        let start = self.top_line.saturating_sub(self.buffer_lines);
        let end = (self.top_line + self.visible_line_count + self.buffer_lines).min(self.total_lines);
        start..end.max(start)
    }

    /// Lines currently on screen, clipped to the document.
    pub fn visible_window(&self) -> std::ops::Range<u64> {
        let end = (self.top_line + self.visible_line_count).min(self.total_lines);
        self.top_line..end.max(self.top_line)
    }
}

/// One occurrence of a search term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SearchResult {
    /// Absolute byte offset of the match in the file.
    pub position: u64,
    /// Length of the match in file bytes.
    pub length: u64,
    /// 0-based line containing the match.
    pub line: u64,
}
