//! Streaming full-file search.
//!
//! The file is walked in overlapping segments so a match straddling a segment boundary
//! is still found. Each call to [`SearchEngine::search`] starts a fresh, independent
//! walk from the beginning of the file.

pub mod matcher;

use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, info};

use crate::model::{SearchResult, TextSegment, ViewerError};
use crate::source::{CancelToken, SegmentSource};
use crate::state::ProgressSink;
use matcher::{ByteCursor, Needle};

/// Default walk segment size (1 MiB).
pub const DEFAULT_SEARCH_SEGMENT_SIZE: u64 = 1024 * 1024;

/// Label shown next to search progress.
pub const PROGRESS_LABEL: &str = "Searching…";

/// Search tunables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchConfig {
    /// Bytes requested per walk step.
    pub segment_size: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            segment_size: DEFAULT_SEARCH_SEGMENT_SIZE,
        }
    }
}

/// Finds every occurrence of a term in a file.
pub struct SearchEngine {
    source: Arc<dyn SegmentSource>,
    config: SearchConfig,
    progress: Option<Arc<dyn ProgressSink>>,
}

impl std::fmt::Debug for SearchEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchEngine")
            .field("config", &self.config)
            .field("file_size", &self.source.file_size())
            .finish_non_exhaustive()
    }
}

impl SearchEngine {
    /// Create an engine over `source`, optionally reporting progress.
    pub fn new(
        source: Arc<dyn SegmentSource>,
        config: SearchConfig,
        progress: Option<Arc<dyn ProgressSink>>,
    ) -> Self {
        Self {
            source,
            config,
            progress,
        }
    }

    /// Start a search for `term`.
    ///
    /// Results come back in strictly ascending file order. An empty term yields
    /// nothing. Cancelling `cancel` stops the walk at the next segment boundary.
    pub fn search(&self, term: &str, case_sensitive: bool, cancel: CancelToken) -> SearchIter {
        let needle = Needle::new(term, case_sensitive);
        let encoding = self.source.encoding();
        let width = encoding.max_char_width() as u64;

        // Enough overlap for the whole term at its widest, plus one character of slack
        // for the boundary trim at the start of the next segment.
        let overlap = needle.char_count() as u64 * width + width;
        let segment_size = self
            .config
            .segment_size
            .max(overlap * 2)
            .min(self.source.max_segment_size());

        info!(
            term_chars = needle.char_count(),
            case_sensitive,
            segment_size,
            overlap,
            "Starting search"
        );

        let done = needle.is_empty() || self.source.file_size() == 0;
        SearchIter {
            source: Arc::clone(&self.source),
            progress: self.progress.clone(),
            needle,
            cancel,
            segment_size,
            overlap,
            next_start: 0,
            previous: None,
            last_end: 0,
            pending: VecDeque::new(),
            done,
        }
    }
}

/// The previous segment, kept to count the lines that precede the next one.
struct Walked {
    segment: TextSegment,
    first_line: u64,
}

/// Lazy iterator over search results. Fused after the first error or cancellation.
pub struct SearchIter {
    source: Arc<dyn SegmentSource>,
    progress: Option<Arc<dyn ProgressSink>>,
    needle: Needle,
    cancel: CancelToken,
    segment_size: u64,
    overlap: u64,
    next_start: u64,
    previous: Option<Walked>,
    last_end: u64,
    pending: VecDeque<SearchResult>,
    done: bool,
}

impl std::fmt::Debug for SearchIter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchIter")
            .field("next_start", &self.next_start)
            .field("pending", &self.pending.len())
            .field("done", &self.done)
            .finish_non_exhaustive()
    }
}

impl SearchIter {
    /// Cancellation outcome: silent for a supersede, one error for a user cancel.
    fn stop_cancelled(&mut self) -> Option<Result<SearchResult, ViewerError>> {
        self.done = true;
        self.pending.clear();
        if self.cancel.is_user_cancelled() {
            debug!("Search cancelled by user");
            Some(Err(ViewerError::Cancelled))
        } else {
            debug!("Search superseded");
            None
        }
    }

    /// Load and scan the next segment, filling `pending`.
    fn step(&mut self) -> Result<(), ViewerError> {
        let file_size = self.source.file_size();
        let request_start = self.next_start;
        let request_len = self.segment_size.min(file_size - request_start);

        let Some(segment) = self
            .source
            .load(request_start as i64, request_len, &self.cancel)?
        else {
            return Err(ViewerError::Cancelled);
        };

        let first_line = self.first_line_of(&segment);
        self.scan(&segment, first_line);

        if let Some(progress) = &self.progress {
            let percent = ((request_start + request_len) * 100 / file_size).min(100) as u8;
            progress.report(percent, PROGRESS_LABEL);
        }

        if request_start + request_len >= file_size {
            self.done = true;
        } else {
            let end = segment.end_position();
            let candidate = end.saturating_sub(self.overlap);
            self.next_start = if candidate > request_start {
                candidate
            } else if end > request_start {
                end
            } else {
                request_start + request_len
            };
        }
        self.previous = Some(Walked {
            segment,
            first_line,
        });
        Ok(())
    }

    /// Line number of the first character of `segment`.
    fn first_line_of(&self, segment: &TextSegment) -> u64 {
        let Some(previous) = &self.previous else {
            return 0;
        };
        let encoding = self.source.encoding();
        let mut cursor = ByteCursor::new(&previous.segment, encoding);
        cursor.advance_to_file(segment.start_position.saturating_sub(previous.segment.start_position));
        previous.first_line + cursor.line_breaks()
    }

    fn scan(&mut self, segment: &TextSegment, first_line: u64) {
        let encoding = self.source.encoding();
        let text = segment.content.as_str();
        let mut cursor = ByteCursor::new(segment, encoding);

        // Skip whatever the previous segment already covered with a match.
        if self.last_end > segment.start_position {
            cursor.advance_to_file(self.last_end - segment.start_position);
        }

        for (from, to) in self.needle.find_all(text, cursor.text_pos()) {
            cursor.advance_to_text(from);
            let position = segment.start_position + cursor.file_pos();
            if position < self.last_end {
                continue;
            }
            let mut end = cursor.clone();
            end.advance_to_text(to);
            let length = end.file_pos() - cursor.file_pos();
            self.pending.push_back(SearchResult {
                position,
                length,
                line: first_line + cursor.line_breaks(),
            });
            self.last_end = position + length;
        }
    }
}

impl Iterator for SearchIter {
    type Item = Result<SearchResult, ViewerError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.cancel.is_cancelled() && !self.done {
                return self.stop_cancelled();
            }
            if let Some(result) = self.pending.pop_front() {
                return Some(Ok(result));
            }
            if self.done {
                return None;
            }
            match self.step() {
                Ok(()) => {}
                Err(ViewerError::Cancelled) => return self.stop_cancelled(),
                Err(err) => {
                    self.done = true;
                    return Some(Err(err));
                }
            }
        }
    }
}

impl std::iter::FusedIterator for SearchIter {}

#[cfg(test)]
#[path = "search_tests.rs"]
mod tests;
