//! Bounded LRU cache of decoded lines keyed by line number.

use lru::LruCache;
use std::num::NonZeroUsize;

/// Default number of resident lines.
pub const DEFAULT_MAX_CACHED_LINES: usize = 10_000;

/// Line cache for the viewport.
///
/// Bounded capacity with least-recently-used eviction. Reading with [`get`](Self::get)
/// counts as a use; [`peek`](Self::peek) does not. Not synchronized: the controller is
/// the only writer.
#[derive(Debug)]
pub struct ViewportCache {
    lines: LruCache<u64, String>,
}

impl ViewportCache {
    /// Create a cache holding at most `max_cached_lines` lines.
    ///
    /// A capacity of 0 falls back to [`DEFAULT_MAX_CACHED_LINES`].
    pub fn new(max_cached_lines: usize) -> Self {
        let capacity = NonZeroUsize::new(max_cached_lines)
            .or(NonZeroUsize::new(DEFAULT_MAX_CACHED_LINES))
            .unwrap_or(NonZeroUsize::MIN);
        Self {
            lines: LruCache::new(capacity),
        }
    }

    /// Cached content of `line`, marking it most recently used.
    pub fn get(&mut self, line: u64) -> Option<&str> {
        self.lines.get(&line).map(String::as_str)
    }

    /// Cached content of `line` without touching recency.
    pub fn peek(&self, line: u64) -> Option<&str> {
        self.lines.peek(&line).map(String::as_str)
    }

    /// Whether `line` is cached. Does not touch recency.
    pub fn contains(&self, line: u64) -> bool {
        self.lines.contains(&line)
    }

    /// Insert or replace `line`, evicting the least recently used line when full.
    pub fn put(&mut self, line: u64, content: impl Into<String>) {
        self.lines.put(line, content.into());
    }

    /// Insert consecutive lines starting at `first_line`.
    pub fn extend_lines<I, S>(&mut self, first_line: u64, lines: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for (offset, content) in lines.into_iter().enumerate() {
            self.put(first_line + offset as u64, content);
        }
    }

    /// Drop every cached line.
    pub fn clear(&mut self) {
        self.lines.clear();
    }

    /// Number of cached lines.
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Whether nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Maximum number of lines held.
    pub fn capacity(&self) -> usize {
        self.lines.cap().get()
    }
}

impl Default for ViewportCache {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CACHED_LINES)
    }
}
