//! Matching within one decoded segment, and mapping text offsets back to the file.

use memchr::memmem;

use crate::model::{Substitution, TextEncoding, TextSegment};

/// A search term prepared for repeated matching.
#[derive(Debug, Clone)]
pub struct Needle {
    pattern: String,
    case_sensitive: bool,
}

impl Needle {
    /// Prepare `term`. Case-insensitive needles are folded once up front.
    pub fn new(term: &str, case_sensitive: bool) -> Self {
        let pattern = if case_sensitive {
            term.to_string()
        } else {
            fold_case(term)
        };
        Self {
            pattern,
            case_sensitive,
        }
    }

    /// Whether there is nothing to search for.
    pub fn is_empty(&self) -> bool {
        self.pattern.is_empty()
    }

    /// Number of characters in the term.
    pub fn char_count(&self) -> usize {
        self.pattern.chars().count()
    }

    /// Non-overlapping matches in `text` at or after `from`, as text byte ranges.
    ///
    /// `from` must lie on a character boundary of `text`.
    pub fn find_all(&self, text: &str, from: usize) -> Vec<(usize, usize)> {
        if self.pattern.is_empty() || from >= text.len() {
            return Vec::new();
        }
        let folded;
        let haystack = if self.case_sensitive {
            &text[from..]
        } else {
            folded = fold_case(&text[from..]);
            folded.as_str()
        };

        let len = self.pattern.len();
        memmem::find_iter(haystack.as_bytes(), self.pattern.as_bytes())
            .map(|at| (from + at, from + at + len))
            .collect()
    }
}

/// Fold to lowercase one character at a time, keeping every byte offset unchanged.
///
/// A character is only replaced by its lowercase form when that form is a single
/// character of the same UTF-8 width; anything else is left as is.
pub fn fold_case(text: &str) -> String {
    if text.is_ascii() {
        return text.to_ascii_lowercase();
    }
    text.chars()
        .map(|ch| {
            let mut lower = ch.to_lowercase();
            match (lower.next(), lower.next()) {
                (Some(single), None) if single.len_utf8() == ch.len_utf8() => single,
                _ => ch,
            }
        })
        .collect()
}

/// Forward-only walk over a decoded segment tracking the matching file offset and
/// the number of line breaks passed.
///
/// Malformed input decoded to U+FFFD is counted by the bytes it actually replaced.
#[derive(Debug, Clone)]
pub struct ByteCursor<'a> {
    text: &'a str,
    pending: &'a [Substitution],
    encoding: TextEncoding,
    text_pos: usize,
    file_pos: u64,
    line_breaks: u64,
}

impl<'a> ByteCursor<'a> {
    /// Cursor at the start of `segment`.
    pub fn new(segment: &'a TextSegment, encoding: TextEncoding) -> Self {
        Self {
            text: &segment.content,
            pending: &segment.substitutions,
            encoding,
            text_pos: 0,
            file_pos: 0,
            line_breaks: 0,
        }
    }

    /// Current offset into the decoded text.
    pub fn text_pos(&self) -> usize {
        self.text_pos
    }

    /// File bytes passed so far, relative to the segment start.
    pub fn file_pos(&self) -> u64 {
        self.file_pos
    }

    /// Line breaks passed so far.
    pub fn line_breaks(&self) -> u64 {
        self.line_breaks
    }

    /// Move to text offset `target` (a character boundary at or after the cursor).
    pub fn advance_to_text(&mut self, target: usize) {
        let target = target.min(self.text.len());
        if target <= self.text_pos {
            return;
        }
        self.line_breaks +=
            memchr::memchr_iter(b'\n', self.text[self.text_pos..target].as_bytes()).count() as u64;

        let mut pending = self.pending;
        while let Some((sub, rest)) = pending.split_first() {
            if sub.text_offset >= target {
                break;
            }
            self.file_pos += self.encoding.encoded_len(&self.text[self.text_pos..sub.text_offset])
                as u64
                + sub.byte_len;
            self.text_pos = sub.text_end();
            pending = rest;
        }
        self.pending = pending;

        self.file_pos += self.encoding.encoded_len(&self.text[self.text_pos..target]) as u64;
        self.text_pos = target;
    }

    /// Move forward until at least `target` file bytes have been passed, or the text
    /// runs out. Stops on a character boundary.
    pub fn advance_to_file(&mut self, target: u64) {
        if matches!(self.encoding, TextEncoding::Utf8 | TextEncoding::Utf8Bom) {
            // Text and file bytes agree one to one between replacements.
            while self.file_pos < target && self.text_pos < self.text.len() {
                let next_sub = self
                    .pending
                    .first()
                    .map_or(self.text.len(), |sub| sub.text_offset);
                let wanted = self.text_pos + (target - self.file_pos) as usize;
                if wanted <= next_sub {
                    let mut to = wanted.min(self.text.len());
                    while !self.text.is_char_boundary(to) {
                        to += 1;
                    }
                    self.advance_to_text(to);
                    return;
                }
                self.advance_to_text(next_sub + char::REPLACEMENT_CHARACTER.len_utf8());
            }
            return;
        }
        while self.file_pos < target && self.text_pos < self.text.len() {
            let width = self.text[self.text_pos..]
                .chars()
                .next()
                .map_or(1, char::len_utf8);
            self.advance_to_text(self.text_pos + width);
        }
    }
}
