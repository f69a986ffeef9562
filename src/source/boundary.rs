//! Character boundary adjustment for raw byte windows.
//!
//! A segment request names an arbitrary byte range. Before decoding, the range is moved
//! so that it neither starts nor ends inside a multi-byte character:
//!
//! - the start moves forward (inward) to the next character boundary,
//! - the end moves back (inward) to the last complete character,
//! - if that leaves nothing although bytes were requested, the end extends outward
//!   over the lookahead bytes to complete the first character.
//!
//! At end of file the tail is never trimmed: an incomplete final sequence is malformed
//! input, decoded lossily, and must not make the range stop short of EOF.

use std::ops::Range;

use crate::model::TextEncoding;

/// Raw bytes read for one segment request.
#[derive(Debug, Clone, Copy)]
pub struct RawWindow<'a> {
    /// Requested bytes followed by up to `max_char_width - 1` lookahead bytes.
    pub bytes: &'a [u8],
    /// Absolute file offset of `bytes[0]`.
    pub abs_start: u64,
    /// `bytes[..requested_len]` is the requested range.
    pub requested_len: usize,
    /// The byte just before `abs_start`, if `abs_start > 0`.
    pub prev_byte: Option<u8>,
    /// Whether the requested range ends at EOF.
    pub at_eof: bool,
}

/// Compute the decodable sub-range of `window.bytes`.
pub fn adjust(encoding: TextEncoding, window: &RawWindow<'_>) -> Range<usize> {
    let start = adjust_start(encoding, window);
    let mut end = adjust_end(encoding, window, start);

    if end <= start && window.requested_len > start {
        end = extend_to_char_end(encoding, window, start);
    }
    start..end.max(start)
}

fn adjust_start(encoding: TextEncoding, window: &RawWindow<'_>) -> usize {
    let bytes = window.bytes;
    let limit = window.requested_len.min(bytes.len());

    // Skip the byte order mark; it is not content.
    let bom = encoding.bom_len() as u64;
    let mut start = if window.abs_start < bom {
        ((bom - window.abs_start) as usize).min(limit)
    } else {
        0
    };

    match encoding {
        TextEncoding::Utf8 | TextEncoding::Utf8Bom => {
            // May run into the lookahead so a window inside one character still
            // lands on a character start.
            let first = start;
            while start < bytes.len() && start - first < 3 && is_utf8_continuation(bytes[start]) {
                start += 1;
            }
        }
        TextEncoding::Utf16Le | TextEncoding::Utf16Be => {
            if (window.abs_start + start as u64) % 2 == 1 {
                start = (start + 1).min(limit);
            }
            if start + 1 < limit && is_low_surrogate(utf16_unit(encoding, bytes, start)) {
                start += 2;
            }
        }
        TextEncoding::Windows1252 => {}
        TextEncoding::ShiftJis | TextEncoding::Gb18030 | TextEncoding::EucKr => {
            let preceding = if start > 0 {
                Some(bytes[start - 1])
            } else {
                window.prev_byte
            };
            let at_line_start = window.abs_start + start as u64 == 0 || preceding == Some(b'\n');
            if !at_line_start {
                if let Some(nl) = memchr::memchr(b'\n', &bytes[start..limit]) {
                    start += nl + 1;
                }
            }
        }
    }
    start
}

fn adjust_end(encoding: TextEncoding, window: &RawWindow<'_>, start: usize) -> usize {
    let bytes = window.bytes;
    let mut end = window.requested_len.min(bytes.len());
    if end <= start || window.at_eof {
        return end;
    }

    match encoding {
        TextEncoding::Utf8 | TextEncoding::Utf8Bom => {
            let floor = end.saturating_sub(4).max(start);
            if let Some(lead) = (floor..end).rev().find(|&i| !is_utf8_continuation(bytes[i])) {
                if lead + utf8_sequence_len(bytes[lead]) > end {
                    end = lead;
                }
            }
        }
        TextEncoding::Utf16Le | TextEncoding::Utf16Be => {
            end -= (end - start) % 2;
            if end >= start + 2 && is_high_surrogate(utf16_unit(encoding, bytes, end - 2)) {
                end -= 2;
            }
        }
        TextEncoding::Windows1252 => {}
        TextEncoding::ShiftJis | TextEncoding::Gb18030 | TextEncoding::EucKr => {
            if let Some(nl) = memchr::memrchr(b'\n', &bytes[start..end]) {
                end = start + nl + 1;
            }
        }
    }
    end
}

/// End of the character starting at `start`, using lookahead bytes if needed.
fn extend_to_char_end(encoding: TextEncoding, window: &RawWindow<'_>, start: usize) -> usize {
    let bytes = window.bytes;
    let width = match encoding {
        TextEncoding::Utf8 | TextEncoding::Utf8Bom => utf8_sequence_len(bytes[start]),
        TextEncoding::Utf16Le | TextEncoding::Utf16Be => {
            if start + 1 < bytes.len() && is_high_surrogate(utf16_unit(encoding, bytes, start)) {
                4
            } else {
                2
            }
        }
        TextEncoding::Windows1252 => 1,
        // No way to size a legacy character in isolation; keep the raw request.
        TextEncoding::ShiftJis | TextEncoding::Gb18030 | TextEncoding::EucKr => {
            window.requested_len - start
        }
    };
    (start + width).min(bytes.len())
}

fn is_utf8_continuation(byte: u8) -> bool {
    byte & 0b1100_0000 == 0b1000_0000
}

/// Length of the UTF-8 sequence introduced by `lead`; 1 for ASCII and invalid leads.
fn utf8_sequence_len(lead: u8) -> usize {
    match lead {
        0xC0..=0xDF => 2,
        0xE0..=0xEF => 3,
        0xF0..=0xF7 => 4,
        _ => 1,
    }
}

fn utf16_unit(encoding: TextEncoding, bytes: &[u8], at: usize) -> u16 {
    let pair = [bytes[at], bytes[at + 1]];
    if encoding == TextEncoding::Utf16Be {
        u16::from_be_bytes(pair)
    } else {
        u16::from_le_bytes(pair)
    }
}

fn is_high_surrogate(unit: u16) -> bool {
    (0xD800..=0xDBFF).contains(&unit)
}

fn is_low_surrogate(unit: u16) -> bool {
    (0xDC00..=0xDFFF).contains(&unit)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Window over `file[start..start + len]` plus lookahead, like the loader builds.
    fn window_of<'a>(
        encoding: TextEncoding,
        file: &'a [u8],
        start: usize,
        len: usize,
    ) -> RawWindow<'a> {
        let lookahead = encoding.max_char_width() - 1;
        let end = (start + len + lookahead).min(file.len());
        RawWindow {
            bytes: &file[start..end],
            abs_start: start as u64,
            requested_len: len.min(file.len() - start),
            prev_byte: start.checked_sub(1).map(|i| file[i]),
            at_eof: start + len >= file.len(),
        }
    }

    fn adjusted<'a>(encoding: TextEncoding, file: &'a [u8], start: usize, len: usize) -> &'a [u8] {
        let window = window_of(encoding, file, start, len);
        let range = adjust(encoding, &window);
        &window.bytes[range]
    }

    #[test]
    fn ascii_is_untouched() {
        let file = b"hello world";
        assert_eq!(adjusted(TextEncoding::Utf8, file, 2, 5), b"llo w");
    }

    #[test]
    fn utf8_start_skips_continuation_bytes() {
        let file = "a日b".as_bytes(); // 61 E6 97 A5 62
        assert_eq!(adjusted(TextEncoding::Utf8, file, 2, 3), b"b");
    }

    #[test]
    fn utf8_end_trims_incomplete_sequence() {
        let file = "ab日c".as_bytes(); // 61 62 E6 97 A5 63
        assert_eq!(adjusted(TextEncoding::Utf8, file, 0, 4), b"ab");
    }

    #[test]
    fn utf8_complete_sequence_at_end_is_kept() {
        let file = "ab日c".as_bytes();
        assert_eq!(adjusted(TextEncoding::Utf8, file, 0, 5), "ab日".as_bytes());
    }

    #[test]
    fn utf8_tiny_request_extends_outward() {
        let file = "日本".as_bytes();
        assert_eq!(adjusted(TextEncoding::Utf8, file, 0, 1), "日".as_bytes());
    }

    #[test]
    fn utf8_tiny_request_inside_character_is_empty() {
        let file = "日本".as_bytes();
        assert_eq!(adjusted(TextEncoding::Utf8, file, 1, 1), b"");
    }

    #[test]
    fn utf8_bom_is_skipped_at_file_start() {
        let file = b"\xEF\xBB\xBFabc";
        assert_eq!(adjusted(TextEncoding::Utf8Bom, file, 0, 6), b"abc");
        assert_eq!(adjusted(TextEncoding::Utf8Bom, file, 1, 5), b"abc");
    }

    #[test]
    fn utf8_malformed_tail_at_eof_is_not_trimmed() {
        let file = b"ab\xE6\x97";
        assert_eq!(adjusted(TextEncoding::Utf8, file, 0, 4), b"ab\xE6\x97");
    }

    fn utf16le(text: &str) -> Vec<u8> {
        text.encode_utf16().flat_map(|u| u.to_le_bytes()).collect()
    }

    #[test]
    fn utf16_aligns_odd_start_and_length() {
        let file = utf16le("abcd");
        assert_eq!(adjusted(TextEncoding::Utf16Le, &file, 1, 4), &utf16le("b")[..]);
    }

    #[test]
    fn utf16_never_splits_surrogate_pairs() {
        let file = utf16le("a😀b"); // a, high, low, b
        // Start on the low surrogate: skip it.
        assert_eq!(adjusted(TextEncoding::Utf16Le, &file, 4, 4), &utf16le("b")[..]);
        // End right after the high surrogate: trim it.
        assert_eq!(adjusted(TextEncoding::Utf16Le, &file, 0, 4), &utf16le("a")[..]);
    }

    #[test]
    fn utf16_bom_is_skipped() {
        let mut file = vec![0xFF, 0xFE];
        file.extend(utf16le("hi"));
        assert_eq!(adjusted(TextEncoding::Utf16Le, &file, 0, 6), &utf16le("hi")[..]);
    }

    #[test]
    fn legacy_snaps_to_line_breaks() {
        let file = b"first\nsecond\nthird";
        assert_eq!(adjusted(TextEncoding::ShiftJis, file, 2, 12), b"second\n");
    }

    #[test]
    fn legacy_at_line_start_keeps_start() {
        let file = b"first\nsecond\nthird";
        assert_eq!(adjusted(TextEncoding::ShiftJis, file, 6, 12), b"second\nthird");
    }

    #[test]
    fn single_byte_encoding_needs_no_adjustment() {
        let file = b"caf\xE9 au lait";
        assert_eq!(adjusted(TextEncoding::Windows1252, file, 3, 4), b"\xE9 au");
    }
}
