//! Text encodings for streamed files.
//!
//! Segments are decoded to UTF-8 `String`s on load. Because segments start at
//! arbitrary byte offsets, each encoding also knows how to find a safe character
//! boundary near a given offset (see [`crate::source::boundary`]) and how to map
//! decoded text back to a byte length in the file.
//!
//! # Detection order
//!
//! 1. Byte order mark (UTF-8, UTF-16 LE/BE)
//! 2. UTF-8 validation (tolerating a sequence cut off by the end of the sample)
//! 3. UTF-16 without BOM, from the distribution of zero bytes
//! 4. Statistical detection with `chardetng` for legacy encodings
//! 5. Windows-1252 as the fallback for anything ambiguous

use encoding_rs::DecoderResult;
use serde::{Deserialize, Serialize};

use super::types::Substitution;

/// Encodings the loader can stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TextEncoding {
    /// UTF-8 (also covers plain ASCII).
    #[default]
    Utf8,
    /// UTF-8 with a leading byte order mark.
    Utf8Bom,
    /// UTF-16 little endian.
    Utf16Le,
    /// UTF-16 big endian.
    Utf16Be,
    /// Windows-1252 / Latin-1. Every byte is one character.
    Windows1252,
    /// Shift_JIS (Japanese).
    ShiftJis,
    /// GB18030 (Chinese, superset of GBK).
    Gb18030,
    /// EUC-KR (Korean).
    EucKr,
}

impl TextEncoding {
    /// Short name for status output.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Utf8 => "UTF-8",
            Self::Utf8Bom => "UTF-8 BOM",
            Self::Utf16Le => "UTF-16 LE",
            Self::Utf16Be => "UTF-16 BE",
            Self::Windows1252 => "Windows-1252",
            Self::ShiftJis => "Shift_JIS",
            Self::Gb18030 => "GB18030",
            Self::EucKr => "EUC-KR",
        }
    }

    /// The `encoding_rs` codec used for decoding.
    pub fn to_encoding_rs(&self) -> &'static encoding_rs::Encoding {
        match self {
            Self::Utf8 | Self::Utf8Bom => encoding_rs::UTF_8,
            Self::Utf16Le => encoding_rs::UTF_16LE,
            Self::Utf16Be => encoding_rs::UTF_16BE,
            Self::Windows1252 => encoding_rs::WINDOWS_1252,
            Self::ShiftJis => encoding_rs::SHIFT_JIS,
            Self::Gb18030 => encoding_rs::GB18030,
            Self::EucKr => encoding_rs::EUC_KR,
        }
    }

    /// Length of the byte order mark at the start of the file, if any.
    pub fn bom_len(&self) -> usize {
        match self {
            Self::Utf8Bom => 3,
            Self::Utf16Le | Self::Utf16Be => 2,
            _ => 0,
        }
    }

    /// Widest encoded character, in bytes.
    pub fn max_char_width(&self) -> usize {
        match self {
            Self::Utf8 | Self::Utf8Bom | Self::Utf16Le | Self::Utf16Be | Self::Gb18030 => 4,
            Self::ShiftJis | Self::EucKr => 2,
            Self::Windows1252 => 1,
        }
    }

    /// Whether a character boundary can be found from any offset by looking at the
    /// nearby bytes only.
    ///
    /// UTF-8 has distinct lead/continuation bit patterns, UTF-16 needs 2-byte
    /// alignment plus surrogate checks, and single-byte encodings are trivial. The
    /// legacy CJK encodings reuse ASCII-range values as trail bytes, so the only safe
    /// sync points are line breaks.
    pub fn is_self_synchronizing(&self) -> bool {
        !matches!(self, Self::ShiftJis | Self::Gb18030 | Self::EucKr)
    }

    /// Whether the encoding uses 2-byte code units.
    pub fn is_utf16(&self) -> bool {
        matches!(self, Self::Utf16Le | Self::Utf16Be)
    }

    /// Decode raw bytes that start and end on character boundaries.
    ///
    /// The BOM must already be stripped by the caller. Malformed input is replaced
    /// with U+FFFD rather than failing, and each replacement is reported with the
    /// bytes it covers.
    pub fn decode(&self, bytes: &[u8]) -> (String, Vec<Substitution>) {
        let mut decoder = self.to_encoding_rs().new_decoder_without_bom_handling();
        let mut text = String::with_capacity(
            decoder
                .max_utf8_buffer_length_without_replacement(bytes.len())
                .unwrap_or(bytes.len()),
        );
        let mut substitutions = Vec::new();
        let mut consumed = 0;

        loop {
            let (result, read) =
                decoder.decode_to_string_without_replacement(&bytes[consumed..], &mut text, true);
            consumed += read;
            match result {
                DecoderResult::InputEmpty => break,
                DecoderResult::OutputFull => {
                    let remaining = bytes.len() - consumed;
                    text.reserve(
                        decoder
                            .max_utf8_buffer_length_without_replacement(remaining)
                            .unwrap_or(remaining)
                            .max(4),
                    );
                }
                DecoderResult::Malformed(bad, after) => {
                    // `after` bytes were read past the bad run but not yet emitted.
                    let byte_len = u64::from(bad);
                    substitutions.push(Substitution {
                        text_offset: text.len(),
                        byte_offset: consumed as u64 - u64::from(after) - byte_len,
                        byte_len,
                    });
                    text.push(char::REPLACEMENT_CHARACTER);
                }
            }
        }
        (text, substitutions)
    }

    /// Number of bytes `text` occupies in the file when encoded with `self`.
    ///
    /// Used to map positions in decoded text back to absolute file offsets.
    pub fn encoded_len(&self, text: &str) -> usize {
        match self {
            Self::Utf8 | Self::Utf8Bom => text.len(),
            Self::Utf16Le | Self::Utf16Be => text.encode_utf16().count() * 2,
            Self::Windows1252 => text.chars().count(),
            Self::ShiftJis | Self::Gb18030 | Self::EucKr => {
                let (bytes, _, _) = self.to_encoding_rs().encode(text);
                bytes.len()
            }
        }
    }

    /// Encoded width of a single character.
    pub fn char_width(&self, ch: char) -> usize {
        match self {
            Self::Utf8 | Self::Utf8Bom => ch.len_utf8(),
            Self::Utf16Le | Self::Utf16Be => ch.len_utf16() * 2,
            Self::Windows1252 => 1,
            _ if ch.is_ascii() => 1,
            _ => {
                let mut buf = [0u8; 4];
                self.encoded_len(ch.encode_utf8(&mut buf))
            }
        }
    }

    /// Count line feeds in raw bytes.
    ///
    /// For UTF-16 only aligned `0x000A` code units count; every other supported
    /// encoding never uses `0x0A` inside a multi-byte sequence.
    pub fn count_line_breaks(&self, bytes: &[u8]) -> usize {
        match self {
            Self::Utf16Le => bytes
                .chunks_exact(2)
                .filter(|unit| unit[0] == b'\n' && unit[1] == 0)
                .count(),
            Self::Utf16Be => bytes
                .chunks_exact(2)
                .filter(|unit| unit[0] == 0 && unit[1] == b'\n')
                .count(),
            _ => memchr::memchr_iter(b'\n', bytes).count(),
        }
    }

    /// Detect the encoding of a file from a prefix sample.
    ///
    /// `complete` is true when the sample holds the entire file, so a sequence cut
    /// off at the end is genuinely malformed rather than truncated by sampling.
    pub fn detect(sample: &[u8], complete: bool) -> Self {
        if sample.starts_with(&[0xEF, 0xBB, 0xBF]) {
            return Self::Utf8Bom;
        }
        if sample.starts_with(&[0xFF, 0xFE]) {
            return Self::Utf16Le;
        }
        if sample.starts_with(&[0xFE, 0xFF]) {
            return Self::Utf16Be;
        }

        match std::str::from_utf8(sample) {
            Ok(_) => return Self::Utf8,
            // Cut mid-sequence by the sample window, everything before it is valid.
            Err(e) if e.error_len().is_none() && !complete => return Self::Utf8,
            Err(_) => {}
        }

        if let Some(utf16) = detect_utf16_without_bom(sample) {
            return utf16;
        }

        let mut detector = chardetng::EncodingDetector::new();
        detector.feed(sample, complete);
        let guessed = detector.guess(None, true);

        if guessed == encoding_rs::SHIFT_JIS {
            Self::ShiftJis
        } else if guessed == encoding_rs::GB18030 || guessed == encoding_rs::GBK {
            Self::Gb18030
        } else if guessed == encoding_rs::EUC_KR {
            Self::EucKr
        } else {
            Self::Windows1252
        }
    }
}

impl std::fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Recognize BOM-less UTF-16 by the zero high bytes of mostly-ASCII text.
fn detect_utf16_without_bom(sample: &[u8]) -> Option<TextEncoding> {
    if sample.len() < 4 {
        return None;
    }
    let is_text_byte = |b: u8| (0x20..=0x7E).contains(&b) || b == b'\n' || b == b'\r' || b == b'\t';
    let pairs = sample.len() / 2;
    let le = sample
        .chunks_exact(2)
        .filter(|unit| unit[1] == 0 && is_text_byte(unit[0]))
        .count();
    let be = sample
        .chunks_exact(2)
        .filter(|unit| unit[0] == 0 && is_text_byte(unit[1]))
        .count();

    if le > pairs / 2 {
        Some(TextEncoding::Utf16Le)
    } else if be > pairs / 2 {
        Some(TextEncoding::Utf16Be)
    } else {
        None
    }
}
