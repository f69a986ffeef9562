//! Tests for the streaming search walk.

use super::*;
use crate::model::{FileStreamInfo, TextEncoding};
use crate::source::{LoaderLimits, ReadGate, SegmentLoader};
use parking_lot::Mutex;
use std::io::Write;
use tempfile::NamedTempFile;

// ===== Helpers =====

struct Fixture {
    _file: NamedTempFile,
    engine: SearchEngine,
}

fn fixture(content: &[u8], encoding: TextEncoding, segment_size: u64) -> Fixture {
    fixture_with_progress(content, encoding, segment_size, None)
}

fn fixture_with_progress(
    content: &[u8],
    encoding: TextEncoding,
    segment_size: u64,
    progress: Option<Arc<dyn ProgressSink>>,
) -> Fixture {
    let mut file = NamedTempFile::new().expect("temp file");
    file.write_all(content).expect("write fixture");
    file.flush().expect("flush fixture");
    let info = FileStreamInfo::new(file.path(), content.len() as u64, false, 1, encoding);
    let loader = SegmentLoader::new(&info, LoaderLimits::default(), Arc::new(ReadGate::new(2)));
    let engine = SearchEngine::new(Arc::new(loader), SearchConfig { segment_size }, progress);
    Fixture {
        _file: file,
        engine,
    }
}

fn collect(iter: SearchIter) -> Vec<SearchResult> {
    iter.collect::<Result<Vec<_>, _>>().expect("search succeeds")
}

#[derive(Default)]
struct RecordingProgress {
    reports: Mutex<Vec<(u8, String)>>,
}

impl ProgressSink for RecordingProgress {
    fn report(&self, percent: u8, label: &str) {
        self.reports.lock().push((percent, label.to_string()));
    }
}

// ===== Basic matching =====

#[test]
fn finds_every_occurrence_with_line_numbers() {
    // GIVEN: three lines, "cat" on lines 0 and 2
    let fx = fixture(b"a cat\nno match\ncat again\n", TextEncoding::Utf8, 1024);

    // WHEN: searching
    let results = collect(fx.engine.search("cat", true, CancelToken::new()));

    // THEN: both hits with positions and lines
    assert_eq!(
        results,
        vec![
            SearchResult { position: 2, length: 3, line: 0 },
            SearchResult { position: 15, length: 3, line: 2 },
        ]
    );
}

#[test]
fn empty_term_yields_nothing() {
    let fx = fixture(b"anything", TextEncoding::Utf8, 1024);
    assert!(collect(fx.engine.search("", false, CancelToken::new())).is_empty());
}

#[test]
fn empty_file_yields_nothing() {
    let fx = fixture(b"", TextEncoding::Utf8, 1024);
    assert!(collect(fx.engine.search("x", false, CancelToken::new())).is_empty());
}

#[test]
fn search_is_restartable() {
    let fx = fixture(b"ab ab ab", TextEncoding::Utf8, 1024);
    let first = collect(fx.engine.search("ab", true, CancelToken::new()));
    let second = collect(fx.engine.search("ab", true, CancelToken::new()));
    assert_eq!(first.len(), 3);
    assert_eq!(first, second);
}

// ===== Segment boundaries =====

#[test]
fn finds_term_spanning_segment_boundary() {
    // GIVEN: a 10-byte term at offset 1020 with 1024-byte segments
    let mut content = vec![b'.'; 2048];
    content[1020..1030].copy_from_slice(b"0123456789");
    let fx = fixture(&content, TextEncoding::Utf8, 1024);

    // WHEN
    let results = collect(fx.engine.search("0123456789", true, CancelToken::new()));

    // THEN: found exactly once
    assert_eq!(results, vec![SearchResult { position: 1020, length: 10, line: 0 }]);
}

#[test]
fn match_inside_overlap_is_reported_once() {
    // GIVEN: a match fully inside the region both segments cover
    let mut content = vec![b'-'; 300];
    content[250..254].copy_from_slice(b"find");
    let fx = fixture(&content, TextEncoding::Utf8, 256);

    let results = collect(fx.engine.search("find", true, CancelToken::new()));

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].position, 250);
}

#[test]
fn case_insensitive_match_across_first_boundary_of_three_segments() {
    // GIVEN: three segments' worth of text, "NeEdLe" straddling the first boundary
    let mut content = vec![b'x'; 3000];
    content[1021..1027].copy_from_slice(b"NeEdLe");
    let fx = fixture(&content, TextEncoding::Utf8, 1024);

    // WHEN
    let results = collect(fx.engine.search("needle", false, CancelToken::new()));

    // THEN
    assert_eq!(results, vec![SearchResult { position: 1021, length: 6, line: 0 }]);
}

#[test]
fn line_numbers_carry_across_segments() {
    let content = "line\n".repeat(500) + "target\n";
    let fx = fixture(content.as_bytes(), TextEncoding::Utf8, 256);

    let results = collect(fx.engine.search("target", true, CancelToken::new()));

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].line, 500);
    assert_eq!(results[0].position, 2500);
}

#[test]
fn results_are_strictly_ascending() {
    let content = "ab".repeat(2000);
    let fx = fixture(content.as_bytes(), TextEncoding::Utf8, 128);

    let results = collect(fx.engine.search("ab", true, CancelToken::new()));

    assert_eq!(results.len(), 2000);
    assert!(results.windows(2).all(|w| w[0].position < w[1].position));
}

#[test]
fn term_longer_than_half_a_segment_is_still_found() {
    let term = "z".repeat(40);
    let content = format!("{}{}{}", "-".repeat(100), term, "-".repeat(100));
    let fx = fixture(content.as_bytes(), TextEncoding::Utf8, 64);

    let results = collect(fx.engine.search(&term, true, CancelToken::new()));

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].position, 100);
}

// ===== Encodings =====

#[test]
fn multibyte_positions_are_file_offsets() {
    let content = "日本語のテキスト検索";
    let fx = fixture(content.as_bytes(), TextEncoding::Utf8, 1024);

    let results = collect(fx.engine.search("検索", true, CancelToken::new()));

    assert_eq!(results, vec![SearchResult { position: 24, length: 6, line: 0 }]);
}

#[test]
fn utf16_positions_count_code_units_twice() {
    let mut bytes = vec![0xFF, 0xFE];
    bytes.extend("ab\nfind".encode_utf16().flat_map(|u| u.to_le_bytes()));
    let fx = fixture(&bytes, TextEncoding::Utf16Le, 1024);

    let results = collect(fx.engine.search("find", true, CancelToken::new()));

    assert_eq!(results, vec![SearchResult { position: 8, length: 8, line: 1 }]);
}

// ===== Malformed input =====

#[test]
fn stray_byte_does_not_shift_later_positions() {
    // GIVEN: one invalid byte, which decodes to a 3-byte U+FFFD
    let fx = fixture(b"ab\xFFneedle", TextEncoding::Utf8, 1024);

    let results = collect(fx.engine.search("needle", true, CancelToken::new()));

    // THEN: the position counts the single byte in the file
    assert_eq!(results, vec![SearchResult { position: 3, length: 6, line: 0 }]);
}

#[test]
fn scattered_stray_bytes_keep_positions_exact_across_segments() {
    // GIVEN: 3 KiB of dots with an invalid byte every 97 bytes, a line break at
    // 1200, and "needle" straddling the first boundary and again on line 1
    let mut content = vec![b'.'; 3 * 1024];
    for i in (97..content.len()).step_by(97) {
        content[i] = 0xFF;
    }
    content[1200] = b'\n';
    content[1020..1026].copy_from_slice(b"needle");
    content[1500..1506].copy_from_slice(b"needle");
    let fx = fixture(&content, TextEncoding::Utf8, 1024);

    // WHEN
    let results = collect(fx.engine.search("needle", true, CancelToken::new()));

    // THEN
    assert_eq!(
        results,
        vec![
            SearchResult { position: 1020, length: 6, line: 0 },
            SearchResult { position: 1500, length: 6, line: 1 },
        ]
    );
}

// ===== Cancellation =====

#[test]
fn superseded_search_ends_silently() {
    let fx = fixture(b"hit hit hit", TextEncoding::Utf8, 1024);
    let token = CancelToken::new();
    token.cancel();

    let mut iter = fx.engine.search("hit", true, token);

    assert!(iter.next().is_none());
    assert!(iter.next().is_none());
}

#[test]
fn user_cancel_yields_one_error_then_ends() {
    let fx = fixture(b"hit hit hit", TextEncoding::Utf8, 1024);
    let token = CancelToken::new();
    token.cancel_by_user();

    let mut iter = fx.engine.search("hit", true, token);

    assert!(matches!(iter.next(), Some(Err(ViewerError::Cancelled))));
    assert!(iter.next().is_none());
}

#[test]
fn cancel_mid_walk_stops_further_results() {
    let content = "hit\n".repeat(1000);
    let fx = fixture(content.as_bytes(), TextEncoding::Utf8, 64);
    let token = CancelToken::new();
    let mut iter = fx.engine.search("hit", true, token.clone());

    assert!(matches!(iter.next(), Some(Ok(_))));
    token.cancel();

    assert!(iter.next().is_none());
}

// ===== Progress =====

#[test]
fn progress_reaches_one_hundred_percent() {
    let progress = Arc::new(RecordingProgress::default());
    let content = vec![b'q'; 4096];
    let fx = fixture_with_progress(
        &content,
        TextEncoding::Utf8,
        1024,
        Some(progress.clone() as Arc<dyn ProgressSink>),
    );

    let _ = collect(fx.engine.search("nope", true, CancelToken::new()));

    let reports = progress.reports.lock();
    assert!(!reports.is_empty());
    assert_eq!(reports.last().map(|(p, _)| *p), Some(100));
    assert!(reports.iter().all(|(_, label)| label == PROGRESS_LABEL));
    assert!(reports.windows(2).all(|w| w[0].0 <= w[1].0));
}
