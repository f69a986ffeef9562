//! End-to-end scenarios over real files on disk.
//!
//! Each test builds its fixture in a temp directory and drives the public API the
//! way the command-line front end does.

use parking_lot::Mutex;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use streamview::model::ViewerError;
use streamview::search::{SearchConfig, SearchEngine};
use streamview::source::{
    analyze_file, AnalyzerConfig, CancelToken, LoaderLimits, ReadGate, SegmentLoader,
    SegmentSource,
};
use streamview::state::{
    Collaborators, ControllerState, DisplaySurface, IgnoreErrors, ViewportConfig,
    VirtualViewportController,
};

const MIB: u64 = 1024 * 1024;

fn loader_for(path: &Path, analyzer: AnalyzerConfig, limits: LoaderLimits) -> SegmentLoader {
    let info = analyze_file(path, &analyzer).expect("analyze");
    SegmentLoader::new(&info, limits, Arc::new(ReadGate::new(2)))
}

/// Write `count` lines of exactly `width` bytes (newline included) in 1 MiB chunks.
fn write_fixed_lines(path: &Path, count: usize, width: usize) {
    let mut file = File::create(path).expect("create fixture");
    let mut line = "x".repeat(width - 1);
    line.push('\n');
    let per_chunk = (MIB as usize / width).max(1);
    let chunk = line.repeat(per_chunk);
    let mut written = 0;
    while written + per_chunk <= count {
        file.write_all(chunk.as_bytes()).expect("write chunk");
        written += per_chunk;
    }
    for _ in written..count {
        file.write_all(line.as_bytes()).expect("write line");
    }
}

/// Formatted log output, shared with a scoped subscriber.
#[derive(Clone, Default)]
struct CapturedLog(Arc<Mutex<Vec<u8>>>);

impl CapturedLog {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }
}

impl Write for CapturedLog {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[derive(Clone, Default)]
struct RecordingDisplay {
    frames: Arc<Mutex<Vec<String>>>,
}

impl DisplaySurface for RecordingDisplay {
    fn set_visible_content(&mut self, text: &str) {
        self.frames.lock().push(text.to_string());
    }
}

// ===== File analysis =====

#[test]
fn hundred_megabyte_file_requires_streaming() {
    // GIVEN: a sparse 100 MB file and a 50 MB threshold
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("big.bin");
    File::create(&path)
        .expect("create")
        .set_len(100 * MIB)
        .expect("set_len");

    // WHEN: analyzing with the default config
    let info = analyze_file(&path, &AnalyzerConfig::default()).expect("analyze");

    // THEN: it must stream
    assert_eq!(info.size(), 100 * MIB);
    assert!(info.requires_streaming());
}

#[test]
fn million_line_estimate_is_within_twenty_percent() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("million.txt");
    write_fixed_lines(&path, 1_000_000, 100);

    let info = analyze_file(&path, &AnalyzerConfig::default()).expect("analyze");

    let estimate = info.estimated_line_count() as f64;
    assert!(
        (estimate - 1_000_000.0).abs() <= 200_000.0,
        "estimate {estimate} should be within 20% of 1,000,000"
    );
}

#[test]
fn file_at_threshold_does_not_stream() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("edge.txt");
    std::fs::write(&path, "a\n".repeat(512)).expect("write");
    let config = AnalyzerConfig {
        stream_threshold: 1024,
        ..AnalyzerConfig::default()
    };

    let info = analyze_file(&path, &config).expect("analyze");

    assert_eq!(info.size(), 1024);
    assert!(!info.requires_streaming());
}

// ===== Segment loading =====

#[test]
fn negative_start_is_out_of_range() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("small.txt");
    std::fs::write(&path, "hello\nworld\n").expect("write");
    let loader = loader_for(&path, AnalyzerConfig::default(), LoaderLimits::default());

    let result = loader.load(-5, 100, &CancelToken::new());

    assert!(matches!(
        result,
        Err(ViewerError::OutOfRange { position: -5, .. })
    ));
}

#[test]
fn oversized_request_is_clamped_not_rejected() {
    // GIVEN: a 12 MiB ASCII file and the default 10,000,000 byte cap
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("twelve.txt");
    write_fixed_lines(&path, 12 * 1024 * 1024 / 64, 64);
    let loader = loader_for(&path, AnalyzerConfig::default(), LoaderLimits::default());

    let log = CapturedLog::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer({
            let log = log.clone();
            move || log.clone()
        })
        .with_ansi(false)
        .with_max_level(tracing::Level::WARN)
        .finish();

    // WHEN: asking for 50,000,000 bytes
    let segment = tracing::subscriber::with_default(subscriber, || {
        loader.load(0, 50_000_000, &CancelToken::new())
    })
    .expect("clamped load succeeds")
    .expect("not cancelled");

    // THEN: exactly the cap comes back
    assert_eq!(segment.start_position, 0);
    assert_eq!(segment.length, 10_000_000);
    assert_eq!(segment.content.len(), 10_000_000);

    // AND: the clamp was logged as a warning
    let output = log.contents();
    assert!(output.contains("WARN"), "log: {output}");
    assert!(
        output.contains("Segment request clamped to maximum size"),
        "log: {output}"
    );
    assert!(output.contains("requested=50000000"), "log: {output}");
    assert!(output.contains("max=10000000"), "log: {output}");
}

#[test]
fn in_range_request_logs_no_clamp_warning() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("small.txt");
    std::fs::write(&path, "hello\nworld\n").expect("write");
    let loader = loader_for(&path, AnalyzerConfig::default(), LoaderLimits::default());
    let log = CapturedLog::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer({
            let log = log.clone();
            move || log.clone()
        })
        .with_ansi(false)
        .with_max_level(tracing::Level::WARN)
        .finish();

    let segment = tracing::subscriber::with_default(subscriber, || {
        loader.load(0, 12, &CancelToken::new())
    })
    .expect("load")
    .expect("not cancelled");

    assert_eq!(segment.content, "hello\nworld\n");
    assert!(log.contents().is_empty(), "log: {}", log.contents());
}

// ===== Search =====

#[test]
fn case_insensitive_match_straddling_first_boundary_is_found_once() {
    // GIVEN: a three-segment file with "NeEdLe" crossing the 1024-byte boundary
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("haystack.txt");
    let mut text = vec![b'.'; 3 * 1024];
    let position = 1024 - 3;
    text[position..position + 6].copy_from_slice(b"NeEdLe");
    std::fs::write(&path, &text).expect("write");
    let source: Arc<dyn SegmentSource> = Arc::new(loader_for(
        &path,
        AnalyzerConfig::default(),
        LoaderLimits::default(),
    ));
    let engine = SearchEngine::new(source, SearchConfig { segment_size: 1024 }, None);

    // WHEN: searching case-insensitively
    let results: Vec<_> = engine
        .search("needle", false, CancelToken::new())
        .collect::<Result<_, _>>()
        .expect("search succeeds");

    // THEN: exactly one hit at the absolute byte offset
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].position, position as u64);
    assert_eq!(results[0].length, 6);
    assert_eq!(results[0].line, 0);
}

// ===== Viewport =====

#[test]
fn later_viewport_change_supersedes_earlier_one() {
    // GIVEN: a streamed 1000-line file
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("lines.txt");
    let body: String = (0..1000).map(|i| format!("line {i:06}\n")).collect();
    std::fs::write(&path, body).expect("write");
    let analyzer = AnalyzerConfig {
        stream_threshold: 1024,
        sample_size: 256,
    };
    let info = analyze_file(&path, &analyzer).expect("analyze");
    assert!(info.requires_streaming());
    let source: Arc<dyn SegmentSource> = Arc::new(SegmentLoader::new(
        &info,
        LoaderLimits::default(),
        Arc::new(ReadGate::new(2)),
    ));
    let display = RecordingDisplay::default();
    let mut controller = VirtualViewportController::new(
        info,
        source,
        ViewportConfig {
            buffer_lines: 5,
            max_cached_lines: 100,
        },
        Collaborators {
            display: Box::new(display.clone()),
            error_dialog: Box::new(IgnoreErrors),
            progress: None,
        },
    );

    // WHEN: change A is immediately followed by change B
    controller.set_viewport(100, 10);
    controller.set_viewport(800, 10);
    assert!(controller.wait_idle(Duration::from_secs(10)));

    // THEN: only B ever reached the display
    assert_eq!(controller.state(), ControllerState::Loaded);
    let frames = display.frames.lock();
    assert!(!frames.is_empty());
    for frame in frames.iter() {
        assert_eq!(frame.lines().next(), Some("line 000800"), "frame: {frame:?}");
    }
    assert_eq!(frames.last().map(|f| f.lines().count()), Some(10));
}
