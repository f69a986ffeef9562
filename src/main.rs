//! streamview - Entry Point

use clap::Parser;
use parking_lot::Mutex;
use serde::Serialize;
use std::io::{IsTerminal, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use streamview::model::{AppError, FileStreamInfo, SearchResult};
use streamview::search::SearchEngine;
use streamview::source::{analyze_file, CancelToken, ReadGate, SegmentLoader, SegmentSource};
use streamview::state::{
    Collaborators, ControllerState, DisplaySurface, ErrorDecision, ErrorDialog, ProgressSink,
    RecoverableError, VirtualViewportController,
};
use tracing::{info, warn};

/// How long to wait for the viewport to load before giving up.
const LOAD_TIMEOUT: Duration = Duration::from_secs(60);

/// streamview - view a window of a file of any size
#[derive(Parser, Debug)]
#[command(name = "streamview")]
#[command(version)]
#[command(about = "Print a window of a text file of any size, optionally searching it")]
pub struct Args {
    /// Path to the text file
    pub file: PathBuf,

    /// First line to show (1-based)
    #[arg(short, long, default_value = "1", value_parser = clap::value_parser!(u64).range(1..))]
    pub line: u64,

    /// Number of lines to show
    #[arg(short = 'n', long, default_value = "20")]
    pub lines: u64,

    /// Search the whole file for this term
    #[arg(short, long)]
    pub search: Option<String>,

    /// Match the search term case-sensitively
    #[arg(long)]
    pub case_sensitive: bool,

    /// Emit JSON lines instead of text
    #[arg(long)]
    pub json: bool,

    /// Override the maximum bytes read per segment
    #[arg(long)]
    pub max_segment_size: Option<u64>,

    /// Override the maximum number of cached lines
    #[arg(long)]
    pub max_cached_lines: Option<usize>,

    /// Path to configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,
}

/// One JSON output record.
#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Record<'a> {
    Info(&'a FileStreamInfo),
    Window { top_line: u64, lines: Vec<&'a str> },
    Match(SearchResult),
    Summary { matches: u64 },
}

/// Keeps the most recent visible text for printing.
#[derive(Clone, Default)]
struct CapturedDisplay {
    latest: Arc<Mutex<String>>,
}

impl DisplaySurface for CapturedDisplay {
    fn set_visible_content(&mut self, text: &str) {
        *self.latest.lock() = text.to_string();
    }
}

/// Reports load failures on stderr and leaves the decision to the exit code.
struct StderrDialog;

impl ErrorDialog for StderrDialog {
    fn present(&mut self, error: &RecoverableError) -> ErrorDecision {
        eprintln!("error: {}", error.message);
        eprintln!("  suggestions: {:?}", error.actions);
        ErrorDecision::Ignore
    }
}

/// Progress on stderr, only when it is a terminal.
struct StderrProgress;

impl ProgressSink for StderrProgress {
    fn report(&self, percent: u8, label: &str) {
        let mut stderr = std::io::stderr().lock();
        let _ = write!(stderr, "\r{label} {percent:>3}%");
        if percent >= 100 {
            let _ = writeln!(stderr);
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    run(args)?;
    Ok(())
}

fn run(args: Args) -> Result<(), AppError> {
    // Defaults → Config File → Env Vars → CLI Args
    let config = {
        let resolved = streamview::config::resolve(args.config.clone())?;
        streamview::config::apply_cli_overrides(
            resolved,
            args.max_segment_size,
            args.max_cached_lines,
        )
    };

    streamview::logging::init(&config.log_file_path)?;
    info!(config = ?config, "Configuration loaded and resolved");

    let info = analyze_file(&args.file, &config.analyzer())?;
    let gate = Arc::new(ReadGate::new(config.max_concurrent_reads));
    let loader: Arc<dyn SegmentSource> =
        Arc::new(SegmentLoader::new(&info, config.loader_limits(), gate));
    let progress: Option<Arc<dyn ProgressSink>> = if std::io::stderr().is_terminal() && !args.json {
        Some(Arc::new(StderrProgress))
    } else {
        None
    };

    let mut out = std::io::stdout().lock();
    if args.json {
        emit_json(&mut out, &Record::Info(&info))?;
    } else {
        writeln!(
            out,
            "{} | {} bytes | {} | {}{} lines{}",
            info.path().display(),
            info.size(),
            info.encoding(),
            if info.requires_streaming() { "streaming | " } else { "" },
            info.estimated_line_count(),
            if info.size() > config.sample_size as u64 { " (estimated)" } else { "" },
        )
        .map_err(AppError::Output)?;
    }

    let display = CapturedDisplay::default();
    let mut controller = VirtualViewportController::new(
        info.clone(),
        Arc::clone(&loader),
        config.viewport(),
        Collaborators {
            display: Box::new(display.clone()),
            error_dialog: Box::new(StderrDialog),
            progress: progress.clone(),
        },
    );

    controller.set_viewport(args.line - 1, args.lines);
    if !controller.wait_idle(LOAD_TIMEOUT) {
        warn!("Viewport load timed out");
        controller.dispose();
        return Err(AppError::Load("timed out waiting for the viewport".to_string()));
    }
    if controller.state() == ControllerState::Error {
        let message = controller
            .last_error()
            .map(|e| e.message.clone())
            .unwrap_or_default();
        controller.dispose();
        return Err(AppError::Load(message));
    }

    let top_line = controller.viewport().top_line;
    let text = display.latest.lock().clone();
    if args.json {
        let lines = if text.is_empty() { Vec::new() } else { text.split('\n').collect() };
        emit_json(&mut out, &Record::Window { top_line, lines })?;
    } else if !text.is_empty() {
        for (i, line) in text.split('\n').enumerate() {
            writeln!(out, "{:>8}  {}", top_line + 1 + i as u64, line).map_err(AppError::Output)?;
        }
    }
    controller.dispose();

    if let Some(term) = args.search.as_deref() {
        let engine = SearchEngine::new(loader, config.search(), progress);
        let mut matches = 0u64;
        for hit in engine.search(term, args.case_sensitive, CancelToken::new()) {
            let hit = hit?;
            matches += 1;
            if args.json {
                emit_json(&mut out, &Record::Match(hit))?;
            } else {
                writeln!(out, "match: line {} at byte {} ({} bytes)", hit.line + 1, hit.position, hit.length)
                    .map_err(AppError::Output)?;
            }
        }
        info!(matches, "Search finished");
        if args.json {
            emit_json(&mut out, &Record::Summary { matches })?;
        } else {
            writeln!(out, "{matches} match(es)").map_err(AppError::Output)?;
        }
    }

    Ok(())
}

fn emit_json(out: &mut impl Write, record: &Record<'_>) -> Result<(), AppError> {
    serde_json::to_writer(&mut *out, record)
        .map_err(|e| AppError::Output(std::io::Error::from(e)))?;
    writeln!(out).map_err(AppError::Output)
}
