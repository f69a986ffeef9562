//! Virtual viewport controller.
//!
//! Owns the viewport, the line cache, and the display. Loads run on worker threads
//! and report back through an inbox channel; nothing a worker computes touches
//! controller state until the owner drains the inbox with
//! [`process_pending`](VirtualViewportController::process_pending) or
//! [`wait_idle`](VirtualViewportController::wait_idle).
//!
//! # State machine
//!
//! ```text
//! Idle/Loaded/Error --request--> Loading --success--> Loaded
//!                                        --failure--> Error
//! any --dispose--> Disposed (terminal)
//! ```
//!
//! Every request bumps a generation counter and cancels the previous load, so only
//! the newest request's result is ever applied.

use std::collections::HashMap;
use std::ops::Range;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use super::collaborators::{
    DisplayEvent, DisplaySurface, ErrorDecision, ErrorDialog, ProgressSink,
};
use super::recovery::{ErrorRecoveryPolicy, RecoverableError, RecoveryError};
use crate::model::{FileStreamInfo, TextSegment, ViewerError, ViewportState};
use crate::source::{CancelToken, SegmentSource};
use crate::view_state::{ViewportCache, DEFAULT_MAX_CACHED_LINES};

/// Default prefetch margin above and below the visible window.
pub const DEFAULT_BUFFER_LINES: u64 = 100;

/// Progress label for viewport loads.
pub const LOADING_LABEL: &str = "Loading…";

/// Viewport tunables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewportConfig {
    /// Lines prefetched above and below the visible window.
    pub buffer_lines: u64,
    /// Upper bound on resident lines.
    pub max_cached_lines: usize,
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            buffer_lines: DEFAULT_BUFFER_LINES,
            max_cached_lines: DEFAULT_MAX_CACHED_LINES,
        }
    }
}

/// Lifecycle of a controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    /// Nothing requested yet.
    Idle,
    /// A load is in flight.
    Loading,
    /// The latest request has been applied.
    Loaded,
    /// The latest load failed.
    Error,
    /// Disposed; every request is ignored.
    Disposed,
}

/// What a viewport request did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    /// Nothing changed, or the controller is disposed.
    Ignored,
    /// Every needed line was cached; the display was updated immediately.
    ServedFromCache,
    /// A background load was started.
    Loading,
}

/// Host-provided collaborators.
pub struct Collaborators {
    /// Receives visible text.
    pub display: Box<dyn DisplaySurface>,
    /// Asked what to do when a load fails.
    pub error_dialog: Box<dyn ErrorDialog>,
    /// Optional load progress.
    pub progress: Option<Arc<dyn ProgressSink>>,
}

/// Byte range requested for one load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LoadRequest {
    start: u64,
    length: u64,
    bytes_per_line: u64,
}

/// Messages delivered to the controller's inbox.
#[derive(Debug)]
pub enum ControllerMessage {
    /// A worker finished a load.
    Loaded {
        /// Generation of the request that started the load.
        generation: u64,
        /// Result after recovery; `Ok(None)` if cancelled.
        result: Result<Option<TextSegment>, RecoveryError>,
    },
    /// The display reported user input.
    Display {
        /// Subscription the event arrived through.
        subscription: u64,
        /// The event.
        event: DisplayEvent,
    },
}

/// A display's handle for sending events to the controller.
///
/// Obtained from [`VirtualViewportController::subscribe_display`]. The controller owns
/// the registration: once it unsubscribes or is disposed, [`emit`](Self::emit)
/// returns `false` and events are dropped.
#[derive(Debug, Clone)]
pub struct DisplaySubscription {
    id: u64,
    active: Arc<AtomicBool>,
    inbox: Sender<ControllerMessage>,
}

impl DisplaySubscription {
    /// Registration id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Whether the controller still accepts events from this subscription.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Queue `event` for the controller. Returns `false` if revoked.
    pub fn emit(&self, event: DisplayEvent) -> bool {
        if !self.is_active() {
            return false;
        }
        self.inbox
            .send(ControllerMessage::Display {
                subscription: self.id,
                event,
            })
            .is_ok()
    }
}

#[derive(Debug)]
struct InFlight {
    generation: u64,
    cancel: CancelToken,
    request: LoadRequest,
}

/// Drives a windowed view over a file of any size.
pub struct VirtualViewportController {
    info: FileStreamInfo,
    source: Arc<dyn SegmentSource>,
    cache: ViewportCache,
    viewport: ViewportState,
    state: ControllerState,
    display: Box<dyn DisplaySurface>,
    error_dialog: Box<dyn ErrorDialog>,
    progress: Option<Arc<dyn ProgressSink>>,
    policy: ErrorRecoveryPolicy,
    inbox_tx: Sender<ControllerMessage>,
    inbox_rx: Receiver<ControllerMessage>,
    generation: u64,
    in_flight: Option<InFlight>,
    subscriptions: HashMap<u64, Arc<AtomicBool>>,
    next_subscription: u64,
    line_count_exact: bool,
    has_loaded: bool,
    last_error: Option<RecoverableError>,
}

impl std::fmt::Debug for VirtualViewportController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VirtualViewportController")
            .field("path", &self.info.path())
            .field("state", &self.state)
            .field("viewport", &self.viewport)
            .field("generation", &self.generation)
            .field("cached_lines", &self.cache.len())
            .finish_non_exhaustive()
    }
}

impl VirtualViewportController {
    /// Create an idle controller for an analyzed file.
    pub fn new(
        info: FileStreamInfo,
        source: Arc<dyn SegmentSource>,
        config: ViewportConfig,
        collaborators: Collaborators,
    ) -> Self {
        let (inbox_tx, inbox_rx) = mpsc::channel();
        let viewport = ViewportState {
            top_line: 0,
            visible_line_count: 0,
            buffer_lines: config.buffer_lines,
            total_lines: info.estimated_line_count(),
        };
        Self {
            line_count_exact: info.size() == 0,
            info,
            source,
            cache: ViewportCache::new(config.max_cached_lines),
            viewport,
            state: ControllerState::Idle,
            display: collaborators.display,
            error_dialog: collaborators.error_dialog,
            progress: collaborators.progress,
            policy: ErrorRecoveryPolicy::new(),
            inbox_tx,
            inbox_rx,
            generation: 0,
            in_flight: None,
            subscriptions: HashMap::new(),
            next_subscription: 0,
            has_loaded: false,
            last_error: None,
        }
    }

    // ===== Accessors =====

    /// Current lifecycle state.
    pub fn state(&self) -> ControllerState {
        self.state
    }

    /// Snapshot of the viewport.
    pub fn viewport(&self) -> ViewportState {
        self.viewport
    }

    /// The file being viewed.
    pub fn info(&self) -> &FileStreamInfo {
        &self.info
    }

    /// Whether `total_lines` is an exact count rather than an estimate.
    pub fn is_line_count_exact(&self) -> bool {
        self.line_count_exact
    }

    /// The error from the most recent failed load, cleared by the next success.
    pub fn last_error(&self) -> Option<&RecoverableError> {
        self.last_error.as_ref()
    }

    /// Number of resident lines.
    pub fn cached_line_count(&self) -> usize {
        self.cache.len()
    }

    /// Cached content of `line`, without affecting eviction order.
    pub fn cached_line(&self, line: u64) -> Option<&str> {
        self.cache.peek(line)
    }

    // ===== Viewport requests =====

    /// Show `visible_line_count` lines starting at `top_line` (clamped).
    pub fn set_viewport(&mut self, top_line: u64, visible_line_count: u64) -> RequestOutcome {
        if self.state == ControllerState::Disposed {
            return RequestOutcome::Ignored;
        }
        self.viewport.visible_line_count = visible_line_count;
        self.request(top_line)
    }

    /// Center `line` (clamped into the document) in the viewport.
    pub fn go_to_line(&mut self, line: u64) -> RequestOutcome {
        if self.state == ControllerState::Disposed {
            return RequestOutcome::Ignored;
        }
        let line = line.min(self.viewport.total_lines.saturating_sub(1));
        let top = line.saturating_sub(self.viewport.visible_line_count / 2);
        info!(line, top, "Go to line");
        self.request(top)
    }

    /// Change the number of visible lines, keeping the top line.
    pub fn resize(&mut self, visible_line_count: u64) -> RequestOutcome {
        if self.state == ControllerState::Disposed {
            return RequestOutcome::Ignored;
        }
        self.viewport.visible_line_count = visible_line_count;
        self.request(self.viewport.top_line)
    }

    /// Scroll by `delta` lines. A scroll that does not move the top line is a no-op.
    pub fn scroll_by(&mut self, delta: i64) -> RequestOutcome {
        let target = if delta < 0 {
            self.viewport.top_line.saturating_sub(delta.unsigned_abs())
        } else {
            self.viewport.top_line.saturating_add(delta as u64)
        };
        self.scroll_to(target)
    }

    /// Scroll so that `line` is at the top (clamped). No-op if it already is.
    pub fn scroll_to(&mut self, line: u64) -> RequestOutcome {
        if self.state == ControllerState::Disposed {
            return RequestOutcome::Ignored;
        }
        let target = self.viewport.clamp_top(line);
        if target == self.viewport.top_line && self.state != ControllerState::Idle {
            return RequestOutcome::Ignored;
        }
        self.request(target)
    }

    /// Apply one display event.
    pub fn handle_display_event(&mut self, event: DisplayEvent) -> RequestOutcome {
        match event {
            DisplayEvent::ScrolledTo(line) => self.scroll_to(line),
            DisplayEvent::Resized(lines) => self.resize(lines),
        }
    }

    // ===== Display subscriptions =====

    /// Register a display event source.
    ///
    /// After [`dispose`](Self::dispose) the returned subscription is already revoked.
    pub fn subscribe_display(&mut self) -> DisplaySubscription {
        let id = self.next_subscription;
        self.next_subscription += 1;
        let active = Arc::new(AtomicBool::new(self.state != ControllerState::Disposed));
        if self.state != ControllerState::Disposed {
            self.subscriptions.insert(id, Arc::clone(&active));
        }
        debug!(subscription = id, "Display subscribed");
        DisplaySubscription {
            id,
            active,
            inbox: self.inbox_tx.clone(),
        }
    }

    /// Revoke a subscription. Returns `false` if it was not registered.
    pub fn unsubscribe(&mut self, subscription: &DisplaySubscription) -> bool {
        match self.subscriptions.remove(&subscription.id) {
            Some(active) => {
                active.store(false, Ordering::Release);
                debug!(subscription = subscription.id, "Display unsubscribed");
                true
            }
            None => false,
        }
    }

    // ===== Inbox =====

    /// Apply every message already in the inbox. Returns how many were applied.
    pub fn process_pending(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(message) = self.inbox_rx.try_recv() {
            self.handle_message(message);
            applied += 1;
        }
        applied
    }

    /// Apply inbox messages until no load is in flight or `timeout` passes.
    ///
    /// Returns `true` if the controller went idle (not `Loading`) in time.
    pub fn wait_idle(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            self.process_pending();
            if self.state != ControllerState::Loading {
                return true;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            match self.inbox_rx.recv_timeout(remaining) {
                Ok(message) => self.handle_message(message),
                Err(RecvTimeoutError::Timeout) => return false,
                Err(RecvTimeoutError::Disconnected) => return self.state != ControllerState::Loading,
            }
        }
    }

    // ===== Errors and teardown =====

    /// Answer a deferred error dialog.
    pub fn resolve_error(&mut self, decision: ErrorDecision) -> RequestOutcome {
        if self.state != ControllerState::Error {
            return RequestOutcome::Ignored;
        }
        match decision {
            ErrorDecision::Retry => {
                info!("Retrying failed viewport load");
                self.request(self.viewport.top_line)
            }
            ErrorDecision::Ignore | ErrorDecision::Deferred => RequestOutcome::Ignored,
        }
    }

    /// Cancel pending work, release the cache, and revoke all subscriptions.
    ///
    /// Every later request is ignored.
    pub fn dispose(&mut self) {
        if self.state == ControllerState::Disposed {
            return;
        }
        self.cancel_in_flight();
        self.cache.clear();
        for (_, active) in self.subscriptions.drain() {
            active.store(false, Ordering::Release);
        }
        self.state = ControllerState::Disposed;
        info!(path = %self.info.path().display(), "Viewport controller disposed");
    }

    // ===== Internals =====

    fn request(&mut self, top_line: u64) -> RequestOutcome {
        self.viewport.top_line = self.viewport.clamp_top(top_line);

        if self.info.size() == 0 {
            self.state = ControllerState::Loaded;
            self.display.set_visible_content("");
            return RequestOutcome::ServedFromCache;
        }

        let window = self.viewport.prefetch_window();
        if self.has_loaded && window.clone().all(|line| self.cache.contains(line)) {
            self.cancel_in_flight();
            self.generation += 1;
            self.state = ControllerState::Loaded;
            self.refresh_display();
            debug!(top = self.viewport.top_line, "Served viewport from cache");
            return RequestOutcome::ServedFromCache;
        }

        self.start_load(window)
    }

    fn start_load(&mut self, window: Range<u64>) -> RequestOutcome {
        self.cancel_in_flight();
        self.generation += 1;
        let generation = self.generation;
        let cancel = CancelToken::new();
        let request = self.byte_range_for(window);

        debug!(
            generation,
            start = request.start,
            length = request.length,
            top = self.viewport.top_line,
            "Starting viewport load"
        );

        let source = Arc::clone(&self.source);
        let progress = self.progress.clone();
        let inbox = self.inbox_tx.clone();
        let policy = self.policy;
        let worker_cancel = cancel.clone();

        let spawned = thread::Builder::new()
            .name("streamview-load".to_string())
            .spawn(move || {
                if let Some(progress) = &progress {
                    progress.report(0, LOADING_LABEL);
                }
                let result = policy.run(
                    || source.load(request.start as i64, request.length, &worker_cancel),
                    || {
                        let length = ErrorRecoveryPolicy::fallback_length(request.length);
                        source.load(request.start as i64, length, &worker_cancel)
                    },
                );
                if let Some(progress) = &progress {
                    progress.report(100, LOADING_LABEL);
                }
                // Receiver gone means the controller was dropped.
                let _ = inbox.send(ControllerMessage::Loaded { generation, result });
            });

        match spawned {
            Ok(_) => {
                self.in_flight = Some(InFlight {
                    generation,
                    cancel,
                    request,
                });
                self.state = ControllerState::Loading;
                RequestOutcome::Loading
            }
            Err(err) => {
                self.fail(RecoveryError::Fatal(ViewerError::Io(err)));
                RequestOutcome::Ignored
            }
        }
    }

    /// Byte range covering the prefetch window, per the current line estimate.
    fn byte_range_for(&self, window: Range<u64>) -> LoadRequest {
        let size = self.info.size();
        let max = self.source.max_segment_size();
        let bytes_per_line = (size / self.viewport.total_lines.max(1)).max(1);

        if !self.info.requires_streaming() && size <= max {
            return LoadRequest {
                start: 0,
                length: size,
                bytes_per_line,
            };
        }

        // One extra line on each side: the first line of a segment that starts
        // mid-file and the last line of one that ends mid-file are both partial.
        let first = window.start.saturating_sub(1);
        let start = first.saturating_mul(bytes_per_line).min(size - 1);
        let end = window
            .end
            .saturating_add(1)
            .saturating_mul(bytes_per_line)
            .min(size);
        LoadRequest {
            start,
            length: end.saturating_sub(start).clamp(1, max),
            bytes_per_line,
        }
    }

    fn cancel_in_flight(&mut self) {
        if let Some(in_flight) = self.in_flight.take() {
            debug!(generation = in_flight.generation, "Cancelling in-flight load");
            in_flight.cancel.cancel();
        }
    }

    fn handle_message(&mut self, message: ControllerMessage) {
        match message {
            ControllerMessage::Loaded { generation, result } => {
                if generation != self.generation || self.state == ControllerState::Disposed {
                    debug!(generation, current = self.generation, "Discarding stale load");
                    return;
                }
                let request = self.in_flight.take().map(|in_flight| in_flight.request);
                match (result, request) {
                    (Ok(Some(segment)), Some(request)) => self.apply_segment(segment, request),
                    (Ok(_), _) => {
                        self.state = if self.has_loaded {
                            ControllerState::Loaded
                        } else {
                            ControllerState::Idle
                        };
                    }
                    (Err(err), _) => self.fail(err),
                }
            }
            ControllerMessage::Display {
                subscription,
                event,
            } => {
                if !self.subscriptions.contains_key(&subscription) {
                    debug!(subscription, "Dropping event from revoked subscription");
                    return;
                }
                self.handle_display_event(event);
            }
        }
    }

    fn apply_segment(&mut self, segment: TextSegment, request: LoadRequest) {
        let encoding = self.source.encoding();
        let file_size = self.info.size();
        let starts_file = segment.start_position <= encoding.bom_len() as u64;
        let reaches_eof = segment.end_position() >= file_size;

        let mut body = segment.content.as_str();
        let mut first_byte = segment.start_position;
        if !starts_file {
            match body.find('\n') {
                Some(nl) => {
                    first_byte = segment.file_offset_of(encoding, nl + 1);
                    body = &body[nl + 1..];
                }
                None => body = "",
            }
        }

        let mut lines: Vec<&str> = body.split('\n').collect();
        if reaches_eof {
            if body.is_empty() || body.ends_with('\n') {
                lines.pop();
            }
        } else {
            lines.pop();
        }

        let first_line = if starts_file {
            0
        } else {
            (first_byte + request.bytes_per_line / 2) / request.bytes_per_line
        };

        if reaches_eof {
            let total = first_line + lines.len() as u64;
            if total != self.viewport.total_lines || starts_file {
                info!(
                    previous = self.viewport.total_lines,
                    total,
                    exact = starts_file,
                    "Updated total line count"
                );
            }
            self.viewport.total_lines = total;
            self.line_count_exact = starts_file;
            self.viewport.top_line = self.viewport.clamp_top(self.viewport.top_line);
        }

        // Keep the whole segment when it fits; otherwise only the prefetch window.
        let wanted = if lines.len() <= self.cache.capacity() {
            first_line..first_line + lines.len() as u64
        } else {
            self.viewport.prefetch_window()
        };
        for (offset, &line) in lines.iter().enumerate() {
            let number = first_line + offset as u64;
            if wanted.contains(&number) {
                self.cache.put(number, line.strip_suffix('\r').unwrap_or(line));
            }
        }

        debug!(
            first_line,
            lines = lines.len(),
            cached = self.cache.len(),
            "Merged segment into cache"
        );

        self.has_loaded = true;
        self.last_error = None;
        self.state = ControllerState::Loaded;
        self.refresh_display();
    }

    fn refresh_display(&mut self) {
        let mut text = String::new();
        for (i, line) in self.viewport.visible_window().enumerate() {
            if i > 0 {
                text.push('\n');
            }
            text.push_str(self.cache.get(line).unwrap_or_default());
        }
        self.display.set_visible_content(&text);
    }

    fn fail(&mut self, err: RecoveryError) {
        if matches!(err.last_error(), ViewerError::Cancelled) {
            debug!("Load cancelled");
            self.state = ControllerState::Idle;
            return;
        }
        let recoverable = err.to_recoverable();
        error!(error = %err, "Viewport load failed");
        self.state = ControllerState::Error;
        self.last_error = Some(recoverable.clone());

        match self.error_dialog.present(&recoverable) {
            ErrorDecision::Retry => {
                info!("Retrying failed viewport load");
                self.request(self.viewport.top_line);
            }
            ErrorDecision::Ignore => warn!("Load error ignored"),
            ErrorDecision::Deferred => debug!("Load error decision deferred"),
        }
    }
}

impl Drop for VirtualViewportController {
    fn drop(&mut self) {
        self.cancel_in_flight();
    }
}

#[cfg(test)]
#[path = "controller_tests.rs"]
mod tests;
