// LogMerge - app/aggregator.rs
//
// Live multi-file merge: owns a fixed set of log file paths, re-reads and
// re-parses all of them on request, and publishes one time-ordered view.
//
// Architecture:
//   - `Aggregator` lives on the consumer's thread. It owns two background
//     threads: the reload worker (`run_worker`) and the change watcher
//     (`app::watcher::run_watcher`).
//   - Reload requests travel over an mpsc channel to the single worker, so at
//     most one reload is ever in flight. Requests that queue up while a
//     reload runs are drained and coalesced into the next run.
//   - The worker swaps the new `Arc<MergedView>` into a shared `RwLock` cell
//     and then posts the update to a single-slot `EventSlot`. A newer update
//     replaces an unread one, so a consumer that only calls `snapshot()`
//     never accumulates stale views. Consumers either drain events each frame
//     (`poll_events`) or block with a timeout (`wait_for_event`).
//   - `shutdown()` (also run on drop) sets the cancel flag, closes the
//     request channel and joins both threads. Nothing is published after it
//     returns.
//
// Error policy: a file that cannot be read never fails the reload. It is
// represented in the merged view by one Error record naming the file.

use crate::app::watcher::{self, ChangeDetector};
use crate::core::merge;
use crate::core::model::{AggregatorEvent, LogRecord, MergedView};
use crate::core::parser::{self, MultilineMode, ParseConfig};
use crate::platform::config::AppConfig;
use crate::platform::fs;
use crate::util::constants;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, RwLock};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

// =============================================================================
// Configuration
// =============================================================================

/// Why a reload was requested. Only used for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadReason {
    /// First load queued by the constructor.
    Initial,
    /// `Aggregator::reload` called by the consumer.
    Manual,
    /// The watcher saw newer modification times on `count` files.
    FilesChanged { count: usize },
}

/// Tunables for one aggregator instance.
#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    /// Delay between modification-time checks.
    pub poll_interval: Duration,
    /// Parser settings applied to every file.
    pub parse: ParseConfig,
    /// Files above this size are memory-mapped when read.
    pub large_file_threshold: u64,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(constants::POLL_INTERVAL_MS),
            parse: ParseConfig::default(),
            large_file_threshold: constants::DEFAULT_LARGE_FILE_THRESHOLD,
        }
    }
}

impl AggregatorConfig {
    /// Build from validated `config.toml` values.
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            parse: ParseConfig {
                multiline: if config.join_multiline {
                    MultilineMode::Join
                } else {
                    MultilineMode::PerLine
                },
                max_record_lines: config.max_record_lines,
                max_message_bytes: config.max_message_bytes,
            },
            large_file_threshold: config.large_file_threshold,
        }
    }
}

// =============================================================================
// Aggregator
// =============================================================================

/// Shared cell holding the current merged view.
type ViewCell = Arc<RwLock<Arc<MergedView>>>;

/// Pending notifications for the consumer: at most one unread update plus
/// the stop marker.
#[derive(Default)]
struct PendingEvents {
    update: Option<Arc<MergedView>>,
    stopped: bool,
    stop_reported: bool,
}

impl PendingEvents {
    /// Next event in delivery order: the latest update, then `Stopped` once.
    fn take(&mut self) -> Option<AggregatorEvent> {
        if let Some(view) = self.update.take() {
            return Some(AggregatorEvent::ViewUpdated { view });
        }
        if self.stopped && !self.stop_reported {
            self.stop_reported = true;
            return Some(AggregatorEvent::Stopped);
        }
        None
    }
}

/// Last-write-wins notification slot shared by the worker and the consumer.
#[derive(Default)]
struct EventSlot {
    pending: Mutex<PendingEvents>,
    ready: Condvar,
}

impl EventSlot {
    fn lock(&self) -> MutexGuard<'_, PendingEvents> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace any unread update with `view`.
    fn post_update(&self, view: Arc<MergedView>) {
        let replaced = self.lock().update.replace(view).is_some();
        if replaced {
            tracing::trace!("Unread view update superseded");
        }
        self.ready.notify_all();
    }

    fn post_stopped(&self) {
        self.lock().stopped = true;
        self.ready.notify_all();
    }

    fn try_take(&self) -> Option<AggregatorEvent> {
        self.lock().take()
    }

    fn wait_take(&self, timeout: Duration) -> Option<AggregatorEvent> {
        let deadline = Instant::now() + timeout;
        let mut pending = self.lock();
        loop {
            if let Some(event) = pending.take() {
                return Some(event);
            }
            let remaining = deadline.checked_duration_since(Instant::now())?;
            pending = self
                .ready
                .wait_timeout(pending, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }
}

/// Owns the tracked files, the published view and the background threads.
pub struct Aggregator {
    /// Tracked files, fixed for the aggregator's lifetime.
    files: Arc<[PathBuf]>,

    /// Most recently published view.
    view: ViewCell,

    /// Request channel to the reload worker. `None` after shutdown.
    reload_tx: Option<mpsc::Sender<ReloadReason>>,

    /// Notifications from the reload worker.
    events: Arc<EventSlot>,

    /// Cancel flag shared with both background threads.
    cancel: Arc<AtomicBool>,

    worker: Option<JoinHandle<()>>,
    watcher: Option<JoinHandle<()>>,

    /// UI preference: scroll to the newest record after each update.
    /// Not interpreted here.
    follow_latest: bool,

    /// Free-text filter for the consumer's own filtering pass.
    /// Not applied here; the published view is always complete.
    filter_text: String,
}

impl Aggregator {
    /// Start aggregating `files` with default settings.
    pub fn new(files: Vec<PathBuf>) -> Self {
        Self::with_config(files, AggregatorConfig::default())
    }

    /// Start aggregating `files`.
    ///
    /// Records modification-time baselines, spawns the reload worker and the
    /// watcher, and queues the initial reload. Returns immediately.
    pub fn with_config(files: Vec<PathBuf>, config: AggregatorConfig) -> Self {
        let files: Arc<[PathBuf]> = Arc::from(files);
        let view: ViewCell = Arc::new(RwLock::new(Arc::new(MergedView {
            file_count: files.len(),
            ..MergedView::default()
        })));
        let cancel = Arc::new(AtomicBool::new(false));

        let (reload_tx, reload_rx) = mpsc::channel();
        let events = Arc::new(EventSlot::default());

        // Baselines are taken before the first read so a write racing the
        // initial load is still seen as a change.
        let mut detector = ChangeDetector::new();
        detector.seed(&files);

        let worker = {
            let files = Arc::clone(&files);
            let view = Arc::clone(&view);
            let cancel = Arc::clone(&cancel);
            let config = config.clone();
            let events = Arc::clone(&events);
            std::thread::spawn(move || {
                run_worker(files, config, reload_rx, view, events, cancel);
            })
        };

        let watcher = {
            let files = Arc::clone(&files);
            let cancel = Arc::clone(&cancel);
            let tx = reload_tx.clone();
            let interval = config.poll_interval;
            std::thread::spawn(move || {
                watcher::run_watcher(files, detector, interval, tx, cancel);
            })
        };

        // The receiver is alive in the worker we just spawned.
        let _ = reload_tx.send(ReloadReason::Initial);

        tracing::info!(
            files = files.len(),
            poll_interval_ms = config.poll_interval.as_millis() as u64,
            "Aggregator started"
        );

        Self {
            files,
            view,
            reload_tx: Some(reload_tx),
            events,
            cancel,
            worker: Some(worker),
            watcher: Some(watcher),
            follow_latest: true,
            filter_text: String::new(),
        }
    }

    /// Queue a reload of every tracked file. Never blocks.
    ///
    /// After `shutdown` this is a no-op.
    pub fn reload(&self) {
        match &self.reload_tx {
            Some(tx) => {
                if tx.send(ReloadReason::Manual).is_err() {
                    tracing::debug!("Reload requested but worker has exited");
                }
            }
            None => tracing::debug!("Reload requested after shutdown; ignored"),
        }
    }

    /// The current merged view: complete, sorted, never partially updated.
    pub fn snapshot(&self) -> Arc<MergedView> {
        read_view(&self.view)
    }

    /// Drain pending events without blocking.
    ///
    /// Holds at most one `ViewUpdated` (the newest unread view) followed by
    /// `Stopped` once the worker has exited.
    pub fn poll_events(&self) -> Vec<AggregatorEvent> {
        std::iter::from_fn(|| self.events.try_take()).collect()
    }

    /// Block for the next event, up to `timeout`.
    pub fn wait_for_event(&self, timeout: Duration) -> Option<AggregatorEvent> {
        self.events.wait_take(timeout)
    }

    /// Block until a view with `generation >= min_generation` is published,
    /// up to `timeout`. Consumes events while waiting.
    pub fn wait_for_generation(
        &self,
        min_generation: u64,
        timeout: Duration,
    ) -> Option<Arc<MergedView>> {
        let deadline = Instant::now() + timeout;
        loop {
            let view = self.snapshot();
            if view.generation >= min_generation {
                return Some(view);
            }
            let remaining = deadline.checked_duration_since(Instant::now())?;
            if let Some(AggregatorEvent::Stopped) = self.events.wait_take(remaining) {
                let view = self.snapshot();
                return (view.generation >= min_generation).then_some(view);
            }
        }
    }

    /// Tracked file paths, in merge tie-break order.
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn follow_latest(&self) -> bool {
        self.follow_latest
    }

    pub fn set_follow_latest(&mut self, follow: bool) {
        self.follow_latest = follow;
    }

    pub fn filter_text(&self) -> &str {
        &self.filter_text
    }

    pub fn set_filter_text(&mut self, text: impl Into<String>) {
        self.filter_text = text.into();
    }

    /// True until `shutdown` has been called.
    pub fn is_running(&self) -> bool {
        self.reload_tx.is_some()
    }

    /// Stop the watcher and the reload worker and wait for both to exit.
    ///
    /// A reload already in progress finishes its read pass but is not
    /// published. Calling this more than once is harmless.
    pub fn shutdown(&mut self) {
        if self.reload_tx.is_none() {
            return;
        }

        self.cancel.store(true, Ordering::SeqCst);
        // Dropping our sender (and the watcher's, once it exits) closes the
        // request channel, which ends the worker loop.
        self.reload_tx = None;

        if let Some(handle) = self.watcher.take() {
            if handle.join().is_err() {
                tracing::error!("Watcher thread panicked");
            }
        }
        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                tracing::error!("Reload worker thread panicked");
            }
        }

        tracing::info!("Aggregator stopped");
    }
}

impl Drop for Aggregator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// =============================================================================
// Reload
// =============================================================================

/// Read, parse and merge every file in `files`. Blocking.
///
/// Files are processed in parallel but merged in listed order, so the
/// listing order remains the tie-break for equal timestamps.
pub fn reload_all(files: &[PathBuf], config: &AggregatorConfig) -> Vec<LogRecord> {
    let per_file: Vec<Vec<LogRecord>> = files
        .par_iter()
        .map(|path| load_file(path, config))
        .collect();
    merge::merge_sources(per_file)
}

/// Records for one file, or a single Error record when it cannot be read.
fn load_file(path: &Path, config: &AggregatorConfig) -> Vec<LogRecord> {
    let label = fs::source_label(path);
    match fs::read_log_file(path, config.large_file_threshold) {
        Ok(content) => parser::parse_content(&content, Some(&label), &config.parse).records,
        Err(e) => {
            tracing::warn!(file = %path.display(), error = %e, "Cannot read tracked file");
            vec![LogRecord::read_failure(&label, &e)]
        }
    }
}

fn read_view(cell: &RwLock<Arc<MergedView>>) -> Arc<MergedView> {
    match cell.read() {
        Ok(guard) => Arc::clone(&guard),
        Err(poisoned) => Arc::clone(&poisoned.into_inner()),
    }
}

fn publish(cell: &RwLock<Arc<MergedView>>, view: Arc<MergedView>) {
    match cell.write() {
        Ok(mut guard) => *guard = view,
        Err(poisoned) => *poisoned.into_inner() = view,
    }
}

/// Reload worker loop. One reload at a time; queued requests coalesce.
fn run_worker(
    files: Arc<[PathBuf]>,
    config: AggregatorConfig,
    requests: mpsc::Receiver<ReloadReason>,
    view: ViewCell,
    events: Arc<EventSlot>,
    cancel: Arc<AtomicBool>,
) {
    let mut generation: u64 = 0;

    while let Ok(reason) = requests.recv() {
        let coalesced = requests.try_iter().count();

        if cancel.load(Ordering::SeqCst) {
            break;
        }

        let started = Instant::now();
        let records = reload_all(&files, &config);

        if cancel.load(Ordering::SeqCst) {
            break;
        }

        generation += 1;
        let merged = Arc::new(MergedView {
            records,
            generation,
            file_count: files.len(),
        });

        tracing::debug!(
            reason = ?reason,
            coalesced,
            generation,
            records = merged.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Reload complete"
        );

        publish(&view, Arc::clone(&merged));
        events.post_update(merged);
    }

    events.post_stopped();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::Severity;

    const WAIT: Duration = Duration::from_secs(10);

    fn cm_line(message: &str, time: &str) -> String {
        format!(
            r#"<![LOG[{message}]LOG]!><time="{time}" date="07-27-2025" component="Test" context="" type="1" thread="1" file="t.cpp">"#
        )
    }

    fn quiet_config() -> AggregatorConfig {
        AggregatorConfig {
            poll_interval: Duration::from_secs(60),
            ..AggregatorConfig::default()
        }
    }

    #[test]
    fn test_reload_all_merges_in_time_order() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.log");
        let b = dir.path().join("b.log");
        std::fs::write(&a, cm_line("A 10:00", "10:00:00.000")).unwrap();
        std::fs::write(
            &b,
            format!("{}\nplain tail line\n", cm_line("B 09:00", "09:00:00.000")),
        )
        .unwrap();

        let records = reload_all(&[a, b], &AggregatorConfig::default());
        let messages: Vec<_> = records.iter().map(|r| r.message.as_str()).collect();
        assert_eq!(messages, vec!["B 09:00", "A 10:00", "plain tail line"]);
        assert_eq!(records[0].source_file.as_deref(), Some("b.log"));
        assert_eq!(records[1].source_file.as_deref(), Some("a.log"));
    }

    #[test]
    fn test_reload_all_reports_missing_file_in_band() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.log");
        std::fs::write(&good, "hello").unwrap();
        let missing = dir.path().join("missing.log");

        let records = reload_all(&[missing, good], &AggregatorConfig::default());
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].severity, Severity::Error);
        assert!(records[0].message.contains("missing.log"));
        assert_eq!(records[0].source_file.as_deref(), Some("missing.log"));
        assert_eq!(records[1].message, "hello");
    }

    #[test]
    fn test_from_app_config() {
        let app = AppConfig {
            poll_interval_ms: 250,
            join_multiline: true,
            max_record_lines: 3,
            ..AppConfig::default()
        };
        let config = AggregatorConfig::from_app_config(&app);
        assert_eq!(config.poll_interval, Duration::from_millis(250));
        assert_eq!(config.parse.multiline, MultilineMode::Join);
        assert_eq!(config.parse.max_record_lines, 3);
    }

    #[test]
    fn test_initial_reload_published() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("one.log");
        std::fs::write(&path, "line one\nline two\n").unwrap();

        let aggregator = Aggregator::with_config(vec![path], quiet_config());
        let view = aggregator
            .wait_for_generation(1, WAIT)
            .expect("initial view should be published");
        assert_eq!(view.generation, 1);
        assert_eq!(view.file_count, 1);
        assert_eq!(view.len(), 2);
    }

    #[test]
    fn test_consumer_preferences_not_applied() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("one.log");
        std::fs::write(&path, "keep me\nand me\n").unwrap();

        let mut aggregator = Aggregator::with_config(vec![path], quiet_config());
        assert!(aggregator.follow_latest());
        aggregator.set_follow_latest(false);
        aggregator.set_filter_text("keep");
        assert!(!aggregator.follow_latest());
        assert_eq!(aggregator.filter_text(), "keep");

        let view = aggregator.wait_for_generation(1, WAIT).unwrap();
        assert_eq!(view.len(), 2, "filter text must not shrink the view");
    }

    /// Spin on `snapshot()` only, never touching the event API.
    fn wait_snapshot(aggregator: &Aggregator, generation: u64) -> Arc<MergedView> {
        let deadline = Instant::now() + WAIT;
        loop {
            let view = aggregator.snapshot();
            if view.generation >= generation {
                return view;
            }
            assert!(
                Instant::now() < deadline,
                "timed out waiting for generation {generation}"
            );
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_snapshot_only_consumer_keeps_one_pending_update() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("busy.log");
        let content: String = (0..200).map(|i| format!("line {i}\n")).collect();
        std::fs::write(&path, content).unwrap();

        let aggregator = Aggregator::with_config(vec![path], quiet_config());
        let mut generation = wait_snapshot(&aggregator, 1).generation;
        for _ in 0..25 {
            aggregator.reload();
            generation = wait_snapshot(&aggregator, generation + 1).generation;
        }
        // The update is posted just after the snapshot swap.
        std::thread::sleep(Duration::from_millis(200));

        let events = aggregator.poll_events();
        assert_eq!(events.len(), 1, "older unread views must be superseded");
        match &events[0] {
            AggregatorEvent::ViewUpdated { view } => {
                assert_eq!(view.generation, generation);
                assert!(Arc::ptr_eq(view, &aggregator.snapshot()));
                assert_eq!(view.len(), 200);
            }
            other => panic!("expected ViewUpdated, got {other:?}"),
        }
        assert!(aggregator.poll_events().is_empty());
    }

    #[test]
    fn test_wait_for_event_reports_stop_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("one.log");
        std::fs::write(&path, "x").unwrap();

        let mut aggregator = Aggregator::with_config(vec![path], quiet_config());
        wait_snapshot(&aggregator, 1);
        aggregator.shutdown();

        let mut saw_stop = false;
        while let Some(event) = aggregator.wait_for_event(Duration::from_millis(100)) {
            if let AggregatorEvent::Stopped = event {
                assert!(!saw_stop, "Stopped delivered twice");
                saw_stop = true;
            }
        }
        assert!(saw_stop);
    }

    #[test]
    fn test_shutdown_is_idempotent_and_stops_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("one.log");
        std::fs::write(&path, "x").unwrap();

        let mut aggregator = Aggregator::with_config(vec![path], quiet_config());
        aggregator.wait_for_generation(1, WAIT).unwrap();

        aggregator.shutdown();
        assert!(!aggregator.is_running());
        aggregator.shutdown();

        let before = aggregator.snapshot().generation;
        aggregator.reload();
        assert!(aggregator.wait_for_generation(before + 1, Duration::from_millis(300)).is_none());
    }
}
