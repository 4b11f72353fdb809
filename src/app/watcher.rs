// LogMerge - app/watcher.rs
//
// Change detection: polls the modification time of every tracked file on a
// fixed interval and asks the aggregator's worker for a full reload when
// any of them moved forward.
//
// Architecture:
//   - `ChangeDetector` owns the per-file baseline map. It is pure apart from
//     the stat calls in `seed`/`poll`, so the detection rules are unit-tested
//     by feeding `observe` directly.
//   - `run_watcher` runs on a dedicated thread owned by `Aggregator`. It sleeps
//     in POLL_CANCEL_CHECK_INTERVAL_MS slices so a shutdown is observed
//     promptly, and it exits when the cancel flag is set or the worker's
//     request channel closes.
//   - Stat failures are not errors: the file is skipped for that tick and its
//     baseline left untouched.

use crate::app::aggregator::ReloadReason;
use crate::platform::fs;
use crate::util::constants::POLL_CANCEL_CHECK_INTERVAL_MS;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::time::{Duration, SystemTime};

// =============================================================================
// ChangeDetector
// =============================================================================

/// Last observed modification time per tracked file.
#[derive(Debug, Default)]
pub struct ChangeDetector {
    baselines: HashMap<PathBuf, SystemTime>,
}

impl ChangeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a baseline for every file that can be stat-ed right now.
    /// Files that cannot are skipped and picked up by a later `poll`.
    pub fn seed(&mut self, paths: &[PathBuf]) {
        for path in paths {
            match fs::modified_time(path) {
                Ok(mtime) => {
                    self.baselines.insert(path.clone(), mtime);
                }
                Err(e) => {
                    tracing::debug!(
                        file = %path.display(),
                        error = %e,
                        "No baseline yet; file not stat-able"
                    );
                }
            }
        }
    }

    /// Apply one stat result for `path`. Returns true when it counts as a
    /// change:
    ///   - no baseline yet: record it, change;
    ///   - strictly newer than the baseline: update it, change;
    ///   - stat failed: skip silently, no change.
    pub fn observe(&mut self, path: &Path, current: io::Result<SystemTime>) -> bool {
        let mtime = match current {
            Ok(mtime) => mtime,
            Err(e) => {
                tracing::trace!(file = %path.display(), error = %e, "Stat failed; skipping this tick");
                return false;
            }
        };

        match self.baselines.get_mut(path) {
            Some(baseline) if mtime > *baseline => {
                *baseline = mtime;
                true
            }
            Some(_) => false,
            None => {
                self.baselines.insert(path.to_path_buf(), mtime);
                true
            }
        }
    }

    /// Stat every tracked file once and return the ones that changed.
    ///
    /// Every file is visited even after the first change so all baselines
    /// advance in the same tick.
    pub fn poll(&mut self, paths: &[PathBuf]) -> Vec<PathBuf> {
        paths
            .iter()
            .filter(|path| self.observe(path, fs::modified_time(path)))
            .cloned()
            .collect()
    }

    /// Current baseline for `path`, if one has been recorded.
    pub fn baseline(&self, path: &Path) -> Option<SystemTime> {
        self.baselines.get(path).copied()
    }

    /// Number of files with a recorded baseline.
    pub fn len(&self) -> usize {
        self.baselines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.baselines.is_empty()
    }
}

// =============================================================================
// Background watcher
// =============================================================================

/// Poll loop. Stats every file each `interval` and sends one reload request
/// per tick in which anything changed.
pub(crate) fn run_watcher(
    paths: Arc<[PathBuf]>,
    mut detector: ChangeDetector,
    interval: Duration,
    reload_tx: mpsc::Sender<ReloadReason>,
    cancel: Arc<AtomicBool>,
) {
    let slice = Duration::from_millis(POLL_CANCEL_CHECK_INTERVAL_MS);

    tracing::debug!(
        files = paths.len(),
        baselines = detector.len(),
        interval_ms = interval.as_millis() as u64,
        "Watcher started"
    );

    loop {
        // Interruptible sleep: check cancel flag between slices.
        let mut remaining = interval;
        while !remaining.is_zero() {
            if cancel.load(Ordering::SeqCst) {
                tracing::debug!("Watcher stopped");
                return;
            }
            let step = remaining.min(slice);
            std::thread::sleep(step);
            remaining -= step;
        }

        if cancel.load(Ordering::SeqCst) {
            tracing::debug!("Watcher stopped");
            return;
        }

        let changed = detector.poll(&paths);
        if changed.is_empty() {
            continue;
        }

        tracing::debug!(
            changed = changed.len(),
            first = %changed[0].display(),
            "Tracked files modified; requesting reload"
        );

        let reason = ReloadReason::FilesChanged {
            count: changed.len(),
        };
        if reload_tx.send(reason).is_err() {
            // Worker gone (aggregator shutting down); exit quietly.
            return;
        }
    }
}
