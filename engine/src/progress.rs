//! Progress accounting: speed smoothing, ETA, and snapshot publication (C5).
//!
//! Grounded on the EMA speed formula (α = 0.3) and 100 ms sampling rate
//! limit from the original tracker; `bytes_transferred_session` only moves
//! forward while `status == Copying`, so re-reading a file for verification
//! never double-counts session progress.

use std::time::Instant;

use crate::capability::DisplaySink;
use crate::model::{Status, TransferProgress};

const EMA_ALPHA: f64 = 0.3;
const MIN_SAMPLE_INTERVAL_MS: u128 = 100;

pub struct ProgressTracker {
    total_files: usize,
    total_bytes: u64,
    file_index: usize,
    current_file_name: String,
    current_file_size: u64,
    bytes_transferred_current: u64,
    bytes_transferred_session: u64,
    status: Status,
    start_time: Instant,
    file_start_time: Instant,
    checksum_start_time: Instant,
    last_sample_time: Instant,
    last_sample_bytes: u64,
    smoothed_speed_bps: f64,
    source_drive_name: String,
}

impl Default for ProgressTracker {
    fn default() -> Self {
        let now = Instant::now();
        ProgressTracker {
            total_files: 0,
            total_bytes: 0,
            file_index: 0,
            current_file_name: String::new(),
            current_file_size: 0,
            bytes_transferred_current: 0,
            bytes_transferred_session: 0,
            status: Status::Ready,
            start_time: now,
            file_start_time: now,
            checksum_start_time: now,
            last_sample_time: now,
            last_sample_bytes: 0,
            smoothed_speed_bps: 0.0,
            source_drive_name: String::new(),
        }
    }
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resets all counters for a new session.
    pub fn start_transfer(&mut self, total_files: usize, total_bytes: u64, sink: &dyn DisplaySink) {
        let now = Instant::now();
        *self = ProgressTracker {
            total_files,
            total_bytes,
            start_time: now,
            file_start_time: now,
            checksum_start_time: now,
            last_sample_time: now,
            status: Status::Ready,
            ..ProgressTracker::default()
        };
        self.publish(sink);
    }

    pub fn set_source_drive(&mut self, name: impl Into<String>) {
        self.source_drive_name = name.into();
    }

    /// Begins tracking a new file; `bytes_so_far` is the session total
    /// already transferred by prior files.
    #[allow(clippy::too_many_arguments)]
    pub fn start_file(
        &mut self,
        file_name: impl Into<String>,
        index: usize,
        total_files: usize,
        file_size: u64,
        total_bytes: u64,
        bytes_so_far: u64,
        sink: &dyn DisplaySink,
    ) {
        let now = Instant::now();
        self.current_file_name = file_name.into();
        self.file_index = index;
        self.total_files = total_files;
        self.current_file_size = file_size;
        self.total_bytes = total_bytes;
        self.bytes_transferred_current = 0;
        self.bytes_transferred_session = bytes_so_far;
        self.file_start_time = now;
        self.last_sample_time = now;
        self.last_sample_bytes = bytes_so_far;
        self.smoothed_speed_bps = 0.0;
        self.status = Status::Copying;
        self.publish(sink);
    }

    /// Marks the start of a checksum pass (resets per-file byte counter so
    /// a verification re-read doesn't appear as continued copy progress).
    pub fn reset_file_bytes(&mut self) {
        self.bytes_transferred_current = 0;
        self.checksum_start_time = Instant::now();
    }

    pub fn set_status(&mut self, status: Status, sink: &dyn DisplaySink) {
        self.status = status;
        self.publish(sink);
    }

    /// Feeds one progress sample from the copier or checksum engine.
    pub fn on_progress(&mut self, bytes_transferred_current: u64, sink: &dyn DisplaySink) {
        let delta = bytes_transferred_current.saturating_sub(self.bytes_transferred_current);
        self.bytes_transferred_current = bytes_transferred_current;
        if self.status == Status::Copying {
            // Stay strictly below total_bytes while still copying: overall_progress
            // must only reach 1.0 once a terminal status is set (complete_file /
            // complete_transfer), never from a live in-flight sample.
            let copying_cap = self.total_bytes.saturating_sub(1).max(self.bytes_transferred_session);
            self.bytes_transferred_session = self
                .bytes_transferred_session
                .saturating_add(delta)
                .min(self.total_bytes.max(self.bytes_transferred_session))
                .min(copying_cap);
        }

        let now = Instant::now();
        let elapsed_ms = now.duration_since(self.last_sample_time).as_millis();
        if elapsed_ms >= MIN_SAMPLE_INTERVAL_MS {
            let elapsed_secs = elapsed_ms as f64 / 1000.0;
            let sample_delta = bytes_transferred_current.saturating_sub(self.last_sample_bytes);
            if elapsed_secs > 0.0 {
                let instantaneous = sample_delta as f64 / elapsed_secs;
                self.smoothed_speed_bps = if self.smoothed_speed_bps == 0.0 {
                    instantaneous
                } else {
                    EMA_ALPHA * instantaneous + (1.0 - EMA_ALPHA) * self.smoothed_speed_bps
                };
            }
            self.last_sample_time = now;
            self.last_sample_bytes = bytes_transferred_current;
        }

        self.publish(sink);
    }

    /// Snaps the per-file counter to the file's full size, masking any
    /// drift from rate-limited sampling.
    pub fn complete_file(&mut self, success: bool, sink: &dyn DisplaySink) {
        self.bytes_transferred_current = self.current_file_size;
        if success && self.status == Status::Copying {
            self.bytes_transferred_session =
                self.bytes_transferred_session.max(self.current_file_size);
        }
        self.publish(sink);
    }

    pub fn complete_transfer(&mut self, success: bool, sink: &dyn DisplaySink) {
        self.bytes_transferred_session = self.total_bytes;
        self.status = if success { Status::Success } else { Status::Error };
        self.publish(sink);
    }

    pub fn mark_stopped(&mut self, sink: &dyn DisplaySink) {
        self.status = Status::Stopped;
        self.publish(sink);
    }

    fn eta_seconds(&self) -> f64 {
        if self.smoothed_speed_bps <= 0.0 {
            return 0.0;
        }
        match self.status {
            Status::Copying => {
                let remaining = self
                    .current_file_size
                    .saturating_sub(self.bytes_transferred_current);
                remaining as f64 / self.smoothed_speed_bps
            }
            _ => {
                let remaining = self
                    .total_bytes
                    .saturating_sub(self.bytes_transferred_session);
                remaining as f64 / self.smoothed_speed_bps
            }
        }
    }

    fn overall_progress(&self) -> f64 {
        if self.total_bytes == 0 {
            if matches!(self.status, Status::Success | Status::Stopped) {
                1.0
            } else {
                0.0
            }
        } else {
            (self.bytes_transferred_session as f64 / self.total_bytes as f64).min(1.0)
        }
    }

    pub fn snapshot(&self) -> TransferProgress {
        let current_file_progress = if self.current_file_size == 0 {
            0.0
        } else {
            (self.bytes_transferred_current as f64 / self.current_file_size as f64).min(1.0)
        };
        TransferProgress {
            current_file_name: self.current_file_name.clone(),
            file_index: self.file_index,
            total_files: self.total_files,
            bytes_transferred_current: self.bytes_transferred_current,
            total_bytes_current: self.current_file_size,
            total_bytes_transferred_session: self.bytes_transferred_session,
            total_bytes_session: self.total_bytes,
            current_file_progress,
            overall_progress: self.overall_progress(),
            status: self.status,
            speed_bytes_per_sec: self.smoothed_speed_bps,
            eta_seconds: self.eta_seconds(),
            total_elapsed_secs: self.start_time.elapsed().as_secs_f64(),
            file_elapsed_secs: self.file_start_time.elapsed().as_secs_f64(),
            checksum_elapsed_secs: self.checksum_start_time.elapsed().as_secs_f64(),
            source_drive_name: self.source_drive_name.clone(),
        }
    }

    fn publish(&self, sink: &dyn DisplaySink) {
        sink.show_progress(&self.snapshot());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        snapshots: Mutex<Vec<TransferProgress>>,
    }

    impl DisplaySink for RecordingSink {
        fn show_status(&self, _message: &str, _line: u32) {}
        fn show_progress(&self, snapshot: &TransferProgress) {
            self.snapshots.lock().unwrap().push(snapshot.clone());
        }
        fn show_error(&self, _message: &str) {}
        fn clear(&self, _preserve_errors: bool) {}
    }

    #[test]
    fn file_index_never_exceeds_total_files() {
        let sink = RecordingSink::default();
        let mut tracker = ProgressTracker::new();
        tracker.start_transfer(2, 2000, &sink);
        tracker.start_file("a", 1, 2, 1000, 2000, 0, &sink);
        tracker.complete_file(true, &sink);
        tracker.start_file("b", 2, 2, 1000, 2000, 1000, &sink);
        tracker.complete_file(true, &sink);
        let snap = tracker.snapshot();
        assert!(snap.file_index <= snap.total_files);
    }

    #[test]
    fn overall_progress_reaches_one_only_on_success_or_stopped() {
        let sink = RecordingSink::default();
        let mut tracker = ProgressTracker::new();
        tracker.start_transfer(1, 1000, &sink);
        tracker.start_file("a", 1, 1, 1000, 1000, 0, &sink);
        tracker.complete_file(true, &sink);
        tracker.complete_transfer(true, &sink);
        let snap = tracker.snapshot();
        assert_eq!(snap.overall_progress, 1.0);
        assert_eq!(snap.status, Status::Success);
    }

    #[test]
    fn session_bytes_only_advance_while_copying() {
        let sink = RecordingSink::default();
        let mut tracker = ProgressTracker::new();
        tracker.start_transfer(1, 1000, &sink);
        tracker.start_file("a", 1, 1, 1000, 1000, 0, &sink);
        tracker.on_progress(500, &sink);
        let mid = tracker.snapshot().total_bytes_transferred_session;
        tracker.set_status(Status::Checksumming, &sink);
        tracker.reset_file_bytes();
        tracker.on_progress(500, &sink);
        let after_checksum = tracker.snapshot().total_bytes_transferred_session;
        assert_eq!(mid, after_checksum);
    }
}
