//! Progress reporting and cancellation support.
//!
//! This module provides [`ProgressCallback`] for monitoring conversion jobs,
//! [`CancellationToken`] for cooperative cancellation, and [`ProgressInfo`]
//! for progress snapshots. Updates are throttled: a callback only hears
//! about a job when its whole-number percentage increases.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use supconv::{JobOptions, ProgressCallback, ProgressInfo};
//!
//! struct PrintProgress;
//!
//! impl ProgressCallback for PrintProgress {
//!     fn on_progress(&self, info: &ProgressInfo) {
//!         println!("[{:?}] {}% complete", info.operation, info.percentage);
//!     }
//! }
//!
//! let options = JobOptions::new().with_progress(Arc::new(PrintProgress));
//! # let _ = options;
//! ```

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
    mpsc::Sender,
};
use std::time::{Duration, Instant};

/// The kind of job currently in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum OperationType {
    /// Scanning or rescanning captions.
    Read,
    /// Transcoding and exporting captions.
    Write,
    /// Repositioning every caption.
    MoveAll,
}

/// A snapshot of job progress.
#[derive(Debug, Clone)]
pub struct ProgressInfo {
    /// What kind of work is being performed.
    pub operation: OperationType,
    /// How many captions have been processed so far.
    pub current: u64,
    /// Total captions in the job.
    pub total: u64,
    /// Whole-number completion percentage (0–100).
    pub percentage: u8,
    /// Wall-clock time elapsed since the job started.
    pub elapsed: Duration,
    /// Remaining time extrapolated from the captions done so far.
    pub estimated_remaining: Option<Duration>,
    /// Index of the caption just processed.
    pub current_frame: Option<usize>,
}

/// Trait for receiving progress updates.
///
/// Implementations must be [`Send`] and [`Sync`] because jobs run on a
/// worker thread.
///
/// Progress callbacks are **infallible**: they observe but cannot halt the
/// job. Use [`CancellationToken`] for cooperative cancellation.
pub trait ProgressCallback: Send + Sync {
    /// Called whenever the integer percentage increases.
    fn on_progress(&self, info: &ProgressInfo);
}

/// Used by [`JobOptions::new`](crate::JobOptions::new) when nobody listens.
pub(crate) struct NoOpProgress;

impl ProgressCallback for NoOpProgress {
    fn on_progress(&self, _info: &ProgressInfo) {}
}

/// Forwards every update into a channel, so the thread that owns the
/// display can drain it.
pub struct ChannelProgress {
    sender: Sender<ProgressInfo>,
}

impl ChannelProgress {
    /// Wrap the sending half of a channel.
    pub fn new(sender: Sender<ProgressInfo>) -> Self {
        Self { sender }
    }
}

impl ProgressCallback for ChannelProgress {
    fn on_progress(&self, info: &ProgressInfo) {
        // A dropped receiver only means nobody is watching any more.
        let _ = self.sender.send(info.clone());
    }
}

/// Shared stop flag for a running job.
///
/// Clones observe the same flag. Jobs check it before every caption and
/// stop with [`ConvertError::Cancelled`](crate::ConvertError::Cancelled).
///
/// # Example
///
/// ```
/// use supconv::CancellationToken;
///
/// let token = CancellationToken::new();
/// assert!(!token.is_cancelled());
///
/// token.cancel();
/// assert!(token.is_cancelled());
/// ```
#[derive(Debug, Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// A token that has not been cancelled.
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Ask the job to stop at the next caption.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Whether [`cancel`](Self::cancel) was called on this token or a clone.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Counts captions and calls back on whole-percent steps.
pub(crate) struct ProgressTracker {
    callback: Arc<dyn ProgressCallback>,
    operation: OperationType,
    total: u64,
    current: u64,
    start_time: Instant,
    last_percentage: Option<u8>,
}

impl ProgressTracker {
    pub(crate) fn new(callback: Arc<dyn ProgressCallback>, operation: OperationType, total: u64) -> Self {
        Self {
            callback,
            operation,
            total,
            current: 0,
            start_time: Instant::now(),
            last_percentage: None,
        }
    }

    /// Record one processed caption.
    pub(crate) fn advance(&mut self, frame: usize) {
        self.current += 1;
        let percentage = self.percentage();
        if self.last_percentage.is_none_or(|last| percentage > last) {
            self.last_percentage = Some(percentage);
            self.report(Some(frame), percentage);
        }
    }

    /// Emit a final 100% report unless one was already sent.
    pub(crate) fn finish(&mut self) {
        if self.last_percentage != Some(100) {
            self.current = self.total;
            self.last_percentage = Some(100);
            self.report(None, 100);
        }
    }

    fn percentage(&self) -> u8 {
        if self.total == 0 {
            100
        } else {
            (self.current.min(self.total) * 100 / self.total) as u8
        }
    }

    fn report(&self, frame: Option<usize>, percentage: u8) {
        let elapsed = self.start_time.elapsed();
        let estimated_remaining = (self.current > 0).then(|| {
            let remaining = self.total.saturating_sub(self.current);
            elapsed.mul_f64(remaining as f64 / self.current as f64)
        });

        self.callback.on_progress(&ProgressInfo {
            operation: self.operation,
            current: self.current,
            total: self.total,
            percentage,
            elapsed,
            estimated_remaining,
            current_frame: frame,
        });
    }
}
