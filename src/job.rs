//! Background jobs.
//!
//! A [`JobRunner`] runs one long pass (scan, move-all, export) at a time on
//! a worker thread. The returned [`BatchJob`] handle lets the initiating
//! thread cancel the job, drain throttled progress updates and wait for
//! the result without busy-waiting.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use supconv::{BdnXmlExporter, ConversionSession, ConversionSettings, JobRunner};
//!
//! # fn run(session: Arc<ConversionSession>) -> Result<(), supconv::ConvertError> {
//! let runner = JobRunner::new(session);
//! let settings = ConversionSettings::new();
//! let job = runner.export(Box::new(BdnXmlExporter::new("out", "movie")), settings)?;
//! while job.is_alive() {
//!     if let Some(info) = job.poll_progress() {
//!         println!("{}%", info.percentage);
//!     }
//!     std::thread::sleep(std::time::Duration::from_millis(50));
//! }
//! let report = job.wait()?;
//! println!("{report}");
//! # Ok(())
//! # }
//! ```

use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crate::configuration::{ConversionSettings, JobOptions};
use crate::error::ConvertError;
use crate::export::Exporter;
use crate::progress::{CancellationToken, ChannelProgress, ProgressInfo};
use crate::report::JobReport;
use crate::session::ConversionSession;

/// Lifecycle of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    /// Created but not running (or finished with an error).
    Inactive,
    /// Running on the worker.
    Active,
    /// Cancellation was requested.
    Canceled,
    /// Completed successfully.
    Finished,
}

/// Releases the runner's busy flag when the worker exits, even by panic.
pub(crate) struct BusyGuard(Arc<AtomicBool>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Starts jobs on a session, one at a time.
#[derive(Clone)]
pub struct JobRunner {
    session: Arc<ConversionSession>,
    busy: Arc<AtomicBool>,
}

impl JobRunner {
    /// A runner for `session`.
    pub fn new(session: Arc<ConversionSession>) -> Self {
        Self {
            session,
            busy: Arc::new(AtomicBool::new(false)),
        }
    }

    /// The session jobs run on.
    pub fn session(&self) -> &Arc<ConversionSession> {
        &self.session
    }

    /// Whether a job is currently running.
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Scan (or rescan, if already scanned) in the background, reporting
    /// [`OperationType::Read`](crate::OperationType::Read) progress.
    pub fn scan(&self, settings: ConversionSettings) -> Result<BatchJob<JobReport>, ConvertError> {
        self.spawn(move |session, options| session.rescan_with_options(&settings, &options))
    }

    /// Reposition every caption in the background.
    pub fn move_all(&self, settings: ConversionSettings) -> Result<BatchJob<JobReport>, ConvertError> {
        self.spawn(move |session, options| session.move_all(&settings, &options))
    }

    /// Export through `exporter` in the background.
    pub fn export(
        &self,
        mut exporter: Box<dyn Exporter>,
        settings: ConversionSettings,
    ) -> Result<BatchJob<JobReport>, ConvertError> {
        self.spawn(move |session, options| session.export(exporter.as_mut(), &settings, &options))
    }

    /// Run `work` on a worker thread.
    ///
    /// # Errors
    ///
    /// [`ConvertError::JobInProgress`] while another job is alive,
    /// [`ConvertError::IoError`] if the thread cannot be spawned.
    pub fn spawn<T, F>(&self, work: F) -> Result<BatchJob<T>, ConvertError>
    where
        T: Send + 'static,
        F: FnOnce(&ConversionSession, JobOptions) -> Result<T, ConvertError> + Send + 'static,
    {
        let guard = self.acquire()?;
        let token = CancellationToken::new();
        let (sender, progress) = mpsc::channel();
        let options = JobOptions::new()
            .with_progress(Arc::new(ChannelProgress::new(sender)))
            .with_cancellation(token.clone());
        let state = Arc::new(Mutex::new(JobState::Active));

        let session = Arc::clone(&self.session);
        let worker_state = Arc::clone(&state);
        let handle = thread::Builder::new()
            .name("supconv-job".to_string())
            .spawn(move || {
                let _guard = guard;
                let result = work(&session, options);
                if let Ok(mut state) = worker_state.lock() {
                    *state = match (&result, *state) {
                        (Ok(_), _) => JobState::Finished,
                        (Err(_), JobState::Canceled) => JobState::Canceled,
                        (Err(_), _) => JobState::Inactive,
                    };
                }
                result
            })?;

        Ok(BatchJob {
            handle,
            token,
            progress,
            state,
        })
    }

    #[cfg(feature = "async")]
    pub(crate) fn session_handle(&self) -> Arc<ConversionSession> {
        Arc::clone(&self.session)
    }

    pub(crate) fn acquire(&self) -> Result<BusyGuard, ConvertError> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(ConvertError::JobInProgress);
        }
        Ok(BusyGuard(Arc::clone(&self.busy)))
    }
}

/// Handle to a running job.
pub struct BatchJob<T> {
    handle: JoinHandle<Result<T, ConvertError>>,
    token: CancellationToken,
    progress: Receiver<ProgressInfo>,
    state: Arc<Mutex<JobState>>,
}

impl<T> BatchJob<T> {
    /// Request cooperative cancellation; the job stops before its next
    /// caption and returns [`ConvertError::Cancelled`].
    pub fn cancel(&self) {
        self.token.cancel();
        if let Ok(mut state) = self.state.lock() {
            if *state == JobState::Active {
                *state = JobState::Canceled;
            }
        }
    }

    /// The most recent progress update since the last poll, if any.
    pub fn poll_progress(&self) -> Option<ProgressInfo> {
        self.progress.try_iter().last()
    }

    /// Whether the worker is still running.
    pub fn is_alive(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> JobState {
        self.state.lock().map_or(JobState::Inactive, |s| *s)
    }

    /// Block until the job ends and return its result.
    ///
    /// # Errors
    ///
    /// The job's own error, or [`ConvertError::Unexpected`] if the worker
    /// panicked.
    pub fn wait(self) -> Result<T, ConvertError> {
        self.handle
            .join()
            .map_err(|panic| ConvertError::Unexpected(format!("job worker panicked: {}", panic_message(&*panic))))?
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
