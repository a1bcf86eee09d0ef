//! Async job handles.
//!
//! With the `async` feature, [`JobRunner::spawn_async`] runs a job on
//! tokio's blocking pool and returns an [`AsyncJob`]: a future resolving to
//! the job's result, plus a [`ProgressStream`] of throttled progress
//! updates. Transcoding is CPU-bound, so it never runs on the async worker
//! threads themselves.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use tokio_stream::StreamExt;
//!
//! use supconv::{ConversionSession, ConversionSettings, ConvertError, JobOptions, JobRunner};
//!
//! # async fn example(session: Arc<ConversionSession>) -> Result<(), ConvertError> {
//! let runner = JobRunner::new(session);
//! let settings = ConversionSettings::new();
//! let mut job = runner.spawn_async(move |session, options| session.move_all(&settings, &options))?;
//!
//! let mut progress = job.progress();
//! while let Some(info) = progress.next().await {
//!     println!("{}%", info.percentage);
//! }
//! let report = job.await?;
//! println!("{report}");
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tokio::task::JoinHandle;
use tokio_stream::Stream;

use crate::configuration::JobOptions;
use crate::error::ConvertError;
use crate::job::{JobRunner, panic_message};
use crate::progress::{CancellationToken, ProgressCallback, ProgressInfo};
use crate::session::ConversionSession;

/// Forwards progress into a tokio channel.
struct AsyncProgress {
    sender: UnboundedSender<ProgressInfo>,
}

impl ProgressCallback for AsyncProgress {
    fn on_progress(&self, info: &ProgressInfo) {
        let _ = self.sender.send(info.clone());
    }
}

/// A stream of progress updates from an [`AsyncJob`].
///
/// Ends when the job finishes.
pub struct ProgressStream {
    receiver: UnboundedReceiver<ProgressInfo>,
}

impl Stream for ProgressStream {
    type Item = ProgressInfo;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

/// A job running on tokio's blocking pool.
///
/// Await it for the result. Dropping it does not stop the job; call
/// [`cancel`](AsyncJob::cancel) for that.
pub struct AsyncJob<T> {
    handle: JoinHandle<Result<T, ConvertError>>,
    token: CancellationToken,
    progress: Option<UnboundedReceiver<ProgressInfo>>,
}

impl<T> AsyncJob<T> {
    /// Request cooperative cancellation.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Take the progress stream. Subsequent calls return an empty stream.
    pub fn progress(&mut self) -> ProgressStream {
        let receiver = self.progress.take().unwrap_or_else(|| {
            let (_, receiver) = unbounded_channel();
            receiver
        });
        ProgressStream { receiver }
    }
}

impl<T> Future for AsyncJob<T> {
    type Output = Result<T, ConvertError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.handle).poll(cx).map(|result| {
            result.unwrap_or_else(|e| {
                if e.is_cancelled() {
                    Err(ConvertError::Cancelled)
                } else {
                    let reason = e
                        .try_into_panic()
                        .map_or_else(|_| "unknown failure".to_string(), |p| panic_message(&*p));
                    Err(ConvertError::Unexpected(format!("job worker panicked: {reason}")))
                }
            })
        })
    }
}

impl JobRunner {
    /// Run `work` on tokio's blocking pool.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// [`ConvertError::JobInProgress`] while another job is alive.
    pub fn spawn_async<T, F>(&self, work: F) -> Result<AsyncJob<T>, ConvertError>
    where
        T: Send + 'static,
        F: FnOnce(&ConversionSession, JobOptions) -> Result<T, ConvertError> + Send + 'static,
    {
        let guard = self.acquire()?;
        let token = CancellationToken::new();
        let (sender, receiver) = unbounded_channel();
        let options = JobOptions::new()
            .with_progress(Arc::new(AsyncProgress { sender }))
            .with_cancellation(token.clone());
        let session = self.session_handle();

        let handle = tokio::task::spawn_blocking(move || {
            let _guard = guard;
            work(&session, options)
        });

        Ok(AsyncJob {
            handle,
            token,
            progress: Some(receiver),
        })
    }
}
