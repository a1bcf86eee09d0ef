//! Error types for the `supconv` crate.
//!
//! This module defines [`ConvertError`], the unified error type returned by
//! every fallible engine operation. Recoverable timing problems never show
//! up here; they are repaired in place and counted as warnings in the
//! [`JobReport`](crate::JobReport).

use std::{io::Error as IoError, path::PathBuf};

use image::ImageError;
use thiserror::Error;

/// The unified error type for all `supconv` operations.
///
/// Every public entry point returns `Result<T, ConvertError>`. Only the
/// outermost process boundary (the CLI) decides whether a failure ends the
/// program.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConvertError {
    /// A source caption could not be decoded.
    #[error("Failed to decode caption {index}: {reason}")]
    Decode {
        /// Zero-based caption index.
        index: usize,
        /// Human-readable reason reported by the stream.
        reason: String,
    },

    /// The requested caption index exceeds the number of loaded captions.
    #[error("Caption {index} is out of range (stream has {frame_count} captions)")]
    FrameOutOfRange {
        /// The index that was requested.
        index: usize,
        /// Number of captions in the stream.
        frame_count: usize,
    },

    /// An operation needed captions but none were loaded or scanned.
    #[error("No captions loaded")]
    NoFramesLoaded,

    /// The settings snapshot cannot be applied.
    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    /// An image-sequence manifest could not be interpreted.
    #[error("Invalid manifest at {path}: {reason}")]
    Manifest {
        /// Path of the manifest file.
        path: PathBuf,
        /// What was wrong with it.
        reason: String,
    },

    /// An I/O error occurred while reading or writing files.
    #[error("I/O error: {0}")]
    IoError(#[from] IoError),

    /// An error from the `image` crate while encoding or decoding PNG data.
    #[error("Image processing error: {0}")]
    ImageError(#[from] ImageError),

    /// A manifest was not valid JSON.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// The operation was cancelled via a [`CancellationToken`](crate::CancellationToken).
    #[error("Operation cancelled")]
    Cancelled,

    /// A batch job is already running on this runner.
    #[error("Another job is already running")]
    JobInProgress,

    /// Anything else: a panicked worker, a poisoned lock.
    #[error("Unexpected failure: {0}")]
    Unexpected(String),
}

impl ConvertError {
    /// Returns `true` for user cancellation, which callers usually report
    /// differently from failures.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, ConvertError::Cancelled)
    }
}

impl<T> From<std::sync::PoisonError<T>> for ConvertError {
    fn from(error: std::sync::PoisonError<T>) -> Self {
        ConvertError::Unexpected(format!("session lock poisoned: {error}"))
    }
}
