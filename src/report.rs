//! Per-job warning and error accounting.
//!
//! Every job (scan, move-all, export) collects its recoverable problems
//! into a [`JobReport`]. The report is returned when the job ends and the
//! session's counters start from zero for the next job.
//!
//! # Example
//!
//! ```
//! use supconv::JobReport;
//!
//! let mut report = JobReport::default();
//! report.warn("Caption 3: end time fixed");
//! assert!(!report.is_clean());
//! assert_eq!(report.warning_count(), 1);
//! ```

use std::fmt::{Display, Formatter, Result as FmtResult};

use crate::timing::TimingIssue;

/// Summary of one job.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobReport {
    /// Informational notices (not problems).
    pub info: Vec<String>,
    /// Recoverable issues: timing fixes, captions that could not be moved.
    pub warnings: Vec<String>,
    /// Captions that failed without aborting the job.
    pub errors: Vec<String>,
}

impl JobReport {
    /// Record a notice.
    pub fn note(&mut self, message: impl Into<String>) {
        self.info.push(message.into());
    }

    /// Record a warning and log it.
    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        log::warn!("{message}");
        self.warnings.push(message);
    }

    /// Record an error and log it.
    pub fn error(&mut self, message: impl Into<String>) {
        let message = message.into();
        log::error!("{message}");
        self.errors.push(message);
    }

    /// Record timing repairs as warnings.
    pub fn extend_timing(&mut self, issues: &[TimingIssue]) {
        for issue in issues {
            self.warn(issue.to_string());
        }
    }

    /// Number of warnings.
    pub fn warning_count(&self) -> usize {
        self.warnings.len()
    }

    /// Number of errors.
    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// `true` if there are neither warnings nor errors.
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty() && self.errors.is_empty()
    }

    /// Move everything out, leaving an empty report behind.
    pub fn take(&mut self) -> JobReport {
        std::mem::take(self)
    }
}

impl Display for JobReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        for item in &self.info {
            writeln!(f, "[INFO] {item}")?;
        }
        for item in &self.warnings {
            writeln!(f, "[WARN] {item}")?;
        }
        for item in &self.errors {
            writeln!(f, "[ERROR] {item}")?;
        }
        write!(
            f,
            "{} warning(s), {} error(s)",
            self.warning_count(),
            self.error_count()
        )
    }
}
