#![forbid(unsafe_code)]
//! Error types for rbench.
//!
//! # Error Taxonomy
//!
//! Every failure in a benchmark run is fatal. A comparative timing experiment
//! that silently drops a trial biases its own averages, so nothing here is
//! retried and nothing is swallowed.
//!
//! | Class | Variants | Exit code |
//! |-------|----------|-----------|
//! | Resource | `Resource`, `Copy` | 1 |
//! | I/O | `Io`, `CorruptionOutOfBounds` | 1 |
//! | Integrity | `VerificationMismatch`, `CorruptionDrift`, `CandidateTimeout` | 2 |
//! | Collaborator | `CandidateLaunch`, `RecoveryGeneration` | 1 |
//! | Programmer | `EmptyInput`, `Config` | 1 |
//!
//! Integrity failures get their own exit code so that CI can tell "the
//! candidate produced the wrong bytes" apart from "the harness could not run".
//!
//! ## Design Constraints
//!
//! - `rbench-error` has no dependency on the harness; the harness and the CLI
//!   both depend on it.
//! - All payloads are owned so errors can be carried into reports and logs
//!   after the workspace that produced them is gone.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Process exit status for a run that completed and verified every trial.
pub const EXIT_SUCCESS: i32 = 0;
/// Process exit status for any fatal harness error.
pub const EXIT_FAILURE: i32 = 1;
/// Process exit status when a candidate failed an integrity check.
pub const EXIT_INTEGRITY: i32 = 2;

/// Unified error type for all rbench operations.
#[derive(Debug, Error)]
pub enum BenchError {
    /// A workspace scope could not be allocated or removed.
    #[error("workspace error: {detail}")]
    Resource {
        detail: String,
        #[source]
        source: std::io::Error,
    },

    /// A file could not be copied into a workspace scope.
    #[error("failed to copy {} to {}", from.display(), to.display())]
    Copy {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Reading, writing, or hashing a file failed.
    #[error("I/O error during {op} on {}", path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The corruption range does not fit inside the working copy.
    #[error(
        "corruption range offset={offset} length={length} exceeds {} ({file_len} bytes)",
        path.display()
    )]
    CorruptionOutOfBounds {
        path: PathBuf,
        offset: u64,
        length: u64,
        file_len: u64,
    },

    /// A candidate left content that does not match the baseline fingerprint.
    #[error(
        "trial {trial}: {candidate} did not restore the original content \
         (expected {expected}, found {actual})"
    )]
    VerificationMismatch {
        trial: u32,
        candidate: String,
        expected: String,
        actual: String,
    },

    /// The second corruption of a trial did not reproduce the first one.
    #[error("trial {trial}: corrupted inputs differ between candidates ({first} != {second})")]
    CorruptionDrift {
        trial: u32,
        first: String,
        second: String,
    },

    /// A candidate process was still running when its deadline passed.
    #[error("{candidate} did not exit within {}ms and was killed", timeout.as_millis())]
    CandidateTimeout { candidate: String, timeout: Duration },

    /// A candidate process could not be started at all.
    #[error("failed to launch {candidate} ({program})")]
    CandidateLaunch {
        candidate: String,
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The external recovery-set generator failed.
    #[error("recovery-set generation failed: {0}")]
    RecoveryGeneration(String),

    /// Statistics were requested over zero trials.
    #[error("cannot summarize an empty trial sequence")]
    EmptyInput,

    /// The run configuration is invalid.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl BenchError {
    /// Wrap an I/O error with the operation and path it concerns.
    #[must_use]
    pub fn io(op: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            op,
            path: path.into(),
            source,
        }
    }

    /// Wrap a workspace allocation or cleanup failure.
    #[must_use]
    pub fn resource(detail: impl Into<String>, source: std::io::Error) -> Self {
        Self::Resource {
            detail: detail.into(),
            source,
        }
    }

    /// Whether this error means a candidate failed the correctness guard.
    #[must_use]
    pub const fn is_integrity_failure(&self) -> bool {
        matches!(
            self,
            Self::VerificationMismatch { .. }
                | Self::CorruptionDrift { .. }
                | Self::CandidateTimeout { .. }
        )
    }

    /// Map this error to the process exit status.
    ///
    /// The mapping is exhaustive, so a new variant does not compile until it
    /// is assigned a status.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::VerificationMismatch { .. }
            | Self::CorruptionDrift { .. }
            | Self::CandidateTimeout { .. } => EXIT_INTEGRITY,
            Self::Resource { .. }
            | Self::Copy { .. }
            | Self::Io { .. }
            | Self::CorruptionOutOfBounds { .. }
            | Self::CandidateLaunch { .. }
            | Self::RecoveryGeneration(_)
            | Self::EmptyInput
            | Self::Config(_) => EXIT_FAILURE,
        }
    }
}

/// Result alias using `BenchError`.
pub type Result<T> = std::result::Result<T, BenchError>;
