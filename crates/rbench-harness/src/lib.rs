#![forbid(unsafe_code)]
//! Repair-tool benchmark harness.
//!
//! Prepares a pristine artifact plus its recovery files, then runs a fixed
//! number of trials. Each trial copies the baseline into a fresh scratch
//! scope, corrupts the artifact, times candidate A's repair, verifies the
//! result against the baseline fingerprint, corrupts again identically, and
//! does the same for candidate B. Any verification failure aborts the run.
//!
//! The crate is split bottom-up:
//!
//! | Module | Role |
//! |---|---|
//! | [`workspace`] | Scratch scopes removed on every exit path |
//! | [`corrupt`] | Deterministic in-place byte-range overwrite |
//! | [`fingerprint`] | Streaming BLAKE3 / SHA-256 content digests |
//! | [`runner`] | Wall-clock timed external process invocation |
//! | [`baseline`] | Pristine artifact and recovery-file preparation |
//! | [`orchestrator`] | Per-trial state machine and run loop |
//! | [`stats`] | Mean / min / max and speedup reduction |
//! | [`report`] | Console and JSON rendering |
//! | [`config`] | JSON configuration, validation, resolution |

pub mod baseline;
pub mod config;
pub mod corrupt;
pub mod fingerprint;
pub mod orchestrator;
pub mod report;
pub mod runner;
pub mod stats;
pub mod workspace;

pub use baseline::{
    ArtifactSource, BaselineArtifact, BaselinePlan, ExternalRecoveryGenerator, RecoveryGenerator,
};
pub use config::{BenchConfig, ResolvedRun};
pub use corrupt::{CorruptionSpec, corrupt};
pub use fingerprint::{DigestAlgorithm, Fingerprint, fingerprint, verify};
pub use orchestrator::{
    NoopObserver, Orchestrator, TrialObserver, TrialPhase, TrialPlan, TrialResult,
};
pub use report::{ConsoleProgress, ConsoleReport, Palette, RunReport, TrialRow};
pub use runner::{Candidate, CandidateRunner, ProcessRunner};
pub use stats::{CandidateStats, RunSummary, summarize};
pub use workspace::Scope;
