//! Reduction of per-trial timings into the run summary.

use std::time::Duration;

use rbench_error::{BenchError, Result};
use serde::{Deserialize, Serialize};

use crate::orchestrator::TrialResult;

/// Mean, minimum and maximum duration of one candidate, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CandidateStats {
    pub mean_secs: f64,
    pub min_secs: f64,
    pub max_secs: f64,
}

impl CandidateStats {
    /// Summarize a non-empty set of durations.
    pub fn from_durations(durations: &[Duration]) -> Result<Self> {
        let Some(first) = durations.first() else {
            return Err(BenchError::EmptyInput);
        };
        let first = first.as_secs_f64();
        let (sum, min, max) = durations[1..].iter().map(Duration::as_secs_f64).fold(
            (first, first, first),
            |(sum, min, max), secs| (sum + secs, min.min(secs), max.max(secs)),
        );
        #[allow(clippy::cast_precision_loss)]
        let mean = sum / durations.len() as f64;
        Ok(Self {
            mean_secs: mean,
            min_secs: min,
            max_secs: max,
        })
    }
}

/// Aggregate of a whole run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub trials: usize,
    pub a: CandidateStats,
    pub b: CandidateStats,
    /// `mean(A) / mean(B)`; absent when candidate B averaged zero seconds.
    pub speedup: Option<f64>,
}

/// Reduce the ordered trial results of a run.
///
/// Fails with [`BenchError::EmptyInput`] rather than reporting on zero trials.
pub fn summarize(results: &[TrialResult]) -> Result<RunSummary> {
    if results.is_empty() {
        return Err(BenchError::EmptyInput);
    }
    let a: Vec<Duration> = results.iter().map(|r| r.duration_a).collect();
    let b: Vec<Duration> = results.iter().map(|r| r.duration_b).collect();
    let a = CandidateStats::from_durations(&a)?;
    let b = CandidateStats::from_durations(&b)?;
    let speedup = (b.mean_secs > 0.0).then(|| a.mean_secs / b.mean_secs);

    Ok(RunSummary {
        trials: results.len(),
        a,
        b,
        speedup,
    })
}
