//! Trial sequencing.
//!
//! One trial walks a fixed state machine:
//!
//! ```text
//! Init -> CorruptedForA -> RanA -> VerifiedA -> CorruptedForB -> RanB -> VerifiedB -> Recorded
//!                                      \                                    \
//!                                       +-------------> Aborted <-----------+
//! ```
//!
//! Any error (most importantly a fingerprint mismatch) moves the orchestrator
//! to `Aborted` and ends the whole run: no later trial is started and no
//! candidate is invoked again. Trials run strictly one after another; the two
//! invocations within a trial never overlap, so neither candidate competes
//! with the other for CPU or I/O.

use std::path::{Path, PathBuf};
use std::time::Duration;

use rbench_error::{BenchError, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::baseline::BaselineArtifact;
use crate::corrupt::{CorruptionSpec, corrupt};
use crate::fingerprint::{Fingerprint, fingerprint, verify};
use crate::runner::{Candidate, CandidateRunner};
use crate::stats::{RunSummary, summarize};
use crate::workspace::Scope;

/// Measurements from one completed trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialResult {
    /// 1-based trial number.
    pub index: u32,
    pub duration_a: Duration,
    pub duration_b: Duration,
    /// Both candidates restored the baseline fingerprint.
    pub verified: bool,
}

/// Position of the orchestrator inside the current trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrialPhase {
    Init,
    CorruptedForA,
    RanA,
    VerifiedA,
    CorruptedForB,
    RanB,
    VerifiedB,
    Recorded,
    Aborted,
}

/// Run-level parameters, fixed for every trial.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrialPlan {
    pub iterations: u32,
    pub corruption: CorruptionSpec,
    /// Fingerprint both corrupted inputs and require them to match.
    pub check_corruption: bool,
    /// Parent directory for trial scopes; system temp dir when `None`.
    pub scratch_dir: Option<PathBuf>,
}

/// Receives progress as the run advances.
pub trait TrialObserver {
    fn trial_started(&mut self, _index: u32, _total: u32) {}

    /// Called once per trial, right after its result is appended.
    fn trial_recorded(&mut self, result: &TrialResult);
}

/// Observer that ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl TrialObserver for NoopObserver {
    fn trial_recorded(&mut self, _result: &TrialResult) {}
}

/// Drives the trials of one run against a prepared baseline.
pub struct Orchestrator<'a, R> {
    baseline: &'a BaselineArtifact,
    candidate_a: Candidate,
    candidate_b: Candidate,
    runner: R,
    plan: TrialPlan,
    results: Vec<TrialResult>,
    phase: TrialPhase,
}

impl<'a, R: CandidateRunner> Orchestrator<'a, R> {
    #[must_use]
    pub fn new(
        baseline: &'a BaselineArtifact,
        candidate_a: Candidate,
        candidate_b: Candidate,
        runner: R,
        plan: TrialPlan,
    ) -> Self {
        let capacity = usize::try_from(plan.iterations).unwrap_or(0);
        Self {
            baseline,
            candidate_a,
            candidate_b,
            runner,
            plan,
            results: Vec::with_capacity(capacity),
            phase: TrialPhase::Init,
        }
    }

    /// Execute every trial in order, then summarize.
    ///
    /// Returns the first error unchanged; [`Self::results`] still holds the
    /// trials that completed before it.
    pub fn run(&mut self, observer: &mut dyn TrialObserver) -> Result<RunSummary> {
        let total = self.plan.iterations;
        info!(
            target: "rbench::orchestrator",
            trials = total,
            candidate_a = %self.candidate_a.label,
            candidate_b = %self.candidate_b.label,
            "run start"
        );

        for index in 1..=total {
            observer.trial_started(index, total);
            let result = self.run_trial(index)?;
            self.results.push(result);
            observer.trial_recorded(&result);
        }

        let summary = summarize(&self.results)?;
        info!(
            target: "rbench::orchestrator",
            trials = summary.trials,
            mean_a_secs = summary.a.mean_secs,
            mean_b_secs = summary.b.mean_secs,
            speedup = ?summary.speedup,
            "run complete"
        );
        Ok(summary)
    }

    /// Execute a single trial without appending its result.
    pub fn run_trial(&mut self, index: u32) -> Result<TrialResult> {
        // The caller owns user-facing reporting of the error.
        self.execute_trial(index).inspect_err(|err| {
            debug!(
                target: "rbench::orchestrator",
                trial = index,
                phase = ?self.phase,
                error = %err,
                "trial aborted"
            );
            self.phase = TrialPhase::Aborted;
        })
    }

    fn execute_trial(&mut self, index: u32) -> Result<TrialResult> {
        self.phase = TrialPhase::Init;
        let scope = Scope::create(self.plan.scratch_dir.as_deref(), "rbench-trial-")?;
        scope.copy_into(&self.baseline.trial_inputs())?;
        let working = scope.join(self.baseline.artifact_name());
        let expected = self.baseline.fingerprint();

        corrupt(&working, &self.plan.corruption)?;
        let first_corruption = if self.plan.check_corruption {
            Some(fingerprint(&working, expected.algorithm)?)
        } else {
            None
        };
        self.advance(index, TrialPhase::CorruptedForA);

        let duration_a = self.runner.run(&self.candidate_a, scope.path())?;
        self.advance(index, TrialPhase::RanA);
        verify_repair(index, &self.candidate_a, &working, expected)?;
        self.advance(index, TrialPhase::VerifiedA);

        corrupt(&working, &self.plan.corruption)?;
        if let Some(first) = first_corruption {
            let second = fingerprint(&working, expected.algorithm)?;
            if second != first {
                return Err(BenchError::CorruptionDrift {
                    trial: index,
                    first: first.hex,
                    second: second.hex,
                });
            }
        }
        self.advance(index, TrialPhase::CorruptedForB);

        let duration_b = self.runner.run(&self.candidate_b, scope.path())?;
        self.advance(index, TrialPhase::RanB);
        verify_repair(index, &self.candidate_b, &working, expected)?;
        self.advance(index, TrialPhase::VerifiedB);

        scope.release()?;
        let result = TrialResult {
            index,
            duration_a,
            duration_b,
            verified: true,
        };
        self.advance(index, TrialPhase::Recorded);
        info!(
            target: "rbench::orchestrator",
            trial = index,
            a_secs = duration_a.as_secs_f64(),
            b_secs = duration_b.as_secs_f64(),
            "trial recorded"
        );
        Ok(result)
    }

    fn advance(&mut self, index: u32, phase: TrialPhase) {
        debug!(target: "rbench::orchestrator", trial = index, ?phase, "phase");
        self.phase = phase;
    }

    /// Results of every trial completed so far, in order.
    #[must_use]
    pub fn results(&self) -> &[TrialResult] {
        &self.results
    }

    #[must_use]
    pub fn into_results(self) -> Vec<TrialResult> {
        self.results
    }

    #[must_use]
    pub const fn phase(&self) -> TrialPhase {
        self.phase
    }

    #[must_use]
    pub const fn runner(&self) -> &R {
        &self.runner
    }
}

fn verify_repair(
    trial: u32,
    candidate: &Candidate,
    working: &Path,
    expected: &Fingerprint,
) -> Result<()> {
    if verify(working, expected)? {
        return Ok(());
    }
    let actual = fingerprint(working, expected.algorithm)?;
    Err(BenchError::VerificationMismatch {
        trial,
        candidate: candidate.label.clone(),
        expected: expected.hex.clone(),
        actual: actual.hex,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::baseline::{ArtifactSource, BaselinePlan, RecoveryGenerator};
    use crate::fingerprint::DigestAlgorithm;
    use std::fs;

    struct IndexOnly;

    impl RecoveryGenerator for IndexOnly {
        fn generate(&mut self, _artifact: &Path, recovery_index: &Path) -> Result<()> {
            fs::write(recovery_index, b"idx").map_err(|e| BenchError::io("w", recovery_index, e))
        }
    }

    /// Restores the artifact from the baseline copy, or leaves it alone.
    struct CopyBack {
        pristine: PathBuf,
        artifact_name: String,
        fail_slot_b: bool,
        calls: Vec<String>,
    }

    impl CandidateRunner for CopyBack {
        fn run(&mut self, candidate: &Candidate, workdir: &Path) -> Result<Duration> {
            self.calls.push(candidate.label.clone());
            let broken = self.fail_slot_b && candidate.label == "b";
            if !broken {
                let dest = workdir.join(&self.artifact_name);
                fs::copy(&self.pristine, &dest).map_err(|e| BenchError::io("cp", &dest, e))?;
            }
            Ok(Duration::from_millis(if candidate.label == "a" { 20 } else { 5 }))
        }
    }

    fn baseline() -> BaselineArtifact {
        BaselineArtifact::prepare(
            &BaselinePlan {
                source: ArtifactSource::Generate {
                    size_bytes: 8192,
                    seed: 42,
                },
                artifact_name: "artifact.bin".to_owned(),
                recovery_name: "artifact.bin.par2".to_owned(),
                digest: DigestAlgorithm::Blake3,
                scratch_dir: None,
            },
            &mut IndexOnly,
        )
        .expect("baseline")
    }

    fn plan(iterations: u32) -> TrialPlan {
        TrialPlan {
            iterations,
            corruption: CorruptionSpec::new(4096, 1024, 0x00),
            check_corruption: true,
            scratch_dir: None,
        }
    }

    fn runner(baseline: &BaselineArtifact, fail_slot_b: bool) -> CopyBack {
        CopyBack {
            pristine: baseline.artifact().to_path_buf(),
            artifact_name: "artifact.bin".to_owned(),
            fail_slot_b,
            calls: Vec::new(),
        }
    }

    fn candidates() -> (Candidate, Candidate) {
        (
            Candidate::new("a", "unused-a", Vec::new()),
            Candidate::new("b", "unused-b", Vec::new()),
        )
    }

    #[test]
    fn successful_run_records_every_trial() {
        let baseline = baseline();
        let (a, b) = candidates();
        let mut orch = Orchestrator::new(&baseline, a, b, runner(&baseline, false), plan(3));

        let summary = orch.run(&mut NoopObserver).expect("run");

        assert_eq!(summary.trials, 3);
        assert_eq!(orch.phase(), TrialPhase::Recorded);
        let indices: Vec<u32> = orch.results().iter().map(|r| r.index).collect();
        assert_eq!(indices, vec![1, 2, 3]);
        assert!(orch.results().iter().all(|r| r.verified));
        assert_eq!(orch.runner().calls, vec!["a", "b", "a", "b", "a", "b"]);
        assert!((summary.speedup.expect("speedup") - 4.0).abs() < 1e-9);
    }

    #[test]
    fn mismatch_aborts_on_first_trial() {
        let baseline = baseline();
        let (a, b) = candidates();
        let mut orch = Orchestrator::new(&baseline, a, b, runner(&baseline, true), plan(4));

        let err = orch.run(&mut NoopObserver).expect_err("b never repairs");

        assert!(
            matches!(err, BenchError::VerificationMismatch { trial: 1, ref candidate, .. } if candidate == "b"),
            "got {err:?}"
        );
        assert_eq!(orch.phase(), TrialPhase::Aborted);
        assert!(orch.results().is_empty());
        assert_eq!(orch.runner().calls, vec!["a", "b"]);
    }

    #[test]
    fn mismatch_reports_both_digests() {
        let baseline = baseline();
        let (a, b) = candidates();
        let mut orch = Orchestrator::new(&baseline, a, b, runner(&baseline, true), plan(1));

        let err = orch.run(&mut NoopObserver).expect_err("b never repairs");

        let BenchError::VerificationMismatch {
            expected, actual, ..
        } = &err
        else {
            panic!("unexpected error {err:?}");
        };
        assert_eq!(expected, &baseline.fingerprint().hex);
        assert_ne!(actual, expected);
        assert_eq!(actual.len(), expected.len());
    }

    #[test]
    fn out_of_bounds_corruption_aborts_before_any_invocation() {
        let baseline = baseline();
        let (a, b) = candidates();
        let mut bad = plan(2);
        bad.corruption = CorruptionSpec::new(8000, 1000, 0);
        let mut orch = Orchestrator::new(&baseline, a, b, runner(&baseline, false), bad);

        let err = orch.run(&mut NoopObserver).expect_err("range exceeds artifact");
        assert!(matches!(err, BenchError::CorruptionOutOfBounds { .. }), "got {err:?}");
        assert!(orch.runner().calls.is_empty());
    }

    #[test]
    fn baseline_is_not_mutated_by_trials() {
        let baseline = baseline();
        let before = fs::read(baseline.artifact()).expect("read");
        let (a, b) = candidates();
        let mut orch = Orchestrator::new(&baseline, a, b, runner(&baseline, false), plan(2));
        orch.run(&mut NoopObserver).expect("run");
        assert_eq!(fs::read(baseline.artifact()).expect("read"), before);
    }
}
