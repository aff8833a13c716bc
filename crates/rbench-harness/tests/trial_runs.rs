use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rbench_error::{BenchError, EXIT_INTEGRITY, Result};
use rbench_harness::report::{ConsoleReport, Palette};
use rbench_harness::{
    ArtifactSource, BaselineArtifact, BaselinePlan, Candidate, CandidateRunner, CorruptionSpec,
    DigestAlgorithm, Fingerprint, Orchestrator, RecoveryGenerator, TrialObserver, TrialPhase,
    TrialPlan, TrialResult, fingerprint,
};

const ARTIFACT: &str = "testfile";
const RECOVERY: &str = "testfile.par2";

/// Writes a recovery index and two volume files next to the artifact.
struct FakePar2;

impl RecoveryGenerator for FakePar2 {
    fn generate(&mut self, artifact: &Path, recovery_index: &Path) -> Result<()> {
        for (path, body) in [
            (recovery_index.to_path_buf(), &b"index"[..]),
            (artifact.with_file_name("testfile.vol00+01.par2"), b"v0"),
            (artifact.with_file_name("testfile.vol01+02.par2"), b"v1"),
        ] {
            fs::write(&path, body).map_err(|e| BenchError::io("write recovery", &path, e))?;
        }
        Ok(())
    }
}

/// One observed candidate invocation.
#[derive(Debug, Clone)]
struct Invocation {
    label: String,
    workdir: PathBuf,
    input: Fingerprint,
    recovery_files: usize,
}

/// Repairs by copying the pristine artifact back and reports scripted times.
struct ScriptedRunner {
    pristine: PathBuf,
    a_secs: Vec<f64>,
    b_secs: Vec<f64>,
    /// `(trial, label)` of the one invocation that leaves the file broken.
    sabotage: Option<(u32, &'static str)>,
    invocations: Vec<Invocation>,
}

impl ScriptedRunner {
    fn new(baseline: &BaselineArtifact, a_secs: &[f64], b_secs: &[f64]) -> Self {
        Self {
            pristine: baseline.artifact().to_path_buf(),
            a_secs: a_secs.to_vec(),
            b_secs: b_secs.to_vec(),
            sabotage: None,
            invocations: Vec::new(),
        }
    }

    fn trial(&self) -> u32 {
        let a_runs = self.invocations.iter().filter(|i| i.label == "par2cmdline").count();
        u32::try_from(a_runs).expect("small")
    }
}

impl CandidateRunner for ScriptedRunner {
    fn run(&mut self, candidate: &Candidate, workdir: &Path) -> Result<Duration> {
        let working = workdir.join(ARTIFACT);
        let recovery_files = fs::read_dir(workdir)
            .expect("read workdir")
            .filter(|e| {
                e.as_ref()
                    .map(|e| e.file_name().to_string_lossy().ends_with(".par2"))
                    .unwrap_or(false)
            })
            .count();
        self.invocations.push(Invocation {
            label: candidate.label.clone(),
            workdir: workdir.to_path_buf(),
            input: fingerprint(&working, DigestAlgorithm::Blake3)?,
            recovery_files,
        });

        let trial = self.trial();
        let slot_b = candidate.label == "par2rs";
        let sabotaged = self
            .sabotage
            .is_some_and(|(t, label)| t == trial && label == candidate.label);
        if !sabotaged {
            fs::copy(&self.pristine, &working).map_err(|e| BenchError::io("repair", &working, e))?;
        }

        let idx = trial as usize - 1;
        let secs = if slot_b { self.b_secs[idx] } else { self.a_secs[idx] };
        Ok(Duration::from_secs_f64(secs))
    }
}

#[derive(Default)]
struct Recorder {
    started: Vec<(u32, u32)>,
    recorded: Vec<u32>,
}

impl TrialObserver for Recorder {
    fn trial_started(&mut self, index: u32, total: u32) {
        self.started.push((index, total));
    }

    fn trial_recorded(&mut self, result: &TrialResult) {
        self.recorded.push(result.index);
    }
}

fn baseline(scratch: Option<&Path>) -> BaselineArtifact {
    BaselineArtifact::prepare(
        &BaselinePlan {
            source: ArtifactSource::Generate {
                size_bytes: 64 * 1024,
                seed: 2024,
            },
            artifact_name: ARTIFACT.to_owned(),
            recovery_name: RECOVERY.to_owned(),
            digest: DigestAlgorithm::Blake3,
            scratch_dir: scratch.map(Path::to_path_buf),
        },
        &mut FakePar2,
    )
    .expect("baseline")
}

fn plan(iterations: u32, scratch: Option<&Path>) -> TrialPlan {
    TrialPlan {
        iterations,
        corruption: CorruptionSpec::new(16 * 1024, 4 * 1024, 0),
        check_corruption: true,
        scratch_dir: scratch.map(Path::to_path_buf),
    }
}

fn candidates() -> (Candidate, Candidate) {
    (
        Candidate::new("par2cmdline", "par2", vec!["r".into(), RECOVERY.into()]),
        Candidate::new("par2rs", "par2repair", vec![RECOVERY.into()]),
    )
}

#[test]
fn reference_scenario_reports_speedup() {
    let baseline = baseline(None);
    let runner = ScriptedRunner::new(&baseline, &[2.1, 2.0, 2.2], &[0.4, 0.5, 0.45]);
    let (a, b) = candidates();
    let mut orch = Orchestrator::new(&baseline, a, b, runner, plan(3, None));
    let mut recorder = Recorder::default();

    let summary = orch.run(&mut recorder).expect("all trials verify");

    assert_eq!(summary.trials, 3);
    assert!((summary.a.mean_secs - 2.1).abs() < 1e-6);
    assert!((summary.b.mean_secs - 0.45).abs() < 1e-6);
    assert!((summary.speedup.expect("speedup") - 4.6667).abs() < 1e-3);
    assert_eq!(recorder.started, vec![(1, 3), (2, 3), (3, 3)]);
    assert_eq!(recorder.recorded, vec![1, 2, 3]);

    let text = ConsoleReport::new(Palette::PLAIN, "par2cmdline", "par2rs")
        .summary(&summary, orch.results());
    assert!(text.contains("Speedup: 4.67x"));
}

#[test]
fn mismatch_in_third_trial_stops_the_run() {
    let baseline = baseline(None);
    let mut runner = ScriptedRunner::new(&baseline, &[1.0; 5], &[0.5; 5]);
    runner.sabotage = Some((3, "par2rs"));
    let (a, b) = candidates();
    let mut orch = Orchestrator::new(&baseline, a, b, runner, plan(5, None));
    let mut recorder = Recorder::default();

    let err = orch.run(&mut recorder).expect_err("trial 3 must fail");

    assert!(
        matches!(&err, BenchError::VerificationMismatch { trial: 3, candidate, .. } if candidate == "par2rs"),
        "got {err:?}"
    );
    assert_eq!(err.exit_code(), EXIT_INTEGRITY);
    assert_eq!(orch.phase(), TrialPhase::Aborted);
    assert_eq!(orch.results().len(), 2);
    assert_eq!(recorder.recorded, vec![1, 2]);
    assert_eq!(recorder.started.last(), Some(&(3, 5)));
    // Trials 4 and 5 never invoke anything.
    assert_eq!(orch.runner().invocations.len(), 6);
}

#[test]
fn both_candidates_see_identical_corruption() {
    let baseline = baseline(None);
    let runner = ScriptedRunner::new(&baseline, &[1.0; 3], &[1.0; 3]);
    let (a, b) = candidates();
    let mut orch = Orchestrator::new(&baseline, a, b, runner, plan(3, None));
    orch.run(&mut rbench_harness::NoopObserver).expect("run");

    let invocations = &orch.runner().invocations;
    assert_eq!(invocations.len(), 6);
    for pair in invocations.chunks(2) {
        let (a, b) = (&pair[0], &pair[1]);
        assert_eq!(a.label, "par2cmdline");
        assert_eq!(b.label, "par2rs");
        assert_eq!(a.input, b.input);
        assert_ne!(&a.input, baseline.fingerprint());
        assert_eq!(a.workdir, b.workdir);
        assert_eq!(a.recovery_files, 3);
    }
    // Every trial starts from a fresh scope.
    assert_ne!(invocations[0].workdir, invocations[2].workdir);
    assert_ne!(invocations[2].workdir, invocations[4].workdir);
}

#[test]
fn trial_scopes_are_removed_on_success_and_abort() {
    let scratch = tempfile::tempdir().expect("scratch");
    let baseline = baseline(None);

    let runner = ScriptedRunner::new(&baseline, &[1.0; 2], &[1.0; 2]);
    let (a, b) = candidates();
    let mut orch = Orchestrator::new(&baseline, a, b, runner, plan(2, Some(scratch.path())));
    orch.run(&mut rbench_harness::NoopObserver).expect("run");
    assert_eq!(fs::read_dir(scratch.path()).expect("list").count(), 0);

    let mut runner = ScriptedRunner::new(&baseline, &[1.0; 2], &[1.0; 2]);
    runner.sabotage = Some((1, "par2cmdline"));
    let (a, b) = candidates();
    let mut orch = Orchestrator::new(&baseline, a, b, runner, plan(2, Some(scratch.path())));
    orch.run(&mut rbench_harness::NoopObserver)
        .expect_err("A never repairs");
    assert_eq!(orch.runner().invocations.len(), 1);
    assert_eq!(fs::read_dir(scratch.path()).expect("list").count(), 0);
}

#[test]
fn baseline_scope_is_released() {
    let scratch = tempfile::tempdir().expect("scratch");
    let baseline = baseline(Some(scratch.path()));
    assert_eq!(baseline.redundancy_files().len(), 3);
    assert_eq!(fs::read_dir(scratch.path()).expect("list").count(), 1);
    baseline.release().expect("release");
    assert_eq!(fs::read_dir(scratch.path()).expect("list").count(), 0);
}
