//! Run configuration.
//!
//! Every knob of a run is explicit configuration handed to the orchestrator at
//! construction: iteration count, corruption range, candidate commands, digest.
//! Configuration is JSON (all fields optional) and is validated as a whole
//! before any file is created.

use std::fs;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use rbench_error::{BenchError, Result};
use serde::{Deserialize, Serialize};

use crate::baseline::{ArtifactSource, BaselinePlan, ExternalRecoveryGenerator};
use crate::corrupt::CorruptionSpec;
use crate::fingerprint::DigestAlgorithm;
use crate::orchestrator::TrialPlan;
use crate::runner::Candidate;

/// Placeholder replaced with the artifact file name.
pub const ARTIFACT_VAR: &str = "{artifact}";
/// Placeholder replaced with the recovery index file name.
pub const RECOVERY_VAR: &str = "{recovery}";
/// Placeholder replaced with the redundancy percentage.
pub const PERCENT_VAR: &str = "{percent}";

/// Program plus argument templates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandTemplate {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

/// One compared repair executable as written in the config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateSpec {
    pub label: String,
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BenchConfig {
    pub iterations: u32,
    pub artifact: ArtifactSource,
    pub artifact_name: String,
    /// Recovery index file name; may reference `{artifact}`.
    pub recovery_name: String,
    pub redundancy_percent: u32,
    pub generator: CommandTemplate,
    pub candidate_a: CandidateSpec,
    pub candidate_b: CandidateSpec,
    pub corruption: CorruptionSpec,
    pub digest: DigestAlgorithm,
    /// Per-invocation deadline; no deadline when absent.
    pub timeout_ms: Option<u64>,
    pub check_corruption: bool,
    pub scratch_dir: Option<PathBuf>,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            iterations: 10,
            artifact: ArtifactSource::default(),
            artifact_name: "testfile".to_owned(),
            recovery_name: format!("{ARTIFACT_VAR}.par2"),
            redundancy_percent: 5,
            generator: CommandTemplate {
                program: "par2".to_owned(),
                args: vec![
                    "c".to_owned(),
                    format!("-r{PERCENT_VAR}"),
                    RECOVERY_VAR.to_owned(),
                    ARTIFACT_VAR.to_owned(),
                ],
            },
            candidate_a: CandidateSpec {
                label: "par2cmdline".to_owned(),
                program: "par2".to_owned(),
                args: vec!["r".to_owned(), RECOVERY_VAR.to_owned()],
            },
            candidate_b: CandidateSpec {
                label: "par2rs".to_owned(),
                program: "target/release/par2repair".to_owned(),
                args: vec![RECOVERY_VAR.to_owned()],
            },
            corruption: CorruptionSpec::default(),
            digest: DigestAlgorithm::default(),
            timeout_ms: None,
            check_corruption: true,
            scratch_dir: None,
        }
    }
}

/// Everything a run needs, with templates expanded and programs resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRun {
    pub baseline: BaselinePlan,
    pub generator: ExternalRecoveryGenerator,
    pub candidate_a: Candidate,
    pub candidate_b: Candidate,
    pub trials: TrialPlan,
    pub timeout: Option<Duration>,
}

impl BenchConfig {
    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|err| BenchError::Config(format!("invalid config json: {err}")))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text =
            fs::read_to_string(path).map_err(|err| BenchError::io("read config", path, err))?;
        serde_json::from_str(&text).map_err(|err| {
            BenchError::Config(format!("invalid config json in {}: {err}", path.display()))
        })
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|err| BenchError::Config(format!("serialize config: {err}")))
    }

    /// Recovery index file name with `{artifact}` expanded.
    #[must_use]
    pub fn recovery_file_name(&self) -> String {
        self.recovery_name.replace(ARTIFACT_VAR, &self.artifact_name)
    }

    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    /// Reject configurations that cannot produce a meaningful run.
    pub fn validate(&self) -> Result<()> {
        if self.iterations == 0 {
            return Err(BenchError::Config("iterations must be at least 1".to_owned()));
        }
        if self.corruption.length == 0 {
            return Err(BenchError::Config("corruption length must be non-zero".to_owned()));
        }
        if !(1..=100).contains(&self.redundancy_percent) {
            return Err(BenchError::Config(format!(
                "redundancy_percent must be in 1..=100, got {}",
                self.redundancy_percent
            )));
        }
        if self.timeout_ms == Some(0) {
            return Err(BenchError::Config("timeout_ms must be positive".to_owned()));
        }
        validate_file_name("artifact_name", &self.artifact_name)?;
        let recovery = self.recovery_file_name();
        validate_file_name("recovery_name", &recovery)?;
        if recovery == self.artifact_name {
            return Err(BenchError::Config(
                "recovery_name must differ from artifact_name".to_owned(),
            ));
        }

        let artifact_len = match &self.artifact {
            ArtifactSource::Generate { size_bytes, .. } => {
                if *size_bytes == 0 {
                    return Err(BenchError::Config("artifact size must be non-zero".to_owned()));
                }
                Some(*size_bytes)
            }
            ArtifactSource::File { path } => fs::metadata(path).ok().map(|m| m.len()),
        };
        if let Some(len) = artifact_len
            && !self.corruption.fits(len)
        {
            return Err(BenchError::Config(format!(
                "corruption range offset={} length={} does not fit a {len}-byte artifact",
                self.corruption.offset, self.corruption.length
            )));
        }

        if self.generator.program.trim().is_empty() {
            return Err(BenchError::Config("generator program is empty".to_owned()));
        }
        for (slot, spec) in [("candidate_a", &self.candidate_a), ("candidate_b", &self.candidate_b)] {
            if spec.label.trim().is_empty() {
                return Err(BenchError::Config(format!("{slot} label is empty")));
            }
            if spec.program.trim().is_empty() {
                return Err(BenchError::Config(format!("{slot} program is empty")));
            }
        }
        if self.candidate_a.label == self.candidate_b.label {
            return Err(BenchError::Config(format!(
                "candidate labels must differ (both are {:?})",
                self.candidate_a.label
            )));
        }
        Ok(())
    }

    /// Validate, expand templates and resolve relative program paths against
    /// `cwd`. Candidates run inside trial scopes, so a path like
    /// `target/release/tool` has to be anchored before the first trial.
    pub fn resolve(&self, cwd: &Path) -> Result<ResolvedRun> {
        self.validate()?;
        let recovery = self.recovery_file_name();
        let percent = self.redundancy_percent.to_string();
        let vars = [
            (ARTIFACT_VAR, self.artifact_name.as_str()),
            (RECOVERY_VAR, recovery.as_str()),
            (PERCENT_VAR, percent.as_str()),
        ];

        let candidate = |spec: &CandidateSpec| Candidate {
            label: spec.label.clone(),
            program: resolve_program(&spec.program, cwd),
            args: expand_args(&spec.args, &vars),
        };

        let artifact = match &self.artifact {
            ArtifactSource::File { path } if path.is_relative() => ArtifactSource::File {
                path: cwd.join(path),
            },
            other => other.clone(),
        };

        Ok(ResolvedRun {
            baseline: BaselinePlan {
                source: artifact,
                artifact_name: self.artifact_name.clone(),
                recovery_name: recovery.clone(),
                digest: self.digest,
                scratch_dir: self.scratch_dir.clone(),
            },
            generator: ExternalRecoveryGenerator {
                program: resolve_program(&self.generator.program, cwd),
                args: expand_args(&self.generator.args, &vars),
            },
            candidate_a: candidate(&self.candidate_a),
            candidate_b: candidate(&self.candidate_b),
            trials: TrialPlan {
                iterations: self.iterations,
                corruption: self.corruption,
                check_corruption: self.check_corruption,
                scratch_dir: self.scratch_dir.clone(),
            },
            timeout: self.timeout(),
        })
    }
}

/// Replace every `(placeholder, value)` pair in `template`.
#[must_use]
pub fn expand_template(template: &str, vars: &[(&str, &str)]) -> String {
    vars.iter()
        .fold(template.to_owned(), |acc, (key, value)| acc.replace(key, value))
}

fn expand_args(args: &[String], vars: &[(&str, &str)]) -> Vec<String> {
    args.iter().map(|arg| expand_template(arg, vars)).collect()
}

/// Bare names go through `PATH`; relative paths are anchored at `cwd`.
fn resolve_program(program: &str, cwd: &Path) -> PathBuf {
    let path = Path::new(program);
    if path.is_relative() && path.components().count() > 1 {
        cwd.join(path)
    } else {
        path.to_path_buf()
    }
}

fn validate_file_name(field: &str, name: &str) -> Result<()> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(BenchError::Config(format!(
            "{field} must be a plain file name, got {name:?}"
        ))),
    }
}
