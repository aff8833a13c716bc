//! Baseline artifact preparation.
//!
//! The baseline is built exactly once per run: the artifact is produced in its
//! own scope, the external recovery-set generator writes redundancy files next
//! to it, and the reference fingerprint is computed. After that the baseline
//! is only ever read from; trials copy it into their own scopes.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Instant;

use rbench_error::{BenchError, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::fingerprint::{DigestAlgorithm, Fingerprint, fingerprint};
use crate::workspace::Scope;

const GENERATE_CHUNK_BYTES: usize = 1024 * 1024;

/// Size of the generated artifact when none is configured.
pub const DEFAULT_ARTIFACT_BYTES: u64 = 100 * 1024 * 1024;
/// Seed of the generated artifact when none is configured.
pub const DEFAULT_ARTIFACT_SEED: u64 = 0x5EED_F00D_BA5E_11AE;

/// Where the baseline artifact content comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ArtifactSource {
    /// Deterministic pseudo-random content of `size_bytes` derived from `seed`.
    Generate { size_bytes: u64, seed: u64 },
    /// An existing file copied in verbatim.
    File { path: PathBuf },
}

impl Default for ArtifactSource {
    fn default() -> Self {
        Self::Generate {
            size_bytes: DEFAULT_ARTIFACT_BYTES,
            seed: DEFAULT_ARTIFACT_SEED,
        }
    }
}

/// Everything needed to build the baseline scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaselinePlan {
    pub source: ArtifactSource,
    pub artifact_name: String,
    pub recovery_name: String,
    pub digest: DigestAlgorithm,
    pub scratch_dir: Option<PathBuf>,
}

/// Produces redundancy data for the baseline artifact.
pub trait RecoveryGenerator {
    /// Write the recovery set for `artifact`. `recovery_index` is the file
    /// candidates will be pointed at; it must exist afterwards. Any other file
    /// created next to the artifact is treated as part of the recovery set.
    fn generate(&mut self, artifact: &Path, recovery_index: &Path) -> Result<()>;
}

/// Recovery-set generator backed by an external program (`par2 c ...`).
///
/// Unlike candidates, the generator's exit status matters: without a valid
/// recovery set no trial can succeed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalRecoveryGenerator {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl RecoveryGenerator for ExternalRecoveryGenerator {
    fn generate(&mut self, artifact: &Path, _recovery_index: &Path) -> Result<()> {
        let workdir = artifact.parent().unwrap_or_else(|| Path::new("."));
        let output = Command::new(&self.program)
            .args(&self.args)
            .current_dir(workdir)
            .stdin(Stdio::null())
            .output()
            .map_err(|err| {
                BenchError::RecoveryGeneration(format!(
                    "failed to launch {}: {err}",
                    self.program.display()
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BenchError::RecoveryGeneration(format!(
                "{} exited with {}: {}",
                self.program.display(),
                output.status,
                stderr.trim()
            )));
        }
        Ok(())
    }
}

/// The pristine artifact, its recovery set and its reference fingerprint.
#[derive(Debug)]
pub struct BaselineArtifact {
    scope: Scope,
    artifact: PathBuf,
    recovery_index: PathBuf,
    redundancy: Vec<PathBuf>,
    fingerprint: Fingerprint,
    size_bytes: u64,
}

impl BaselineArtifact {
    /// Build the baseline scope: artifact, recovery set, fingerprint.
    pub fn prepare(plan: &BaselinePlan, generator: &mut dyn RecoveryGenerator) -> Result<Self> {
        let scope = Scope::create(plan.scratch_dir.as_deref(), "rbench-baseline-")?;
        let artifact = scope.join(&plan.artifact_name);
        let recovery_index = scope.join(&plan.recovery_name);

        let start = Instant::now();
        match &plan.source {
            ArtifactSource::Generate { size_bytes, seed } => {
                write_generated_artifact(&artifact, *size_bytes, *seed)?;
            }
            ArtifactSource::File { path } => {
                fs::copy(path, &artifact).map_err(|err| BenchError::Copy {
                    from: path.clone(),
                    to: artifact.clone(),
                    source: err,
                })?;
            }
        }
        let size_bytes = fs::metadata(&artifact)
            .map_err(|err| BenchError::io("stat artifact", &artifact, err))?
            .len();
        info!(
            target: "rbench::baseline",
            artifact = %artifact.display(),
            size_bytes,
            elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
            "artifact ready"
        );

        let start = Instant::now();
        generator.generate(&artifact, &recovery_index)?;
        let redundancy = list_recovery_files(scope.path(), &artifact)?;
        if !redundancy.contains(&recovery_index) {
            return Err(BenchError::RecoveryGeneration(format!(
                "generator did not produce {}",
                plan.recovery_name
            )));
        }
        info!(
            target: "rbench::baseline",
            files = redundancy.len(),
            elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
            "recovery set generated"
        );

        let fingerprint = fingerprint(&artifact, plan.digest)?;
        info!(target: "rbench::baseline", %fingerprint, "reference fingerprint computed");

        Ok(Self {
            scope,
            artifact,
            recovery_index,
            redundancy,
            fingerprint,
            size_bytes,
        })
    }

    #[must_use]
    pub fn artifact(&self) -> &Path {
        &self.artifact
    }

    /// File name of the artifact; trials use the same name in their scopes.
    #[must_use]
    pub fn artifact_name(&self) -> &std::ffi::OsStr {
        self.artifact.file_name().unwrap_or_default()
    }

    #[must_use]
    pub fn recovery_index(&self) -> &Path {
        &self.recovery_index
    }

    /// All redundancy files, sorted, including the recovery index.
    #[must_use]
    pub fn redundancy_files(&self) -> &[PathBuf] {
        &self.redundancy
    }

    #[must_use]
    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    #[must_use]
    pub const fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    /// Files every trial scope starts with: the artifact then the recovery set.
    #[must_use]
    pub fn trial_inputs(&self) -> Vec<&Path> {
        std::iter::once(self.artifact.as_path())
            .chain(self.redundancy.iter().map(PathBuf::as_path))
            .collect()
    }

    /// Remove the baseline scope, surfacing cleanup errors.
    pub fn release(self) -> Result<()> {
        self.scope.release()
    }
}

fn list_recovery_files(dir: &Path, artifact: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|err| BenchError::io("list baseline", dir, err))?;
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| BenchError::io("list baseline", dir, err))?;
        let path = entry.path();
        if path != artifact && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Write `size_bytes` of seeded pseudo-random content to `path`.
pub fn write_generated_artifact(path: &Path, size_bytes: u64, seed: u64) -> Result<()> {
    let file = File::create(path).map_err(|err| BenchError::io("create artifact", path, err))?;
    let mut writer = BufWriter::new(file);
    let mut rng = DeterministicRng::new(seed);
    let mut chunk = vec![0_u8; GENERATE_CHUNK_BYTES];
    let mut remaining = size_bytes;
    while remaining > 0 {
        let n = usize::try_from(remaining).map_or(chunk.len(), |r| r.min(chunk.len()));
        rng.fill_bytes(&mut chunk[..n]);
        writer
            .write_all(&chunk[..n])
            .map_err(|err| BenchError::io("write artifact", path, err))?;
        remaining -= n as u64;
    }
    writer
        .flush()
        .map_err(|err| BenchError::io("flush artifact", path, err))?;
    Ok(())
}

/// xorshift64* generator; reproducible across platforms for a given seed.
#[derive(Debug, Clone)]
struct DeterministicRng {
    state: u64,
}

impl DeterministicRng {
    fn new(seed: u64) -> Self {
        // A zero state would make xorshift emit zeros forever.
        let state = seed ^ 0x9E37_79B9_7F4A_7C15;
        Self {
            state: if state == 0 { 0x9E37_79B9_7F4A_7C15 } else { state },
        }
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545_F491_4F6C_DD1D)
    }

    fn fill_bytes(&mut self, out: &mut [u8]) {
        let mut words = out.chunks_exact_mut(8);
        for word in &mut words {
            word.copy_from_slice(&self.next_u64().to_le_bytes());
        }
        let tail = words.into_remainder();
        if !tail.is_empty() {
            let bytes = self.next_u64().to_le_bytes();
            tail.copy_from_slice(&bytes[..tail.len()]);
        }
    }
}
