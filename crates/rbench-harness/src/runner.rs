//! Candidate invocation and wall-clock timing.
//!
//! The runner never interprets a candidate's exit status. Whether a repair
//! worked is decided afterwards by comparing fingerprints, which decouples
//! "the tool claimed success" from "the tool produced the right bytes".

use std::io;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use rbench_error::{BenchError, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Sleep between exit polls when a timeout is configured.
const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// A fully resolved repair executable: program path plus final arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub label: String,
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl Candidate {
    #[must_use]
    pub fn new(label: &str, program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            label: label.to_owned(),
            program: program.into(),
            args,
        }
    }

    /// Shell-like rendering for logs and reports.
    #[must_use]
    pub fn command_line(&self) -> String {
        let mut line = self.program.display().to_string();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

/// Invokes one candidate in a working directory and reports how long it took.
pub trait CandidateRunner {
    /// Run `candidate` with `workdir` as its current directory and block until
    /// it exits. The returned duration covers spawn to exit.
    fn run(&mut self, candidate: &Candidate, workdir: &Path) -> Result<Duration>;
}

impl<R: CandidateRunner + ?Sized> CandidateRunner for &mut R {
    fn run(&mut self, candidate: &Candidate, workdir: &Path) -> Result<Duration> {
        (**self).run(candidate, workdir)
    }
}

/// Runs candidates as child processes with all standard streams discarded.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    timeout: Option<Duration>,
}

impl ProcessRunner {
    /// Runner without a deadline: a hung candidate blocks forever.
    #[must_use]
    pub const fn new() -> Self {
        Self { timeout: None }
    }

    /// Kill candidates that run longer than `timeout`.
    ///
    /// With a timeout the runner polls for exit, so measured durations may
    /// overshoot the true exit time by up to one poll interval.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl CandidateRunner for ProcessRunner {
    fn run(&mut self, candidate: &Candidate, workdir: &Path) -> Result<Duration> {
        let mut command = Command::new(&candidate.program);
        command
            .args(&candidate.args)
            .current_dir(workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        let started = Instant::now();
        let mut child = command.spawn().map_err(|source| BenchError::CandidateLaunch {
            candidate: candidate.label.clone(),
            program: candidate.program.display().to_string(),
            source,
        })?;

        let status = match self.timeout {
            None => child
                .wait()
                .map_err(|err| BenchError::io("wait for candidate", workdir, err))?,
            Some(timeout) => {
                match wait_until(&mut child, started + timeout, POLL_INTERVAL)
                    .map_err(|err| BenchError::io("wait for candidate", workdir, err))?
                {
                    Some(status) => status,
                    None => {
                        return Err(BenchError::CandidateTimeout {
                            candidate: candidate.label.clone(),
                            timeout,
                        });
                    }
                }
            }
        };
        let elapsed = started.elapsed();

        debug!(
            target: "rbench::runner",
            candidate = %candidate.label,
            exit_code = ?status.code(),
            elapsed_ms = elapsed.as_secs_f64() * 1000.0,
            "candidate exited"
        );
        Ok(elapsed)
    }
}

/// Poll `child` until it exits or `deadline` passes.
///
/// Returns `None` after killing and reaping a child that missed the deadline.
fn wait_until(child: &mut Child, deadline: Instant, poll: Duration) -> io::Result<Option<ExitStatus>> {
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        let now = Instant::now();
        if now >= deadline {
            // The child may exit between try_wait and kill.
            let _ = child.kill();
            child.wait()?;
            return Ok(None);
        }
        thread::sleep(poll.min(deadline - now));
    }
}
