//! Console and JSON rendering of run results.
//!
//! Rendering is stateless: a [`Palette`] value carries the color codes, so
//! there is no process-wide style configuration. Every renderer returns a
//! `String`; only [`ConsoleProgress`] writes, and only to the writer it owns.

use std::fmt::Write as _;
use std::io::Write;

use rbench_error::{BenchError, Result};
use serde::{Deserialize, Serialize};

use crate::corrupt::CorruptionSpec;
use crate::fingerprint::{DigestAlgorithm, Fingerprint};
use crate::orchestrator::{TrialObserver, TrialResult};
use crate::runner::Candidate;
use crate::stats::{CandidateStats, RunSummary};

const RULE: &str = "========================================";

/// ANSI escape codes used by the console report; empty strings disable color.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette {
    pub heading: &'static str,
    pub progress: &'static str,
    pub label: &'static str,
    pub ok: &'static str,
    pub fail: &'static str,
    pub reset: &'static str,
}

impl Palette {
    pub const ANSI: Self = Self {
        heading: "\x1b[0;34m",
        progress: "\x1b[0;32m",
        label: "\x1b[1;33m",
        ok: "\x1b[0;32m",
        fail: "\x1b[0;31m",
        reset: "\x1b[0m",
    };

    pub const PLAIN: Self = Self {
        heading: "",
        progress: "",
        label: "",
        ok: "",
        fail: "",
        reset: "",
    };

    #[must_use]
    pub const fn new(color: bool) -> Self {
        if color { Self::ANSI } else { Self::PLAIN }
    }

    fn paint(&self, code: &str, text: &str) -> String {
        if code.is_empty() {
            text.to_owned()
        } else {
            format!("{code}{text}{}", self.reset)
        }
    }
}

/// Formats banners, per-trial lines and the final summary table.
#[derive(Debug, Clone)]
pub struct ConsoleReport {
    palette: Palette,
    label_a: String,
    label_b: String,
}

impl ConsoleReport {
    #[must_use]
    pub fn new(palette: Palette, label_a: &str, label_b: &str) -> Self {
        Self {
            palette,
            label_a: label_a.to_owned(),
            label_b: label_b.to_owned(),
        }
    }

    fn label_width(&self) -> usize {
        self.label_a.len().max(self.label_b.len()) + 1
    }

    #[must_use]
    pub fn banner(&self, artifact_size_bytes: u64, iterations: u32) -> String {
        let p = &self.palette;
        let mut out = String::new();
        let _ = writeln!(out, "{}", p.paint(p.heading, RULE));
        let _ = writeln!(out, "{}", p.paint(p.heading, "Repair Benchmark (Averaged)"));
        let _ = writeln!(
            out,
            "{}",
            p.paint(
                p.heading,
                &format!("Testing {} file repair", format_size(artifact_size_bytes))
            )
        );
        let _ = writeln!(out, "{}", p.paint(p.heading, &format!("Iterations: {iterations}")));
        let _ = writeln!(out, "{}", p.paint(p.heading, RULE));
        out
    }

    #[must_use]
    pub fn trial_header(&self, index: u32, total: u32) -> String {
        self.palette.paint(
            self.palette.progress,
            &format!("=== Iteration {index}/{total} ==="),
        )
    }

    /// The two measured durations of one trial, one line per candidate.
    #[must_use]
    pub fn trial_lines(&self, result: &TrialResult) -> String {
        let width = self.label_width();
        format!(
            "  {:<width$} {:.3}s\n  {:<width$} {:.3}s",
            format!("{}:", self.label_a),
            result.duration_a.as_secs_f64(),
            format!("{}:", self.label_b),
            result.duration_b.as_secs_f64(),
        )
    }

    fn stats_block(&self, out: &mut String, label: &str, stats: &CandidateStats) {
        let p = &self.palette;
        let _ = writeln!(out, "{}", p.paint(p.label, &format!("{label}:")));
        let _ = writeln!(out, "  Average: {:.3}s", stats.mean_secs);
        let _ = writeln!(out, "  Min:     {:.3}s", stats.min_secs);
        let _ = writeln!(out, "  Max:     {:.3}s", stats.max_secs);
        out.push('\n');
    }

    /// Aggregate statistics followed by every raw per-trial timing.
    #[must_use]
    pub fn summary(&self, summary: &RunSummary, results: &[TrialResult]) -> String {
        let p = &self.palette;
        let mut out = String::new();
        let _ = writeln!(out, "{}", p.paint(p.heading, RULE));
        let _ = writeln!(
            out,
            "{}",
            p.paint(p.heading, &format!("Results ({} iterations)", summary.trials))
        );
        let _ = writeln!(out, "{}", p.paint(p.heading, RULE));
        out.push('\n');

        self.stats_block(&mut out, &self.label_a, &summary.a);
        self.stats_block(&mut out, &self.label_b, &summary.b);

        let speedup = summary.speedup.map_or_else(
            || "Speedup: n/a (zero mean duration)".to_owned(),
            |s| format!("Speedup: {s:.2}x"),
        );
        let _ = writeln!(out, "{}", p.paint(p.ok, &speedup));
        out.push('\n');

        let wa = self.label_a.len().max(8);
        let wb = self.label_b.len().max(8);
        let _ = writeln!(out, "{}", p.paint(p.label, "Individual times:"));
        let _ = writeln!(
            out,
            "Iteration | {:>wa$} | {:>wb$}",
            self.label_a, self.label_b
        );
        let _ = writeln!(out, "----------|-{}-|-{}", "-".repeat(wa), "-".repeat(wb));
        for result in results {
            let _ = writeln!(
                out,
                "{:>9} | {:>w1$.3}s | {:>w2$.3}s",
                result.index,
                result.duration_a.as_secs_f64(),
                result.duration_b.as_secs_f64(),
                w1 = wa - 1,
                w2 = wb - 1,
            );
        }
        out
    }

    #[must_use]
    pub fn success_line(&self) -> String {
        self.palette
            .paint(self.palette.ok, "✓ All repairs verified correct")
    }

    #[must_use]
    pub fn failure_line(&self, error: &BenchError) -> String {
        let text = if error.is_integrity_failure() {
            format!("✗ Repair verification failed: {error}")
        } else {
            format!("✗ Benchmark aborted: {error}")
        };
        self.palette.paint(self.palette.fail, &text)
    }
}

/// Prints each trial's header and durations as the run progresses.
#[derive(Debug)]
pub struct ConsoleProgress<W: Write> {
    report: ConsoleReport,
    out: W,
}

impl<W: Write> ConsoleProgress<W> {
    #[must_use]
    pub const fn new(report: ConsoleReport, out: W) -> Self {
        Self { report, out }
    }

    #[must_use]
    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> TrialObserver for ConsoleProgress<W> {
    fn trial_started(&mut self, index: u32, total: u32) {
        // Console output is best-effort; a closed stdout must not abort a run.
        let _ = writeln!(self.out, "{}", self.report.trial_header(index, total));
    }

    fn trial_recorded(&mut self, result: &TrialResult) {
        let _ = writeln!(self.out, "{}\n", self.report.trial_lines(result));
        let _ = self.out.flush();
    }
}

/// One row of the machine-readable report.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrialRow {
    pub index: u32,
    pub a_secs: f64,
    pub b_secs: f64,
    pub verified: bool,
}

impl From<&TrialResult> for TrialRow {
    fn from(result: &TrialResult) -> Self {
        Self {
            index: result.index,
            a_secs: result.duration_a.as_secs_f64(),
            b_secs: result.duration_b.as_secs_f64(),
            verified: result.verified,
        }
    }
}

/// Serializable record of a completed run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub candidate_a: Candidate,
    pub candidate_b: Candidate,
    pub artifact_size_bytes: u64,
    pub corruption: CorruptionSpec,
    pub digest: DigestAlgorithm,
    pub baseline_fingerprint: Fingerprint,
    pub trials: Vec<TrialRow>,
    pub summary: RunSummary,
}

impl RunReport {
    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|err| BenchError::Config(format!("serialize report: {err}")))
    }
}

/// Human-readable byte size (`100 MiB`, `4 KiB`, `17 B`).
#[must_use]
pub fn format_size(bytes: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = KIB * 1024;
    const GIB: u64 = MIB * 1024;
    match bytes {
        b if b >= GIB && b % GIB == 0 => format!("{} GiB", b / GIB),
        b if b >= MIB && b % MIB == 0 => format!("{} MiB", b / MIB),
        b if b >= KIB && b % KIB == 0 => format!("{} KiB", b / KIB),
        #[allow(clippy::cast_precision_loss)]
        b if b >= MIB => format!("{:.1} MiB", b as f64 / MIB as f64),
        b => format!("{b} B"),
    }
}
