#![forbid(unsafe_code)]

mod tracing_setup;

use std::env;
use std::fs;
use std::io::{self, IsTerminal};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use rbench_error::{BenchError, EXIT_FAILURE};
use rbench_harness::baseline::{DEFAULT_ARTIFACT_BYTES, DEFAULT_ARTIFACT_SEED};
use rbench_harness::{
    ArtifactSource, BaselineArtifact, BenchConfig, ConsoleProgress, ConsoleReport,
    DigestAlgorithm, NoopObserver, Orchestrator, Palette, ProcessRunner, RunReport, TrialRow,
};
use tracing::info;

use crate::tracing_setup::Verbosity;

const MIB: u64 = 1024 * 1024;

// ── CLI definition ──────────────────────────────────────────────────────────

#[derive(Debug, Parser)]
#[command(
    name = "rbench",
    version,
    about = "Benchmark two file-repair tools against identical corruption"
)]
struct Cli {
    /// Debug-level logs from the harness on stderr.
    #[arg(short, long, global = true)]
    verbose: bool,
    /// Only log errors.
    #[arg(short, long, global = true)]
    quiet: bool,
    /// Disable ANSI colors in the report and the logs.
    #[arg(long, global = true)]
    no_color: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Prepare the baseline and run every trial.
    Run(RunArgs),
    /// Print the effective configuration as JSON.
    Config {
        #[command(flatten)]
        overrides: Overrides,
        /// Validate the configuration as well.
        #[arg(long)]
        check: bool,
    },
}

#[derive(Debug, Args)]
struct RunArgs {
    #[command(flatten)]
    overrides: Overrides,
    /// Print the run report as JSON instead of the console table.
    #[arg(long)]
    json: bool,
    /// Also write the JSON run report to this file.
    #[arg(long, value_name = "FILE")]
    report_out: Option<PathBuf>,
}

/// Values layered over the config file (or the defaults).
#[derive(Debug, Default, Args)]
struct Overrides {
    /// JSON configuration file.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Number of trials.
    #[arg(short = 'n', long)]
    iterations: Option<u32>,
    /// Benchmark an existing file instead of generated content.
    #[arg(long, value_name = "FILE", conflicts_with_all = ["size_mib", "seed"])]
    input: Option<PathBuf>,
    /// Size of the generated artifact in MiB.
    #[arg(long)]
    size_mib: Option<u64>,
    /// Seed for the generated artifact.
    #[arg(long)]
    seed: Option<u64>,
    /// Corruption start offset in bytes.
    #[arg(long)]
    offset: Option<u64>,
    /// Corruption length in bytes.
    #[arg(long)]
    length: Option<u64>,
    /// Fill byte for the corrupted range (decimal or 0x-prefixed hex).
    #[arg(long, value_parser = parse_byte)]
    fill: Option<u8>,
    /// Redundancy percentage passed to the recovery-set generator.
    #[arg(long)]
    redundancy: Option<u32>,
    /// Fingerprint digest (blake3 or sha256).
    #[arg(long)]
    digest: Option<DigestAlgorithm>,
    /// Kill a candidate after this many milliseconds.
    #[arg(long)]
    timeout_ms: Option<u64>,
    /// Parent directory for scratch scopes.
    #[arg(long, value_name = "DIR")]
    scratch_dir: Option<PathBuf>,
    /// Program for candidate A.
    #[arg(long, value_name = "PROGRAM")]
    candidate_a: Option<String>,
    /// Program for candidate B.
    #[arg(long, value_name = "PROGRAM")]
    candidate_b: Option<String>,
    /// Skip the check that both candidates see identical corruption.
    #[arg(long)]
    no_check_corruption: bool,
}

impl Overrides {
    fn load(&self) -> Result<BenchConfig> {
        let mut config = match &self.config {
            Some(path) => BenchConfig::load(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => BenchConfig::default(),
        };
        self.apply(&mut config);
        Ok(config)
    }

    fn apply(&self, config: &mut BenchConfig) {
        if let Some(iterations) = self.iterations {
            config.iterations = iterations;
        }
        if let Some(path) = &self.input {
            config.artifact = ArtifactSource::File { path: path.clone() };
        } else if self.size_mib.is_some() || self.seed.is_some() {
            let (size_bytes, seed) = match &config.artifact {
                ArtifactSource::Generate { size_bytes, seed } => (*size_bytes, *seed),
                ArtifactSource::File { .. } => (DEFAULT_ARTIFACT_BYTES, DEFAULT_ARTIFACT_SEED),
            };
            config.artifact = ArtifactSource::Generate {
                size_bytes: self
                    .size_mib
                    .map_or(size_bytes, |mib| mib.saturating_mul(MIB)),
                seed: self.seed.unwrap_or(seed),
            };
        }
        if let Some(offset) = self.offset {
            config.corruption.offset = offset;
        }
        if let Some(length) = self.length {
            config.corruption.length = length;
        }
        if let Some(fill) = self.fill {
            config.corruption.fill = fill;
        }
        if let Some(percent) = self.redundancy {
            config.redundancy_percent = percent;
        }
        if let Some(digest) = self.digest {
            config.digest = digest;
        }
        if let Some(ms) = self.timeout_ms {
            config.timeout_ms = Some(ms);
        }
        if let Some(dir) = &self.scratch_dir {
            config.scratch_dir = Some(dir.clone());
        }
        if let Some(program) = &self.candidate_a {
            config.candidate_a.program.clone_from(program);
        }
        if let Some(program) = &self.candidate_b {
            config.candidate_b.program.clone_from(program);
        }
        if self.no_check_corruption {
            config.check_corruption = false;
        }
    }
}

fn parse_byte(raw: &str) -> std::result::Result<u8, String> {
    let parsed = match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => raw.parse::<u8>(),
    };
    parsed.map_err(|err| format!("invalid fill byte {raw:?}: {err}"))
}

// ── Main ────────────────────────────────────────────────────────────────────

fn main() {
    let cli = Cli::parse();
    tracing_setup::init_subscriber(Verbosity::from_flags(cli.verbose, cli.quiet), cli.no_color);

    if let Err(err) = dispatch(&cli) {
        eprintln!("error: {err:#}");
        std::process::exit(exit_code(&err));
    }
}

/// Exit status for a failed command; integrity failures are distinguished.
fn exit_code(err: &anyhow::Error) -> i32 {
    err.downcast_ref::<BenchError>()
        .map_or(EXIT_FAILURE, BenchError::exit_code)
}

fn dispatch(cli: &Cli) -> Result<()> {
    match &cli.command {
        Command::Run(args) => {
            let color = !cli.no_color
                && env::var_os("NO_COLOR").is_none()
                && io::stdout().is_terminal();
            run_bench(args, color)
        }
        Command::Config { overrides, check } => {
            let config = overrides.load()?;
            if *check {
                config.validate()?;
            }
            println!("{}", config.to_json_pretty()?);
            Ok(())
        }
    }
}

fn run_bench(args: &RunArgs, color: bool) -> Result<()> {
    let config = args.overrides.load()?;
    let cwd = env::current_dir().context("failed to resolve working directory")?;
    let run = config.resolve(&cwd)?;
    info!(
        target: "rbench::cli",
        candidate_a = %run.candidate_a.command_line(),
        candidate_b = %run.candidate_b.command_line(),
        iterations = run.trials.iterations,
        "configuration resolved"
    );

    let report = ConsoleReport::new(
        Palette::new(color && !args.json),
        &run.candidate_a.label,
        &run.candidate_b.label,
    );

    let mut generator = run.generator.clone();
    let baseline = BaselineArtifact::prepare(&run.baseline, &mut generator)
        .context("failed to prepare baseline")?;
    if !args.json {
        println!("{}", report.banner(baseline.size_bytes(), run.trials.iterations));
    }

    let runner = ProcessRunner::new().with_timeout(run.timeout);
    let mut orchestrator = Orchestrator::new(
        &baseline,
        run.candidate_a.clone(),
        run.candidate_b.clone(),
        runner,
        run.trials.clone(),
    );
    let outcome = if args.json {
        orchestrator.run(&mut NoopObserver)
    } else {
        let mut progress = ConsoleProgress::new(report.clone(), io::stdout().lock());
        orchestrator.run(&mut progress)
    };
    let summary = match outcome {
        Ok(summary) => summary,
        Err(err) => {
            if !args.json {
                println!("{}", report.failure_line(&err));
            }
            return Err(err.into());
        }
    };
    let results = orchestrator.into_results();

    let run_report = RunReport {
        candidate_a: run.candidate_a,
        candidate_b: run.candidate_b,
        artifact_size_bytes: baseline.size_bytes(),
        corruption: run.trials.corruption,
        digest: run.baseline.digest,
        baseline_fingerprint: baseline.fingerprint().clone(),
        trials: results.iter().map(TrialRow::from).collect(),
        summary,
    };
    let json = run_report.to_json_pretty()?;
    if let Some(path) = &args.report_out {
        fs::write(path, &json)
            .with_context(|| format!("failed to write report {}", path.display()))?;
    }

    if args.json {
        println!("{json}");
    } else {
        println!("{}", report.summary(&summary, &results));
        println!("{}", report.success_line());
    }

    baseline.release().context("failed to remove baseline scope")?;
    Ok(())
}
