// Copyright (c) The soaktest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    ExpectedError,
    errors::Result,
    output::{OutputContext, OutputOpts, OutputWriter},
};
use camino::{Utf8Path, Utf8PathBuf};
use clap::{Args, Parser, Subcommand, ValueEnum};
use soaktest_metadata::{ReportSummary, SoaktestExitCode};
use soaktest_runner::{
    config::{SoaktestConfig, SoaktestProfile, StageStrategy},
    ledger::ResultLedger,
    progress::RunMode,
    reporter::{FinalReport, TestReporterBuilder},
    runner::{BatchPlan, BatchRunnerBuilder},
};
use std::{io::Write, time::Duration};
use supports_color::Stream;
use tracing::info;

/// A crash-resumable regression-test orchestrator for HDL code generators.
///
/// soaktest runs every line of the test definition files through the generator and the
/// analyze/elaborate/run toolchain, and records one result per test in a ledger. Interrupted runs
/// resume where they stopped.
#[derive(Debug, Parser)]
#[command(version, name = "soaktest")]
pub struct SoaktestApp {
    /// Project root [default: current directory]
    #[arg(long, global = true, value_name = "DIR")]
    root: Option<Utf8PathBuf>,

    #[command(flatten)]
    output: OutputOpts,

    #[command(flatten)]
    config_opts: ConfigOpts,

    #[command(subcommand)]
    command: Command,
}

impl SoaktestApp {
    /// Initializes the output context.
    pub fn init_output(&self) -> OutputContext {
        self.output.init()
    }

    /// Executes the app, returning the process exit code on success.
    pub fn exec(self, output: OutputContext, output_writer: &mut OutputWriter) -> Result<i32> {
        let root = project_root(self.root)?;
        let config = self.config_opts.make_config(&root)?;

        match self.command {
            Command::Run {
                profile,
                run_opts,
            } => run(&config, &profile, run_opts, output, output_writer),
            Command::List {
                profile,
                start_clean,
            } => list(&config, &profile, start_clean, output_writer),
            Command::Report {
                profile,
                message_format,
            } => report(&config, &profile, message_format, output_writer),
        }
    }
}

#[derive(Debug, Args)]
struct ConfigOpts {
    /// Config file [default: project-root/.config/soaktest.toml]
    #[arg(long, global = true, value_name = "PATH")]
    config_file: Option<Utf8PathBuf>,
}

impl ConfigOpts {
    fn make_config(&self, project_root: &Utf8Path) -> Result<SoaktestConfig> {
        Ok(SoaktestConfig::from_sources(
            project_root,
            self.config_file.as_deref(),
        )?)
    }
}

#[derive(Debug, Args)]
struct ProfileOpts {
    /// Profile to use
    #[arg(
        long,
        short = 'P',
        env = "SOAKTEST_PROFILE",
        default_value = SoaktestConfig::DEFAULT_PROFILE
    )]
    profile: String,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the batch
    ///
    /// Every definition file is processed in name order. By default, files and lines completed by
    /// an earlier run are skipped and results are appended to the existing ledger.
    Run {
        #[command(flatten)]
        profile: ProfileOpts,

        #[command(flatten)]
        run_opts: RunOpts,
    },

    /// Show what a run would do, without running anything
    List {
        #[command(flatten)]
        profile: ProfileOpts,

        /// Plan as if --start-clean were passed to run
        #[arg(long, short = 'n')]
        start_clean: bool,
    },

    /// Print the final report from the result ledger
    Report {
        #[command(flatten)]
        profile: ProfileOpts,

        /// Output format
        #[arg(long, value_enum, default_value_t, value_name = "FMT")]
        message_format: MessageFormat,
    },
}

#[derive(Debug, Args)]
struct RunOpts {
    /// Discard earlier progress, logs and results before running
    #[arg(long, short = 'n')]
    start_clean: bool,

    /// Number of simulation iterations per test [default: from profile]
    #[arg(long, value_name = "N")]
    iterations: Option<u32>,

    /// Delay before the first toolchain invocation of each test [default: from profile]
    #[arg(long, value_name = "DURATION", value_parser = humantime::parse_duration)]
    settle_delay: Option<Duration>,

    /// How toolchain stages are run [default: from profile]
    #[arg(long, value_enum, value_name = "STRATEGY")]
    strategy: Option<StrategyOpt>,
}

impl RunOpts {
    fn run_mode(&self) -> RunMode {
        if self.start_clean {
            RunMode::StartClean
        } else {
            RunMode::Resume
        }
    }

    fn to_builder(&self) -> BatchRunnerBuilder {
        let mut builder = BatchRunnerBuilder::default();
        builder.set_run_mode(self.run_mode());
        if let Some(iterations) = self.iterations {
            builder.set_iterations(iterations);
        }
        if let Some(settle_delay) = self.settle_delay {
            builder.set_settle_delay(settle_delay);
        }
        if let Some(strategy) = self.strategy {
            builder.set_strategy(strategy.into());
        }
        builder
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum StrategyOpt {
    /// Run analyze, elaborate and run as separate commands
    OneShot,

    /// Feed a script to one interactive simulator session
    Session,
}

impl From<StrategyOpt> for StageStrategy {
    fn from(opt: StrategyOpt) -> Self {
        match opt {
            StrategyOpt::OneShot => StageStrategy::OneShot,
            StrategyOpt::Session => StageStrategy::Session,
        }
    }
}

#[derive(Copy, Clone, Debug, Default, ValueEnum)]
enum MessageFormat {
    /// A human-readable table
    #[default]
    Human,

    /// JSON, as a soaktest-metadata ReportSummary
    Json,
}

fn project_root(root: Option<Utf8PathBuf>) -> Result<Utf8PathBuf> {
    let root = match root {
        Some(root) => root,
        None => {
            let cwd = std::env::current_dir()
                .map_err(|err| ExpectedError::ProjectRootInvalid { path: None, err })?;
            Utf8PathBuf::try_from(cwd).map_err(|err| ExpectedError::ProjectRootInvalid {
                path: None,
                err: err.into_io_error(),
            })?
        }
    };

    if !root.is_dir() {
        return Err(ExpectedError::ProjectRootInvalid {
            path: Some(root),
            err: std::io::Error::new(std::io::ErrorKind::NotFound, "not a directory"),
        });
    }
    Ok(root)
}

fn run(
    config: &SoaktestConfig,
    profile: &ProfileOpts,
    run_opts: RunOpts,
    output: OutputContext,
    output_writer: &mut OutputWriter,
) -> Result<i32> {
    let profile = config.profile(&profile.profile)?;
    let runner = run_opts
        .to_builder()
        .build(&profile)
        .map_err(ExpectedError::batch_setup)?;

    let mut reporter_builder = TestReporterBuilder::default();
    reporter_builder
        .set_colorize(output.color.should_colorize(Stream::Stderr))
        .set_verbose(output.verbose);
    let mut reporter = reporter_builder.build(&profile, output_writer.reporter_output());

    let stats = runner.try_execute(|event| {
        reporter
            .report_event(&event)
            .map_err(ExpectedError::from)
    })?;

    info!("full log written to {}", profile.full_log_path());
    if !stats.is_success() {
        return Err(ExpectedError::TestRunFailed);
    }
    Ok(SoaktestExitCode::OK)
}

fn list(
    config: &SoaktestConfig,
    profile: &ProfileOpts,
    start_clean: bool,
    output_writer: &mut OutputWriter,
) -> Result<i32> {
    let profile = config.profile(&profile.profile)?;
    let run_mode = if start_clean {
        RunMode::StartClean
    } else {
        RunMode::Resume
    };
    let plan = BatchPlan::new(&profile, run_mode).map_err(ExpectedError::batch_setup)?;

    let mut writer = output_writer.stdout_writer();
    write_plan(&plan, &mut writer).map_err(ExpectedError::write_output)?;
    writer.flush().map_err(ExpectedError::write_output)?;
    Ok(SoaktestExitCode::OK)
}

fn write_plan(plan: &BatchPlan, mut writer: impl Write) -> std::io::Result<()> {
    for planned in plan.files() {
        if planned.skipped {
            writeln!(writer, "{} (completed, skipped)", planned.file.name())?;
            continue;
        }

        writeln!(writer, "{}", planned.file.name())?;
        for (line, reason) in planned.file.lines().iter().zip(&planned.lines) {
            match reason {
                None => writeln!(writer, "  {:>4} run   {}", line.line_number(), line.template())?,
                Some(reason) => writeln!(
                    writer,
                    "  {:>4} skip  {} ({reason})",
                    line.line_number(),
                    line.text().trim_end()
                )?,
            }
        }
    }
    writeln!(writer, "tests to run: {}", plan.test_count())
}

fn report(
    config: &SoaktestConfig,
    profile: &ProfileOpts,
    message_format: MessageFormat,
    output_writer: &mut OutputWriter,
) -> Result<i32> {
    let profile = config.profile(&profile.profile)?;
    let results = read_ledger(&profile)?;

    let mut writer = output_writer.stdout_writer();
    let passed = match message_format {
        MessageFormat::Human => {
            let report = FinalReport::new(&results);
            writeln!(writer, "{report}").map_err(ExpectedError::write_output)?;
            report.passed()
        }
        MessageFormat::Json => {
            let summary = ReportSummary::new(results);
            serde_json::to_writer_pretty(&mut writer, &summary)?;
            writeln!(writer).map_err(ExpectedError::write_output)?;
            summary.passed
        }
    };
    writer.flush().map_err(ExpectedError::write_output)?;

    if passed {
        Ok(SoaktestExitCode::OK)
    } else {
        Err(ExpectedError::TestRunFailed)
    }
}

fn read_ledger(profile: &SoaktestProfile<'_>) -> Result<Vec<soaktest_metadata::TestResult>> {
    ResultLedger::read(&profile.ledger_path()).map_err(ExpectedError::ledger_read)
}
