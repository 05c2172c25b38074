// Copyright (c) The soaktest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reporting batch events to the terminal and to JUnit XML.
//!
//! Status lines go to stderr, in a right-aligned status column the way test runners usually lay
//! them out. The [`FinalReport`] table goes to stdout, so that it can be piped on its own.

mod final_report;
mod junit;

pub use final_report::*;

use crate::{
    config::SoaktestProfile,
    driver::TestOutcome,
    errors::WriteEventError,
    helpers::{DisplayBracketedDuration, plural},
    list::TestLine,
    progress::SkipReason,
    runner::{BatchEvent, RunStats},
};
use junit::JunitAggregator;
use owo_colors::{OwoColorize, Style};
use std::io::{self, Write};

/// Where reporter output goes.
pub enum ReporterOutput<'a> {
    /// Status lines to stderr, the final table to stdout.
    Terminal,

    /// Everything to a buffer, in order.
    Buffer(&'a mut Vec<u8>),
}

/// Test reporter builder.
#[derive(Debug, Default)]
pub struct TestReporterBuilder {
    should_colorize: bool,
    verbose: bool,
}

impl TestReporterBuilder {
    /// Set to true if the reporter should colorize output.
    pub fn set_colorize(&mut self, should_colorize: bool) -> &mut Self {
        self.should_colorize = should_colorize;
        self
    }

    /// Sets verbose output: every skipped line is reported, and failing tests print their
    /// generator transcript.
    pub fn set_verbose(&mut self, verbose: bool) -> &mut Self {
        self.verbose = verbose;
        self
    }

    /// Creates a new reporter for the given profile.
    pub fn build<'a>(
        &self,
        profile: &SoaktestProfile<'_>,
        output: ReporterOutput<'a>,
    ) -> TestReporter<'a> {
        let mut styles = Styles::default();
        if self.should_colorize {
            styles.colorize();
        }

        TestReporter {
            output,
            styles,
            verbose: self.verbose,
            junit: profile
                .junit_path()
                .map(|path| JunitAggregator::new(path, format!("soaktest-{}", profile.name()))),
        }
    }
}

/// Functionality to report batch events to the terminal and to JUnit.
pub struct TestReporter<'a> {
    output: ReporterOutput<'a>,
    styles: Styles,
    verbose: bool,
    junit: Option<JunitAggregator>,
}

impl TestReporter<'_> {
    /// Report a batch event.
    pub fn report_event(&mut self, event: &BatchEvent<'_>) -> Result<(), WriteEventError> {
        match &mut self.output {
            ReporterOutput::Terminal => {
                let mut stderr = io::stderr().lock();
                write_event(&self.styles, self.verbose, event, &mut stderr)
                    .map_err(WriteEventError::Io)?;
                if let BatchEvent::RunFinished { results, .. } = event {
                    let mut stdout = io::stdout().lock();
                    writeln!(stdout, "{}", FinalReport::new(results))
                        .and_then(|()| stdout.flush())
                        .map_err(WriteEventError::Io)?;
                }
            }
            ReporterOutput::Buffer(buf) => {
                write_event(&self.styles, self.verbose, event, &mut *buf)
                    .map_err(WriteEventError::Io)?;
                if let BatchEvent::RunFinished { results, .. } = event {
                    writeln!(buf, "{}", FinalReport::new(results)).map_err(WriteEventError::Io)?;
                }
            }
        }

        if let Some(junit) = &mut self.junit {
            junit.write_event(event)?;
        }
        Ok(())
    }
}

fn write_event(
    styles: &Styles,
    verbose: bool,
    event: &BatchEvent<'_>,
    mut writer: impl Write,
) -> io::Result<()> {
    match event {
        BatchEvent::RunStarted {
            file_count,
            run_mode,
        } => {
            writeln!(
                writer,
                "{:>12} {} definition {} ({run_mode})",
                "Starting".style(styles.pass),
                file_count.style(styles.count),
                plural::files_str(*file_count),
            )?;
        }
        BatchEvent::FileSkipped { file } => {
            writeln!(
                writer,
                "{:>12} {}: completed in a prior run",
                "Skipping".style(styles.skip),
                file.name().style(styles.file),
            )?;
        }
        BatchEvent::FileStarted { file } => {
            writeln!(
                writer,
                "{:>12} {}",
                "Processing".style(styles.pass),
                file.name().style(styles.file),
            )?;
        }
        BatchEvent::LineSkipped { line, reason } => {
            if verbose || is_notable_skip(*reason) {
                write!(writer, "{:>12} {:>11} ", "SKIP".style(styles.skip), "")?;
                write_line_id(styles, line, &mut writer)?;
                writeln!(writer, " ({reason})")?;
            }
        }
        BatchEvent::TestStarted { line, command } => {
            if verbose {
                write!(writer, "{:>12} {:>11} ", "START".style(styles.count), "")?;
                write_line_id(styles, line, &mut writer)?;
                writeln!(writer, " {command}")?;
            }
        }
        BatchEvent::TestFinished { line, outcome } => {
            write_test_finished(styles, verbose, line, outcome, &mut writer)?;
        }
        BatchEvent::FileFinished {
            file,
            newly_completed,
        } => {
            if *newly_completed {
                writeln!(
                    writer,
                    "{:>12} {}",
                    "Completed".style(styles.pass),
                    file.name().style(styles.file),
                )?;
            }
        }
        BatchEvent::RunFinished { elapsed, stats, .. } => {
            let summary_style = if stats.is_success() {
                styles.pass
            } else {
                styles.fail
            };
            write!(
                writer,
                "{:>12} {} ",
                "Summary".style(summary_style),
                DisplayBracketedDuration(*elapsed),
            )?;
            write_summary_counts(styles, stats, &mut writer)?;
        }
    }

    Ok(())
}

fn write_test_finished(
    styles: &Styles,
    verbose: bool,
    line: &TestLine,
    outcome: &TestOutcome,
    mut writer: impl Write,
) -> io::Result<()> {
    let (label, style) = match &outcome.failure {
        None => ("PASS", styles.pass),
        Some(_) if !outcome.result.generated => ("NOGEN", styles.fail),
        Some(_) => ("FAIL", styles.fail),
    };
    write!(
        writer,
        "{:>12} {} ",
        label.style(style),
        DisplayBracketedDuration(outcome.time_taken),
    )?;
    write_line_id(styles, line, &mut writer)?;
    writeln!(writer, " {}", line.template())?;

    if let Some(failure) = &outcome.failure {
        writeln!(writer, "{:>12} {}", "", failure.style(styles.fail_output))?;
        if verbose && !outcome.transcript.is_empty() {
            writeln!(writer, "\n--- GENERATOR OUTPUT: {line} ---")?;
            write!(writer, "{}", outcome.transcript)?;
            if !outcome.transcript.ends_with('\n') {
                writeln!(writer)?;
            }
            writeln!(writer)?;
        }
    }
    Ok(())
}

fn write_line_id(styles: &Styles, line: &TestLine, mut writer: impl Write) -> io::Result<()> {
    write!(
        writer,
        "{}:{}",
        line.file_name().style(styles.file),
        line.line_number().style(styles.count),
    )
}

fn write_summary_counts(styles: &Styles, stats: &RunStats, mut writer: impl Write) -> io::Result<()> {
    write!(
        writer,
        "{} {} run: {} {}",
        stats.tests_run.style(styles.count),
        plural::tests_str(stats.tests_run),
        stats.passed.style(styles.count),
        "passed".style(styles.pass),
    )?;

    if stats.failed > 0 {
        write!(
            writer,
            ", {} {}",
            stats.failed.style(styles.count),
            "failed".style(styles.fail),
        )?;
        if stats.not_generated > 0 || stats.not_compiled > 0 {
            write!(
                writer,
                " ({} not generated, {} not compiled)",
                stats.not_generated.style(styles.count),
                stats.not_compiled.style(styles.count),
            )?;
        }
    }

    if stats.files_skipped > 0 {
        write!(
            writer,
            ", {} {} {}",
            stats.files_skipped.style(styles.count),
            plural::files_str(stats.files_skipped),
            "skipped".style(styles.skip),
        )?;
    }
    writeln!(writer)
}

// Blanks, comments and lines after a stop marker are too noisy to report by default.
fn is_notable_skip(reason: SkipReason) -> bool {
    matches!(
        reason,
        SkipReason::StopMarker | SkipReason::MisplacedMarker | SkipReason::AlreadyFinished
    )
}

#[derive(Debug, Default)]
struct Styles {
    count: Style,
    pass: Style,
    fail: Style,
    fail_output: Style,
    skip: Style,
    file: Style,
}

impl Styles {
    fn colorize(&mut self) {
        self.count = Style::new().bold();
        self.pass = Style::new().green().bold();
        self.fail = Style::new().red().bold();
        self.fail_output = Style::new().magenta();
        self.skip = Style::new().yellow().bold();
        self.file = Style::new().blue().bold();
    }
}
