// Copyright (c) The soaktest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use camino::{Utf8Path, Utf8PathBuf};
use camino_tempfile::Utf8TempDir;
use color_eyre::eyre::{Result, WrapErr};
use soaktest_metadata::TestResult;
use soaktest_runner::{
    config::SoaktestConfig,
    ledger::ResultLedger,
    progress::RunMode,
    runner::{BatchEvent, BatchRunnerBuilder, RunStats},
};
use std::{os::unix::fs::PermissionsExt, sync::Once};

static INIT: Once = Once::new();

pub(crate) fn test_init() {
    INIT.call_once(|| {
        let _ = color_eyre::install();
    });
}

// Stands in for the HDL generator. Test lines select a behavior with a `mode=` argument:
// `nogen` never announces an output file, the others pass flags through to the toolchain.
const GENERATOR: &str = r#"#!/bin/sh
echo "$*" >> "@ROOT@/generator.log"
case "$*" in
  *mode=nogen*)
    echo "ERROR: unknown operator"
    exit 1
    ;;
esac
flags=""
case "$*" in
  *mode=badanalyze*) flags="--fail-analyze" ;;
  *mode=mismatch*) flags="--mismatch" ;;
  *mode=badrun*) flags="--fail-run" ;;
esac
echo "-- $1" > flopoco.vhdl
echo "Output file: flopoco.vhdl"
echo "To run the simulation using gHDL, type the following in a shell prompt:"
echo "ghdl -a $flags flopoco.vhdl"
echo "ghdl -e $flags TestBench_$1"
echo "ghdl -r $flags TestBench_$1 --stop-time=100ns"
echo "gtkwave TestBench_$1.vcd"
echo "To run the simulation using nvc, type the following in a shell prompt:"
echo "nvc -a flopoco.vhdl -e TestBench_$1 -r"
"#;

const GHDL: &str = r#"#!/bin/sh
echo "$*" >> "@ROOT@/ghdl.log"
stage="$1"
case "$stage" in
  -a)
    case "$*" in *--fail-analyze*)
      echo "flopoco.vhdl:1:1: syntax error"
      exit 1
      ;;
    esac
    if [ ! -f flopoco.vhdl ]; then
      echo "cannot find flopoco.vhdl"
      exit 1
    fi
    ;;
  -r)
    case "$*" in *--mismatch*)
      echo "Incorrect output for R: expected 0, got 1"
      exit 1
      ;;
    esac
    case "$*" in *--fail-run*)
      echo "simulation crashed"
      exit 1
      ;;
    esac
    echo "simulation finished @100ns"
    touch sim.vcd
    ;;
esac
exit 0
"#;

const CONFIG: &str = r#"
[toolchain]
path = ["bin"]

[profile.default]
generator = "./flopoco"
iterations = 10
settle-delay = "0s"

[profile.marker]
progress = "marker"

[profile.shared]
workdir = "shared"

[profile.ci]
junit = "junit.xml"
"#;

/// A project root with a scripted generator, a scripted `ghdl`, and a config pointing at both.
pub(crate) struct TempProject {
    dir: Utf8TempDir,
}

impl TempProject {
    pub(crate) fn new() -> Result<Self> {
        test_init();

        let dir = Utf8TempDir::new()?;
        let project = Self { dir };
        let root = project.root().to_owned();

        std::fs::create_dir_all(root.join("tests"))?;
        std::fs::create_dir_all(root.join("bin"))?;
        std::fs::create_dir_all(root.join(".config"))?;
        std::fs::write(root.join(SoaktestConfig::CONFIG_PATH), CONFIG)?;
        write_script(&root.join("flopoco"), GENERATOR, &root)?;
        write_script(&root.join("bin/ghdl"), GHDL, &root)?;

        Ok(project)
    }

    pub(crate) fn root(&self) -> &Utf8Path {
        self.dir.path()
    }

    pub(crate) fn write_definitions(&self, name: &str, contents: &str) -> Result<()> {
        std::fs::write(self.definitions_path(name), contents)
            .wrap_err_with(|| format!("writing definitions {name}"))
    }

    pub(crate) fn read_definitions(&self, name: &str) -> Result<String> {
        std::fs::read_to_string(self.definitions_path(name))
            .wrap_err_with(|| format!("reading definitions {name}"))
    }

    fn definitions_path(&self, name: &str) -> Utf8PathBuf {
        self.root().join("tests").join(name)
    }

    pub(crate) fn config(&self) -> Result<SoaktestConfig> {
        Ok(SoaktestConfig::from_sources(self.root(), None)?)
    }

    /// Arguments of every generator invocation so far, one entry per invocation.
    pub(crate) fn generator_invocations(&self) -> Result<Vec<String>> {
        read_log(&self.root().join("generator.log"))
    }

    /// Arguments of every toolchain invocation so far.
    pub(crate) fn ghdl_invocations(&self) -> Result<Vec<String>> {
        read_log(&self.root().join("ghdl.log"))
    }

    pub(crate) fn ledger(&self, profile: &str) -> Result<Vec<TestResult>> {
        let config = self.config()?;
        let profile = config.profile(profile)?;
        Ok(ResultLedger::read(&profile.ledger_path())?)
    }

    /// Runs a batch of the given profile, collecting a summary of every event.
    pub(crate) fn run(&self, profile: &str, run_mode: RunMode) -> Result<BatchOutput> {
        let config = self.config()?;
        let profile = config.profile(profile)?;
        let runner = BatchRunnerBuilder::default()
            .set_run_mode(run_mode)
            .build(&profile)?;

        let mut events = Vec::new();
        let stats = runner.execute(|event| events.push(EventSummary::new(&event)))?;
        Ok(BatchOutput { stats, events })
    }
}

fn write_script(path: &Utf8Path, template: &str, root: &Utf8Path) -> Result<()> {
    std::fs::write(path, template.replace("@ROOT@", root.as_str()))?;
    let mut permissions = std::fs::metadata(path)?.permissions();
    permissions.set_mode(0o755);
    std::fs::set_permissions(path, permissions)?;
    Ok(())
}

fn read_log(path: &Utf8Path) -> Result<Vec<String>> {
    match std::fs::read_to_string(path) {
        Ok(contents) => Ok(contents.lines().map(str::to_owned).collect()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(err) => Err(err.into()),
    }
}

#[derive(Debug)]
pub(crate) struct BatchOutput {
    pub(crate) stats: RunStats,
    pub(crate) events: Vec<EventSummary>,
}

impl BatchOutput {
    pub(crate) fn finished(&self) -> impl Iterator<Item = &TestResult> + '_ {
        self.events.iter().filter_map(|event| match event {
            EventSummary::TestFinished { result, .. } => Some(result),
            _ => None,
        })
    }
}

/// An owned, comparable digest of a [`BatchEvent`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) enum EventSummary {
    RunStarted { file_count: usize },
    FileSkipped { file: String },
    FileStarted { file: String },
    LineSkipped { line: usize, reason: String },
    TestStarted { line: usize },
    TestFinished { line: usize, result: TestResult, failure: Option<String> },
    FileFinished { file: String, newly_completed: bool },
    RunFinished { result_count: usize },
}

impl EventSummary {
    pub(crate) fn new(event: &BatchEvent<'_>) -> Self {
        match event {
            BatchEvent::RunStarted { file_count, .. } => Self::RunStarted {
                file_count: *file_count,
            },
            BatchEvent::FileSkipped { file } => Self::FileSkipped {
                file: file.name().to_owned(),
            },
            BatchEvent::FileStarted { file } => Self::FileStarted {
                file: file.name().to_owned(),
            },
            BatchEvent::LineSkipped { line, reason } => Self::LineSkipped {
                line: line.line_number(),
                reason: reason.to_string(),
            },
            BatchEvent::TestStarted { line, .. } => Self::TestStarted {
                line: line.line_number(),
            },
            BatchEvent::TestFinished { line, outcome } => Self::TestFinished {
                line: line.line_number(),
                result: outcome.result.clone(),
                failure: outcome.failure.as_ref().map(|failure| failure.step().to_owned()),
            },
            BatchEvent::FileFinished {
                file,
                newly_completed,
            } => Self::FileFinished {
                file: file.name().to_owned(),
                newly_completed: *newly_completed,
            },
            BatchEvent::RunFinished { results, .. } => Self::RunFinished {
                result_count: results.len(),
            },
        }
    }
}
