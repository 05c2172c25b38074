// Copyright (c) The soaktest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Resumable progress across runs.
//!
//! A batch can take hours, and gets interrupted. The progress store decides which files and lines
//! a run can skip because an earlier run already dealt with them. Two backends are supported:
//!
//! * [`ProgressKind::StateFile`] keeps a JSON table in the store directory, keyed by file name and
//!   line number. It is rewritten atomically after every test, so an interrupted file resumes at
//!   the first line that did not finish.
//! * [`ProgressKind::Marker`] prepends an `@` line to each file once all of its lines have been
//!   attempted. Files are only skipped as a whole.
//!
//! A leading `@` is honoured by both backends.

mod table;

use crate::{
    config::ProgressKind,
    errors::ProgressStoreError,
    list::{DefinitionFile, LineKind, TestLine},
};
use camino::{Utf8Path, Utf8PathBuf};
use std::fmt;
use table::{InFlightLine, ProgressTable};
use tracing::debug;

/// Whether a batch continues from earlier progress or discards it.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RunMode {
    /// Skip whatever earlier runs completed, and append to the logs and ledger.
    Resume,

    /// Ignore earlier progress, and truncate the logs and ledger.
    StartClean,
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Resume => write!(f, "resume"),
            Self::StartClean => write!(f, "start-clean"),
        }
    }
}

/// Why a line was not run.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SkipReason {
    /// The line is blank.
    Blank,

    /// The line is a comment.
    Comment,

    /// The line is a `!` stop marker.
    StopMarker,

    /// An earlier `!` line stopped processing of this file.
    AfterStop,

    /// The line is the file's `@` completion marker.
    CompletedMarker,

    /// The line starts with `@` but is not the first line of the file.
    MisplacedMarker,

    /// An earlier run finished this exact line.
    AlreadyFinished,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Blank => write!(f, "blank"),
            Self::Comment => write!(f, "comment"),
            Self::StopMarker => write!(f, "stop marker"),
            Self::AfterStop => write!(f, "after stop marker"),
            Self::CompletedMarker => write!(f, "completion marker"),
            Self::MisplacedMarker => write!(f, "misplaced completion marker"),
            Self::AlreadyFinished => write!(f, "finished in a prior run"),
        }
    }
}

/// Per-file state carried from line to line during a run.
#[derive(Clone, Debug, Default)]
pub struct FileState {
    stopped: bool,
}

impl FileState {
    /// Returns true once a `!` line has been seen.
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }
}

/// Reads and records progress for one profile.
#[derive(Debug)]
pub struct ProgressStore {
    mode: RunMode,
    backend: Backend,
}

#[derive(Debug)]
enum Backend {
    Marker,
    StateFile {
        path: Utf8PathBuf,
        table: ProgressTable,
    },
}

impl ProgressStore {
    /// Loads progress without modifying anything on disk.
    ///
    /// In [`RunMode::StartClean`] earlier progress is ignored. Use [`Self::reset`] to also discard
    /// it.
    pub fn load(
        kind: ProgressKind,
        state_path: impl Into<Utf8PathBuf>,
        mode: RunMode,
    ) -> Result<Self, ProgressStoreError> {
        let backend = match kind {
            ProgressKind::Marker => Backend::Marker,
            ProgressKind::StateFile => {
                let path = state_path.into();
                let table = match mode {
                    RunMode::Resume => ProgressTable::load(&path)?,
                    RunMode::StartClean => ProgressTable::default(),
                };
                Backend::StateFile { path, table }
            }
        };
        Ok(Self { mode, backend })
    }

    /// Discards progress recorded by earlier runs.
    ///
    /// Definition files are never modified here: a leading `@` is ignored in start-clean mode
    /// rather than removed.
    pub fn reset(&mut self) -> Result<(), ProgressStoreError> {
        if let Backend::StateFile { path, table } = &mut self.backend {
            *table = ProgressTable::default();
            table.persist(path)?;
        }
        Ok(())
    }

    /// The run mode.
    pub fn mode(&self) -> RunMode {
        self.mode
    }

    /// Returns true if the file carries a completion record, regardless of the run mode.
    pub fn has_completion_record(&self, file: &DefinitionFile) -> bool {
        if file.has_completion_marker() {
            return true;
        }
        match &self.backend {
            Backend::Marker => false,
            Backend::StateFile { table, .. } => table.is_completed(file.name()),
        }
    }

    /// Returns true if the whole file can be skipped: it was completed by an earlier run and the
    /// batch is resuming.
    pub fn is_file_completed(&self, file: &DefinitionFile) -> bool {
        self.mode == RunMode::Resume && self.has_completion_record(file)
    }

    /// Records that every line of the file has been attempted. Idempotent.
    pub fn mark_file_completed(&mut self, file: &DefinitionFile) -> Result<(), ProgressStoreError> {
        match &mut self.backend {
            Backend::Marker => prepend_marker(file.path()),
            Backend::StateFile { path, table } => {
                table.mark_completed(file.name());
                table.persist(path)
            }
        }
    }

    /// Returns true if the line should not be run. See [`Self::skip_reason`].
    pub fn should_skip_line(&self, line: &TestLine, state: &mut FileState) -> bool {
        self.skip_reason(line, state).is_some()
    }

    /// Returns why the line should not be run, or `None` if it should.
    ///
    /// Lines must be passed in file order with the same `state`: a `!` line causes every later
    /// line of the file to be skipped.
    pub fn skip_reason(&self, line: &TestLine, state: &mut FileState) -> Option<SkipReason> {
        if state.stopped {
            return Some(SkipReason::AfterStop);
        }

        match line.kind() {
            LineKind::Blank => Some(SkipReason::Blank),
            LineKind::Comment => Some(SkipReason::Comment),
            LineKind::Stop => {
                state.stopped = true;
                Some(SkipReason::StopMarker)
            }
            LineKind::CompletedMarker if line.line_number() == 1 => {
                Some(SkipReason::CompletedMarker)
            }
            LineKind::CompletedMarker => Some(SkipReason::MisplacedMarker),
            LineKind::Test => self
                .is_line_finished(line)
                .then_some(SkipReason::AlreadyFinished),
        }
    }

    /// Records that a line is about to run, with the number of rows the ledger holds before it.
    ///
    /// This lets [`Self::reconcile`] tell, after a crash, whether the line's result reached the
    /// ledger.
    pub fn record_line_started(
        &mut self,
        line: &TestLine,
        ledger_rows: usize,
    ) -> Result<(), ProgressStoreError> {
        match &mut self.backend {
            Backend::Marker => Ok(()),
            Backend::StateFile { path, table } => {
                table.start_line(InFlightLine {
                    file: line.file_name().to_owned(),
                    line_number: line.line_number(),
                    template: line.template().to_owned(),
                    ledger_rows,
                });
                table.persist(path)
            }
        }
    }

    /// Settles a line left in flight by an earlier run that died.
    ///
    /// If the ledger grew past the row count recorded when the line started, its result was
    /// appended and the line is recorded as finished, so it does not run (and get a second row)
    /// again. Otherwise the line is forgotten and runs again. Returns the line's file name and
    /// number if it was recovered as finished.
    pub fn reconcile(
        &mut self,
        ledger_rows: usize,
    ) -> Result<Option<(String, usize)>, ProgressStoreError> {
        let Backend::StateFile { path, table } = &mut self.backend else {
            return Ok(None);
        };
        let Some(in_flight) = table.take_in_flight() else {
            return Ok(None);
        };

        let recovered = ledger_rows > in_flight.ledger_rows;
        if recovered {
            table.record_line(&in_flight.file, in_flight.line_number, &in_flight.template);
        }
        table.persist(path)?;
        Ok(recovered.then_some((in_flight.file, in_flight.line_number)))
    }

    /// Records that a line ran to completion and its result is in the ledger.
    pub fn record_line_finished(&mut self, line: &TestLine) -> Result<(), ProgressStoreError> {
        match &mut self.backend {
            Backend::Marker => Ok(()),
            Backend::StateFile { path, table } => {
                table.record_line(line.file_name(), line.line_number(), line.template());
                table.persist(path)
            }
        }
    }

    fn is_line_finished(&self, line: &TestLine) -> bool {
        match &self.backend {
            Backend::Marker => false,
            Backend::StateFile { table, .. } => {
                self.mode == RunMode::Resume
                    && table.is_line_finished(line.file_name(), line.line_number(), line.template())
            }
        }
    }
}

fn prepend_marker(path: &Utf8Path) -> Result<(), ProgressStoreError> {
    let contents = std::fs::read_to_string(path).map_err(|err| ProgressStoreError::Read {
        path: path.to_owned(),
        err,
    })?;
    if contents.starts_with('@') {
        debug!("{path} already carries a completion marker");
        return Ok(());
    }

    table::write_atomic(path, format!("@\n{contents}").as_bytes())
}
