// Copyright (c) The soaktest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::errors::ProgressStoreError;
use atomicwrites::{AtomicFile, OverwriteBehavior};
use camino::Utf8Path;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, io::Write};

/// The persisted form of the progress table.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub(super) struct ProgressTable {
    #[serde(default)]
    files: BTreeMap<String, FileProgress>,
    // The line being run, if a run died before recording it as finished.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    in_flight: Option<InFlightLine>,
}

/// A line that started running but was not yet recorded as finished.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub(super) struct InFlightLine {
    pub(super) file: String,
    pub(super) line_number: usize,
    pub(super) template: String,
    /// The number of ledger rows before the line started.
    pub(super) ledger_rows: usize,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
struct FileProgress {
    #[serde(default)]
    completed: bool,
    // Line number -> command template. The template is compared on resume so that an edited
    // line runs again.
    #[serde(default)]
    finished_lines: BTreeMap<usize, String>,
}

impl ProgressTable {
    /// Loads the table, or returns an empty one if `path` does not exist.
    pub(super) fn load(path: &Utf8Path) -> Result<Self, ProgressStoreError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(err) => {
                return Err(ProgressStoreError::Read {
                    path: path.to_owned(),
                    err,
                });
            }
        };

        serde_json::from_str(&contents).map_err(|err| ProgressStoreError::Parse {
            path: path.to_owned(),
            err,
        })
    }

    pub(super) fn persist(&self, path: &Utf8Path) -> Result<(), ProgressStoreError> {
        let json = serde_json::to_vec_pretty(self).map_err(ProgressStoreError::Serialize)?;
        write_atomic(path, &json)
    }

    pub(super) fn is_completed(&self, file_name: &str) -> bool {
        self.files
            .get(file_name)
            .is_some_and(|progress| progress.completed)
    }

    pub(super) fn mark_completed(&mut self, file_name: &str) {
        self.files.entry(file_name.to_owned()).or_default().completed = true;
    }

    pub(super) fn is_line_finished(&self, file_name: &str, line_number: usize, template: &str) -> bool {
        self.files
            .get(file_name)
            .and_then(|progress| progress.finished_lines.get(&line_number))
            .is_some_and(|finished| finished == template)
    }

    pub(super) fn start_line(&mut self, in_flight: InFlightLine) {
        self.in_flight = Some(in_flight);
    }

    pub(super) fn take_in_flight(&mut self) -> Option<InFlightLine> {
        self.in_flight.take()
    }

    pub(super) fn record_line(&mut self, file_name: &str, line_number: usize, template: &str) {
        self.in_flight = None;
        self.files
            .entry(file_name.to_owned())
            .or_default()
            .finished_lines
            .insert(line_number, template.to_owned());
    }
}

pub(super) fn write_atomic(path: &Utf8Path, contents: &[u8]) -> Result<(), ProgressStoreError> {
    AtomicFile::new(path, OverwriteBehavior::AllowOverwrite)
        .write(|file| file.write_all(contents))
        .map_err(|err| ProgressStoreError::Write {
            path: path.to_owned(),
            err,
        })
}
