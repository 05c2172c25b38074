// Copyright (c) The soaktest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The on-disk audit trail for a batch.
//!
//! Two append-only logs are kept per profile: a full transcript of every command and its output,
//! and an errors-only log holding failing commands and their output. Every write is flushed before
//! it returns, so an interrupted batch leaves complete logs behind.

use crate::{errors::LogSinkError, progress::RunMode};
use camino::{Utf8Path, Utf8PathBuf};
use std::{
    fs::{File, OpenOptions},
    io::Write,
};

/// The full and errors-only logs for a batch.
#[derive(Debug)]
pub struct LogSink {
    full: LogFile,
    errors: LogFile,
}

impl LogSink {
    /// Opens both logs. In [`RunMode::StartClean`] they are truncated first, otherwise new entries
    /// are appended to what a prior run left behind.
    pub fn open(
        full_path: impl Into<Utf8PathBuf>,
        errors_path: impl Into<Utf8PathBuf>,
        mode: RunMode,
    ) -> Result<Self, LogSinkError> {
        Ok(Self {
            full: LogFile::open(full_path.into(), mode)?,
            errors: LogFile::open(errors_path.into(), mode)?,
        })
    }

    /// Appends text to the full log.
    pub fn record(&mut self, text: &str) -> Result<(), LogSinkError> {
        self.full.append(text)
    }

    /// Appends text to the errors-only log, prefixed with the command it came from.
    pub fn record_error(&mut self, context: &str, text: &str) -> Result<(), LogSinkError> {
        self.errors.append(&format!("ERROR in {context}"))?;
        self.errors.append(text)
    }

    /// The path of the full log.
    pub fn full_path(&self) -> &Utf8Path {
        &self.full.path
    }

    /// The path of the errors-only log.
    pub fn errors_path(&self) -> &Utf8Path {
        &self.errors.path
    }
}

#[derive(Debug)]
struct LogFile {
    path: Utf8PathBuf,
    file: File,
}

impl LogFile {
    fn open(path: Utf8PathBuf, mode: RunMode) -> Result<Self, LogSinkError> {
        let mut options = OpenOptions::new();
        options.create(true);
        match mode {
            RunMode::Resume => options.append(true),
            RunMode::StartClean => options.write(true).truncate(true),
        };

        match options.open(&path) {
            Ok(file) => Ok(Self { path, file }),
            Err(err) => Err(LogSinkError::Open { path, err }),
        }
    }

    fn append(&mut self, text: &str) -> Result<(), LogSinkError> {
        let res = self
            .file
            .write_all(text.as_bytes())
            .and_then(|()| {
                if text.ends_with('\n') {
                    Ok(())
                } else {
                    self.file.write_all(b"\n")
                }
            })
            .and_then(|()| self.file.flush());
        res.map_err(|err| LogSinkError::Write {
            path: self.path.clone(),
            err,
        })
    }
}
