// Copyright (c) The soaktest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The append-only result ledger.
//!
//! One row is written per test that actually ran:
//!
//! ```text
//! <command>, <generated>, <compiled>, <passed>
//! ```
//!
//! Each row is written with a single call, flushed and synced before [`ResultLedger::append`]
//! returns. A row torn by a crash is dropped the next time the ledger is opened.

use crate::{errors::LedgerError, progress::RunMode};
use camino::{Utf8Path, Utf8PathBuf};
use soaktest_metadata::TestResult;
use std::{
    fs::{File, OpenOptions},
    io::{self, Read, Seek, Write},
};
use tracing::warn;

/// An open, append-only result ledger.
#[derive(Debug)]
pub struct ResultLedger {
    path: Utf8PathBuf,
    file: File,
    rows: usize,
}

impl ResultLedger {
    /// Opens the ledger for appending, truncating it first in [`RunMode::StartClean`].
    pub fn open(path: impl Into<Utf8PathBuf>, mode: RunMode) -> Result<Self, LedgerError> {
        let path = path.into();
        let mut options = OpenOptions::new();
        options.create(true).read(true);
        match mode {
            RunMode::Resume => options.append(true),
            RunMode::StartClean => options.write(true).truncate(true),
        };

        let mut file = match options.open(&path) {
            Ok(file) => file,
            Err(err) => return Err(LedgerError::Open { path, err }),
        };
        let rows = match mode {
            RunMode::Resume => match drop_torn_row(&path, &mut file) {
                Ok(rows) => rows,
                Err(err) => return Err(LedgerError::Open { path, err }),
            },
            RunMode::StartClean => 0,
        };

        Ok(Self { path, file, rows })
    }

    /// The path of the ledger.
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// The number of complete rows in the ledger.
    pub fn row_count(&self) -> usize {
        self.rows
    }

    /// Appends one result and makes it durable.
    pub fn append(&mut self, result: &TestResult) -> Result<(), LedgerError> {
        let mut row = format_row(result);
        row.push('\n');

        let res = self
            .file
            .write_all(row.as_bytes())
            .and_then(|()| self.file.flush())
            .and_then(|()| self.file.sync_data());
        res.map_err(|err| LedgerError::Write {
            path: self.path.clone(),
            err,
        })?;
        self.rows += 1;
        Ok(())
    }

    /// Reads every row of the ledger at `path`.
    pub fn read(path: &Utf8Path) -> Result<Vec<TestResult>, LedgerError> {
        let contents = std::fs::read_to_string(path).map_err(|err| LedgerError::Read {
            path: path.to_owned(),
            err,
        })?;

        contents
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.is_empty())
            .map(|(idx, line)| {
                parse_row(line).ok_or_else(|| LedgerError::Parse {
                    path: path.to_owned(),
                    line_number: idx + 1,
                    line: line.to_owned(),
                })
            })
            .collect()
    }
}

/// Formats a result as a ledger row, without a line terminator.
pub fn format_row(result: &TestResult) -> String {
    format!(
        "{}, {}, {}, {}",
        result.command, result.generated, result.compiled, result.passed
    )
}

/// Parses a ledger row. The command may itself contain `", "`, so fields are split from the
/// right.
pub fn parse_row(row: &str) -> Option<TestResult> {
    let mut fields = row.rsplitn(4, ", ");
    let passed = fields.next()?.parse().ok()?;
    let compiled = fields.next()?.parse().ok()?;
    let generated = fields.next()?.parse().ok()?;
    let command = fields.next()?.to_owned();

    Some(TestResult {
        command,
        generated,
        compiled,
        passed,
    })
}

// Truncates a trailing row that has no line terminator: it was being written when a previous
// run died. Returns the number of complete rows.
fn drop_torn_row(path: &Utf8Path, file: &mut File) -> io::Result<usize> {
    let mut contents = Vec::new();
    file.rewind()?;
    file.read_to_end(&mut contents)?;
    let rows = contents.iter().filter(|&&b| b == b'\n').count();
    if contents.is_empty() || contents.ends_with(b"\n") {
        return Ok(rows);
    }

    let keep = contents
        .iter()
        .rposition(|&b| b == b'\n')
        .map_or(0, |idx| idx + 1);
    warn!(
        "dropping incomplete row at the end of result ledger {path}: {}",
        String::from_utf8_lossy(&contents[keep..])
    );
    file.set_len(keep as u64)?;
    file.sync_data()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino_tempfile::Utf8TempDir;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    fn result(command: &str, generated: bool, compiled: bool, passed: bool) -> TestResult {
        TestResult {
            command: command.to_owned(),
            generated,
            compiled,
            passed,
        }
    }

    #[test]
    fn row_format() {
        assert_eq!(
            format_row(&result("flopoco IntAdder wIn=10 TestBench n=1000", true, false, false)),
            "flopoco IntAdder wIn=10 TestBench n=1000, true, false, false"
        );
    }

    #[test_case("a, true, true, true", Some(result("a", true, true, true)) ; "simple")]
    #[test_case(
        "FPConstMult constant=\"1, 2\", true, true, false",
        Some(result("FPConstMult constant=\"1, 2\"", true, true, false))
        ; "command containing separator"
    )]
    #[test_case("a, true, true", None ; "missing field")]
    #[test_case("a, yes, true, true", None ; "not a bool")]
    fn parse(row: &str, expected: Option<TestResult>) {
        assert_eq!(parse_row(row), expected);
    }

    #[test]
    fn append_then_read() {
        let dir = Utf8TempDir::new().expect("temp dir created");
        let path = dir.path().join("results.csv");

        let mut ledger = ResultLedger::open(&path, RunMode::StartClean).expect("ledger opens");
        ledger
            .append(&result("a", true, true, true))
            .expect("append succeeds");
        ledger
            .append(&result("b", false, false, false))
            .expect("append succeeds");
        drop(ledger);

        let mut ledger = ResultLedger::open(&path, RunMode::Resume).expect("ledger opens");
        ledger
            .append(&result("c", true, true, false))
            .expect("append succeeds");

        let rows = ResultLedger::read(&path).expect("ledger reads");
        let commands: Vec<_> = rows.iter().map(|row| row.command.as_str()).collect();
        assert_eq!(commands, vec!["a", "b", "c"]);
    }

    #[test]
    fn resume_drops_torn_row() {
        let dir = Utf8TempDir::new().expect("temp dir created");
        let path = dir.path().join("results.csv");
        std::fs::write(&path, "a, true, true, true\nb, tr").expect("ledger written");

        let mut ledger = ResultLedger::open(&path, RunMode::Resume).expect("ledger opens");
        ledger
            .append(&result("b", true, true, true))
            .expect("append succeeds");

        assert_eq!(
            std::fs::read_to_string(&path).expect("ledger reads"),
            "a, true, true, true\nb, true, true, true\n"
        );
    }

    #[test]
    fn row_count_tracks_complete_rows() {
        let dir = Utf8TempDir::new().expect("temp dir created");
        let path = dir.path().join("results.csv");
        std::fs::write(&path, "a, true, true, true\nb, true, true, true\nc, tr")
            .expect("ledger written");

        let mut ledger = ResultLedger::open(&path, RunMode::Resume).expect("ledger opens");
        assert_eq!(ledger.row_count(), 2);
        ledger
            .append(&result("c", true, true, true))
            .expect("append succeeds");
        assert_eq!(ledger.row_count(), 3);

        let ledger = ResultLedger::open(&path, RunMode::StartClean).expect("ledger opens");
        assert_eq!(ledger.row_count(), 0);
    }

    #[test]
    fn malformed_row_is_reported() {
        let dir = Utf8TempDir::new().expect("temp dir created");
        let path = dir.path().join("results.csv");
        std::fs::write(&path, "a, true, true, true\ngarbage\n").expect("ledger written");

        let err = ResultLedger::read(&path).expect_err("row 2 is malformed");
        assert!(matches!(
            err,
            LedgerError::Parse { line_number: 2, line, .. } if line == "garbage"
        ));
    }
}
