// Copyright (c) The soaktest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Discovery and parsing of test definition files.
//!
//! A test definition file holds one generator invocation per line. The first character of a line
//! is a sigil: `#` marks a comment, `!` stops processing of the rest of the file, and `@` (only
//! meaningful on line 1) marks a file completed by an earlier run.

use crate::errors::ListDefinitionsError;
use camino::{Utf8Path, Utf8PathBuf};
use std::fmt;

/// The kind of a line in a test definition file, derived from its first character.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LineKind {
    /// An empty or whitespace-only line.
    Blank,

    /// A line starting with `#`.
    Comment,

    /// A line starting with `!`: this and every later line in the file are skipped.
    Stop,

    /// A line starting with `@`.
    CompletedMarker,

    /// Any other line: a generator invocation template.
    Test,
}

impl LineKind {
    /// Classifies a raw line.
    pub fn classify(line: &str) -> Self {
        if line.trim().is_empty() {
            return Self::Blank;
        }
        match line.chars().next() {
            Some('#') => Self::Comment,
            Some('!') => Self::Stop,
            Some('@') => Self::CompletedMarker,
            _ => Self::Test,
        }
    }
}

/// One line of a test definition file.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TestLine {
    file_name: String,
    line_number: usize,
    text: String,
    kind: LineKind,
}

impl TestLine {
    /// The name of the file this line belongs to.
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// The 1-based line number within the file.
    pub fn line_number(&self) -> usize {
        self.line_number
    }

    /// The line as written, without its line terminator.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// The command template: the line with surrounding whitespace removed.
    pub fn template(&self) -> &str {
        self.text.trim()
    }

    /// The kind of this line.
    pub fn kind(&self) -> LineKind {
        self.kind
    }
}

impl fmt::Display for TestLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file_name, self.line_number)
    }
}

/// A test definition file found in the tests directory, not yet read.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DefinitionEntry {
    name: String,
    path: Utf8PathBuf,
}

impl DefinitionEntry {
    /// The file name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The absolute path to the file.
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }
}

/// The test definition files in a tests directory, in lexicographic order of file name.
#[derive(Clone, Debug)]
pub struct TestDefinitions {
    tests_dir: Utf8PathBuf,
    entries: Vec<DefinitionEntry>,
}

impl TestDefinitions {
    /// Lists the definition files in `tests_dir`.
    ///
    /// Directories, dot-files and editor backups (names ending in `~`) are ignored.
    pub fn discover(tests_dir: impl Into<Utf8PathBuf>) -> Result<Self, ListDefinitionsError> {
        let tests_dir = tests_dir.into();
        let read_dir_err = |err| ListDefinitionsError::ReadDir {
            dir: tests_dir.clone(),
            err,
        };

        let mut entries = Vec::new();
        for entry in std::fs::read_dir(&tests_dir).map_err(read_dir_err)? {
            let entry = entry.map_err(read_dir_err)?;
            if !entry.file_type().map_err(read_dir_err)?.is_file() {
                continue;
            }

            let name = entry.file_name().into_string().map_err(|name| {
                ListDefinitionsError::NonUtf8FileName {
                    dir: tests_dir.clone(),
                    name: name.to_string_lossy().into_owned(),
                }
            })?;
            if name.starts_with('.') || name.ends_with('~') {
                continue;
            }

            entries.push(DefinitionEntry {
                path: tests_dir.join(&name),
                name,
            });
        }
        entries.sort_unstable_by(|a, b| a.name.cmp(&b.name));

        Ok(Self { tests_dir, entries })
    }

    /// The directory the files were listed from.
    pub fn tests_dir(&self) -> &Utf8Path {
        &self.tests_dir
    }

    /// Iterates over the files in processing order.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = &DefinitionEntry> + '_ {
        self.entries.iter()
    }

    /// The number of files.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if there are no definition files.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The contents of a test definition file, split into classified lines.
#[derive(Clone, Debug)]
pub struct DefinitionFile {
    name: String,
    path: Utf8PathBuf,
    lines: Vec<TestLine>,
}

impl DefinitionFile {
    /// Reads and parses the file for `entry`.
    pub fn read(entry: &DefinitionEntry) -> Result<Self, ListDefinitionsError> {
        let contents =
            std::fs::read_to_string(&entry.path).map_err(|err| ListDefinitionsError::ReadFile {
                path: entry.path.clone(),
                err,
            })?;
        Ok(Self::parse(&entry.name, &entry.path, &contents))
    }

    /// Parses file contents.
    pub fn parse(name: &str, path: impl Into<Utf8PathBuf>, contents: &str) -> Self {
        let lines = contents
            .lines()
            .enumerate()
            .map(|(idx, text)| TestLine {
                file_name: name.to_owned(),
                line_number: idx + 1,
                text: text.to_owned(),
                kind: LineKind::classify(text),
            })
            .collect();

        Self {
            name: name.to_owned(),
            path: path.into(),
            lines,
        }
    }

    /// The file name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The absolute path to the file.
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// The lines of the file, in order.
    pub fn lines(&self) -> &[TestLine] {
        &self.lines
    }

    /// Returns true if the first line of the file is an `@` completion marker.
    pub fn has_completion_marker(&self) -> bool {
        self.lines
            .first()
            .is_some_and(|line| line.kind == LineKind::CompletedMarker)
    }
}
