// Copyright (c) The soaktest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Building subprocesses for the generator and the toolchain.

use crate::errors::BatchError;
use camino::{Utf8Path, Utf8PathBuf};
use std::{ffi::OsString, io};
use tracing::debug;

/// The environment shared by every subprocess of a batch.
#[derive(Clone, Debug, Default)]
pub(crate) struct ToolchainEnv {
    // PATH with the configured toolchain directories prepended, if there are any.
    path: Option<OsString>,
}

impl ToolchainEnv {
    pub(crate) fn new(prepend: &[Utf8PathBuf]) -> Result<Self, BatchError> {
        if prepend.is_empty() {
            return Ok(Self::default());
        }

        let existing = std::env::var_os("PATH").unwrap_or_default();
        let dirs = prepend
            .iter()
            .map(|dir| dir.as_std_path().to_path_buf())
            .chain(std::env::split_paths(&existing));
        let path = std::env::join_paths(dirs).map_err(BatchError::ToolchainPath)?;
        Ok(Self { path: Some(path) })
    }
}

/// A shell command run in a given directory.
pub(crate) struct ShellCommand<'a> {
    command: &'a str,
    cwd: &'a Utf8Path,
    env: &'a ToolchainEnv,
}

/// Combined stdout and stderr of a finished process.
#[derive(Clone, Debug)]
pub(crate) struct CapturedOutput {
    pub(crate) exit_code: Option<i32>,
    pub(crate) success: bool,
    pub(crate) output: String,
}

impl<'a> ShellCommand<'a> {
    pub(crate) fn new(command: &'a str, cwd: &'a Utf8Path, env: &'a ToolchainEnv) -> Self {
        Self { command, cwd, env }
    }

    /// Runs the command to completion, capturing stdout and stderr together.
    ///
    /// A non-zero exit is not an error: it is reported through [`CapturedOutput`].
    pub(crate) fn run_capture(&self) -> io::Result<CapturedOutput> {
        debug!(cwd = %self.cwd, "running `{}`", self.command);
        let output = self
            .expression()
            .stderr_to_stdout()
            .stdout_capture()
            .unchecked()
            .run()?;

        Ok(CapturedOutput {
            exit_code: output.status.code(),
            success: output.status.success(),
            output: String::from_utf8_lossy(&output.stdout).into_owned(),
        })
    }

    /// Starts the command with `stdin` as its input, returning a reader over its combined output.
    pub(crate) fn spawn_reader(&self, stdin: Vec<u8>) -> io::Result<duct::ReaderHandle> {
        debug!(cwd = %self.cwd, "starting session `{}`", self.command);
        self.expression()
            .stdin_bytes(stdin)
            .stderr_to_stdout()
            .unchecked()
            .reader()
    }

    fn expression(&self) -> duct::Expression {
        let mut expression = shell(self.command).dir(self.cwd.as_std_path());
        if let Some(path) = &self.env.path {
            expression = expression.env("PATH", path);
        }
        expression
    }
}

#[cfg(unix)]
fn shell(command: &str) -> duct::Expression {
    duct::cmd!("sh", "-c", command)
}

#[cfg(windows)]
fn shell(command: &str) -> duct::Expression {
    duct::cmd!("cmd", "/C", command)
}
