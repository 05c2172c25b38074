// Copyright (c) The soaktest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The interactive session strategy.
//!
//! A single simulator process is started per test and fed the whole session script on standard
//! input. Its output is read line by line on a helper thread and classified as it arrives. The
//! session has a time budget measured from its start: if no terminal line has arrived once the
//! budget is spent, the session is killed, however much it is still printing.

use crate::{
    config::SessionConfig,
    errors::LogSinkError,
    extract::SessionScript,
    log_sink::LogSink,
    stopwatch::stopwatch,
    test_command::{ShellCommand, ToolchainEnv},
};
use camino::Utf8Path;
use crossbeam_channel::RecvTimeoutError;
use std::{
    fmt,
    io::{BufRead, BufReader},
    sync::Arc,
    time::{Duration, Instant},
};
use tracing::{debug, warn};

/// How an interactive session ended.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SessionStatus {
    /// The session finished without errors or mismatches.
    Passed,

    /// The simulator could not load the design.
    LoadError,

    /// The simulator reported an error.
    Errors,

    /// The simulation reported a mismatch between expected and actual values.
    LogicalMismatch,

    /// No terminal line arrived in time, and the session was killed.
    TimedOut {
        /// The time budget that was exceeded.
        timeout: Duration,
    },

    /// The session could not be started.
    ExecFail {
        /// A description of the failure.
        message: String,
    },
}

impl SessionStatus {
    /// Returns true if the session passed.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Passed)
    }

    /// Returns true if the design was compiled and loaded by the session.
    pub fn compiled(&self) -> bool {
        !matches!(self, Self::LoadError | Self::ExecFail { .. })
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Passed => write!(f, "passed"),
            Self::LoadError => write!(f, "design could not be loaded"),
            Self::Errors => write!(f, "simulator reported errors"),
            Self::LogicalMismatch => write!(f, "reported incorrect results"),
            Self::TimedOut { timeout } => {
                write!(f, "timed out after {}", humantime::format_duration(*timeout))
            }
            Self::ExecFail { message } => write!(f, "could not be started: {message}"),
        }
    }
}

/// The result of an interactive session.
#[derive(Clone, Debug)]
pub struct SessionOutcome {
    /// The command line that started the session.
    pub command: String,

    /// How the session ended.
    pub status: SessionStatus,

    /// Every line the session printed before it ended.
    pub transcript: String,

    /// Wall-clock time spent in the session.
    pub time_taken: Duration,
}

/// Runs session scripts against an interactive simulator.
#[derive(Clone, Copy, Debug)]
pub struct SessionRunner<'a> {
    config: &'a SessionConfig,
    mismatch: &'a str,
    cwd: &'a Utf8Path,
    env: &'a ToolchainEnv,
}

impl<'a> SessionRunner<'a> {
    pub(crate) fn new(
        config: &'a SessionConfig,
        mismatch: &'a str,
        cwd: &'a Utf8Path,
        env: &'a ToolchainEnv,
    ) -> Self {
        Self {
            config,
            mismatch,
            cwd,
            env,
        }
    }

    /// Runs one session to completion, timeout, or failure to start.
    pub fn run(
        &self,
        script: &SessionScript,
        log: &mut LogSink,
    ) -> Result<SessionOutcome, LogSinkError> {
        let stopwatch = stopwatch();
        // exec so that killing the shell kills the simulator.
        let command = format!("exec {}", self.config.program());
        log.record(&format!("> {}", self.config.program()))?;
        for line in script.lines() {
            log.record(line)?;
        }

        let mut transcript = String::new();
        let status = match self.drive(&command, script, log, &mut transcript) {
            Ok(status) => status,
            Err(DriveError::Log(err)) => return Err(err),
            Err(DriveError::Spawn(err)) => SessionStatus::ExecFail {
                message: err.to_string(),
            },
        };

        if !status.is_success() {
            let detail = match &status {
                SessionStatus::ExecFail { message } => message.clone(),
                SessionStatus::TimedOut { .. } => format!("{status}\n{transcript}"),
                _ => transcript.clone(),
            };
            log.record_error(self.config.program(), &detail)?;
        }

        Ok(SessionOutcome {
            command: self.config.program().to_owned(),
            status,
            transcript,
            time_taken: stopwatch.snapshot().duration,
        })
    }

    fn drive(
        &self,
        command: &str,
        script: &SessionScript,
        log: &mut LogSink,
        transcript: &mut String,
    ) -> Result<SessionStatus, DriveError> {
        let handle = ShellCommand::new(command, self.cwd, self.env)
            .spawn_reader(script.to_stdin())
            .map(Arc::new)
            .map_err(DriveError::Spawn)?;

        let (sender, receiver) = crossbeam_channel::unbounded();
        let reader_handle = Arc::clone(&handle);
        std::thread::Builder::new()
            .name("soaktest-session-reader".to_owned())
            .spawn(move || {
                let reader = BufReader::new(&*reader_handle);
                for line in reader.lines() {
                    match line {
                        Ok(line) => {
                            if sender.send(line).is_err() {
                                break;
                            }
                        }
                        Err(error) => {
                            debug!("session output ended: {error}");
                            break;
                        }
                    }
                }
            })
            .map_err(DriveError::Spawn)?;

        let timeout = self.config.timeout();
        let deadline = Instant::now() + timeout;
        let mut classifier = Classifier::default();
        let status = loop {
            match receiver.recv_deadline(deadline) {
                Ok(line) => {
                    log.record(&line).map_err(DriveError::Log)?;
                    transcript.push_str(&line);
                    transcript.push('\n');
                    if let Some(status) = classifier.observe(&line, self.config, self.mismatch) {
                        break status;
                    }
                }
                Err(RecvTimeoutError::Timeout) => break SessionStatus::TimedOut { timeout },
                Err(RecvTimeoutError::Disconnected) => break classifier.finish(),
            }
        };

        // The session is done with, whether it ended by itself or not.
        if let Err(error) = handle.kill() {
            warn!("failed to kill simulator session: {error}");
        }
        Ok(status)
    }
}

enum DriveError {
    Spawn(std::io::Error),
    Log(LogSinkError),
}

#[derive(Debug, Default)]
struct Classifier {
    saw_error: bool,
    saw_mismatch: bool,
}

impl Classifier {
    fn observe(
        &mut self,
        line: &str,
        config: &SessionConfig,
        mismatch: &str,
    ) -> Option<SessionStatus> {
        if line.contains(config.load_error()) {
            return Some(SessionStatus::LoadError);
        }
        // Mismatches are reported on error lines too, so check for them first.
        if line.contains(mismatch) {
            self.saw_mismatch = true;
        } else if line.contains(config.error()) {
            self.saw_error = true;
        }
        line.contains(config.finished()).then(|| self.finish())
    }

    fn finish(&self) -> SessionStatus {
        if self.saw_mismatch {
            SessionStatus::LogicalMismatch
        } else if self.saw_error {
            SessionStatus::Errors
        } else {
            SessionStatus::Passed
        }
    }
}
