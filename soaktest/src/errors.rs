// Copyright (c) The soaktest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::output::NO_HEADING_TARGET;
use camino::Utf8PathBuf;
use soaktest_metadata::SoaktestExitCode;
use soaktest_runner::errors::*;
use std::error::Error;
use thiserror::Error;
use tracing::error;

pub(crate) type Result<T, E = ExpectedError> = std::result::Result<T, E>;

// The #[error()] strings are placeholders: errors are expected to be printed with
// display_to_stderr.

/// An expected failure: bad input, an unusable environment, or failing tests.
#[derive(Debug, Error)]
#[doc(hidden)]
pub enum ExpectedError {
    #[error("could not determine the project root")]
    ProjectRootInvalid {
        path: Option<Utf8PathBuf>,
        #[source]
        err: std::io::Error,
    },
    #[error("config parse error")]
    ConfigParseError {
        #[from]
        err: ConfigParseError,
    },
    #[error("profile not found")]
    ProfileNotFound {
        #[from]
        err: ProfileNotFound,
    },
    #[error("batch setup error")]
    BatchSetupError {
        #[source]
        err: BatchError,
    },
    #[error("batch aborted")]
    BatchAborted {
        #[source]
        err: BatchError,
    },
    #[error("ledger read error")]
    LedgerReadError {
        #[source]
        err: LedgerError,
    },
    #[error("error writing event")]
    WriteEventError {
        #[from]
        err: WriteEventError,
    },
    #[error("error writing output")]
    WriteOutputError {
        #[source]
        err: std::io::Error,
    },
    #[error("error serializing summary")]
    SerializeSummaryError {
        #[source]
        err: serde_json::Error,
    },
    #[error("test run failed")]
    TestRunFailed,
}

impl ExpectedError {
    pub(crate) fn batch_setup(err: BatchError) -> Self {
        Self::BatchSetupError { err }
    }

    pub(crate) fn ledger_read(err: LedgerError) -> Self {
        Self::LedgerReadError { err }
    }

    pub(crate) fn write_output(err: std::io::Error) -> Self {
        Self::WriteOutputError { err }
    }

    /// Returns the exit code for the process.
    pub fn process_exit_code(&self) -> i32 {
        match self {
            Self::ProjectRootInvalid { .. }
            | Self::ConfigParseError { .. }
            | Self::ProfileNotFound { .. }
            | Self::BatchSetupError { .. } => SoaktestExitCode::SETUP_ERROR,
            Self::BatchAborted { .. } => SoaktestExitCode::BATCH_ABORTED,
            Self::LedgerReadError { .. } => SoaktestExitCode::LEDGER_READ_FAILED,
            Self::WriteEventError { .. }
            | Self::WriteOutputError { .. }
            | Self::SerializeSummaryError { .. } => SoaktestExitCode::WRITE_OUTPUT_ERROR,
            Self::TestRunFailed => SoaktestExitCode::TEST_RUN_FAILED,
        }
    }

    /// Displays this error to stderr.
    pub fn display_to_stderr(&self) {
        let mut next_error = match self {
            Self::ProjectRootInvalid { path, err } => {
                match path {
                    Some(path) => error!("project root `{path}` is not usable"),
                    None => error!("could not determine the current directory"),
                }
                Some(err as &dyn Error)
            }
            Self::ConfigParseError { err } => {
                error!("{err}");
                err.source()
            }
            Self::ProfileNotFound { err } => {
                error!("{err}");
                err.source()
            }
            Self::BatchSetupError { err } => {
                error!("failed to set up batch");
                Some(err as &dyn Error)
            }
            Self::BatchAborted { err } => {
                error!("batch aborted, rerun without --start-clean to resume");
                Some(err as &dyn Error)
            }
            Self::LedgerReadError { err } => {
                error!("failed to read result ledger");
                Some(err as &dyn Error)
            }
            Self::WriteEventError { err } => {
                error!("failed to write event to output");
                Some(err as &dyn Error)
            }
            Self::WriteOutputError { err } => {
                error!("failed to write to output");
                Some(err as &dyn Error)
            }
            Self::SerializeSummaryError { err } => {
                error!("failed to serialize summary");
                Some(err as &dyn Error)
            }
            Self::TestRunFailed => {
                error!("test run failed");
                None
            }
        };

        while let Some(err) = next_error {
            error!(target: NO_HEADING_TARGET, "\nCaused by:\n  {}", err);
            next_error = err.source();
        }
    }
}

// A batch error surfacing while the batch runs means it was aborted partway.
impl From<BatchError> for ExpectedError {
    fn from(err: BatchError) -> Self {
        Self::BatchAborted { err }
    }
}

impl From<serde_json::Error> for ExpectedError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializeSummaryError { err }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes() {
        assert_eq!(
            ExpectedError::TestRunFailed.process_exit_code(),
            SoaktestExitCode::TEST_RUN_FAILED
        );
        let io_err = || std::io::Error::other("disk full");
        assert_eq!(
            ExpectedError::from(BatchError::LogSink(LogSinkError::Write {
                path: "soaktest.full.log".into(),
                err: io_err(),
            }))
            .process_exit_code(),
            SoaktestExitCode::BATCH_ABORTED
        );
        assert_eq!(
            ExpectedError::batch_setup(BatchError::StoreDirCreate {
                store_dir: "target/soaktest/default".into(),
                err: io_err(),
            })
            .process_exit_code(),
            SoaktestExitCode::SETUP_ERROR
        );
        assert_eq!(
            ExpectedError::write_output(io_err()).process_exit_code(),
            SoaktestExitCode::WRITE_OUTPUT_ERROR
        );
    }
}
