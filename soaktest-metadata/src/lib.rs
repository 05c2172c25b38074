// Copyright (c) The soaktest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Machine-readable data produced by soaktest.
//!
//! This crate holds the types other tools need to consume soaktest output: the per-test
//! [`TestResult`] row stored in the result ledger, the aggregated [`ReportSummary`] emitted by
//! `soaktest report --message-format json`, and the documented [`SoaktestExitCode`] values.

mod exit_codes;
mod results;

pub use exit_codes::*;
pub use results::*;
