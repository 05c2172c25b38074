// Copyright (c) The soaktest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Core functionality for soaktest, a regression-test orchestrator for HDL code generators.
//!
//! A batch reads test definition files, runs every surviving line through the generator and a
//! three-stage toolchain (analyze, elaborate, run), and records one result per test in a ledger
//! that survives interruptions. The flow of a single batch is:
//!
//! 1. [`config`] loads the layered configuration and resolves a profile.
//! 2. [`list`] discovers test definition files and classifies their lines.
//! 3. [`runner`] drives each line through [`driver`], consulting [`progress`] to decide what to
//!    skip and appending each result to the [`ledger`].
//! 4. [`reporter`] turns the events emitted along the way into terminal output, JUnit XML and the
//!    final pass/fail table.

pub mod config;
pub mod driver;
pub mod errors;
pub mod extract;
mod helpers;
pub mod ledger;
pub mod list;
pub mod log_sink;
pub mod progress;
pub mod reporter;
pub mod runner;
pub mod stage;
mod stopwatch;
mod test_command;
