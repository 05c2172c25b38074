// Copyright (c) The soaktest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A crash-resumable regression-test orchestrator for HDL code generators.
//!
//! soaktest reads test definition files, runs each line through a code generator and an
//! analyze/elaborate/run toolchain, and keeps a result ledger that survives interruptions. The
//! library behind it is [`soaktest_runner`].

#![warn(missing_docs)]

mod dispatch;
mod errors;
mod output;

#[doc(hidden)]
pub use dispatch::*;
#[doc(hidden)]
pub use errors::*;
#[doc(hidden)]
pub use output::OutputWriter;
