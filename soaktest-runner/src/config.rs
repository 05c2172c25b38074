// Copyright (c) The soaktest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration support for soaktest.
//!
//! Configuration is layered: the embedded [`SoaktestConfig::DEFAULT_CONFIG`] is read first, then
//! the project's `.config/soaktest.toml` (or a file passed in explicitly) is merged on top.
//! Settings that vary per run live in `[profile.<name>]` tables; custom profiles fall back
//! field-by-field to `[profile.default]`.

mod elements;
mod imp;

pub use elements::*;
pub use imp::*;
