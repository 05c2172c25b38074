// Copyright (c) The soaktest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end batches against a scripted generator and toolchain.

#![cfg(unix)]

mod basic;
mod fixtures;
mod resume;
