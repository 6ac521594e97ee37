// Copyright (c) The resched Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for resched.
//!
//! These tests drive suites through the public API only, with lifecycles that
//! record every make and clean into a shared event log.

mod config;
mod failures;
mod sharing;
