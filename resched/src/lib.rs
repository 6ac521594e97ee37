// Copyright (c) The resched Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Resource-aware ordering and execution of test suites.
//!
//! Tests declare the expensive fixtures ("resources") they need as an ordered
//! list of local names and [`ResourceManager`](resource::ResourceManager)s. An
//! [`OptimizingSuite`](suite::OptimizingSuite) builds a
//! [`SharingGraph`](graph::SharingGraph) over its tests, asks a
//! [`Scheduler`](scheduler::Scheduler) for an order that keeps tests sharing
//! managers adjacent, and then runs the tests in that order so that each
//! manager's cached instance is reused instead of being rebuilt.
//!
//! The basic flow is:
//!
//! 1. Create managers from [`ResourceLifecycle`](resource::ResourceLifecycle)
//!    implementations and share them between tests with `Arc`.
//! 2. Declare them on tests through a [`ResourceSet`](resource::ResourceSet).
//! 3. Add the tests to an `OptimizingSuite` and call
//!    [`run`](suite::OptimizingSuite::run) with a
//!    [`TestResult`](result::TestResult) sink.

pub mod config;
pub mod errors;
pub mod graph;
mod helpers;
pub mod resource;
pub mod result;
pub mod scheduler;
mod stopwatch;
pub mod suite;
pub mod test_case;
#[cfg(test)]
mod test_helpers;
