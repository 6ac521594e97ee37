// Copyright (c) The resched Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Sinks that tests report their outcomes to.

use crate::{
    errors::{DisplayErrorChain, ResourceError, TestError},
    test_case::{TestCase, TestFailure},
};

/// Receives notifications about running tests.
///
/// Each test reports `start_test`, then any number of `add_error` and
/// `add_failure` calls or a single `add_success`, then `stop_test`.
pub trait TestResult {
    /// Called when a test is about to run.
    fn start_test(&mut self, test: &dyn TestCase);

    /// Called when a test hit an error: its resources could not be set up or
    /// torn down, or its body returned an error.
    fn add_error(&mut self, test: &dyn TestCase, error: &TestError);

    /// Called when a test's body failed.
    fn add_failure(&mut self, test: &dyn TestCase, failure: &TestFailure);

    /// Called when a test completed without errors or failures.
    fn add_success(&mut self, test: &dyn TestCase);

    /// Called when a test has finished running.
    fn stop_test(&mut self, test: &dyn TestCase) {
        let _ = test;
    }

    /// Called when a resource held by the suite between tests could not be
    /// released. These errors are reported after `last_test`, the last test
    /// that used the resource, has already finished.
    fn add_resource_error(&mut self, last_test: &str, error: &ResourceError) {
        let _ = (last_test, error);
    }

    /// Returns the number of tests started so far.
    fn tests_run(&self) -> usize;
}

/// An error or failure recorded against a test.
///
/// For resource errors, `test_name` is the last test that used the resource.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RecordedOutcome {
    /// The name of the test.
    pub test_name: String,

    /// The rendered error or failure, including its chain of causes.
    pub message: String,
}

/// Statistics about a run.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct RunStats {
    /// The number of tests that were started.
    pub tests_run: usize,

    /// The number of tests that succeeded.
    pub passed: usize,

    /// The number of failures recorded.
    pub failed: usize,

    /// The number of errors recorded, including resource errors that do not
    /// belong to any one test.
    pub errored: usize,
}

impl RunStats {
    /// Returns true if every test that ran succeeded and no errors were
    /// recorded.
    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.errored == 0 && self.passed == self.tests_run
    }
}

/// A [`TestResult`] that records everything it is told.
#[derive(Clone, Debug, Default)]
pub struct CollectingResult {
    started: Vec<String>,
    successes: Vec<String>,
    errors: Vec<RecordedOutcome>,
    failures: Vec<RecordedOutcome>,
    resource_errors: Vec<RecordedOutcome>,
}

impl CollectingResult {
    /// Creates a new, empty result.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the names of started tests, in the order they started.
    pub fn started(&self) -> &[String] {
        &self.started
    }

    /// Returns the names of tests that succeeded, in order.
    pub fn successes(&self) -> &[String] {
        &self.successes
    }

    /// Returns the recorded errors, in order.
    pub fn errors(&self) -> &[RecordedOutcome] {
        &self.errors
    }

    /// Returns the recorded failures, in order.
    pub fn failures(&self) -> &[RecordedOutcome] {
        &self.failures
    }

    /// Returns the errors releasing resources held between tests, in order.
    pub fn resource_errors(&self) -> &[RecordedOutcome] {
        &self.resource_errors
    }

    /// Returns statistics about the run so far.
    pub fn stats(&self) -> RunStats {
        RunStats {
            tests_run: self.started.len(),
            passed: self.successes.len(),
            failed: self.failures.len(),
            errored: self.errors.len() + self.resource_errors.len(),
        }
    }

    /// Returns true if the run so far was successful.
    pub fn was_successful(&self) -> bool {
        self.stats().is_success()
    }
}

impl TestResult for CollectingResult {
    fn start_test(&mut self, test: &dyn TestCase) {
        self.started.push(test.name().to_owned());
    }

    fn add_error(&mut self, test: &dyn TestCase, error: &TestError) {
        self.errors.push(RecordedOutcome {
            test_name: test.name().to_owned(),
            message: DisplayErrorChain::new(error).to_string(),
        });
    }

    fn add_failure(&mut self, test: &dyn TestCase, failure: &TestFailure) {
        self.failures.push(RecordedOutcome {
            test_name: test.name().to_owned(),
            message: failure.to_string(),
        });
    }

    fn add_success(&mut self, test: &dyn TestCase) {
        self.successes.push(test.name().to_owned());
    }

    fn add_resource_error(&mut self, last_test: &str, error: &ResourceError) {
        self.resource_errors.push(RecordedOutcome {
            test_name: last_test.to_owned(),
            message: DisplayErrorChain::new(error).to_string(),
        });
    }

    fn tests_run(&self) -> usize {
        self.started.len()
    }
}
