// Copyright (c) The resched Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test cases and the resource contract they follow.
//!
//! A [`TestCase`] that declares resources must acquire every declared manager,
//! in order, before its body runs, and release them in reverse order afterwards
//! whether or not the body succeeded. [`run_test_case`] implements that
//! contract, and [`FnTest`] uses it for tests written as closures.

use crate::{
    errors::{BoxError, TestError},
    helpers::panic_message,
    resource::{BoundResources, ResourceSet},
    result::TestResult,
};
use debug_ignore::DebugIgnore;
use std::{
    any::Any,
    fmt,
    panic::{self, AssertUnwindSafe},
};
use tracing::debug;

/// A single test that can be run against a [`TestResult`].
pub trait TestCase {
    /// Returns the name of this test.
    fn name(&self) -> &str;

    /// Returns the resources this test declares.
    ///
    /// Tests that return `None` or an empty set are run as ordinary tests and
    /// are never considered for resource sharing.
    fn resources(&self) -> Option<&ResourceSet> {
        None
    }

    /// Runs the test, reporting its outcome to `result`.
    ///
    /// Implementations must call [`TestResult::start_test`] first and
    /// [`TestResult::stop_test`] last, and must not panic.
    fn run(&self, result: &mut dyn TestResult);
}

impl fmt::Debug for dyn TestCase + '_ {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestCase")
            .field("name", &self.name())
            .field("resources", &self.resources().map_or(0, ResourceSet::len))
            .finish()
    }
}

/// A test failure: the test body panicked, typically through a failed
/// assertion.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TestFailure {
    message: String,
}

impl TestFailure {
    /// Creates a new failure with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub(crate) fn from_panic(payload: &(dyn Any + Send)) -> Self {
        Self::new(panic_message(payload))
    }

    /// Returns the failure message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for TestFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "test failed: {}", self.message)
    }
}

/// Runs `body` for `test`, setting up and tearing down the test's declared
/// resources around it.
///
/// The outcome is reported to `result`:
///
/// * If the resources can't be set up, the body doesn't run and a
///   [`TestError::SetUp`] is recorded.
/// * If the body returns an error, a [`TestError::Body`] is recorded; if it
///   panics, a [`TestFailure`] is recorded.
/// * Every resource release that fails records a [`TestError::TearDown`].
/// * If nothing was recorded, the test succeeded.
pub fn run_test_case<F>(test: &dyn TestCase, body: F, result: &mut dyn TestResult)
where
    F: FnOnce(&BoundResources) -> Result<(), BoxError>,
{
    result.start_test(test);

    let resources = test.resources();
    let bound = match resources.map(ResourceSet::set_up).transpose() {
        Ok(bound) => bound.unwrap_or_default(),
        Err(error) => {
            debug!(test = test.name(), "resource set-up failed: {error}");
            result.add_error(test, &TestError::SetUp(error));
            result.stop_test(test);
            return;
        }
    };

    let mut succeeded = true;
    match panic::catch_unwind(AssertUnwindSafe(|| body(&bound))) {
        Ok(Ok(())) => {}
        Ok(Err(error)) => {
            succeeded = false;
            result.add_error(test, &TestError::Body(error));
        }
        Err(payload) => {
            succeeded = false;
            result.add_failure(test, &TestFailure::from_panic(&*payload));
        }
    }

    if let Some(resources) = resources {
        for (name, error) in resources.tear_down(bound) {
            succeeded = false;
            result.add_error(test, &TestError::TearDown { name, error });
        }
    }

    if succeeded {
        result.add_success(test);
    }
    result.stop_test(test);
}

/// A test whose body is a closure.
///
/// The closure receives the resources the test declared, bound under their
/// local names. Returning an error records a test error; panicking (for
/// example through `assert!`) records a test failure.
#[derive(Debug)]
pub struct FnTest<F> {
    name: String,
    resources: Option<ResourceSet>,
    body: DebugIgnore<F>,
}

impl<F> FnTest<F>
where
    F: Fn(&BoundResources) -> Result<(), BoxError>,
{
    /// Creates a new test without resources.
    pub fn new(name: impl Into<String>, body: F) -> Self {
        Self {
            name: name.into(),
            resources: None,
            body: DebugIgnore(body),
        }
    }

    /// Declares the resources this test uses.
    pub fn with_resources(mut self, resources: ResourceSet) -> Self {
        self.resources = Some(resources);
        self
    }
}

impl<F> TestCase for FnTest<F>
where
    F: Fn(&BoundResources) -> Result<(), BoxError>,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn resources(&self) -> Option<&ResourceSet> {
        self.resources.as_ref()
    }

    fn run(&self, result: &mut dyn TestResult) {
        run_test_case(self, |bound| (self.body.0)(bound), result);
    }
}
