// Copyright (c) The resched Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Suites that order their tests by resource sharing and run them.
//!
//! An [`OptimizingSuite`] keeps a flat list of tests. Nested [`TestSuite`]s
//! added to it are flattened in place, so that one sort covers every test.
//! Running the suite builds a [`SharingGraph`] over the tests, asks the
//! [`Scheduler`] for an [`ExecutionPlan`] and runs each test once in that order.

mod pins;

pub use pins::ResourcePins;

use crate::{
    config::SuiteConfig,
    errors::TestError,
    graph::SharingGraph,
    helpers::plural,
    result::TestResult,
    scheduler::{ExecutionPlan, GreedyScheduler, Scheduler},
    stopwatch::StopwatchStart,
    test_case::{TestCase, TestFailure},
};
use std::{
    panic::{self, AssertUnwindSafe},
    time::{Duration, SystemTime},
};
use tracing::{debug, warn};

/// An entry in a [`TestSuite`]: a test or a nested suite.
#[derive(Debug)]
pub enum SuiteEntry {
    /// A single test.
    Case(Box<dyn TestCase>),

    /// A nested suite.
    Suite(TestSuite),
}

impl From<Box<dyn TestCase>> for SuiteEntry {
    fn from(test: Box<dyn TestCase>) -> Self {
        SuiteEntry::Case(test)
    }
}

impl From<TestSuite> for SuiteEntry {
    fn from(suite: TestSuite) -> Self {
        SuiteEntry::Suite(suite)
    }
}

/// A plain, possibly nested, collection of tests.
#[derive(Debug, Default)]
pub struct TestSuite {
    entries: Vec<SuiteEntry>,
}

impl TestSuite {
    /// Creates a new, empty suite.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a test to the end of the suite.
    pub fn add_test(&mut self, test: impl TestCase + 'static) {
        self.entries.push(SuiteEntry::Case(Box::new(test)));
    }

    /// Adds a nested suite to the end of the suite.
    pub fn add_suite(&mut self, suite: TestSuite) {
        self.entries.push(SuiteEntry::Suite(suite));
    }

    /// Returns the entries of this suite.
    pub fn entries(&self) -> &[SuiteEntry] {
        &self.entries
    }

    /// Returns the number of tests in this suite and every nested suite.
    pub fn count_tests(&self) -> usize {
        self.entries
            .iter()
            .map(|entry| match entry {
                SuiteEntry::Case(_) => 1,
                SuiteEntry::Suite(suite) => suite.count_tests(),
            })
            .sum()
    }

    /// Returns every test in this suite and its nested suites, depth first.
    pub fn into_tests(self) -> Vec<Box<dyn TestCase>> {
        let mut tests = Vec::new();
        flatten_into(self.entries, &mut tests);
        tests
    }
}

fn flatten_into(entries: Vec<SuiteEntry>, out: &mut Vec<Box<dyn TestCase>>) {
    for entry in entries {
        match entry {
            SuiteEntry::Case(test) => out.push(test),
            SuiteEntry::Suite(suite) => flatten_into(suite.entries, out),
        }
    }
}

/// Summary information about a completed run.
#[derive(Clone, Debug)]
pub struct RunSummary {
    /// The time at which the run started.
    pub start_time: SystemTime,

    /// The amount of time the run took.
    pub elapsed: Duration,

    /// The number of tests the suite ran.
    pub tests_run: usize,

    /// The estimated cost of making and cleaning resources in the order the
    /// tests ran.
    pub plan_cost: u64,
}

/// A suite that reorders its tests so that tests sharing resources run next
/// to each other.
#[derive(Debug)]
pub struct OptimizingSuite {
    tests: Vec<Box<dyn TestCase>>,
    scheduler: Box<dyn Scheduler>,
    retain_shared_resources: bool,
}

impl Default for OptimizingSuite {
    fn default() -> Self {
        Self::new()
    }
}

impl OptimizingSuite {
    /// Creates a new, empty suite that orders tests with a
    /// [`GreedyScheduler`] and keeps shared resources alive between tests.
    pub fn new() -> Self {
        Self {
            tests: Vec::new(),
            scheduler: Box::new(GreedyScheduler),
            retain_shared_resources: true,
        }
    }

    /// Creates a new, empty suite with the given settings.
    pub fn from_config(config: &SuiteConfig) -> Self {
        Self {
            tests: Vec::new(),
            scheduler: config.scheduler().build(),
            retain_shared_resources: config.retain_shared_resources(),
        }
    }

    /// Replaces the scheduler.
    pub fn with_scheduler(mut self, scheduler: impl Scheduler + 'static) -> Self {
        self.scheduler = Box::new(scheduler);
        self
    }

    /// Sets whether the suite keeps resources alive between adjacent tests
    /// that share them.
    ///
    /// If disabled, every test makes and cleans its resources on its own.
    pub fn with_retain_shared_resources(mut self, retain: bool) -> Self {
        self.retain_shared_resources = retain;
        self
    }

    /// Adds a test to the end of the suite.
    pub fn add_test(&mut self, test: impl TestCase + 'static) {
        self.tests.push(Box::new(test));
    }

    /// Adds a boxed test to the end of the suite.
    pub fn add_boxed_test(&mut self, test: Box<dyn TestCase>) {
        self.tests.push(test);
    }

    /// Adds every test in `entries` to the end of the suite, flattening
    /// nested suites in place.
    pub fn add_tests(&mut self, entries: impl IntoIterator<Item = SuiteEntry>) {
        for entry in entries {
            match entry {
                SuiteEntry::Case(test) => self.tests.push(test),
                SuiteEntry::Suite(suite) => self.add_suite(suite),
            }
        }
    }

    /// Adds every test in `suite` and its nested suites to the end of this
    /// suite, as individual tests.
    pub fn add_suite(&mut self, suite: TestSuite) {
        self.tests.extend(suite.into_tests());
    }

    /// Returns the number of tests in the suite.
    pub fn len(&self) -> usize {
        self.tests.len()
    }

    /// Returns true if the suite has no tests.
    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }

    /// Iterates over the tests in the order they were added.
    pub fn tests(&self) -> impl ExactSizeIterator<Item = &dyn TestCase> {
        self.tests.iter().map(|test| test.as_ref())
    }

    /// Builds the sharing graph over the suite's tests.
    pub fn sharing_graph(&self) -> SharingGraph {
        SharingGraph::build(&self.tests)
    }

    /// Computes the order to run the tests in.
    ///
    /// This calls the scheduler once. If the scheduler returns a plan that
    /// doesn't run every test exactly once, the suite falls back to running
    /// tests in the order they were added.
    pub fn plan(&mut self) -> ExecutionPlan {
        let graph = self.sharing_graph();
        self.plan_with(&graph)
    }

    /// Runs every test once, in the order computed by [`Self::plan`], and
    /// reports the outcomes to `result`.
    ///
    /// The run continues past test errors and failures.
    pub fn run(&mut self, result: &mut dyn TestResult) -> RunSummary {
        let graph = self.sharing_graph();
        let plan = self.plan_with(&graph);
        let stopwatch = StopwatchStart::now();

        let mut pins = self.retain_shared_resources.then(ResourcePins::new);
        for index in plan.iter() {
            let test = self.tests[index].as_ref();

            if let Some(pins) = &mut pins {
                if let Err(error) = pins.switch(test.name(), test.resources(), result) {
                    debug!(test = test.name(), "could not pin resources: {error}");
                    result.start_test(test);
                    result.add_error(test, &TestError::SetUp(error));
                    result.stop_test(test);
                    continue;
                }
            }

            run_one(test, result);
        }
        if let Some(pins) = &mut pins {
            pins.release_all(result);
        }

        let end = stopwatch.end();
        debug!(
            "ran {} {} in {:.3}s",
            plan.len(),
            plural::tests_str(plan.len()),
            end.duration.as_secs_f64(),
        );
        RunSummary {
            start_time: end.start_time,
            elapsed: end.duration,
            tests_run: plan.len(),
            plan_cost: graph.plan_cost(plan.order()),
        }
    }

    fn plan_with(&mut self, graph: &SharingGraph) -> ExecutionPlan {
        let plan = self.scheduler.sort_tests(graph);
        let plan = if plan.is_permutation_of(self.tests.len()) {
            plan
        } else {
            warn!(
                scheduler = ?self.scheduler,
                "scheduler returned an invalid plan for {} {}, running in insertion order",
                self.tests.len(),
                plural::tests_str(self.tests.len()),
            );
            ExecutionPlan::insertion_order(self.tests.len())
        };

        let insertion_order = ExecutionPlan::insertion_order(self.tests.len());
        debug!(
            planned_cost = graph.plan_cost(plan.order()),
            insertion_order_cost = graph.plan_cost(insertion_order.order()),
            "planned {} {}",
            plan.len(),
            plural::tests_str(plan.len()),
        );
        plan
    }
}

fn run_one(test: &dyn TestCase, result: &mut dyn TestResult) {
    let stopwatch = StopwatchStart::now();
    // A panic escaping `run` counts as a failure of that test.
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| test.run(result))) {
        let failure = TestFailure::from_panic(&*payload);
        warn!(test = test.name(), "test panicked outside its body: {}", failure.message());
        result.add_failure(test, &failure);
        result.stop_test(test);
    }
    debug!(
        test = test.name(),
        elapsed = ?stopwatch.elapsed(),
        "finished test",
    );
}
