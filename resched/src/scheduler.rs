// Copyright (c) The resched Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scheduling tests so that tests sharing resources run next to each other.
//!
//! Finding the order that maximizes sharing between adjacent tests is a
//! maximum-weight Hamiltonian path problem, so the default [`GreedyScheduler`]
//! settles for a deterministic greedy walk over the [`SharingGraph`]. Custom
//! policies implement [`Scheduler`] and are handed to the suite in place of the
//! built-in ones.

use crate::{errors::SchedulerBuilderParseError, graph::SharingGraph};
use serde::Deserialize;
use std::{fmt, str::FromStr};
use tracing::debug;

/// The order in which a suite runs its tests, as indexes into the suite's
/// list of tests.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ExecutionPlan {
    order: Vec<usize>,
}

impl ExecutionPlan {
    /// Creates a new plan from an order.
    pub fn new(order: Vec<usize>) -> Self {
        Self { order }
    }

    /// Returns the plan that runs `count` tests in the order they were added.
    pub fn insertion_order(count: usize) -> Self {
        Self::new((0..count).collect())
    }

    /// Returns the order of test indexes.
    pub fn order(&self) -> &[usize] {
        &self.order
    }

    /// Returns the number of tests in the plan.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Returns true if the plan runs no tests.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Iterates over the test indexes in order.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = usize> + '_ {
        self.order.iter().copied()
    }

    /// Returns true if the plan runs each of the tests `0..count` exactly once.
    pub fn is_permutation_of(&self, count: usize) -> bool {
        if self.order.len() != count {
            return false;
        }
        let mut seen = vec![false; count];
        self.order
            .iter()
            .all(|&index| index < count && !std::mem::replace(&mut seen[index], true))
    }
}

/// A policy for ordering a suite's tests.
///
/// A suite calls `sort_tests` exactly once per run, before any test starts.
pub trait Scheduler: fmt::Debug {
    /// Returns the order to run the tests described by `graph` in.
    ///
    /// The returned plan should contain every test index in
    /// `0..graph.test_count()` exactly once. Suites replace invalid plans with
    /// insertion order.
    fn sort_tests(&mut self, graph: &SharingGraph) -> ExecutionPlan;
}

/// A builder for the built-in schedulers.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "kebab-case")]
#[non_exhaustive]
pub enum SchedulerBuilder {
    /// Order tests with [`GreedyScheduler`].
    #[default]
    Greedy,

    /// Run tests in the order they were added.
    InsertionOrder,
}

impl SchedulerBuilder {
    /// Returns the names of the built-in schedulers, as accepted by
    /// [`FromStr`].
    pub fn variants() -> &'static [&'static str] {
        &["greedy", "insertion-order"]
    }

    /// Creates a new scheduler.
    pub fn build(&self) -> Box<dyn Scheduler> {
        match self {
            SchedulerBuilder::Greedy => Box::new(GreedyScheduler),
            SchedulerBuilder::InsertionOrder => Box::new(InsertionOrderScheduler),
        }
    }
}

impl FromStr for SchedulerBuilder {
    type Err = SchedulerBuilderParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "greedy" => Ok(SchedulerBuilder::Greedy),
            "insertion-order" => Ok(SchedulerBuilder::InsertionOrder),
            other => Err(SchedulerBuilderParseError::new(other)),
        }
    }
}

impl fmt::Display for SchedulerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedulerBuilder::Greedy => write!(f, "greedy"),
            SchedulerBuilder::InsertionOrder => write!(f, "insertion-order"),
        }
    }
}

/// Keeps tests that share the most resources next to each other.
///
/// Starting from the first test with resources, the scheduler repeatedly
/// places the unplaced test sharing the most managers with the last placed
/// test, preferring earlier tests on ties. When nothing left shares a manager
/// with the last placed test, it continues with the earliest unplaced test.
/// Tests without resources follow in the order they were added.
#[derive(Clone, Copy, Debug, Default)]
pub struct GreedyScheduler;

impl Scheduler for GreedyScheduler {
    fn sort_tests(&mut self, graph: &SharingGraph) -> ExecutionPlan {
        let resourced: Vec<usize> = graph.resourced().map(|node| node.index()).collect();
        let mut placed = vec![false; graph.test_count()];
        let mut order = Vec::with_capacity(graph.test_count());

        // Everything before `cursor` in `resourced` has been placed.
        let mut cursor = 0;
        let mut endpoint = None;
        while order.len() < resourced.len() {
            let next = endpoint
                .and_then(|endpoint| best_neighbor(graph, endpoint, &placed))
                .unwrap_or_else(|| {
                    while placed[resourced[cursor]] {
                        cursor += 1;
                    }
                    resourced[cursor]
                });
            placed[next] = true;
            order.push(next);
            endpoint = Some(next);
        }

        order.extend_from_slice(graph.legacy());
        debug!(
            "greedy scheduler placed {} resourced and {} legacy tests",
            resourced.len(),
            graph.legacy().len(),
        );
        ExecutionPlan::new(order)
    }
}

/// Returns the unplaced test sharing the most managers with `endpoint`,
/// preferring the lowest index on ties.
fn best_neighbor(graph: &SharingGraph, endpoint: usize, placed: &[bool]) -> Option<usize> {
    graph
        .neighbors(endpoint)
        .filter(|&(index, weight)| weight > 0 && !placed[index])
        .max_by(|(a_index, a_weight), (b_index, b_weight)| {
            a_weight.cmp(b_weight).then(b_index.cmp(a_index))
        })
        .map(|(index, _)| index)
}

/// Runs tests in the order they were added.
#[derive(Clone, Copy, Debug, Default)]
pub struct InsertionOrderScheduler;

impl Scheduler for InsertionOrderScheduler {
    fn sort_tests(&mut self, graph: &SharingGraph) -> ExecutionPlan {
        ExecutionPlan::insertion_order(graph.test_count())
    }
}
