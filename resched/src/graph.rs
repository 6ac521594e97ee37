// Copyright (c) The resched Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The resource sharing graph over a list of tests.
//!
//! Every test that declares at least one resource becomes a node. Two nodes are
//! joined by an edge whose weight is the number of resource managers both tests
//! declare; pairs that share nothing have no edge. Tests without resources
//! ("legacy" tests) are kept out of the graph and listed separately in their
//! original order.
//!
//! Tests are identified by their index in the list the graph was built from.

use crate::{
    helpers::plural,
    resource::{ResourceCosts, ResourceId},
    test_case::TestCase,
};
use petgraph::{
    graph::{NodeIndex, UnGraph},
    visit::EdgeRef,
};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

static NO_RESOURCES: BTreeSet<ResourceId> = BTreeSet::new();

/// A test that declares resources.
#[derive(Clone, Debug)]
pub struct TestNode {
    index: usize,
    name: String,
    resources: BTreeSet<ResourceId>,
}

impl TestNode {
    /// Returns the index of the test in the list the graph was built from.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Returns the name of the test.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the identifiers of the managers the test declares.
    pub fn resources(&self) -> &BTreeSet<ResourceId> {
        &self.resources
    }
}

/// Which tests share resource managers, and how many.
#[derive(Clone, Debug)]
pub struct SharingGraph {
    // Nodes are added in test order, so node indexes sort the same way as test
    // indexes.
    graph: UnGraph<TestNode, usize>,
    nodes_by_test: Vec<Option<NodeIndex>>,
    legacy: Vec<usize>,
    costs: BTreeMap<ResourceId, ResourceCosts>,
}

impl SharingGraph {
    /// Builds the sharing graph for `tests`.
    ///
    /// This is a pure function of the tests' declarations.
    pub fn build(tests: &[Box<dyn TestCase>]) -> Self {
        let mut graph = UnGraph::with_capacity(tests.len(), 0);
        let mut nodes_by_test = Vec::with_capacity(tests.len());
        let mut legacy = Vec::new();
        let mut costs = BTreeMap::new();

        for (index, test) in tests.iter().enumerate() {
            match test.resources().filter(|set| !set.is_empty()) {
                Some(set) => {
                    for decl in set.iter() {
                        costs.insert(decl.manager().id(), decl.manager().costs());
                    }
                    let node = graph.add_node(TestNode {
                        index,
                        name: test.name().to_owned(),
                        resources: set.manager_ids(),
                    });
                    nodes_by_test.push(Some(node));
                }
                None => {
                    nodes_by_test.push(None);
                    legacy.push(index);
                }
            }
        }

        // Count shared managers by walking each manager's users rather than
        // intersecting every pair of tests.
        let mut users: BTreeMap<ResourceId, Vec<NodeIndex>> = BTreeMap::new();
        for node in graph.node_indices() {
            for &id in &graph[node].resources {
                users.entry(id).or_default().push(node);
            }
        }

        let mut weights: BTreeMap<(NodeIndex, NodeIndex), usize> = BTreeMap::new();
        for nodes in users.values() {
            for (i, &a) in nodes.iter().enumerate() {
                for &b in &nodes[i + 1..] {
                    *weights.entry((a, b)).or_default() += 1;
                }
            }
        }
        for ((a, b), weight) in weights {
            graph.add_edge(a, b, weight);
        }

        debug!(
            resourced = graph.node_count(),
            legacy = legacy.len(),
            edges = graph.edge_count(),
            "built sharing graph over {} {} and {} {}",
            tests.len(),
            plural::tests_str(tests.len()),
            costs.len(),
            plural::resources_str(costs.len()),
        );

        Self {
            graph,
            nodes_by_test,
            legacy,
            costs,
        }
    }

    /// Returns the total number of tests, resourced and legacy.
    pub fn test_count(&self) -> usize {
        self.nodes_by_test.len()
    }

    /// Returns the number of tests that declare resources.
    pub fn resourced_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Iterates over the tests that declare resources, in test order.
    pub fn resourced(&self) -> impl ExactSizeIterator<Item = &TestNode> {
        self.graph.node_indices().map(|node| &self.graph[node])
    }

    /// Returns the indexes of tests without resources, in test order.
    pub fn legacy(&self) -> &[usize] {
        &self.legacy
    }

    /// Returns the node for the test at `index`, or `None` if that test has no
    /// resources or doesn't exist.
    pub fn node(&self, index: usize) -> Option<&TestNode> {
        self.node_index(index).map(|node| &self.graph[node])
    }

    /// Returns the number of managers the tests at `a` and `b` both declare.
    ///
    /// Returns 0 if either test has no resources, and for `a == b`.
    pub fn weight(&self, a: usize, b: usize) -> usize {
        match (self.node_index(a), self.node_index(b)) {
            (Some(a), Some(b)) => self
                .graph
                .find_edge(a, b)
                .map_or(0, |edge| self.graph[edge]),
            _ => 0,
        }
    }

    /// Iterates over the tests that share at least one manager with the test at
    /// `index`, as `(test index, weight)` pairs in no particular order.
    pub fn neighbors(&self, index: usize) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.node_index(index).into_iter().flat_map(move |node| {
            self.graph.edges(node).map(move |edge| {
                let other = if edge.source() == node {
                    edge.target()
                } else {
                    edge.source()
                };
                (self.graph[other].index, *edge.weight())
            })
        })
    }

    /// Returns, for every resourced test, the tests it shares managers with
    /// and how many.
    pub fn to_weight_map(&self) -> BTreeMap<usize, BTreeMap<usize, usize>> {
        self.resourced()
            .map(|node| (node.index, self.neighbors(node.index).collect()))
            .collect()
    }

    /// Returns the estimated cost of switching from the resources held for the
    /// test at `from` to those needed by the test at `to`: cleaning everything
    /// `to` doesn't need and making everything `from` didn't have.
    pub fn switch_cost(&self, from: usize, to: usize) -> u64 {
        self.transition_cost(self.resources_of(from), self.resources_of(to))
    }

    /// Returns the estimated total cost of making and cleaning resources when
    /// running tests in `order`, with resources kept alive between adjacent
    /// tests that share them.
    pub fn plan_cost(&self, order: &[usize]) -> u64 {
        let mut held = &NO_RESOURCES;
        let mut cost = 0;
        for &index in order {
            let next = self.resources_of(index);
            cost += self.transition_cost(held, next);
            held = next;
        }
        cost + self.transition_cost(held, &NO_RESOURCES)
    }

    // ---
    // Helper methods
    // ---

    fn node_index(&self, index: usize) -> Option<NodeIndex> {
        self.nodes_by_test.get(index).copied().flatten()
    }

    fn resources_of(&self, index: usize) -> &BTreeSet<ResourceId> {
        self.node(index).map_or(&NO_RESOURCES, |node| &node.resources)
    }

    fn transition_cost(&self, held: &BTreeSet<ResourceId>, next: &BTreeSet<ResourceId>) -> u64 {
        let teardown: u64 = held
            .difference(next)
            .map(|id| self.cost_of(id).teardown)
            .sum();
        let setup: u64 = next
            .difference(held)
            .map(|id| self.cost_of(id).setup)
            .sum();
        teardown + setup
    }

    fn cost_of(&self, id: &ResourceId) -> ResourceCosts {
        self.costs.get(id).copied().unwrap_or_default()
    }
}
