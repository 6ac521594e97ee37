// Copyright (c) The resched Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::fixtures::*;
use pretty_assertions::assert_eq;
use resched::{
    result::CollectingResult,
    suite::{OptimizingSuite, SuiteEntry, TestSuite},
};
use test_case::test_case;

#[test_case(true, &["make db", "clean db"] ; "retained")]
#[test_case(false, &["make db", "clean db", "make db", "clean db"] ; "not retained")]
fn two_tests_on_one_manager(retain: bool, expected: &[&str]) {
    test_init();
    let log = EventLog::new();
    let db = connection_manager("db", &log);

    let mut suite = OptimizingSuite::new().with_retain_shared_resources(retain);
    suite.add_boxed_test(connection_test("first", &[&db]));
    suite.add_boxed_test(connection_test("second", &[&db]));

    let mut result = CollectingResult::new();
    suite.run(&mut result);

    assert!(result.was_successful(), "{result:?}");
    assert_eq!(log.events(), expected);
    assert_eq!(db.uses(), 0);
    assert!(!db.is_built());
}

#[test]
fn interleaved_tests_are_regrouped() {
    test_init();
    let log = EventLog::new();
    let db = connection_manager("db", &log);
    let cache = connection_manager("cache", &log);

    let mut suite = OptimizingSuite::new();
    suite.add_boxed_test(connection_test("db_1", &[&db]));
    suite.add_boxed_test(connection_test("cache_1", &[&cache]));
    suite.add_boxed_test(connection_test("db_2", &[&db]));
    suite.add_boxed_test(connection_test("cache_2", &[&cache]));

    let mut result = CollectingResult::new();
    suite.run(&mut result);

    assert_eq!(result.started(), ["db_1", "db_2", "cache_1", "cache_2"]);
    assert_eq!(
        log.events(),
        ["make db", "clean db", "make cache", "clean cache"]
    );
}

#[test]
fn nested_suites_are_sorted_globally() {
    test_init();
    let log = EventLog::new();
    let db = connection_manager("db", &log);

    let mut first = TestSuite::new();
    first.add_test(resched::test_case::FnTest::new("unrelated", |_| Ok(())));
    let mut second = TestSuite::new();
    second.add_suite(first);

    let mut suite = OptimizingSuite::new();
    suite.add_tests([
        SuiteEntry::from(connection_test("db_outer", &[&db])),
        SuiteEntry::from(second),
        SuiteEntry::from(connection_test("db_inner", &[&db])),
    ]);
    assert_eq!(suite.len(), 3);

    let mut result = CollectingResult::new();
    suite.run(&mut result);

    assert_eq!(result.started(), ["db_outer", "db_inner", "unrelated"]);
    assert_eq!(log.events(), ["make db", "clean db"]);
}

#[test]
fn legacy_tests_never_touch_managers() {
    test_init();
    let log = EventLog::new();

    let mut suite = OptimizingSuite::new();
    suite.add_boxed_test(plain_test("one"));
    suite.add_boxed_test(plain_test("two"));

    let mut result = CollectingResult::new();
    suite.run(&mut result);

    assert_eq!(result.successes(), ["one", "two"]);
    assert!(log.events().is_empty());
}
