// Copyright (c) The resched Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::fixtures::*;
use color_eyre::eyre::{Result, ensure};
use pretty_assertions::assert_eq;
use resched::{
    errors::BoxError,
    resource::{ResourceManager, ResourceSet},
    result::{CollectingResult, TestResult},
    suite::OptimizingSuite,
    test_case::FnTest,
};
use std::sync::Arc;
use test_case::test_case;

#[test]
fn construction_failure_is_local_and_retried() -> Result<()> {
    test_init();
    let log = EventLog::new();
    let db = Arc::new(
        ResourceManager::new(ConnectionLifecycle::new("db", &log).failing_first(1)).with_name("db"),
    );

    let mut suite = OptimizingSuite::new();
    suite.add_boxed_test(connection_test("first", &[&db]));
    suite.add_boxed_test(connection_test("second", &[&db]));

    let mut result = CollectingResult::new();
    suite.run(&mut result);

    ensure!(result.errors().len() == 1, "one error: {result:?}");
    assert_eq!(result.errors()[0].test_name, "first");
    assert_eq!(result.successes(), ["second"]);
    assert_eq!(log.events(), ["make db failed", "make db", "clean db"]);
    assert_eq!(db.uses(), 0);
    Ok(())
}

#[test]
fn construction_failure_without_retention() {
    test_init();
    let log = EventLog::new();
    let db = Arc::new(
        ResourceManager::new(ConnectionLifecycle::new("db", &log).failing_first(1)).with_name("db"),
    );

    let mut suite = OptimizingSuite::new().with_retain_shared_resources(false);
    suite.add_boxed_test(connection_test("first", &[&db]));
    suite.add_boxed_test(connection_test("second", &[&db]));

    let mut result = CollectingResult::new();
    suite.run(&mut result);

    assert_eq!(result.errors().len(), 1);
    assert_eq!(result.errors()[0].test_name, "first");
    assert!(
        result.errors()[0].message.contains("connection to db refused"),
        "cause is rendered: {}",
        result.errors()[0].message,
    );
    assert_eq!(result.successes(), ["second"]);
}

#[test]
fn failing_tests_do_not_leak_resources() {
    test_init();
    let log = EventLog::new();
    let db = connection_manager("db", &log);

    let mut suite = OptimizingSuite::new();
    suite.add_test(
        FnTest::new("asserts", |_| -> Result<(), BoxError> {
            panic!("assertion failed")
        })
        .with_resources(ResourceSet::new().with("db", Arc::clone(&db))),
    );
    suite.add_test(
        FnTest::new("errors", |_| Err("body error".into()))
            .with_resources(ResourceSet::new().with("db", Arc::clone(&db))),
    );
    suite.add_boxed_test(connection_test("passes", &[&db]));

    let mut result = CollectingResult::new();
    suite.run(&mut result);

    assert_eq!(result.tests_run(), 3);
    assert_eq!(result.failures().len(), 1);
    assert_eq!(result.errors().len(), 1);
    assert_eq!(result.successes(), ["passes"]);
    assert_eq!(log.events(), ["make db", "clean db"]);
    assert_eq!(db.uses(), 0);
}

#[test]
fn duplicate_names_error_only_that_test() {
    test_init();
    let log = EventLog::new();
    let db = connection_manager("db", &log);

    let mut suite = OptimizingSuite::new();
    suite.add_test(
        FnTest::new("duplicated", |_| Ok(())).with_resources(
            ResourceSet::new()
                .with("db", Arc::clone(&db))
                .with("db", Arc::clone(&db)),
        ),
    );
    suite.add_boxed_test(connection_test("fine", &[&db]));

    let mut result = CollectingResult::new();
    suite.run(&mut result);

    assert_eq!(result.errors().len(), 1);
    assert_eq!(result.errors()[0].test_name, "duplicated");
    assert!(result.errors()[0].message.contains("declared more than once"));
    assert_eq!(result.successes(), ["fine"]);
}

#[test_case(true; "retained")]
#[test_case(false; "not retained")]
fn clean_failure_is_reported_once(retain: bool) {
    test_init();
    let log = EventLog::new();
    let sticky = Arc::new(
        ResourceManager::new(ConnectionLifecycle::new("sticky", &log).failing_clean())
            .with_name("sticky"),
    );
    let other = connection_manager("other", &log);

    let mut suite = OptimizingSuite::new().with_retain_shared_resources(retain);
    suite.add_boxed_test(connection_test("a", &[&sticky]));
    suite.add_boxed_test(connection_test("b", &[&other]));

    let mut result = CollectingResult::new();
    suite.run(&mut result);

    assert_eq!(result.started(), ["a", "b"]);
    assert_eq!(
        log.events(),
        ["make sticky", "clean sticky", "make other", "clean other"]
    );
    assert_eq!(sticky.uses(), 0);
    assert!(!sticky.is_built());
    assert!(!result.was_successful());

    let (recorded, message) = if retain {
        // The suite held the connection past the test, so the failure shows
        // up when the suite lets go of it, against the test that last used it.
        assert!(result.errors().is_empty(), "{result:?}");
        assert_eq!(result.resource_errors().len(), 1, "{result:?}");
        assert_eq!(result.successes(), ["a", "b"]);
        (&result.resource_errors()[0], "failed to clean resource `sticky`")
    } else {
        assert!(result.resource_errors().is_empty(), "{result:?}");
        assert_eq!(result.errors().len(), 1, "{result:?}");
        assert_eq!(result.successes(), ["b"]);
        (
            &result.errors()[0],
            "error releasing resource `sticky` after test",
        )
    };
    assert_eq!(recorded.test_name, "a");
    assert!(recorded.message.contains(message), "{}", recorded.message);
    assert!(
        recorded.message.contains("connection to sticky hung up"),
        "cause is rendered: {}",
        recorded.message,
    );
}
