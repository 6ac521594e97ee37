// Copyright (c) The resched Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::fixtures::*;
use camino_tempfile::tempdir;
use camino_tempfile_ext::prelude::*;
use color_eyre::eyre::Result;
use indoc::indoc;
use pretty_assertions::assert_eq;
use resched::{
    config::SuiteConfig, result::CollectingResult, scheduler::SchedulerBuilder,
    suite::OptimizingSuite,
};
use test_case::test_case;

#[test_case(
    indoc! {r#"
        scheduler = "insertion-order"
    "#},
    &["db_1", "cache_1", "db_2"],
    &["make db", "clean db", "make cache", "clean cache", "make db", "clean db"]
    ; "insertion order"
)]
#[test_case(
    "",
    &["db_1", "db_2", "cache_1"],
    &["make db", "clean db", "make cache", "clean cache"]
    ; "defaults"
)]
#[test_case(
    indoc! {r#"
        retain-shared-resources = false
    "#},
    &["db_1", "db_2", "cache_1"],
    &["make db", "clean db", "make db", "clean db", "make cache", "clean cache"]
    ; "without retention"
)]
fn workspace_config_drives_the_suite(
    contents: &str,
    expected_order: &[&str],
    expected_events: &[&str],
) -> Result<()> {
    test_init();
    let workspace = tempdir()?;
    workspace
        .child(SuiteConfig::CONFIG_PATH)
        .write_str(contents)?;
    let config = SuiteConfig::from_sources(workspace.path(), None)?;

    let log = EventLog::new();
    let db = connection_manager("db", &log);
    let cache = connection_manager("cache", &log);

    let mut suite = OptimizingSuite::from_config(&config);
    suite.add_boxed_test(connection_test("db_1", &[&db]));
    suite.add_boxed_test(connection_test("cache_1", &[&cache]));
    suite.add_boxed_test(connection_test("db_2", &[&db]));

    let mut result = CollectingResult::new();
    suite.run(&mut result);

    assert_eq!(result.started(), expected_order);
    assert_eq!(log.events(), expected_events);
    Ok(())
}

#[test]
fn unknown_scheduler_is_reported_with_the_file() -> Result<()> {
    let workspace = tempdir()?;
    let file = workspace.child("custom.toml");
    file.write_str("scheduler = \"fastest\"\n")?;
    let path = file.to_path_buf();

    let error = SuiteConfig::from_sources(workspace.path(), Some(&path)).unwrap_err();
    assert_eq!(error.config_file(), path.as_path());
    assert!(error.to_string().contains("custom.toml"));
    Ok(())
}

#[test]
fn scheduler_builder_parses_config_names() -> Result<()> {
    let builder: SchedulerBuilder = "insertion-order".parse()?;
    assert_eq!(
        SuiteConfig::default().with_scheduler(builder).scheduler(),
        SchedulerBuilder::InsertionOrder
    );
    Ok(())
}
