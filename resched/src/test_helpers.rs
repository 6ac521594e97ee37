// Copyright (c) The resched Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Lifecycles and tests shared by unit tests.

use crate::{
    errors::BoxError,
    resource::{ResourceLifecycle, ResourceManager, ResourceSet},
    test_case::{FnTest, TestCase},
};
use std::{
    io,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};
use tracing::Level;

/// Makes numbered strings and records which ones were cleaned.
#[derive(Debug)]
pub(crate) struct CountingLifecycle {
    prefix: &'static str,
    makes: AtomicUsize,
    cleaned: Mutex<Vec<String>>,
}

impl CountingLifecycle {
    pub(crate) fn new(prefix: &'static str) -> Self {
        Self {
            prefix,
            makes: AtomicUsize::new(0),
            cleaned: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn cleaned(&self) -> Vec<String> {
        self.cleaned.lock().unwrap().clone()
    }
}

impl ResourceLifecycle for CountingLifecycle {
    type Resource = String;

    fn make(&self) -> Result<String, BoxError> {
        let n = self.makes.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("{}-{n}", self.prefix))
    }

    fn clean(&self, resource: &String) -> Result<(), BoxError> {
        self.cleaned.lock().unwrap().push(resource.clone());
        Ok(())
    }
}

#[derive(Clone, Copy, Debug)]
enum Flakiness {
    FailFirst(usize),
    FailAttempt(usize),
    Panic,
    FailClean,
}

/// A lifecycle whose hooks fail in configurable ways.
#[derive(Debug)]
pub(crate) struct FlakyLifecycle {
    flakiness: Flakiness,
    attempts: AtomicUsize,
}

impl FlakyLifecycle {
    /// Fails the first `count` make attempts.
    pub(crate) fn failing_first(count: usize) -> Self {
        Self::with(Flakiness::FailFirst(count))
    }

    /// Fails only the make attempt numbered `attempt`, counting from 1.
    pub(crate) fn failing_attempt(attempt: usize) -> Self {
        Self::with(Flakiness::FailAttempt(attempt))
    }

    /// Panics on every make attempt.
    pub(crate) fn panicking() -> Self {
        Self::with(Flakiness::Panic)
    }

    /// Makes successfully but fails every clean.
    pub(crate) fn failing_clean() -> Self {
        Self::with(Flakiness::FailClean)
    }

    pub(crate) fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    fn with(flakiness: Flakiness) -> Self {
        Self {
            flakiness,
            attempts: AtomicUsize::new(0),
        }
    }
}

impl ResourceLifecycle for FlakyLifecycle {
    type Resource = usize;

    fn make(&self) -> Result<usize, BoxError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        match self.flakiness {
            Flakiness::FailFirst(count) if attempt <= count => {
                Err(format!("attempt {attempt} failed").into())
            }
            Flakiness::FailAttempt(failing) if attempt == failing => {
                Err(format!("attempt {attempt} failed").into())
            }
            Flakiness::Panic => panic!("make exploded"),
            _ => Ok(attempt),
        }
    }

    fn clean(&self, _resource: &usize) -> Result<(), BoxError> {
        match self.flakiness {
            Flakiness::FailClean => Err("clean failed".into()),
            _ => Ok(()),
        }
    }
}

pub(crate) fn counting_manager(name: &'static str) -> Arc<ResourceManager<CountingLifecycle>> {
    Arc::new(ResourceManager::new(CountingLifecycle::new(name)).with_name(name))
}

/// A passing test that declares the given managers under their own names.
pub(crate) fn resourced_test(
    name: &str,
    managers: &[&Arc<ResourceManager<CountingLifecycle>>],
) -> Box<dyn TestCase> {
    let resources = managers.iter().fold(ResourceSet::new(), |set, manager| {
        set.with(manager.name().to_owned(), Arc::clone(*manager))
    });
    Box::new(FnTest::new(name, |_| Ok(())).with_resources(resources))
}

/// A passing test without resources.
pub(crate) fn legacy_test(name: &str) -> Box<dyn TestCase> {
    Box::new(FnTest::new(name, |_| Ok(())))
}

/// Builds one test per declaration, where each declaration lists indexes into
/// `pool`. Tests with empty declarations are legacy tests.
pub(crate) fn tests_from_declarations(
    pool: &[Arc<ResourceManager<CountingLifecycle>>],
    declarations: &[Vec<usize>],
) -> Vec<Box<dyn TestCase>> {
    declarations
        .iter()
        .enumerate()
        .map(|(index, declared)| {
            let name = format!("test_{index}");
            if declared.is_empty() {
                legacy_test(&name)
            } else {
                let managers: Vec<_> = declared.iter().map(|&i| &pool[i]).collect();
                resourced_test(&name, &managers)
            }
        })
        .collect()
}

#[derive(Clone, Debug, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Runs `f` and returns everything it logged at `max_level` or above.
pub(crate) fn capture_logs(max_level: Level, f: impl FnOnce()) -> String {
    let buffer = LogBuffer::default();
    let writer = buffer.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(max_level)
        .with_writer(move || writer.clone())
        .finish();
    tracing::subscriber::with_default(subscriber, f);

    let bytes = buffer.0.lock().unwrap().clone();
    String::from_utf8(bytes).unwrap()
}
