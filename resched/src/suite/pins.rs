// Copyright (c) The resched Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    errors::{ResourceError, SetUpError},
    resource::{AnyResource, AnyResourceManager, ResourceId, ResourceSet},
    result::TestResult,
};
use smol_str::SmolStr;
use std::{collections::BTreeSet, mem, sync::Arc};
use tracing::{debug, warn};

/// Resources a suite holds between tests.
///
/// Before each test the suite switches its pins to the managers that test
/// declares. Managers shared by adjacent tests stay acquired across the switch,
/// so their instances survive the tests' own releases and are not made again.
#[derive(Debug, Default)]
pub struct ResourcePins {
    // In acquisition order.
    held: Vec<Pin>,
}

#[derive(Debug)]
struct Pin {
    manager: Arc<dyn AnyResourceManager>,
    instance: AnyResource,
    // The most recent test the pin was kept or acquired for.
    last_user: SmolStr,
}

impl ResourcePins {
    /// Creates a new, empty set of pins.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of managers currently pinned.
    pub fn len(&self) -> usize {
        self.held.len()
    }

    /// Returns true if nothing is pinned.
    pub fn is_empty(&self) -> bool {
        self.held.is_empty()
    }

    /// Returns the identifiers of the pinned managers, in acquisition order.
    pub fn held(&self) -> impl ExactSizeIterator<Item = ResourceId> + '_ {
        self.held.iter().map(|pin| pin.manager.id())
    }

    /// Switches the pins to the managers declared by `next`, the resources of
    /// the test named `test_name`.
    ///
    /// Pinned managers that `next` doesn't declare are released in reverse
    /// acquisition order, and declared managers that aren't pinned yet are
    /// acquired in declaration order. `None` releases everything.
    ///
    /// Release failures are reported to `result` as resource errors, against
    /// the last test that used the released manager. If a manager can't be
    /// acquired, the error is returned and pins acquired before it are kept.
    pub fn switch(
        &mut self,
        test_name: &str,
        next: Option<&ResourceSet>,
        result: &mut dyn TestResult,
    ) -> Result<(), SetUpError> {
        let next_ids = next.map(ResourceSet::manager_ids).unwrap_or_default();
        self.release_unneeded(&next_ids, result);

        let Some(next) = next else {
            return Ok(());
        };
        next.validate()?;

        for pin in &mut self.held {
            pin.last_user = test_name.into();
        }
        for decl in next.iter() {
            let manager = decl.manager();
            if self.held().any(|id| id == manager.id()) {
                continue;
            }
            match manager.acquire_any() {
                Ok(instance) => {
                    debug!(resource = manager.name(), test = test_name, "pinned resource");
                    self.held.push(Pin {
                        manager: Arc::clone(manager),
                        instance,
                        last_user: test_name.into(),
                    });
                }
                Err(error) => {
                    return Err(SetUpError::Acquire {
                        name: decl.name().into(),
                        error,
                    });
                }
            }
        }

        Ok(())
    }

    /// Releases every pin in reverse acquisition order.
    pub fn release_all(&mut self, result: &mut dyn TestResult) {
        self.release_unneeded(&BTreeSet::new(), result);
    }

    fn release_unneeded(&mut self, keep: &BTreeSet<ResourceId>, result: &mut dyn TestResult) {
        let (kept, released): (Vec<_>, Vec<_>) = mem::take(&mut self.held)
            .into_iter()
            .partition(|pin| keep.contains(&pin.manager.id()));
        self.held = kept;

        for pin in released.into_iter().rev() {
            debug!(resource = pin.manager.name(), "unpinned resource");
            if let Err(error) = pin.manager.release_any(pin.instance) {
                report_release_error(&pin.last_user, &error, result);
            }
        }
    }
}

fn report_release_error(last_test: &str, error: &ResourceError, result: &mut dyn TestResult) {
    warn!(
        resource = error.manager_name(),
        last_test,
        "error releasing resource held between tests: {error}",
    );
    result.add_resource_error(last_test, error);
}
