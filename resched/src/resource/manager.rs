// Copyright (c) The resched Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    errors::{BoxError, ResourceError},
    helpers::panic_message,
};
use smol_str::SmolStr;
use std::{
    any::{self, Any},
    fmt,
    panic::{self, AssertUnwindSafe},
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
};
use tracing::{debug, warn};

/// A resource instance with its type erased.
pub type AnyResource = Arc<dyn Any + Send + Sync>;

/// Constructs and destroys the value a [`ResourceManager`] hands out.
///
/// Implementations describe *how* to build a resource; the manager decides
/// *when*, based on how many tests are currently using it.
///
/// Both hooks run while the owning manager's lock is held. A hook must not
/// call back into its own manager (for example to acquire or inspect it), or
/// it will deadlock.
pub trait ResourceLifecycle: Send + Sync + 'static {
    /// The type of the resource.
    type Resource: Send + Sync + 'static;

    /// Makes a new instance of the resource.
    fn make(&self) -> Result<Self::Resource, BoxError>;

    /// Cleans up an instance once no test uses it any more.
    ///
    /// The default implementation does nothing, leaving cleanup to `Drop`.
    fn clean(&self, resource: &Self::Resource) -> Result<(), BoxError> {
        let _ = resource;
        Ok(())
    }
}

/// A stable identifier for a [`ResourceManager`].
///
/// Two declarations refer to the same resource if and only if their managers
/// have the same identifier.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ResourceId(u64);

impl ResourceId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(0);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the identifier as an integer.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "resource-{}", self.0)
    }
}

/// The relative cost of making and cleaning a resource.
///
/// Costs are used to estimate how expensive an execution plan is. They are
/// unitless: only their relative sizes matter.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ResourceCosts {
    /// The cost of making the resource.
    pub setup: u64,

    /// The cost of cleaning the resource.
    pub teardown: u64,
}

impl Default for ResourceCosts {
    fn default() -> Self {
        Self {
            setup: 1,
            teardown: 1,
        }
    }
}

/// Counters describing a manager's activity so far.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ResourceStats {
    /// The number of outstanding acquisitions.
    pub uses: usize,

    /// The number of times the resource was made.
    pub makes: usize,

    /// The number of times the resource was cleaned, whether or not cleaning
    /// succeeded.
    pub cleans: usize,
}

#[derive(Debug)]
struct ManagerState<R> {
    instance: Option<Arc<R>>,
    dirty: bool,
    stats: ResourceStats,
}

/// Owns the lifecycle of one reusable resource.
///
/// The instance is made when the number of outstanding acquisitions goes from
/// 0 to 1, and cleaned when it goes back to 0. While at least one acquisition
/// is outstanding, [`acquire`](Self::acquire) returns the cached instance
/// without making a new one.
///
/// Managers are shared by identity: wrap one in an `Arc` and declare the same
/// `Arc` on every test that can share it.
pub struct ResourceManager<L: ResourceLifecycle> {
    id: ResourceId,
    name: SmolStr,
    costs: ResourceCosts,
    lifecycle: L,
    state: Mutex<ManagerState<L::Resource>>,
}

impl<L: ResourceLifecycle> ResourceManager<L> {
    /// Creates a new manager for the given lifecycle.
    ///
    /// The manager is named after the lifecycle's type; use
    /// [`with_name`](Self::with_name) to pick a shorter name for log output.
    pub fn new(lifecycle: L) -> Self {
        Self {
            id: ResourceId::next(),
            name: any::type_name::<L>().into(),
            costs: ResourceCosts::default(),
            lifecycle,
            state: Mutex::new(ManagerState {
                instance: None,
                dirty: false,
                stats: ResourceStats::default(),
            }),
        }
    }

    /// Sets the name of this manager.
    pub fn with_name(mut self, name: impl Into<SmolStr>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the costs of making and cleaning this resource.
    pub fn with_costs(mut self, costs: ResourceCosts) -> Self {
        self.costs = costs;
        self
    }

    /// Returns the identifier of this manager.
    pub fn id(&self) -> ResourceId {
        self.id
    }

    /// Returns the name of this manager.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the costs of this resource.
    pub fn costs(&self) -> ResourceCosts {
        self.costs
    }

    /// Returns the lifecycle this manager was created with.
    pub fn lifecycle(&self) -> &L {
        &self.lifecycle
    }

    /// Returns the number of outstanding acquisitions.
    pub fn uses(&self) -> usize {
        self.lock_state().stats.uses
    }

    /// Returns true if an instance is currently cached.
    pub fn is_built(&self) -> bool {
        self.lock_state().instance.is_some()
    }

    /// Returns true if the cached instance has been marked dirty.
    pub fn is_dirty(&self) -> bool {
        self.lock_state().dirty
    }

    /// Returns counters describing this manager's activity so far.
    pub fn stats(&self) -> ResourceStats {
        self.lock_state().stats
    }

    /// Acquires the resource, making it if no instance is cached.
    ///
    /// If the cached instance was marked dirty, a fresh one is made and the
    /// dirty one is cleaned once it has been replaced.
    ///
    /// If making fails, the manager is left exactly as it was before the call
    /// and a later call retries. In particular, a dirty instance stays cached
    /// and dirty, so a manager with outstanding acquisitions always has an
    /// instance.
    pub fn acquire(&self) -> Result<Arc<L::Resource>, ResourceError> {
        let mut state = self.lock_state();

        if let Some(instance) = &state.instance
            && !state.dirty
        {
            let instance = Arc::clone(instance);
            state.stats.uses += 1;
            return Ok(instance);
        }

        let instance = Arc::new(self.make_instance()?);
        state.stats.makes += 1;
        debug!(resource = %self.name, makes = state.stats.makes, "made resource");

        state.dirty = false;
        if let Some(stale) = state.instance.replace(Arc::clone(&instance)) {
            debug!(resource = %self.name, "replaced dirty resource");
            if let Err(error) = self.clean_instance(&mut state, &stale) {
                warn!(
                    resource = %self.name,
                    "error cleaning replaced dirty resource: {error}",
                );
            }
        }

        state.stats.uses += 1;
        Ok(instance)
    }

    /// Releases an instance previously returned by [`acquire`](Self::acquire).
    ///
    /// When the last acquisition is released, the instance is cleaned. A clean
    /// failure is returned, but the manager's bookkeeping is completed first:
    /// the count is decremented and the cache is discarded either way.
    pub fn release(&self, instance: Arc<L::Resource>) -> Result<(), ResourceError> {
        drop(instance);

        let mut state = self.lock_state();
        if state.stats.uses == 0 {
            return Err(ResourceError::NotAcquired {
                name: self.name.clone(),
            });
        }

        state.stats.uses -= 1;
        if state.stats.uses > 0 {
            return Ok(());
        }

        state.dirty = false;
        match state.instance.take() {
            Some(instance) => self.clean_instance(&mut state, &instance),
            None => Ok(()),
        }
    }

    /// Marks the cached instance as dirty, so that the next acquisition makes a
    /// fresh one.
    ///
    /// Does nothing if no instance is cached.
    pub fn mark_dirty(&self) {
        let mut state = self.lock_state();
        if state.instance.is_some() {
            state.dirty = true;
        }
    }

    // ---
    // Helper methods
    // ---

    fn lock_state(&self) -> MutexGuard<'_, ManagerState<L::Resource>> {
        // Hooks run under catch_unwind, so a poisoned lock never holds a
        // half-updated state.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn make_instance(&self) -> Result<L::Resource, ResourceError> {
        match panic::catch_unwind(AssertUnwindSafe(|| self.lifecycle.make())) {
            Ok(Ok(resource)) => Ok(resource),
            Ok(Err(error)) => Err(ResourceError::Make {
                name: self.name.clone(),
                error,
            }),
            Err(payload) => Err(ResourceError::MakePanicked {
                name: self.name.clone(),
                message: panic_message(&*payload),
            }),
        }
    }

    fn clean_instance(
        &self,
        state: &mut ManagerState<L::Resource>,
        instance: &L::Resource,
    ) -> Result<(), ResourceError> {
        state.stats.cleans += 1;
        debug!(resource = %self.name, cleans = state.stats.cleans, "cleaning resource");

        match panic::catch_unwind(AssertUnwindSafe(|| self.lifecycle.clean(instance))) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(error)) => Err(ResourceError::Clean {
                name: self.name.clone(),
                error,
            }),
            Err(payload) => Err(ResourceError::CleanPanicked {
                name: self.name.clone(),
                message: panic_message(&*payload),
            }),
        }
    }
}

impl<L: ResourceLifecycle> fmt::Debug for ResourceManager<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock_state();
        f.debug_struct("ResourceManager")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("costs", &self.costs)
            .field("built", &state.instance.is_some())
            .field("dirty", &state.dirty)
            .field("stats", &state.stats)
            .finish()
    }
}

/// A [`ResourceManager`] with the resource type erased.
///
/// This is what tests declare, so that one test can use managers for
/// resources of different types.
pub trait AnyResourceManager: fmt::Debug + Send + Sync {
    /// Returns the identifier of this manager.
    fn id(&self) -> ResourceId;

    /// Returns the name of this manager.
    fn name(&self) -> &str;

    /// Returns the costs of this resource.
    fn costs(&self) -> ResourceCosts;

    /// Returns counters describing this manager's activity so far.
    fn stats(&self) -> ResourceStats;

    /// Acquires the resource. See [`ResourceManager::acquire`].
    fn acquire_any(&self) -> Result<AnyResource, ResourceError>;

    /// Releases the resource. See [`ResourceManager::release`].
    fn release_any(&self, instance: AnyResource) -> Result<(), ResourceError>;

    /// Marks the cached instance as dirty. See [`ResourceManager::mark_dirty`].
    fn mark_dirty(&self);
}

impl<L: ResourceLifecycle> AnyResourceManager for ResourceManager<L> {
    fn id(&self) -> ResourceId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn costs(&self) -> ResourceCosts {
        self.costs
    }

    fn stats(&self) -> ResourceStats {
        ResourceManager::stats(self)
    }

    fn acquire_any(&self) -> Result<AnyResource, ResourceError> {
        let instance: AnyResource = self.acquire()?;
        Ok(instance)
    }

    fn release_any(&self, instance: AnyResource) -> Result<(), ResourceError> {
        let instance = instance
            .downcast::<L::Resource>()
            .map_err(|_| ResourceError::WrongInstance {
                name: self.name.clone(),
            })?;
        self.release(instance)
    }

    fn mark_dirty(&self) {
        ResourceManager::mark_dirty(self)
    }
}
