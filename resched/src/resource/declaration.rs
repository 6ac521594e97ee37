// Copyright (c) The resched Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{AnyResource, AnyResourceManager, ResourceId};
use crate::errors::{BindingError, DeclarationError, ResourceError, SetUpError};
use indexmap::IndexMap;
use smol_str::SmolStr;
use std::{any, collections::BTreeSet, sync::Arc};
use tracing::warn;

/// A single resource declared by a test: a local name and the manager that
/// provides the resource.
#[derive(Clone, Debug)]
pub struct ResourceDeclaration {
    name: SmolStr,
    manager: Arc<dyn AnyResourceManager>,
}

impl ResourceDeclaration {
    /// Creates a new declaration.
    pub fn new<M: AnyResourceManager + 'static>(name: impl Into<SmolStr>, manager: Arc<M>) -> Self {
        Self {
            name: name.into(),
            manager,
        }
    }

    /// Returns the local name the resource is bound under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the manager providing the resource.
    pub fn manager(&self) -> &Arc<dyn AnyResourceManager> {
        &self.manager
    }
}

/// The ordered list of resources a test declares.
///
/// Resources are acquired in declaration order before the test body runs, and
/// released in reverse order afterwards.
#[derive(Clone, Debug, Default)]
pub struct ResourceSet {
    declarations: Vec<ResourceDeclaration>,
}

impl ResourceSet {
    /// Creates a new, empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a declaration to the end of the set, returning the set.
    pub fn with<M: AnyResourceManager + 'static>(
        mut self,
        name: impl Into<SmolStr>,
        manager: Arc<M>,
    ) -> Self {
        self.push(name, manager);
        self
    }

    /// Adds a declaration to the end of the set.
    pub fn push<M: AnyResourceManager + 'static>(
        &mut self,
        name: impl Into<SmolStr>,
        manager: Arc<M>,
    ) {
        self.declarations
            .push(ResourceDeclaration::new(name, manager));
    }

    /// Returns the number of declarations.
    pub fn len(&self) -> usize {
        self.declarations.len()
    }

    /// Returns true if nothing is declared.
    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }

    /// Iterates over the declarations in order.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = &ResourceDeclaration> + DoubleEndedIterator {
        self.declarations.iter()
    }

    /// Returns the identifiers of the declared managers, without duplicates.
    pub fn manager_ids(&self) -> BTreeSet<ResourceId> {
        self.declarations
            .iter()
            .map(|decl| decl.manager.id())
            .collect()
    }

    /// Returns the declared managers in declaration order, with managers
    /// declared more than once listed only the first time.
    pub fn unique_managers(&self) -> Vec<&Arc<dyn AnyResourceManager>> {
        let mut seen = BTreeSet::new();
        self.declarations
            .iter()
            .filter(|decl| seen.insert(decl.manager.id()))
            .map(|decl| &decl.manager)
            .collect()
    }

    /// Checks that the declaration is well-formed: every name is non-empty and
    /// declared once.
    pub fn validate(&self) -> Result<(), DeclarationError> {
        if let Some(position) = self.declarations.iter().position(|d| d.name.is_empty()) {
            return Err(DeclarationError::EmptyName { position });
        }

        let mut seen = BTreeSet::new();
        let mut duplicates = Vec::new();
        for decl in &self.declarations {
            if !seen.insert(&decl.name) && !duplicates.contains(&decl.name) {
                duplicates.push(decl.name.clone());
            }
        }
        if !duplicates.is_empty() {
            return Err(DeclarationError::DuplicateNames { names: duplicates });
        }

        Ok(())
    }

    /// Acquires every declared resource in order and binds it under its name.
    ///
    /// If an acquisition fails, resources acquired so far are released in
    /// reverse order before the error is returned.
    pub fn set_up(&self) -> Result<BoundResources, SetUpError> {
        self.validate()?;

        let mut bound = BoundResources::default();
        for decl in &self.declarations {
            match decl.manager.acquire_any() {
                Ok(instance) => {
                    bound.bindings.insert(
                        decl.name.clone(),
                        Binding {
                            manager: Arc::clone(&decl.manager),
                            instance,
                        },
                    );
                }
                Err(error) => {
                    for (name, error) in bound.release_all() {
                        warn!(
                            resource = %name,
                            "error releasing resource after failed set-up: {error}",
                        );
                    }
                    return Err(SetUpError::Acquire {
                        name: decl.name.clone(),
                        error,
                    });
                }
            }
        }

        Ok(bound)
    }

    /// Releases every bound resource in reverse declaration order.
    ///
    /// Every resource is released even if earlier releases fail; the failures
    /// are returned with the names they were bound under.
    pub fn tear_down(&self, bound: BoundResources) -> Vec<(SmolStr, ResourceError)> {
        bound.release_all()
    }
}

#[derive(Clone, Debug)]
struct Binding {
    manager: Arc<dyn AnyResourceManager>,
    instance: AnyResource,
}

/// Resource instances bound to the local names a test declared them under.
#[derive(Clone, Debug, Default)]
pub struct BoundResources {
    bindings: IndexMap<SmolStr, Binding>,
}

impl BoundResources {
    /// Returns the resource bound under `name`.
    pub fn get<T: Send + Sync + 'static>(&self, name: &str) -> Result<Arc<T>, BindingError> {
        let binding = self.binding(name)?;
        Arc::clone(&binding.instance)
            .downcast::<T>()
            .map_err(|_| BindingError::WrongType {
                name: name.into(),
                expected: any::type_name::<T>(),
            })
    }

    /// Marks the resource bound under `name` as dirty, so that its manager
    /// makes a fresh instance on the next acquisition.
    pub fn mark_dirty(&self, name: &str) -> Result<(), BindingError> {
        self.binding(name)?.manager.mark_dirty();
        Ok(())
    }

    /// Returns the bound names in declaration order.
    pub fn names(&self) -> impl ExactSizeIterator<Item = &str> {
        self.bindings.keys().map(|name| name.as_str())
    }

    /// Returns the number of bound resources.
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Returns true if nothing is bound.
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    fn binding(&self, name: &str) -> Result<&Binding, BindingError> {
        self.bindings
            .get(name)
            .ok_or_else(|| BindingError::missing(name, self.bindings.keys().cloned()))
    }

    fn release_all(self) -> Vec<(SmolStr, ResourceError)> {
        self.bindings
            .into_iter()
            .rev()
            .filter_map(|(name, binding)| {
                binding
                    .manager
                    .release_any(binding.instance)
                    .err()
                    .map(|error| (name, error))
            })
            .collect()
    }
}
