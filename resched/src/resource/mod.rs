// Copyright (c) The resched Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reusable test resources.
//!
//! A [`ResourceManager`] owns the lifecycle of one reusable value: it makes the
//! value on first acquisition, hands out the cached instance while it is in
//! use, and cleans it up once the last user releases it. Tests declare the
//! managers they need through a [`ResourceSet`], which binds acquired instances
//! to local names in a [`BoundResources`].

mod declaration;
mod manager;

pub use declaration::*;
pub use manager::*;
