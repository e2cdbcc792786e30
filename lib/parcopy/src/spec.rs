// SPDX-FileCopyrightText: Copyright (c) 2024-2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Copy specifications, plans, and parallel copy sets.
//!
//! A [`CopySpec`] is one abstract transfer request. A [`CopyPlan`] is an
//! ordered chain of specs that together implement one semantic transfer;
//! each step's target side is the next step's source side. A
//! [`ParallelCopySet`] is an unordered set of independent plans that may
//! execute concurrently.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;

use crate::device::DeviceId;
use crate::layout::DataLayout;
use crate::properties::CopyProperties;

/// A single copy operation from a source layout on a source device to a
/// target layout on a target device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CopySpec {
    pub source_device: DeviceId,
    pub source_layout: DataLayout,
    pub target_device: DeviceId,
    pub target_layout: DataLayout,
    pub properties: CopyProperties,
}

impl CopySpec {
    pub fn new(
        source_device: DeviceId,
        source_layout: DataLayout,
        target_device: DeviceId,
        target_layout: DataLayout,
    ) -> Self {
        Self {
            source_device,
            source_layout,
            target_device,
            target_layout,
            properties: CopyProperties::NONE,
        }
    }

    /// The same spec with `properties` replaced.
    pub fn with_properties(self, properties: CopyProperties) -> Self {
        Self { properties, ..self }
    }

    /// Both sides are single contiguous runs.
    pub fn is_contiguous(&self) -> bool {
        self.source_layout.unit_stride() && self.target_layout.unit_stride()
    }

    /// Collapse contiguous multi-fragment sides into single-fragment form.
    pub fn normalize(self) -> Self {
        if !self.is_contiguous()
            || (self.source_layout.fragment_count == 1 && self.target_layout.fragment_count == 1)
        {
            return self;
        }
        Self {
            source_layout: self.source_layout.normalize(),
            target_layout: self.target_layout.normalize(),
            ..self
        }
    }
}

impl fmt::Display for CopySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "copy({}{}, {}{}",
            self.source_device, self.source_layout, self.target_device, self.target_layout
        )?;
        if !self.properties.is_empty() {
            write!(f, " ({})", self.properties)?;
        }
        write!(f, ")")
    }
}

/// An ordered sequence of copy steps implementing one semantic transfer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CopyPlan(Vec<CopySpec>);

impl CopyPlan {
    pub fn new(steps: Vec<CopySpec>) -> Self {
        Self(steps)
    }

    /// Plan consisting of exactly one step.
    pub fn single(spec: CopySpec) -> Self {
        Self(vec![spec])
    }

    pub fn push(&mut self, spec: CopySpec) {
        self.0.push(spec);
    }

    pub fn steps(&self) -> &[CopySpec] {
        &self.0
    }
}

impl Deref for CopyPlan {
    type Target = [CopySpec];

    fn deref(&self) -> &[CopySpec] {
        &self.0
    }
}

impl From<Vec<CopySpec>> for CopyPlan {
    fn from(steps: Vec<CopySpec>) -> Self {
        Self(steps)
    }
}

impl FromIterator<CopySpec> for CopyPlan {
    fn from_iter<I: IntoIterator<Item = CopySpec>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for CopyPlan {
    type Item = CopySpec;
    type IntoIter = std::vec::IntoIter<CopySpec>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a CopyPlan {
    type Item = &'a CopySpec;
    type IntoIter = std::slice::Iter<'a, CopySpec>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for CopyPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, spec) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", spec)?;
        }
        write!(f, "]")
    }
}

/// An unordered set of independent copy plans.
///
/// Membership is content-based: duplicate plans are suppressed, two sets
/// compare equal iff they hold the same plans regardless of insertion order,
/// and the set hashes by combining its members' hashes order-independently so
/// sets can key maps themselves.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParallelCopySet {
    plans: HashSet<CopyPlan>,
}

impl ParallelCopySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set containing one single-step plan.
    pub fn singleton(spec: CopySpec) -> Self {
        let mut set = Self::new();
        set.insert(CopyPlan::single(spec));
        set
    }

    /// Insert a plan; returns whether it was newly added.
    pub fn insert(&mut self, plan: CopyPlan) -> bool {
        self.plans.insert(plan)
    }

    pub fn contains(&self, plan: &CopyPlan) -> bool {
        self.plans.contains(plan)
    }

    pub fn len(&self) -> usize {
        self.plans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CopyPlan> {
        self.plans.iter()
    }
}

impl Hash for ParallelCopySet {
    fn hash<H: Hasher>(&self, state: &mut H) {
        let mut combined: u64 = 0;
        for plan in &self.plans {
            let mut hasher = DefaultHasher::new();
            plan.hash(&mut hasher);
            combined ^= hasher.finish();
        }
        state.write_u64(combined);
        state.write_usize(self.plans.len());
    }
}

impl FromIterator<CopyPlan> for ParallelCopySet {
    fn from_iter<I: IntoIterator<Item = CopyPlan>>(iter: I) -> Self {
        Self {
            plans: iter.into_iter().collect(),
        }
    }
}

impl Extend<CopyPlan> for ParallelCopySet {
    fn extend<I: IntoIterator<Item = CopyPlan>>(&mut self, iter: I) {
        self.plans.extend(iter);
    }
}

impl From<Vec<CopyPlan>> for ParallelCopySet {
    fn from(plans: Vec<CopyPlan>) -> Self {
        plans.into_iter().collect()
    }
}

impl IntoIterator for ParallelCopySet {
    type Item = CopyPlan;
    type IntoIter = std::collections::hash_set::IntoIter<CopyPlan>;

    fn into_iter(self) -> Self::IntoIter {
        self.plans.into_iter()
    }
}

impl<'a> IntoIterator for &'a ParallelCopySet {
    type Item = &'a CopyPlan;
    type IntoIter = std::collections::hash_set::Iter<'a, CopyPlan>;

    fn into_iter(self) -> Self::IntoIter {
        self.plans.iter()
    }
}

impl fmt::Display for ParallelCopySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, plan) in self.plans.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", plan)?;
        }
        write!(f, "}}")
    }
}
