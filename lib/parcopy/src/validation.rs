// SPDX-FileCopyrightText: Copyright (c) 2024-2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Soundness predicates for layouts, specs, plans, and sets.
//!
//! These predicates gate every planner entry point and every executor
//! dispatch; callers are expected to validate upstream rather than rely on
//! failures deep inside execution.

use crate::layout::DataLayout;
use crate::spec::{CopyPlan, CopySpec, ParallelCopySet};

impl DataLayout {
    /// A layout is sound when its fragments are non-empty and the stride
    /// covers a whole fragment, allowing the degenerate contiguous form
    /// `fragment_count == 1, stride == 0`.
    pub fn is_valid(&self) -> bool {
        self.fragment_length > 0
            && self.fragment_count > 0
            && (self.stride >= self.fragment_length
                || (self.stride == 0 && self.fragment_count == 1))
    }
}

impl CopySpec {
    /// A spec is sound when both layouts are valid, both sides move the same
    /// number of bytes, the property hints do not conflict, and, if both
    /// sides live in the same buffer on the same device, their byte ranges
    /// do not overlap.
    pub fn is_valid(&self) -> bool {
        if self.source_device == self.target_device
            && self.source_layout.base == self.target_layout.base
        {
            let source_end = self.source_layout.offset + self.source_layout.total_bytes();
            let target_end = self.target_layout.offset + self.target_layout.total_bytes();
            if self.source_layout.offset < target_end && source_end > self.target_layout.offset {
                return false;
            }
        }
        if self.properties.is_conflicting() {
            return false;
        }
        self.source_layout.is_valid()
            && self.target_layout.is_valid()
            && self.source_layout.total_bytes() == self.target_layout.total_bytes()
    }
}

impl CopyPlan {
    /// A plan is sound when every step is valid and adjacent steps share
    /// their interface: step i's target (device, layout) is step i+1's
    /// source (device, layout).
    pub fn is_valid(&self) -> bool {
        if !self.iter().all(|spec| spec.is_valid()) {
            return false;
        }
        self.windows(2).all(|pair| {
            pair[0].target_device == pair[1].source_device
                && pair[0].target_layout == pair[1].source_layout
        })
    }
}

impl ParallelCopySet {
    /// A set is sound when every plan in it is sound. Plans within a set are
    /// assumed independent.
    pub fn is_valid(&self) -> bool {
        self.iter().all(|plan| plan.is_valid())
    }
}
