// SPDX-FileCopyrightText: Copyright (c) 2024-2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Equivalence oracles: does a plan (or a set of plans) implement a spec?
//!
//! These predicates are what the planner is verified against. A plan
//! implements a spec when its endpoints match the spec's endpoints; a set
//! implements a spec when its plans collectively cover the spec's source and
//! target ranges exactly, with no byte copied twice.

use crate::spec::{CopyPlan, CopySpec, ParallelCopySet};

impl CopyPlan {
    /// Whether this plan implements `spec`: non-empty, first step's source
    /// side equals the spec's source side, last step's target side equals the
    /// spec's target side. Invalid plans or specs never match.
    pub fn implements(&self, spec: &CopySpec) -> bool {
        if !spec.is_valid() || !self.is_valid() {
            return false;
        }
        let (Some(first), Some(last)) = (self.first(), self.last()) else {
            return false;
        };
        first.source_device == spec.source_device
            && first.source_layout == spec.source_layout
            && last.target_device == spec.target_device
            && last.target_layout == spec.target_layout
    }
}

impl ParallelCopySet {
    /// Whether the plans in this set collectively implement `spec`.
    ///
    /// Every plan must start at the spec's source buffer and end at its
    /// target buffer; a strided plan endpoint must carry the spec's fragment
    /// geometry, while unit-stride endpoints may cover any contiguous chunk.
    /// Across the set, the covered ranges must span exactly the spec's
    /// ranges and the byte counts must add up on both sides.
    pub fn implements(&self, spec: &CopySpec) -> bool {
        if !spec.is_valid() || !self.is_valid() || self.is_empty() {
            return false;
        }

        let mut source_start = usize::MAX;
        let mut source_end = usize::MIN;
        let mut source_copied = 0usize;
        let mut target_start = usize::MAX;
        let mut target_end = usize::MIN;
        let mut target_copied = 0usize;

        for plan in self.iter() {
            let (Some(first), Some(last)) = (plan.first(), plan.last()) else {
                return false;
            };

            if first.source_device != spec.source_device
                || first.source_layout.base != spec.source_layout.base
            {
                return false;
            }
            if last.target_device != spec.target_device
                || last.target_layout.base != spec.target_layout.base
            {
                return false;
            }
            if !first.source_layout.unit_stride()
                && (first.source_layout.fragment_length != spec.source_layout.fragment_length
                    || first.source_layout.stride != spec.source_layout.stride)
            {
                return false;
            }
            if !last.target_layout.unit_stride()
                && (last.target_layout.fragment_length != spec.target_layout.fragment_length
                    || last.target_layout.stride != spec.target_layout.stride)
            {
                return false;
            }

            source_start = source_start.min(first.source_layout.offset);
            source_end = source_end.max(first.source_layout.end_offset());
            source_copied += first.source_layout.total_bytes();

            target_start = target_start.min(last.target_layout.offset);
            target_end = target_end.max(last.target_layout.end_offset());
            target_copied += last.target_layout.total_bytes();
        }

        source_start == spec.source_layout.offset
            && source_end == spec.source_layout.end_offset()
            && source_copied == spec.source_layout.total_bytes()
            && target_start == spec.target_layout.offset
            && target_end == spec.target_layout.end_offset()
            && target_copied == spec.target_layout.total_bytes()
    }
}
