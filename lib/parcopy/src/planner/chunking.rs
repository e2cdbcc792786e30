// SPDX-FileCopyrightText: Copyright (c) 2024-2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Splitting one copy spec into an equivalent set of bounded-size specs.

use tracing::debug;

use crate::error::{PlanError, Result};
use crate::layout::DataLayout;
use crate::spec::{CopyPlan, CopySpec, ParallelCopySet};
use crate::strategy::CopyStrategy;

/// Split `spec` into an equivalent set of independent single-step plans, each
/// moving at most `strategy.chunk_size` bytes. Returns the spec unsplit when
/// chunking is disabled (`chunk_size == 0`).
///
/// Strided sides are split along their fragment axis, so a fragment must fit
/// into one chunk; when both sides are strided their fragment lengths must
/// divide evenly into each other.
pub fn apply_chunking(spec: &CopySpec, strategy: &CopyStrategy) -> Result<ParallelCopySet> {
    if !spec.is_valid() {
        return Err(PlanError::InvalidSpec(spec.to_string()));
    }
    if strategy.chunk_size == 0 {
        return Ok(ParallelCopySet::singleton(*spec));
    }
    let chunk_size = strategy.chunk_size;

    let set = match (
        spec.source_layout.unit_stride(),
        spec.target_layout.unit_stride(),
    ) {
        (true, true) => chunk_contiguous(spec, chunk_size),
        (true, false) => chunk_one_strided(spec, chunk_size, Side::Target)?,
        (false, true) => chunk_one_strided(spec, chunk_size, Side::Source)?,
        (false, false) => chunk_both_strided(spec, chunk_size)?,
    };
    debug!(chunks = set.len(), chunk_size, "chunked copy spec");
    Ok(set)
}

/// Both sides contiguous: split along the shared byte axis.
fn chunk_contiguous(spec: &CopySpec, chunk_size: usize) -> ParallelCopySet {
    let total_bytes = spec.source_layout.total_bytes();
    let num_chunks = total_bytes.div_ceil(chunk_size);
    let mut set = ParallelCopySet::new();
    for i in 0..num_chunks {
        let start = i * chunk_size;
        let len = chunk_size.min(total_bytes - start);
        set.insert(CopyPlan::single(
            CopySpec::new(
                spec.source_device,
                DataLayout::contiguous(spec.source_layout.base, spec.source_layout.offset + start, len),
                spec.target_device,
                DataLayout::contiguous(spec.target_layout.base, spec.target_layout.offset + start, len),
            )
            .with_properties(spec.properties),
        ));
    }
    set
}

#[derive(Clone, Copy, PartialEq)]
enum Side {
    Source,
    Target,
}

/// One side strided, the other contiguous: split along the strided side's
/// fragment axis, with the contiguous side advancing by whole fragments.
fn chunk_one_strided(spec: &CopySpec, chunk_size: usize, strided: Side) -> Result<ParallelCopySet> {
    let (strided_layout, linear_layout) = match strided {
        Side::Source => (&spec.source_layout, &spec.target_layout),
        Side::Target => (&spec.target_layout, &spec.source_layout),
    };

    let fragment_length = strided_layout.fragment_length;
    if fragment_length > chunk_size {
        return Err(PlanError::FragmentsTooLarge {
            fragment_length,
            chunk_size,
        });
    }
    let fragments_per_chunk = chunk_size / fragment_length;
    let num_chunks = strided_layout.fragment_count.div_ceil(fragments_per_chunk);

    let mut set = ParallelCopySet::new();
    for i in 0..num_chunks {
        let start_fragment = i * fragments_per_chunk;
        let end_fragment = (start_fragment + fragments_per_chunk).min(strided_layout.fragment_count);
        let num_fragments = end_fragment - start_fragment;
        let chunk_bytes = num_fragments * fragment_length;

        let strided_chunk = DataLayout::strided(
            strided_layout.base,
            strided_layout.fragment_offset(start_fragment),
            fragment_length,
            num_fragments,
            strided_layout.stride,
        );
        let linear_chunk = DataLayout::contiguous(
            linear_layout.base,
            linear_layout.offset + start_fragment * fragment_length,
            chunk_bytes,
        );

        let (source_chunk, target_chunk) = match strided {
            Side::Source => (strided_chunk, linear_chunk),
            Side::Target => (linear_chunk, strided_chunk),
        };
        set.insert(CopyPlan::single(
            CopySpec::new(spec.source_device, source_chunk, spec.target_device, target_chunk)
                .with_properties(spec.properties),
        ));
    }
    Ok(set)
}

/// Both sides strided: work in units of the larger fragment. Each chunk
/// covers `chunk_size / L` larger fragments on one side and the matching
/// `(chunk_size / L) * (L / S)` smaller fragments on the other; the final
/// chunk truncates to the remaining fragments.
fn chunk_both_strided(spec: &CopySpec, chunk_size: usize) -> Result<ParallelCopySet> {
    let source_is_larger = spec.source_layout.fragment_length > spec.target_layout.fragment_length;
    let (larger, smaller) = if source_is_larger {
        (&spec.source_layout, &spec.target_layout)
    } else {
        (&spec.target_layout, &spec.source_layout)
    };

    if larger.fragment_length > chunk_size {
        return Err(PlanError::FragmentsTooLarge {
            fragment_length: larger.fragment_length,
            chunk_size,
        });
    }
    if larger.fragment_length % smaller.fragment_length != 0 {
        return Err(PlanError::IncompatibleFragments {
            larger: larger.fragment_length,
            smaller: smaller.fragment_length,
        });
    }

    let larger_per_chunk = chunk_size / larger.fragment_length;
    let ratio = larger.fragment_length / smaller.fragment_length;
    let num_chunks = larger.fragment_count.div_ceil(larger_per_chunk);

    let mut set = ParallelCopySet::new();
    for i in 0..num_chunks {
        let start_larger = i * larger_per_chunk;
        let end_larger = (start_larger + larger_per_chunk).min(larger.fragment_count);
        let start_smaller = start_larger * ratio;
        let end_smaller = end_larger * ratio;

        let larger_chunk = DataLayout::strided(
            larger.base,
            larger.fragment_offset(start_larger),
            larger.fragment_length,
            end_larger - start_larger,
            larger.stride,
        );
        let smaller_chunk = DataLayout::strided(
            smaller.base,
            smaller.fragment_offset(start_smaller),
            smaller.fragment_length,
            end_smaller - start_smaller,
            smaller.stride,
        );

        let (source_chunk, target_chunk) = if source_is_larger {
            (larger_chunk, smaller_chunk)
        } else {
            (smaller_chunk, larger_chunk)
        };
        set.insert(CopyPlan::single(
            CopySpec::new(spec.source_device, source_chunk, spec.target_device, target_chunk)
                .with_properties(spec.properties),
        ));
    }
    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceId;

    const D0: DeviceId = DeviceId::Device(0);
    const D1: DeviceId = DeviceId::Device(1);

    fn strategy(chunk_size: usize) -> CopyStrategy {
        CopyStrategy::direct().with_chunk_size(chunk_size)
    }

    #[test]
    fn contiguous_no_chunking_needed() {
        let source = DataLayout::strided(0usize, 42, 1024, 1, 1024);
        let target = DataLayout::strided(0usize, 0, 1024, 1, 1024);
        let spec = CopySpec::new(D0, source, D1, target);

        for chunk_size in [0, 1024] {
            let set = apply_chunking(&spec, &strategy(chunk_size)).unwrap();
            assert_eq!(set.len(), 1);
            let plan = set.iter().next().unwrap();
            assert_eq!(plan.len(), 1);
            assert_eq!(plan[0].source_layout, source);
            assert_eq!(plan[0].target_layout, target);
        }
    }

    #[test]
    fn contiguous_perfectly_divisible() {
        let extra_source_offset = 42;
        let spec = CopySpec::new(
            D0,
            DataLayout::strided(0usize, extra_source_offset, 1024, 1, 1024),
            D1,
            DataLayout::strided(0usize, 0, 1024, 1, 1024),
        );
        let set = apply_chunking(&spec, &strategy(256)).unwrap();

        let mut expected = ParallelCopySet::new();
        for i in 0..4 {
            expected.insert(CopyPlan::single(CopySpec::new(
                D0,
                DataLayout::strided(0usize, i * 256 + extra_source_offset, 256, 1, 256),
                D1,
                DataLayout::strided(0usize, i * 256, 256, 1, 256),
            )));
        }
        assert_eq!(set, expected);
    }

    #[test]
    fn contiguous_with_remainder() {
        let extra_source_offset = 42;
        let spec = CopySpec::new(
            D0,
            DataLayout::strided(0usize, extra_source_offset, 1024, 1, 1024),
            D1,
            DataLayout::strided(0usize, 0, 1024, 1, 1024),
        );
        let set = apply_chunking(&spec, &strategy(400)).unwrap();

        let mut expected = ParallelCopySet::new();
        for i in 0..3usize {
            let len = 400.min(1024 - i * 400);
            expected.insert(CopyPlan::single(CopySpec::new(
                D0,
                DataLayout::strided(0usize, i * 400 + extra_source_offset, len, 1, len),
                D1,
                DataLayout::strided(0usize, i * 400, len, 1, len),
            )));
        }
        assert_eq!(set, expected);
    }

    #[test]
    fn both_strided_same_fragment_length() {
        let source = DataLayout::strided(0usize, 0, 8, 64, 32);
        let target = DataLayout::strided(0usize, 0, 8, 64, 96);
        let spec = CopySpec::new(D0, source, D1, target);

        for chunk_size in [0, 8 * 64] {
            let set = apply_chunking(&spec, &strategy(chunk_size)).unwrap();
            assert_eq!(set.len(), 1);
            let plan = set.iter().next().unwrap();
            assert_eq!(plan[0].source_layout, source);
            assert_eq!(plan[0].target_layout, target);
        }

        // perfectly divisible
        let set = apply_chunking(&spec, &strategy(256)).unwrap();
        let mut expected = ParallelCopySet::new();
        for i in 0..2usize {
            expected.insert(CopyPlan::single(CopySpec::new(
                D0,
                DataLayout::strided(0usize, i * (256 / 8 * 32), 8, 256 / 8, 32),
                D1,
                DataLayout::strided(0usize, i * (256 / 8 * 96), 8, 256 / 8, 96),
            )));
        }
        assert_eq!(set, expected);

        // with remainder
        let set = apply_chunking(&spec, &strategy(177)).unwrap();
        let mut expected = ParallelCopySet::new();
        for i in 0..3usize {
            let count = (177 / 8).min(64 - i * (177 / 8));
            expected.insert(CopyPlan::single(CopySpec::new(
                D0,
                DataLayout::strided(0usize, i * (177 / 8 * 32), 8, count, 32),
                D1,
                DataLayout::strided(0usize, i * (177 / 8 * 96), 8, count, 96),
            )));
        }
        assert_eq!(set, expected);
    }

    #[test]
    fn both_strided_different_fragment_length() {
        let source = DataLayout::strided(0usize, 0, 8, 64, 32);
        let target = DataLayout::strided(0usize, 0, 32, 16, 96);
        let spec = CopySpec::new(D0, source, D1, target);

        // perfectly divisible
        let set = apply_chunking(&spec, &strategy(256)).unwrap();
        let mut expected = ParallelCopySet::new();
        for i in 0..2usize {
            expected.insert(CopyPlan::single(CopySpec::new(
                D0,
                DataLayout::strided(0usize, i * (256 / 8 * 32), 8, 256 / 8, 32),
                D1,
                DataLayout::strided(0usize, i * (256 / 32 * 96), 32, 256 / 32, 96),
            )));
        }
        assert_eq!(set, expected);

        // with remainder: 5 target fragments per chunk, final chunk holds 1
        let set = apply_chunking(&spec, &strategy(177)).unwrap();
        let mut expected = ParallelCopySet::new();
        for i in 0..4usize {
            let target_count = if i == 3 { 1 } else { 177 / 32 };
            let ratio = 32 / 8;
            expected.insert(CopyPlan::single(CopySpec::new(
                D0,
                DataLayout::strided(0usize, i * (177 / 32 * ratio * 32), 8, target_count * ratio, 32),
                D1,
                DataLayout::strided(0usize, i * (177 / 32 * 96), 32, target_count, 96),
            )));
        }
        assert_eq!(set, expected);
    }

    #[test]
    fn one_strided_side_with_remainder_keeps_byte_counts_equal() {
        // 10 fragments of 8 bytes, 3 fragments per 24-byte chunk -> 4 chunks,
        // the last covering a single fragment.
        let source = DataLayout::contiguous(0usize, 0, 80);
        let target = DataLayout::strided(0usize, 0, 8, 10, 64);
        let spec = CopySpec::new(D0, source, D1, target);
        let set = apply_chunking(&spec, &strategy(24)).unwrap();
        assert_eq!(set.len(), 4);
        assert!(set.is_valid());
        assert!(set.implements(&spec));
        for plan in set.iter() {
            assert_eq!(
                plan[0].source_layout.total_bytes(),
                plan[0].target_layout.total_bytes()
            );
        }
    }

    #[test]
    fn oversized_fragments_are_rejected() {
        let source = DataLayout::contiguous(0usize, 0, 1024);
        let target = DataLayout::strided(0usize, 0, 512, 2, 512 + 64);
        let spec = CopySpec::new(D0, source, D1, target);
        let err = apply_chunking(&spec, &strategy(256)).unwrap_err();
        assert!(matches!(
            err,
            PlanError::FragmentsTooLarge {
                fragment_length: 512,
                chunk_size: 256
            }
        ));
    }

    #[test]
    fn incompatible_fragment_lengths_are_rejected() {
        let source = DataLayout::strided(0usize, 0, 24, 4, 64);
        let target = DataLayout::strided(0usize, 0, 16, 6, 64);
        let spec = CopySpec::new(D0, source, D1, target);
        let err = apply_chunking(&spec, &strategy(256)).unwrap_err();
        assert!(matches!(
            err,
            PlanError::IncompatibleFragments {
                larger: 24,
                smaller: 16
            }
        ));
    }

    #[test]
    fn invalid_spec_is_rejected() {
        let layout = DataLayout::contiguous(0usize, 0, 1024);
        let spec = CopySpec::new(D0, layout, D0, layout);
        assert!(matches!(
            apply_chunking(&spec, &strategy(0)),
            Err(PlanError::InvalidSpec(_))
        ));
    }
}
