// SPDX-FileCopyrightText: Copyright (c) 2024-2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Linearizing strided endpoints through contiguous staging buffers.

use tracing::debug;

use crate::device::DeviceId;
use crate::error::{PlanError, Result};
use crate::layout::{DataLayout, StagingId};
use crate::spec::{CopyPlan, CopySpec, ParallelCopySet};
use crate::strategy::{CopyStrategy, CopyType};

/// Mints staging buffer handles for the planner.
///
/// Providers hand out symbolic [`StagingId`]s only; placement happens in the
/// executor. Injected so tests can pin indices and executors can scope them.
pub trait StagingProvider {
    /// Request a staging buffer of `size` bytes associated with `device`,
    /// either in that device's memory or in its host-pinned staging region.
    fn acquire(&mut self, device: DeviceId, on_host: bool, size: usize) -> Result<StagingId>;
}

/// Counter-based provider: hands out sequentially numbered staging ids.
#[derive(Debug, Default)]
pub struct BasicStagingProvider {
    next_index: u32,
}

impl BasicStagingProvider {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StagingProvider for BasicStagingProvider {
    fn acquire(&mut self, device: DeviceId, on_host: bool, size: usize) -> Result<StagingId> {
        if size == 0 {
            return Err(PlanError::InvalidStagingSize(size));
        }
        if device.is_host() {
            return Err(PlanError::HostStagingDevice);
        }
        let index = self.next_index;
        self.next_index += 1;
        Ok(StagingId {
            on_host,
            device,
            index,
        })
    }
}

/// Staging buffers live in device memory; when the endpoint is the host, the
/// buffer lands on the device at the other end of the transfer.
fn stage_device(end_device: DeviceId, other_device: DeviceId) -> DeviceId {
    if end_device.is_host() {
        other_device
    } else {
        end_device
    }
}

/// Turn a single spec into a plan that implements it under `strategy`,
/// linearizing each strided endpoint through a contiguous staging buffer when
/// the strategy asks for staged copies.
///
/// Every emitted step carries `strategy.properties`. The result satisfies
/// [`CopyPlan::implements`] for `spec`.
pub fn apply_staging(
    spec: &CopySpec,
    strategy: &CopyStrategy,
    provider: &mut dyn StagingProvider,
) -> Result<CopyPlan> {
    if !spec.is_valid() {
        return Err(PlanError::InvalidSpec(spec.to_string()));
    }
    let proper = spec.with_properties(strategy.properties);
    if strategy.kind == CopyType::Direct {
        return Ok(CopyPlan::single(proper));
    }

    // Contiguous copies need no staging, only normalization.
    if spec.is_contiguous() {
        return Ok(CopyPlan::single(proper.normalize()));
    }
    let props = strategy.properties;

    let source_staging = if !spec.source_layout.unit_stride() {
        let device = stage_device(spec.source_device, spec.target_device);
        let bytes = spec.source_layout.total_bytes();
        let id = provider.acquire(device, false, bytes)?;
        Some((device, DataLayout::contiguous(id, 0, bytes)))
    } else {
        None
    };

    let target_staging = if !spec.target_layout.unit_stride() {
        let device = stage_device(spec.target_device, spec.source_device);
        let bytes = spec.target_layout.total_bytes();
        let id = provider.acquire(device, false, bytes)?;
        Some((device, DataLayout::contiguous(id, 0, bytes)))
    } else {
        None
    };

    let mut plan = CopyPlan::default();
    match (source_staging, target_staging) {
        (Some((src_stage_dev, staged_src)), Some((tgt_stage_dev, staged_tgt))) => {
            plan.push(
                CopySpec::new(spec.source_device, spec.source_layout, src_stage_dev, staged_src)
                    .with_properties(props),
            );
            plan.push(
                CopySpec::new(src_stage_dev, staged_src, tgt_stage_dev, staged_tgt)
                    .with_properties(props),
            );
            plan.push(
                CopySpec::new(tgt_stage_dev, staged_tgt, spec.target_device, spec.target_layout)
                    .with_properties(props),
            );
        }
        (Some((src_stage_dev, staged_src)), None) => {
            plan.push(
                CopySpec::new(spec.source_device, spec.source_layout, src_stage_dev, staged_src)
                    .with_properties(props),
            );
            plan.push(
                CopySpec::new(src_stage_dev, staged_src, spec.target_device, spec.target_layout)
                    .with_properties(props),
            );
        }
        (None, Some((tgt_stage_dev, staged_tgt))) => {
            plan.push(
                CopySpec::new(spec.source_device, spec.source_layout, tgt_stage_dev, staged_tgt)
                    .with_properties(props),
            );
            plan.push(
                CopySpec::new(tgt_stage_dev, staged_tgt, spec.target_device, spec.target_layout)
                    .with_properties(props),
            );
        }
        // both sides unit stride is the contiguous case handled above
        (None, None) => unreachable!("staging requested for a contiguous spec"),
    }
    debug!(steps = plan.len(), "staged copy spec");
    Ok(plan)
}

/// Apply [`apply_staging`] to every plan of a chunked set.
///
/// The input must come out of [`apply_chunking`](crate::apply_chunking):
/// every plan holds exactly one step.
pub fn apply_staging_set(
    set: &ParallelCopySet,
    strategy: &CopyStrategy,
    provider: &mut dyn StagingProvider,
) -> Result<ParallelCopySet> {
    let mut out = ParallelCopySet::new();
    for plan in set.iter() {
        if plan.len() != 1 {
            return Err(PlanError::MultiStepPlan {
                len: plan.len(),
                plan: plan.to_string(),
            });
        }
        out.insert(apply_staging(&plan[0], strategy, provider)?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::properties::CopyProperties;
    use rstest::rstest;

    const D0: DeviceId = DeviceId::Device(0);
    const D1: DeviceId = DeviceId::Device(1);
    const HOST: DeviceId = DeviceId::Host;

    /// Pins every staging index to 42, like a fixed fixture.
    struct FixedProvider;

    impl StagingProvider for FixedProvider {
        fn acquire(&mut self, device: DeviceId, on_host: bool, size: usize) -> Result<StagingId> {
            assert!(size > 0);
            assert!(!device.is_host());
            Ok(StagingId {
                on_host,
                device,
                index: 42,
            })
        }
    }

    #[test]
    fn direct_strategy_passes_through() {
        let spec = CopySpec::new(
            D0,
            DataLayout::strided(0usize, 0, 16, 64, 128),
            D1,
            DataLayout::contiguous(0usize, 0, 1024),
        );
        let plan = apply_staging(&spec, &CopyStrategy::direct(), &mut FixedProvider).unwrap();
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0], spec);
    }

    #[rstest]
    #[case(CopyStrategy::direct())]
    #[case(CopyStrategy::staged())]
    fn contiguous_spec_needs_no_staging(#[case] strategy: CopyStrategy) {
        let layout = DataLayout::contiguous(0usize, 0, 1024);
        let spec = CopySpec::new(D0, layout, D1, DataLayout::contiguous(0usize, 2048, 1024));
        let plan = apply_staging(&spec, &strategy, &mut FixedProvider).unwrap();
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0], spec);
    }

    #[rstest]
    #[case(D0, D1)]
    #[case(HOST, D0)]
    #[case(D0, HOST)]
    fn staging_at_the_source_end(
        #[case] src_dev: DeviceId,
        #[case] tgt_dev: DeviceId,
        #[values(CopyProperties::NONE, CopyProperties::USE_KERNEL)] props: CopyProperties,
    ) {
        let source_layout = DataLayout::strided(0usize, 0, 16, 64, 128);
        let target_layout = DataLayout::contiguous(0usize, 0, 1024);
        let spec = CopySpec::new(src_dev, source_layout, tgt_dev, target_layout);
        let strategy = CopyStrategy::staged().with_properties(props);

        let plan = apply_staging(&spec, &strategy, &mut FixedProvider).unwrap();
        assert_eq!(plan.len(), 2);

        let staging_device = if src_dev.is_host() { tgt_dev } else { src_dev };
        let expected_staging = StagingId {
            on_host: false,
            device: staging_device,
            index: 42,
        };

        assert_eq!(plan[0].properties, props);
        assert_eq!(plan[0].source_device, src_dev);
        assert_eq!(plan[0].source_layout, source_layout);
        assert_eq!(plan[0].target_device, staging_device);
        assert!(plan[0].target_layout.unit_stride());
        assert_eq!(plan[0].target_layout.base, expected_staging.into());

        assert_eq!(plan[1].properties, props);
        assert_eq!(plan[1].source_device, staging_device);
        assert_eq!(plan[1].source_layout, plan[0].target_layout);
        assert_eq!(plan[1].target_device, tgt_dev);
        assert_eq!(plan[1].target_layout, target_layout);

        assert!(plan.implements(&spec));
    }

    #[rstest]
    #[case(D0, D1)]
    #[case(HOST, D0)]
    #[case(D0, HOST)]
    fn staging_at_the_target_end(
        #[case] src_dev: DeviceId,
        #[case] tgt_dev: DeviceId,
        #[values(CopyProperties::NONE, CopyProperties::USE_KERNEL)] props: CopyProperties,
    ) {
        let source_layout = DataLayout::contiguous(0usize, 0, 512);
        let target_layout = DataLayout::strided(0usize, 0, 8, 64, 77);
        let spec = CopySpec::new(src_dev, source_layout, tgt_dev, target_layout);
        let strategy = CopyStrategy::staged().with_properties(props);

        let plan = apply_staging(&spec, &strategy, &mut FixedProvider).unwrap();
        assert_eq!(plan.len(), 2);

        let staging_device = if tgt_dev.is_host() { src_dev } else { tgt_dev };
        let expected_staging = StagingId {
            on_host: false,
            device: staging_device,
            index: 42,
        };

        assert_eq!(plan[0].properties, props);
        assert_eq!(plan[0].source_device, src_dev);
        assert_eq!(plan[0].source_layout, source_layout);
        assert_eq!(plan[0].target_device, staging_device);
        assert!(plan[0].target_layout.unit_stride());
        assert_eq!(plan[0].target_layout.base, expected_staging.into());

        assert_eq!(plan[1].properties, props);
        assert_eq!(plan[1].source_device, staging_device);
        assert_eq!(plan[1].source_layout, plan[0].target_layout);
        assert_eq!(plan[1].target_device, tgt_dev);
        assert_eq!(plan[1].target_layout, target_layout);

        assert!(plan.implements(&spec));
    }

    #[rstest]
    fn staging_at_both_ends(
        #[values(128, 512)] stride: usize,
        #[values(0, 31337)] offset: usize,
        #[values(CopyProperties::NONE, CopyProperties::USE_KERNEL, CopyProperties::USE_2D)]
        props: CopyProperties,
    ) {
        let layout = DataLayout::strided(0usize, offset, 32, 16, stride);
        let spec = CopySpec::new(D0, layout, D1, layout);
        let strategy = CopyStrategy::staged().with_properties(props);

        let plan = apply_staging(&spec, &strategy, &mut FixedProvider).unwrap();
        assert_eq!(plan.len(), 3);

        let staging_d0 = StagingId {
            on_host: false,
            device: D0,
            index: 42,
        };
        let staging_d1 = StagingId {
            on_host: false,
            device: D1,
            index: 42,
        };

        assert_eq!(plan[0].source_device, D0);
        assert_eq!(plan[0].source_layout, layout);
        assert_eq!(plan[0].target_device, D0);
        assert!(plan[0].target_layout.unit_stride());
        assert_eq!(plan[0].target_layout.base, staging_d0.into());

        assert_eq!(plan[1].source_device, D0);
        assert_eq!(plan[1].source_layout, plan[0].target_layout);
        assert_eq!(plan[1].target_device, D1);
        assert!(plan[1].target_layout.unit_stride());
        assert_eq!(plan[1].target_layout.base, staging_d1.into());

        assert_eq!(plan[2].source_device, D1);
        assert_eq!(plan[2].source_layout, plan[1].target_layout);
        assert_eq!(plan[2].target_device, D1);
        assert_eq!(plan[2].target_layout, layout);

        for step in &plan {
            assert_eq!(step.properties, props);
        }
        assert!(plan.implements(&spec));
    }

    #[test]
    fn multi_step_plans_cannot_be_staged_again() {
        let layout = DataLayout::strided(0usize, 0, 16, 64, 128);
        let spec = CopySpec::new(D0, layout, D1, layout);
        let staged =
            apply_staging(&spec, &CopyStrategy::staged(), &mut BasicStagingProvider::new()).unwrap();
        let set: ParallelCopySet = vec![staged].into();
        let err =
            apply_staging_set(&set, &CopyStrategy::staged(), &mut BasicStagingProvider::new())
                .unwrap_err();
        assert!(matches!(err, PlanError::MultiStepPlan { len: 3, .. }));
    }

    #[test]
    fn basic_provider_counts_up() {
        let mut provider = BasicStagingProvider::new();
        let a = provider.acquire(D0, false, 64).unwrap();
        let b = provider.acquire(D1, true, 64).unwrap();
        assert_eq!(a.index, 0);
        assert_eq!(b.index, 1);
        assert!(b.on_host);
        assert!(matches!(
            provider.acquire(D0, false, 0),
            Err(PlanError::InvalidStagingSize(0))
        ));
        assert!(matches!(
            provider.acquire(HOST, false, 64),
            Err(PlanError::HostStagingDevice)
        ));
    }
}
