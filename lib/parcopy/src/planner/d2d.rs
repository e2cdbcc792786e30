// SPDX-FileCopyrightText: Copyright (c) 2024-2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Rewriting device-to-device steps into host hops.
//!
//! Hardware without peer copy support cannot move bytes between two devices
//! directly; these rewrites replace each device↔device step with hops through
//! host-pinned staging. The host-side layouts keep the fragment geometry of
//! the replaced step; linearization, if wanted, has already happened in
//! [`apply_staging`](crate::apply_staging).

use tracing::debug;

use crate::device::DeviceId;
use crate::error::Result;
use crate::layout::DataLayout;
use crate::planner::staging::StagingProvider;
use crate::spec::{CopyPlan, CopySpec, ParallelCopySet};
use crate::strategy::D2dImplementation;

fn host_staged(
    provider: &mut dyn StagingProvider,
    device: DeviceId,
    layout: &DataLayout,
) -> Result<DataLayout> {
    let id = provider.acquire(device, true, layout.total_extent())?;
    Ok(DataLayout::rebased(id, layout))
}

/// Rewrite every direct device↔device step of `plan` according to `d2d`.
///
/// Steps with a host endpoint, steps within one device, and the
/// [`D2dImplementation::Direct`] policy pass through unchanged. Inserted
/// steps carry the properties of the step they replace.
pub fn apply_d2d_implementation(
    plan: &CopyPlan,
    d2d: D2dImplementation,
    provider: &mut dyn StagingProvider,
) -> Result<CopyPlan> {
    let mut out = CopyPlan::default();
    for step in plan {
        let cross_device = !step.source_device.is_host()
            && !step.target_device.is_host()
            && step.source_device != step.target_device;
        if !cross_device || d2d == D2dImplementation::Direct {
            out.push(*step);
            continue;
        }

        let props = step.properties;
        match d2d {
            D2dImplementation::HostStagingAtSource => {
                let staged = host_staged(provider, step.source_device, &step.source_layout)?;
                out.push(
                    CopySpec::new(
                        step.source_device,
                        step.source_layout,
                        DeviceId::Host,
                        staged,
                    )
                    .with_properties(props),
                );
                out.push(
                    CopySpec::new(DeviceId::Host, staged, step.target_device, step.target_layout)
                        .with_properties(props),
                );
            }
            D2dImplementation::HostStagingAtTarget => {
                let staged = host_staged(provider, step.target_device, &step.target_layout)?;
                out.push(
                    CopySpec::new(
                        step.source_device,
                        step.source_layout,
                        DeviceId::Host,
                        staged,
                    )
                    .with_properties(props),
                );
                out.push(
                    CopySpec::new(DeviceId::Host, staged, step.target_device, step.target_layout)
                        .with_properties(props),
                );
            }
            D2dImplementation::HostStagingAtBoth => {
                let staged_src = host_staged(provider, step.source_device, &step.source_layout)?;
                let staged_tgt = host_staged(provider, step.target_device, &step.target_layout)?;
                out.push(
                    CopySpec::new(
                        step.source_device,
                        step.source_layout,
                        DeviceId::Host,
                        staged_src,
                    )
                    .with_properties(props),
                );
                out.push(
                    CopySpec::new(DeviceId::Host, staged_src, DeviceId::Host, staged_tgt)
                        .with_properties(props),
                );
                out.push(
                    CopySpec::new(DeviceId::Host, staged_tgt, step.target_device, step.target_layout)
                        .with_properties(props),
                );
            }
            D2dImplementation::Direct => unreachable!(),
        }
    }
    if out.len() != plan.len() {
        debug!(
            before = plan.len(),
            after = out.len(),
            %d2d,
            "rewrote device-to-device steps"
        );
    }
    Ok(out)
}

/// Apply [`apply_d2d_implementation`] to every plan in the set.
pub fn apply_d2d_implementation_set(
    set: &ParallelCopySet,
    d2d: D2dImplementation,
    provider: &mut dyn StagingProvider,
) -> Result<ParallelCopySet> {
    let mut out = ParallelCopySet::new();
    for plan in set.iter() {
        out.insert(apply_d2d_implementation(plan, d2d, provider)?);
    }
    Ok(out)
}
