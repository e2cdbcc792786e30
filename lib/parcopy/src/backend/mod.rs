// SPDX-FileCopyrightText: Copyright (c) 2024-2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Capability surface over the accelerator runtime.
//!
//! The executor depends on this trait only; the real runtime (queues, device
//! allocations, copy engines, kernels) sits behind it. [`sim::SimBackend`]
//! is the in-process reference implementation used throughout the test
//! suite.

pub mod sim;

use anyhow::Result;
use std::fmt;

use crate::device::DeviceId;
use crate::spec::{CopySpec, ParallelCopySet};

/// One in-order command stream on one device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueueId {
    /// Owning device; never [`DeviceId::Host`].
    pub device: DeviceId,
    /// Queue index within the device, `< queues_per_device`.
    pub index: usize,
}

impl fmt::Display for QueueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:q{}", self.device, self.index)
    }
}

/// Whether a spec can be executed as-is on a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Possibility {
    Possible,
    /// The spec asks for the native 2-D copy primitive, which the backend
    /// does not provide.
    Needs2dCopy,
    /// The spec needs a direct device-to-device path (or device-resident
    /// operands for a kernel copy) that the backend does not provide; a
    /// host-hop rewrite makes it executable.
    NeedsD2dCopy,
}

/// Abstraction over the accelerator runtime.
///
/// Queues are FIFO, in-order command streams. The four buffer accessors
/// return base addresses of fixed-size allocations (`buffer_size` bytes
/// each): a general device buffer, a device staging region, and their
/// host-pinned counterparts, one of each per device.
pub trait CopyBackend: Send + Sync {
    fn num_devices(&self) -> usize;

    fn queues_per_device(&self) -> usize;

    /// Size in bytes of each of the per-device allocations.
    fn buffer_size(&self) -> usize;

    fn buffer(&self, device: DeviceId) -> Result<usize>;

    fn staging_buffer(&self, device: DeviceId) -> Result<usize>;

    fn host_buffer(&self, device: DeviceId) -> Result<usize>;

    fn host_staging_buffer(&self, device: DeviceId) -> Result<usize>;

    /// Enqueue a fill of `len` bytes at `addr` with `value`.
    fn fill(&self, queue: QueueId, addr: usize, value: u8, len: usize) -> Result<()>;

    /// Enqueue a contiguous copy of `len` bytes.
    fn copy_linear(&self, queue: QueueId, src: usize, dst: usize, len: usize) -> Result<()>;

    /// Enqueue a native strided copy: `fragment_count` runs of
    /// `fragment_length` bytes, strided on both ends. May be unavailable;
    /// gate on [`CopyBackend::has_2d_copy`].
    #[allow(clippy::too_many_arguments)]
    fn copy_2d(
        &self,
        queue: QueueId,
        src: usize,
        src_stride: usize,
        dst: usize,
        dst_stride: usize,
        fragment_length: usize,
        fragment_count: usize,
    ) -> Result<()>;

    /// Enqueue a compute kernel implementing the strided copy element-wise.
    /// Only available when neither endpoint is the host; `spec` must be
    /// fully resolved.
    fn copy_via_kernel(&self, queue: QueueId, spec: &CopySpec) -> Result<()>;

    /// Block until all previously enqueued commands on `queue` completed.
    fn wait(&self, queue: QueueId) -> Result<()>;

    fn has_2d_copy(&self) -> bool;

    fn has_d2d_copy(&self) -> bool;

    fn has_peer_access(&self) -> bool;

    /// Preferred work-group size for kernel copies.
    fn preferred_wg_size(&self) -> usize;

    /// Human-readable description of the backend.
    fn info(&self) -> String;

    /// Whether `spec` is executable as-is, gated by the capability bits.
    fn can_execute(&self, spec: &CopySpec) -> Possibility {
        if spec.properties.use_2d && !self.has_2d_copy() {
            return Possibility::Needs2dCopy;
        }
        let cross_device = !spec.source_device.is_host()
            && !spec.target_device.is_host()
            && spec.source_device != spec.target_device;
        if cross_device && !self.has_d2d_copy() {
            return Possibility::NeedsD2dCopy;
        }
        if spec.properties.use_kernel
            && (spec.source_device.is_host() != spec.target_device.is_host())
        {
            return Possibility::NeedsD2dCopy;
        }
        Possibility::Possible
    }

    /// Worst [`Possibility`] over every step of every plan in the set.
    fn can_execute_set(&self, set: &ParallelCopySet) -> Possibility {
        let mut result = Possibility::Possible;
        for spec in set.iter().flat_map(|plan| plan.iter()) {
            match self.can_execute(spec) {
                Possibility::Possible => {}
                other => result = other,
            }
        }
        result
    }
}
