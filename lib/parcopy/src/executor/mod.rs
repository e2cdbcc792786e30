// SPDX-FileCopyrightText: Copyright (c) 2024-2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Execution driver: binds plans to backend queues.
//!
//! Within one plan, steps run in order on a queue chain: the driver tracks
//! the last queue it targeted and waits on it whenever the next step moves to
//! a different queue (in-order queues make waits within one queue
//! unnecessary). Plans of a [`ParallelCopySet`] are independent: they are
//! partitioned over `queues_per_device` workers, each worker owning its queue
//! index on every device it touches, so no two workers ever share a queue.
//! `execute` returns only after a full barrier.

mod resolver;

use anyhow::{Result, bail, ensure};
use std::sync::{Arc, Mutex};
use tracing::{debug, trace};

use crate::backend::{CopyBackend, QueueId};
use crate::device::DeviceId;
use crate::layout::DataLayout;
use crate::spec::{CopyPlan, CopySpec, ParallelCopySet};
use resolver::StagingResolver;

/// Drives plans against a [`CopyBackend`].
///
/// The executor owns all device and host allocations (through the backend)
/// for its lifetime; specs reference them by plain address and must not
/// outlive it.
pub struct Executor {
    backend: Arc<dyn CopyBackend>,
    pool: rayon::ThreadPool,
}

impl Executor {
    pub fn new(backend: Arc<dyn CopyBackend>) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(backend.queues_per_device())
            .thread_name(|i| format!("parcopy-worker-{i}"))
            .build()?;
        Ok(Self { backend, pool })
    }

    pub fn backend(&self) -> &Arc<dyn CopyBackend> {
        &self.backend
    }

    /// Execute a single copy spec and wait for it to complete.
    pub fn execute_spec(&self, spec: &CopySpec) -> Result<()> {
        self.execute_plan(&CopyPlan::single(*spec))
    }

    /// Execute the steps of one plan in order and wait for completion.
    pub fn execute_plan(&self, plan: &CopyPlan) -> Result<()> {
        ensure!(plan.is_valid(), "invalid copy plan: {}", plan);
        let resolver = Mutex::new(StagingResolver::new(self.backend.buffer_size()));
        self.run_plan_on_queue(plan, 0, &resolver)
    }

    /// Execute all plans of the set, spreading them across queue indices.
    ///
    /// Returns only after every enqueued command completed. Plans must be
    /// independent; no cross-plan ordering is promised.
    pub fn execute(&self, set: &ParallelCopySet) -> Result<()> {
        ensure!(set.is_valid(), "invalid parallel copy set: {}", set);
        let queues = self.backend.queues_per_device();
        let resolver = Mutex::new(StagingResolver::new(self.backend.buffer_size()));

        let mut buckets: Vec<Vec<&CopyPlan>> = vec![Vec::new(); queues];
        for (i, plan) in set.iter().enumerate() {
            buckets[i % queues].push(plan);
        }
        debug!(
            plans = set.len(),
            workers = queues,
            "executing parallel copy set"
        );

        let errors: Mutex<Vec<anyhow::Error>> = Mutex::new(Vec::new());
        self.pool.scope(|scope| {
            for (queue_index, bucket) in buckets.into_iter().enumerate() {
                let resolver = &resolver;
                let errors = &errors;
                scope.spawn(move |_| {
                    for plan in bucket {
                        if let Err(error) = self.run_plan_on_queue(plan, queue_index, resolver) {
                            errors.lock().expect("error lock poisoned").push(error);
                            return;
                        }
                    }
                });
            }
        });
        if let Some(error) = errors.into_inner().expect("error lock poisoned").pop() {
            return Err(error);
        }
        self.barrier()
    }

    /// Wait for every queue on every device to drain.
    pub fn barrier(&self) -> Result<()> {
        for device in 0..self.backend.num_devices() {
            for index in 0..self.backend.queues_per_device() {
                self.backend.wait(QueueId {
                    device: DeviceId::Device(device as u8),
                    index,
                })?;
            }
        }
        Ok(())
    }

    fn run_plan_on_queue(
        &self,
        plan: &CopyPlan,
        queue_index: usize,
        resolver: &Mutex<StagingResolver>,
    ) -> Result<()> {
        let mut last: Option<QueueId> = None;
        for step in plan {
            let mut step = *step;
            resolver
                .lock()
                .expect("resolver lock poisoned")
                .resolve_spec(self.backend.as_ref(), &mut step)?;
            self.run_step(&step, queue_index, &mut last)?;
        }
        if let Some(queue) = last {
            self.backend.wait(queue)?;
        }
        Ok(())
    }

    /// Enqueue one resolved step, inserting a wait on the previous queue when
    /// the step moves to a different one.
    fn run_step(
        &self,
        spec: &CopySpec,
        queue_index: usize,
        last: &mut Option<QueueId>,
    ) -> Result<()> {
        ensure!(spec.is_valid(), "invalid copy specification: {}", spec);
        ensure!(
            !spec.source_layout.is_unplaced() && !spec.target_layout.is_unplaced(),
            "unresolved staging base in {}",
            spec
        );
        trace!(step = %spec, queue_index, "executing copy step");

        let host_to_host = spec.source_device.is_host() && spec.target_device.is_host();
        let queue = if host_to_host {
            None
        } else {
            let device = if !spec.source_device.is_host() {
                spec.source_device
            } else {
                spec.target_device
            };
            Some(QueueId {
                device,
                index: queue_index,
            })
        };

        if let Some(previous) = *last {
            if queue != Some(previous) {
                self.backend.wait(previous)?;
            }
        }

        match queue {
            None => host_copy(spec)?,
            Some(queue) => self.enqueue(queue, spec)?,
        }
        *last = queue;
        Ok(())
    }

    fn enqueue(&self, queue: QueueId, spec: &CopySpec) -> Result<()> {
        let cross_device = !spec.source_device.is_host()
            && !spec.target_device.is_host()
            && spec.source_device != spec.target_device;
        if cross_device && !self.backend.has_d2d_copy() {
            bail!("direct device-to-device copy not available for {}", spec);
        }

        let source = &spec.source_layout;
        let target = &spec.target_layout;
        // kernels cannot touch host memory; fall back to linear copies there
        if spec.properties.use_kernel
            && !spec.source_device.is_host()
            && !spec.target_device.is_host()
        {
            self.backend.copy_via_kernel(queue, spec)
        } else if spec.properties.use_2d {
            let src = source.addr().expect("checked above") + source.offset;
            let dst = target.addr().expect("checked above") + target.offset;
            // rows come from the strided side; a unit-stride side packs the
            // same rows back to back
            let (width, count) = if !source.unit_stride() {
                (source.fragment_length, source.fragment_count)
            } else {
                (target.fragment_length, target.fragment_count)
            };
            let src_pitch = if source.unit_stride() {
                width
            } else {
                source.effective_stride()
            };
            let dst_pitch = if target.unit_stride() {
                width
            } else {
                target.effective_stride()
            };
            self.backend
                .copy_2d(queue, src, src_pitch, dst, dst_pitch, width, count)
        } else {
            let src_base = source.addr().expect("checked above");
            let dst_base = target.addr().expect("checked above");
            for_each_fragment_pair(source, target, |src_offset, dst_offset, len| {
                self.backend
                    .copy_linear(queue, src_base + src_offset, dst_base + dst_offset, len)
            })
        }
    }
}

/// Pair off fragments of two layouts with possibly different fragment
/// lengths. Each pairing copies `min(source, target)` fragment-length bytes;
/// the longer side's fragments are split into that many sub-runs.
fn for_each_fragment_pair(
    source: &DataLayout,
    target: &DataLayout,
    mut apply: impl FnMut(usize, usize, usize) -> Result<()>,
) -> Result<()> {
    let fragment_count = source.fragment_count.max(target.fragment_count);
    let length = source.fragment_length.min(target.fragment_length);
    let src_factor = source.fragment_length / length;
    let tgt_factor = target.fragment_length / length;
    for fragment in 0..fragment_count {
        let src_offset = source.fragment_offset(fragment / src_factor)
            + (fragment % src_factor) * target.fragment_length;
        let tgt_offset = target.fragment_offset(fragment / tgt_factor)
            + (fragment % tgt_factor) * source.fragment_length;
        apply(src_offset, tgt_offset, length)?;
    }
    Ok(())
}

/// Host-to-host copies bypass queues entirely.
fn host_copy(spec: &CopySpec) -> Result<()> {
    let src_base = spec
        .source_layout
        .addr()
        .ok_or_else(|| anyhow::anyhow!("unresolved staging base in {}", spec))?;
    let dst_base = spec
        .target_layout
        .addr()
        .ok_or_else(|| anyhow::anyhow!("unresolved staging base in {}", spec))?;
    for_each_fragment_pair(&spec.source_layout, &spec.target_layout, |src, dst, len| {
        unsafe {
            std::ptr::copy_nonoverlapping(
                (src_base + src) as *const u8,
                (dst_base + dst) as *mut u8,
                len,
            );
        }
        Ok(())
    })
}
