// SPDX-FileCopyrightText: Copyright (c) 2024-2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! In-process reference backend.
//!
//! `SimBackend` models up to [`MAX_DEVICES`](crate::MAX_DEVICES) accelerators entirely in host
//! memory: every device owns four fixed-size allocations (general buffer,
//! staging buffer, and their host-pinned counterparts), and every queue is an
//! eager in-order stream: commands complete during enqueue and `wait` is a
//! no-op. Each queue keeps a journal of executed commands so tests can assert
//! on dispatch decisions, not just resulting bytes.

use anyhow::{Result, anyhow, bail, ensure};
use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::trace;
use validator::Validate;

use super::{CopyBackend, QueueId};
use crate::device::DeviceId;
use crate::spec::CopySpec;

/// Configuration for a [`SimBackend`].
#[derive(Debug, Clone, Builder, Validate, Serialize, Deserialize, PartialEq, Eq)]
#[builder(pattern = "owned")]
pub struct SimBackendConfig {
    /// Size of each per-device allocation, in bytes.
    #[validate(range(min = 1))]
    pub buffer_size: usize,

    /// Number of simulated devices.
    #[validate(range(min = 1, max = 8))]
    #[builder(default = "1")]
    pub num_devices: usize,

    /// Queues per simulated device.
    #[validate(range(min = 1))]
    #[builder(default = "1")]
    pub queues_per_device: usize,

    /// Advertise the native 2-D copy primitive.
    #[builder(default = "true")]
    pub enable_2d_copy: bool,

    /// Advertise direct device-to-device copies.
    #[builder(default = "true")]
    pub enable_d2d_copy: bool,
}

impl SimBackendConfig {
    pub fn builder() -> SimBackendConfigBuilder {
        SimBackendConfigBuilder::default()
    }
}

/// A fixed host allocation with a stable address, released on drop.
#[derive(Debug)]
struct Region {
    ptr: *mut u8,
    len: usize,
}

// Raw pointers into an allocation this type owns; access synchronization is
// the caller's contract (independent plans touch disjoint ranges).
unsafe impl Send for Region {}
unsafe impl Sync for Region {}

impl Region {
    fn new(len: usize) -> Self {
        let boxed = vec![0u8; len].into_boxed_slice();
        let ptr = Box::into_raw(boxed) as *mut u8;
        Self { ptr, len }
    }

    fn addr(&self) -> usize {
        self.ptr as usize
    }
}

impl Drop for Region {
    fn drop(&mut self) {
        unsafe {
            drop(Box::from_raw(std::ptr::slice_from_raw_parts_mut(
                self.ptr, self.len,
            )));
        }
    }
}

#[derive(Debug)]
struct SimDevice {
    buffer: Region,
    staging_buffer: Region,
    host_buffer: Region,
    host_staging_buffer: Region,
}

/// Commands executed by a simulated queue, in enqueue order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimCommand {
    Fill {
        addr: usize,
        value: u8,
        len: usize,
    },
    CopyLinear {
        src: usize,
        dst: usize,
        len: usize,
    },
    Copy2d {
        src: usize,
        src_stride: usize,
        dst: usize,
        dst_stride: usize,
        fragment_length: usize,
        fragment_count: usize,
    },
    KernelCopy {
        total_bytes: usize,
        lane: usize,
    },
    Wait,
}

/// Simulated backend over host allocations.
#[derive(Debug)]
pub struct SimBackend {
    config: SimBackendConfig,
    devices: Vec<SimDevice>,
    journal: Mutex<HashMap<QueueId, Vec<SimCommand>>>,
}

impl SimBackend {
    pub fn new(config: SimBackendConfig) -> Result<Self> {
        config.validate()?;
        let devices = (0..config.num_devices)
            .map(|_| SimDevice {
                buffer: Region::new(config.buffer_size),
                staging_buffer: Region::new(config.buffer_size),
                host_buffer: Region::new(config.buffer_size),
                host_staging_buffer: Region::new(config.buffer_size),
            })
            .collect();
        Ok(Self {
            config,
            devices,
            journal: Mutex::new(HashMap::new()),
        })
    }

    fn device(&self, device: DeviceId) -> Result<&SimDevice> {
        let index = device
            .index()
            .ok_or_else(|| anyhow!("host has no per-device allocations"))?;
        self.devices.get(index).ok_or_else(|| {
            anyhow!(
                "invalid device id: {} ({} device(s) available)",
                device,
                self.devices.len()
            )
        })
    }

    fn check_queue(&self, queue: QueueId) -> Result<()> {
        self.device(queue.device)?;
        ensure!(
            queue.index < self.config.queues_per_device,
            "invalid queue index: {} ({} queue(s) per device)",
            queue.index,
            self.config.queues_per_device
        );
        Ok(())
    }

    fn record(&self, queue: QueueId, command: SimCommand) {
        trace!(%queue, ?command, "sim command");
        self.journal
            .lock()
            .expect("journal lock poisoned")
            .entry(queue)
            .or_default()
            .push(command);
    }

    /// Commands executed on `queue` so far, in order.
    pub fn journal(&self, queue: QueueId) -> Vec<SimCommand> {
        self.journal
            .lock()
            .expect("journal lock poisoned")
            .get(&queue)
            .cloned()
            .unwrap_or_default()
    }

    pub fn clear_journal(&self) {
        self.journal.lock().expect("journal lock poisoned").clear();
    }
}

/// Widest power-of-two lane (in bytes) that divides both fragment lengths
/// and both strides, from the vector ladder 64/32/16/8/4/2/1.
fn kernel_lane_width(spec: &CopySpec) -> usize {
    let smaller_fragment = spec
        .source_layout
        .fragment_length
        .min(spec.target_layout.fragment_length);
    let smaller_stride = spec
        .source_layout
        .effective_stride()
        .min(spec.target_layout.effective_stride());
    [64, 32, 16, 8, 4, 2]
        .into_iter()
        .find(|lane| smaller_fragment % lane == 0 && smaller_stride % lane == 0)
        .unwrap_or(1)
}

impl CopyBackend for SimBackend {
    fn num_devices(&self) -> usize {
        self.config.num_devices
    }

    fn queues_per_device(&self) -> usize {
        self.config.queues_per_device
    }

    fn buffer_size(&self) -> usize {
        self.config.buffer_size
    }

    fn buffer(&self, device: DeviceId) -> Result<usize> {
        Ok(self.device(device)?.buffer.addr())
    }

    fn staging_buffer(&self, device: DeviceId) -> Result<usize> {
        Ok(self.device(device)?.staging_buffer.addr())
    }

    fn host_buffer(&self, device: DeviceId) -> Result<usize> {
        Ok(self.device(device)?.host_buffer.addr())
    }

    fn host_staging_buffer(&self, device: DeviceId) -> Result<usize> {
        Ok(self.device(device)?.host_staging_buffer.addr())
    }

    fn fill(&self, queue: QueueId, addr: usize, value: u8, len: usize) -> Result<()> {
        self.check_queue(queue)?;
        unsafe {
            std::ptr::write_bytes(addr as *mut u8, value, len);
        }
        self.record(queue, SimCommand::Fill { addr, value, len });
        Ok(())
    }

    fn copy_linear(&self, queue: QueueId, src: usize, dst: usize, len: usize) -> Result<()> {
        self.check_queue(queue)?;
        unsafe {
            std::ptr::copy_nonoverlapping(src as *const u8, dst as *mut u8, len);
        }
        self.record(queue, SimCommand::CopyLinear { src, dst, len });
        Ok(())
    }

    fn copy_2d(
        &self,
        queue: QueueId,
        src: usize,
        src_stride: usize,
        dst: usize,
        dst_stride: usize,
        fragment_length: usize,
        fragment_count: usize,
    ) -> Result<()> {
        self.check_queue(queue)?;
        if !self.config.enable_2d_copy {
            bail!("2D copy requested, but not supported by the backend");
        }
        for fragment in 0..fragment_count {
            unsafe {
                std::ptr::copy_nonoverlapping(
                    (src + fragment * src_stride) as *const u8,
                    (dst + fragment * dst_stride) as *mut u8,
                    fragment_length,
                );
            }
        }
        self.record(
            queue,
            SimCommand::Copy2d {
                src,
                src_stride,
                dst,
                dst_stride,
                fragment_length,
                fragment_count,
            },
        );
        Ok(())
    }

    fn copy_via_kernel(&self, queue: QueueId, spec: &CopySpec) -> Result<()> {
        self.check_queue(queue)?;
        ensure!(
            !spec.source_device.is_host() && !spec.target_device.is_host(),
            "kernel copy requires device-resident operands: {}",
            spec
        );
        let src_base = spec
            .source_layout
            .addr()
            .ok_or_else(|| anyhow!("unresolved staging base in {}", spec))?;
        let dst_base = spec
            .target_layout
            .addr()
            .ok_or_else(|| anyhow!("unresolved staging base in {}", spec))?;

        let lane = kernel_lane_width(spec);
        let source = &spec.source_layout;
        let target = &spec.target_layout;
        let src_fragment_elements = source.fragment_length / lane;
        let dst_fragment_elements = target.fragment_length / lane;
        let total_elements = source.total_bytes() / lane;

        for element in 0..total_elements {
            let src_offset = source.fragment_offset(element / src_fragment_elements)
                + (element % src_fragment_elements) * lane;
            let dst_offset = target.fragment_offset(element / dst_fragment_elements)
                + (element % dst_fragment_elements) * lane;
            unsafe {
                std::ptr::copy_nonoverlapping(
                    (src_base + src_offset) as *const u8,
                    (dst_base + dst_offset) as *mut u8,
                    lane,
                );
            }
        }
        self.record(
            queue,
            SimCommand::KernelCopy {
                total_bytes: source.total_bytes(),
                lane,
            },
        );
        Ok(())
    }

    fn wait(&self, queue: QueueId) -> Result<()> {
        self.check_queue(queue)?;
        self.record(queue, SimCommand::Wait);
        Ok(())
    }

    fn has_2d_copy(&self) -> bool {
        self.config.enable_2d_copy
    }

    fn has_d2d_copy(&self) -> bool {
        self.config.enable_d2d_copy
    }

    fn has_peer_access(&self) -> bool {
        false
    }

    fn preferred_wg_size(&self) -> usize {
        32
    }

    fn info(&self) -> String {
        format!(
            "simulated backend: {} device(s), {} queue(s) per device, {} B per region",
            self.config.num_devices, self.config.queues_per_device, self.config.buffer_size
        )
    }
}
