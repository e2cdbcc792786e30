// SPDX-FileCopyrightText: Copyright (c) 2024-2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Placement of symbolic staging buffers into concrete staging regions.
//!
//! A resolver is scoped to one `execute` call: it carves staging allocations
//! out of the per-device staging regions monotonically and remembers where
//! each [`StagingId`] landed, so every step referring to the same id sees the
//! same address. The regions themselves are owned by the backend; nothing is
//! freed here.

use anyhow::{Result, bail, ensure};
use std::collections::HashMap;

use crate::backend::CopyBackend;
use crate::device::{DeviceId, MAX_DEVICES};
use crate::layout::{DataLayout, LayoutBase};
use crate::spec::CopySpec;

/// Allocation granularity within staging regions.
const STAGING_ALIGNMENT: usize = 128;

fn align_up(size: usize) -> usize {
    (size + STAGING_ALIGNMENT - 1) & !(STAGING_ALIGNMENT - 1)
}

#[derive(Debug, Clone, Copy)]
struct StagingEntry {
    device: DeviceId,
    on_host: bool,
    addr: usize,
    size: usize,
}

#[derive(Debug)]
pub(crate) struct StagingResolver {
    region_size: usize,
    offsets: [usize; MAX_DEVICES],
    host_offsets: [usize; MAX_DEVICES],
    table: HashMap<u32, StagingEntry>,
}

impl StagingResolver {
    pub(crate) fn new(region_size: usize) -> Self {
        Self {
            region_size,
            offsets: [0; MAX_DEVICES],
            host_offsets: [0; MAX_DEVICES],
            table: HashMap::new(),
        }
    }

    /// Replace a staging base with a concrete address, allocating on first
    /// sight. Repeated resolutions of one id must agree on size, device, and
    /// region; disagreement is a planner bug surfaced as an error.
    pub(crate) fn resolve_layout(
        &mut self,
        backend: &dyn CopyBackend,
        layout: &mut DataLayout,
    ) -> Result<()> {
        let LayoutBase::Staging(id) = layout.base else {
            return Ok(());
        };
        let size = layout.total_extent();

        if let Some(entry) = self.table.get(&id.index) {
            ensure!(
                entry.size == size,
                "staging buffer size mismatch for {}: {} != {}",
                id,
                entry.size,
                size
            );
            ensure!(entry.device == id.device, "staging buffer device mismatch for {}", id);
            ensure!(entry.on_host == id.on_host, "staging buffer region mismatch for {}", id);
            layout.base = LayoutBase::Addr(entry.addr);
            return Ok(());
        }

        let Some(device_index) = id.device.index() else {
            bail!("staging id {} refers to the host pseudo-device", id);
        };
        let (region_base, offset) = if id.on_host {
            (
                backend.host_staging_buffer(id.device)?,
                &mut self.host_offsets[device_index],
            )
        } else {
            (
                backend.staging_buffer(id.device)?,
                &mut self.offsets[device_index],
            )
        };

        ensure!(
            *offset + size <= self.region_size,
            "staging buffer overflow {}for device {} ({} + {} > {})",
            if id.on_host { "on host " } else { "" },
            id.device,
            *offset,
            size,
            self.region_size
        );
        let addr = region_base + *offset;
        *offset += align_up(size);

        self.table.insert(
            id.index,
            StagingEntry {
                device: id.device,
                on_host: id.on_host,
                addr,
                size,
            },
        );
        layout.base = LayoutBase::Addr(addr);
        Ok(())
    }

    pub(crate) fn resolve_spec(
        &mut self,
        backend: &dyn CopyBackend,
        spec: &mut CopySpec,
    ) -> Result<()> {
        self.resolve_layout(backend, &mut spec.source_layout)?;
        self.resolve_layout(backend, &mut spec.target_layout)
    }
}
