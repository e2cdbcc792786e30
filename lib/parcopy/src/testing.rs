// SPDX-FileCopyrightText: Copyright (c) 2024-2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Byte-level helpers for verifying transfers.
//!
//! These operate on raw addresses and are meant for test code running against
//! host-resident memory such as [`SimBackend`](crate::SimBackend) regions.

use anyhow::{Result, bail};

use crate::spec::CopySpec;

/// Byte pattern for initializing buffers before a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillPattern {
    /// Position-dependent bytes (`i % 256`); catches reordered fragments.
    Sequential,
    /// One constant byte everywhere.
    Constant(u8),
}

impl FillPattern {
    pub fn byte_at(&self, index: usize) -> u8 {
        match self {
            FillPattern::Sequential => (index % 256) as u8,
            FillPattern::Constant(value) => *value,
        }
    }
}

/// Write `len` patterned bytes at `addr`.
pub fn write_pattern(addr: usize, len: usize, pattern: FillPattern) {
    for i in 0..len {
        unsafe {
            *((addr + i) as *mut u8) = pattern.byte_at(i);
        }
    }
}

/// Read `len` bytes at `addr`.
pub fn read_bytes(addr: usize, len: usize) -> Vec<u8> {
    unsafe { std::slice::from_raw_parts(addr as *const u8, len) }.to_vec()
}

/// Check that a completed transfer moved its bytes exactly: walks the
/// logical byte axis of `spec` and compares each source byte with the target
/// byte it maps to. The spec must be fully resolved.
pub fn verify_copy(spec: &CopySpec) -> Result<()> {
    let Some(src_base) = spec.source_layout.addr() else {
        bail!("unresolved staging base in {}", spec);
    };
    let Some(dst_base) = spec.target_layout.addr() else {
        bail!("unresolved staging base in {}", spec);
    };

    let source = &spec.source_layout;
    let target = &spec.target_layout;
    for logical in 0..source.total_bytes() {
        let src_offset = source.fragment_offset(logical / source.fragment_length)
            + logical % source.fragment_length;
        let dst_offset = target.fragment_offset(logical / target.fragment_length)
            + logical % target.fragment_length;
        let src_byte = unsafe { *((src_base + src_offset) as *const u8) };
        let dst_byte = unsafe { *((dst_base + dst_offset) as *const u8) };
        if src_byte != dst_byte {
            bail!(
                "byte mismatch at logical offset {} (source {:#04x}, target {:#04x}) for {}",
                logical,
                src_byte,
                dst_byte,
                spec
            );
        }
    }
    Ok(())
}
