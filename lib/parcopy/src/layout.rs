// SPDX-FileCopyrightText: Copyright (c) 2024-2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Strided descriptions of memory regions.
//!
//! A [`DataLayout`] describes either side of a copy: `fragment_count`
//! contiguous runs of `fragment_length` bytes each, placed `stride` bytes
//! apart, starting `offset` bytes past `base`. The base is either a concrete
//! address into an externally owned buffer, or a symbolic [`StagingId`]
//! minted by the planner and resolved to an address at execution time.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::device::DeviceId;

/// Symbolic handle for a staging buffer that has not been placed yet.
///
/// Staging ids are minted by a [`StagingProvider`](crate::StagingProvider)
/// during planning and resolved to concrete addresses by the executor. The
/// `on_host` flag selects the host-pinned staging region associated with
/// `device` rather than its device-memory staging region; `device` is never
/// [`DeviceId::Host`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StagingId {
    pub on_host: bool,
    pub device: DeviceId,
    pub index: u32,
}

impl fmt::Display for StagingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.on_host {
            write!(f, "S({}, {} host)", self.index, self.device)
        } else {
            write!(f, "S({}, {})", self.index, self.device)
        }
    }
}

/// Base of a [`DataLayout`]: a concrete address or an unplaced staging handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LayoutBase {
    /// Byte address into an externally owned buffer. Layouts do not own the
    /// memory they point into.
    Addr(usize),
    /// Unplaced staging buffer; illegal to execute until resolved.
    Staging(StagingId),
}

impl From<usize> for LayoutBase {
    fn from(addr: usize) -> Self {
        LayoutBase::Addr(addr)
    }
}

impl From<StagingId> for LayoutBase {
    fn from(id: StagingId) -> Self {
        LayoutBase::Staging(id)
    }
}

impl fmt::Display for LayoutBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayoutBase::Addr(a) => write!(f, "{:#x}", a),
            LayoutBase::Staging(id) => write!(f, "{}", id),
        }
    }
}

/// A possibly-strided region used as the source or destination of a copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DataLayout {
    pub base: LayoutBase,
    /// Byte offset added to `base`.
    pub offset: usize,
    /// Bytes per contiguous fragment; always > 0 in a valid layout.
    pub fragment_length: usize,
    /// Number of fragments.
    pub fragment_count: usize,
    /// Byte distance between successive fragment starts. Must be at least
    /// `fragment_length`, except the degenerate contiguous form
    /// `fragment_count == 1, stride == 0`.
    pub stride: usize,
}

impl DataLayout {
    /// Single contiguous run of `len` bytes.
    pub fn contiguous(base: impl Into<LayoutBase>, offset: usize, len: usize) -> Self {
        Self {
            base: base.into(),
            offset,
            fragment_length: len,
            fragment_count: 1,
            stride: len,
        }
    }

    /// Strided region with explicit fragment geometry.
    pub fn strided(
        base: impl Into<LayoutBase>,
        offset: usize,
        fragment_length: usize,
        fragment_count: usize,
        stride: usize,
    ) -> Self {
        Self {
            base: base.into(),
            offset,
            fragment_length,
            fragment_count,
            stride,
        }
    }

    /// Same geometry as `layout`, rebased onto `base`.
    pub fn rebased(base: impl Into<LayoutBase>, layout: &DataLayout) -> Self {
        Self {
            base: base.into(),
            ..*layout
        }
    }

    /// Bytes actually moved by this layout.
    pub fn total_bytes(&self) -> usize {
        self.fragment_count * self.fragment_length
    }

    /// Bytes spanned from the base to the end of the last stride period.
    pub fn total_extent(&self) -> usize {
        self.offset + self.fragment_count * self.effective_stride()
    }

    /// The stride, with the degenerate `stride == 0` form reading as one
    /// fragment length.
    pub fn effective_stride(&self) -> usize {
        if self.stride == 0 {
            self.fragment_length
        } else {
            self.stride
        }
    }

    /// Whether the region is one contiguous run.
    pub fn unit_stride(&self) -> bool {
        self.fragment_length == self.stride || (self.fragment_count == 1 && self.stride == 0)
    }

    /// Start offset of the `fragment`-th fragment.
    pub fn fragment_offset(&self, fragment: usize) -> usize {
        debug_assert!(
            fragment < self.fragment_count,
            "invalid fragment index (#{} of {} total)",
            fragment,
            self.fragment_count
        );
        self.offset + fragment * self.stride
    }

    /// One past the last byte touched, as an offset from the base.
    pub fn end_offset(&self) -> usize {
        self.fragment_offset(self.fragment_count - 1) + self.fragment_length
    }

    /// Whether the base is a staging handle that has not been resolved.
    pub fn is_unplaced(&self) -> bool {
        matches!(self.base, LayoutBase::Staging(_))
    }

    /// Concrete base address, or `None` while the layout is unplaced.
    pub fn addr(&self) -> Option<usize> {
        match self.base {
            LayoutBase::Addr(a) => Some(a),
            LayoutBase::Staging(_) => None,
        }
    }

    /// Collapse a contiguous multi-fragment layout into its single-fragment
    /// form. Identity on strided layouts and on single fragments.
    pub fn normalize(self) -> Self {
        if !self.unit_stride() || self.fragment_count == 1 {
            return self;
        }
        let bytes = self.total_bytes();
        Self {
            base: self.base,
            offset: self.offset,
            fragment_length: bytes,
            fragment_count: 1,
            stride: bytes,
        }
    }
}

impl fmt::Display for DataLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{{}+{}, [{} * {}, {}]}}",
            self.base, self.offset, self.fragment_length, self.fragment_count, self.stride
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contiguous_constructor_sets_unit_stride() {
        let l = DataLayout::contiguous(0usize, 0, 1024);
        assert!(l.unit_stride());
        assert_eq!(l.fragment_count, 1);
        assert_eq!(l.stride, 1024);
        assert_eq!(l.total_bytes(), 1024);
    }

    #[test]
    fn degenerate_zero_stride_is_unit_stride() {
        let l = DataLayout::strided(0usize, 0, 1024, 1, 0);
        assert!(l.unit_stride());
        assert_eq!(l.effective_stride(), 1024);
        assert_eq!(l.total_extent(), 1024);
    }

    #[test]
    fn derived_quantities() {
        let l = DataLayout::strided(0usize, 42, 16, 64, 128);
        assert!(!l.unit_stride());
        assert_eq!(l.total_bytes(), 16 * 64);
        assert_eq!(l.total_extent(), 42 + 64 * 128);
        assert_eq!(l.fragment_offset(0), 42);
        assert_eq!(l.fragment_offset(3), 42 + 3 * 128);
        assert_eq!(l.end_offset(), 42 + 63 * 128 + 16);
    }

    #[test]
    fn normalize_collapses_contiguous_fragments() {
        let contiguous = DataLayout::strided(0usize, 0, 1024, 1, 1024);
        assert_eq!(contiguous.normalize(), contiguous);
        assert_eq!(DataLayout::strided(0usize, 0, 512, 2, 512).normalize(), contiguous);
        assert_eq!(DataLayout::strided(0usize, 0, 256, 4, 256).normalize(), contiguous);

        let strided = DataLayout::strided(0usize, 0, 128, 2, 512);
        assert_eq!(strided.normalize(), strided);
    }

    #[test]
    fn normalize_is_idempotent() {
        for l in [
            DataLayout::strided(0usize, 0, 512, 2, 512),
            DataLayout::strided(0usize, 7, 128, 2, 512),
            DataLayout::contiguous(0usize, 0, 64),
        ] {
            assert_eq!(l.normalize().normalize(), l.normalize());
        }
    }

    #[test]
    fn staging_base_is_unplaced() {
        let id = StagingId {
            on_host: false,
            device: DeviceId::Device(1),
            index: 7,
        };
        let l = DataLayout::contiguous(id, 0, 256);
        assert!(l.is_unplaced());
        assert_eq!(l.addr(), None);
        assert_eq!(id.to_string(), "S(7, d1)");

        let placed = DataLayout::rebased(0x1000usize, &l);
        assert!(!placed.is_unplaced());
        assert_eq!(placed.addr(), Some(0x1000));
        assert_eq!(placed.fragment_length, l.fragment_length);
    }

    #[test]
    fn display_grammar() {
        let l = DataLayout::strided(0x1000usize, 4, 16, 64, 128);
        assert_eq!(l.to_string(), "{0x1000+4, [16 * 64, 128]}");
        let id = StagingId {
            on_host: true,
            device: DeviceId::Device(2),
            index: 3,
        };
        assert_eq!(
            DataLayout::contiguous(id, 0, 8).to_string(),
            "{S(3, d2 host)+0, [8 * 1, 8]}"
        );
    }
}
