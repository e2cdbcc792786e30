// SPDX-FileCopyrightText: Copyright (c) 2024-2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Plan-level strategy vocabulary.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::properties::CopyProperties;

/// How data moves between the two memories.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CopyType {
    /// Copy directly from source to destination.
    #[default]
    Direct,
    /// Linearize strided ends through contiguous staging buffers.
    Staged,
}

/// How device-to-device steps are realized when the hardware lacks a direct
/// peer copy path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum D2dImplementation {
    /// Copy directly between the two devices.
    #[default]
    Direct,
    /// Hop through host memory pinned at the source device.
    HostStagingAtSource,
    /// Hop through host memory pinned at the target device.
    HostStagingAtTarget,
    /// Hop through host memory at both devices, with an extra host-side copy.
    HostStagingAtBoth,
}

/// Directs the planner when manifesting a copy spec.
///
/// `chunk_size` bounds the bytes moved per independent plan; 0 disables
/// chunking.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CopyStrategy {
    pub kind: CopyType,
    pub properties: CopyProperties,
    pub d2d: D2dImplementation,
    pub chunk_size: usize,
}

impl CopyStrategy {
    pub fn new(kind: CopyType) -> Self {
        Self {
            kind,
            ..Self::default()
        }
    }

    pub fn direct() -> Self {
        Self::new(CopyType::Direct)
    }

    pub fn staged() -> Self {
        Self::new(CopyType::Staged)
    }

    pub fn with_properties(self, properties: CopyProperties) -> Self {
        Self { properties, ..self }
    }

    pub fn with_d2d(self, d2d: D2dImplementation) -> Self {
        Self { d2d, ..self }
    }

    pub fn with_chunk_size(self, chunk_size: usize) -> Self {
        Self { chunk_size, ..self }
    }
}

impl fmt::Display for CopyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CopyType::Direct => write!(f, "direct"),
            CopyType::Staged => write!(f, "staged"),
        }
    }
}

impl fmt::Display for D2dImplementation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            D2dImplementation::Direct => write!(f, "direct"),
            D2dImplementation::HostStagingAtSource => write!(f, "host_staging_at_source"),
            D2dImplementation::HostStagingAtTarget => write!(f, "host_staging_at_target"),
            D2dImplementation::HostStagingAtBoth => write!(f, "host_staging_at_both"),
        }
    }
}

impl fmt::Display for CopyStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "strategy({}, {}, d2d:{}, chunk:{})",
            self.kind, self.properties, self.d2d, self.chunk_size
        )
    }
}
