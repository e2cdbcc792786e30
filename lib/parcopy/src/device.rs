// SPDX-FileCopyrightText: Copyright (c) 2024-2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Device identity for transfer endpoints.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Upper bound on the number of accelerator devices addressable by plans.
pub const MAX_DEVICES: usize = 8;

/// Identifies one memory space participating in a transfer.
///
/// `Host` is the CPU-side memory space; `Device(n)` is the n-th accelerator
/// (`n < MAX_DEVICES`).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum DeviceId {
    Host,
    Device(u8),
}

impl DeviceId {
    pub fn is_host(&self) -> bool {
        matches!(self, DeviceId::Host)
    }

    /// Accelerator index, or `None` for the host.
    pub fn index(&self) -> Option<usize> {
        match self {
            DeviceId::Host => None,
            DeviceId::Device(n) => Some(*n as usize),
        }
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceId::Host => write!(f, "host"),
            DeviceId::Device(n) => write!(f, "d{}", n),
        }
    }
}
