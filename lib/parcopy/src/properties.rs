// SPDX-FileCopyrightText: Copyright (c) 2024-2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Per-copy execution hints.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::BitOr;

/// Requested implementation properties for a copy step.
///
/// `use_kernel` asks the executor to move the bytes with a device compute
/// kernel; `use_2d` asks for the backend's native strided copy primitive.
/// The two are mutually exclusive; a spec carrying both is invalid.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
pub struct CopyProperties {
    pub use_kernel: bool,
    pub use_2d: bool,
}

impl CopyProperties {
    pub const NONE: Self = Self {
        use_kernel: false,
        use_2d: false,
    };
    pub const USE_KERNEL: Self = Self {
        use_kernel: true,
        use_2d: false,
    };
    pub const USE_2D: Self = Self {
        use_kernel: false,
        use_2d: true,
    };

    pub fn is_empty(&self) -> bool {
        !self.use_kernel && !self.use_2d
    }

    /// Both hints set at once; rejected by spec validation.
    pub fn is_conflicting(&self) -> bool {
        self.use_kernel && self.use_2d
    }
}

impl BitOr for CopyProperties {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self {
            use_kernel: self.use_kernel || rhs.use_kernel,
            use_2d: self.use_2d || rhs.use_2d,
        }
    }
}

impl fmt::Display for CopyProperties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.use_kernel, self.use_2d) {
            (false, false) => Ok(()),
            (true, false) => write!(f, "use_kernel"),
            (false, true) => write!(f, "use_2d"),
            (true, true) => write!(f, "use_kernel,use_2d"),
        }
    }
}
