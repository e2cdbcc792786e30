// SPDX-FileCopyrightText: Copyright (c) 2024-2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Pure plan synthesis: from an abstract copy spec to an executable set.
//!
//! The planner is deterministic and shares no mutable state; everything it
//! emits is a value. Its output is checked against the equivalence oracles
//! (`CopyPlan::implements`, `ParallelCopySet::implements`): for every valid
//! spec, `manifest_strategy(spec, ..).implements(spec)` holds.

mod chunking;
mod d2d;
mod staging;

pub use chunking::apply_chunking;
pub use d2d::{apply_d2d_implementation, apply_d2d_implementation_set};
pub use staging::{BasicStagingProvider, StagingProvider, apply_staging, apply_staging_set};

use tracing::debug;

use crate::error::Result;
use crate::spec::{CopySpec, ParallelCopySet};
use crate::strategy::CopyStrategy;

/// Manifest `strategy` on `spec`: chunk, stage, then rewrite device-to-device
/// steps. The result is a parallel copy set that implements `spec`.
pub fn manifest_strategy(
    spec: &CopySpec,
    strategy: &CopyStrategy,
    provider: &mut dyn StagingProvider,
) -> Result<ParallelCopySet> {
    let chunked = apply_chunking(spec, strategy)?;
    let staged = apply_staging_set(&chunked, strategy, provider)?;
    let manifested = apply_d2d_implementation_set(&staged, strategy.d2d, provider)?;
    debug!(plans = manifested.len(), %strategy, "manifested copy strategy");
    Ok(manifested)
}
