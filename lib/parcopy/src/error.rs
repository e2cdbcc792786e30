// SPDX-FileCopyrightText: Copyright (c) 2024-2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Typed errors for the planning layer.

use thiserror::Error;

/// Result type for planner operations.
pub type Result<T> = std::result::Result<T, PlanError>;

/// Contract violations detected while synthesizing a plan.
#[derive(Debug, Error)]
pub enum PlanError {
    /// The input copy spec does not satisfy [`CopySpec::is_valid`](crate::CopySpec::is_valid).
    #[error("invalid copy specification: {0}")]
    InvalidSpec(String),

    /// A fragment does not fit into one chunk.
    #[error("cannot chunk, fragments too large for chunking ({fragment_length} > {chunk_size})")]
    FragmentsTooLarge {
        fragment_length: usize,
        chunk_size: usize,
    },

    /// The two strided sides have fragment lengths that do not divide evenly.
    #[error("cannot chunk, fragment sizes not compatible ({larger} % {smaller} != 0)")]
    IncompatibleFragments { larger: usize, smaller: usize },

    /// Staging was asked for a plan that is not a single step.
    #[error("cannot stage a plan consisting of {len} steps: {plan}")]
    MultiStepPlan { len: usize, plan: String },

    /// A staging buffer was requested with zero size.
    #[error("invalid staging buffer size: {0}")]
    InvalidStagingSize(usize),

    /// A staging buffer was requested on the host pseudo-device.
    #[error("invalid staging buffer request: device id is host")]
    HostStagingDevice,
}
