// SPDX-FileCopyrightText: Copyright (c) 2024-2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Planning and execution of bulk strided memory transfers across
//! heterogeneous memory spaces.
//!
//! The crate splits the problem in two:
//!
//! - The **planner** is a pure transformation from an abstract transfer
//!   request ([`CopySpec`]) and a [`CopyStrategy`] to an executable
//!   [`ParallelCopySet`]: [`apply_chunking`] splits the request into
//!   bounded-size pieces, [`apply_staging`] linearizes strided endpoints
//!   through symbolic staging buffers, and [`apply_d2d_implementation`]
//!   rewrites device-to-device hops through host memory.
//!   [`manifest_strategy`] composes the three.
//! - The **executor** binds a plan to backend queues: it places staging
//!   buffers, dispatches each step to the right copy primitive, inserts
//!   cross-queue waits, and fans independent plans out across a worker pool.
//!
//! The accelerator runtime itself sits behind the [`CopyBackend`] trait;
//! [`SimBackend`] is the in-process reference implementation.
//!
//! ```
//! use parcopy::{
//!     BasicStagingProvider, CopySpec, CopyStrategy, DataLayout, DeviceId, manifest_strategy,
//! };
//!
//! // gather 64 strided fragments on d0 into a contiguous region on d1,
//! // 4 KiB at a time
//! let spec = CopySpec::new(
//!     DeviceId::Device(0),
//!     DataLayout::strided(0x10000usize, 0, 256, 64, 1024),
//!     DeviceId::Device(1),
//!     DataLayout::contiguous(0x20000usize, 0, 256 * 64),
//! );
//! let strategy = CopyStrategy::staged().with_chunk_size(4096);
//! let set = manifest_strategy(&spec, &strategy, &mut BasicStagingProvider::new()).unwrap();
//! assert!(set.implements(&spec));
//! ```

mod device;
mod equivalence;
mod error;
mod layout;
mod properties;
mod spec;
mod strategy;
mod validation;

mod backend;
mod executor;
mod planner;

pub mod testing;

pub use backend::sim::{SimBackend, SimBackendConfig, SimCommand};
pub use backend::{CopyBackend, Possibility, QueueId};
pub use device::{DeviceId, MAX_DEVICES};
pub use error::{PlanError, Result};
pub use executor::Executor;
pub use layout::{DataLayout, LayoutBase, StagingId};
pub use planner::{
    BasicStagingProvider, StagingProvider, apply_chunking, apply_d2d_implementation,
    apply_d2d_implementation_set, apply_staging, apply_staging_set, manifest_strategy,
};
pub use properties::CopyProperties;
pub use spec::{CopyPlan, CopySpec, ParallelCopySet};
pub use strategy::{CopyStrategy, CopyType, D2dImplementation};
