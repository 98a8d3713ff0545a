// Copyright (c) 2025 Orchestrator Core Team
// SPDX-License-Identifier: Apache-2.0

//! Convenience re-export of `orchestrator-core` for downstream integrators that
//! want a single dependency for building and running workflows.

pub use orchestrator_core::*;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
