//! Schedule crate for the Strider reduction planner.
//!
//! Plans the launch grid and per-thread indexing of fused GPU reduction
//! kernels.
//!
//! # Module Organization
//!
//! - [`device`] - Target device limits
//! - [`config`] - Tunables of the tiling heuristics
//! - [`reduction`] - Analysis, tiling, row/column strategies and epilogues

pub mod config;
pub mod device;
pub mod reduction;

#[cfg(test)]
pub mod test;

pub use config::ReductionConfig;
pub use device::DeviceInfo;
pub use reduction::{
    CombineStep, EpilogueBuilder, EpilogueSpecification, InitValue, LaunchDimensions, ReductionDimensions,
    ReductionError, ReductionPlan, ReductionStrategy, TilingParameters, UnsupportedCategory,
};

// Re-export the fact base for convenience
pub use strider_ir::{FusionGraph, IndexingMap};
