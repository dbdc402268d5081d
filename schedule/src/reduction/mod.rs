//! Reduction planner for fused GPU reduction kernels.
//!
//! Given a fusion whose roots are derived from reduce operators, the planner
//! decides how the kernel is launched and which element every thread
//! touches. It emits no code: its outputs are launch dimensions, indexing
//! maps and a combine sequence that an emission backend lowers.
//!
//! # Architecture
//!
//! 1. **Analysis** (`analysis`): find the reduce heroes of every root,
//!    group the roots, collapse the operand into [`ReductionDimensions`],
//!    and reject fusions outside the supported subset.
//! 2. **Tiling** (`tiling`): choose threads, blocks, per-thread tiles and
//!    the vector width within the device limits.
//! 3. **Strategy** (`row`, `column`): build the input, output and
//!    shared-memory indexing maps and the combine sequence, either as a
//!    warp-shuffle tree over rows or a shared-memory transpose over columns.
//! 4. **Epilogue** (`epilogue`): rebuild each root from the hero results
//!    through a backend-supplied [`EpilogueBuilder`].
//!
//! # Example
//!
//! ```ignore
//! use strider_schedule::{DeviceInfo, ReductionConfig, ReductionPlan};
//!
//! let plan = ReductionPlan::new(&graph, &DeviceInfo::cuda(), &ReductionConfig::default())?;
//! let launch = plan.launch_dimensions();
//! let input = plan.thread_id_to_input_indexing(0, 0)?;
//! ```

pub mod analysis;
pub mod column;
pub mod combine;
pub mod dimensions;
pub mod epilogue;
pub mod error;
pub mod maps;
pub mod plan;
pub mod row;
pub mod strategy;
pub mod tiling;

pub use analysis::{HeroFacts, ReductionAnalysis, ReductionGroups, RootFacts};
pub use column::ColumnStrategy;
pub use combine::{CombineStep, validate_combine_sequence};
pub use dimensions::ReductionDimensions;
pub use epilogue::{EpilogueBuilder, EpilogueSpecification, InitValue};
pub use error::{ReductionError, Result, UnsupportedCategory};
pub use plan::ReductionPlan;
pub use row::RowStrategy;
pub use strategy::ReductionStrategy;
pub use tiling::{ElementInfo, LaunchDimensions, TilingParameters};
