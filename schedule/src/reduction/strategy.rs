use strider_ir::IndexingMap;
use tracing::debug;

use super::column::ColumnStrategy;
use super::combine::CombineStep;
use super::dimensions::ReductionDimensions;
use super::error::*;
use super::maps;
use super::row::RowStrategy;
use super::tiling::{ElementInfo, LaunchDimensions, TilingParameters};
use crate::config::ReductionConfig;
use crate::device::DeviceInfo;

/// Reduction algorithm chosen for a fusion, with its planned state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReductionStrategy {
    Row(RowStrategy),
    Column(ColumnStrategy),
}

impl ReductionStrategy {
    /// Row strategy when the reduced dimension is minor-most, column otherwise.
    pub fn plan(
        dimensions: &ReductionDimensions,
        elements: &ElementInfo,
        device: &DeviceInfo,
        config: &ReductionConfig,
    ) -> Result<Self> {
        let strategy = if dimensions.is_row_reduction {
            Self::Row(RowStrategy::plan(dimensions, elements, device, config)?)
        } else {
            Self::Column(ColumnStrategy::plan(dimensions, elements, device, config)?)
        };
        debug!(strategy = strategy.name(), "reduction strategy");
        Ok(strategy)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Row(_) => "row",
            Self::Column(_) => "column",
        }
    }

    pub fn is_row(&self) -> bool {
        matches!(self, Self::Row(_))
    }

    pub fn dimensions(&self) -> &ReductionDimensions {
        match self {
            Self::Row(row) => row.dimensions(),
            Self::Column(column) => column.dimensions(),
        }
    }

    pub fn tiling(&self) -> &TilingParameters {
        match self {
            Self::Row(row) => row.tiling(),
            Self::Column(column) => column.tiling(),
        }
    }

    /// Launch shape chosen by the tiling planner.
    pub fn launch_dimensions(&self) -> LaunchDimensions {
        match self {
            Self::Row(row) => row.launch_dimensions(),
            Self::Column(column) => column.launch_dimensions(),
        }
    }

    /// Warps cooperating on one output row; 1 for column reductions.
    pub fn warps_per_row(&self) -> usize {
        match self {
            Self::Row(row) => row.warps_per_row(),
            Self::Column(_) => 1,
        }
    }

    /// Accumulators per thread: column threads keep one per vector lane.
    pub fn accumulator_lanes(&self) -> usize {
        match self {
            Self::Row(_) => 1,
            Self::Column(column) => column.tiling().vector_size,
        }
    }

    /// Projected `[batch, kept, reduced]` (row) or `[batch, reduced, kept]`
    /// (column) input coordinates.
    pub fn thread_id_to_input_map(&self) -> IndexingMap {
        match self {
            Self::Row(row) => row.thread_id_to_input_map(),
            Self::Column(column) => column.thread_id_to_input_map(),
        }
    }

    /// Projected output coordinates, shaped like [`ReductionDimensions::output_shape`].
    pub fn thread_id_to_output_map(&self) -> IndexingMap {
        match self {
            Self::Row(row) => row.thread_id_to_output_map(),
            Self::Column(column) => column.thread_id_to_output_map(),
        }
    }

    pub fn shared_memory_write_map(&self) -> IndexingMap {
        match self {
            Self::Row(row) => row.shared_memory_write_map(),
            Self::Column(column) => column.shared_memory_write_map(),
        }
    }

    pub fn shared_memory_read_map(&self) -> IndexingMap {
        match self {
            Self::Row(row) => row.shared_memory_read_map(),
            Self::Column(column) => column.shared_memory_read_map(),
        }
    }

    /// Extents of the shared scratch tile, if the strategy uses one.
    pub fn shared_tile_shape(&self) -> Option<[usize; 2]> {
        match self {
            Self::Row(row) => row.shared_tile_shape(),
            Self::Column(column) => column.shared_tile_shape(),
        }
    }

    /// Check that every variable the four strategy maps mention lies in
    /// their domains.
    pub fn verify_maps(&self) -> Result<()> {
        maps::verify_map("input", &self.thread_id_to_input_map())?;
        maps::verify_map("output", &self.thread_id_to_output_map())?;
        maps::verify_map("shared write", &self.shared_memory_write_map())?;
        maps::verify_map("shared read", &self.shared_memory_read_map())
    }

    pub fn combine_steps(&self) -> Vec<CombineStep> {
        match self {
            Self::Row(row) => row.combine_steps(),
            Self::Column(column) => column.combine_steps(),
        }
    }
}
