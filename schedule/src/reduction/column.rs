//! Column reductions: the kept dimension is minor-most.
//!
//! A square `lanes x lanes` block covers `lanes` vectors of adjacent output
//! columns. Thread `(r, c)` walks rows `r, r + lanes, ...` of column vector
//! `c`, so a warp's loads stay contiguous. The partials are transposed
//! through a shared tile, after which each warp holds every row partial of
//! one column vector and finishes it with a shuffle tree.

use strider_ir::{AffineExpr, IndexingMap, Interval};

use super::combine::CombineStep;
use super::dimensions::ReductionDimensions;
use super::error::*;
use super::maps::{self, Constraints, Exprs};
use super::tiling::{ColumnTiling, ElementInfo, LaunchDimensions, TilingParameters, plan_column_tiling};
use crate::config::ReductionConfig;
use crate::device::DeviceInfo;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnStrategy {
    dimensions: ReductionDimensions,
    tiling: ColumnTiling,
}

impl ColumnStrategy {
    pub fn plan(
        dimensions: &ReductionDimensions,
        elements: &ElementInfo,
        device: &DeviceInfo,
        config: &ReductionConfig,
    ) -> Result<Self> {
        let tiling = plan_column_tiling(dimensions, elements, device, config)?;
        Ok(Self { dimensions: *dimensions, tiling })
    }

    pub fn dimensions(&self) -> &ReductionDimensions {
        &self.dimensions
    }

    pub fn tiling(&self) -> &TilingParameters {
        &self.tiling.tiling
    }

    pub fn launch_dimensions(&self) -> LaunchDimensions {
        self.tiling.launch
    }

    /// Side of the square thread tile.
    pub fn lanes(&self) -> usize {
        self.tiling.lanes
    }

    /// Column vector index of `lane` within the calling block.
    fn column_vector(&self, lane: AffineExpr) -> AffineExpr {
        let blocks = maps::block_ids(self.tiling());
        blocks[2].clone() * self.lanes() as i64 + lane
    }

    fn column_vectors(&self) -> Interval {
        Interval::from_size(self.dimensions.kept_size() / self.tiling().vector_size)
    }

    /// `[batch, reduced, kept]` coordinates read by each thread.
    pub fn thread_id_to_input_map(&self) -> IndexingMap {
        let tiling = self.tiling();
        let (threads, blocks) = (maps::thread_ids(tiling), maps::block_ids(tiling));
        let offsets = maps::tile_offsets(tiling);
        let vector = tiling.vector_size as i64;

        let reduced = offsets[1].clone() * self.lanes() as i64 + threads[1].clone();
        let column = self.column_vector(threads[2].clone());
        let results: Exprs =
            [blocks[0].clone(), reduced.clone(), column.clone() * vector + offsets[3].clone()].into_iter().collect();
        let constraints: Constraints = vec![
            (reduced, Interval::from_size(self.dimensions.reduced_size())),
            (column, self.column_vectors()),
        ];
        maps::thread_block_map(tiling, results, constraints)
    }

    /// `[batch, kept]` coordinates written by the first thread of each
    /// transposed row.
    pub fn thread_id_to_output_map(&self) -> IndexingMap {
        let tiling = self.tiling();
        let (threads, blocks) = (maps::thread_ids(tiling), maps::block_ids(tiling));
        let offsets = maps::tile_offsets(tiling);

        let column = self.column_vector(threads[1].clone());
        let results = [blocks[0].clone(), column.clone() * tiling.vector_size as i64 + offsets[3].clone()];
        let constraints: Constraints = vec![(threads[2].clone(), Interval::point(0)), (column, self.column_vectors())];
        maps::thread_block_map(tiling, results, constraints)
    }

    /// Thread `(r, c)` stores lane `v` at `[r, c * vector + v]`.
    pub fn shared_memory_write_map(&self) -> IndexingMap {
        let threads = maps::thread_ids(self.tiling());
        let vector = self.tiling().vector_size as i64;
        let results = [threads[1].clone(), threads[2].clone() * vector + AffineExpr::symbol(0)];
        maps::thread_vector_map(self.tiling(), results, Vec::new())
    }

    /// Thread `(r, c)` loads lane `v` from `[c, r * vector + v]`.
    pub fn shared_memory_read_map(&self) -> IndexingMap {
        let threads = maps::thread_ids(self.tiling());
        let vector = self.tiling().vector_size as i64;
        let results = [threads[2].clone(), threads[1].clone() * vector + AffineExpr::symbol(0)];
        maps::thread_vector_map(self.tiling(), results, Vec::new())
    }

    pub fn shared_tile_shape(&self) -> Option<[usize; 2]> {
        Some(self.tiling.shared_tile_shape())
    }

    pub fn combine_steps(&self) -> Vec<CombineStep> {
        let mut steps =
            vec![CombineStep::Accumulate, CombineStep::WriteShared, CombineStep::Barrier, CombineStep::ReadShared];
        steps.extend(CombineStep::shuffle_over(self.lanes()));
        steps.push(CombineStep::WriteOutput);
        steps
    }
}
