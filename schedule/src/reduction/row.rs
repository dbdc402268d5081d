//! Row reductions: the reduced dimension is minor-most.
//!
//! Threads of one output row read consecutive vectors of the row, so loads
//! coalesce. Every thread reduces its strided run into one accumulator, the
//! warp combines its lanes with a shuffle tree, and when a row spans several
//! warps their partials go through a `[rows_per_block, warps_per_row]`
//! shared-memory buffer and are combined by the first warp of the row.

use strider_ir::{AffineExpr, IndexingMap, Interval};

use super::combine::CombineStep;
use super::dimensions::ReductionDimensions;
use super::error::*;
use super::maps::{self, Constraints, Exprs};
use super::tiling::{ElementInfo, LaunchDimensions, RowTiling, TilingParameters, plan_row_tiling};
use crate::config::ReductionConfig;
use crate::device::DeviceInfo;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowStrategy {
    dimensions: ReductionDimensions,
    tiling: RowTiling,
    warp_size: usize,
}

impl RowStrategy {
    pub fn plan(
        dimensions: &ReductionDimensions,
        elements: &ElementInfo,
        device: &DeviceInfo,
        config: &ReductionConfig,
    ) -> Result<Self> {
        let tiling = plan_row_tiling(dimensions, elements, device, config)?;
        Ok(Self { dimensions: *dimensions, tiling, warp_size: device.warp_size })
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

    pub fn warps_per_row(&self) -> usize {
        self.tiling.warps_per_row
    }

    pub fn rows_per_warp(&self) -> usize {
        self.tiling.rows_per_warp
    }

    pub fn threads_per_row(&self) -> usize {
        self.tiling.threads_per_row()
    }

    pub fn rows_per_block(&self) -> usize {
        self.tiling.rows_per_block()
    }

    /// Kept row handled by the calling thread.
    fn kept_index(&self) -> AffineExpr {
        let (threads, blocks) = (maps::thread_ids(self.tiling()), maps::block_ids(self.tiling()));
        blocks[1].clone() * self.rows_per_block() as i64 + threads[1].clone()
    }

    fn kept_in_bounds(&self) -> (AffineExpr, Interval) {
        (self.kept_index(), Interval::from_size(self.dimensions.kept_size()))
    }

    /// `[batch, kept, reduced]` coordinates read by each thread.
    pub fn thread_id_to_input_map(&self) -> IndexingMap {
        let tiling = self.tiling();
        let threads = maps::thread_ids(tiling);
        let offsets = maps::tile_offsets(tiling);
        let vector = tiling.vector_size as i64;

        let reduced_vector = offsets[2].clone() * self.threads_per_row() as i64 + threads[2].clone();
        let results: Exprs = [
            offsets[0].clone(),
            self.kept_index(),
            reduced_vector.clone() * vector + offsets[3].clone(),
        ]
        .into_iter()
        .collect();
        let constraints: Constraints = vec![
            self.kept_in_bounds(),
            (reduced_vector, Interval::from_size(self.dimensions.reduced_size() / tiling.vector_size)),
        ];
        maps::thread_block_map(tiling, results, constraints)
    }

    /// `[kept]` coordinate written by the first thread of each row.
    pub fn thread_id_to_output_map(&self) -> IndexingMap {
        let threads = maps::thread_ids(self.tiling());
        let constraints: Constraints = vec![(threads[2].clone(), Interval::point(0)), self.kept_in_bounds()];
        maps::thread_block_map(self.tiling(), [self.kept_index()], constraints)
    }

    /// Shared `[row, warp]` slot written by lane 0 of every warp; undefined
    /// when a row fits in one warp.
    pub fn shared_memory_write_map(&self) -> IndexingMap {
        if self.warps_per_row() == 1 {
            return IndexingMap::undefined();
        }
        let threads = maps::thread_ids(self.tiling());
        let warp = self.warp_size as i64;
        let results = [threads[1].clone(), threads[2].clone().floor_div(warp)];
        let constraints: Constraints = vec![(threads[2].clone().modulo(warp), Interval::point(0))];
        maps::thread_vector_map(self.tiling(), results, constraints)
    }

    /// Shared `[row, warp]` slot read by the first `warps_per_row` lanes of
    /// each row; undefined when a row fits in one warp.
    pub fn shared_memory_read_map(&self) -> IndexingMap {
        if self.warps_per_row() == 1 {
            return IndexingMap::undefined();
        }
        let threads = maps::thread_ids(self.tiling());
        let results = [threads[1].clone(), threads[2].clone()];
        let constraints: Constraints = vec![(threads[2].clone(), Interval::from_size(self.warps_per_row()))];
        maps::thread_vector_map(self.tiling(), results, constraints)
    }

    pub fn shared_tile_shape(&self) -> Option<[usize; 2]> {
        (self.warps_per_row() > 1).then(|| [self.rows_per_block(), self.warps_per_row()])
    }

    pub fn combine_steps(&self) -> Vec<CombineStep> {
        let mut steps = vec![CombineStep::Accumulate];
        if self.warps_per_row() > 1 {
            steps.extend(CombineStep::shuffle_over(self.warp_size));
            steps.extend([CombineStep::WriteShared, CombineStep::Barrier, CombineStep::ReadShared]);
            steps.extend(CombineStep::shuffle_over(self.warps_per_row()));
        } else {
            steps.extend(CombineStep::shuffle_over(self.threads_per_row()));
        }
        steps.push(CombineStep::WriteOutput);
        steps
    }
}
