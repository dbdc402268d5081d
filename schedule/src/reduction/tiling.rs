//! Tiling planner: threads, blocks, per-thread tiles and vector width.
//!
//! Tilings are four-dimensional. Row reductions tile
//! `[batch, kept, reduced / vector, vector]`, column reductions
//! `[batch, reduced, kept / vector, vector]`; the last dimension is always the
//! vector lane. Planning is a deterministic function of the reduction
//! dimensions, the element types, the device and the configuration.
//!
//! A tiling that exceeds a device limit is never returned: the planner first
//! shrinks it (fewer kept rows per block, narrower vectors, smaller transpose
//! tiles) or spreads its blocks over a 2-D or 3-D grid, and only reports [`ReductionError::ResourceLimitExceeded`] when no
//! candidate fits.

use std::fmt;

use itertools::Itertools;
use smallvec::{SmallVec, smallvec};
use snafu::{OptionExt, ensure};
use tracing::{debug, warn};

use super::analysis::ReductionAnalysis;
use super::dimensions::ReductionDimensions;
use super::error::*;
use crate::config::ReductionConfig;
use crate::device::DeviceInfo;

/// Per-dimension extents of a tiling.
pub type Extents = SmallVec<[usize; 4]>;

/// Position of the vector lane in every tiling.
pub const VECTOR_DIM: usize = 3;

fn ceil_div(a: usize, b: usize) -> usize {
    a.div_ceil(b)
}

fn round_up(a: usize, b: usize) -> usize {
    a.div_ceil(b) * b
}

/// Element-type facts that steer vectorization and shared-memory sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementInfo {
    /// Narrowest input element width, in bits.
    pub smallest_input_bits: usize,
    pub has_complex: bool,
    /// Bytes of one partial result for all heroes of the group together.
    pub partial_bytes: usize,
}

impl ElementInfo {
    pub fn from_analysis(analysis: &ReductionAnalysis) -> Self {
        Self {
            smallest_input_bits: analysis.smallest_input_bits(),
            has_complex: analysis.has_complex(),
            partial_bytes: analysis.partial_bytes(),
        }
    }
}

/// Write-once tiling of a reduction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TilingParameters {
    /// Extents being tiled.
    pub tiled_shape: Extents,
    pub tile_sizes_per_thread: Extents,
    /// `tile_sizes_per_thread[d] * num_threads[d]`.
    pub tile_sizes_per_block: Extents,
    pub num_threads: Extents,
    pub num_blocks: Extents,
    pub vector_size: usize,
}

impl TilingParameters {
    pub fn new(
        tiled_shape: Extents,
        tile_sizes_per_thread: Extents,
        num_threads: Extents,
        num_blocks: Extents,
        vector_size: usize,
    ) -> Self {
        let tile_sizes_per_block = tile_sizes_per_thread.iter().zip(&num_threads).map(|(t, n)| t * n).collect();
        Self { tiled_shape, tile_sizes_per_thread, tile_sizes_per_block, num_threads, num_blocks, vector_size }
    }

    /// Threads per block.
    pub fn total_threads(&self) -> usize {
        self.num_threads.iter().product()
    }

    /// Blocks in the grid.
    pub fn total_blocks(&self) -> usize {
        self.num_blocks.iter().product()
    }

    /// Check the tiling identities and that the grid covers the tiled shape.
    pub fn verify(&self) -> Result<()> {
        let rank = self.tiled_shape.len();
        ensure!(
            [&self.tile_sizes_per_thread, &self.tile_sizes_per_block, &self.num_threads, &self.num_blocks]
                .iter()
                .all(|e| e.len() == rank),
            InvariantViolationSnafu { message: format!("tiling ranks disagree: {self}") }
        );
        for d in 0..rank {
            ensure!(
                self.tile_sizes_per_block[d] == self.tile_sizes_per_thread[d] * self.num_threads[d],
                InvariantViolationSnafu { message: format!("block tile of dimension {d} is not thread tile x threads") }
            );
            ensure!(
                self.tile_sizes_per_block[d] * self.num_blocks[d] >= self.tiled_shape[d],
                InvariantViolationSnafu { message: format!("tiling does not cover dimension {d}: {self}") }
            );
            ensure!(
                self.tiled_shape[d] > 0 && self.tile_sizes_per_thread[d] > 0 && self.num_threads[d] > 0,
                InvariantViolationSnafu { message: format!("zero extent in dimension {d}: {self}") }
            );
        }
        ensure!(
            self.tile_sizes_per_thread[VECTOR_DIM] == self.vector_size,
            InvariantViolationSnafu { message: format!("vector tile is not the vector size: {self}") }
        );
        Ok(())
    }
}

impl fmt::Display for TilingParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "shape [{}] tile/thread [{}] threads [{}] blocks [{}] vector {}",
            self.tiled_shape.iter().join(", "),
            self.tile_sizes_per_thread.iter().join(", "),
            self.num_threads.iter().join(", "),
            self.num_blocks.iter().join(", "),
            self.vector_size
        )
    }
}

/// Kernel launch shape.
///
/// Threads are linear and carried in block `x`. Blocks are linearized as
/// `x + grid_x * (y + grid_y * z)`; when the block count does not fill the
/// grid exactly, the trailing blocks fall outside every map domain and exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LaunchDimensions {
    grid: [usize; 3],
    block: [usize; 3],
}

impl LaunchDimensions {
    /// One-dimensional launch.
    pub fn new(num_blocks: usize, num_threads_per_block: usize) -> Self {
        Self::with_grid([num_blocks, 1, 1], num_threads_per_block)
    }

    pub fn with_grid(grid: [usize; 3], num_threads_per_block: usize) -> Self {
        Self { grid, block: [num_threads_per_block, 1, 1] }
    }

    /// Launch of `tiling` on `device`, spreading its blocks over grid `y` and
    /// `z` when `x` alone cannot hold them.
    pub fn for_tiling(tiling: &TilingParameters, device: &DeviceInfo) -> Result<Self> {
        let blocks = tiling.total_blocks();
        let grid = split_grid(blocks, device.max_grid_dims).context(ResourceLimitExceededSnafu {
            resource: "grid blocks",
            value: blocks,
            max: device.max_grid_blocks(),
        })?;
        if grid[1] > 1 {
            debug!(blocks, grid = ?grid, limits = ?device.max_grid_dims, "blocks split over grid dimensions");
        }
        let launch = Self::with_grid(grid, tiling.total_threads());
        launch.validate(device)?;
        Ok(launch)
    }

    pub fn grid(&self) -> [usize; 3] {
        self.grid
    }

    pub fn block(&self) -> [usize; 3] {
        self.block
    }

    /// Launched blocks, idle trailing blocks included.
    pub fn num_blocks(&self) -> usize {
        self.grid.iter().product()
    }

    pub fn num_threads_per_block(&self) -> usize {
        self.block.iter().product()
    }

    pub fn total_threads(&self) -> usize {
        self.num_blocks() * self.num_threads_per_block()
    }

    /// Check positivity and the device thread and grid limits.
    pub fn validate(&self, device: &DeviceInfo) -> Result<()> {
        ensure!(
            self.grid.iter().chain(&self.block).all(|&e| e > 0),
            InvariantViolationSnafu { message: format!("launch has a zero extent: {self}") }
        );
        ensure!(
            self.num_threads_per_block() <= device.max_threads_per_block,
            ResourceLimitExceededSnafu {
                resource: "threads per block",
                value: self.num_threads_per_block(),
                max: device.max_threads_per_block,
            }
        );
        for (&blocks, &max) in self.grid.iter().zip(&device.max_grid_dims) {
            ensure!(blocks <= max, ResourceLimitExceededSnafu { resource: "grid blocks", value: blocks, max });
        }
        Ok(())
    }
}

/// Spread `blocks` over grid `x`, `y` and `z` within `limits`, using `z` and
/// then `y` only when the dimensions below cannot hold the rest.
///
/// The grid may hold up to `grid[1] * grid[2] - 1` more blocks than asked
/// for. `None` when even the full grid is too small.
pub fn split_grid(blocks: usize, limits: [usize; 3]) -> Option<[usize; 3]> {
    if limits.contains(&0) {
        return None;
    }
    let mut grid = [1; 3];
    let mut rest = blocks;
    for d in (1..3).rev() {
        let inner = limits[..d].iter().fold(1usize, |acc, &l| acc.saturating_mul(l));
        grid[d] = rest.div_ceil(inner).max(1);
        rest = rest.div_ceil(grid[d]);
    }
    grid[0] = rest;
    grid.iter().zip(&limits).all(|(g, l)| g <= l).then_some(grid)
}

/// Reject configurations the tiling heuristics cannot divide by.
pub fn check_config(config: &ReductionConfig) -> Result<()> {
    match config.zero_tunable() {
        Some(tunable) => InvariantViolationSnafu { message: format!("tunable {tunable} must be positive") }.fail(),
        None => Ok(()),
    }
}

impl fmt::Display for LaunchDimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "grid [{}] block [{}]", self.grid.iter().join(", "), self.block.iter().join(", "))
    }
}

/// Elements loaded per vector access along the minor dimension.
///
/// Vectorizing must not leave threads without work, and only narrow real
/// types are vectorized: 32-bit types get 2 lanes, narrower types up to 4.
pub fn vector_size(minor_size: usize, num_threads: usize, elements: &ElementInfo, config: &ReductionConfig) -> usize {
    if !config.vectorize
        || minor_size % 2 != 0
        || num_threads * 2 > minor_size
        || elements.has_complex
        || elements.smallest_input_bits >= 64
    {
        return 1;
    }
    if elements.smallest_input_bits >= 32 {
        return 2;
    }
    if num_threads * 4 <= minor_size && minor_size % 4 == 0 { 4 } else { 2 }
}

/// Output rows sharing one warp when a row is shorter than a warp.
pub fn rows_per_warp(reduced_size: usize, warp_size: usize) -> usize {
    if reduced_size < warp_size && warp_size % reduced_size == 0 { warp_size / reduced_size } else { 1 }
}

/// Row tiling plus the warp layout of one output row.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RowTiling {
    pub tiling: TilingParameters,
    pub rows_per_warp: usize,
    /// Warps cooperating on one output row.
    pub warps_per_row: usize,
    pub launch: LaunchDimensions,
}

impl RowTiling {
    pub fn threads_per_row(&self) -> usize {
        self.tiling.num_threads[2]
    }

    pub fn rows_per_block(&self) -> usize {
        self.tiling.num_threads[1]
    }
}

/// Plan a row reduction `[batch, kept, reduced]`.
///
/// Each row gets enough threads for `min_elements_per_thread` minor elements
/// per thread, rounded up to whole warps. Rows shorter than a warp pack
/// several rows per warp. When one row leaves room in a block, several rows
/// share the block up to the threads-per-block target.
#[tracing::instrument(skip_all, fields(dimensions = %dimensions))]
pub fn plan_row_tiling(
    dimensions: &ReductionDimensions,
    elements: &ElementInfo,
    device: &DeviceInfo,
    config: &ReductionConfig,
) -> Result<RowTiling> {
    check_config(config)?;
    let warp = device.warp_size;
    ensure!(
        device.max_threads_per_block >= warp,
        ResourceLimitExceededSnafu { resource: "threads per block", value: warp, max: device.max_threads_per_block }
    );
    let [batch, kept, reduced] = dimensions.dimensions;

    // Warp partials of one row are combined by a single warp.
    let device_row_threads = (device.max_threads_per_block / warp * warp).min(warp * warp);
    if device_row_threads < config.max_row_threads {
        debug!(device_row_threads, configured = config.max_row_threads, "row threads capped by device");
    }
    let max_row_threads = (config.max_row_threads.min(device_row_threads) / warp).max(1) * warp;
    let target = config.threads_per_block_target.min(device.max_threads_per_block);

    let rows_per_warp = rows_per_warp(reduced, warp);
    let (threads_per_row, vector_size, tile_reduced, mut rows_per_block) = if rows_per_warp > 1 {
        let rows_per_block = ((target / reduced / rows_per_warp).max(1) * rows_per_warp).min(round_up(kept, rows_per_warp));
        (reduced, 1, 1, rows_per_block)
    } else {
        let threads_per_row =
            round_up(ceil_div(reduced, config.min_elements_per_thread), warp).min(max_row_threads);
        let vector_size = vector_size(reduced, threads_per_row, elements, config);
        let tile_reduced = ceil_div(reduced / vector_size, threads_per_row);
        let rows_per_block = if threads_per_row * 2 <= target {
            if kept * threads_per_row <= target { kept } else { target / threads_per_row }
        } else {
            1
        };
        (threads_per_row, vector_size, tile_reduced, rows_per_block)
    };

    let warps_per_row = ceil_div(threads_per_row, warp);
    if warps_per_row > 1 {
        let shared_bytes = |rows: usize| rows * warps_per_row * elements.partial_bytes;
        while shared_bytes(rows_per_block) > device.shared_memory_per_block && rows_per_block > 1 {
            warn!(rows_per_block, budget = device.shared_memory_per_block, "row partials exceed shared memory, shrinking");
            rows_per_block /= 2;
        }
        ensure!(
            shared_bytes(rows_per_block) <= device.shared_memory_per_block,
            ResourceLimitExceededSnafu {
                resource: "shared memory",
                value: shared_bytes(rows_per_block),
                max: device.shared_memory_per_block,
            }
        );
    }

    let tiling = TilingParameters::new(
        smallvec![batch, kept, reduced / vector_size, vector_size],
        smallvec![batch, 1, tile_reduced, vector_size],
        smallvec![1, rows_per_block, threads_per_row, 1],
        smallvec![1, ceil_div(kept, rows_per_block), 1, 1],
        vector_size,
    );
    tiling.verify()?;
    let launch = LaunchDimensions::for_tiling(&tiling, device)?;
    debug!(%tiling, %launch, rows_per_warp, warps_per_row, "row tiling");
    Ok(RowTiling { tiling, rows_per_warp, warps_per_row, launch })
}

/// Column tiling plus the side of the square transpose tile.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnTiling {
    pub tiling: TilingParameters,
    /// Threads along both the reduced and the kept dimension.
    pub lanes: usize,
    pub launch: LaunchDimensions,
}

impl ColumnTiling {
    /// Shared transpose tile `[lanes, lanes * vector + 1]`; the extra column
    /// keeps transposed reads free of bank conflicts.
    pub fn shared_tile_shape(&self) -> [usize; 2] {
        [self.lanes, self.lanes * self.tiling.vector_size + 1]
    }
}

/// Plan a column reduction `[batch, reduced, kept]`.
///
/// A square `lanes x lanes` block walks the reduced dimension; each thread
/// strides over `reduced / lanes` rows of its `vector_size` columns.
#[tracing::instrument(skip_all, fields(dimensions = %dimensions))]
pub fn plan_column_tiling(
    dimensions: &ReductionDimensions,
    elements: &ElementInfo,
    device: &DeviceInfo,
    config: &ReductionConfig,
) -> Result<ColumnTiling> {
    check_config(config)?;
    let [batch, reduced, kept] = dimensions.dimensions;
    let mut lanes = device.square_tile_lanes();
    let mut vector_size = vector_size(kept, lanes, elements, config);

    let shared_bytes = |lanes: usize, vector_size: usize| lanes * (lanes * vector_size + 1) * elements.partial_bytes;
    while shared_bytes(lanes, vector_size) > device.shared_memory_per_block {
        warn!(lanes, vector_size, budget = device.shared_memory_per_block, "transpose tile exceeds shared memory");
        if vector_size > 1 {
            vector_size = 1;
        } else if lanes > 1 {
            lanes /= 2;
        } else {
            return ResourceLimitExceededSnafu {
                resource: "shared memory",
                value: shared_bytes(lanes, vector_size),
                max: device.shared_memory_per_block,
            }
            .fail();
        }
    }

    let tiling = TilingParameters::new(
        smallvec![batch, reduced, kept / vector_size, vector_size],
        smallvec![1, ceil_div(reduced, lanes), 1, vector_size],
        smallvec![1, lanes, lanes, 1],
        smallvec![batch, 1, ceil_div(kept / vector_size, lanes), 1],
        vector_size,
    );
    tiling.verify()?;
    let launch = LaunchDimensions::for_tiling(&tiling, device)?;
    debug!(%tiling, %launch, lanes, "column tiling");
    Ok(ColumnTiling { tiling, lanes, launch })
}
