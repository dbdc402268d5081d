//! Indexing-map bookkeeping shared by the row and column strategies.
//!
//! Thread-block maps have two dimensions, the linear thread id `d0` and the
//! linear block id `d1`, and one tile-offset symbol per tiled dimension whose
//! range is the per-thread tile size; the last symbol is the vector lane.
//! Thread-vector maps (shared memory) have the thread id `d0` and the vector
//! lane `s0`. Symbols no result depends on are collapsed to `[0, 0]`.
//!
//! A launch that spreads its blocks over grid `y` and `z` linearizes them
//! back into `d1` as `x + grid_x * (y + grid_y * z)`, and
//! blocks past the tiling's block count lie outside the `d1` range.

use smallvec::SmallVec;
use snafu::ResultExt;
use strider_ir::{AffineExpr, IndexingMap, Interval, delinearize_in_bounds_index};
use tracing::{debug, trace};

use super::error::*;
use super::tiling::TilingParameters;

pub type Exprs = SmallVec<[AffineExpr; 4]>;

/// `expr in range` restrictions of a map domain.
pub type Constraints = Vec<(AffineExpr, Interval)>;

pub const THREAD_ID_DIM: usize = 0;
pub const BLOCK_ID_DIM: usize = 1;

/// Per-dimension thread coordinates of the linear thread id.
pub fn thread_ids(tiling: &TilingParameters) -> Exprs {
    let ids = delinearize_in_bounds_index(AffineExpr::dim(THREAD_ID_DIM), &tiling.num_threads);
    let range = [Interval::from_size(tiling.total_threads())];
    ids.iter().map(|e| e.simplify(&range, &[])).collect()
}

/// Per-dimension block coordinates of the linear block id.
pub fn block_ids(tiling: &TilingParameters) -> Exprs {
    let ids = delinearize_in_bounds_index(AffineExpr::dim(BLOCK_ID_DIM), &tiling.num_blocks);
    let ranges = [Interval::point(0), Interval::from_size(tiling.total_blocks())];
    ids.iter().map(|e| e.simplify(&ranges, &[])).collect()
}

/// One tile-offset symbol per tiled dimension.
pub fn tile_offsets(tiling: &TilingParameters) -> Exprs {
    (0..tiling.tile_sizes_per_thread.len()).map(AffineExpr::symbol).collect()
}

/// Map over `(thread id, block id)[tile offsets]`.
pub fn thread_block_map(
    tiling: &TilingParameters,
    results: impl IntoIterator<Item = AffineExpr>,
    constraints: Constraints,
) -> IndexingMap {
    let dims = vec![Interval::from_size(tiling.total_threads()), Interval::from_size(tiling.total_blocks())];
    let symbols = tiling.tile_sizes_per_thread.iter().map(|&size| Interval::from_size(size)).collect();
    finish(IndexingMap::new(dims, symbols, results), constraints)
}

/// Map over `(thread id)[vector lane]`.
pub fn thread_vector_map(
    tiling: &TilingParameters,
    results: impl IntoIterator<Item = AffineExpr>,
    constraints: Constraints,
) -> IndexingMap {
    let dims = vec![Interval::from_size(tiling.total_threads())];
    let symbols = vec![Interval::from_size(tiling.vector_size)];
    finish(IndexingMap::new(dims, symbols, results), constraints)
}

/// Keep only `results[i]` for `i` in `keep`, collapsing symbols that only the
/// dropped results used.
pub fn project_results(map: &IndexingMap, keep: &[usize]) -> IndexingMap {
    if map.is_undefined() {
        return IndexingMap::undefined();
    }
    let results = keep.iter().filter_map(|&i| map.results().get(i).cloned());
    let projected = IndexingMap::new(map.dims().to_vec(), map.symbols().to_vec(), results);
    finish(projected, map.constraints().to_vec())
}

fn finish(mut map: IndexingMap, constraints: Constraints) -> IndexingMap {
    for (expr, range) in constraints {
        map.add_constraint(expr, range);
    }
    let map = map.collapse_unused_symbols();
    trace!(%map, "indexing map");
    map
}

/// Check that every dimension and symbol a result or constraint of `map`
/// mentions lies in its domain.
pub fn verify_map(what: &str, map: &IndexingMap) -> Result<()> {
    map.verify().inspect_err(|err| debug!(what, %map, %err, "malformed indexing map")).context(IrSnafu)
}
