use smallvec::smallvec;
use test_case::test_case;

use crate::reduction::tiling::*;
use crate::reduction::{ReductionDimensions, ReductionError};
use crate::{DeviceInfo, ReductionConfig};

const F32: ElementInfo = ElementInfo { smallest_input_bits: 32, has_complex: false, partial_bytes: 4 };

fn elements(bits: usize) -> ElementInfo {
    ElementInfo { smallest_input_bits: bits, has_complex: false, partial_bytes: bits.div_ceil(8) }
}

// =============================================================================
// Vector size and rows per warp
// =============================================================================

#[test_case(1024, 64, 32, 2; "f32 even")]
#[test_case(1023, 64, 32, 1; "odd minor")]
#[test_case(1024, 64, 16, 4; "f16 wide")]
#[test_case(1026, 64, 16, 2; "f16 not divisible by 4")]
#[test_case(192, 64, 16, 2; "f16 too few per thread for 4")]
#[test_case(64, 64, 32, 1; "would idle threads")]
#[test_case(1024, 64, 64, 1; "f64")]
fn test_vector_size(minor: usize, threads: usize, bits: usize, expected: usize) {
    assert_eq!(vector_size(minor, threads, &elements(bits), &ReductionConfig::default()), expected);
}

#[test]
fn test_vector_size_disabled() {
    let complex = ElementInfo { has_complex: true, ..F32 };
    assert_eq!(vector_size(1024, 64, &complex, &ReductionConfig::default()), 1);
    let config = ReductionConfig::builder().vectorize(false).build();
    assert_eq!(vector_size(1024, 64, &F32, &config), 1);
}

#[test_case(16, 32, 2)]
#[test_case(1, 32, 32)]
#[test_case(8, 64, 8)]
#[test_case(24, 32, 1)]
#[test_case(32, 32, 1)]
#[test_case(64, 32, 1)]
fn test_rows_per_warp(reduced: usize, warp: usize, expected: usize) {
    assert_eq!(rows_per_warp(reduced, warp), expected);
}

// =============================================================================
// Row tiling
// =============================================================================

#[test]
fn test_row_tiling_scenario_a() {
    let dims = ReductionDimensions::row(1, 256, 1024);
    let row = plan_row_tiling(&dims, &F32, &DeviceInfo::cuda(), &ReductionConfig::default()).unwrap();
    let tiling = &row.tiling;

    assert_eq!(tiling.vector_size, 2);
    assert_eq!(1024 % tiling.vector_size, 0);
    assert_eq!(tiling.tiled_shape.as_slice(), &[1, 256, 512, 2]);
    assert_eq!(tiling.num_threads.as_slice(), &[1, 4, 64, 1]);
    assert_eq!(tiling.tile_sizes_per_thread.as_slice(), &[1, 1, 8, 2]);
    assert_eq!(tiling.tile_sizes_per_block.as_slice(), &[1, 4, 512, 2]);
    assert_eq!(tiling.num_blocks.as_slice(), &[1, 64, 1, 1]);
    assert_eq!(row.warps_per_row, 2);
    assert_eq!(row.rows_per_warp, 1);
    // warps_per_row * warp * elements per thread covers the row.
    assert_eq!(row.warps_per_row * 32 * tiling.tile_sizes_per_thread[2] * tiling.vector_size, 1024);
    assert_eq!(tiling.total_threads(), 256);
    assert_eq!(tiling.total_blocks(), 64);
}

#[test]
fn test_row_tiling_packs_short_rows() {
    let dims = ReductionDimensions::row(1, 100, 8);
    let row = plan_row_tiling(&dims, &F32, &DeviceInfo::cuda(), &ReductionConfig::default()).unwrap();
    assert_eq!(row.rows_per_warp, 4);
    assert_eq!(row.warps_per_row, 1);
    assert_eq!(row.threads_per_row(), 8);
    assert_eq!(row.rows_per_block(), 32);
    assert_eq!(row.tiling.vector_size, 1);
    assert_eq!(row.tiling.num_blocks.as_slice(), &[1, 4, 1, 1]);
}

#[test]
fn test_row_tiling_single_row_per_block() {
    // 1024 threads per row leave no room for a second row.
    let dims = ReductionDimensions::row(1, 8, 16384);
    let row = plan_row_tiling(&dims, &F32, &DeviceInfo::cuda(), &ReductionConfig::default()).unwrap();
    assert_eq!(row.threads_per_row(), 1024);
    assert_eq!(row.rows_per_block(), 1);
    assert_eq!(row.warps_per_row, 32);
}

#[test]
fn test_row_tiling_batch_in_thread_tile() {
    let dims = ReductionDimensions::row(4, 16, 64);
    let row = plan_row_tiling(&dims, &F32, &DeviceInfo::cuda(), &ReductionConfig::default()).unwrap();
    assert_eq!(row.tiling.tile_sizes_per_thread[0], 4);
    assert_eq!(row.tiling.num_threads.as_slice(), &[1, 8, 32, 1]);
    assert!(row.tiling.verify().is_ok());
}

#[test]
fn test_row_threads_capped_by_device() {
    // Intel Xe: 16-wide subgroups, one warp combines at most 16 warp partials.
    let dims = ReductionDimensions::row(1, 4, 16384);
    let row = plan_row_tiling(&dims, &F32, &DeviceInfo::intel_xe(), &ReductionConfig::default()).unwrap();
    assert_eq!(row.threads_per_row(), 256);
    assert_eq!(row.warps_per_row, 16);
    assert!(row.tiling.total_threads() <= 512);
}

#[test]
fn test_row_threads_from_config() {
    let config = ReductionConfig::builder().max_row_threads(100).build();
    let dims = ReductionDimensions::row(1, 4, 16384);
    let row = plan_row_tiling(&dims, &F32, &DeviceInfo::cuda(), &config).unwrap();
    // Rounded down to whole warps.
    assert_eq!(row.threads_per_row(), 96);
    assert_eq!(row.warps_per_row, 3);
}

#[test]
fn test_row_tiling_shrinks_rows_for_shared_memory() {
    let device = DeviceInfo { shared_memory_per_block: 16, ..DeviceInfo::cuda() };
    let dims = ReductionDimensions::row(1, 256, 1024);
    let row = plan_row_tiling(&dims, &F32, &device, &ReductionConfig::default()).unwrap();
    assert_eq!(row.rows_per_block(), 2);
    assert_eq!(row.tiling.num_blocks[1], 128);
}

#[test]
fn test_row_tiling_without_shared_memory_fails() {
    let device = DeviceInfo { shared_memory_per_block: 4, ..DeviceInfo::cuda() };
    let dims = ReductionDimensions::row(1, 256, 1024);
    let err = plan_row_tiling(&dims, &F32, &device, &ReductionConfig::default()).unwrap_err();
    assert!(matches!(err, ReductionError::ResourceLimitExceeded { resource: "shared memory", .. }));
    assert!(err.is_fallback());
}

#[test]
fn test_row_tiling_rejects_sub_warp_blocks() {
    let device = DeviceInfo { max_threads_per_block: 16, ..DeviceInfo::cuda() };
    let err = plan_row_tiling(&ReductionDimensions::row(1, 4, 64), &F32, &device, &ReductionConfig::default())
        .unwrap_err();
    assert!(matches!(err, ReductionError::ResourceLimitExceeded { resource: "threads per block", .. }));
}

// =============================================================================
// Column tiling
// =============================================================================

#[test]
fn test_column_tiling_scenario_b() {
    let dims = ReductionDimensions::column(1, 64, 128);
    let column = plan_column_tiling(&dims, &F32, &DeviceInfo::cuda(), &ReductionConfig::default()).unwrap();
    let tiling = &column.tiling;

    assert_eq!(column.lanes, 32);
    assert_eq!(tiling.vector_size, 2);
    assert_eq!(tiling.tiled_shape.as_slice(), &[1, 64, 64, 2]);
    assert_eq!(tiling.num_threads.as_slice(), &[1, 32, 32, 1]);
    assert_eq!(tiling.tile_sizes_per_thread.as_slice(), &[1, 2, 1, 2]);
    assert_eq!(tiling.num_blocks.as_slice(), &[1, 1, 2, 1]);
    assert_eq!(column.shared_tile_shape(), [32, 65]);
}

#[test_case(DeviceInfo::cuda(), 32; "cuda")]
#[test_case(DeviceInfo::amd_cdna3(), 32; "cdna3 wave64")]
#[test_case(DeviceInfo::intel_xe(), 16; "intel xe")]
#[test_case(DeviceInfo::webgpu(), 16; "webgpu")]
fn test_column_lanes_per_device(device: DeviceInfo, lanes: usize) {
    let dims = ReductionDimensions::column(2, 64, 512);
    let column = plan_column_tiling(&dims, &F32, &device, &ReductionConfig::default()).unwrap();
    assert_eq!(column.lanes, lanes);
    assert!(column.tiling.total_threads() <= device.max_threads_per_block);
    assert_eq!(column.tiling.num_blocks[0], 2);
}

#[test]
fn test_column_tiling_shrinks_for_shared_memory() {
    let device = DeviceInfo { shared_memory_per_block: 1024, ..DeviceInfo::cuda() };
    let dims = ReductionDimensions::column(1, 64, 128);
    let column = plan_column_tiling(&dims, &F32, &device, &ReductionConfig::default()).unwrap();
    assert_eq!(column.tiling.vector_size, 1);
    assert_eq!(column.lanes, 8);
    let [rows, columns] = column.shared_tile_shape();
    assert!(rows * columns * 4 <= 1024);
}

#[test]
fn test_column_tiling_without_shared_memory_fails() {
    let device = DeviceInfo { shared_memory_per_block: 0, ..DeviceInfo::cuda() };
    let dims = ReductionDimensions::column(1, 64, 128);
    let err = plan_column_tiling(&dims, &F32, &device, &ReductionConfig::default()).unwrap_err();
    assert!(matches!(err, ReductionError::ResourceLimitExceeded { resource: "shared memory", max: 0, .. }));
}

#[test]
fn test_column_tiling_pads_partial_blocks() {
    let dims = ReductionDimensions::column(1, 40, 100);
    let column = plan_column_tiling(&dims, &F32, &DeviceInfo::cuda(), &ReductionConfig::default()).unwrap();
    assert_eq!(column.tiling.vector_size, 2);
    assert_eq!(column.tiling.num_blocks[2], 2);
    assert_eq!(column.tiling.tile_sizes_per_thread[1], 2);
}

// =============================================================================
// Parameters and launch dimensions
// =============================================================================

#[test]
fn test_tiling_verify_detects_gaps() {
    let tiling = TilingParameters::new(
        smallvec![1, 100, 8, 1],
        smallvec![1, 1, 1, 1],
        smallvec![1, 8, 8, 1],
        smallvec![1, 4, 1, 1],
        1,
    );
    let err = tiling.verify().unwrap_err();
    assert!(err.is_invariant_violation());
    assert!(err.to_string().contains("dimension 1"), "{err}");
}

#[test]
fn test_tiling_verify_vector_lane() {
    let tiling = TilingParameters::new(
        smallvec![1, 8, 8, 2],
        smallvec![1, 1, 1, 1],
        smallvec![1, 8, 8, 2],
        smallvec![1, 1, 1, 1],
        2,
    );
    assert!(tiling.verify().unwrap_err().is_invariant_violation());
}

#[test]
fn test_tiling_display() {
    let tiling = TilingParameters::new(
        smallvec![1, 64, 64, 2],
        smallvec![1, 2, 1, 2],
        smallvec![1, 32, 32, 1],
        smallvec![1, 1, 2, 1],
        2,
    );
    assert_eq!(
        tiling.to_string(),
        "shape [1, 64, 64, 2] tile/thread [1, 2, 1, 2] threads [1, 32, 32, 1] blocks [1, 1, 2, 1] vector 2"
    );
}

#[test]
fn test_launch_dimensions() {
    let launch = LaunchDimensions::new(64, 256);
    assert_eq!(launch.grid(), [64, 1, 1]);
    assert_eq!(launch.block(), [256, 1, 1]);
    assert_eq!(launch.total_threads(), 64 * 256);
    assert_eq!(launch.to_string(), "grid [64, 1, 1] block [256, 1, 1]");
    assert!(launch.validate(&DeviceInfo::cuda()).is_ok());
}

#[test]
fn test_launch_dimensions_limits() {
    let too_wide = LaunchDimensions::new(1, 2048).validate(&DeviceInfo::cuda()).unwrap_err();
    assert!(matches!(too_wide, ReductionError::ResourceLimitExceeded { resource: "threads per block", .. }));

    let too_many = LaunchDimensions::new(70000, 64).validate(&DeviceInfo::webgpu()).unwrap_err();
    assert!(matches!(too_many, ReductionError::ResourceLimitExceeded { resource: "grid blocks", max: 65535, .. }));
    LaunchDimensions::with_grid([35000, 2, 1], 64).validate(&DeviceInfo::webgpu()).unwrap();

    let empty = LaunchDimensions::new(0, 64).validate(&DeviceInfo::cuda()).unwrap_err();
    assert!(empty.is_invariant_violation());
}

#[test_case(64, [65535; 3], [64, 1, 1]; "fits x")]
#[test_case(131072, [65535; 3], [43691, 3, 1]; "spills into y")]
#[test_case(70000, [65535; 3], [35000, 2, 1]; "two rows of blocks")]
#[test_case(38, [16, 65535, 65535], [13, 3, 1]; "narrow x")]
#[test_case(1000, [4, 4, 100], [4, 4, 63]; "spills into z")]
fn test_split_grid(blocks: usize, limits: [usize; 3], expected: [usize; 3]) {
    let grid = split_grid(blocks, limits).unwrap();
    assert_eq!(grid, expected);
    assert!(grid.iter().product::<usize>() >= blocks);
    // Idle blocks never fill a whole row of the grid.
    assert!(grid.iter().product::<usize>() - blocks < grid[1] * grid[2]);
}

#[test]
fn test_split_grid_overflow() {
    assert_eq!(split_grid(65, [4, 4, 4]), None);
    assert_eq!(split_grid(1, [0, 4, 4]), None);
}

#[test]
fn test_row_tiling_spreads_blocks_over_grid() {
    let device = DeviceInfo::webgpu();
    let dims = ReductionDimensions::row(1, 1 << 20, 32);
    let row = plan_row_tiling(&dims, &F32, &device, &ReductionConfig::default()).unwrap();
    assert_eq!(row.rows_per_block(), 8);
    assert_eq!(row.tiling.total_blocks(), 131072);
    assert_eq!(row.launch.grid(), [43691, 3, 1]);
    assert_eq!(row.launch.block(), [256, 1, 1]);
    row.launch.validate(&device).unwrap();
}

#[test]
fn test_column_tiling_spreads_blocks_over_grid() {
    let device = DeviceInfo::webgpu();
    let dims = ReductionDimensions::column(70000, 64, 32);
    let column = plan_column_tiling(&dims, &F32, &device, &ReductionConfig::default()).unwrap();
    assert_eq!(column.tiling.total_blocks(), 70000);
    assert_eq!(column.launch.grid(), [35000, 2, 1]);
    column.launch.validate(&device).unwrap();
}

#[test]
fn test_tiling_grid_too_small_fails() {
    let device = DeviceInfo { max_grid_dims: [4, 4, 4], ..DeviceInfo::cuda() };
    let dims = ReductionDimensions::row(1, 4096, 1024);
    let err = plan_row_tiling(&dims, &F32, &device, &ReductionConfig::default()).unwrap_err();
    assert!(matches!(err, ReductionError::ResourceLimitExceeded { resource: "grid blocks", max: 64, .. }), "{err}");
    assert!(err.is_fallback());
}

#[test]
fn test_tiling_rejects_zero_tunable() {
    let config = ReductionConfig::builder().min_elements_per_thread(0).build();
    let err = plan_row_tiling(&ReductionDimensions::row(1, 4, 1024), &F32, &DeviceInfo::cuda(), &config).unwrap_err();
    assert!(err.is_invariant_violation(), "{err}");
    assert!(err.to_string().contains("min_elements_per_thread"), "{err}");
    assert!(check_config(&ReductionConfig::default()).is_ok());
}

#[test]
fn test_tiling_is_deterministic() {
    let dims = ReductionDimensions::row(2, 300, 777);
    let plan = || plan_row_tiling(&dims, &F32, &DeviceInfo::metal(), &ReductionConfig::default()).unwrap();
    assert_eq!(plan(), plan());
}
