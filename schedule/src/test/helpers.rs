//! Test utilities for the reduction planner.
//!
//! Provides fusion builders for common reduction patterns, a host-side
//! emulator that runs a plan's combine sequence over real data, and a naive
//! reference reduction to compare it with.

use std::collections::HashMap;

use strider_ir::shape::{delinearize, element_count, linearize};
use strider_ir::{BinaryOp, ConstValue, DType, FusionGraph, Layout, ReduceOp, UnaryOp};

use crate::DeviceInfo;
use crate::reduction::{CombineStep, EpilogueBuilder, ReductionPlan};

/// Install a test subscriber honoring `RUST_LOG`; repeated calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Single reduce of a parameter with the given layout, seeded with the
/// combiner identity.
pub fn reduce_fusion(shape: &[usize], layout: Layout, dimensions: &[usize], dtype: DType, combiner: ReduceOp) -> FusionGraph {
    let mut builder = FusionGraph::builder("reduce");
    let input = builder.parameter_with_layout(0, shape, layout, dtype);
    let init = builder.constant(combiner.identity(dtype), dtype);
    let reduce = builder.reduce(input, init, dimensions, combiner);
    builder.build(&[reduce]).expect("valid reduce fusion")
}

/// Row-major sum of `shape` along `dimensions`.
pub fn sum_fusion(shape: &[usize], dimensions: &[usize], dtype: DType) -> FusionGraph {
    reduce_fusion(shape, Layout::row_major(shape.len()), dimensions, dtype, ReduceOp::Add)
}

/// `[kept, reduced]` row reduction.
pub fn row_fusion(kept: usize, reduced: usize) -> FusionGraph {
    sum_fusion(&[kept, reduced], &[1], DType::Float32)
}

/// `[reduced, kept]` column reduction.
pub fn column_fusion(reduced: usize, kept: usize) -> FusionGraph {
    sum_fusion(&[reduced, kept], &[0], DType::Float32)
}

/// Two reductions of unrelated inputs: two independent groups.
pub fn two_group_fusion() -> FusionGraph {
    let mut builder = FusionGraph::builder("two_groups");
    let a = builder.parameter(0, &[32, 64], DType::Float32);
    let b = builder.parameter(1, &[32, 64], DType::Float32);
    let zero = builder.constant(ConstValue::Float(0.0), DType::Float32);
    let sum_a = builder.reduce(a, zero, &[1], ReduceOp::Add);
    let sum_b = builder.reduce(b, zero, &[1], ReduceOp::Add);
    builder.build(&[sum_a, sum_b]).expect("valid fusion")
}

/// Sum and max of one input plus a derived root `exp(sum) * 2`.
pub fn multi_hero_fusion(kept: usize, reduced: usize) -> FusionGraph {
    let mut builder = FusionGraph::builder("multi_hero");
    let input = builder.parameter(0, &[kept, reduced], DType::Float32);
    let zero = builder.constant(ConstValue::Float(0.0), DType::Float32);
    let lowest = builder.constant(ReduceOp::Max.identity(DType::Float32), DType::Float32);
    let sum = builder.reduce(input, zero, &[1], ReduceOp::Add);
    let max = builder.reduce(input, lowest, &[1], ReduceOp::Max);
    let exp = builder.unary(UnaryOp::Exp, sum);
    let two = builder.constant(ConstValue::Float(2.0), DType::Float32);
    let splat = builder.broadcast(two, &[kept], &[]);
    let scaled = builder.binary(BinaryOp::Mul, exp, splat);
    builder.build(&[sum, max, scaled]).expect("valid fusion")
}

/// Deterministic small integers, exact under any summation order.
pub fn test_input(len: usize) -> Vec<f64> {
    (0..len).map(|i| ((i * 7919 + 13) % 17) as f64 - 8.0).collect()
}

/// Reduce `input` (row-major over `shape`) along `dimensions`, starting from `init`.
pub fn naive_reduce(shape: &[usize], dimensions: &[usize], combiner: ReduceOp, init: f64, input: &[f64]) -> Vec<f64> {
    let output_shape: Vec<usize> =
        shape.iter().enumerate().filter(|(d, _)| !dimensions.contains(d)).map(|(_, &s)| s).collect();
    let mut output = vec![init; element_count(&output_shape)];
    for (linear, &value) in input.iter().enumerate() {
        let index = delinearize(linear, shape);
        let kept: Vec<usize> =
            index.iter().enumerate().filter(|(d, _)| !dimensions.contains(d)).map(|(_, &i)| i).collect();
        let slot = linearize(&kept, &output_shape);
        output[slot] = combiner.combine_f64(output[slot], value);
    }
    output
}

/// Outputs of an emulated launch.
#[derive(Debug, Clone, PartialEq)]
pub struct Emulation {
    /// Root values, row-major over the root shape.
    pub output: Vec<f64>,
    /// How many threads wrote each output element.
    pub writes: Vec<usize>,
    /// How many times each input element was read.
    pub reads: Vec<usize>,
}

/// Run the combine sequence of `plan` for root `root_index` on the host.
///
/// Every block runs independently; within a block, warps shuffle with xor
/// butterflies and shared memory is a `[rows, columns]` tile. `input` is
/// row-major over the hero operand's logical shape.
pub fn emulate(plan: &ReductionPlan, device: &DeviceInfo, root_index: usize, input: &[f64]) -> Emulation {
    let analysis = plan.analysis();
    let root = analysis.root(root_index).expect("root exists");
    let hero = analysis.hero(root.hero.expect("reduction root")).expect("hero facts");
    let identity = hero.combiner.identity(hero.dtype).as_f64();
    let init = hero.init_value.map_or(identity, |v| v.as_f64());
    let combine = |a: f64, b: f64| hero.combiner.combine_f64(a, b);

    let strategy = plan.strategy();
    let tiling = plan.tiling();
    let (threads, blocks, lanes) = (tiling.total_threads(), tiling.total_blocks(), strategy.accumulator_lanes());
    let input_map = plan.thread_id_to_input_indexing(root_index, 0).expect("input map").expect("hero operand");
    let output_map = plan.thread_id_to_output_indexing(root_index).expect("output map").expect("reduction root");
    let (write_map, read_map) = (strategy.shared_memory_write_map(), strategy.shared_memory_read_map());
    let tile_columns = strategy.shared_tile_shape().map_or(0, |[_, columns]| columns);
    let tile_len = strategy.shared_tile_shape().map_or(0, |[rows, columns]| rows * columns);

    let lane_of = |symbols: &[i64]| if lanes > 1 { symbols[3] as usize } else { 0 };
    let slot = |block: usize, thread: usize, lane: usize| (block * threads + thread) * lanes + lane;
    let mut acc = vec![identity; blocks * threads * lanes];
    let mut shared = vec![identity; blocks * tile_len];
    let mut reads = vec![0; input.len()];
    let mut output = vec![init; element_count(&root.shape)];
    let mut writes = vec![0; output.len()];

    for step in strategy.combine_steps() {
        match step {
            CombineStep::Accumulate => {
                for (dims, symbols) in input_map.domain_points() {
                    let index: Vec<usize> = input_map.evaluate(&dims, &symbols).iter().map(|&i| i as usize).collect();
                    let linear = linearize(&index, &hero.operand_shape);
                    reads[linear] += 1;
                    let s = slot(dims[1] as usize, dims[0] as usize, lane_of(&symbols));
                    acc[s] = combine(acc[s], input[linear]);
                }
            }
            CombineStep::ShuffleReduce { max_distance } => {
                for distance in CombineStep::shuffle_distances(max_distance) {
                    let before = acc.clone();
                    for block in 0..blocks {
                        for thread in 0..threads {
                            let warp_base = thread - thread % device.warp_size;
                            let partner = warp_base + ((thread % device.warp_size) ^ distance);
                            if partner >= threads {
                                continue;
                            }
                            for lane in 0..lanes {
                                let (s, p) = (slot(block, thread, lane), slot(block, partner, lane));
                                acc[s] = combine(before[s], before[p]);
                            }
                        }
                    }
                }
            }
            CombineStep::WriteShared => {
                for block in 0..blocks {
                    for (dims, symbols) in write_map.domain_points() {
                        let address = write_map.evaluate(&dims, &symbols);
                        let cell = address[0] as usize * tile_columns + address[1] as usize;
                        shared[block * tile_len + cell] = acc[slot(block, dims[0] as usize, symbols[0] as usize)];
                    }
                }
            }
            CombineStep::Barrier => {}
            CombineStep::ReadShared => {
                for block in 0..blocks {
                    for thread in 0..threads {
                        for lane in 0..lanes {
                            let (dims, symbols) = ([thread as i64], [lane as i64]);
                            acc[slot(block, thread, lane)] = if read_map.contains(&dims, &symbols) {
                                let address = read_map.evaluate(&dims, &symbols);
                                shared[block * tile_len + address[0] as usize * tile_columns + address[1] as usize]
                            } else {
                                identity
                            };
                        }
                    }
                }
            }
            CombineStep::WriteOutput => {
                for (dims, symbols) in output_map.domain_points() {
                    let index: Vec<usize> = output_map.evaluate(&dims, &symbols).iter().map(|&i| i as usize).collect();
                    let linear = linearize(&index, &root.shape);
                    writes[linear] += 1;
                    output[linear] = combine(init, acc[slot(dims[1] as usize, dims[0] as usize, lane_of(&symbols))]);
                }
            }
        }
    }
    Emulation { output, writes, reads }
}

/// Host-side epilogue builder evaluating on scalars.
#[derive(Debug, Default)]
pub struct F64Builder {
    pub ops: Vec<String>,
}

impl EpilogueBuilder for F64Builder {
    type Value = f64;

    fn constant(&mut self, value: ConstValue, _dtype: DType) -> f64 {
        self.ops.push(format!("constant {value}"));
        value.as_f64()
    }

    fn unary(&mut self, op: UnaryOp, _dtype: DType, operand: f64) -> f64 {
        self.ops.push(op.name().to_string());
        op.eval_f64(operand)
    }

    fn binary(&mut self, op: BinaryOp, _dtype: DType, lhs: f64, rhs: f64) -> f64 {
        self.ops.push(op.name().to_string());
        op.eval_f64(lhs, rhs)
    }

    fn extract_lane(&mut self, vector: f64, lane: f64) -> f64 {
        self.ops.push(format!("extract {lane}"));
        vector + lane
    }
}

/// Hero results keyed by node, for epilogue tests.
pub fn hero_results(plan: &ReductionPlan, values: &[f64]) -> HashMap<strider_ir::NodeId, f64> {
    plan.analysis().heroes().iter().map(|h| h.node).zip(values.iter().copied()).collect()
}
