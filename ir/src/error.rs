use smallvec::SmallVec;
use snafu::Snafu;

use crate::graph::NodeId;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// Node id does not belong to the graph.
    #[snafu(display("unknown node {id} (graph has {len} nodes)"))]
    UnknownNode { id: NodeId, len: usize },

    /// Operand refers to a node that is defined later.
    #[snafu(display("node {node} uses operand {operand} before it is defined"))]
    OperandNotDefined { node: NodeId, operand: NodeId },

    /// Wrong number of operands for the node kind.
    #[snafu(display("{kind} expects {expected} operands, got {got}"))]
    OperandCountMismatch { kind: &'static str, expected: usize, got: usize },

    /// Zero-sized dimension.
    #[snafu(display("shape {shape:?} has a zero-sized dimension"))]
    ZeroSizedDimension { shape: SmallVec<[usize; 4]> },

    /// Layout is not a permutation of `0..rank`.
    #[snafu(display("layout {minor_to_major:?} is not a permutation of 0..{rank}"))]
    InvalidLayout { minor_to_major: SmallVec<[usize; 4]>, rank: usize },

    /// Reduce dimension outside of the operand rank.
    #[snafu(display("reduce dimension {dim} is out of range for rank {rank}"))]
    ReduceDimensionOutOfRange { dim: usize, rank: usize },

    /// Reduce output shape does not match the operand shape with reduced dimensions removed.
    #[snafu(display("reduce output shape {actual:?} does not match expected {expected:?}"))]
    ReduceShapeMismatch { expected: SmallVec<[usize; 4]>, actual: SmallVec<[usize; 4]> },

    /// Reduce init value is not a scalar.
    #[snafu(display("reduce {node} has an init value of rank {rank}, expected a scalar"))]
    NonScalarInit { node: NodeId, rank: usize },

    /// Elementwise operands disagree on shape.
    #[snafu(display("shape mismatch in {op}: {lhs:?} vs {rhs:?}"))]
    ElementwiseShapeMismatch { op: &'static str, lhs: SmallVec<[usize; 4]>, rhs: SmallVec<[usize; 4]> },

    /// Reshape changes the element count.
    #[snafu(display("reshape size mismatch: input size {input_size} != output size {output_size}"))]
    ReshapeSizeMismatch { input_size: usize, output_size: usize },

    /// Broadcast dimension mapping is inconsistent with the shapes.
    #[snafu(display("invalid broadcast of {operand:?} into {shape:?} along {dimensions:?}"))]
    InvalidBroadcast { operand: SmallVec<[usize; 4]>, shape: SmallVec<[usize; 4]>, dimensions: SmallVec<[usize; 4]> },

    /// Indexing-map expression references a dimension outside the domain.
    #[snafu(display("expression references d{index} but the domain has {num_dims} dimensions"))]
    DimOutOfDomain { index: usize, num_dims: usize },

    /// Indexing-map expression references a symbol outside the domain.
    #[snafu(display("expression references s{index} but the domain has {num_symbols} symbols"))]
    SymbolOutOfDomain { index: usize, num_symbols: usize },

    /// Interval with `lower > upper`.
    #[snafu(display("empty interval [{lower}, {upper}] for {what}"))]
    EmptyInterval { what: String, lower: i64, upper: i64 },

    /// Indexing-map arity does not match the shape it is composed with.
    #[snafu(display("map has {results} results but the target shape has rank {rank}"))]
    ResultArityMismatch { results: usize, rank: usize },

    /// Operation on the undefined indexing map.
    #[snafu(display("cannot {operation} an undefined indexing map"))]
    UndefinedMap { operation: &'static str },
}
