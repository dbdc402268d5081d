//! Fact base and index algebra for the Strider reduction planner.
//!
//! This crate holds the read-only inputs of planning and the vocabulary its
//! outputs are expressed in.
//!
//! # Module Organization
//!
//! - [`types`] - Constant values, reduce combiners and elementwise ops
//! - [`shape`] - Shapes, strides and minor-to-major layouts
//! - [`graph`] - The fusion graph: nodes, operands and output roots
//! - [`affine`] - Quasi-affine expressions and integer intervals
//! - [`indexing`] - Constrained indexing maps and bitcast helpers
//! - [`error`] - Error types and result handling

pub mod affine;
pub mod error;
pub mod graph;
pub mod indexing;
pub mod shape;
pub mod types;


pub use affine::{AffineExpr, Interval};
pub use error::{Error, Result};
pub use graph::{FusionBuilder, FusionGraph, Node, NodeId, NodeKind};
pub use indexing::{IndexingMap, Point, bitcast_map, delinearize_in_bounds_index, linearize_index};
pub use shape::{Layout, Shape};
pub use types::{BinaryOp, ConstValue, ReduceOp, UnaryOp};

// Re-export external types for convenience
pub use strider_dtype::DType;
